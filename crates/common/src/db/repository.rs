//! Repository pattern for database operations
//!
//! Provides a clean interface for all data access operations
//! with proper error handling and transaction support.

use crate::errors::{AppError, Result};
use crate::db::DbPool;
use crate::db::models::*;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, OnConflict}, Insert, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    DbBackend, DbErr, EntityTrait, QueryFilter, QueryOrder, Set, Statement, TransactionTrait,
};
use uuid::Uuid;

/// Fields of a purchase-order request at creation time.
/// Attachments are patched in after upload.
#[derive(Debug, Clone)]
pub struct NewPurchaseOrder {
    pub company: String,
    pub document_type: DocumentType,
    pub supplier: String,
    pub supplier_tax_id: String,
    pub project_id: Uuid,
    pub project_name: String,
    pub sub_project: Option<String>,
    pub cost_center: String,
    pub glosa: String,
    pub detail: Option<String>,
    pub value: Decimal,
    pub requester_id: Uuid,
    pub requester_email: String,
}

/// Administrator-editable fields
#[derive(Debug, Clone, Default)]
pub struct PurchaseOrderUpdate {
    pub status: Option<RequestStatus>,
    /// `Some(None)` clears the reference
    pub erp_reference: Option<Option<String>>,
}

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // Project Operations
    // ========================================================================

    /// List projects ordered by name
    pub async fn list_projects(&self) -> Result<Vec<Project>> {
        ProjectEntity::find()
            .order_by_asc(ProjectColumn::Name)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Find project by ID
    pub async fn find_project_by_id(&self, id: Uuid) -> Result<Option<Project>> {
        ProjectEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Purchase-Order Operations
    // ========================================================================

    /// Insert a new request with an empty attachment list.
    ///
    /// The correlative is `MAX + 1` within the company, computed under a
    /// transaction-scoped advisory lock so concurrent inserts stay ordered.
    pub async fn create_purchase_order(&self, new: NewPurchaseOrder) -> Result<PurchaseOrder> {
        let txn = self.write_conn().begin().await?;

        txn.execute(Statement::from_sql_and_values(
            DbBackend::Postgres,
            "SELECT pg_advisory_xact_lock(hashtext($1))",
            vec![new.company.clone().into()],
        ))
        .await?;

        let row = txn
            .query_one(Statement::from_sql_and_values(
                DbBackend::Postgres,
                r#"
                SELECT COALESCE(MAX(id_correlativo), 0) + 1
                FROM solicitudes_oc
                WHERE empresa = $1
                "#,
                vec![new.company.clone().into()],
            ))
            .await?;

        let correlative = row
            .map(|r| r.try_get_by_index::<i64>(0))
            .transpose()
            .map_err(DbErr::from)?
            .unwrap_or(1);

        let record = PurchaseOrderActiveModel {
            id: Set(Uuid::new_v4()),
            correlative: Set(correlative),
            company: Set(new.company),
            document_type: Set(new.document_type.as_str().to_string()),
            supplier: Set(new.supplier),
            supplier_tax_id: Set(new.supplier_tax_id),
            project_id: Set(new.project_id),
            project_name: Set(new.project_name),
            sub_project: Set(new.sub_project),
            cost_center: Set(new.cost_center),
            glosa: Set(new.glosa),
            detail: Set(new.detail),
            value: Set(new.value),
            attachments: Set(serde_json::json!([])),
            status: Set(RequestStatus::Submitted.as_str().to_string()),
            erp_reference: Set(None),
            requester_id: Set(new.requester_id),
            requester_email: Set(new.requester_email),
            created_at: Set(chrono::Utc::now().into()),
        };

        let inserted = record.insert(&txn).await?;
        txn.commit().await?;

        Ok(inserted)
    }

    /// Replace the attachment list of a request
    pub async fn set_attachments(&self, id: Uuid, attachments: &[AttachmentMeta]) -> Result<()> {
        let value = serde_json::to_value(attachments)?;

        let result = PurchaseOrderEntity::update_many()
            .col_expr(PurchaseOrderColumn::Attachments, Expr::value(value))
            .filter(PurchaseOrderColumn::Id.eq(id))
            .exec(self.write_conn())
            .await?;

        if result.rows_affected == 0 {
            return Err(AppError::PurchaseOrderNotFound { id: id.to_string() });
        }

        Ok(())
    }

    /// Requests created by one user, newest first
    pub async fn list_purchase_orders_for_requester(&self, requester_id: Uuid) -> Result<Vec<PurchaseOrder>> {
        PurchaseOrderEntity::find()
            .filter(PurchaseOrderColumn::RequesterId.eq(requester_id))
            .order_by_desc(PurchaseOrderColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Every request, newest first
    pub async fn list_all_purchase_orders(&self) -> Result<Vec<PurchaseOrder>> {
        PurchaseOrderEntity::find()
            .order_by_desc(PurchaseOrderColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Apply administrator edits. Status is written as given, whatever it was before.
    pub async fn update_purchase_order(
        &self,
        id: Uuid,
        update: PurchaseOrderUpdate,
    ) -> Result<PurchaseOrder> {
        let mut record: PurchaseOrderActiveModel = PurchaseOrderEntity::find_by_id(id)
            .one(self.write_conn())
            .await?
            .ok_or_else(|| AppError::PurchaseOrderNotFound { id: id.to_string() })?
            .into();

        if let Some(status) = update.status {
            record.status = Set(status.as_str().to_string());
        }

        if let Some(erp_reference) = update.erp_reference {
            record.erp_reference = Set(erp_reference);
        }

        record.update(self.write_conn()).await.map_err(Into::into)
    }

    // ========================================================================
    // Email Configuration Operations
    // ========================================================================

    /// Recipient configuration for a company
    pub async fn find_email_config(&self, company: &str) -> Result<Option<CompanyEmailConfig>> {
        CompanyEmailConfigEntity::find_by_id(company.to_string())
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// All recipient configurations
    pub async fn list_email_configs(&self) -> Result<Vec<CompanyEmailConfig>> {
        CompanyEmailConfigEntity::find()
            .order_by_asc(CompanyEmailConfigColumn::Company)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Create or replace a company's recipient configuration
    pub async fn upsert_email_config(
        &self,
        company: &str,
        label: Option<String>,
        recipients: Vec<String>,
    ) -> Result<CompanyEmailConfig> {
        email_config_upsert(company, label, recipients, chrono::Utc::now())?
            .exec_with_returning(self.write_conn())
            .await
            .map_err(Into::into)
    }
}

/// Single-statement upsert keyed on the company
fn email_config_upsert(
    company: &str,
    label: Option<String>,
    recipients: Vec<String>,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<Insert<CompanyEmailConfigActiveModel>> {
    let config = CompanyEmailConfigActiveModel {
        company: Set(company.to_string()),
        label: Set(label),
        recipients: Set(serde_json::to_value(recipients)?),
        updated_at: Set(now.into()),
    };

    Ok(CompanyEmailConfigEntity::insert(config).on_conflict(
        OnConflict::column(CompanyEmailConfigColumn::Company)
            .update_columns([
                CompanyEmailConfigColumn::Label,
                CompanyEmailConfigColumn::Recipients,
                CompanyEmailConfigColumn::UpdatedAt,
            ])
            .to_owned(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::QueryTrait;

    #[test]
    fn test_email_config_upsert_is_one_statement() {
        let sql = email_config_upsert(
            "FCH",
            Some("FCH".to_string()),
            vec!["compras@fch.cl".to_string()],
            chrono::Utc::now(),
        )
        .unwrap()
        .build(DbBackend::Postgres)
        .to_string();

        assert!(sql.starts_with(r#"INSERT INTO "configuracion_correos""#), "{}", sql);
        assert!(sql.contains(r#"ON CONFLICT ("empresa") DO UPDATE SET"#), "{}", sql);
        assert!(sql.contains(r#""destinatarios" = "excluded"."destinatarios""#), "{}", sql);
        assert!(sql.contains(r#""updated_at" = "excluded"."updated_at""#), "{}", sql);
    }
}
