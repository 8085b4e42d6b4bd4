//! SeaORM entity models
//!
//! Database entities for DeskFlow

mod company_email_config;
mod project;
mod purchase_order;

pub use purchase_order::{
    Entity as PurchaseOrderEntity,
    Model as PurchaseOrder,
    ActiveModel as PurchaseOrderActiveModel,
    Column as PurchaseOrderColumn,
    AttachmentMeta,
    DocumentType,
    RequestStatus,
};

pub use project::{
    Entity as ProjectEntity,
    Model as Project,
    ActiveModel as ProjectActiveModel,
    Column as ProjectColumn,
};

pub use company_email_config::{
    Entity as CompanyEmailConfigEntity,
    Model as CompanyEmailConfig,
    ActiveModel as CompanyEmailConfigActiveModel,
    Column as CompanyEmailConfigColumn,
};
