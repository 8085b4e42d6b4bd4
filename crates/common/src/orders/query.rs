//! Filtering and ordering of loaded requests for list views

use crate::db::models::{PurchaseOrder, RequestStatus};
use serde::Deserialize;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    CreatedAt,
    Correlative,
    Value,
    Supplier,
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// List-view parameters, usually taken from the query string
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestQuery {
    pub status: Option<RequestStatus>,
    pub company: Option<String>,
    /// Requester email, exact match ignoring case
    pub requester: Option<String>,
    /// Free text over supplier, glosa, project name and correlative
    pub search: Option<String>,
    #[serde(default)]
    pub sort: SortKey,
    /// Defaults to descending for `created_at`, ascending otherwise
    pub direction: Option<SortDirection>,
}

/// Keep records matching `predicate`, preserving order
pub fn filter<P>(records: Vec<PurchaseOrder>, predicate: P) -> Vec<PurchaseOrder>
where
    P: Fn(&PurchaseOrder) -> bool,
{
    records.into_iter().filter(|r| predicate(r)).collect()
}

fn compare(a: &PurchaseOrder, b: &PurchaseOrder, key: SortKey) -> Ordering {
    match key {
        SortKey::CreatedAt => a.created_at.cmp(&b.created_at),
        SortKey::Correlative => a.correlative.cmp(&b.correlative),
        SortKey::Value => a.value.cmp(&b.value),
        SortKey::Supplier => a.supplier.to_lowercase().cmp(&b.supplier.to_lowercase()),
        SortKey::Status => a.status.cmp(&b.status),
    }
}

/// Stable sort by `key`; ties keep their incoming order
pub fn sort(mut records: Vec<PurchaseOrder>, key: SortKey, direction: SortDirection) -> Vec<PurchaseOrder> {
    records.sort_by(|a, b| {
        let ordering = compare(a, b, key);
        match direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });
    records
}

impl RequestQuery {
    pub fn direction(&self) -> SortDirection {
        self.direction.unwrap_or(match self.sort {
            SortKey::CreatedAt => SortDirection::Desc,
            _ => SortDirection::Asc,
        })
    }

    pub fn matches(&self, record: &PurchaseOrder) -> bool {
        if let Some(status) = self.status {
            if record.status != status.as_str() {
                return false;
            }
        }

        if let Some(company) = non_blank(self.company.as_deref()) {
            if record.company != company {
                return false;
            }
        }

        if let Some(requester) = non_blank(self.requester.as_deref()) {
            if !record.requester_email.eq_ignore_ascii_case(requester) {
                return false;
            }
        }

        match non_blank(self.search.as_deref()) {
            Some(term) => {
                let term = term.to_lowercase();
                record.supplier.to_lowercase().contains(&term)
                    || record.glosa.to_lowercase().contains(&term)
                    || record.project_name.to_lowercase().contains(&term)
                    || record.correlative.to_string() == term.trim_start_matches('#')
            }
            None => true,
        }
    }

    /// Filter then sort
    pub fn apply(&self, records: Vec<PurchaseOrder>) -> Vec<PurchaseOrder> {
        let filtered = filter(records, |r| self.matches(r));
        sort(filtered, self.sort, self.direction())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn record(correlative: i64, supplier: &str, value: i64, status: RequestStatus, minutes: i64) -> PurchaseOrder {
        PurchaseOrder {
            id: Uuid::new_v4(),
            correlative,
            company: "FCH".to_string(),
            document_type: "factura".to_string(),
            supplier: supplier.to_string(),
            supplier_tax_id: "1-9".to_string(),
            project_id: Uuid::nil(),
            project_name: "Teatro".to_string(),
            sub_project: None,
            cost_center: "CC-1".to_string(),
            glosa: format!("Glosa {}", correlative),
            detail: None,
            value: Decimal::from(value),
            attachments: serde_json::json!([]),
            status: status.as_str().to_string(),
            erp_reference: None,
            requester_id: Uuid::nil(),
            requester_email: "ana@fch.cl".to_string(),
            created_at: (Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap() + Duration::minutes(minutes)).into(),
        }
    }

    fn records() -> Vec<PurchaseOrder> {
        vec![
            record(1, "beta", 300, RequestStatus::Submitted, 0),
            record(2, "Alfa", 100, RequestStatus::Processed, 10),
            record(3, "gamma", 200, RequestStatus::Submitted, 5),
        ]
    }

    fn correlatives(records: &[PurchaseOrder]) -> Vec<i64> {
        records.iter().map(|r| r.correlative).collect()
    }

    #[test]
    fn test_default_is_newest_first() {
        let sorted = RequestQuery::default().apply(records());
        assert_eq!(correlatives(&sorted), vec![2, 3, 1]);
    }

    #[test]
    fn test_sort_keys() {
        assert_eq!(correlatives(&sort(records(), SortKey::Value, SortDirection::Asc)), vec![2, 3, 1]);
        assert_eq!(correlatives(&sort(records(), SortKey::Supplier, SortDirection::Asc)), vec![2, 1, 3]);
        assert_eq!(correlatives(&sort(records(), SortKey::Correlative, SortDirection::Desc)), vec![3, 2, 1]);
    }

    #[test]
    fn test_sort_is_stable() {
        let sorted = sort(records(), SortKey::Status, SortDirection::Asc);
        // "enviada" < "procesada"; the two submitted records keep their order
        assert_eq!(correlatives(&sorted), vec![1, 3, 2]);
    }

    #[test]
    fn test_filter_by_status_and_search() {
        let query = RequestQuery {
            status: Some(RequestStatus::Submitted),
            ..Default::default()
        };
        assert_eq!(correlatives(&query.apply(records())), vec![3, 1]);

        let query = RequestQuery {
            search: Some("ALF".to_string()),
            ..Default::default()
        };
        assert_eq!(correlatives(&query.apply(records())), vec![2]);

        let query = RequestQuery {
            search: Some("#3".to_string()),
            ..Default::default()
        };
        assert_eq!(correlatives(&query.apply(records())), vec![3]);
    }

    #[test]
    fn test_filter_by_requester_ignores_case() {
        let query = RequestQuery {
            requester: Some("ANA@fch.cl".to_string()),
            company: Some("FCH".to_string()),
            ..Default::default()
        };
        assert_eq!(query.apply(records()).len(), 3);

        let query = RequestQuery {
            requester: Some("otro@fch.cl".to_string()),
            ..Default::default()
        };
        assert!(query.apply(records()).is_empty());
    }

    #[test]
    fn test_filter_helper() {
        let high = filter(records(), |r| r.value >= Decimal::from(200));
        assert_eq!(correlatives(&high), vec![1, 3]);
    }

    #[test]
    fn test_query_from_query_string() {
        let query: RequestQuery =
            serde_json::from_value(serde_json::json!({ "status": "en adquisiciones", "sort": "value" })).unwrap();
        assert_eq!(query.status, Some(RequestStatus::InProcurement));
        assert_eq!(query.sort, SortKey::Value);
        assert_eq!(query.direction(), SortDirection::Asc);
    }
}
