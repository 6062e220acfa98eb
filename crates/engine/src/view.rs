//! Request and response shapes exchanged with controllers.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use txflow_storage::{HistoryRecord, StatusId, StatusRecord, TransactionRecord, TransitionRecord};
use uuid::Uuid;

use crate::error::EngineError;

const CUSTOMER_ID_MAX: usize = 100;
const DESCRIPTION_MAX: usize = 500;
const REASON_MAX: usize = 500;
const CHANGED_BY_MAX: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusInfo {
    pub id: StatusId,
    pub name: String,
    pub description: Option<String>,
    pub is_initial: bool,
    pub is_final: bool,
}

impl From<&StatusRecord> for StatusInfo {
    fn from(status: &StatusRecord) -> Self {
        Self {
            id: status.id,
            name: status.name.clone(),
            description: status.description.clone(),
            is_initial: status.is_initial,
            is_final: status.is_final,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionView {
    pub id: Uuid,
    pub reference_number: String,
    pub status: StatusInfo,
    pub amount: Decimal,
    pub currency: String,
    pub customer_id: String,
    pub description: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub version: i64,
}

impl TransactionView {
    pub fn new(record: TransactionRecord, status: StatusInfo) -> Self {
        Self {
            id: record.id,
            reference_number: record.reference_number,
            status,
            amount: record.amount,
            currency: record.currency,
            customer_id: record.customer_id,
            description: record.description,
            created_at: record.created_at,
            updated_at: record.updated_at,
            version: record.version,
        }
    }
}

/// A transaction with its full history, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionDetail {
    #[serde(flatten)]
    pub transaction: TransactionView,
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableTransition {
    pub id: i32,
    pub to_status_id: StatusId,
    pub to_status_name: String,
    pub transition_name: String,
    pub description: Option<String>,
    pub requires_comment: bool,
    pub is_rollback: bool,
}

impl From<&TransitionRecord> for AvailableTransition {
    fn from(edge: &TransitionRecord) -> Self {
        Self {
            id: edge.id,
            to_status_id: edge.to_status_id,
            to_status_name: edge.to_status_name.clone(),
            transition_name: edge.name.clone(),
            description: edge.description.clone(),
            requires_comment: edge.requires_comment,
            is_rollback: edge.is_rollback,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub from_status: StatusInfo,
    pub to_status: StatusInfo,
    pub reason: Option<String>,
    pub changed_by: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl HistoryEntry {
    pub fn new(record: HistoryRecord, from_status: StatusInfo, to_status: StatusInfo) -> Self {
        Self {
            id: record.id,
            from_status,
            to_status,
            reason: record.comment,
            changed_by: record.changed_by,
            timestamp: record.changed_at,
        }
    }
}

/// Input for `create_transaction`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub amount: Decimal,
    pub currency: String,
    pub customer_id: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl NewTransaction {
    /// Check and canonicalise the input: currency upper-cased, customer id
    /// trimmed, amount carried at two decimal places.
    pub fn normalized(self) -> Result<Self, EngineError> {
        if self.amount <= Decimal::ZERO {
            return Err(EngineError::InvalidInput(
                "amount must be greater than zero".to_string(),
            ));
        }
        if self.amount.scale() > 2 {
            return Err(EngineError::InvalidInput(
                "amount must have at most 2 decimal places".to_string(),
            ));
        }
        let mut amount = self.amount;
        amount.rescale(2);

        let currency = self.currency.trim().to_ascii_uppercase();
        if currency.len() != 3 || !currency.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(EngineError::InvalidInput(format!(
                "currency must be a 3-letter code, got '{}'",
                self.currency
            )));
        }

        let customer_id = self.customer_id.trim().to_string();
        if customer_id.is_empty() {
            return Err(EngineError::InvalidInput(
                "customer_id is required".to_string(),
            ));
        }
        if customer_id.chars().count() > CUSTOMER_ID_MAX {
            return Err(EngineError::InvalidInput(format!(
                "customer_id must be at most {CUSTOMER_ID_MAX} characters"
            )));
        }

        let description = self
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        if description
            .as_ref()
            .is_some_and(|d| d.chars().count() > DESCRIPTION_MAX)
        {
            return Err(EngineError::InvalidInput(format!(
                "description must be at most {DESCRIPTION_MAX} characters"
            )));
        }

        Ok(Self {
            amount,
            currency,
            customer_id,
            description,
        })
    }
}

/// Input for `request_transition`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub to_status_id: StatusId,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub changed_by: Option<String>,
    /// Overrides the engine's default store deadline for this request.
    #[serde(skip)]
    pub deadline: Option<Duration>,
}

impl TransitionRequest {
    pub fn to(to_status_id: StatusId) -> Self {
        Self {
            to_status_id,
            reason: None,
            changed_by: None,
            deadline: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_changed_by(mut self, changed_by: impl Into<String>) -> Self {
        self.changed_by = Some(changed_by.into());
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Trimmed reason; blank counts as absent.
    pub(crate) fn normalized_reason(&self) -> Result<Option<String>, EngineError> {
        let reason = trimmed(self.reason.as_deref());
        if reason.as_ref().is_some_and(|r| r.chars().count() > REASON_MAX) {
            return Err(EngineError::InvalidInput(format!(
                "reason must be at most {REASON_MAX} characters"
            )));
        }
        Ok(reason)
    }

    pub(crate) fn normalized_changed_by(&self) -> Result<Option<String>, EngineError> {
        let changed_by = trimmed(self.changed_by.as_deref());
        if changed_by
            .as_ref()
            .is_some_and(|c| c.chars().count() > CHANGED_BY_MAX)
        {
            return Err(EngineError::InvalidInput(format!(
                "changed_by must be at most {CHANGED_BY_MAX} characters"
            )));
        }
        Ok(changed_by)
    }
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
