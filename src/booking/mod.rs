//! Scheduling core: time blocks, the request/appointment state machine and
//! the treatment-plan ledger.

pub mod datetime;
pub mod ledger;
pub mod phone;
pub mod service;
pub mod slots;

use thiserror::Error;
use uuid::Uuid;

pub use datetime::{Clock, FixedOffsetClock, SlotDateTime};
pub use service::BookingService;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Policy violation: {0}")]
    Policy(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl BookingError {
    pub fn validation(msg: impl Into<String>) -> Self {
        BookingError::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        BookingError::Conflict(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        BookingError::NotFound(msg.into())
    }

    pub fn policy(msg: impl Into<String>) -> Self {
        BookingError::Policy(msg.into())
    }
}

impl From<sqlx::Error> for BookingError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                BookingError::Conflict(format!("unique constraint violated: {}", db.message()))
            }
            sqlx::Error::RowNotFound => BookingError::NotFound("row not found".into()),
            _ => BookingError::Storage(format!("db error: {e}")),
        }
    }
}

pub type BookingResult<T> = Result<T, BookingError>;

/// Who is calling into the core. Only the staff flag affects booking rules;
/// the group id is stamped on created rows for external scoping.
#[derive(Debug, Clone, Copy, Default)]
pub struct Caller {
    pub is_staff: bool,
    pub user_id: Option<Uuid>,
    pub clinic_group_id: Option<Uuid>,
}

impl Caller {
    pub fn public() -> Self {
        Self::default()
    }

    pub fn staff(user_id: Uuid, clinic_group_id: Option<Uuid>) -> Self {
        Self {
            is_staff: true,
            user_id: Some(user_id),
            clinic_group_id,
        }
    }
}

/// Clinic-group filter applied by listing repositories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupScope {
    #[default]
    All,
    Group(Uuid),
}

impl GroupScope {
    pub fn within_group(group: Option<Uuid>) -> Self {
        match group {
            Some(id) => GroupScope::Group(id),
            None => GroupScope::All,
        }
    }

    pub fn admits(&self, group: Option<Uuid>) -> bool {
        match self {
            GroupScope::All => true,
            GroupScope::Group(id) => group == Some(*id),
        }
    }

    pub fn group_id(&self) -> Option<Uuid> {
        match self {
            GroupScope::All => None,
            GroupScope::Group(id) => Some(*id),
        }
    }
}
