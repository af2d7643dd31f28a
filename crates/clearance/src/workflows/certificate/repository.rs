use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::domain::{Application, ApplicationId, ClearanceDecision, Office, StudentId};

/// Persistence abstraction so the service layer can be exercised in isolation.
///
/// `save` implements optimistic concurrency: the caller passes the version it
/// loaded, and the store rejects the write with [`StoreError::Conflict`] if a
/// concurrent writer got there first. The store bumps the version on success.
pub trait ApplicationStore: Send + Sync {
    fn insert(&self, application: Application) -> Result<Application, StoreError>;
    fn load(&self, id: &ApplicationId) -> Result<Option<Application>, StoreError>;
    fn save(&self, application: Application, expected_version: u64)
        -> Result<Application, StoreError>;
    /// Latest application for the student whose overall status is not
    /// `Rejected`, if any. Backs the one-active-application rule.
    fn find_active_by_student(&self, student: &StudentId)
        -> Result<Option<Application>, StoreError>;
    fn query_by_office(
        &self,
        office: Office,
        filter: QueueFilter,
    ) -> Result<Vec<Application>, StoreError>;
}

/// Error enumeration for store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("application already exists")]
    Duplicate,
    #[error("stored version does not match the expected version")]
    Conflict,
    #[error("application not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Narrowing applied to office queue listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueFilter {
    /// Every application that carries a record for the office.
    #[default]
    All,
    /// Applications where the office is the current pending step.
    AwaitingDecision,
    /// Applications the office has already decided this cycle.
    Decided,
}

impl QueueFilter {
    pub fn matches(self, office: Office, application: &Application) -> bool {
        match self {
            QueueFilter::All => application.record(office).is_some(),
            QueueFilter::AwaitingDecision => {
                application.current_pending_office() == Some(office)
            }
            QueueFilter::Decided => application
                .record(office)
                .map(|record| record.decision != ClearanceDecision::Pending)
                .unwrap_or(false),
        }
    }
}

/// Outbound student notification hook (e-mail, dashboard toast, etc.).
pub trait NotificationSink: Send + Sync {
    fn publish(&self, notice: ClearanceNotice) -> Result<(), NotifyError>;
}

/// Notice payload so routes and tests can assert integration boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearanceNotice {
    pub template: String,
    pub application_id: ApplicationId,
    pub student_id: StudentId,
    pub details: BTreeMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Payment gateway boundary. Initiation returns a redirect URL; the gateway
/// later reports the outcome through the payment callback route.
pub trait PaymentGateway: Send + Sync {
    fn initiate(&self, application: &ApplicationId, amount: u32) -> Result<String, PaymentError>;
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("payment gateway unavailable: {0}")]
    Unavailable(String),
}

/// Opaque blob storage for uploaded certificates and signatures. The workflow
/// keeps only the returned reference on the application payload.
pub trait BlobStore: Send + Sync {
    fn store(&self, bytes: &[u8], content_type: &str) -> Result<String, BlobError>;
    fn fetch(&self, reference: &str) -> Result<Vec<u8>, BlobError>;
}

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("blob not found: {0}")]
    NotFound(String),
    #[error("blob store unavailable: {0}")]
    Unavailable(String),
}
