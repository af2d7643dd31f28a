//! Certificate clearance application workflow.
//!
//! A student submits one application per cycle; a fixed chain of institutional
//! offices then clears it in order. Any office can reject (with a reason),
//! which short-circuits the whole application to `Rejected` until the student
//! resubmits. The engine in this module is the only writer of the derived
//! overall status; dashboards consume it read-only.

pub mod auth;
pub mod domain;
pub(crate) mod engine;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use auth::{Actor, AuthError, AuthProvider, Credentials, Role, Session};
pub use domain::{
    Application, ApplicationId, ApplicationPayload, ApplicationStatusView, ApplicationSubmission,
    ClearanceDecision, ClearanceRecord, ClearanceRecordView, Office, OfficeChain, OfficeDecision,
    OverallStatus, PaymentStatus, StudentId, UnknownOffice,
};
pub use engine::{ClearanceError, WorkflowEngine};
pub use repository::{
    ApplicationStore, BlobError, BlobStore, ClearanceNotice, NotificationSink, NotifyError,
    PaymentError, PaymentGateway, QueueFilter, StoreError,
};
pub use router::certificate_router;
pub use service::{CertificateClearanceService, CertificateServiceError};
