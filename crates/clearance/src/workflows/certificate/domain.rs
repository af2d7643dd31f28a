use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for clearance applications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// External student reference, opaque to the workflow engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StudentId(pub String);

impl fmt::Display for StudentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reviewing party in the clearance chain. The set is fixed for this domain;
/// ordering is carried by [`OfficeChain`], never by this enum's declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Office {
    Faculty,
    Library,
    Accounts,
    ExamController,
    Registrar,
}

impl Office {
    pub const fn label(self) -> &'static str {
        match self {
            Office::Faculty => "faculty",
            Office::Library => "library",
            Office::Accounts => "accounts",
            Office::ExamController => "exam_controller",
            Office::Registrar => "registrar",
        }
    }
}

impl fmt::Display for Office {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown office '{0}'")]
pub struct UnknownOffice(pub String);

impl FromStr for Office {
    type Err = UnknownOffice;

    // Accepts the canonical snake_case label plus the camelCase spelling some
    // legacy dashboards put in URLs.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "faculty" => Ok(Office::Faculty),
            "library" => Ok(Office::Library),
            "accounts" => Ok(Office::Accounts),
            "exam_controller" | "exam-controller" | "examController" => Ok(Office::ExamController),
            "registrar" => Ok(Office::Registrar),
            other => Err(UnknownOffice(other.to_string())),
        }
    }
}

/// Explicit total order over the reviewing offices.
///
/// The institutional policy is configuration, not inference: faculty review
/// opens the chain and the registrar signs off last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfficeChain {
    offices: Vec<Office>,
}

impl OfficeChain {
    pub fn standard() -> Self {
        Self {
            offices: vec![
                Office::Faculty,
                Office::Library,
                Office::Accounts,
                Office::ExamController,
                Office::Registrar,
            ],
        }
    }

    pub fn offices(&self) -> &[Office] {
        &self.offices
    }

    pub fn position(&self, office: Office) -> Option<usize> {
        self.offices.iter().position(|entry| *entry == office)
    }
}

impl Default for OfficeChain {
    fn default() -> Self {
        Self::standard()
    }
}

/// Per-office decision state. `Approved` is terminal for the office within a
/// submission cycle; only a resubmission returns a record to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClearanceDecision {
    Pending,
    Approved,
    Rejected,
}

impl ClearanceDecision {
    pub const fn label(self) -> &'static str {
        match self {
            ClearanceDecision::Pending => "pending",
            ClearanceDecision::Approved => "approved",
            ClearanceDecision::Rejected => "rejected",
        }
    }
}

/// Decision an office is allowed to submit. `Pending` is deliberately not
/// representable here; offices cannot un-decide outside of a resubmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfficeDecision {
    Approved,
    Rejected,
}

/// One office's decision on one application.
///
/// Invariant: `decided_at` is present iff `decision != Pending`, and a
/// `Rejected` record always carries a non-empty `message`. The engine is the
/// only writer, so the invariant is maintained there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearanceRecord {
    pub office: Office,
    pub decision: ClearanceDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
}

impl ClearanceRecord {
    pub fn pending(office: Office) -> Self {
        Self {
            office,
            decision: ClearanceDecision::Pending,
            message: None,
            decided_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.decision == ClearanceDecision::Pending
    }
}

/// Whether the application fee has been confirmed by the payment gateway.
/// Orthogonal to clearance: status derivation never reads this field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
}

impl PaymentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Paid => "paid",
        }
    }
}

/// Aggregate status derived from the full set of clearance records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Pending,
    InProgress,
    Approved,
    Rejected,
}

impl OverallStatus {
    pub const fn label(self) -> &'static str {
        match self {
            OverallStatus::Pending => "pending",
            OverallStatus::InProgress => "in_progress",
            OverallStatus::Approved => "approved",
            OverallStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Student-submitted form fields. The engine stores and returns these but
/// never branches on their values; certificate references point into the blob
/// store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationPayload {
    pub student_name: String,
    pub program: String,
    pub batch: String,
    pub campus: String,
    pub mobile: String,
    pub email: String,
    pub date_of_birth: NaiveDate,
    pub last_semester: String,
    pub passing_year: u16,
    pub credit_completed: u16,
    pub credit_waived: u16,
    pub application_type: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssc_certificate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hsc_certificate: Option<String>,
    pub payment_amount: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
}

/// Inbound creation request pairing the owning student with the form payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationSubmission {
    pub student_id: StudentId,
    pub payload: ApplicationPayload,
}

/// Aggregate root for one certificate application.
///
/// `clearance` holds exactly one record per configured office, stored in chain
/// order so that the first pending entry is always the current pending office.
/// `version` backs the store's optimistic concurrency check and is bumped by
/// the store on every save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub student_id: StudentId,
    pub payload: ApplicationPayload,
    pub payment_status: PaymentStatus,
    pub clearance: Vec<ClearanceRecord>,
    pub overall_status: OverallStatus,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Application {
    pub fn record(&self, office: Office) -> Option<&ClearanceRecord> {
        self.clearance.iter().find(|record| record.office == office)
    }

    pub(crate) fn record_mut(&mut self, office: Office) -> Option<&mut ClearanceRecord> {
        self.clearance
            .iter_mut()
            .find(|record| record.office == office)
    }

    /// First office (in chain order) still waiting to decide. Absent once the
    /// application is overall approved or rejected.
    pub fn current_pending_office(&self) -> Option<Office> {
        match self.overall_status {
            OverallStatus::Approved | OverallStatus::Rejected => None,
            OverallStatus::Pending | OverallStatus::InProgress => self
                .clearance
                .iter()
                .find(|record| record.is_pending())
                .map(|record| record.office),
        }
    }

    pub fn status_view(&self) -> ApplicationStatusView {
        ApplicationStatusView {
            application_id: self.id.clone(),
            student_id: self.student_id.clone(),
            status: self.overall_status.label(),
            payment: self.payment_status.label(),
            awaiting: self.current_pending_office().map(Office::label),
            clearance: self
                .clearance
                .iter()
                .map(|record| ClearanceRecordView {
                    office: record.office.label(),
                    decision: record.decision.label(),
                    message: record.message.clone(),
                    decided_at: record.decided_at,
                })
                .collect(),
            updated_at: self.updated_at,
        }
    }
}

/// Compact projection used by office queue listings.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationStatusView {
    pub application_id: ApplicationId,
    pub student_id: StudentId,
    pub status: &'static str,
    pub payment: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub awaiting: Option<&'static str>,
    pub clearance: Vec<ClearanceRecordView>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClearanceRecordView {
    pub office: &'static str,
    pub decision: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
}
