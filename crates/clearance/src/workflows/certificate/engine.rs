use chrono::{DateTime, Utc};

use super::domain::{
    Application, ApplicationId, ApplicationPayload, ClearanceDecision, ClearanceRecord, Office,
    OfficeChain, OfficeDecision, OverallStatus, PaymentStatus, StudentId,
};

/// Failures raised while validating a clearance mutation. Every variant leaves
/// the stored application untouched; the engine validates before it applies.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ClearanceError {
    #[error("a rejection requires a non-empty message")]
    EmptyRejectionMessage,
    #[error("{office} cannot decide while {waiting_on} has not approved")]
    OutOfSequence { office: Office, waiting_on: Office },
    #[error("{office} has already recorded a decision for this submission")]
    AlreadyDecided { office: Office },
    #[error("only a rejected application can be resubmitted (currently {status})")]
    NotRejected { status: OverallStatus },
    #[error("{office} is not part of the configured clearance chain")]
    NotInChain { office: Office },
}

/// Sole authority for mutating clearance state and deriving aggregate status.
///
/// The engine is pure over `Application` values: callers load, hand the value
/// in, and persist the result. `now` is always passed in so behavior is
/// deterministic under test.
#[derive(Debug, Clone)]
pub struct WorkflowEngine {
    chain: OfficeChain,
}

impl WorkflowEngine {
    pub fn new(chain: OfficeChain) -> Self {
        Self { chain }
    }

    pub fn standard() -> Self {
        Self::new(OfficeChain::standard())
    }

    pub fn chain(&self) -> &OfficeChain {
        &self.chain
    }

    /// Build a fresh application with every office pending and payment unpaid.
    pub fn create_application(
        &self,
        id: ApplicationId,
        student_id: StudentId,
        payload: ApplicationPayload,
        now: DateTime<Utc>,
    ) -> Application {
        Application {
            id,
            student_id,
            payload,
            payment_status: PaymentStatus::Unpaid,
            clearance: self
                .chain
                .offices()
                .iter()
                .map(|office| ClearanceRecord::pending(*office))
                .collect(),
            overall_status: OverallStatus::Pending,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record an office's decision, enforcing the chain order and the
    /// no-silent-overwrite rule, then recompute the aggregate status.
    pub fn apply_decision(
        &self,
        application: &mut Application,
        office: Office,
        decision: OfficeDecision,
        message: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), ClearanceError> {
        let message = message.map(str::trim).filter(|text| !text.is_empty());

        // Validate everything up front; no partial writes on failure.
        let Some(position) = self.chain.position(office) else {
            return Err(ClearanceError::NotInChain { office });
        };
        let Some(record) = application.record(office) else {
            return Err(ClearanceError::NotInChain { office });
        };
        if !record.is_pending() {
            return Err(ClearanceError::AlreadyDecided { office });
        }

        let waiting_on = self.chain.offices()[..position]
            .iter()
            .copied()
            .find(|predecessor| {
                application
                    .record(*predecessor)
                    .map(|entry| entry.decision != ClearanceDecision::Approved)
                    .unwrap_or(true)
            });
        if let Some(waiting_on) = waiting_on {
            return Err(ClearanceError::OutOfSequence { office, waiting_on });
        }

        if decision == OfficeDecision::Rejected && message.is_none() {
            return Err(ClearanceError::EmptyRejectionMessage);
        }

        let message = message.map(str::to_string);
        let Some(record) = application.record_mut(office) else {
            return Err(ClearanceError::NotInChain { office });
        };
        record.decision = match decision {
            OfficeDecision::Approved => ClearanceDecision::Approved,
            OfficeDecision::Rejected => ClearanceDecision::Rejected,
        };
        record.message = message;
        record.decided_at = Some(now);

        application.overall_status = self.derive_status(application);
        application.updated_at = now;
        Ok(())
    }

    /// Reset a rejected application for another pass through the chain.
    /// Every record returns to pending and payment must be re-verified.
    pub fn resubmit(
        &self,
        application: &mut Application,
        payload: ApplicationPayload,
        now: DateTime<Utc>,
    ) -> Result<(), ClearanceError> {
        if application.overall_status != OverallStatus::Rejected {
            return Err(ClearanceError::NotRejected {
                status: application.overall_status,
            });
        }

        application.payload = payload;
        for record in &mut application.clearance {
            record.decision = ClearanceDecision::Pending;
            record.message = None;
            record.decided_at = None;
        }
        application.payment_status = PaymentStatus::Unpaid;
        application.overall_status = OverallStatus::Pending;
        application.updated_at = now;
        Ok(())
    }

    /// Payment confirmation from the gateway callback. Does not touch the
    /// derived overall status; payment is an independent gate.
    pub fn mark_paid(&self, application: &mut Application, now: DateTime<Utc>) {
        application.payment_status = PaymentStatus::Paid;
        application.updated_at = now;
    }

    pub fn mark_payment_failed(&self, application: &mut Application, now: DateTime<Utc>) {
        application.payment_status = PaymentStatus::Unpaid;
        application.updated_at = now;
    }

    /// Aggregate status over the full record set: any rejection wins, then
    /// unanimous approval, then untouched, otherwise in progress.
    pub fn derive_status(&self, application: &Application) -> OverallStatus {
        let records = &application.clearance;
        if records
            .iter()
            .any(|record| record.decision == ClearanceDecision::Rejected)
        {
            OverallStatus::Rejected
        } else if records
            .iter()
            .all(|record| record.decision == ClearanceDecision::Approved)
        {
            OverallStatus::Approved
        } else if records.iter().all(ClearanceRecord::is_pending) {
            OverallStatus::Pending
        } else {
            OverallStatus::InProgress
        }
    }
}

impl Default for WorkflowEngine {
    fn default() -> Self {
        Self::standard()
    }
}
