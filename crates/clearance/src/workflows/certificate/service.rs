use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use super::auth::{Actor, Role};
use super::domain::{
    Application, ApplicationId, ApplicationPayload, ApplicationSubmission, Office, OfficeDecision,
    OverallStatus, StudentId,
};
use super::engine::{ClearanceError, WorkflowEngine};
use super::repository::{
    ApplicationStore, ClearanceNotice, NotificationSink, PaymentError, PaymentGateway, QueueFilter,
    StoreError,
};

/// Role-scoped facade composing the workflow engine with the store and the
/// outbound collaborators. This is the only mutation path into clearance
/// state; dashboards never write records directly.
pub struct CertificateClearanceService<S, N, P> {
    engine: WorkflowEngine,
    store: Arc<S>,
    notices: Arc<N>,
    payments: Arc<P>,
}

static APPLICATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_application_id() -> ApplicationId {
    let id = APPLICATION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ApplicationId(format!("cert-{id:06}"))
}

impl<S, N, P> CertificateClearanceService<S, N, P>
where
    S: ApplicationStore + 'static,
    N: NotificationSink + 'static,
    P: PaymentGateway + 'static,
{
    pub fn new(store: Arc<S>, notices: Arc<N>, payments: Arc<P>) -> Self {
        Self::with_engine(WorkflowEngine::standard(), store, notices, payments)
    }

    pub fn with_engine(
        engine: WorkflowEngine,
        store: Arc<S>,
        notices: Arc<N>,
        payments: Arc<P>,
    ) -> Self {
        Self {
            engine,
            store,
            notices,
            payments,
        }
    }

    pub fn engine(&self) -> &WorkflowEngine {
        &self.engine
    }

    /// Create a new application for the calling student. At most one
    /// application per student may be live at a time; only a rejected one
    /// frees the slot.
    pub fn submit(
        &self,
        actor: &Actor,
        submission: ApplicationSubmission,
    ) -> Result<Application, CertificateServiceError> {
        self.ensure_student(actor, &submission.student_id, "create an application")?;

        if let Some(existing) = self.store.find_active_by_student(&submission.student_id)? {
            return Err(CertificateServiceError::ActiveApplicationExists {
                id: existing.id,
            });
        }

        let application = self.engine.create_application(
            next_application_id(),
            submission.student_id,
            submission.payload,
            Utc::now(),
        );
        let stored = self.store.insert(application)?;
        info!(application = %stored.id, student = %stored.student_id, "application created");
        Ok(stored)
    }

    /// Record an approval or rejection for `office`. The caller must be
    /// authenticated as exactly that office.
    pub fn record_decision(
        &self,
        actor: &Actor,
        id: &ApplicationId,
        office: Office,
        decision: OfficeDecision,
        message: Option<&str>,
    ) -> Result<Application, CertificateServiceError> {
        if actor.role != Role::Office(office) {
            return Err(CertificateServiceError::Forbidden {
                detail: format!("caller may not decide on behalf of {office}"),
            });
        }

        let mut application = self.load(id)?;
        let loaded_version = application.version;
        self.engine
            .apply_decision(&mut application, office, decision, message, Utc::now())?;
        let stored = self.store.save(application, loaded_version)?;

        info!(
            application = %stored.id,
            office = %office,
            status = %stored.overall_status,
            "clearance decision recorded"
        );

        if decision == OfficeDecision::Rejected {
            let mut details = BTreeMap::new();
            details.insert("office".to_string(), office.label().to_string());
            if let Some(record) = stored.record(office) {
                if let Some(message) = &record.message {
                    details.insert("message".to_string(), message.clone());
                }
            }
            self.notify("application_rejected", &stored, details);
        } else if stored.overall_status == OverallStatus::Approved {
            self.notify("clearance_complete", &stored, BTreeMap::new());
        }

        Ok(stored)
    }

    /// Replace the payload of a rejected application and reset every office
    /// record for a fresh pass through the chain.
    pub fn resubmit(
        &self,
        actor: &Actor,
        id: &ApplicationId,
        payload: ApplicationPayload,
    ) -> Result<Application, CertificateServiceError> {
        let mut application = self.load(id)?;
        self.ensure_student(actor, &application.student_id, "resubmit the application")?;

        let loaded_version = application.version;
        self.engine
            .resubmit(&mut application, payload, Utc::now())?;
        let stored = self.store.save(application, loaded_version)?;
        info!(application = %stored.id, "application resubmitted");
        Ok(stored)
    }

    /// Gateway callback path; the only writer of `payment_status`.
    pub fn payment_result(
        &self,
        id: &ApplicationId,
        success: bool,
    ) -> Result<Application, CertificateServiceError> {
        let mut application = self.load(id)?;
        let loaded_version = application.version;
        if success {
            self.engine.mark_paid(&mut application, Utc::now());
        } else {
            self.engine.mark_payment_failed(&mut application, Utc::now());
        }
        let stored = self.store.save(application, loaded_version)?;
        info!(application = %stored.id, paid = success, "payment result applied");
        Ok(stored)
    }

    /// Start a payment session for the calling student's own application.
    pub fn initiate_payment(
        &self,
        actor: &Actor,
        id: &ApplicationId,
    ) -> Result<String, CertificateServiceError> {
        let application = self.load(id)?;
        self.ensure_student(actor, &application.student_id, "pay for the application")?;
        let redirect = self
            .payments
            .initiate(&application.id, application.payload.payment_amount)?;
        Ok(redirect)
    }

    /// Read-only projection. Students see only their own application; office
    /// and administrator roles may inspect any.
    pub fn status(
        &self,
        actor: &Actor,
        id: &ApplicationId,
    ) -> Result<Application, CertificateServiceError> {
        let application = self.load(id)?;
        if actor.role == Role::Student && actor.subject != application.student_id.0 {
            return Err(CertificateServiceError::Forbidden {
                detail: "students may only view their own application".to_string(),
            });
        }
        Ok(application)
    }

    /// List applications for an office dashboard. Restricted to that office
    /// and to administrators.
    pub fn queue(
        &self,
        actor: &Actor,
        office: Office,
        filter: QueueFilter,
    ) -> Result<Vec<Application>, CertificateServiceError> {
        let allowed = matches!(actor.role, Role::Administrator)
            || actor.role == Role::Office(office);
        if !allowed {
            return Err(CertificateServiceError::Forbidden {
                detail: format!("caller may not list the {office} queue"),
            });
        }
        Ok(self.store.query_by_office(office, filter)?)
    }

    fn load(&self, id: &ApplicationId) -> Result<Application, CertificateServiceError> {
        self.store
            .load(id)?
            .ok_or(CertificateServiceError::Store(StoreError::NotFound))
    }

    fn ensure_student(
        &self,
        actor: &Actor,
        student: &StudentId,
        action: &str,
    ) -> Result<(), CertificateServiceError> {
        if actor.role == Role::Student && actor.subject == student.0 {
            return Ok(());
        }
        Err(CertificateServiceError::Forbidden {
            detail: format!("only the owning student may {action}"),
        })
    }

    /// Best-effort delivery: the decision is already persisted by the time a
    /// notice goes out, so a sink failure must not fail the operation.
    fn notify(&self, template: &str, application: &Application, details: BTreeMap<String, String>) {
        let notice = ClearanceNotice {
            template: template.to_string(),
            application_id: application.id.clone(),
            student_id: application.student_id.clone(),
            details,
        };
        if let Err(error) = self.notices.publish(notice) {
            warn!(application = %application.id, template, %error, "notice delivery failed");
        }
    }
}

/// Error raised by the clearance service.
#[derive(Debug, thiserror::Error)]
pub enum CertificateServiceError {
    #[error(transparent)]
    Clearance(#[from] ClearanceError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Payment(#[from] PaymentError),
    #[error("student already has an active application {id}")]
    ActiveApplicationExists { id: ApplicationId },
    #[error("forbidden: {detail}")]
    Forbidden { detail: String },
}
