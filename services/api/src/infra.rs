use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::info;

use clearance::workflows::certificate::{
    Actor, Application, ApplicationId, ApplicationStore, AuthError, AuthProvider, BlobError,
    BlobStore, ClearanceNotice, Credentials, NotificationSink, NotifyError, Office,
    OverallStatus, PaymentError, PaymentGateway, QueueFilter, Role, Session, StoreError,
    StudentId,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Single-node store backing the service until the registry database lands.
/// Versions follow the optimistic-concurrency contract: set to 1 on insert,
/// bumped on every successful save.
#[derive(Default, Clone)]
pub(crate) struct InMemoryApplicationStore {
    records: Arc<Mutex<HashMap<ApplicationId, Application>>>,
}

impl ApplicationStore for InMemoryApplicationStore {
    fn insert(&self, mut application: Application) -> Result<Application, StoreError> {
        let mut guard = self.records.lock().map_err(poisoned)?;
        if guard.contains_key(&application.id) {
            return Err(StoreError::Duplicate);
        }
        application.version = 1;
        guard.insert(application.id.clone(), application.clone());
        Ok(application)
    }

    fn load(&self, id: &ApplicationId) -> Result<Option<Application>, StoreError> {
        let guard = self.records.lock().map_err(poisoned)?;
        Ok(guard.get(id).cloned())
    }

    fn save(
        &self,
        mut application: Application,
        expected_version: u64,
    ) -> Result<Application, StoreError> {
        let mut guard = self.records.lock().map_err(poisoned)?;
        let current = guard.get(&application.id).ok_or(StoreError::NotFound)?;
        if current.version != expected_version {
            return Err(StoreError::Conflict);
        }
        application.version = expected_version + 1;
        guard.insert(application.id.clone(), application.clone());
        Ok(application)
    }

    fn find_active_by_student(
        &self,
        student: &StudentId,
    ) -> Result<Option<Application>, StoreError> {
        let guard = self.records.lock().map_err(poisoned)?;
        Ok(guard
            .values()
            .filter(|application| {
                application.student_id == *student
                    && application.overall_status != OverallStatus::Rejected
            })
            .max_by_key(|application| application.created_at)
            .cloned())
    }

    fn query_by_office(
        &self,
        office: Office,
        filter: QueueFilter,
    ) -> Result<Vec<Application>, StoreError> {
        let guard = self.records.lock().map_err(poisoned)?;
        Ok(guard
            .values()
            .filter(|application| filter.matches(office, application))
            .cloned()
            .collect())
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> StoreError {
    StoreError::Unavailable("store mutex poisoned".to_string())
}

/// Notification sink that records notices and mirrors them to the log stream.
/// E-mail delivery hangs off this boundary once the SMTP relay is provisioned.
#[derive(Default, Clone)]
pub(crate) struct InMemoryNotificationSink {
    notices: Arc<Mutex<Vec<ClearanceNotice>>>,
}

impl InMemoryNotificationSink {
    pub(crate) fn notices(&self) -> Vec<ClearanceNotice> {
        self.notices
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl NotificationSink for InMemoryNotificationSink {
    fn publish(&self, notice: ClearanceNotice) -> Result<(), NotifyError> {
        info!(
            template = %notice.template,
            application = %notice.application_id,
            student = %notice.student_id,
            "clearance notice"
        );
        self.notices
            .lock()
            .map_err(|_| NotifyError::Transport("sink mutex poisoned".to_string()))?
            .push(notice);
        Ok(())
    }
}

/// Blob storage keeping uploads in process memory. References use the
/// `memblob://` scheme so stored payloads are visibly non-durable.
#[derive(Default, Clone)]
pub(crate) struct InMemoryBlobStore {
    blobs: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    sequence: Arc<AtomicU64>,
}

impl BlobStore for InMemoryBlobStore {
    fn store(&self, bytes: &[u8], content_type: &str) -> Result<String, BlobError> {
        let id = self.sequence.fetch_add(1, Ordering::Relaxed);
        let reference = format!("memblob://{id}");
        info!(%reference, content_type, size = bytes.len(), "blob stored");
        self.blobs
            .lock()
            .map_err(|_| BlobError::Unavailable("blob mutex poisoned".to_string()))?
            .insert(reference.clone(), bytes.to_vec());
        Ok(reference)
    }

    fn fetch(&self, reference: &str) -> Result<Vec<u8>, BlobError> {
        self.blobs
            .lock()
            .map_err(|_| BlobError::Unavailable("blob mutex poisoned".to_string()))?
            .get(reference)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(reference.to_string()))
    }
}

/// Gateway stand-in that only logs and hands back a deterministic redirect.
/// The real gateway reports outcomes through the payment callback route.
#[derive(Default, Clone)]
pub(crate) struct LoggingPaymentGateway;

impl PaymentGateway for LoggingPaymentGateway {
    fn initiate(&self, application: &ApplicationId, amount: u32) -> Result<String, PaymentError> {
        let redirect = format!("https://payments.example.edu/session/{application}?amount={amount}");
        info!(%application, amount, "payment session initiated");
        Ok(redirect)
    }
}

/// Fixed token-table provider for development deployments. Each entry maps a
/// username to a bearer token and an actor; the shared secret gates login.
#[derive(Default, Clone)]
pub(crate) struct StaticTokenAuthProvider {
    secret: String,
    sessions: HashMap<String, Session>,
}

impl StaticTokenAuthProvider {
    pub(crate) fn development() -> Self {
        let mut provider = Self {
            secret: "dev-secret".to_string(),
            sessions: HashMap::new(),
        };
        provider.register(
            "student",
            "dev-token-student",
            Actor {
                subject: "s-2021-0042".to_string(),
                role: Role::Student,
            },
        );
        for office in [
            Office::Faculty,
            Office::Library,
            Office::Accounts,
            Office::ExamController,
            Office::Registrar,
        ] {
            provider.register(
                office.label(),
                &format!("dev-token-{}", office.label()),
                Actor {
                    subject: format!("{office}-desk"),
                    role: Role::Office(office),
                },
            );
        }
        provider.register(
            "admin",
            "dev-token-admin",
            Actor {
                subject: "registry-admin".to_string(),
                role: Role::Administrator,
            },
        );
        provider
    }

    fn register(&mut self, user: &str, token: &str, actor: Actor) {
        self.sessions.insert(
            user.to_string(),
            Session {
                token: token.to_string(),
                actor,
            },
        );
    }
}

impl AuthProvider for StaticTokenAuthProvider {
    fn authenticate(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        if credentials.secret != self.secret {
            return Err(AuthError::InvalidCredentials);
        }
        self.sessions
            .get(&credentials.user)
            .cloned()
            .ok_or(AuthError::InvalidCredentials)
    }

    fn verify(&self, token: &str) -> Result<Actor, AuthError> {
        self.sessions
            .values()
            .find(|session| session.token == token)
            .map(|session| session.actor.clone())
            .ok_or(AuthError::InvalidToken)
    }
}
