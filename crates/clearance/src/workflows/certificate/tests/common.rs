use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::NaiveDate;
use serde_json::Value;

use crate::workflows::certificate::auth::{
    Actor, AuthError, AuthProvider, Credentials, Role, Session,
};
use crate::workflows::certificate::domain::{
    Application, ApplicationId, ApplicationPayload, ApplicationSubmission, Office, OfficeDecision,
    OverallStatus, StudentId,
};
use crate::workflows::certificate::repository::{
    ApplicationStore, ClearanceNotice, NotificationSink, NotifyError, PaymentError, PaymentGateway,
    QueueFilter, StoreError,
};
use crate::workflows::certificate::router::certificate_router;
use crate::workflows::certificate::service::CertificateClearanceService;

pub(super) const STUDENT: &str = "s-2021-0042";
pub(super) const PASSPHRASE: &str = "passphrase";

pub(super) fn payload() -> ApplicationPayload {
    ApplicationPayload {
        student_name: "Nusrat Jahan".to_string(),
        program: "BSc in CSE".to_string(),
        batch: "49".to_string(),
        campus: "Permanent Campus".to_string(),
        mobile: "+8801700000000".to_string(),
        email: "nusrat@example.edu".to_string(),
        date_of_birth: NaiveDate::from_ymd_opt(1999, 4, 12).expect("valid date"),
        last_semester: "Fall 2024".to_string(),
        passing_year: 2025,
        credit_completed: 148,
        credit_waived: 0,
        application_type: 1,
        ssc_certificate: Some("memblob://ssc-0042".to_string()),
        hsc_certificate: Some("memblob://hsc-0042".to_string()),
        payment_amount: 2500,
        remarks: None,
    }
}

pub(super) fn submission() -> ApplicationSubmission {
    submission_for(STUDENT)
}

pub(super) fn submission_for(student: &str) -> ApplicationSubmission {
    ApplicationSubmission {
        student_id: StudentId(student.to_string()),
        payload: payload(),
    }
}

pub(super) fn student_actor(subject: &str) -> Actor {
    Actor {
        subject: subject.to_string(),
        role: Role::Student,
    }
}

pub(super) fn office_actor(office: Office) -> Actor {
    Actor {
        subject: format!("{office}-desk"),
        role: Role::Office(office),
    }
}

pub(super) fn admin_actor() -> Actor {
    Actor {
        subject: "registry-admin".to_string(),
        role: Role::Administrator,
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryStore {
    records: Arc<Mutex<HashMap<ApplicationId, Application>>>,
}

impl ApplicationStore for MemoryStore {
    fn insert(&self, mut application: Application) -> Result<Application, StoreError> {
        let mut guard = self.records.lock().expect("store mutex poisoned");
        if guard.contains_key(&application.id) {
            return Err(StoreError::Duplicate);
        }
        application.version = 1;
        guard.insert(application.id.clone(), application.clone());
        Ok(application)
    }

    fn load(&self, id: &ApplicationId) -> Result<Option<Application>, StoreError> {
        let guard = self.records.lock().expect("store mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn save(
        &self,
        mut application: Application,
        expected_version: u64,
    ) -> Result<Application, StoreError> {
        let mut guard = self.records.lock().expect("store mutex poisoned");
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
        let guard = self.records.lock().expect("store mutex poisoned");
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
        let guard = self.records.lock().expect("store mutex poisoned");
        Ok(guard
            .values()
            .filter(|application| filter.matches(office, application))
            .cloned()
            .collect())
    }
}

/// Store whose saves always lose the optimistic-version race.
pub(super) struct ConflictOnSaveStore {
    pub(super) inner: MemoryStore,
}

impl ApplicationStore for ConflictOnSaveStore {
    fn insert(&self, application: Application) -> Result<Application, StoreError> {
        self.inner.insert(application)
    }

    fn load(&self, id: &ApplicationId) -> Result<Option<Application>, StoreError> {
        self.inner.load(id)
    }

    fn save(&self, _application: Application, _expected: u64) -> Result<Application, StoreError> {
        Err(StoreError::Conflict)
    }

    fn find_active_by_student(
        &self,
        student: &StudentId,
    ) -> Result<Option<Application>, StoreError> {
        self.inner.find_active_by_student(student)
    }

    fn query_by_office(
        &self,
        office: Office,
        filter: QueueFilter,
    ) -> Result<Vec<Application>, StoreError> {
        self.inner.query_by_office(office, filter)
    }
}

pub(super) struct UnavailableStore;

impl ApplicationStore for UnavailableStore {
    fn insert(&self, _application: Application) -> Result<Application, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn load(&self, _id: &ApplicationId) -> Result<Option<Application>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn save(&self, _application: Application, _expected: u64) -> Result<Application, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn find_active_by_student(
        &self,
        _student: &StudentId,
    ) -> Result<Option<Application>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn query_by_office(
        &self,
        _office: Office,
        _filter: QueueFilter,
    ) -> Result<Vec<Application>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }
}

#[derive(Default, Clone)]
pub(super) struct MemorySink {
    notices: Arc<Mutex<Vec<ClearanceNotice>>>,
}

impl MemorySink {
    pub(super) fn notices(&self) -> Vec<ClearanceNotice> {
        self.notices.lock().expect("sink mutex poisoned").clone()
    }
}

impl NotificationSink for MemorySink {
    fn publish(&self, notice: ClearanceNotice) -> Result<(), NotifyError> {
        self.notices
            .lock()
            .expect("sink mutex poisoned")
            .push(notice);
        Ok(())
    }
}

/// Sink whose transport is permanently down.
pub(super) struct FailingSink;

impl NotificationSink for FailingSink {
    fn publish(&self, _notice: ClearanceNotice) -> Result<(), NotifyError> {
        Err(NotifyError::Transport("relay offline".to_string()))
    }
}

#[derive(Default, Clone)]
pub(super) struct FakeGateway;

impl PaymentGateway for FakeGateway {
    fn initiate(&self, application: &ApplicationId, amount: u32) -> Result<String, PaymentError> {
        Ok(format!("https://pay.test/session/{application}?amount={amount}"))
    }
}

/// Token-table auth provider: token `tok-<name>` maps to a fixed actor.
#[derive(Default, Clone)]
pub(super) struct StaticAuth {
    actors: HashMap<String, Actor>,
}

impl StaticAuth {
    pub(super) fn standard(student: &str) -> Self {
        let mut actors = HashMap::new();
        actors.insert(format!("tok-{student}"), student_actor(student));
        for office in [
            Office::Faculty,
            Office::Library,
            Office::Accounts,
            Office::ExamController,
            Office::Registrar,
        ] {
            actors.insert(format!("tok-{}", office.label()), office_actor(office));
        }
        actors.insert("tok-admin".to_string(), admin_actor());
        Self { actors }
    }
}

impl AuthProvider for StaticAuth {
    fn authenticate(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        if credentials.secret != PASSPHRASE {
            return Err(AuthError::InvalidCredentials);
        }
        let token = format!("tok-{}", credentials.user);
        let actor = self
            .actors
            .get(&token)
            .cloned()
            .ok_or(AuthError::InvalidCredentials)?;
        Ok(Session { token, actor })
    }

    fn verify(&self, token: &str) -> Result<Actor, AuthError> {
        self.actors.get(token).cloned().ok_or(AuthError::InvalidToken)
    }
}

pub(super) type Service = CertificateClearanceService<MemoryStore, MemorySink, FakeGateway>;

pub(super) fn build_service() -> (Service, Arc<MemoryStore>, Arc<MemorySink>) {
    let store = Arc::new(MemoryStore::default());
    let sink = Arc::new(MemorySink::default());
    let service = CertificateClearanceService::new(
        store.clone(),
        sink.clone(),
        Arc::new(FakeGateway),
    );
    (service, store, sink)
}

pub(super) fn build_router() -> (axum::Router, Arc<MemoryStore>, Arc<MemorySink>) {
    build_router_with_gateway_key(None)
}

pub(super) fn build_router_with_gateway_key(
    gateway_key: Option<&str>,
) -> (axum::Router, Arc<MemoryStore>, Arc<MemorySink>) {
    let (service, store, sink) = build_service();
    let auth = Arc::new(StaticAuth::standard(STUDENT));
    let router = certificate_router(
        Arc::new(service),
        auth,
        gateway_key.map(str::to_string),
    );
    (router, store, sink)
}

/// Approve every office in chain order up to and including `until`.
pub(super) fn approve_through(service: &Service, id: &ApplicationId, until: Office) {
    for office in service.engine().chain().offices().to_vec() {
        service
            .record_decision(
                &office_actor(office),
                id,
                office,
                OfficeDecision::Approved,
                None,
            )
            .expect("in-order approval succeeds");
        if office == until {
            break;
        }
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
