use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::auth::{Actor, AuthProvider};
use super::domain::{
    Application, ApplicationId, ApplicationPayload, ApplicationSubmission, Office, OfficeDecision,
};
use super::engine::ClearanceError;
use super::repository::{
    ApplicationStore, NotificationSink, PaymentGateway, QueueFilter, StoreError,
};
use super::service::{CertificateClearanceService, CertificateServiceError};

/// Shared router state: the clearance service, the auth provider that turns
/// bearer tokens into actors, and the optional key guarding the gateway
/// callback route.
pub struct CertificateApi<S, N, P, A> {
    pub service: Arc<CertificateClearanceService<S, N, P>>,
    pub auth: Arc<A>,
    pub gateway_key: Option<String>,
}

impl<S, N, P, A> Clone for CertificateApi<S, N, P, A> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            auth: Arc::clone(&self.auth),
            gateway_key: self.gateway_key.clone(),
        }
    }
}

/// Router builder exposing the clearance workflow endpoints. When
/// `gateway_key` is set, the payment callback requires the gateway to echo it
/// in the `x-gateway-key` header.
pub fn certificate_router<S, N, P, A>(
    service: Arc<CertificateClearanceService<S, N, P>>,
    auth: Arc<A>,
    gateway_key: Option<String>,
) -> Router
where
    S: ApplicationStore + 'static,
    N: NotificationSink + 'static,
    P: PaymentGateway + 'static,
    A: AuthProvider + 'static,
{
    let state = CertificateApi {
        service,
        auth,
        gateway_key,
    };
    Router::new()
        .route(
            "/api/v1/certificates/applications",
            post(create_handler::<S, N, P, A>),
        )
        .route(
            "/api/v1/certificates/applications/:application_id",
            get(status_handler::<S, N, P, A>),
        )
        .route(
            "/api/v1/certificates/applications/:application_id/clearance/:office",
            put(decide_handler::<S, N, P, A>),
        )
        .route(
            "/api/v1/certificates/applications/:application_id/resubmit",
            post(resubmit_handler::<S, N, P, A>),
        )
        .route(
            "/api/v1/certificates/applications/:application_id/payment",
            post(initiate_payment_handler::<S, N, P, A>),
        )
        .route(
            "/api/v1/certificates/offices/:office/queue",
            get(queue_handler::<S, N, P, A>),
        )
        .route(
            "/api/v1/payments/callback",
            post(payment_callback_handler::<S, N, P, A>),
        )
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub decision: OfficeDecision,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentCallback {
    pub application_id: ApplicationId,
    pub success: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct QueueQuery {
    #[serde(default)]
    pub filter: Option<QueueFilter>,
}

pub(crate) async fn create_handler<S, N, P, A>(
    State(api): State<CertificateApi<S, N, P, A>>,
    headers: HeaderMap,
    axum::Json(submission): axum::Json<ApplicationSubmission>,
) -> Response
where
    S: ApplicationStore + 'static,
    N: NotificationSink + 'static,
    P: PaymentGateway + 'static,
    A: AuthProvider + 'static,
{
    let actor = match authenticate(api.auth.as_ref(), &headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match api.service.submit(&actor, submission) {
        Ok(application) => (StatusCode::CREATED, axum::Json(application)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn status_handler<S, N, P, A>(
    State(api): State<CertificateApi<S, N, P, A>>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
) -> Response
where
    S: ApplicationStore + 'static,
    N: NotificationSink + 'static,
    P: PaymentGateway + 'static,
    A: AuthProvider + 'static,
{
    let actor = match authenticate(api.auth.as_ref(), &headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let id = ApplicationId(application_id);
    match api.service.status(&actor, &id) {
        Ok(application) => ok_application(application),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn decide_handler<S, N, P, A>(
    State(api): State<CertificateApi<S, N, P, A>>,
    headers: HeaderMap,
    Path((application_id, office)): Path<(String, String)>,
    axum::Json(request): axum::Json<DecisionRequest>,
) -> Response
where
    S: ApplicationStore + 'static,
    N: NotificationSink + 'static,
    P: PaymentGateway + 'static,
    A: AuthProvider + 'static,
{
    let actor = match authenticate(api.auth.as_ref(), &headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let office = match parse_office(&office) {
        Ok(office) => office,
        Err(response) => return response,
    };
    let id = ApplicationId(application_id);
    match api.service.record_decision(
        &actor,
        &id,
        office,
        request.decision,
        request.message.as_deref(),
    ) {
        Ok(application) => ok_application(application),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn resubmit_handler<S, N, P, A>(
    State(api): State<CertificateApi<S, N, P, A>>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
    axum::Json(payload): axum::Json<ApplicationPayload>,
) -> Response
where
    S: ApplicationStore + 'static,
    N: NotificationSink + 'static,
    P: PaymentGateway + 'static,
    A: AuthProvider + 'static,
{
    let actor = match authenticate(api.auth.as_ref(), &headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let id = ApplicationId(application_id);
    match api.service.resubmit(&actor, &id, payload) {
        Ok(application) => ok_application(application),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn initiate_payment_handler<S, N, P, A>(
    State(api): State<CertificateApi<S, N, P, A>>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
) -> Response
where
    S: ApplicationStore + 'static,
    N: NotificationSink + 'static,
    P: PaymentGateway + 'static,
    A: AuthProvider + 'static,
{
    let actor = match authenticate(api.auth.as_ref(), &headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let id = ApplicationId(application_id);
    match api.service.initiate_payment(&actor, &id) {
        Ok(redirect_url) => (
            StatusCode::OK,
            axum::Json(json!({ "redirect_url": redirect_url })),
        )
            .into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn queue_handler<S, N, P, A>(
    State(api): State<CertificateApi<S, N, P, A>>,
    headers: HeaderMap,
    Path(office): Path<String>,
    Query(query): Query<QueueQuery>,
) -> Response
where
    S: ApplicationStore + 'static,
    N: NotificationSink + 'static,
    P: PaymentGateway + 'static,
    A: AuthProvider + 'static,
{
    let actor = match authenticate(api.auth.as_ref(), &headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let office = match parse_office(&office) {
        Ok(office) => office,
        Err(response) => return response,
    };
    match api
        .service
        .queue(&actor, office, query.filter.unwrap_or_default())
    {
        Ok(applications) => {
            let views: Vec<_> = applications
                .iter()
                .map(Application::status_view)
                .collect();
            (StatusCode::OK, axum::Json(views)).into_response()
        }
        Err(error) => error_response(error),
    }
}

/// Internal-only gateway callback; responds 204 with no body on success.
pub(crate) async fn payment_callback_handler<S, N, P, A>(
    State(api): State<CertificateApi<S, N, P, A>>,
    headers: HeaderMap,
    axum::Json(callback): axum::Json<PaymentCallback>,
) -> Response
where
    S: ApplicationStore + 'static,
    N: NotificationSink + 'static,
    P: PaymentGateway + 'static,
    A: AuthProvider + 'static,
{
    if let Some(expected) = &api.gateway_key {
        let supplied = headers
            .get("x-gateway-key")
            .and_then(|value| value.to_str().ok());
        if supplied != Some(expected.as_str()) {
            let payload = json!({ "error": "missing or invalid gateway key" });
            return (StatusCode::UNAUTHORIZED, axum::Json(payload)).into_response();
        }
    }

    match api
        .service
        .payment_result(&callback.application_id, callback.success)
    {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(error),
    }
}

fn authenticate<A: AuthProvider>(auth: &A, headers: &HeaderMap) -> Result<Actor, Response> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    let Some(token) = token else {
        let payload = json!({ "error": "missing bearer token" });
        return Err((StatusCode::UNAUTHORIZED, axum::Json(payload)).into_response());
    };

    auth.verify(token).map_err(|error| {
        let payload = json!({ "error": error.to_string() });
        (StatusCode::UNAUTHORIZED, axum::Json(payload)).into_response()
    })
}

fn parse_office(raw: &str) -> Result<Office, Response> {
    Office::from_str(raw).map_err(|error| {
        let payload = json!({ "error": error.to_string() });
        (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
    })
}

fn ok_application(application: Application) -> Response {
    (StatusCode::OK, axum::Json(application)).into_response()
}

fn error_response(error: CertificateServiceError) -> Response {
    let status = match &error {
        CertificateServiceError::Clearance(ClearanceError::EmptyRejectionMessage)
        | CertificateServiceError::Clearance(ClearanceError::NotInChain { .. }) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        CertificateServiceError::Clearance(ClearanceError::OutOfSequence { .. })
        | CertificateServiceError::Clearance(ClearanceError::AlreadyDecided { .. })
        | CertificateServiceError::Clearance(ClearanceError::NotRejected { .. })
        | CertificateServiceError::ActiveApplicationExists { .. } => StatusCode::CONFLICT,
        CertificateServiceError::Store(StoreError::Conflict)
        | CertificateServiceError::Store(StoreError::Duplicate) => StatusCode::CONFLICT,
        CertificateServiceError::Store(StoreError::NotFound) => StatusCode::NOT_FOUND,
        CertificateServiceError::Forbidden { .. } => StatusCode::FORBIDDEN,
        CertificateServiceError::Store(StoreError::Unavailable(_))
        | CertificateServiceError::Payment(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let body = axum::Json(json!({ "error": error.to_string() }));
    (status, body).into_response()
}
