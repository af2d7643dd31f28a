use crate::cli::ServeArgs;
use crate::infra::{
    AppState, InMemoryApplicationStore, InMemoryNotificationSink, LoggingPaymentGateway,
    StaticTokenAuthProvider,
};
use crate::routes::with_certificate_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use clearance::config::AppConfig;
use clearance::error::AppError;
use clearance::telemetry;
use clearance::workflows::certificate::CertificateClearanceService;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = Arc::new(InMemoryApplicationStore::default());
    let notices = Arc::new(InMemoryNotificationSink::default());
    let payments = Arc::new(LoggingPaymentGateway);
    let auth = Arc::new(StaticTokenAuthProvider::development());
    let service = Arc::new(CertificateClearanceService::new(store, notices, payments));

    let app = with_certificate_routes(service, auth, config.gateway_key.clone())
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "certificate clearance service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
