use crate::cli::ServeArgs;
use crate::infra::{applicant_service, AppState, LogMailer};
use crate::routes::with_operational_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokensale::applicants::ApplicantState;
use tokensale::boundary::{ErrorObserver, TracingObserver};
use tokensale::config::AppConfig;
use tokensale::error::AppError;
use tokensale::telemetry;
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

    let service = applicant_service(&config.tokens, &config.mail, Arc::new(LogMailer));
    let applicant_state = ApplicantState::new(Arc::new(service), config.sale.clone());
    let observer: Arc<dyn ErrorObserver> = Arc::new(TracingObserver);

    let app = with_operational_routes(applicant_state, observer)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        sale_start = ?config.sale.start_time,
        sale_end = ?config.sale.end_time,
        accept_applicants = config.sale.accept_applicants,
        "token sale registration api ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
