use crate::cli::ServeArgs;
use crate::infra::{build_backend, change_window, load_roster, today, AppState};
use crate::routes::with_operational_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use schedule_change::config::AppConfig;
use schedule_change::error::AppError;
use schedule_change::telemetry;
use std::sync::atomic::{AtomicBool, Ordering};
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

    let roster = load_roster(&args.roster)?;
    let period = change_window(args.roster.window_start, args.roster.window_end, today());
    info!(
        period = %period.id,
        opens = %period.change_window_start,
        closes = %period.change_window_end,
        max_pending = config.policy.max_pending_per_student,
        "change window configured"
    );
    let backend = build_backend(roster, period, config.policy.clone());

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let app = with_operational_routes(backend.service, backend.feed)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "schedule change service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
