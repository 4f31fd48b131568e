use crate::cli::ServeArgs;
use crate::infra::{hint_generator, learning_service, load_catalog, AppState, DEMO_LEARNER};
use crate::routes::with_learning_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use skillgate::config::AppConfig;
use skillgate::error::AppError;
use skillgate::learning::{InMemoryAttempts, InMemoryProgressStore, SystemClock, UserId};
use skillgate::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }
    if let Some(catalog) = args.catalog.take() {
        config.learning.catalog_path = Some(catalog);
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let catalog = load_catalog(config.learning.catalog_path.as_deref())?;
    info!(
        courses = catalog.courses.len(),
        source = ?config.learning.catalog_path,
        "course catalog loaded"
    );

    let store = InMemoryProgressStore::default();
    let learners = if args.learners.is_empty() {
        vec![DEMO_LEARNER.to_string()]
    } else {
        std::mem::take(&mut args.learners)
    };
    for learner in learners {
        match UserId::parse(&learner) {
            Ok(user_id) => store.register_profile(user_id).await,
            Err(err) => warn!(learner = %learner, error = %err, "skipping invalid learner id"),
        }
    }

    let service = learning_service(
        &config.learning,
        catalog,
        Arc::new(store),
        Arc::new(InMemoryAttempts::default()),
        hint_generator(&config.learning)?,
        Arc::new(SystemClock),
    )?;

    let app = with_learning_routes(Arc::new(service))
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "learning gate service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
