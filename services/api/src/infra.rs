use metrics_exporter_prometheus::PrometheusHandle;
use skillgate::config::LearningConfig;
use skillgate::error::AppError;
use skillgate::learning::{
    AttemptLookup, CannedHintGenerator, CatalogFile, Clock, HintGenerator, HttpHintGenerator,
    InMemoryCourseCatalog, LearningService, ProgressStore,
};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

/// Catalog served when no catalog file is configured.
pub(crate) const DEMO_CATALOG: &str = include_str!("../catalog/demo.json");

/// Learner profile created at startup so the in-memory store is usable out of the box.
pub(crate) const DEMO_LEARNER: &str = "demo-learner";

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) fn load_catalog(path: Option<&Path>) -> Result<CatalogFile, AppError> {
    let catalog = match path {
        Some(path) => CatalogFile::from_path(path)?,
        None => CatalogFile::from_json(DEMO_CATALOG)?,
    };
    Ok(catalog)
}

pub(crate) fn hint_generator(config: &LearningConfig) -> Result<Arc<dyn HintGenerator>, AppError> {
    match config.hint_generator_url.as_deref() {
        Some(url) => {
            info!(endpoint = url, timeout = ?config.hint_generator_timeout, "using remote hint generator");
            Ok(Arc::new(HttpHintGenerator::new(
                url,
                config.hint_generator_timeout,
            )?))
        }
        None => {
            info!("no hint generator configured; using canned offline hints");
            Ok(Arc::new(CannedHintGenerator::default()))
        }
    }
}

pub(crate) fn learning_service(
    config: &LearningConfig,
    catalog: CatalogFile,
    store: Arc<dyn ProgressStore>,
    attempts: Arc<dyn AttemptLookup>,
    hints: Arc<dyn HintGenerator>,
    clock: Arc<dyn Clock>,
) -> Result<LearningService, AppError> {
    let catalog = InMemoryCourseCatalog::from_courses(catalog.courses)?;
    Ok(LearningService::new(
        store,
        Arc::new(catalog),
        attempts,
        hints,
        config.hint_policy,
    )
    .with_clock(clock))
}

#[cfg(test)]
mod tests {
    use super::*;
    use skillgate::learning::CourseId;

    #[test]
    fn demo_catalog_is_valid() {
        let catalog = load_catalog(None).expect("demo catalog parses");
        assert_eq!(catalog.courses.len(), 1);
        let course = &catalog.courses[0];
        assert_eq!(course.id, CourseId::from("rust-101"));
        assert_eq!(course.levels.len(), 2);
        assert!(course.validate().is_ok());
    }

    #[test]
    fn missing_catalog_files_are_reported() {
        let err = load_catalog(Some(Path::new("/nonexistent/catalog.json")))
            .err()
            .expect("missing file");
        assert!(err.to_string().starts_with("catalog error: unable to read catalog"));
    }
}
