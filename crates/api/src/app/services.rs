//! Service wiring: connection manager, queue, classifier chain, pipeline.

use std::sync::Arc;

use tracing::{info, warn};

use feedlens_ai::{
    ClassifierChain, ClassifierError, ClassifierGateway, DisabledClassifier, GatewayConfig,
    SentimentClassifier,
};
use feedlens_infra::queue::{JobOptions, RetryPolicy};
use feedlens_infra::{AppConfig, ConnectionManager, JobQueue, Pipeline};
use feedlens_observability::{CountingOutcomeRecorder, FanoutRecorder, TracingOutcomeRecorder};

#[derive(Debug, thiserror::Error)]
pub enum ServicesError {
    #[error("failed to build classifier client: {0}")]
    Classifier(#[from] ClassifierError),
}

#[derive(Debug)]
pub struct AppServices {
    pub pipeline: Pipeline,
    /// Process-local outcome totals, reported by the health route.
    pub outcomes: Arc<CountingOutcomeRecorder>,
}

/// Build every service from configuration. Nothing connects yet; the
/// broker probe and the first store query happen later.
pub fn build_services(config: &AppConfig) -> Result<AppServices, ServicesError> {
    let connections = Arc::new(ConnectionManager::new(config.broker.clone(), config.store.clone()));
    build_services_with(config, connections)
}

/// Same as [`build_services`] over an existing connection manager.
pub fn build_services_with(
    config: &AppConfig,
    connections: Arc<ConnectionManager>,
) -> Result<AppServices, ServicesError> {
    let classifier: Arc<dyn SentimentClassifier> = match &config.classifier.endpoint {
        Some(endpoint) => {
            let mut gateway = GatewayConfig::new(endpoint.clone());
            match &config.classifier.api_key {
                Some(key) => gateway = gateway.with_api_key(key.clone()),
                None => warn!("AI_API_KEY not set; classifier calls are unauthenticated"),
            }
            info!(endpoint = %endpoint, "external classifier enabled");
            Arc::new(ClassifierGateway::new(gateway)?)
        }
        None => {
            info!("external classifier disabled; using fallback analysis only");
            Arc::new(DisabledClassifier)
        }
    };

    let queue = JobQueue::new(
        connections.clone(),
        JobOptions::with_retry(RetryPolicy::exponential(config.max_retries)),
    );

    let outcomes = Arc::new(CountingOutcomeRecorder::new());
    let recorder = FanoutRecorder::new()
        .with(Arc::new(TracingOutcomeRecorder))
        .with(outcomes.clone());

    let pipeline = Pipeline::new(connections, queue, ClassifierChain::new(classifier))
        .with_recorder(Arc::new(recorder))
        .with_enqueue(config.enqueue_submissions);

    Ok(AppServices { pipeline, outcomes })
}
