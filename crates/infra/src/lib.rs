//! Infrastructure layer: configuration, connection management, the job
//! queue facade, the feedback store and the request-facing pipeline.

pub mod config;
pub mod connections;
pub mod pipeline;
pub mod queue;
pub mod store;

pub use config::{AppConfig, BrokerConfig, ClassifierConfig, ConfigError, StoreConfig};
pub use connections::{BrokerAvailability, ConnectionError, ConnectionManager, PROBE_TIMEOUT};
pub use pipeline::{Pipeline, PipelineError};
pub use queue::{JobQueue, QUEUE_NAME};
pub use store::{FeedbackStore, StoreError};
