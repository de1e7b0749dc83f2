//! Lazily-built infrastructure handles and the broker-availability flag.
//!
//! ```text
//!              probe() ──► broker().ping() within 3s
//!                 │
//!   Unknown ──────┼──────► Available
//!                 └──────► Unavailable ◄── mark_broker_unavailable()
//! ```
//!
//! The flag is written once by the first probe (or by a later connection
//! error) and read lock-free afterwards. Two concurrent first calls may both
//! probe; the last writer wins and either answer is valid.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::config::{BrokerConfig, StoreConfig};
use crate::queue::{InMemoryQueueBackend, QueueBackend, QueueError};
use crate::store::{FeedbackStore, InMemoryFeedbackStore, PostgresFeedbackStore, StoreError};

/// Upper bound on one reachability probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum BrokerAvailability {
    Unknown = 0,
    Available = 1,
    Unavailable = 2,
}

impl BrokerAvailability {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => BrokerAvailability::Available,
            2 => BrokerAvailability::Unavailable,
            _ => BrokerAvailability::Unknown,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("broker is disabled")]
    BrokerDisabled,

    #[error(transparent)]
    Broker(#[from] QueueError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct ConnectionManager {
    broker_config: BrokerConfig,
    store_config: StoreConfig,
    broker: OnceCell<Arc<dyn QueueBackend>>,
    store: OnceCell<Arc<dyn FeedbackStore>>,
    availability: AtomicU8,
    probe_timeout: Duration,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("broker", &self.broker_config.mode())
            .field("availability", &self.availability())
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Nothing connects until first use.
    pub fn new(broker_config: BrokerConfig, store_config: StoreConfig) -> Self {
        Self {
            broker_config,
            store_config,
            broker: OnceCell::new(),
            store: OnceCell::new(),
            availability: AtomicU8::new(BrokerAvailability::Unknown as u8),
            probe_timeout: PROBE_TIMEOUT,
        }
    }

    /// Pre-built handles. `broker = None` means no broker at all.
    pub fn with_handles(store: Arc<dyn FeedbackStore>, broker: Option<Arc<dyn QueueBackend>>) -> Self {
        let broker_config = if broker.is_some() { BrokerConfig::Memory } else { BrokerConfig::Disabled };
        Self {
            broker_config,
            store_config: StoreConfig::Memory,
            broker: OnceCell::new_with(broker),
            store: OnceCell::new_with(Some(store)),
            availability: AtomicU8::new(BrokerAvailability::Unknown as u8),
            probe_timeout: PROBE_TIMEOUT,
        }
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn availability(&self) -> BrokerAvailability {
        BrokerAvailability::from_u8(self.availability.load(Ordering::Acquire))
    }

    fn set_availability(&self, state: BrokerAvailability) {
        self.availability.store(state as u8, Ordering::Release);
    }

    /// Probe the broker once (connect + ping, bounded by the probe timeout)
    /// and remember the answer for the rest of the process lifetime.
    pub async fn probe(&self) -> bool {
        if matches!(self.broker_config, BrokerConfig::Disabled) {
            self.set_availability(BrokerAvailability::Unavailable);
            info!("broker disabled; status lookups will read the store directly");
            return false;
        }

        let outcome = tokio::time::timeout(self.probe_timeout, async {
            let broker = self.broker().await?;
            broker.ping().await.map_err(ConnectionError::from)
        })
        .await;

        let available = match outcome {
            Ok(Ok(())) => {
                info!(mode = self.broker_config.mode(), "broker reachable");
                true
            }
            Ok(Err(e)) => {
                warn!(mode = self.broker_config.mode(), error = %e, "broker unreachable; continuing without queue");
                false
            }
            Err(_) => {
                warn!(
                    mode = self.broker_config.mode(),
                    timeout_ms = self.probe_timeout.as_millis() as u64,
                    "broker probe timed out; continuing without queue"
                );
                false
            }
        };

        self.set_availability(if available {
            BrokerAvailability::Available
        } else {
            BrokerAvailability::Unavailable
        });
        available
    }

    /// Memoized availability. Probes only if nothing has decided yet.
    pub async fn is_broker_available(&self) -> bool {
        match self.availability() {
            BrokerAvailability::Available => true,
            BrokerAvailability::Unavailable => false,
            BrokerAvailability::Unknown => self.probe().await,
        }
    }

    /// Called by queue users when a command hit a connection error.
    pub fn mark_broker_unavailable(&self) {
        if self.availability() != BrokerAvailability::Unavailable {
            warn!("broker connection lost; marking unavailable");
        }
        self.set_availability(BrokerAvailability::Unavailable);
    }

    /// The broker handle, built on first demand.
    pub async fn broker(&self) -> Result<Arc<dyn QueueBackend>, ConnectionError> {
        self.broker
            .get_or_try_init(|| async { build_broker(&self.broker_config) })
            .await
            .cloned()
    }

    /// The store handle, built on first demand.
    pub async fn store(&self) -> Result<Arc<dyn FeedbackStore>, ConnectionError> {
        self.store
            .get_or_try_init(|| async { build_store(&self.store_config) })
            .await
            .cloned()
    }
}

fn build_broker(config: &BrokerConfig) -> Result<Arc<dyn QueueBackend>, ConnectionError> {
    match config {
        BrokerConfig::Disabled => Err(ConnectionError::BrokerDisabled),
        BrokerConfig::Memory => Ok(Arc::new(InMemoryQueueBackend::new())),
        #[cfg(feature = "redis")]
        BrokerConfig::Redis { .. } => {
            let url = config.redis_url().ok_or(ConnectionError::BrokerDisabled)?;
            let backend = crate::queue::RedisQueueBackend::new(url, crate::queue::QUEUE_NAME)?;
            Ok(Arc::new(backend))
        }
        #[cfg(not(feature = "redis"))]
        BrokerConfig::Redis { .. } => Err(ConnectionError::BrokerDisabled),
    }
}

fn build_store(config: &StoreConfig) -> Result<Arc<dyn FeedbackStore>, ConnectionError> {
    match config {
        StoreConfig::Memory => Ok(Arc::new(InMemoryFeedbackStore::new())),
        StoreConfig::Postgres { url, namespace } => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .acquire_timeout(Duration::from_secs(5))
                .connect_lazy(url)
                .map_err(|e| StoreError::Connection(e.to_string()))?;
            info!(namespace = %namespace, "postgres feedback store configured");
            Ok(Arc::new(PostgresFeedbackStore::new(pool, namespace.clone())))
        }
    }
}
