//! HTTP gateway to the external sentiment-scoring service.
//!
//! The service answers `POST {inputs, options}` with a list of
//! `{label, score}` candidates, either flat or nested one level deep
//! (`[[{label, score}, ...]]`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use tracing::{debug, error, warn};

use feedlens_core::{Analysis, ScoredLabel, round_to};

use crate::classifier::SentimentClassifier;
use crate::intents::extract_intents;
use crate::labels::label_to_sentiment;
use crate::result::{Classification, ClassifierError, UnavailableReason};

pub const DEFAULT_CLASSIFIER_URL: &str =
    "https://router.huggingface.co/hf-inference/models/cardiffnlp/twitter-roberta-base-sentiment-latest";

/// Hard upper bound on one classifier call.
pub const CLASSIFIER_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl GatewayConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: None,
            timeout: CLASSIFIER_TIMEOUT,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::new(DEFAULT_CLASSIFIER_URL)
    }
}

#[derive(Debug, Deserialize)]
struct Candidate {
    label: String,
    score: f64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CandidateShape {
    Nested(Vec<Vec<Candidate>>),
    Flat(Vec<Candidate>),
}

/// Client for the external classifier.
#[derive(Debug)]
pub struct ClassifierGateway {
    client: reqwest::Client,
    config: GatewayConfig,
    /// Set the first time the service rejects our credentials.
    auth_warning_logged: AtomicBool,
}

impl ClassifierGateway {
    pub fn new(config: GatewayConfig) -> Result<Self, ClassifierError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClassifierError::Client(e.to_string()))?;

        Ok(Self {
            client,
            config,
            auth_warning_logged: AtomicBool::new(false),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    async fn request(&self, text: &str) -> Result<JsonValue, UnavailableReason> {
        let mut request = self.client.post(&self.config.endpoint).json(&json!({
            "inputs": text,
            "options": { "wait_for_model": true },
        }));
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                UnavailableReason::Timeout
            } else {
                UnavailableReason::Transport(e.to_string())
            }
        })?;

        match response.status() {
            StatusCode::UNAUTHORIZED => return Err(UnavailableReason::Unauthorized),
            s if !s.is_success() => return Err(UnavailableReason::Status(s.as_u16())),
            _ => {}
        }

        response.json::<JsonValue>().await.map_err(|e| {
            if e.is_timeout() {
                UnavailableReason::Timeout
            } else {
                UnavailableReason::Malformed(e.to_string())
            }
        })
    }

    fn log_unavailable(&self, reason: &UnavailableReason) {
        match reason {
            UnavailableReason::Unauthorized => {
                if !self.auth_warning_logged.swap(true, Ordering::Relaxed) {
                    warn!(
                        endpoint = %self.config.endpoint,
                        "classifier rejected the API key; using fallback sentiment analysis"
                    );
                }
            }
            other => error!(endpoint = %self.config.endpoint, error = %other, "classifier call failed"),
        }
    }
}

#[async_trait]
impl SentimentClassifier for ClassifierGateway {
    async fn classify(&self, text: &str) -> Classification {
        let outcome = match self.request(text).await {
            Ok(raw) => decode_analysis(text, raw),
            Err(reason) => Err(reason),
        };

        match outcome {
            Ok(analysis) => {
                debug!(sentiment = %analysis.sentiment, confidence = analysis.confidence, "classifier scored text");
                Classification::Scored(analysis)
            }
            Err(reason) => {
                self.log_unavailable(&reason);
                Classification::Unavailable(reason)
            }
        }
    }
}

/// Decode a raw classifier response into an analysis.
///
/// The top candidate (highest score; later candidates win ties) must map onto
/// the sentiment vocabulary, otherwise the response is malformed.
pub fn decode_analysis(text: &str, raw: JsonValue) -> Result<Analysis, UnavailableReason> {
    let shape: CandidateShape = serde_json::from_value(raw.clone())
        .map_err(|e| UnavailableReason::Malformed(e.to_string()))?;

    let candidates = match shape {
        CandidateShape::Nested(mut outer) => {
            if outer.is_empty() {
                return Err(UnavailableReason::Malformed("empty response".to_string()));
            }
            outer.swap_remove(0)
        }
        CandidateShape::Flat(candidates) => candidates,
    };

    if candidates.iter().any(|c| !c.score.is_finite()) {
        return Err(UnavailableReason::Malformed("non-finite score".to_string()));
    }

    let top = candidates
        .iter()
        .reduce(|best, c| if best.score > c.score { best } else { c })
        .ok_or_else(|| UnavailableReason::Malformed("no candidates".to_string()))?;

    let sentiment = label_to_sentiment(&top.label).ok_or_else(|| {
        UnavailableReason::Malformed(format!("top label {:?} is not a sentiment", top.label))
    })?;

    Ok(Analysis {
        sentiment,
        confidence: round_to(top.score, 2),
        all_scores: candidates
            .iter()
            .map(|c| ScoredLabel::new(c.label.clone(), c.score))
            .collect(),
        intents: extract_intents(text),
        ai_processed: true,
        raw: Some(raw),
    })
}
