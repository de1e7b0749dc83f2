use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use feedlens_infra::pipeline::{QueueHealth, StatsView};
use feedlens_observability::OutcomeSnapshot;

// -------------------------
// Request DTOs
// -------------------------

/// `text` stays untyped so a missing or non-string value gets the same
/// "text required" answer as an empty one.
#[derive(Debug, Default, Deserialize)]
pub struct SubmitRequest {
    #[serde(default)]
    pub text: Option<JsonValue>,
    #[serde(default)]
    pub metadata: Option<JsonValue>,
}

impl SubmitRequest {
    pub fn text(&self) -> &str {
        self.text.as_ref().and_then(JsonValue::as_str).unwrap_or("")
    }

    /// Caller metadata; anything but a JSON object is ignored.
    pub fn metadata(self) -> Map<String, JsonValue> {
        match self.metadata {
            Some(JsonValue::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

/// Query strings are parsed leniently; garbage falls back to the defaults.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl HistoryQuery {
    pub fn page(&self) -> Option<i64> {
        self.page.as_deref().and_then(|p| p.trim().parse().ok())
    }

    pub fn limit(&self) -> Option<i64> {
        self.limit.as_deref().and_then(|l| l.trim().parse().ok())
    }
}

// -------------------------
// Response DTOs
// -------------------------

/// `{ "success": true, "message"?: ..., ...body }`
#[derive(Debug, Serialize)]
pub struct Success<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub body: T,
}

pub fn ok<T>(body: T) -> Success<T> {
    Success {
        success: true,
        message: None,
        body,
    }
}

pub fn ok_with_message<T>(message: impl Into<String>, body: T) -> Success<T> {
    Success {
        success: true,
        message: Some(message.into()),
        body,
    }
}

#[derive(Debug, Serialize)]
pub struct StatsBody {
    pub stats: StatsView,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearBody {
    pub deleted_count: u64,
}

#[derive(Debug, Serialize)]
pub struct HealthBody {
    pub queue: QueueHealth,
    pub outcomes: OutcomeSnapshot,
}
