use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue, json};

use feedlens_ai::{Classification, ClassifierChain, DisabledClassifier, SentimentClassifier};
use feedlens_core::{
    Analysis, AnalysisSource, Intent, JobId, MAX_FEEDBACK_CHARS, ScoredLabel, Sentiment, UserId,
};
use feedlens_observability::CountingOutcomeRecorder;

use super::*;
use crate::queue::{InMemoryQueueBackend, JobCounts, JobOptions, JobRecord, QueueBackend, QueueError, QueuedJob};
use crate::connections::BrokerAvailability;
use crate::store::InMemoryFeedbackStore;

struct FixedClassifier(Analysis);

#[async_trait]
impl SentimentClassifier for FixedClassifier {
    async fn classify(&self, _text: &str) -> Classification {
        Classification::Scored(self.0.clone())
    }
}

struct Harness {
    pipeline: Pipeline,
    store: Arc<InMemoryFeedbackStore>,
    broker: Option<Arc<InMemoryQueueBackend>>,
    recorder: Arc<CountingOutcomeRecorder>,
}

fn harness(classifier: Arc<dyn SentimentClassifier>, with_broker: bool, enqueue: bool) -> Harness {
    let store = Arc::new(InMemoryFeedbackStore::new());
    let broker = with_broker.then(|| Arc::new(InMemoryQueueBackend::new()));
    let connections = Arc::new(ConnectionManager::with_handles(
        store.clone(),
        broker.clone().map(|b| b as Arc<dyn QueueBackend>),
    ));
    let queue = JobQueue::new(connections.clone(), JobOptions::default());
    let recorder = Arc::new(CountingOutcomeRecorder::new());
    let pipeline = Pipeline::new(connections, queue, ClassifierChain::new(classifier))
        .with_recorder(recorder.clone())
        .with_enqueue(enqueue);

    Harness {
        pipeline,
        store,
        broker,
        recorder,
    }
}

fn offline() -> Harness {
    harness(Arc::new(DisabledClassifier), false, false)
}

fn user(id: &str) -> UserId {
    UserId::new(id).unwrap()
}

fn ai_analysis() -> Analysis {
    Analysis {
        sentiment: Sentiment::Negative,
        confidence: 0.93,
        all_scores: vec![
            ScoredLabel::new("negative", 0.93),
            ScoredLabel::new("neutral", 0.05),
        ],
        intents: vec![Intent::BugReport],
        ai_processed: true,
        raw: Some(json!([[{ "label": "negative", "score": 0.93 }]])),
    }
}

#[tokio::test]
async fn submit_without_classifier_uses_fallback_and_persists() {
    let h = offline();
    let out = h
        .pipeline
        .submit(&user("u1"), "  This is great and amazing  ", Map::new())
        .await
        .unwrap();

    assert_eq!(out.analysis.sentiment, Sentiment::Positive);
    assert_eq!(out.analysis.confidence, 0.7);
    assert_eq!(out.analysis.confidence_percent, "70.0%");
    assert!(!out.analysis.ai_processed);
    assert_eq!(out.analysis.intents, vec![Intent::PositiveFeedback]);
    assert_eq!(out.metrics.word_count, 5);
    assert_eq!(out.metrics.char_count, "This is great and amazing".len());

    let stored = h.store.find_by_job_id(out.job_id).await.unwrap().unwrap();
    assert_eq!(stored.text, "This is great and amazing");
    assert_eq!(stored.metadata.source, AnalysisSource::FallbackAnalysis);
    assert_eq!(stored.raw, None);
    assert_eq!(stored.processed_at, out.metrics.processed_at);
    assert!(stored.submitted_at <= stored.processed_at);
}

#[tokio::test]
async fn fallback_sentiment_follows_keywords() {
    let h = offline();
    let u = user("u1");
    for (text, expected) in [
        ("This is great and amazing", Sentiment::Positive),
        ("This is terrible and broken", Sentiment::Negative),
        ("The parcel arrived on Tuesday", Sentiment::Neutral),
    ] {
        let out = h.pipeline.submit(&u, text, Map::new()).await.unwrap();
        assert_eq!(out.analysis.sentiment, expected, "{text}");
        assert!(!out.analysis.intents.is_empty());
    }
}

#[tokio::test]
async fn scored_analysis_is_tagged_as_ai() {
    let h = harness(Arc::new(FixedClassifier(ai_analysis())), false, false);
    let out = h.pipeline.submit(&user("u1"), "It keeps crashing", Map::new()).await.unwrap();

    assert!(out.analysis.ai_processed);
    assert_eq!(out.analysis.sentiment, Sentiment::Negative);
    assert_eq!(out.analysis.confidence_percent, "93.0%");

    let stored = h.store.find_by_job_id(out.job_id).await.unwrap().unwrap();
    assert_eq!(stored.metadata.source, AnalysisSource::AiAnalysis);
    assert!(stored.raw.is_some());
    assert_eq!(h.recorder.snapshot().ai_processed, 1);
}

#[tokio::test]
async fn blank_or_oversized_text_is_rejected() {
    let h = offline();
    let u = user("u1");

    for text in ["", "   ", "\n\t"] {
        let err = h.pipeline.submit(&u, text, Map::new()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Validation(ref m) if m == "Feedback text is required"));
    }

    let too_long = "a".repeat(MAX_FEEDBACK_CHARS + 1);
    let err = h.pipeline.submit(&u, &too_long, Map::new()).await.unwrap_err();
    assert!(matches!(err, PipelineError::Validation(ref m) if m.contains("exceeds maximum length")));

    let at_limit = "a".repeat(MAX_FEEDBACK_CHARS);
    assert!(h.pipeline.submit(&u, &at_limit, Map::new()).await.is_ok());

    assert_eq!(h.store.len().await, 1);
    assert_eq!(h.recorder.snapshot().submitted, 1);
}

#[tokio::test]
async fn persistence_failure_is_terminal_and_not_recorded() {
    let h = offline();
    h.store.set_fail_writes(true);

    let err = h.pipeline.submit(&user("u1"), "great", Map::new()).await.unwrap_err();
    assert!(matches!(err, PipelineError::Persistence(_)));
    assert_eq!(err.public_message(), "Failed to submit feedback");
    assert_eq!(h.recorder.snapshot().submitted, 0);
}

#[tokio::test]
async fn caller_metadata_is_kept_but_cannot_spoof_computed_fields() {
    let h = offline();
    let mut metadata = Map::new();
    metadata.insert("channel".to_string(), json!("email"));
    metadata.insert("source".to_string(), json!("ai-analysis"));
    metadata.insert("wordCount".to_string(), json!(999));

    let out = h.pipeline.submit(&user("u1"), "two words", metadata).await.unwrap();
    let stored = h.store.find_by_job_id(out.job_id).await.unwrap().unwrap();

    assert_eq!(stored.metadata.source, AnalysisSource::FallbackAnalysis);
    assert_eq!(stored.metadata.word_count, 2);
    assert_eq!(stored.metadata.extra.get("channel"), Some(&JsonValue::from("email")));
}

#[tokio::test]
async fn status_reads_the_store_when_there_is_no_broker() {
    let h = offline();
    let out = h.pipeline.submit(&user("u1"), "great", Map::new()).await.unwrap();

    let status = h.pipeline.status(&out.job_id.to_string()).await.unwrap();
    assert_eq!(status.status, JobState::Completed);
    let result = status.result.unwrap();
    assert_eq!(result.sentiment, Sentiment::Positive);
    assert_eq!(result.confidence, 0.7);
}

#[tokio::test]
async fn unknown_job_is_not_found_with_or_without_broker() {
    for with_broker in [false, true] {
        let h = harness(Arc::new(DisabledClassifier), with_broker, false);
        for id in [JobId::new().to_string(), "not-a-uuid".to_string()] {
            let err = h.pipeline.status(&id).await.unwrap_err();
            assert!(matches!(err, PipelineError::NotFound(_)), "broker={with_broker} id={id}");
        }
    }
}

#[tokio::test]
async fn empty_job_id_is_a_validation_error() {
    let h = offline();
    assert!(matches!(
        h.pipeline.status("  ").await,
        Err(PipelineError::Validation(_))
    ));
}

#[tokio::test]
async fn queued_job_states_come_from_the_broker() {
    let h = harness(Arc::new(DisabledClassifier), true, true);
    let broker = h.broker.clone().unwrap();
    let out = h.pipeline.submit(&user("u1"), "great", Map::new()).await.unwrap();
    let id = out.job_id.to_string();

    let status = h.pipeline.status(&id).await.unwrap();
    assert_eq!(status.status, JobState::Waiting);
    assert_eq!(status.message.as_deref(), Some("Job is waiting"));
    assert!(status.result.is_none());

    // The row is already durable; only the status view waits on the consumer.
    let history = h.pipeline.history(&user("u1"), None, None).await.unwrap();
    assert_eq!(history.data[0].job_id, out.job_id);

    broker.activate(out.job_id).await.unwrap();
    assert_eq!(h.pipeline.status(&id).await.unwrap().status, JobState::Active);

    broker.complete(out.job_id, chrono::Utc::now()).await.unwrap();
    let status = h.pipeline.status(&id).await.unwrap();
    assert_eq!(status.status, JobState::Completed);
    assert_eq!(status.result.unwrap().sentiment, Sentiment::Positive);
}

#[tokio::test]
async fn failed_jobs_report_the_reason() {
    let h = harness(Arc::new(DisabledClassifier), true, true);
    let broker = h.broker.clone().unwrap();
    let out = h.pipeline.submit(&user("u1"), "great", Map::new()).await.unwrap();

    for _ in 0..3 {
        broker.activate(out.job_id).await.unwrap();
        broker.fail_attempt(out.job_id, "worker crashed", chrono::Utc::now()).await.unwrap();
    }

    let status = h.pipeline.status(&out.job_id.to_string()).await.unwrap();
    assert_eq!(status.status, JobState::Failed);
    assert_eq!(status.failed_reason.as_deref(), Some("worker crashed"));
}

#[tokio::test]
async fn completed_job_without_a_row_is_not_found() {
    let h = harness(Arc::new(DisabledClassifier), true, true);
    let broker = h.broker.clone().unwrap();
    let out = h.pipeline.submit(&user("u1"), "great", Map::new()).await.unwrap();
    broker.activate(out.job_id).await.unwrap();
    broker.complete(out.job_id, chrono::Utc::now()).await.unwrap();

    h.pipeline.clear(&user("u1")).await.unwrap();
    assert!(matches!(
        h.pipeline.status(&out.job_id.to_string()).await,
        Err(PipelineError::NotFound(_))
    ));
}

#[tokio::test]
async fn enqueue_hook_is_off_by_default() {
    let h = harness(Arc::new(DisabledClassifier), true, false);
    h.pipeline.submit(&user("u1"), "great", Map::new()).await.unwrap();
    assert_eq!(h.pipeline.queue().counts().await.unwrap().waiting, 0);
}

#[tokio::test]
async fn unreachable_broker_does_not_affect_submission() {
    let h = harness(Arc::new(DisabledClassifier), true, true);
    h.broker.as_ref().unwrap().set_reachable(false);

    let out = h.pipeline.submit(&user("u1"), "great", Map::new()).await.unwrap();
    let status = h.pipeline.status(&out.job_id.to_string()).await.unwrap();
    assert_eq!(status.status, JobState::Completed);
}

#[tokio::test]
async fn history_pages_newest_first_and_caps_limit() {
    let h = offline();
    let u = user("u1");
    for i in 0..12 {
        h.pipeline.submit(&u, &format!("note {i}"), Map::new()).await.unwrap();
    }
    h.pipeline.submit(&user("u2"), "someone else", Map::new()).await.unwrap();

    let first = h.pipeline.history(&u, None, None).await.unwrap();
    assert_eq!(first.pagination, Pagination { page: 1, limit: 10, total: 12, pages: 2 });
    assert_eq!(first.data.len(), 10);
    assert_eq!(first.data[0].text, "note 11");

    let second = h.pipeline.history(&u, Some(2), Some(10)).await.unwrap();
    assert_eq!(second.data.len(), 2);
    assert_eq!(second.data[1].text, "note 0");

    let capped = h.pipeline.history(&u, Some(1), Some(500)).await.unwrap();
    assert_eq!(capped.pagination.limit, 50);
    assert_eq!(capped.data.len(), 12);

    let clamped = h.pipeline.history(&u, Some(0), Some(0)).await.unwrap();
    assert_eq!((clamped.pagination.page, clamped.pagination.limit), (1, 1));
    assert_eq!(clamped.pagination.pages, 12);
}

#[test]
fn page_window_defaults_and_clamps() {
    assert_eq!(page_window(None, None), (1, 10));
    assert_eq!(page_window(Some(-3), Some(-1)), (1, 1));
    assert_eq!(page_window(Some(4), Some(51)), (4, 50));
}

#[tokio::test]
async fn history_far_past_the_end_is_empty_not_an_error() {
    let h = offline();
    h.pipeline.submit(&user("u1"), "great", Map::new()).await.unwrap();

    let page = h.pipeline.history(&user("u1"), Some(i64::MAX), None).await.unwrap();
    assert!(page.data.is_empty());
    assert_eq!(page.pagination.page, i64::MAX as u64);
    assert_eq!(page.pagination.total, 1);
}

#[tokio::test]
async fn stats_for_a_new_user_are_empty() {
    let h = offline();
    let stats = h.pipeline.stats(&user("nobody")).await.unwrap();
    assert_eq!(stats.total, 0);
    assert!(stats.breakdown.is_empty());
    assert_eq!(
        serde_json::to_value(&stats).unwrap(),
        json!({ "total": 0, "breakdown": {} })
    );
}

#[tokio::test]
async fn stats_break_down_by_sentiment() {
    let h = offline();
    let u = user("u1");
    for text in ["great", "amazing", "terrible"] {
        h.pipeline.submit(&u, text, Map::new()).await.unwrap();
    }

    let stats = h.pipeline.stats(&u).await.unwrap();
    assert_eq!(stats.total, 3);
    let positive = stats.breakdown["positive"];
    assert_eq!(positive.count, 2);
    assert_eq!(positive.percentage, 66.7);
    assert_eq!(positive.avg_confidence, 0.7);
    assert_eq!(stats.breakdown["negative"].percentage, 33.3);
    assert!(!stats.breakdown.contains_key("neutral"));
}

#[tokio::test]
async fn clear_removes_only_the_callers_feedback() {
    let h = offline();
    h.pipeline.submit(&user("u1"), "a", Map::new()).await.unwrap();
    h.pipeline.submit(&user("u1"), "b", Map::new()).await.unwrap();
    h.pipeline.submit(&user("u2"), "c", Map::new()).await.unwrap();

    assert_eq!(h.pipeline.clear(&user("u1")).await.unwrap(), 2);
    assert_eq!(h.pipeline.clear(&user("u1")).await.unwrap(), 0);
    assert_eq!(h.pipeline.stats(&user("u2")).await.unwrap().total, 1);
}

#[tokio::test]
async fn health_without_broker_is_consistently_disconnected() {
    let h = offline();
    for _ in 0..3 {
        let health = h.pipeline.health().await;
        assert_eq!(health.status, QueueStatus::Disconnected);
        assert_eq!(health.name, "feedback-processing");
        assert!(health.counts.is_none());
        assert!(health.message.is_some());
    }
}

#[tokio::test]
async fn health_reports_live_counts() {
    let h = harness(Arc::new(DisabledClassifier), true, true);
    h.pipeline.submit(&user("u1"), "great", Map::new()).await.unwrap();

    let health = h.pipeline.health().await;
    assert_eq!(health.status, QueueStatus::Connected);
    assert_eq!(health.counts.unwrap().waiting, 1);
    assert_eq!(
        serde_json::to_value(&health).unwrap()["counts"]["waiting"],
        json!(1)
    );
}

#[tokio::test]
async fn health_degrades_when_the_broker_drops() {
    let h = harness(Arc::new(DisabledClassifier), true, false);
    assert_eq!(h.pipeline.health().await.status, QueueStatus::Connected);

    h.broker.as_ref().unwrap().set_reachable(false);
    assert_eq!(h.pipeline.health().await.status, QueueStatus::Disconnected);
    assert_eq!(
        serde_json::to_value(h.pipeline.health().await).unwrap()["counts"],
        JsonValue::Null
    );
}

/// Answers PING, then never answers anything else.
struct StallingBroker;

#[async_trait]
impl QueueBackend for StallingBroker {
    async fn ping(&self) -> Result<(), QueueError> {
        Ok(())
    }

    async fn add(&self, _job: &QueuedJob) -> Result<(), QueueError> {
        std::future::pending().await
    }

    async fn get(&self, _job_id: JobId) -> Result<Option<JobRecord>, QueueError> {
        std::future::pending().await
    }

    async fn counts(&self) -> Result<JobCounts, QueueError> {
        std::future::pending().await
    }

    async fn remove_expired(&self, _now: chrono::DateTime<chrono::Utc>) -> Result<u64, QueueError> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn stalled_broker_commands_time_out_and_mark_it_unavailable() {
    let store = Arc::new(InMemoryFeedbackStore::new());
    let connections = Arc::new(ConnectionManager::with_handles(
        store.clone(),
        Some(Arc::new(StallingBroker) as Arc<dyn QueueBackend>),
    ));
    assert!(connections.probe().await);

    let queue = JobQueue::new(connections.clone(), JobOptions::default())
        .with_op_timeout(Duration::from_millis(50));
    let pipeline = Pipeline::new(connections.clone(), queue, ClassifierChain::new(Arc::new(DisabledClassifier)))
        .with_enqueue(true);

    let bound = Duration::from_secs(2);
    let submitted = tokio::time::timeout(bound, pipeline.submit(&user("u1"), "great", Map::new()))
        .await
        .expect("submit must not wait on a stalled broker")
        .unwrap();
    assert_eq!(connections.availability(), BrokerAvailability::Unavailable);

    let status = tokio::time::timeout(bound, pipeline.status(&submitted.job_id.to_string()))
        .await
        .expect("status must not wait on a stalled broker")
        .unwrap();
    assert_eq!(status.status, JobState::Completed);

    let health = tokio::time::timeout(bound, pipeline.health())
        .await
        .expect("health must not wait on a stalled broker");
    assert_eq!(health.status, QueueStatus::Disconnected);
}

#[tokio::test]
async fn stalled_health_check_reports_disconnected() {
    let store = Arc::new(InMemoryFeedbackStore::new());
    let connections = Arc::new(ConnectionManager::with_handles(
        store,
        Some(Arc::new(StallingBroker) as Arc<dyn QueueBackend>),
    ));
    let queue = JobQueue::new(connections.clone(), JobOptions::default())
        .with_op_timeout(Duration::from_millis(50));
    let pipeline = Pipeline::new(connections, queue, ClassifierChain::new(Arc::new(DisabledClassifier)));

    let health = tokio::time::timeout(Duration::from_secs(2), pipeline.health())
        .await
        .expect("health must not hang");
    assert_eq!(health.status, QueueStatus::Disconnected);
    assert!(health.counts.is_none());
}
