//! In-memory feedback store (dev/tests).

use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use feedlens_core::{FeedbackItem, JobId, Sentiment, UserId};

use super::{FeedbackStore, PageRequest, SentimentGroup, StoreError};

#[derive(Debug, Default)]
pub struct InMemoryFeedbackStore {
    items: RwLock<HashMap<JobId, FeedbackItem>>,
    fail_writes: AtomicBool,
}

impl InMemoryFeedbackStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `insert` fail with a connection error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }
}

#[async_trait]
impl FeedbackStore for InMemoryFeedbackStore {
    async fn insert(&self, item: &FeedbackItem) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Connection("in-memory store rejecting writes".to_string()));
        }
        let mut items = self.items.write().await;
        if items.contains_key(&item.job_id) {
            return Err(StoreError::Duplicate(item.job_id));
        }
        items.insert(item.job_id, item.clone());
        Ok(())
    }

    async fn find_by_job_id(&self, job_id: JobId) -> Result<Option<FeedbackItem>, StoreError> {
        Ok(self.items.read().await.get(&job_id).cloned())
    }

    async fn list_for_user(&self, user_id: &UserId, page: PageRequest) -> Result<Vec<FeedbackItem>, StoreError> {
        let items = self.items.read().await;
        let mut owned: Vec<&FeedbackItem> = items.values().filter(|i| &i.user_id == user_id).collect();
        owned.sort_by_key(|i| Reverse((i.processed_at, *i.job_id.as_uuid())));

        Ok(owned
            .into_iter()
            .skip(usize::try_from(page.skip).unwrap_or(usize::MAX))
            .take(usize::try_from(page.limit).unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn count_for_user(&self, user_id: &UserId) -> Result<u64, StoreError> {
        let items = self.items.read().await;
        Ok(items.values().filter(|i| &i.user_id == user_id).count() as u64)
    }

    async fn sentiment_groups(&self, user_id: &UserId) -> Result<Vec<SentimentGroup>, StoreError> {
        let items = self.items.read().await;
        let mut acc: HashMap<Sentiment, (u64, f64)> = HashMap::new();
        for item in items.values().filter(|i| &i.user_id == user_id) {
            let slot = acc.entry(item.sentiment).or_default();
            slot.0 += 1;
            slot.1 += item.confidence;
        }

        Ok(Sentiment::ALL
            .iter()
            .filter_map(|s| {
                acc.get(s).map(|(count, sum)| SentimentGroup {
                    sentiment: *s,
                    count: *count,
                    avg_confidence: sum / *count as f64,
                })
            })
            .collect())
    }

    async fn clear_for_user(&self, user_id: &UserId) -> Result<u64, StoreError> {
        let mut items = self.items.write().await;
        let before = items.len();
        items.retain(|_, i| &i.user_id != user_id);
        Ok((before - items.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use feedlens_ai::FallbackClassifier;
    use feedlens_core::FeedbackText;
    use serde_json::Map;

    fn item(user: &str, text: &str, minutes_ago: i64) -> FeedbackItem {
        let text = FeedbackText::parse(text).unwrap();
        let analysis = FallbackClassifier::new().classify_locally(text.as_str());
        let at = Utc::now() - Duration::minutes(minutes_ago);
        FeedbackItem::from_analysis(
            JobId::new(),
            UserId::new(user).unwrap(),
            &text,
            analysis,
            Map::new(),
            at,
            at,
        )
    }

    #[tokio::test]
    async fn lists_newest_first_with_paging() {
        let store = InMemoryFeedbackStore::new();
        let oldest = item("u1", "first", 30);
        let middle = item("u1", "second", 20);
        let newest = item("u1", "third", 10);
        for i in [&middle, &oldest, &newest] {
            store.insert(i).await.unwrap();
        }
        store.insert(&item("u2", "someone else", 0)).await.unwrap();

        let user = UserId::new("u1").unwrap();
        let first_page = store.list_for_user(&user, PageRequest { skip: 0, limit: 2 }).await.unwrap();
        assert_eq!(
            first_page.iter().map(|i| i.text.as_str()).collect::<Vec<_>>(),
            vec!["third", "second"]
        );

        let second_page = store.list_for_user(&user, PageRequest { skip: 2, limit: 2 }).await.unwrap();
        assert_eq!(second_page.len(), 1);
        assert_eq!(second_page[0].job_id, oldest.job_id);
        assert_eq!(store.count_for_user(&user).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let store = InMemoryFeedbackStore::new();
        let i = item("u1", "hello", 0);
        store.insert(&i).await.unwrap();
        assert_eq!(store.insert(&i).await, Err(StoreError::Duplicate(i.job_id)));
    }

    #[tokio::test]
    async fn groups_by_sentiment_with_average_confidence() {
        let store = InMemoryFeedbackStore::new();
        store.insert(&item("u1", "great", 0)).await.unwrap();
        store.insert(&item("u1", "amazing", 0)).await.unwrap();
        store.insert(&item("u1", "terrible", 0)).await.unwrap();

        let groups = store.sentiment_groups(&UserId::new("u1").unwrap()).await.unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].sentiment, Sentiment::Positive);
        assert_eq!(groups[0].count, 2);
        assert!((groups[0].avg_confidence - 0.7).abs() < 1e-9);
        assert_eq!(groups[1].sentiment, Sentiment::Negative);
    }

    #[tokio::test]
    async fn clear_only_touches_the_owner() {
        let store = InMemoryFeedbackStore::new();
        store.insert(&item("u1", "a", 0)).await.unwrap();
        store.insert(&item("u1", "b", 0)).await.unwrap();
        store.insert(&item("u2", "c", 0)).await.unwrap();

        assert_eq!(store.clear_for_user(&UserId::new("u1").unwrap()).await.unwrap(), 2);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn failing_writes_surface_as_errors() {
        let store = InMemoryFeedbackStore::new();
        store.set_fail_writes(true);
        assert!(matches!(
            store.insert(&item("u1", "a", 0)).await,
            Err(StoreError::Connection(_))
        ));
        assert!(store.is_empty().await);
    }
}
