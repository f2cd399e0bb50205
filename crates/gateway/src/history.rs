//! Conversation history

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use momochat_common::errors::Result;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;
use tracing::debug;

/// Every chat request is attributed to the guest user
pub const GUEST_USER_ID: i64 = 1;
pub const GUEST_USERNAME: &str = "Guest";

/// One question and the reply it received
#[derive(Debug, Clone, Serialize)]
pub struct Exchange {
    pub user_query: String,
    pub ai_response: String,
    pub timestamp: DateTime<Utc>,
}

impl Exchange {
    pub fn new(user_query: impl Into<String>, ai_response: impl Into<String>) -> Self {
        Self {
            user_query: user_query.into(),
            ai_response: ai_response.into(),
            timestamp: Utc::now(),
        }
    }
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Up to `limit` most recent exchanges, oldest first
    async fn recent(&self, user_id: i64, limit: usize) -> Result<Vec<Exchange>>;

    async fn record(&self, user_id: i64, exchange: Exchange) -> Result<()>;
}

/// Process-local history keeping the newest exchanges per user
pub struct InMemoryHistory {
    max_per_user: usize,
    entries: RwLock<HashMap<i64, VecDeque<Exchange>>>,
}

impl InMemoryHistory {
    pub fn new(max_per_user: usize) -> Self {
        Self {
            max_per_user,
            entries: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistory {
    async fn recent(&self, user_id: i64, limit: usize) -> Result<Vec<Exchange>> {
        let entries = self.entries.read().await;
        let Some(exchanges) = entries.get(&user_id) else {
            return Ok(Vec::new());
        };

        let skip = exchanges.len().saturating_sub(limit);
        Ok(exchanges.iter().skip(skip).cloned().collect())
    }

    async fn record(&self, user_id: i64, exchange: Exchange) -> Result<()> {
        if self.max_per_user == 0 {
            return Ok(());
        }

        let mut entries = self.entries.write().await;
        let exchanges = entries.entry(user_id).or_default();
        exchanges.push_back(exchange);
        while exchanges.len() > self.max_per_user {
            exchanges.pop_front();
        }

        debug!(user_id, retained = exchanges.len(), "Recorded exchange");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recent_is_oldest_first() {
        tokio_test::block_on(async {
            let history = InMemoryHistory::new(10);
            for i in 0..4 {
                history
                    .record(GUEST_USER_ID, Exchange::new(format!("q{}", i), format!("a{}", i)))
                    .await
                    .unwrap();
            }

            let recent = history.recent(GUEST_USER_ID, 2).await.unwrap();
            let queries: Vec<_> = recent.iter().map(|e| e.user_query.as_str()).collect();
            assert_eq!(queries, vec!["q2", "q3"]);
        });
    }

    #[test]
    fn test_bounded_per_user() {
        tokio_test::block_on(async {
            let history = InMemoryHistory::new(3);
            for i in 0..5 {
                history.record(7, Exchange::new(format!("q{}", i), "a")).await.unwrap();
            }
            history.record(8, Exchange::new("other", "a")).await.unwrap();

            let all = history.recent(7, 100).await.unwrap();
            assert_eq!(all.len(), 3);
            assert_eq!(all[0].user_query, "q2");
            assert_eq!(history.recent(8, 100).await.unwrap().len(), 1);
        });
    }

    #[test]
    fn test_unknown_user_and_zero_limit() {
        tokio_test::block_on(async {
            let history = InMemoryHistory::new(3);
            assert!(history.recent(42, 2).await.unwrap().is_empty());

            history.record(42, Exchange::new("q", "a")).await.unwrap();
            assert!(history.recent(42, 0).await.unwrap().is_empty());
        });
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        tokio_test::block_on(async {
            let history = InMemoryHistory::new(0);
            history.record(GUEST_USER_ID, Exchange::new("q", "a")).await.unwrap();
            assert!(history.recent(GUEST_USER_ID, 2).await.unwrap().is_empty());
        });
    }
}
