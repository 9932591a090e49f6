use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::warn;

use crate::error::Result;
use crate::slots::UserId;

/// Records returned when a query does not give a positive limit.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// One observation of a user above the activity threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRecord {
    /// Assigned by the store on append
    #[serde(default)]
    pub id: u64,
    pub user_id: UserId,
    pub username: String,
    pub active_slots: usize,
    pub window_secs: i64,
    /// Unix seconds
    pub created_at: i64,
}

impl AlertRecord {
    pub fn new(
        user_id: UserId,
        username: impl Into<String>,
        active_slots: usize,
        window_secs: i64,
        created_at: i64,
    ) -> Self {
        Self { id: 0, user_id, username: username.into(), active_slots, window_secs, created_at }
    }
}

/// Filter for [`AlertStore::fetch`]. Bounds are inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub user_id: Option<UserId>,
    pub limit: usize,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self { start_time: None, end_time: None, user_id: None, limit: DEFAULT_HISTORY_LIMIT }
    }
}

impl HistoryQuery {
    /// Build a query from raw request parameters, where zero or negative
    /// values mean "not set".
    pub fn from_params(start_time: i64, end_time: i64, user_id: i64, limit: i64) -> Self {
        Self {
            start_time: (start_time > 0).then_some(start_time),
            end_time: (end_time > 0).then_some(end_time),
            user_id: (user_id > 0).then_some(user_id),
            limit: usize::try_from(limit)
                .ok()
                .filter(|l| *l > 0)
                .unwrap_or(DEFAULT_HISTORY_LIMIT),
        }
    }

    pub fn matches(&self, record: &AlertRecord) -> bool {
        self.start_time.is_none_or(|start| record.created_at >= start)
            && self.end_time.is_none_or(|end| record.created_at <= end)
            && self.user_id.is_none_or(|user| record.user_id == user)
    }

    /// Matching records, newest first, at most `limit` of them.
    pub fn select<I>(&self, records: I) -> Vec<AlertRecord>
    where
        I: IntoIterator<Item = AlertRecord>,
    {
        let mut selected: Vec<AlertRecord> = records
            .into_iter()
            .filter(|r| self.matches(r))
            .collect();
        selected.sort_unstable_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        selected.truncate(self.limit);
        selected
    }
}

/// Some records of a batch were not written.
#[derive(Error, Debug)]
#[error("{failed} of {total} alert records not persisted: {reason}")]
pub struct BatchError {
    pub failed: usize,
    pub total: usize,
    pub reason: String,
}

/// Durable (or not) home of alert records.
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Append one record; the returned copy carries its assigned id.
    async fn append(&self, record: AlertRecord) -> Result<AlertRecord>;

    /// Append a batch. A failed record does not stop the rest of the batch.
    ///
    /// Returns the number of records written, or a [`BatchError`] describing
    /// how many were lost.
    async fn append_batch(
        &self,
        records: Vec<AlertRecord>,
    ) -> std::result::Result<usize, BatchError> {
        let total = records.len();
        let mut failed = 0;
        let mut reason = None;

        for record in records {
            let user_id = record.user_id;
            if let Err(e) = self.append(record).await {
                warn!(user_id, error = %e, "Failed to persist alert record");
                failed += 1;
                reason = Some(e.to_string());
            }
        }

        match reason {
            None => Ok(total),
            Some(reason) => Err(BatchError { failed, total, reason }),
        }
    }

    /// Records matching `query`, newest first.
    async fn fetch(&self, query: &HistoryQuery) -> Result<Vec<AlertRecord>>;
}

#[derive(Debug, Default)]
struct MemoryState {
    records: VecDeque<AlertRecord>,
    next_id: u64,
}

/// Bounded in-process store. The oldest records are dropped past `max_records`.
#[derive(Debug)]
pub struct MemoryAlertStore {
    state: Mutex<MemoryState>,
    max_records: usize,
}

impl MemoryAlertStore {
    pub fn new(max_records: usize) -> Self {
        Self {
            state: Mutex::new(MemoryState { records: VecDeque::new(), next_id: 1 }),
            max_records: max_records.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("Alert store lock poisoned, continuing with current state");
            poisoned.into_inner()
        })
    }
}

#[async_trait]
impl AlertStore for MemoryAlertStore {
    async fn append(&self, mut record: AlertRecord) -> Result<AlertRecord> {
        let mut state = self.lock();
        record.id = state.next_id;
        state.next_id = state.next_id.saturating_add(1);
        if state.records.len() >= self.max_records {
            state.records.pop_front();
        }
        state.records.push_back(record.clone());
        Ok(record)
    }

    async fn fetch(&self, query: &HistoryQuery) -> Result<Vec<AlertRecord>> {
        let records: Vec<AlertRecord> = self.lock().records.iter().cloned().collect();
        Ok(query.select(records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_params_normalises() {
        let q = HistoryQuery::from_params(0, -1, 0, 0);
        assert_eq!(q, HistoryQuery::default());

        let q = HistoryQuery::from_params(10, 20, 7, 5);
        assert_eq!(q.start_time, Some(10));
        assert_eq!(q.end_time, Some(20));
        assert_eq!(q.user_id, Some(7));
        assert_eq!(q.limit, 5);
    }

    #[test]
    fn test_select_orders_and_limits() {
        let records = vec![
            AlertRecord { id: 1, ..AlertRecord::new(1, "a", 5, 600, 100) },
            AlertRecord { id: 2, ..AlertRecord::new(2, "b", 6, 600, 300) },
            AlertRecord { id: 3, ..AlertRecord::new(1, "a", 7, 600, 200) },
            AlertRecord { id: 4, ..AlertRecord::new(3, "c", 8, 600, 300) },
        ];

        let all = HistoryQuery::default().select(records.clone());
        let ids: Vec<u64> = all.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![4, 2, 3, 1]);

        let q = HistoryQuery::from_params(150, 300, 1, 10);
        let ids: Vec<u64> = q.select(records.clone()).iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3]);

        let q = HistoryQuery::from_params(0, 0, 0, 2);
        assert_eq!(q.select(records).len(), 2);
    }

    #[tokio::test]
    async fn test_memory_store_drops_oldest() -> Result<()> {
        let store = MemoryAlertStore::new(2);
        for t in 1..=3 {
            store.append(AlertRecord::new(t, "u", 5, 600, t * 10)).await?;
        }
        assert_eq!(store.len(), 2);
        let kept = store.fetch(&HistoryQuery::default()).await?;
        let ids: Vec<u64> = kept.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 2]);
        Ok(())
    }
}
