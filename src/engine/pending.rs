use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::AbortHandle;

use crate::engine::descriptor::CacheKey;
use crate::utils::{
    error::{QueryFailure, TransportError},
    types::QueryResult,
};

/// One in-flight fetch and the number of callers still waiting on it
struct PendingRequest {
    id: u64,
    receiver: watch::Receiver<Option<QueryResult>>,
    waiters: usize,
    abort: Option<AbortHandle>,
}

/// Table of in-flight fetches, at most one per cache key.
///
/// Joining, starting and leaving all go through the map's entry API, so the
/// per-key check-then-act sequence runs under one shard lock.
#[derive(Clone, Default)]
pub struct PendingTable {
    requests: Arc<DashMap<CacheKey, PendingRequest>>,
    next_id: Arc<AtomicU64>,
}

/// Whether a caller started a fetch or joined one already running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Started,
    Coalesced,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in `key`.
    ///
    /// If a fetch is already pending the caller becomes another waiter on
    /// it; otherwise `start` is called with the settlement for a new fetch
    /// and must return a handle that aborts it. `start` runs after the shard
    /// lock is released, so it may settle or drop the settlement inline.
    pub fn join_or_start<F>(&self, key: &CacheKey, start: F) -> (Waiter, JoinKind)
    where
        F: FnOnce(Settlement) -> AbortHandle,
    {
        let (id, sender, receiver) = match self.requests.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let pending = occupied.get_mut();
                pending.waiters += 1;
                let waiter = Waiter {
                    table: self.clone(),
                    key: key.clone(),
                    id: pending.id,
                    receiver: pending.receiver.clone(),
                };
                return (waiter, JoinKind::Coalesced);
            }
            Entry::Vacant(vacant) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let (sender, receiver) = watch::channel(None);
                vacant.insert(PendingRequest {
                    id,
                    receiver: receiver.clone(),
                    waiters: 1,
                    abort: None,
                });
                (id, sender, receiver)
            }
        };

        let waiter = Waiter {
            table: self.clone(),
            key: key.clone(),
            id,
            receiver,
        };
        let abort = start(Settlement {
            table: self.clone(),
            key: key.clone(),
            id,
            sender,
            settled: false,
        });

        // The fetch may already have settled and retired its entry
        if let Some(mut pending) = self.requests.get_mut(key) {
            if pending.id == id {
                pending.abort = Some(abort);
            }
        }

        (waiter, JoinKind::Started)
    }

    /// Number of fetches currently in flight
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Number of callers waiting on the fetch for `key`
    pub fn waiters(&self, key: &CacheKey) -> usize {
        self.requests.get(key).map_or(0, |p| p.waiters)
    }

    fn finish(&self, key: &CacheKey, id: u64) {
        self.requests.remove_if(key, |_, pending| pending.id == id);
    }

    fn leave(&self, key: &CacheKey, id: u64) {
        if let Entry::Occupied(mut occupied) = self.requests.entry(key.clone()) {
            if occupied.get().id != id {
                return;
            }

            let pending = occupied.get_mut();
            pending.waiters = pending.waiters.saturating_sub(1);
            if pending.waiters == 0 {
                let abandoned = occupied.remove();
                if let Some(abort) = abandoned.abort {
                    abort.abort();
                }
                tracing::debug!(cache_key = %key, "last waiter left, fetch aborted");
            }
        }
    }
}

/// Write side of a pending fetch, owned by the task performing it
pub struct Settlement {
    table: PendingTable,
    key: CacheKey,
    id: u64,
    sender: watch::Sender<Option<QueryResult>>,
    settled: bool,
}

impl Settlement {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Retire the pending entry and hand the result to every waiter
    pub fn settle(mut self, result: QueryResult) {
        self.table.finish(&self.key, self.id);
        self.sender.send_replace(Some(result));
        self.settled = true;
    }
}

impl Drop for Settlement {
    // A fetch task that dies without settling must not leave its entry
    // behind for new callers to join.
    fn drop(&mut self) {
        if !self.settled {
            self.table.finish(&self.key, self.id);
        }
    }
}

/// Read side of a pending fetch held by one caller.
///
/// Dropping a waiter before the fetch settles withdraws its interest; the
/// fetch is aborted once no waiters remain.
pub struct Waiter {
    table: PendingTable,
    key: CacheKey,
    id: u64,
    receiver: watch::Receiver<Option<QueryResult>>,
}

impl Waiter {
    /// Wait until the fetch settles
    pub async fn wait(mut self) -> QueryResult {
        match self.receiver.wait_for(|value| value.is_some()).await {
            Ok(settled) => settled.clone().unwrap_or_else(ended_without_result),
            Err(_) => ended_without_result(),
        }
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        self.table.leave(&self.key, self.id);
    }
}

fn ended_without_result() -> QueryResult {
    QueryResult::Failure(QueryFailure::Transport(TransportError::Cancelled(
        "fetch ended before producing a result".to_string(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::descriptor::QueryDescriptor;
    use serde_json::json;
    use std::time::Duration;

    fn key(name: &str) -> CacheKey {
        QueryDescriptor::new("query { hello }", name).unwrap().cache_key()
    }

    #[tokio::test]
    async fn test_second_caller_coalesces() {
        let table = PendingTable::new();
        let key = key("Hello");
        let mut starts = 0;

        let (first, first_kind) = table.join_or_start(&key, |settlement| {
            starts += 1;
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                settlement.settle(QueryResult::Success(json!({"hello": "hi"})));
            })
            .abort_handle()
        });
        let (second, second_kind) = table.join_or_start(&key, |_| panic!("must not start twice"));

        assert_eq!(starts, 1);
        assert_eq!(first_kind, JoinKind::Started);
        assert_eq!(second_kind, JoinKind::Coalesced);
        assert_eq!(table.waiters(&key), 2);

        let (a, b) = tokio::join!(first.wait(), second.wait());
        assert_eq!(a, QueryResult::Success(json!({"hello": "hi"})));
        assert_eq!(a, b);
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_last_waiter_leaving_aborts_fetch() {
        let table = PendingTable::new();
        let key = key("Slow");

        let task = std::sync::Arc::new(std::sync::Mutex::new(None));
        let task_slot = task.clone();
        let (waiter, _) = table.join_or_start(&key, move |settlement| {
            let handle = tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(30)).await;
                settlement.settle(QueryResult::Success(json!(null)));
            });
            let abort = handle.abort_handle();
            *task_slot.lock().unwrap() = Some(handle);
            abort
        });

        assert_eq!(table.len(), 1);
        drop(waiter);
        assert!(table.is_empty());

        let handle = task.lock().unwrap().take().unwrap();
        let joined = handle.await;
        assert!(joined.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_one_waiter_leaving_keeps_fetch_alive() {
        let table = PendingTable::new();
        let key = key("Shared");

        let (first, _) = table.join_or_start(&key, |settlement| {
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                settlement.settle(QueryResult::Success(json!({"ok": true})));
            })
            .abort_handle()
        });
        let (second, _) = table.join_or_start(&key, |_| panic!("must not start twice"));

        drop(first);
        assert_eq!(table.waiters(&key), 1);
        assert_eq!(second.wait().await, QueryResult::Success(json!({"ok": true})));
    }

    #[tokio::test]
    async fn test_dropped_settlement_reports_cancellation() {
        let table = PendingTable::new();
        let key = key("Dropped");

        let (waiter, _) = table.join_or_start(&key, |settlement| {
            tokio::spawn(async move {
                drop(settlement);
            })
            .abort_handle()
        });

        match waiter.wait().await {
            QueryResult::Failure(QueryFailure::Transport(TransportError::Cancelled(_))) => {}
            other => panic!("Expected cancellation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_new_fetch_after_settlement() {
        let table = PendingTable::new();
        let key = key("Again");

        for round in 0..2 {
            let (waiter, kind) = table.join_or_start(&key, move |settlement| {
                tokio::spawn(async move {
                    settlement.settle(QueryResult::Success(json!(round)));
                })
                .abort_handle()
            });
            assert_eq!(kind, JoinKind::Started);
            assert_eq!(waiter.wait().await, QueryResult::Success(json!(round)));
        }
    }
}
