// Top-N aggregation.
// Cache lookup, list fetch, bounded fan-out of item fetches, all-or-nothing assembly.

use std::time::Duration;

use futures::{StreamExt, TryStreamExt, stream};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::cache::{Clock, SystemClock, TtlCache};
use crate::config::{AggregatorConfig, CacheConfig, ConfigError};
use crate::error::{AggregationError, Result};
use crate::upstream::{Item, Upstream};

/// Default cap on simultaneous item lookups.
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 16;

/// Assembles the top `count` items from an [`Upstream`], memoized per `count`.
///
/// Concurrent calls for the same `count` during a miss each do the full
/// fetch; the last to finish wins the cache slot.
pub struct Aggregator<U, C = SystemClock> {
    upstream: U,
    cache: TtlCache<usize, Vec<Item>, C>,
    max_concurrent_fetches: usize,
    request_timeout: Option<Duration>,
}

impl<U: Upstream> Aggregator<U, SystemClock> {
    /// Build from configuration sections, on the wall clock.
    pub fn from_config(
        upstream: U,
        cache: &CacheConfig,
        aggregator: &AggregatorConfig,
    ) -> std::result::Result<Self, ConfigError> {
        if aggregator.max_concurrent_fetches == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        let cache = TtlCache::new(cache.capacity()?, cache.ttl());
        Ok(Self::new(upstream, cache)
            .with_max_concurrent_fetches(aggregator.max_concurrent_fetches)
            .with_request_timeout(aggregator.request_timeout()))
    }
}

impl<U: Upstream, C: Clock> Aggregator<U, C> {
    /// Create an aggregator over an injected cache, with no deadline.
    pub fn new(upstream: U, cache: TtlCache<usize, Vec<Item>, C>) -> Self {
        Self {
            upstream,
            cache,
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
            request_timeout: None,
        }
    }

    /// Cap simultaneous item lookups. Zero is treated as one.
    pub fn with_max_concurrent_fetches(mut self, limit: usize) -> Self {
        self.max_concurrent_fetches = limit.max(1);
        self
    }

    /// Deadline for the upstream part of one aggregation.
    pub fn with_request_timeout(mut self, limit: Option<Duration>) -> Self {
        self.request_timeout = limit;
        self
    }

    pub fn cache(&self) -> &TtlCache<usize, Vec<Item>, C> {
        &self.cache
    }

    pub fn upstream(&self) -> &U {
        &self.upstream
    }

    /// Get the top `count` items in upstream rank order.
    ///
    /// Served from cache when a result for `count` is still fresh. Otherwise
    /// the list and every item are fetched; any failure aborts the whole
    /// operation and leaves the cache untouched.
    pub async fn get_top_items(&self, count: i64) -> Result<Vec<Item>> {
        let key = usize::try_from(count)
            .ok()
            .filter(|&n| n > 0)
            .ok_or(AggregationError::InvalidArgument(count))?;

        if let Some(items) = self.cache.get(&key) {
            debug!(count, "cache hit");
            return Ok(items);
        }
        debug!(count, "cache miss");

        let fetch = self.fetch(key);
        let result = match self.request_timeout {
            Some(limit) => timeout(limit, fetch)
                .await
                .unwrap_or(Err(AggregationError::Timeout(limit))),
            None => fetch.await,
        };

        match result {
            Ok(items) => {
                self.cache.put(key, items.clone());
                info!(count, items = items.len(), "aggregated top items");
                Ok(items)
            }
            Err(err) => {
                warn!(count, error = %err, "aggregation failed");
                Err(err)
            }
        }
    }

    async fn fetch(&self, count: usize) -> Result<Vec<Item>> {
        let mut ids = self
            .upstream
            .list_top()
            .await
            .map_err(|err| AggregationError::UpstreamUnavailable(err.to_string()))?;
        ids.truncate(count);

        // Lookups complete in any order. The first error to arrive returns
        // early, and dropping the stream drops every fetch still in flight.
        let mut slots: Vec<Option<Item>> = vec![None; ids.len()];
        let mut fetches = stream::iter(ids.into_iter().enumerate())
            .map(|(rank, id)| async move {
                self.upstream.get_item(id).await.map(|item| (rank, item))
            })
            .buffer_unordered(self.max_concurrent_fetches);

        while let Some((rank, item)) = fetches.try_next().await? {
            slots[rank] = Some(item);
        }

        Ok(slots.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::num::NonZeroUsize;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio::time::sleep;

    use crate::cache::ManualClock;
    use crate::error::FetchError;
    use crate::upstream::ItemId;

    const TTL: Duration = Duration::from_secs(600);

    /// Call-counting stand-in for the upstream API.
    #[derive(Default)]
    struct StubUpstream {
        list: Vec<ItemId>,
        list_error: Option<FetchError>,
        missing: HashSet<ItemId>,
        unavailable: HashSet<ItemId>,
        delays: HashMap<ItemId, Duration>,
        list_calls: AtomicUsize,
        item_calls: Mutex<Vec<ItemId>>,
        completed: Mutex<Vec<ItemId>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl StubUpstream {
        fn with_list(list: &[ItemId]) -> Self {
            Self {
                list: list.to_vec(),
                ..Self::default()
            }
        }

        fn missing(mut self, id: ItemId) -> Self {
            self.missing.insert(id);
            self
        }

        fn unavailable(mut self, id: ItemId) -> Self {
            self.unavailable.insert(id);
            self
        }

        fn delay(mut self, id: ItemId, by: Duration) -> Self {
            self.delays.insert(id, by);
            self
        }

        fn failing_list(error: FetchError) -> Self {
            Self {
                list_error: Some(error),
                ..Self::default()
            }
        }

        fn list_calls(&self) -> usize {
            self.list_calls.load(Ordering::SeqCst)
        }

        fn item_calls(&self) -> Vec<ItemId> {
            self.item_calls.lock().clone()
        }
    }

    #[async_trait]
    impl Upstream for StubUpstream {
        async fn list_top(&self) -> std::result::Result<Vec<ItemId>, FetchError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            match &self.list_error {
                Some(err) => Err(err.clone()),
                None => Ok(self.list.clone()),
            }
        }

        async fn get_item(&self, id: ItemId) -> std::result::Result<Item, FetchError> {
            self.item_calls.lock().push(id);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if let Some(delay) = self.delays.get(&id) {
                sleep(*delay).await;
            }

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.completed.lock().push(id);
            if self.missing.contains(&id) {
                Err(FetchError::ItemMissing(id))
            } else if self.unavailable.contains(&id) {
                Err(FetchError::UpstreamUnavailable(format!("HTTP 503 for item {}", id)))
            } else {
                Ok(Item::with_id(id))
            }
        }
    }

    type TestAggregator = Aggregator<Arc<StubUpstream>, ManualClock>;

    fn aggregator(upstream: StubUpstream) -> (TestAggregator, Arc<StubUpstream>, ManualClock) {
        let upstream = Arc::new(upstream);
        let clock = ManualClock::default();
        let cache = TtlCache::with_clock(NonZeroUsize::new(100).unwrap(), TTL, clock.clone());
        (Aggregator::new(upstream.clone(), cache), upstream, clock)
    }

    fn ids(items: &[Item]) -> Vec<ItemId> {
        items.iter().map(|item| item.id).collect()
    }

    #[tokio::test]
    async fn test_second_call_is_served_from_cache() {
        let (aggregator, upstream, _) = aggregator(StubUpstream::with_list(&[5, 3, 9, 1]));

        let first = aggregator.get_top_items(3).await.unwrap();
        let second = aggregator.get_top_items(3).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(upstream.list_calls(), 1);
        let mut calls = upstream.item_calls();
        calls.sort();
        assert_eq!(calls, vec![3, 5, 9]);
    }

    #[tokio::test]
    async fn test_expired_entry_triggers_fresh_fetch() {
        let (aggregator, upstream, clock) = aggregator(StubUpstream::with_list(&[5, 3]));

        aggregator.get_top_items(2).await.unwrap();
        clock.advance(TTL - Duration::from_secs(1));
        aggregator.get_top_items(2).await.unwrap();
        assert_eq!(upstream.list_calls(), 1);

        clock.advance(Duration::from_secs(1));
        aggregator.get_top_items(2).await.unwrap();
        assert_eq!(upstream.list_calls(), 2);
        assert_eq!(upstream.item_calls().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rank_order_survives_out_of_order_completion() {
        let stub = StubUpstream::with_list(&[5, 3, 9, 1]).delay(5, Duration::from_millis(50));
        let (aggregator, upstream, _) = aggregator(stub);

        let items = aggregator.get_top_items(2).await.unwrap();

        assert_eq!(ids(&items), vec![5, 3]);
        assert_eq!(*upstream.completed.lock(), vec![3, 5]);
        let mut calls = upstream.item_calls();
        calls.sort();
        assert_eq!(calls, vec![3, 5]);
    }

    #[tokio::test]
    async fn test_short_list_returns_everything() {
        let (aggregator, _, _) = aggregator(StubUpstream::with_list(&[7, 8, 9]));

        let items = aggregator.get_top_items(10).await.unwrap();

        assert_eq!(ids(&items), vec![7, 8, 9]);
        assert!(aggregator.cache().get(&10).is_some());
    }

    #[tokio::test]
    async fn test_missing_item_fails_whole_operation() {
        let (aggregator, _, _) = aggregator(StubUpstream::with_list(&[5, 9]).missing(9));

        let err = aggregator.get_top_items(2).await.unwrap_err();

        assert_eq!(err, AggregationError::ItemMissing(9));
        assert!(aggregator.cache().get(&2).is_none());
        assert!(aggregator.cache().is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_item_fails_whole_operation() {
        let (aggregator, upstream, _) =
            aggregator(StubUpstream::with_list(&[5, 3, 9]).unavailable(3));

        let err = aggregator.get_top_items(3).await.unwrap_err();

        assert!(matches!(err, AggregationError::UpstreamUnavailable(_)));
        assert!(aggregator.cache().get(&3).is_none());
        assert!(aggregator.cache().is_empty());
        assert_eq!(upstream.list_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_failure_is_reported_before_slow_lookups_finish() {
        let stub = StubUpstream::with_list(&[1, 2])
            .delay(1, Duration::from_secs(60))
            .missing(2);
        let (aggregator, upstream, _) = aggregator(stub);
        let aggregator = aggregator.with_request_timeout(Some(Duration::from_secs(5)));

        let started = tokio::time::Instant::now();
        let err = aggregator.get_top_items(2).await.unwrap_err();

        assert_eq!(err, AggregationError::ItemMissing(2));
        assert!(started.elapsed() < Duration::from_secs(1));
        sleep(Duration::from_secs(120)).await;
        assert_eq!(*upstream.completed.lock(), vec![2]);
        assert!(aggregator.cache().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_failure_abandons_in_flight_fetches() {
        let stub = StubUpstream::with_list(&[1, 2, 3])
            .missing(1)
            .delay(2, Duration::from_secs(10))
            .delay(3, Duration::from_secs(10));
        let (aggregator, upstream, _) = aggregator(stub);

        let err = aggregator.get_top_items(3).await.unwrap_err();

        assert_eq!(err, AggregationError::ItemMissing(1));
        sleep(Duration::from_secs(30)).await;
        assert_eq!(*upstream.completed.lock(), vec![1]);
    }

    #[tokio::test]
    async fn test_list_failure_makes_no_item_calls() {
        let stub = StubUpstream::failing_list(FetchError::UpstreamUnavailable("HTTP 503".into()));
        let (aggregator, upstream, _) = aggregator(stub);

        for count in [1, 5, 500] {
            let err = aggregator.get_top_items(count).await.unwrap_err();
            assert!(matches!(err, AggregationError::UpstreamUnavailable(_)));
        }
        assert_eq!(upstream.list_calls(), 3);
        assert!(upstream.item_calls().is_empty());
        assert!(aggregator.cache().is_empty());
    }

    #[tokio::test]
    async fn test_non_positive_count_is_rejected_without_io() {
        let (aggregator, upstream, _) = aggregator(StubUpstream::with_list(&[1, 2]));

        assert_eq!(
            aggregator.get_top_items(0).await,
            Err(AggregationError::InvalidArgument(0))
        );
        assert_eq!(
            aggregator.get_top_items(-1).await,
            Err(AggregationError::InvalidArgument(-1))
        );
        assert_eq!(upstream.list_calls(), 0);
        assert!(upstream.item_calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_abandons_operation() {
        let stub = StubUpstream::with_list(&[1, 2]).delay(2, Duration::from_secs(60));
        let (aggregator, upstream, _) = aggregator(stub);
        let aggregator = aggregator.with_request_timeout(Some(Duration::from_secs(5)));

        let err = aggregator.get_top_items(2).await.unwrap_err();

        assert_eq!(err, AggregationError::Timeout(Duration::from_secs(5)));
        assert!(aggregator.cache().get(&2).is_none());
        sleep(Duration::from_secs(120)).await;
        assert_eq!(*upstream.completed.lock(), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_leaves_existing_entries_alone() {
        let stub = StubUpstream::with_list(&[1, 2]).delay(2, Duration::from_secs(60));
        let (aggregator, _, _) = aggregator(stub);
        let aggregator = aggregator.with_request_timeout(Some(Duration::from_secs(5)));

        aggregator.get_top_items(1).await.unwrap();
        assert!(aggregator.get_top_items(2).await.is_err());
        assert_eq!(ids(&aggregator.get_top_items(1).await.unwrap()), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fan_out_respects_concurrency_cap() {
        let mut stub = StubUpstream::with_list(&[1, 2, 3, 4, 5, 6]);
        for id in 1..=6 {
            stub = stub.delay(id, Duration::from_millis(10 * id));
        }
        let (aggregator, upstream, _) = aggregator(stub);
        let aggregator = aggregator.with_max_concurrent_fetches(2);

        let items = aggregator.get_top_items(6).await.unwrap();

        assert_eq!(ids(&items), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(upstream.max_in_flight.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_counts_are_cached_independently() {
        let (aggregator, upstream, _) = aggregator(StubUpstream::with_list(&[4, 3, 2, 1]));

        assert_eq!(ids(&aggregator.get_top_items(1).await.unwrap()), vec![4]);
        assert_eq!(ids(&aggregator.get_top_items(3).await.unwrap()), vec![4, 3, 2]);
        aggregator.get_top_items(1).await.unwrap();

        assert_eq!(upstream.list_calls(), 2);
        assert_eq!(aggregator.cache().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_the_cache() {
        let (aggregator, upstream, _) = aggregator(StubUpstream::with_list(&[1, 2, 3]));
        let aggregator = Arc::new(aggregator);

        aggregator.get_top_items(3).await.unwrap();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let aggregator = aggregator.clone();
                tokio::spawn(async move { aggregator.get_top_items(3).await })
            })
            .collect();
        for handle in handles {
            assert_eq!(ids(&handle.await.unwrap().unwrap()), vec![1, 2, 3]);
        }

        assert_eq!(upstream.list_calls(), 1);
    }
}
