//! Per-user daily request quota.
//!
//! The search core never consults the quota; callers check it before searching and
//! only count requests that produced an answer.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use tokio::sync::Mutex;

/// Keyed request counter with a day-boundary reset.
#[async_trait]
pub trait RequestQuota: Send + Sync {
    /// Requests counted for `user` today.
    async fn get_count(&self, user: &str) -> u32;
    /// Counts one more request for `user` today and returns the new total.
    async fn increment(&self, user: &str) -> u32;
    /// Zeroes the counter of `user` if it was last touched on an earlier day.
    async fn reset_if_new_day(&self, user: &str);
    /// Counts a request for `user` only if `limit` still allows one, as a single step.
    /// Returns the new total, or `None` when the limit is reached.
    async fn try_acquire(&self, user: &str, limit: &DailyLimit) -> Option<u32>;
    /// Takes back a request counted by [`RequestQuota::try_acquire`] that produced no
    /// answer.
    async fn release(&self, user: &str);
}

/// Daily limit policy.
#[derive(Debug, Clone)]
pub struct DailyLimit {
    max_per_day: u32,
    unlimited_users: HashSet<String>,
}

impl DailyLimit {
    /// Creates a policy; `max_per_day == 0` disables the limit.
    pub fn new(max_per_day: u32, unlimited_users: impl IntoIterator<Item = String>) -> Self {
        Self {
            max_per_day,
            unlimited_users: unlimited_users.into_iter().collect(),
        }
    }

    /// Whether `user` may issue another request given `count` requests today.
    pub fn allows(&self, user: &str, count: u32) -> bool {
        self.max_per_day == 0 || self.unlimited_users.contains(user) || count < self.max_per_day
    }
}

type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

#[derive(Debug, Clone, Copy)]
struct Counter {
    day: NaiveDate,
    count: u32,
}

/// Process-local quota store.
#[derive(Clone)]
pub struct InMemoryQuota {
    counters: Arc<Mutex<HashMap<String, Counter>>>,
    today: Clock,
}

impl Default for InMemoryQuota {
    fn default() -> Self {
        Self::with_clock(Arc::new(|| Local::now().date_naive()))
    }
}

impl InMemoryQuota {
    /// Creates a store whose notion of "today" comes from `today`.
    pub fn with_clock(today: Clock) -> Self {
        Self {
            counters: Arc::new(Mutex::new(HashMap::new())),
            today,
        }
    }
}

#[async_trait]
impl RequestQuota for InMemoryQuota {
    async fn get_count(&self, user: &str) -> u32 {
        let today = (self.today)();
        let guard = self.counters.lock().await;
        guard
            .get(user)
            .filter(|counter| counter.day == today)
            .map_or(0, |counter| counter.count)
    }

    async fn increment(&self, user: &str) -> u32 {
        let today = (self.today)();
        let mut guard = self.counters.lock().await;
        let counter = guard.entry(user.to_string()).or_insert(Counter {
            day: today,
            count: 0,
        });
        if counter.day != today {
            *counter = Counter {
                day: today,
                count: 0,
            };
        }
        counter.count += 1;
        counter.count
    }

    async fn reset_if_new_day(&self, user: &str) {
        let today = (self.today)();
        let mut guard = self.counters.lock().await;
        if let Some(counter) = guard.get_mut(user) {
            if counter.day != today {
                *counter = Counter {
                    day: today,
                    count: 0,
                };
            }
        }
    }

    async fn try_acquire(&self, user: &str, limit: &DailyLimit) -> Option<u32> {
        let today = (self.today)();
        let mut guard = self.counters.lock().await;
        let counter = guard.entry(user.to_string()).or_insert(Counter {
            day: today,
            count: 0,
        });
        if counter.day != today {
            *counter = Counter {
                day: today,
                count: 0,
            };
        }
        if !limit.allows(user, counter.count) {
            return None;
        }
        counter.count += 1;
        Some(counter.count)
    }

    async fn release(&self, user: &str) {
        let today = (self.today)();
        let mut guard = self.counters.lock().await;
        if let Some(counter) = guard.get_mut(user) {
            if counter.day == today {
                counter.count = counter.count.saturating_sub(1);
            }
        }
    }
}
