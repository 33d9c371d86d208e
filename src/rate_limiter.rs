use crate::config_validator::ConfigValidator;
use crate::error::{RateLimitError, RateLimitResult};
use crate::metrics::{HitMetrics, LimiterStats};
use crate::rate_limit_config::RateLimiterConfig;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Per-user record: which group receives the user's hits
#[derive(Debug, Clone)]
struct UserRecord {
    group_id: String,
    last_hit_at: Option<Instant>,
    /// Last hit or group assignment, used to drop orphaned records
    last_seen: Instant,
}

/// Per-group sliding window
#[derive(Debug, Clone)]
struct GroupRecord {
    hits: VecDeque<Instant>,
    last_hit_at: Instant,
}

impl GroupRecord {
    /// Drop timestamps that fell out of `(now - interval, now]`.
    fn prune(&mut self, now: Instant, interval: Duration) {
        while self
            .hits
            .front()
            .is_some_and(|hit| now.duration_since(*hit) >= interval)
        {
            self.hits.pop_front();
        }
    }

    fn average_spacing(&self) -> Option<Duration> {
        let (first, last) = (self.hits.front()?, self.hits.back()?);
        let gaps = self.hits.len().checked_sub(1).filter(|n| *n > 0)?;
        Some(last.duration_since(*first) / gaps as u32)
    }
}

#[derive(Debug, Default)]
struct LimiterState {
    users: HashMap<String, UserRecord>,
    groups: HashMap<String, GroupRecord>,
}

impl LimiterState {
    /// Resolve `id` as a user first, otherwise as a group.
    fn group_of(&self, id: &str) -> String {
        self.users
            .get(id)
            .map_or_else(|| id.to_string(), |user| user.group_id.clone())
    }

    fn window(&mut self, id: &str, now: Instant, interval: Duration) -> Option<&GroupRecord> {
        let group_id = self.group_of(id);
        let group = self.groups.get_mut(&group_id)?;
        group.prune(now, interval);
        Some(&*group)
    }

    /// Evict groups idle for longer than `max_idle` together with their users.
    ///
    /// Orphaned users, whose group no longer exists, are dropped too, but only
    /// once `max_idle` has passed since their last hit or group assignment. A user
    /// assigned to a group that has not been hit yet survives that long.
    fn sweep(&mut self, now: Instant, max_idle: Duration) -> usize {
        let expired: HashSet<String> = self
            .groups
            .iter()
            .filter(|(_, group)| now.duration_since(group.last_hit_at) > max_idle)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            self.groups.remove(id);
        }

        let groups = &self.groups;
        self.users.retain(|_, user| {
            if expired.contains(&user.group_id) {
                return false;
            }
            groups.contains_key(&user.group_id) || now.duration_since(user.last_seen) <= max_idle
        });

        expired.len()
    }
}

struct Shared {
    config: RateLimiterConfig,
    state: Mutex<LimiterState>,
    cleanup: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, LimiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stop_cleanup(&self) -> bool {
        let task = self
            .cleanup
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match task {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.stop_cleanup();
    }
}

async fn cleanup_loop(shared: Weak<Shared>, period: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(shared) = shared.upgrade() else {
            break;
        };
        let max_idle = shared.config.max_idle;
        let evicted = shared.lock().sweep(Instant::now(), max_idle);
        if evicted > 0 {
            debug!(evicted, "Evicted idle rate limit groups");
        }
    }
}

/// Sliding-window rate limiter with user grouping.
///
/// Hits are recorded per group; a user's group defaults to the user's own id
/// until reassigned. A background task evicts groups that have been idle for
/// longer than `max_idle`. Clones share the same state.
#[derive(Clone)]
pub struct RateLimiter {
    shared: Arc<Shared>,
}

impl RateLimiter {
    /// Create a limiter and start its cleanup task on the current tokio runtime.
    pub fn new(config: RateLimiterConfig) -> RateLimitResult<Self> {
        ConfigValidator::validate_rate_limiter(&config)?;
        let runtime = Handle::try_current().map_err(|_| RateLimitError::NoRuntime)?;

        let period = config.cleanup_interval;
        let shared = Arc::new(Shared {
            config,
            state: Mutex::new(LimiterState::default()),
            cleanup: Mutex::new(None),
        });

        let task = runtime.spawn(cleanup_loop(Arc::downgrade(&shared), period));
        *shared.cleanup.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);

        info!(
            max_hits = shared.config.max_hits,
            interval_ms = shared.config.interval.as_millis() as u64,
            cleanup_interval_ms = period.as_millis() as u64,
            max_idle_ms = shared.config.max_idle.as_millis() as u64,
            "Rate limiter started"
        );
        Ok(Self { shared })
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.shared.config
    }

    /// Record a hit for `user_id` in the user's current group.
    pub fn hit(&self, user_id: &str) {
        let now = Instant::now();
        let interval = self.shared.config.interval;
        let mut state = self.shared.lock();

        let user = state
            .users
            .entry(user_id.to_string())
            .or_insert_with(|| UserRecord {
                group_id: user_id.to_string(),
                last_hit_at: None,
                last_seen: now,
            });
        user.last_hit_at = Some(now);
        user.last_seen = now;
        let group_id = user.group_id.clone();

        let group = state.groups.entry(group_id).or_insert_with(|| GroupRecord {
            hits: VecDeque::new(),
            last_hit_at: now,
        });
        group.prune(now, interval);
        group.hits.push_back(now);
        group.last_hit_at = now;
    }

    /// Whether the group of `id` (a user id, or else a group id) holds at least
    /// `max_hits` hits inside the window.
    pub fn is_rate_limited(&self, id: &str) -> bool {
        self.get_total_hits(id) >= self.shared.config.max_hits
    }

    /// Route future hits of `user_id` to `group_id`. Past hits stay where they are.
    pub fn assign_to_group(&self, user_id: &str, group_id: &str) {
        let now = Instant::now();
        let mut state = self.shared.lock();
        let user = state
            .users
            .entry(user_id.to_string())
            .or_insert_with(|| UserRecord {
                group_id: user_id.to_string(),
                last_hit_at: None,
                last_seen: now,
            });
        user.group_id = group_id.to_string();
        user.last_seen = now;
        debug!(user = %user_id, group = %group_id, "User assigned to group");
    }

    /// Point `user_id` back at its own group.
    pub fn reset_user_group(&self, user_id: &str) {
        if let Some(user) = self.shared.lock().users.get_mut(user_id) {
            user.group_id = user_id.to_string();
        }
    }

    pub fn reset_group(&self, group_id: &str) {
        self.shared.lock().groups.remove(group_id);
    }

    /// Drop the user's record together with its current group.
    pub fn reset_user(&self, user_id: &str) {
        let mut state = self.shared.lock();
        if let Some(user) = state.users.remove(user_id) {
            state.groups.remove(&user.group_id);
        }
    }

    pub fn get_group_id(&self, user_id: &str) -> Option<String> {
        self.shared
            .lock()
            .users
            .get(user_id)
            .map(|user| user.group_id.clone())
    }

    pub fn has_data(&self, id: &str) -> bool {
        let state = self.shared.lock();
        state.users.contains_key(id) || state.groups.contains_key(id)
    }

    /// Hits inside the window for the group of `id`; zero when unknown.
    pub fn get_total_hits(&self, id: &str) -> usize {
        let interval = self.shared.config.interval;
        self.shared
            .lock()
            .window(id, Instant::now(), interval)
            .map_or(0, |group| group.hits.len())
    }

    /// Timestamps inside the window for the group `user_id` currently points to.
    pub fn get_user_hits(&self, user_id: &str) -> Vec<Instant> {
        let interval = self.shared.config.interval;
        self.shared
            .lock()
            .window(user_id, Instant::now(), interval)
            .map(|group| group.hits.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Most recent hit of the user `id`, or else of the group `id`.
    pub fn get_last_hit(&self, id: &str) -> Option<Instant> {
        let state = self.shared.lock();
        match state.users.get(id) {
            Some(user) => user.last_hit_at,
            None => state.groups.get(id).map(|group| group.last_hit_at),
        }
    }

    pub fn get_time_since_last_hit(&self, id: &str) -> Option<Duration> {
        self.get_last_hit(id).map(|at| Instant::now().duration_since(at))
    }

    /// Mean gap between consecutive hits in the window; `None` below two hits.
    pub fn get_average_hit_spacing(&self, id: &str) -> Option<Duration> {
        let interval = self.shared.config.interval;
        self.shared
            .lock()
            .window(id, Instant::now(), interval)
            .and_then(GroupRecord::average_spacing)
    }

    pub fn remaining_hits(&self, id: &str) -> usize {
        self.shared
            .config
            .max_hits
            .saturating_sub(self.get_total_hits(id))
    }

    pub fn get_metrics(&self, id: &str) -> HitMetrics {
        HitMetrics::new(
            self.get_total_hits(id),
            self.shared.config.max_hits,
            self.get_time_since_last_hit(id),
            self.get_average_hit_spacing(id),
        )
    }

    pub fn stats(&self) -> LimiterStats {
        let now = Instant::now();
        let interval = self.shared.config.interval;
        let mut state = self.shared.lock();
        let mut hits_in_window = 0;
        for group in state.groups.values_mut() {
            group.prune(now, interval);
            hits_in_window += group.hits.len();
        }
        LimiterStats {
            users: state.users.len(),
            groups: state.groups.len(),
            hits_in_window,
        }
    }

    /// Run one idle sweep now. Returns the number of evicted groups.
    pub fn cleanup_idle(&self) -> usize {
        let max_idle = self.shared.config.max_idle;
        self.shared.lock().sweep(Instant::now(), max_idle)
    }

    /// Stop the cleanup task and drop all state. Safe to call repeatedly.
    pub fn destroy(&self) {
        let stopped = self.shared.stop_cleanup();
        let mut state = self.shared.lock();
        state.users.clear();
        state.groups.clear();
        if stopped {
            info!("Rate limiter destroyed");
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.shared
            .cleanup
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}
