//! 熔断器
//!
//! 每个 provider 一个状态机，所有 worker 共享。
//! 时间通过参数传入，便于测试时构造任意时刻。

use dashmap::DashMap;
use serde::Serialize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// 熔断状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// 熔断器配置
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    /// 连续 transient 失败多少次后打开
    pub failure_threshold: u32,
    /// 首次打开的冷却时间
    pub cooldown_base: Duration,
    /// 冷却时间上限
    pub cooldown_max: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_base: Duration::from_secs(30),
            cooldown_max: Duration::from_secs(300),
        }
    }
}

/// 调用许可
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// 正常放行
    Allowed,
    /// half_open 下唯一的试探调用
    Trial,
    /// 熔断中，不允许调用
    Rejected,
}

impl Admission {
    pub fn is_permitted(&self) -> bool {
        !matches!(self, Admission::Rejected)
    }
}

/// 对外展示的熔断快照
#[derive(Debug, Clone, Serialize)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub open_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_remaining_ms: Option<u64>,
}

/// 单个 provider 的熔断器
///
/// - closed: 连续失败达到阈值后 open
/// - open: 冷却结束后转为 half_open
/// - half_open: 只放行一次试探，成功 closed，失败重新 open 且冷却翻倍
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    cooldown_until: Option<Instant>,
    open_count: u32,
    trial_in_flight: bool,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            cooldown_until: None,
            open_count: 0,
            trial_in_flight: false,
        }
    }

    /// 当前时刻的有效状态（open 冷却结束即视为 half_open）
    pub fn state_at(&self, now: Instant) -> CircuitState {
        match (self.state, self.cooldown_until) {
            (CircuitState::Open, Some(until)) if now >= until => CircuitState::HalfOpen,
            (state, _) => state,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn open_count(&self) -> u32 {
        self.open_count
    }

    pub fn opened_at(&self) -> Option<Instant> {
        self.opened_at
    }

    /// 不改变状态，只判断现在是否可能放行
    pub fn is_available_at(&self, now: Instant) -> bool {
        match self.state_at(now) {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => !self.trial_in_flight,
        }
    }

    /// 申请一次调用许可
    pub fn try_acquire_at(&mut self, now: Instant) -> Admission {
        match self.state_at(now) {
            CircuitState::Closed => Admission::Allowed,
            CircuitState::Open => Admission::Rejected,
            CircuitState::HalfOpen => {
                self.state = CircuitState::HalfOpen;
                if self.trial_in_flight {
                    Admission::Rejected
                } else {
                    self.trial_in_flight = true;
                    Admission::Trial
                }
            }
        }
    }

    pub fn record_success(&mut self) {
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.open_count = 0;
        self.opened_at = None;
        self.cooldown_until = None;
        self.trial_in_flight = false;
    }

    /// 记录一次 transient 失败
    pub fn record_failure_at(&mut self, now: Instant) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        match self.state {
            CircuitState::Closed => {
                if self.consecutive_failures >= self.config.failure_threshold {
                    self.open(now);
                }
            }
            CircuitState::HalfOpen => self.open(now),
            // 打开之前放行的调用晚到的失败，不延长冷却
            CircuitState::Open => {}
        }
    }

    /// permanent 错误不计入熔断；若来自试探调用则归还试探名额
    pub fn release_trial(&mut self) {
        if self.state == CircuitState::HalfOpen {
            self.trial_in_flight = false;
        }
    }

    pub fn snapshot_at(&self, now: Instant) -> CircuitSnapshot {
        let state = self.state_at(now);
        let cooldown_remaining_ms = match (state, self.cooldown_until) {
            (CircuitState::Open, Some(until)) => {
                Some(until.saturating_duration_since(now).as_millis() as u64)
            }
            _ => None,
        };
        CircuitSnapshot {
            state,
            consecutive_failures: self.consecutive_failures,
            open_count: self.open_count,
            cooldown_remaining_ms,
        }
    }

    fn open(&mut self, now: Instant) {
        let cooldown = self.cooldown_for(self.open_count);
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        self.cooldown_until = Some(now + cooldown);
        self.open_count = self.open_count.saturating_add(1);
        self.trial_in_flight = false;
    }

    /// min(base * 2^n, max)
    fn cooldown_for(&self, open_count: u32) -> Duration {
        let factor = 1u32.checked_shl(open_count.min(31)).unwrap_or(u32::MAX);
        self.config
            .cooldown_base
            .checked_mul(factor)
            .unwrap_or(self.config.cooldown_max)
            .min(self.config.cooldown_max)
    }
}

/// 所有 provider 的熔断器
///
/// 每个熔断器单独加锁，不同 provider 之间互不阻塞
#[derive(Debug)]
pub struct CircuitBreakerStore {
    config: CircuitBreakerConfig,
    breakers: DashMap<String, Mutex<CircuitBreaker>>,
}

impl CircuitBreakerStore {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    fn with_breaker<R>(&self, provider: &str, f: impl FnOnce(&mut CircuitBreaker) -> R) -> R {
        let entry = self
            .breakers
            .entry(provider.to_string())
            .or_insert_with(|| Mutex::new(CircuitBreaker::new(self.config)));
        let mut breaker = entry.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut breaker)
    }

    pub fn try_acquire(&self, provider: &str) -> Admission {
        let now = Instant::now();
        self.with_breaker(provider, |b| b.try_acquire_at(now))
    }

    pub fn is_available(&self, provider: &str) -> bool {
        let now = Instant::now();
        self.with_breaker(provider, |b| b.is_available_at(now))
    }

    pub fn record_success(&self, provider: &str) {
        let previous = self.with_breaker(provider, |b| {
            let previous = b.state;
            b.record_success();
            previous
        });
        if previous != CircuitState::Closed {
            tracing::info!(provider = %provider, "Circuit closed");
        }
    }

    pub fn record_failure(&self, provider: &str) {
        let now = Instant::now();
        let (before, after, open_count) = self.with_breaker(provider, |b| {
            let before = b.state;
            b.record_failure_at(now);
            (before, b.state, b.open_count)
        });
        if before != CircuitState::Open && after == CircuitState::Open {
            tracing::warn!(provider = %provider, open_count, "Circuit opened");
        }
    }

    pub fn release_trial(&self, provider: &str) {
        self.with_breaker(provider, |b| b.release_trial());
    }

    /// 为一次许可创建守卫；试探调用在记录结果前被丢弃时归还名额
    pub fn guard<'a>(&'a self, provider: &'a str, admission: Admission) -> TrialGuard<'a> {
        TrialGuard {
            store: self,
            provider,
            armed: admission == Admission::Trial,
        }
    }

    pub fn state(&self, provider: &str) -> CircuitState {
        let now = Instant::now();
        self.with_breaker(provider, |b| b.state_at(now))
    }

    pub fn snapshot(&self, provider: &str) -> CircuitSnapshot {
        let now = Instant::now();
        self.with_breaker(provider, |b| b.snapshot_at(now))
    }
}

/// half_open 试探名额守卫
///
/// job 超时、任务取消或 panic 都会直接丢弃进行中的调用，
/// 此时既没有 record_success 也没有 record_failure，名额必须在 Drop 中归还
pub struct TrialGuard<'a> {
    store: &'a CircuitBreakerStore,
    provider: &'a str,
    armed: bool,
}

impl TrialGuard<'_> {
    pub fn record_success(mut self) {
        self.armed = false;
        self.store.record_success(self.provider);
    }

    pub fn record_failure(mut self) {
        self.armed = false;
        self.store.record_failure(self.provider);
    }
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.store.release_trial(self.provider);
            tracing::debug!(provider = %self.provider, "Abandoned circuit trial released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 3,
            cooldown_base: Duration::from_secs(10),
            cooldown_max: Duration::from_secs(25),
        }
    }

    fn tripped(now: Instant) -> CircuitBreaker {
        let mut cb = CircuitBreaker::new(config());
        for _ in 0..3 {
            assert_eq!(cb.try_acquire_at(now), Admission::Allowed);
            cb.record_failure_at(now);
        }
        cb
    }

    #[test]
    fn test_opens_after_threshold() {
        let now = Instant::now();
        let mut cb = CircuitBreaker::new(config());
        cb.record_failure_at(now);
        cb.record_failure_at(now);
        assert_eq!(cb.state_at(now), CircuitState::Closed);

        cb.record_failure_at(now);
        assert_eq!(cb.state_at(now), CircuitState::Open);
        assert_eq!(cb.try_acquire_at(now), Admission::Rejected);
        assert!(!cb.is_available_at(now));
    }

    #[test]
    fn test_success_resets_consecutive_failures() {
        let now = Instant::now();
        let mut cb = CircuitBreaker::new(config());
        cb.record_failure_at(now);
        cb.record_failure_at(now);
        cb.record_success();
        cb.record_failure_at(now);
        assert_eq!(cb.state_at(now), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 1);
    }

    #[test]
    fn test_half_open_admits_exactly_one_trial() {
        let now = Instant::now();
        let mut cb = tripped(now);
        let later = now + Duration::from_secs(10);

        assert_eq!(cb.state_at(later), CircuitState::HalfOpen);
        assert!(cb.is_available_at(later));
        assert_eq!(cb.try_acquire_at(later), Admission::Trial);
        assert_eq!(cb.try_acquire_at(later), Admission::Rejected);
        assert_eq!(cb.try_acquire_at(later), Admission::Rejected);
        assert!(!cb.is_available_at(later));

        cb.record_success();
        assert_eq!(cb.state_at(later), CircuitState::Closed);
        assert_eq!(cb.open_count(), 0);
        assert_eq!(cb.try_acquire_at(later), Admission::Allowed);
    }

    #[test]
    fn test_trial_failure_reopens_with_longer_cooldown() {
        let now = Instant::now();
        let mut cb = tripped(now);
        assert!(cb.opened_at().is_some());

        let t1 = now + Duration::from_secs(10);
        assert_eq!(cb.try_acquire_at(t1), Admission::Trial);
        cb.record_failure_at(t1);
        assert_eq!(cb.state_at(t1), CircuitState::Open);

        // 第二次冷却 20s
        assert_eq!(cb.state_at(t1 + Duration::from_secs(19)), CircuitState::Open);
        let t2 = t1 + Duration::from_secs(20);
        assert_eq!(cb.try_acquire_at(t2), Admission::Trial);
        cb.record_failure_at(t2);

        // 第三次冷却 40s，被上限截到 25s
        assert_eq!(cb.state_at(t2 + Duration::from_secs(24)), CircuitState::Open);
        assert_eq!(cb.state_at(t2 + Duration::from_secs(25)), CircuitState::HalfOpen);
    }

    #[test]
    fn test_release_trial_keeps_half_open() {
        let now = Instant::now();
        let mut cb = tripped(now);
        let later = now + Duration::from_secs(10);

        assert_eq!(cb.try_acquire_at(later), Admission::Trial);
        cb.release_trial();
        assert_eq!(cb.state_at(later), CircuitState::HalfOpen);
        assert_eq!(cb.try_acquire_at(later), Admission::Trial);
    }

    #[test]
    fn test_snapshot_reports_remaining_cooldown() {
        let now = Instant::now();
        let cb = tripped(now);
        let snapshot = cb.snapshot_at(now + Duration::from_secs(4));
        assert_eq!(snapshot.state, CircuitState::Open);
        assert_eq!(snapshot.cooldown_remaining_ms, Some(6000));
        assert_eq!(snapshot.open_count, 1);
    }

    #[test]
    fn test_store_isolates_providers() {
        let store = CircuitBreakerStore::new(config());
        for _ in 0..3 {
            store.record_failure("a");
        }
        assert_eq!(store.state("a"), CircuitState::Open);
        assert_eq!(store.try_acquire("a"), Admission::Rejected);
        assert_eq!(store.state("b"), CircuitState::Closed);
        assert!(store.is_available("b"));

        store.record_success("a");
        assert!(store.is_available("a"));
    }

    fn half_open_store() -> CircuitBreakerStore {
        let store = CircuitBreakerStore::new(CircuitBreakerConfig {
            failure_threshold: 1,
            cooldown_base: Duration::ZERO,
            cooldown_max: Duration::ZERO,
        });
        store.record_failure("a");
        store
    }

    #[test]
    fn test_dropped_trial_guard_returns_slot() {
        let store = half_open_store();

        let admission = store.try_acquire("a");
        assert_eq!(admission, Admission::Trial);
        let guard = store.guard("a", admission);
        assert!(!store.is_available("a"));
        drop(guard);

        assert_eq!(store.state("a"), CircuitState::HalfOpen);
        assert!(store.is_available("a"));
        assert_eq!(store.try_acquire("a"), Admission::Trial);
    }

    #[test]
    fn test_settled_trial_guard_keeps_outcome() {
        let store = half_open_store();

        let admission = store.try_acquire("a");
        store.guard("a", admission).record_success();
        assert_eq!(store.state("a"), CircuitState::Closed);

        store.record_failure("a");
        let admission = store.try_acquire("a");
        assert_eq!(admission, Admission::Trial);
        store.guard("a", admission).record_failure();
        assert_eq!(store.snapshot("a").open_count, 2);
    }
}
