use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use tracing::warn;

/// Behaviour knobs for [`AdaptiveTimeout`].
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Base timeout when an operation class has no explicit entry.
    pub default_timeout: Duration,
    /// Multiplier applied per retry attempt.
    pub retry_multiplier: f64,
    /// Lower clamp.
    pub min_timeout: Duration,
    /// Upper clamp.
    pub max_timeout: Duration,
    /// When enabled, the P95 of recent successful durations (times
    /// `adaptation_factor`) can stretch the base timeout.
    pub enable_adaptive: bool,
    pub adaptation_factor: f64,
    /// How many recent durations are kept per operation class.
    pub history_size: usize,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(30),
            retry_multiplier: 2.0,
            min_timeout: Duration::from_secs(1),
            max_timeout: Duration::from_secs(300),
            enable_adaptive: true,
            adaptation_factor: 1.5,
            history_size: 100,
        }
    }
}

/// Timeout policy shared by dispatchers and validators.
///
/// Each operation class (`"plan"`, `"work"`, `"lint"`, ...) has a base
/// timeout; retries escalate it multiplicatively and the result is clamped
/// to `[min, max]`. Recording successful durations lets the policy adapt
/// upward when an operation class consistently runs close to its budget.
pub struct AdaptiveTimeout {
    config: TimeoutConfig,
    bases: HashMap<String, Duration>,
    history: Mutex<HashMap<String, VecDeque<Duration>>>,
}

impl AdaptiveTimeout {
    pub fn new(config: TimeoutConfig) -> Self {
        Self {
            config,
            bases: HashMap::new(),
            history: Mutex::new(HashMap::new()),
        }
    }

    /// Register the base timeout for an operation class.
    pub fn with_class(mut self, operation: impl Into<String>, base: Duration) -> Self {
        self.bases.insert(operation.into(), base);
        self
    }

    /// The timeout for `operation` on retry number `attempt` (0 = first try).
    pub fn timeout_for(&self, operation: &str, attempt: u32) -> Duration {
        let base = self
            .bases
            .get(operation)
            .copied()
            .unwrap_or(self.config.default_timeout);

        let mut secs = base.as_secs_f64();
        if attempt > 0 {
            secs *= self.config.retry_multiplier.powi(attempt as i32);
        }

        if self.config.enable_adaptive {
            if let Some(p95) = self.p95(operation) {
                let adapted = p95.as_secs_f64() * self.config.adaptation_factor;
                secs = secs.max(adapted);
            }
        }

        let clamped = secs
            .max(self.config.min_timeout.as_secs_f64())
            .min(self.config.max_timeout.as_secs_f64());
        Duration::from_secs_f64(clamped)
    }

    /// Record the duration of a successful operation.
    pub fn record_success(&self, operation: &str, duration: Duration) {
        let mut history = self.history.lock().unwrap_or_else(|e| {
            warn!("timeout history lock was poisoned, recovering");
            e.into_inner()
        });
        let entry = history.entry(operation.to_string()).or_default();
        if entry.len() >= self.config.history_size {
            entry.pop_front();
        }
        entry.push_back(duration);
    }

    fn p95(&self, operation: &str) -> Option<Duration> {
        let history = self.history.lock().unwrap_or_else(|e| {
            warn!("timeout history lock was poisoned, recovering");
            e.into_inner()
        });
        let entry = history.get(operation)?;
        if entry.is_empty() {
            return None;
        }
        let mut sorted: Vec<Duration> = entry.iter().copied().collect();
        sorted.sort();
        let idx = ((sorted.len() as f64) * 0.95).ceil() as usize;
        Some(sorted[idx.saturating_sub(1).min(sorted.len() - 1)])
    }
}

impl Default for AdaptiveTimeout {
    fn default() -> Self {
        Self::new(TimeoutConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_class_gets_default() {
        let policy = AdaptiveTimeout::default();
        assert_eq!(policy.timeout_for("anything", 0), Duration::from_secs(30));
    }

    #[test]
    fn retries_escalate_and_clamp() {
        let policy = AdaptiveTimeout::new(TimeoutConfig {
            enable_adaptive: false,
            max_timeout: Duration::from_secs(100),
            ..TimeoutConfig::default()
        })
        .with_class("work", Duration::from_secs(30));

        assert_eq!(policy.timeout_for("work", 0), Duration::from_secs(30));
        assert_eq!(policy.timeout_for("work", 1), Duration::from_secs(60));
        // 30 * 2^2 = 120 clamps at the configured maximum.
        assert_eq!(policy.timeout_for("work", 2), Duration::from_secs(100));
    }

    #[test]
    fn adapts_from_recorded_p95() {
        let policy = AdaptiveTimeout::new(TimeoutConfig {
            adaptation_factor: 2.0,
            ..TimeoutConfig::default()
        })
        .with_class("plan", Duration::from_secs(5));

        for _ in 0..20 {
            policy.record_success("plan", Duration::from_secs(10));
        }

        // p95 = 10s, factor 2.0 => 20s stretches the 5s base.
        assert_eq!(policy.timeout_for("plan", 0), Duration::from_secs(20));
    }

    #[test]
    fn min_clamp_applies() {
        let policy = AdaptiveTimeout::new(TimeoutConfig {
            min_timeout: Duration::from_secs(2),
            enable_adaptive: false,
            ..TimeoutConfig::default()
        })
        .with_class("tiny", Duration::from_millis(100));

        assert_eq!(policy.timeout_for("tiny", 0), Duration::from_secs(2));
    }
}
