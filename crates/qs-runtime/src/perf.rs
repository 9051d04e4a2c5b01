use std::time::{Duration, Instant};

use dashmap::DashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GovernorSettings {
    pub warn_threshold: Duration,
    pub throttle_threshold: Duration,
    pub consecutive_limit: u32,
    pub throttle_duration: Duration,
}

impl Default for GovernorSettings {
    fn default() -> Self {
        Self {
            warn_threshold: Duration::from_millis(50),
            throttle_threshold: Duration::from_millis(200),
            consecutive_limit: 3,
            throttle_duration: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptStatistics {
    pub executions: u64,
    pub total: Duration,
    pub min: Option<Duration>,
    pub max: Duration,
    pub last: Duration,
    pub errors: u64,
    pub warnings: u64,
    pub throttles: u64,
}

impl ScriptStatistics {
    pub fn average(&self) -> Duration {
        if self.executions == 0 {
            return Duration::ZERO;
        }
        let nanos = self.total.as_nanos() / u128::from(self.executions);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PerfNotice {
    Slow {
        script_id: String,
        duration: Duration,
    },
    Throttled {
        script_id: String,
        duration: Duration,
        until: Instant,
    },
}

/// Per-script timing statistics and temporary throttling of scripts that
/// are slow several times in a row.
#[derive(Debug, Default)]
pub struct PerformanceGovernor {
    settings: GovernorSettings,
    stats: DashMap<String, ScriptStatistics>,
    consecutive: DashMap<String, u32>,
    throttles: DashMap<String, Instant>,
}

impl PerformanceGovernor {
    pub fn new(settings: GovernorSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    pub fn settings(&self) -> GovernorSettings {
        self.settings
    }

    pub fn record(&self, script_id: &str, duration: Duration) -> Vec<PerfNotice> {
        self.record_at(script_id, duration, Instant::now())
    }

    pub fn record_at(&self, script_id: &str, duration: Duration, now: Instant) -> Vec<PerfNotice> {
        let mut notices = Vec::new();
        let mut stats = self.stats.entry(script_id.to_string()).or_default();
        stats.executions += 1;
        stats.total += duration;
        stats.last = duration;
        stats.max = stats.max.max(duration);
        stats.min = Some(stats.min.map_or(duration, |min| min.min(duration)));

        let mut consecutive = self.consecutive.entry(script_id.to_string()).or_insert(0);
        if duration <= self.settings.warn_threshold {
            *consecutive = 0;
            return notices;
        }

        stats.warnings += 1;
        *consecutive += 1;
        tracing::warn!(
            target: "perf",
            script = script_id,
            elapsed_ms = duration.as_millis() as u64,
            consecutive = *consecutive,
            "slow script execution"
        );
        notices.push(PerfNotice::Slow {
            script_id: script_id.to_string(),
            duration,
        });

        if duration > self.settings.throttle_threshold
            && *consecutive >= self.settings.consecutive_limit
        {
            let until = now + self.settings.throttle_duration;
            *consecutive = 0;
            stats.throttles += 1;
            self.throttles.insert(script_id.to_string(), until);
            tracing::warn!(
                target: "perf",
                script = script_id,
                throttle_ms = self.settings.throttle_duration.as_millis() as u64,
                "script throttled"
            );
            notices.push(PerfNotice::Throttled {
                script_id: script_id.to_string(),
                duration,
                until,
            });
        }
        notices
    }

    pub fn record_error(&self, script_id: &str) {
        self.stats.entry(script_id.to_string()).or_default().errors += 1;
    }

    pub fn is_throttled(&self, script_id: &str) -> bool {
        self.is_throttled_at(script_id, Instant::now())
    }

    /// Expired throttles are dropped here rather than by a timer.
    pub fn is_throttled_at(&self, script_id: &str, now: Instant) -> bool {
        let Some(until) = self.throttles.get(script_id).map(|entry| *entry.value()) else {
            return false;
        };
        if now >= until {
            self.throttles.remove(script_id);
            tracing::info!(target: "perf", script = script_id, "throttle expired");
            return false;
        }
        true
    }

    pub fn unthrottle(&self, script_id: &str) -> bool {
        self.consecutive.remove(script_id);
        self.throttles.remove(script_id).is_some()
    }

    pub fn statistics(&self, script_id: &str) -> Option<ScriptStatistics> {
        self.stats.get(script_id).map(|entry| entry.value().clone())
    }

    pub fn all_statistics(&self) -> Vec<(String, ScriptStatistics)> {
        let mut all = self
            .stats
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect::<Vec<_>>();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub fn throttled_scripts(&self) -> Vec<String> {
        let mut ids = self
            .throttles
            .iter()
            .map(|entry| entry.key().clone())
            .collect::<Vec<_>>();
        ids.sort();
        ids
    }

    /// Clears statistics for one script, or for all when `script_id` is
    /// `None`. Throttles are left alone.
    pub fn reset_statistics(&self, script_id: Option<&str>) {
        match script_id {
            Some(script_id) => {
                self.stats.remove(script_id);
                self.consecutive.remove(script_id);
            }
            None => {
                self.stats.clear();
                self.consecutive.clear();
            }
        }
    }

    pub fn forget(&self, script_id: &str) {
        self.stats.remove(script_id);
        self.consecutive.remove(script_id);
        self.throttles.remove(script_id);
    }
}
