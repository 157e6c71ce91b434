//! Invocation metrics.
//!
//! [`MetricsCollector`] is a [`ContainerObserver`]: register it on the
//! container builder and it records per-method timing, instance lifecycle
//! counts and invocation outcomes.

use std::time::{Duration, SystemTime};

use ahash::AHashMap;
use parking_lot::{Mutex, RwLock};

use crate::observer::{ContainerObserver, InvocationEvent, InvocationOutcome};

const RECENT_SAMPLES: usize = 100;

/// Timing statistics for one deployment method.
#[derive(Debug, Clone)]
pub struct TimingStats {
    pub count: u64,
    pub min_duration: Duration,
    pub max_duration: Duration,
    pub total_duration: Duration,
    /// Most recent samples, oldest first.
    pub recent_times: Vec<Duration>,
}

impl TimingStats {
    fn new() -> Self {
        Self {
            count: 0,
            min_duration: Duration::MAX,
            max_duration: Duration::ZERO,
            total_duration: Duration::ZERO,
            recent_times: Vec::with_capacity(RECENT_SAMPLES),
        }
    }

    pub fn record(&mut self, duration: Duration) {
        self.count += 1;
        self.min_duration = self.min_duration.min(duration);
        self.max_duration = self.max_duration.max(duration);
        self.total_duration += duration;

        if self.recent_times.len() >= RECENT_SAMPLES {
            self.recent_times.remove(0);
        }
        self.recent_times.push(duration);
    }

    pub fn average_duration(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            self.total_duration / self.count as u32
        }
    }

    pub fn p95_duration(&self) -> Duration {
        if self.recent_times.is_empty() {
            return Duration::ZERO;
        }
        let mut sorted = self.recent_times.clone();
        sorted.sort();
        let index = (sorted.len() as f64 * 0.95) as usize;
        sorted[index.min(sorted.len() - 1)]
    }
}

/// Container-wide counters.
#[derive(Debug, Clone)]
pub struct ContainerMetrics {
    pub start_time: SystemTime,
    pub instances_created: u64,
    pub instances_destroyed: u64,
    pub creation_failures: u64,
    pub invocations: u64,
    pub application_exceptions: u64,
    pub system_exceptions: u64,
    pub rejected: u64,
    pub lock_timeouts: u64,
    pub async_submitted: u64,
}

impl ContainerMetrics {
    fn new() -> Self {
        Self {
            start_time: SystemTime::now(),
            instances_created: 0,
            instances_destroyed: 0,
            creation_failures: 0,
            invocations: 0,
            application_exceptions: 0,
            system_exceptions: 0,
            rejected: 0,
            lock_timeouts: 0,
            async_submitted: 0,
        }
    }
}

/// Collects metrics from container events.
///
/// # Examples
///
/// ```rust
/// use ferrous_singleton::{MetricsCollector, SingletonContainer};
/// use std::sync::Arc;
///
/// let metrics = Arc::new(MetricsCollector::new());
/// let container = SingletonContainer::builder()
///     .observer(metrics.clone())
///     .build()
///     .unwrap();
///
/// assert_eq!(metrics.snapshot().invocations, 0);
/// # container.shutdown();
/// ```
#[derive(Debug)]
pub struct MetricsCollector {
    timings: RwLock<AHashMap<(String, String), TimingStats>>,
    totals: Mutex<ContainerMetrics>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            timings: RwLock::new(AHashMap::new()),
            totals: Mutex::new(ContainerMetrics::new()),
        }
    }

    pub fn timing_stats(&self, deployment_id: &str, method: &str) -> Option<TimingStats> {
        self.timings
            .read()
            .get(&(deployment_id.to_string(), method.to_string()))
            .cloned()
    }

    pub fn snapshot(&self) -> ContainerMetrics {
        self.totals.lock().clone()
    }

    /// Methods with the highest average duration, slowest first.
    pub fn slowest_methods(&self, limit: usize) -> Vec<(String, String, Duration)> {
        let timings = self.timings.read();
        let mut methods: Vec<_> = timings
            .iter()
            .map(|((deployment, method), stats)| (deployment.clone(), method.clone(), stats.average_duration()))
            .collect();
        methods.sort_by(|a, b| b.2.cmp(&a.2));
        methods.truncate(limit);
        methods
    }

    /// Renders counters and per-method timing in Prometheus text format.
    pub fn export_prometheus(&self) -> String {
        let totals = self.snapshot();
        let mut output = String::new();
        for (name, help, value) in [
            ("instances_created", "Singleton instances constructed", totals.instances_created),
            ("instances_destroyed", "Singleton instances torn down", totals.instances_destroyed),
            ("invocations_total", "Business invocations completed", totals.invocations),
            ("system_exceptions_total", "Invocations ending in a system exception", totals.system_exceptions),
            ("lock_timeouts_total", "Lock waits that expired", totals.lock_timeouts),
        ] {
            output.push_str(&format!(
                "# HELP ferrous_singleton_{name} {help}\n# TYPE ferrous_singleton_{name} counter\nferrous_singleton_{name} {value}\n\n"
            ));
        }

        output.push_str(
            "# HELP ferrous_singleton_invocation_duration_seconds Time spent in business methods\n\
             # TYPE ferrous_singleton_invocation_duration_seconds summary\n",
        );
        let timings = self.timings.read();
        let mut keys: Vec<_> = timings.keys().collect();
        keys.sort();
        for key in keys {
            let stats = &timings[key];
            output.push_str(&format!(
                "ferrous_singleton_invocation_duration_seconds_sum{{deployment=\"{}\",method=\"{}\"}} {}\n\
                 ferrous_singleton_invocation_duration_seconds_count{{deployment=\"{}\",method=\"{}\"}} {}\n",
                key.0,
                key.1,
                stats.total_duration.as_secs_f64(),
                key.0,
                key.1,
                stats.count
            ));
        }
        output
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerObserver for MetricsCollector {
    fn instance_created(&self, _deployment_id: &str, _elapsed: Duration) {
        self.totals.lock().instances_created += 1;
    }

    fn instance_creation_failed(&self, _deployment_id: &str, _message: &str) {
        self.totals.lock().creation_failures += 1;
    }

    fn instance_destroyed(&self, _deployment_id: &str) {
        self.totals.lock().instances_destroyed += 1;
    }

    fn invocation_completed(&self, event: &InvocationEvent<'_>, outcome: InvocationOutcome, elapsed: Duration) {
        {
            let mut totals = self.totals.lock();
            totals.invocations += 1;
            match outcome {
                InvocationOutcome::Success => {}
                InvocationOutcome::ApplicationException => totals.application_exceptions += 1,
                InvocationOutcome::SystemException => totals.system_exceptions += 1,
                InvocationOutcome::Rejected => totals.rejected += 1,
            }
        }
        if outcome != InvocationOutcome::Rejected {
            self.timings
                .write()
                .entry((event.deployment_id.to_string(), event.method.to_string()))
                .or_insert_with(TimingStats::new)
                .record(elapsed);
        }
    }

    fn lock_timeout(&self, _event: &InvocationEvent<'_>, _waited: Duration) {
        self.totals.lock().lock_timeouts += 1;
    }

    fn async_submitted(&self, _deployment_id: &str, _method: &str) {
        self.totals.lock().async_submitted += 1;
    }
}
