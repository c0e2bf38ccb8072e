//! Pipeline configuration.
//!
//! Built through [`ConfigBuilder`], which starts from documented defaults,
//! applies environment overrides, then programmatic setters. An invalid
//! value from either source falls back to its default with a warning;
//! configuration can never abort startup.

use std::borrow::Cow;
use std::str::FromStr;
use std::time::Duration;
use std::{env, fmt};

use crate::tk_warn;

/// Environment variable configuring the logical service name.
pub(crate) const ENV_SERVICE_NAME: &str = "TRACEKIT_SERVICE_NAME";
/// Environment variable configuring the maximum queue size.
pub(crate) const ENV_MAX_QUEUE_SIZE: &str = "TRACEKIT_MAX_QUEUE_SIZE";
/// Environment variable configuring the maximum export batch size.
pub(crate) const ENV_MAX_EXPORT_BATCH_SIZE: &str = "TRACEKIT_MAX_EXPORT_BATCH_SIZE";
/// Environment variable configuring the delay between exports, in ms.
pub(crate) const ENV_SCHEDULE_DELAY: &str = "TRACEKIT_SCHEDULE_DELAY";
/// Environment variable configuring the per-batch export timeout, in ms.
pub(crate) const ENV_EXPORT_TIMEOUT: &str = "TRACEKIT_EXPORT_TIMEOUT";
/// Environment variable configuring the full-queue drop policy.
pub(crate) const ENV_DROP_POLICY: &str = "TRACEKIT_DROP_POLICY";

pub(crate) const DEFAULT_SERVICE_NAME: &str = "unknown_service";
pub(crate) const DEFAULT_MAX_QUEUE_SIZE: usize = 2_048;
pub(crate) const DEFAULT_MAX_EXPORT_BATCH_SIZE: usize = 512;
pub(crate) const DEFAULT_SCHEDULE_DELAY_MILLIS: u64 = 5_000;
pub(crate) const DEFAULT_EXPORT_TIMEOUT_MILLIS: u64 = 30_000;

/// What to do with an incoming span when the queue is full.
///
/// The source material is split on which end to drop, so there is no implied
/// default beyond the documented one; pick the policy that suits the
/// workload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DropPolicy {
    /// Discard the span being enqueued; the queue keeps the oldest spans.
    #[default]
    DropNewest,
    /// Discard the oldest queued span to make room for the new one.
    DropOldest,
}

impl FromStr for DropPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drop-newest" => Ok(DropPolicy::DropNewest),
            "drop-oldest" => Ok(DropPolicy::DropOldest),
            _ => Err(()),
        }
    }
}

impl fmt::Display for DropPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropPolicy::DropNewest => f.write_str("drop-newest"),
            DropPolicy::DropOldest => f.write_str("drop-oldest"),
        }
    }
}

/// Pipeline configuration. Use [`ConfigBuilder`] to construct an instance.
#[derive(Clone, Debug)]
pub struct Config {
    pub(crate) service_name: Cow<'static, str>,
    pub(crate) max_queue_size: usize,
    pub(crate) max_export_batch_size: usize,
    pub(crate) scheduled_delay: Duration,
    pub(crate) export_timeout: Duration,
    pub(crate) drop_policy: DropPolicy,
}

impl Config {
    /// The logical name of the service emitting spans.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// The maximum number of finalized spans buffered for export. Default
    /// 2048. When the buffer is full, spans are dropped per
    /// [`drop_policy`](Self::drop_policy).
    pub fn max_queue_size(&self) -> usize {
        self.max_queue_size
    }

    /// The maximum number of spans exported in a single batch. Default 512;
    /// never exceeds [`max_queue_size`](Self::max_queue_size).
    pub fn max_export_batch_size(&self) -> usize {
        self.max_export_batch_size
    }

    /// The delay between two consecutive scheduled exports. Default 5s.
    pub fn scheduled_delay(&self) -> Duration {
        self.scheduled_delay
    }

    /// The maximum duration a single export call may take. Default 30s.
    pub fn export_timeout(&self) -> Duration {
        self.export_timeout
    }

    /// The full-queue drop policy.
    pub fn drop_policy(&self) -> DropPolicy {
        self.drop_policy
    }
}

impl Default for Config {
    fn default() -> Self {
        ConfigBuilder::default().build()
    }
}

/// A builder for [`Config`].
#[derive(Clone, Debug)]
pub struct ConfigBuilder {
    service_name: Cow<'static, str>,
    max_queue_size: usize,
    max_export_batch_size: usize,
    scheduled_delay: Duration,
    export_timeout: Duration,
    drop_policy: DropPolicy,
}

impl Default for ConfigBuilder {
    /// Create a builder initialized with the documented defaults, then
    /// overridden by environment variables if set:
    /// * `TRACEKIT_SERVICE_NAME`
    /// * `TRACEKIT_MAX_QUEUE_SIZE`
    /// * `TRACEKIT_MAX_EXPORT_BATCH_SIZE`
    /// * `TRACEKIT_SCHEDULE_DELAY`
    /// * `TRACEKIT_EXPORT_TIMEOUT`
    /// * `TRACEKIT_DROP_POLICY`
    fn default() -> Self {
        ConfigBuilder {
            service_name: Cow::Borrowed(DEFAULT_SERVICE_NAME),
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            max_export_batch_size: DEFAULT_MAX_EXPORT_BATCH_SIZE,
            scheduled_delay: Duration::from_millis(DEFAULT_SCHEDULE_DELAY_MILLIS),
            export_timeout: Duration::from_millis(DEFAULT_EXPORT_TIMEOUT_MILLIS),
            drop_policy: DropPolicy::default(),
        }
        .init_from_env_vars()
    }
}

impl ConfigBuilder {
    /// Set the logical service name recorded on every root span.
    pub fn with_service_name(mut self, service_name: impl Into<Cow<'static, str>>) -> Self {
        self.service_name = service_name.into();
        self
    }

    /// Set the maximum queue size.
    pub fn with_max_queue_size(mut self, max_queue_size: usize) -> Self {
        self.max_queue_size = max_queue_size;
        self
    }

    /// Set the maximum export batch size.
    pub fn with_max_export_batch_size(mut self, max_export_batch_size: usize) -> Self {
        self.max_export_batch_size = max_export_batch_size;
        self
    }

    /// Set the delay between two consecutive scheduled exports.
    pub fn with_scheduled_delay(mut self, scheduled_delay: Duration) -> Self {
        self.scheduled_delay = scheduled_delay;
        self
    }

    /// Set the per-batch export timeout.
    pub fn with_export_timeout(mut self, export_timeout: Duration) -> Self {
        self.export_timeout = export_timeout;
        self
    }

    /// Set the full-queue drop policy.
    pub fn with_drop_policy(mut self, drop_policy: DropPolicy) -> Self {
        self.drop_policy = drop_policy;
        self
    }

    /// Build a `Config`, enforcing the following invariants:
    /// * sizes are non-zero, falling back to defaults otherwise;
    /// * `max_export_batch_size` never exceeds `max_queue_size`.
    pub fn build(mut self) -> Config {
        if self.max_queue_size == 0 {
            tk_warn!(
                name: "config.invalid_max_queue_size",
                fallback = DEFAULT_MAX_QUEUE_SIZE
            );
            self.max_queue_size = DEFAULT_MAX_QUEUE_SIZE;
        }
        if self.max_export_batch_size == 0 {
            tk_warn!(
                name: "config.invalid_max_export_batch_size",
                fallback = DEFAULT_MAX_EXPORT_BATCH_SIZE
            );
            self.max_export_batch_size = DEFAULT_MAX_EXPORT_BATCH_SIZE;
        }
        let max_export_batch_size = self.max_export_batch_size.min(self.max_queue_size);

        Config {
            service_name: self.service_name,
            max_queue_size: self.max_queue_size,
            max_export_batch_size,
            scheduled_delay: self.scheduled_delay,
            export_timeout: self.export_timeout,
            drop_policy: self.drop_policy,
        }
    }

    fn init_from_env_vars(mut self) -> Self {
        if let Ok(service_name) = env::var(ENV_SERVICE_NAME) {
            if service_name.trim().is_empty() {
                tk_warn!(name: "config.invalid_env", var = ENV_SERVICE_NAME);
            } else {
                self.service_name = Cow::Owned(service_name);
            }
        }

        if let Some(max_queue_size) = parse_env(ENV_MAX_QUEUE_SIZE, usize::from_str) {
            self.max_queue_size = max_queue_size;
        }

        if let Some(max_export_batch_size) = parse_env(ENV_MAX_EXPORT_BATCH_SIZE, usize::from_str)
        {
            self.max_export_batch_size = max_export_batch_size;
        }

        if let Some(delay) = parse_env(ENV_SCHEDULE_DELAY, u64::from_str) {
            self.scheduled_delay = Duration::from_millis(delay);
        }

        if let Some(timeout) = parse_env(ENV_EXPORT_TIMEOUT, u64::from_str) {
            self.export_timeout = Duration::from_millis(timeout);
        }

        if let Some(drop_policy) = parse_env(ENV_DROP_POLICY, DropPolicy::from_str) {
            self.drop_policy = drop_policy;
        }

        self
    }
}

/// Read and parse an environment variable. A value that fails to parse is
/// reported and ignored so the default stays in effect.
fn parse_env<T, E>(var: &'static str, parse: impl Fn(&str) -> Result<T, E>) -> Option<T> {
    let raw = env::var(var).ok()?;
    match parse(raw.trim()) {
        Ok(value) => Some(value),
        Err(_) => {
            tk_warn!(name: "config.invalid_env", var = var, value = raw.as_str());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENV_VARS: [&str; 6] = [
        ENV_SERVICE_NAME,
        ENV_MAX_QUEUE_SIZE,
        ENV_MAX_EXPORT_BATCH_SIZE,
        ENV_SCHEDULE_DELAY,
        ENV_EXPORT_TIMEOUT,
        ENV_DROP_POLICY,
    ];

    #[test]
    fn default_config_adheres_to_documented_values() {
        let config = temp_env::with_vars_unset(ENV_VARS, Config::default);

        assert_eq!(config.service_name(), DEFAULT_SERVICE_NAME);
        assert_eq!(config.max_queue_size(), 2048);
        assert_eq!(config.max_export_batch_size(), 512);
        assert_eq!(config.scheduled_delay(), Duration::from_millis(5000));
        assert_eq!(config.export_timeout(), Duration::from_millis(30000));
        assert_eq!(config.drop_policy(), DropPolicy::DropNewest);
    }

    #[test]
    fn config_configurable_by_env_vars() {
        let env_vars = vec![
            (ENV_SERVICE_NAME, Some("checkout")),
            (ENV_MAX_QUEUE_SIZE, Some("4096")),
            (ENV_MAX_EXPORT_BATCH_SIZE, Some("1024")),
            (ENV_SCHEDULE_DELAY, Some("2000")),
            (ENV_EXPORT_TIMEOUT, Some("60000")),
            (ENV_DROP_POLICY, Some("drop-oldest")),
        ];

        let config = temp_env::with_vars(env_vars, Config::default);

        assert_eq!(config.service_name(), "checkout");
        assert_eq!(config.max_queue_size(), 4096);
        assert_eq!(config.max_export_batch_size(), 1024);
        assert_eq!(config.scheduled_delay(), Duration::from_millis(2000));
        assert_eq!(config.export_timeout(), Duration::from_millis(60000));
        assert_eq!(config.drop_policy(), DropPolicy::DropOldest);
    }

    #[test]
    fn invalid_env_values_fall_back_to_defaults() {
        let env_vars = vec![
            (ENV_MAX_QUEUE_SIZE, Some("not-a-number")),
            (ENV_SCHEDULE_DELAY, Some("-5")),
            (ENV_DROP_POLICY, Some("drop-random")),
            (ENV_SERVICE_NAME, Some("  ")),
        ];

        let config = temp_env::with_vars(env_vars, Config::default);

        assert_eq!(config.max_queue_size(), DEFAULT_MAX_QUEUE_SIZE);
        assert_eq!(
            config.scheduled_delay(),
            Duration::from_millis(DEFAULT_SCHEDULE_DELAY_MILLIS)
        );
        assert_eq!(config.drop_policy(), DropPolicy::DropNewest);
        assert_eq!(config.service_name(), DEFAULT_SERVICE_NAME);
    }

    #[test]
    fn batch_size_clamped_to_queue_size() {
        let config = temp_env::with_vars_unset(ENV_VARS, || {
            ConfigBuilder::default()
                .with_max_queue_size(256)
                .with_max_export_batch_size(1024)
                .build()
        });

        assert_eq!(config.max_queue_size(), 256);
        assert_eq!(config.max_export_batch_size(), 256);
    }

    #[test]
    fn zero_sizes_fall_back_to_defaults() {
        let config = temp_env::with_vars_unset(ENV_VARS, || {
            ConfigBuilder::default()
                .with_max_queue_size(0)
                .with_max_export_batch_size(0)
                .build()
        });

        assert_eq!(config.max_queue_size(), DEFAULT_MAX_QUEUE_SIZE);
        assert_eq!(config.max_export_batch_size(), DEFAULT_MAX_EXPORT_BATCH_SIZE);
    }

    #[test]
    fn drop_policy_parses_case_insensitively() {
        assert_eq!(
            "Drop-Oldest".parse::<DropPolicy>(),
            Ok(DropPolicy::DropOldest)
        );
        assert_eq!(
            " drop-newest ".parse::<DropPolicy>(),
            Ok(DropPolicy::DropNewest)
        );
        assert!("keep-all".parse::<DropPolicy>().is_err());
    }
}
