//! Scheduler configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;
use crate::kernel::CoreId;

/// What the section executor does when a section cannot be admitted under
/// the current load caps.
///
/// The original design retried forever; if no configuration ever fits, the
/// call never returns. `Spin` preserves that behavior for callers that
/// bound admission externally. The default is a bounded retry with a short
/// backoff, which gives up and reports zero processed nodes instead of
/// hanging the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AdmissionPolicy {
    /// Retry forever, reconfiguring between attempts.
    Spin,
    /// Retry at most `max_retries` times, sleeping `backoff_ms` between
    /// attempts.
    Bounded {
        #[serde(default = "default_max_retries")]
        max_retries: u32,
        #[serde(default = "default_backoff_ms")]
        backoff_ms: u64,
    },
}

fn default_max_retries() -> u32 {
    64
}

fn default_backoff_ms() -> u64 {
    2
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        AdmissionPolicy::Bounded {
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

/// Top-level scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Sections allowed to run concurrently within one order level; also
    /// the worker-pool size.
    #[serde(default = "default_max_parallel_sections")]
    pub max_parallel_sections: usize,
    /// Work-queue slots per pool worker.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
    #[serde(default)]
    pub admission: AdmissionPolicy,
    /// Per-resource priority overrides for the manager ranking. Absent
    /// resources use the static defaults.
    #[serde(default)]
    pub core_priorities: HashMap<CoreId, u32>,
}

fn default_max_parallel_sections() -> usize {
    4
}

fn default_queue_depth() -> usize {
    2
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_parallel_sections: default_max_parallel_sections(),
            queue_depth: default_queue_depth(),
            admission: AdmissionPolicy::default(),
            core_priorities: HashMap::new(),
        }
    }
}

impl SchedulerConfig {
    pub fn from_json(json: &str) -> Result<Self, SchedulerError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| SchedulerError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub(crate) fn validate(&self) -> Result<(), SchedulerError> {
        if self.max_parallel_sections == 0 {
            return Err(SchedulerError::InvalidConfig(
                "max_parallel_sections must be at least 1".into(),
            ));
        }
        if self.queue_depth == 0 {
            return Err(SchedulerError::InvalidConfig(
                "queue_depth must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.max_parallel_sections, 4);
        assert_eq!(config.queue_depth, 2);
        assert!(matches!(
            config.admission,
            AdmissionPolicy::Bounded {
                max_retries: 64,
                backoff_ms: 2
            }
        ));
    }

    #[test]
    fn test_from_json() {
        let config = SchedulerConfig::from_json(
            r#"{
                "max_parallel_sections": 2,
                "admission": { "mode": "spin" },
                "core_priorities": { "Gpu": 1000 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.max_parallel_sections, 2);
        assert_eq!(config.queue_depth, 2);
        assert!(matches!(config.admission, AdmissionPolicy::Spin));
        assert_eq!(config.core_priorities.get(&CoreId::Gpu), Some(&1000));
    }

    #[test]
    fn test_zero_parallelism_rejected() {
        let err = SchedulerConfig::from_json(r#"{ "max_parallel_sections": 0 }"#);
        assert!(matches!(err, Err(SchedulerError::InvalidConfig(_))));
    }

    #[test]
    fn test_bounded_policy_partial_json() {
        let config =
            SchedulerConfig::from_json(r#"{ "admission": { "mode": "bounded", "max_retries": 3 } }"#)
                .unwrap();
        assert!(matches!(
            config.admission,
            AdmissionPolicy::Bounded {
                max_retries: 3,
                backoff_ms: 2
            }
        ));
    }
}
