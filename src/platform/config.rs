//! `tlsmatrix.toml` config loading.

use serde::{Deserialize, Serialize};

use std::path::{Path, PathBuf};

use crate::{MatrixError, MatrixResult, ScheduleOrder, ScheduleSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleMode {
    Fifo,
    Shuffled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Variants of one test in flight at once.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,

    /// Tests run concurrently by the runner.
    #[serde(default = "default_test_jobs")]
    pub test_jobs: usize,

    /// Per-variant execution timeout, e.g. "30s".
    #[serde(default = "default_variant_timeout")]
    pub variant_timeout: String,

    /// Coverage strength used when a test does not request one.
    #[serde(default = "default_strength")]
    pub strength: usize,

    /// Upper bound on solver tuples per test.
    #[serde(default = "default_max_combinations")]
    pub max_combinations: usize,

    #[serde(default = "default_schedule")]
    pub schedule: ScheduleMode,

    /// Seed for shuffled dispatch; 0 when unset.
    #[serde(default)]
    pub seed: Option<u64>,

    /// JSON capability snapshot of the target.
    #[serde(default)]
    pub capabilities: Option<PathBuf>,
}

fn default_parallelism() -> usize {
    4
}

fn default_test_jobs() -> usize {
    1
}

fn default_variant_timeout() -> String {
    "60s".to_string()
}

fn default_strength() -> usize {
    2
}

fn default_max_combinations() -> usize {
    10_000
}

fn default_schedule() -> ScheduleMode {
    ScheduleMode::Fifo
}

impl Default for Config {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
            test_jobs: default_test_jobs(),
            variant_timeout: default_variant_timeout(),
            strength: default_strength(),
            max_combinations: default_max_combinations(),
            schedule: default_schedule(),
            seed: None,
            capabilities: None,
        }
    }
}

impl Config {
    pub fn load_optional(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(s) => match toml::from_str::<Config>(&s) {
                Ok(cfg) => cfg,
                Err(err) => {
                    tracing::warn!("failed to parse config {}: {err}", path.display());
                    Self::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(err) => {
                tracing::warn!("failed to read config {}: {err}", path.display());
                Self::default()
            }
        }
    }

    pub fn schedule_order(&self) -> ScheduleOrder {
        match self.schedule {
            ScheduleMode::Fifo => ScheduleOrder::Fifo,
            ScheduleMode::Shuffled => ScheduleOrder::Shuffled {
                seed: self.seed.unwrap_or(0),
            },
        }
    }

    pub fn runner_settings(&self) -> MatrixResult<RunnerSettings> {
        Ok(RunnerSettings {
            strength: self.strength.max(1),
            max_combinations: self.max_combinations.max(1),
            test_jobs: self.test_jobs.max(1),
            schedule: ScheduleSettings {
                parallelism: self.parallelism.max(1),
                variant_timeout: crate::parse_duration(&self.variant_timeout)
                    .map_err(|err| MatrixError::Config(format!("variant_timeout: {err}")))?,
                order: self.schedule_order(),
            },
        })
    }
}

/// Resolved knobs of a `TestRunner`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerSettings {
    pub strength: usize,
    pub max_combinations: usize,
    pub test_jobs: usize,
    pub schedule: ScheduleSettings,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            strength: default_strength(),
            max_combinations: default_max_combinations(),
            test_jobs: default_test_jobs(),
            schedule: ScheduleSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn missing_file_gives_defaults() {
        let path = std::env::temp_dir()
            .join(format!("tlsmatrix-missing-{}.toml", uuid::Uuid::new_v4()));
        let cfg = Config::load_optional(&path);
        assert_eq!(cfg.parallelism, 4);
        assert_eq!(cfg.schedule, ScheduleMode::Fifo);
    }

    #[test]
    fn parses_partial_file_and_resolves_settings() {
        let cfg: Config = toml::from_str(
            r#"
            parallelism = 8
            variant_timeout = "250ms"
            schedule = "shuffled"
            seed = 9
            "#,
        )
        .expect("parse");
        let settings = cfg.runner_settings().expect("settings");
        assert_eq!(settings.schedule.parallelism, 8);
        assert_eq!(settings.schedule.variant_timeout, Duration::from_millis(250));
        assert_eq!(settings.schedule.order, ScheduleOrder::Shuffled { seed: 9 });
        assert_eq!(settings.strength, 2);
    }

    #[test]
    fn bad_timeout_is_rejected() {
        let cfg = Config {
            variant_timeout: "soon".to_string(),
            ..Config::default()
        };
        assert!(matches!(cfg.runner_settings(), Err(MatrixError::Config(_))));
    }
}
