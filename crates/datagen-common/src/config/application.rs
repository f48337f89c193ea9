use std::path::PathBuf;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::config::loader::deserialize_non_zero;
use crate::error::{CommonError, CommonResult};

const DEFAULT_CONFIG: &str = include_str!("default.toml");

/// The prefix of environment variables that override configuration values.
/// Nested keys are separated by `__`, e.g. `DATAGEN__LAYOUT__SORTED_PARTITIONS`.
pub const CONFIG_ENV_PREFIX: &str = "DATAGEN__";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub generation: GenerationConfig,
    pub layout: LayoutConfig,
    pub output: OutputConfig,
    pub verify: VerifyConfig,
}

impl AppConfig {
    /// Loads the configuration from the built-in defaults and the environment.
    pub fn load() -> CommonResult<Self> {
        Self::extract(Self::figment())
    }

    /// Returns the layered configuration sources, so that callers can merge
    /// additional providers (e.g. command line arguments) with higher priority.
    pub fn figment() -> Figment {
        Figment::from(Toml::string(DEFAULT_CONFIG)).admerge(
            Env::prefixed(CONFIG_ENV_PREFIX).map(|p| p.as_str().replace("__", ".").into()),
        )
    }

    pub fn extract(figment: Figment) -> CommonResult<Self> {
        let config: Self = figment
            .extract()
            .map_err(|e| CommonError::InvalidArgument(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CommonResult<()> {
        self.generation.validate()?;
        self.layout.validate()?;
        self.output.validate()?;
        self.verify.validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub dimension_rows: u64,
    pub fact_rows: u64,
    pub owner_range: u32,
    pub hot_fraction: f64,
    pub hot_set_cap: usize,
    pub hot_sample_fraction: f64,
    #[serde(deserialize_with = "deserialize_non_zero")]
    pub seed: Option<u64>,
    pub batch_size: usize,
}

impl GenerationConfig {
    fn validate(&self) -> CommonResult<()> {
        check_fraction("generation.hot_fraction", self.hot_fraction)?;
        check_fraction("generation.hot_sample_fraction", self.hot_sample_fraction)?;
        check_positive("generation.owner_range", self.owner_range as usize)?;
        check_positive("generation.hot_set_cap", self.hot_set_cap)?;
        check_positive("generation.batch_size", self.batch_size)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    pub unsorted_partitions: usize,
    pub sorted_partitions: usize,
    pub max_row_group_size: usize,
}

impl LayoutConfig {
    fn validate(&self) -> CommonResult<()> {
        check_positive("layout.unsorted_partitions", self.unsorted_partitions)?;
        check_positive("layout.sorted_partitions", self.sorted_partitions)?;
        check_positive("layout.max_row_group_size", self.max_row_group_size)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub root: PathBuf,
    pub dimension_name: String,
    pub fact_name: String,
}

impl OutputConfig {
    fn validate(&self) -> CommonResult<()> {
        if self.root.as_os_str().is_empty() {
            return Err(CommonError::invalid("output.root must not be empty"));
        }
        for (key, name) in [
            ("output.dimension_name", &self.dimension_name),
            ("output.fact_name", &self.fact_name),
        ] {
            if name.is_empty() || name.contains(['/', '\\']) {
                return Err(CommonError::invalid(format!(
                    "{key} must be a non-empty file name: {name:?}"
                )));
            }
        }
        if self.dimension_name == self.fact_name {
            return Err(CommonError::invalid(format!(
                "output.dimension_name and output.fact_name must differ: {}",
                self.fact_name
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyConfig {
    pub sample_rows: usize,
    pub full_scan: bool,
}

impl VerifyConfig {
    fn validate(&self) -> CommonResult<()> {
        check_positive("verify.sample_rows", self.sample_rows)
    }
}

fn check_fraction(key: &str, value: f64) -> CommonResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(CommonError::invalid(format!(
            "{key} must be in [0, 1]: {value}"
        )))
    }
}

fn check_positive(key: &str, value: usize) -> CommonResult<()> {
    if value > 0 {
        Ok(())
    } else {
        Err(CommonError::invalid(format!("{key} must be positive")))
    }
}

#[cfg(test)]
mod tests {
    use figment::providers::Serialized;
    use figment::Jail;

    use super::*;

    fn defaults() -> Figment {
        Figment::from(Toml::string(DEFAULT_CONFIG))
    }

    #[test]
    fn test_default_config() -> CommonResult<()> {
        let config = AppConfig::extract(defaults())?;
        assert_eq!(config.generation.dimension_rows, 1_000_000);
        assert_eq!(config.generation.fact_rows, 10_000_000);
        assert_eq!(config.generation.owner_range, 500_000);
        assert_eq!(config.generation.hot_fraction, 0.8);
        assert_eq!(config.generation.hot_set_cap, 1000);
        assert_eq!(config.generation.seed, None);
        assert_eq!(config.layout.unsorted_partitions, 200);
        assert_eq!(config.layout.sorted_partitions, 20);
        assert_eq!(config.output.root, PathBuf::from("data"));
        assert_eq!(config.output.dimension_name, "products");
        assert_eq!(config.output.fact_name, "transactions");
        assert_eq!(config.verify.sample_rows, 10_000);
        assert!(!config.verify.full_scan);
        Ok(())
    }

    #[test]
    fn test_env_override() {
        Jail::expect_with(|jail| {
            jail.set_env("DATAGEN__LAYOUT__SORTED_PARTITIONS", "4");
            jail.set_env("DATAGEN__GENERATION__SEED", "42");
            let config = AppConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.layout.sorted_partitions, 4);
            assert_eq!(config.generation.seed, Some(42));
            Ok(())
        });
    }

    #[test]
    fn test_invalid_values() {
        let invalid = [
            (
                "layout.sorted_partitions",
                defaults().merge(Serialized::default("layout.sorted_partitions", 0)),
            ),
            (
                "generation.hot_fraction",
                defaults().merge(Serialized::default("generation.hot_fraction", 1.5)),
            ),
            (
                "generation.batch_size",
                defaults().merge(Serialized::default("generation.batch_size", 0)),
            ),
            (
                "output.fact_name",
                defaults().merge(Serialized::default("output.fact_name", "products")),
            ),
        ];
        for (key, figment) in invalid {
            let result = AppConfig::extract(figment);
            assert!(
                matches!(result, Err(CommonError::InvalidArgument(_))),
                "expected {key} to be rejected"
            );
        }
    }
}
