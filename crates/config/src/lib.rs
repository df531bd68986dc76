//! Layered configuration for the evidence core.
//!
//! Three layers, later ones winning: built-in defaults, an optional TOML
//! file, and `DRAWBRIDGE_*` environment variables (nested keys separated by
//! a double underscore, e.g. `DRAWBRIDGE_CACHE__MAX_BYTES`). Every tunable
//! is validated at load time so a zero ceiling or an empty pool fails fast
//! instead of deadlocking at first use.

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use drawbridge_budget::{BudgetCeilings, ResolutionTier};
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "DRAWBRIDGE_";

/// Render cache tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Root directory for the artifact store and cache database.
    pub directory: PathBuf,
    /// Size budget enforced by the LRU eviction pass.
    pub max_bytes: u64,
    /// Entries untouched for longer than this are evicted.
    pub ttl_seconds: u64,
    /// Disabling the cache renders everything fresh; useful when chasing
    /// rendering bugs.
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let directory = ProjectDirs::from("", "", "drawbridge")
            .map(|dirs| dirs.cache_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".drawbridge/cache"));
        Self {
            directory,
            max_bytes: 2 * 1024 * 1024 * 1024,
            ttl_seconds: 14 * 24 * 60 * 60,
            enabled: true,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> time::Duration {
        time::Duration::seconds(i64::try_from(self.ttl_seconds).unwrap_or(i64::MAX))
    }
}

/// Context budget ceilings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetConfig {
    pub max_images: usize,
    pub max_rois: usize,
    pub max_blocks: usize,
    pub max_context_chars: usize,
    pub min_tier: ResolutionTier,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        let ceilings = BudgetCeilings::default();
        Self {
            max_images: ceilings.max_images,
            max_rois: ceilings.max_rois,
            max_blocks: ceilings.max_blocks,
            max_context_chars: ceilings.max_context_chars,
            min_tier: ceilings.min_tier,
        }
    }
}

impl BudgetConfig {
    pub fn ceilings(&self) -> BudgetCeilings {
        BudgetCeilings {
            max_images: self.max_images,
            max_rois: self.max_rois,
            max_blocks: self.max_blocks,
            max_context_chars: self.max_context_chars,
            min_tier: self.min_tier,
        }
    }
}

/// Worker pool and retry tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Permits for user-facing work.
    pub interactive_workers: usize,
    /// Permits for background indexing. Deliberately small; the extraction
    /// service throttles aggressively.
    pub indexer_workers: usize,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    /// Attempt budget per indexed block.
    pub max_attempts: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            interactive_workers: 4,
            indexer_workers: 1,
            backoff_base_ms: 1_000,
            backoff_cap_ms: 60_000,
            max_attempts: 3,
        }
    }
}

impl PoolConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_cap(&self) -> Duration {
        Duration::from_millis(self.backoff_cap_ms)
    }
}

/// Full configuration tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
    pub budget: BudgetConfig,
    pub pools: PoolConfig,
}

impl Config {
    /// Load configuration: defaults, then the given TOML file (if any), then
    /// `DRAWBRIDGE_*` environment variables.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(file) = file {
            tracing::debug!(file = %file.display(), "merging configuration file");
            figment = figment.merge(Toml::file(file));
        }
        let config: Self =
            figment.merge(Env::prefixed(ENV_PREFIX).split("__")).extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make a component inert or deadlocked.
    pub fn validate(&self) -> Result<()> {
        let positive: [(&str, u64); 9] = [
            ("cache.max_bytes", self.cache.max_bytes),
            ("cache.ttl_seconds", self.cache.ttl_seconds),
            ("budget.max_images", self.budget.max_images as u64),
            ("budget.max_rois", self.budget.max_rois as u64),
            ("budget.max_blocks", self.budget.max_blocks as u64),
            ("budget.max_context_chars", self.budget.max_context_chars as u64),
            ("pools.interactive_workers", self.pools.interactive_workers as u64),
            ("pools.indexer_workers", self.pools.indexer_workers as u64),
            ("pools.max_attempts", u64::from(self.pools.max_attempts)),
        ];
        for (name, value) in positive {
            if value == 0 {
                exn::bail!(ErrorKind::Invalid(format!("{name} must be positive")));
            }
        }
        if self.pools.backoff_cap_ms < self.pools.backoff_base_ms {
            exn::bail!(ErrorKind::Invalid("pools.backoff_cap_ms must be at least the base".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn defaults_load_and_validate() {
        figment::Jail::expect_with(|_jail| {
            let config = Config::load(None).unwrap();
            assert_eq!(config.pools.indexer_workers, 1);
            assert_eq!(config.budget.ceilings(), BudgetCeilings::default());
            assert!(config.cache.enabled);
            Ok(())
        });
    }

    #[test]
    fn file_overrides_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "drawbridge.toml",
                r#"
                [cache]
                max_bytes = 1024

                [budget]
                min_tier = "standard"
                "#,
            )?;
            let config = Config::load(Some(Path::new("drawbridge.toml"))).unwrap();
            assert_eq!(config.cache.max_bytes, 1024);
            assert_eq!(config.budget.min_tier, ResolutionTier::Standard);
            // Untouched sections keep their defaults.
            assert_eq!(config.pools, PoolConfig::default());
            Ok(())
        });
    }

    #[test]
    fn environment_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("drawbridge.toml", "[budget]\nmax_images = 2\n")?;
            jail.set_env("DRAWBRIDGE_BUDGET__MAX_IMAGES", "6");
            jail.set_env("DRAWBRIDGE_CACHE__ENABLED", "false");
            let config = Config::load(Some(Path::new("drawbridge.toml"))).unwrap();
            assert_eq!(config.budget.max_images, 6);
            assert!(!config.cache.enabled);
            Ok(())
        });
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        figment::Jail::expect_with(|_jail| {
            let config = Config::load(Some(Path::new("does-not-exist.toml"))).unwrap();
            assert_eq!(config, Config::default());
            Ok(())
        });
    }

    #[rstest]
    #[case("DRAWBRIDGE_BUDGET__MAX_IMAGES")]
    #[case("DRAWBRIDGE_POOLS__INDEXER_WORKERS")]
    #[case("DRAWBRIDGE_CACHE__MAX_BYTES")]
    fn zero_tunables_are_rejected(#[case] variable: &str) {
        figment::Jail::expect_with(|jail| {
            jail.set_env(variable, "0");
            let err = Config::load(None).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Invalid(_)));
            Ok(())
        });
    }

    #[test]
    fn inverted_backoff_is_rejected() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("DRAWBRIDGE_POOLS__BACKOFF_CAP_MS", "10");
            let err = Config::load(None).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Invalid(_)));
            Ok(())
        });
    }

    #[test]
    fn ttl_converts_to_duration() {
        let cache = CacheConfig { ttl_seconds: 3600, ..CacheConfig::default() };
        assert_eq!(cache.ttl(), time::Duration::hours(1));
    }
}
