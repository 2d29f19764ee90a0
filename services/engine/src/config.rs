//! Engine configuration
//!
//! Sane defaults, overridable via an optional `engine.toml` file and
//! environment variables prefixed with `ENGINE_` (nested fields separated
//! using `__`). For example, `ENGINE_JOURNAL__DIR=/var/lib/engine/journal`.

use persistence::journal::{FsyncPolicy, JournalConfig};
use reference_price::ReferencePriceConfig;
use rust_decimal::Decimal;
use serde::Deserialize;
use types::asset::{Asset, AssetRegistry, Instrument, InstrumentRegistry};
use types::ids::{AssetId, InstrumentId};

use crate::dispatcher::DispatcherConfig;

#[derive(Debug, Deserialize, Clone)]
/// Top-level settings consumed by the engine binary.
pub struct Settings {
    pub journal: JournalSettings,
    pub mid_price: MidPriceSettings,
    /// How long processed-message records stay available for dedup, in ms
    pub dedup_retention_ms: i64,
    #[serde(default)]
    pub assets: Vec<AssetSettings>,
    #[serde(default)]
    pub instruments: Vec<InstrumentSettings>,
}

#[derive(Debug, Deserialize, Clone)]
/// Journal directory and durability knobs.
pub struct JournalSettings {
    pub dir: String,
    pub max_file_size: u64,
    pub fsync_every_write: bool,
}

#[derive(Debug, Deserialize, Clone)]
/// Reference-price estimator knobs.
pub struct MidPriceSettings {
    pub retention_period_ms: i64,
    pub max_incremental_recalculations: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AssetSettings {
    pub id: String,
    pub accuracy: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InstrumentSettings {
    pub id: String,
    pub price_accuracy: u32,
    pub min_volume: Option<Decimal>,
}

fn default_enabled() -> bool {
    true
}

impl Settings {
    /// Load settings from defaults, `engine.toml` (optional), and environment.
    pub fn load() -> Result<Self, config::ConfigError> {
        let cfg = config::Config::builder()
            .set_default("journal.dir", "data/journal")?
            .set_default("journal.max_file_size", 64 * 1024 * 1024i64)?
            .set_default("journal.fsync_every_write", true)?
            .set_default("mid_price.retention_period_ms", 60_000i64)?
            .set_default("mid_price.max_incremental_recalculations", 1_000i64)?
            .set_default("dedup_retention_ms", 86_400_000i64)?
            .add_source(config::File::with_name("engine").required(false))
            .add_source(config::Environment::with_prefix("ENGINE").separator("__"))
            .build()?;
        cfg.try_deserialize()
    }

    pub fn asset_registry(&self) -> AssetRegistry {
        let mut registry = AssetRegistry::new();
        for settings in &self.assets {
            let mut asset = Asset::new(AssetId::new(settings.id.clone()), settings.accuracy);
            asset.enabled = settings.enabled;
            registry.insert(asset);
        }
        registry
    }

    pub fn instrument_registry(&self) -> InstrumentRegistry {
        let mut registry = InstrumentRegistry::new();
        for settings in &self.instruments {
            let mut instrument = Instrument::new(
                InstrumentId::new(settings.id.clone()),
                settings.price_accuracy,
            );
            instrument.min_volume = settings.min_volume;
            registry.insert(instrument);
        }
        registry
    }

    pub fn journal_config(&self) -> JournalConfig {
        JournalConfig {
            dir: self.journal.dir.clone().into(),
            max_file_size: self.journal.max_file_size,
            fsync_policy: if self.journal.fsync_every_write {
                FsyncPolicy::EveryWrite
            } else {
                FsyncPolicy::OnRotation
            },
        }
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            reference_price: ReferencePriceConfig {
                retention_period_ms: self.mid_price.retention_period_ms,
                max_incremental_recalculations: self.mid_price.max_incremental_recalculations,
            },
            dedup_retention_ms: self.dedup_retention_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_load() {
        let settings = Settings::load().unwrap();
        assert_eq!(settings.journal.dir, "data/journal");
        assert!(settings.journal.fsync_every_write);
        assert_eq!(settings.mid_price.max_incremental_recalculations, 1_000);
        assert!(settings.assets.is_empty());
        assert!(settings.instruments.is_empty());
    }

    #[test]
    fn test_registries_from_settings() {
        let settings = Settings {
            journal: JournalSettings {
                dir: "data/journal".into(),
                max_file_size: 1024,
                fsync_every_write: false,
            },
            mid_price: MidPriceSettings {
                retention_period_ms: 60_000,
                max_incremental_recalculations: 1_000,
            },
            dedup_retention_ms: 1_000,
            assets: vec![AssetSettings {
                id: "BTC".into(),
                accuracy: 8,
                enabled: true,
            }],
            instruments: vec![InstrumentSettings {
                id: "BTC/USDT".into(),
                price_accuracy: 2,
                min_volume: None,
            }],
        };

        assert_eq!(settings.asset_registry().len(), 1);
        assert_eq!(settings.instrument_registry().len(), 1);
        assert_eq!(
            settings.journal_config().fsync_policy,
            FsyncPolicy::OnRotation
        );
    }
}
