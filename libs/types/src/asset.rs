//! Assets, instruments, and their registries
//!
//! Registries are flat owned containers indexed by id. They are loaded from
//! configuration at startup and consulted by the business validator; the
//! dispatch loop is their only mutator.

use crate::ids::{AssetId, InstrumentId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single currency known to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub asset_id: AssetId,
    /// Display accuracy in decimal places
    pub accuracy: u32,
    /// Disabled assets reject cash operations
    pub enabled: bool,
}

impl Asset {
    pub fn new(asset_id: AssetId, accuracy: u32) -> Self {
        Self {
            asset_id,
            accuracy,
            enabled: true,
        }
    }
}

/// A tradeable asset pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub instrument_id: InstrumentId,
    pub base_asset_id: AssetId,
    pub quote_asset_id: AssetId,
    /// Display accuracy for prices, in decimal places
    pub price_accuracy: u32,
    /// Orders below this volume are rejected (no minimum when None)
    pub min_volume: Option<Decimal>,
}

impl Instrument {
    pub fn new(instrument_id: InstrumentId, price_accuracy: u32) -> Self {
        let (base, quote) = instrument_id.split();
        let base_asset_id = AssetId::new(base);
        let quote_asset_id = AssetId::new(quote);
        Self {
            instrument_id,
            base_asset_id,
            quote_asset_id,
            price_accuracy,
            min_volume: None,
        }
    }

    pub fn with_min_volume(mut self, min_volume: Decimal) -> Self {
        self.min_volume = Some(min_volume);
        self
    }
}

/// All assets known to the engine, indexed by id.
#[derive(Debug, Clone, Default)]
pub struct AssetRegistry {
    assets: HashMap<AssetId, Asset>,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, asset: Asset) {
        self.assets.insert(asset.asset_id.clone(), asset);
    }

    pub fn get(&self, asset_id: &AssetId) -> Option<&Asset> {
        self.assets.get(asset_id)
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

/// All instruments known to the engine, indexed by id.
#[derive(Debug, Clone, Default)]
pub struct InstrumentRegistry {
    instruments: HashMap<InstrumentId, Instrument>,
}

impl InstrumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, instrument: Instrument) {
        self.instruments
            .insert(instrument.instrument_id.clone(), instrument);
    }

    pub fn get(&self, instrument_id: &InstrumentId) -> Option<&Instrument> {
        self.instruments.get(instrument_id)
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }
}
