//! Client wallets and wallet operations
//!
//! A wallet maps asset ids to balances. Wallets are created on first touch
//! and never deleted; an absent balance entry means a zero balance, not an
//! error. All mutation goes through the ledger service under single-writer
//! discipline.

use crate::ids::{AssetId, ClientId, OperationId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-client balances across all assets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub client_id: ClientId,
    balances: HashMap<AssetId, Decimal>,
}

impl Wallet {
    pub fn new(client_id: ClientId) -> Self {
        Self {
            client_id,
            balances: HashMap::new(),
        }
    }

    /// Balance for an asset. Absent entries read as zero.
    pub fn balance(&self, asset_id: &AssetId) -> Decimal {
        self.balances
            .get(asset_id)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Overwrite the balance for an asset.
    pub fn set_balance(&mut self, asset_id: AssetId, balance: Decimal) {
        self.balances.insert(asset_id, balance);
    }

    /// Apply a signed delta to the balance for an asset.
    pub fn add_balance(&mut self, asset_id: AssetId, delta: Decimal) {
        let entry = self.balances.entry(asset_id).or_insert(Decimal::ZERO);
        *entry += delta;
    }

    /// Iterate over (asset, balance) entries.
    pub fn balances(&self) -> impl Iterator<Item = (&AssetId, &Decimal)> {
        self.balances.iter()
    }
}

/// A validated, not-yet-committed balance delta.
///
/// Immutable value produced by an instruction handler and consumed by the
/// ledger. Never persisted standalone; always part of a commit bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletOperation {
    pub operation_id: OperationId,
    pub client_id: ClientId,
    pub asset_id: AssetId,
    /// Signed amount: positive credits, negative debits
    pub amount: Decimal,
    pub timestamp: i64,
    /// Caller-supplied idempotency key, when the operation originated
    /// from an external cash instruction
    pub business_id: Option<String>,
}

impl WalletOperation {
    pub fn new(client_id: ClientId, asset_id: AssetId, amount: Decimal, timestamp: i64) -> Self {
        Self {
            operation_id: OperationId::new(),
            client_id,
            asset_id,
            amount,
            timestamp,
            business_id: None,
        }
    }

    pub fn with_business_id(mut self, business_id: impl Into<String>) -> Self {
        self.business_id = Some(business_id.into());
        self
    }
}
