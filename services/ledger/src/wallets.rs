//! Wallet registry
//!
//! Flat owned container of wallets indexed by client id. Wallets are created
//! on first touch and never deleted.

use rust_decimal::Decimal;
use tracing::debug;
use types::ids::{AssetId, ClientId};
use types::wallet::Wallet;

use crate::processor::StagedBalances;
use std::collections::HashMap;

/// All client wallets.
#[derive(Debug, Clone, Default)]
pub struct WalletRegistry {
    wallets: HashMap<ClientId, Wallet>,
}

impl WalletRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance for a (client, asset) pair. Unknown pairs read as zero.
    pub fn balance(&self, client_id: &ClientId, asset_id: &AssetId) -> Decimal {
        self.wallets
            .get(client_id)
            .map(|wallet| wallet.balance(asset_id))
            .unwrap_or(Decimal::ZERO)
    }

    pub fn wallet(&self, client_id: &ClientId) -> Option<&Wallet> {
        self.wallets.get(client_id)
    }

    /// Overwrite a single balance, creating the wallet on first touch.
    pub fn set_balance(&mut self, client_id: ClientId, asset_id: AssetId, balance: Decimal) {
        let wallet = self
            .wallets
            .entry(client_id)
            .or_insert_with(|| Wallet::new(client_id));
        wallet.set_balance(asset_id, balance);
    }

    /// Publish staged balances into the live registry.
    ///
    /// Called only after the durable write for the owning commit bundle
    /// succeeded.
    pub fn apply(&mut self, staged: &StagedBalances) {
        for ((client_id, asset_id), balance) in staged.entries() {
            debug!(
                client = %client_id,
                asset = %asset_id,
                balance = %balance,
                "balance applied"
            );
            self.set_balance(*client_id, asset_id.clone(), *balance);
        }
    }

    pub fn wallet_count(&self) -> usize {
        self.wallets.len()
    }
}
