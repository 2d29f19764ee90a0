//! Pre-process/apply split for balance mutation
//!
//! `pre_process` folds a batch of wallet operations over the current
//! balances into a staged view, rejecting any operation that would drive a
//! balance negative. Nothing is visible to readers until the staged view is
//! applied, which happens only after the owning commit bundle is durably
//! written. A failed write simply drops the staged view.

use rust_decimal::Decimal;
use std::collections::BTreeMap;
use thiserror::Error;
use types::ids::{AssetId, ClientId};
use types::wallet::WalletOperation;

use crate::wallets::WalletRegistry;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BalanceError {
    #[error("balance would go negative: client {client_id}, asset {asset_id}, current {current}, delta {delta}")]
    LowBalance {
        client_id: ClientId,
        asset_id: AssetId,
        current: Decimal,
        delta: Decimal,
    },
}

/// Resulting balances of a not-yet-committed batch of operations.
///
/// Keyed by (client, asset); ordered so the commit bundle contents are
/// deterministic across runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StagedBalances {
    entries: BTreeMap<(ClientId, AssetId), Decimal>,
}

impl StagedBalances {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage an absolute balance overwrite.
    pub fn set(&mut self, client_id: ClientId, asset_id: AssetId, balance: Decimal) {
        self.entries.insert((client_id, asset_id), balance);
    }

    /// Staged balance for a pair, if the batch touched it.
    pub fn get(&self, client_id: &ClientId, asset_id: &AssetId) -> Option<Decimal> {
        self.entries
            .get(&(*client_id, asset_id.clone()))
            .copied()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&(ClientId, AssetId), &Decimal)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl WalletRegistry {
    /// Compute the balances that would result from applying `operations`,
    /// without committing them.
    ///
    /// Operations are folded in order, so several operations against the
    /// same pair see each other's staged result. The live registry is not
    /// touched.
    pub fn pre_process(
        &self,
        operations: &[WalletOperation],
    ) -> Result<StagedBalances, BalanceError> {
        let mut staged = StagedBalances::new();

        for operation in operations {
            let current = staged
                .get(&operation.client_id, &operation.asset_id)
                .unwrap_or_else(|| self.balance(&operation.client_id, &operation.asset_id));

            let next = current + operation.amount;
            if next < Decimal::ZERO {
                return Err(BalanceError::LowBalance {
                    client_id: operation.client_id,
                    asset_id: operation.asset_id.clone(),
                    current,
                    delta: operation.amount,
                });
            }

            staged.set(operation.client_id, operation.asset_id.clone(), next);
        }

        Ok(staged)
    }
}
