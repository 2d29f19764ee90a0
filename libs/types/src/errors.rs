//! Validation error taxonomy
//!
//! Validation failures are rejected before any mutation and mapped onto the
//! response status codes; they never abort the dispatch loop.

use crate::ids::{AssetId, ClientId, InstrumentId};
use crate::instruction::InstructionStatus;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("unknown asset: {0}")]
    UnknownAsset(AssetId),

    #[error("asset disabled: {0}")]
    DisabledAsset(AssetId),

    #[error("unknown instrument: {0}")]
    UnknownInstrument(InstrumentId),

    #[error("not enough funds: client {client_id}, asset {asset_id}, available {available}, required {required}")]
    NotEnoughFunds {
        client_id: ClientId,
        asset_id: AssetId,
        available: Decimal,
        required: Decimal,
    },

    #[error("invalid price: {0}")]
    InvalidPrice(Decimal),

    #[error("invalid volume: {0}")]
    InvalidVolume(Decimal),

    #[error("volume {volume} below instrument minimum {min_volume}")]
    TooSmallVolume {
        volume: Decimal,
        min_volume: Decimal,
    },

    #[error("negative balance target: {0}")]
    NegativeBalance(Decimal),
}

impl ValidationError {
    /// Response status reported to the instruction's originator.
    pub fn status(&self) -> InstructionStatus {
        match self {
            ValidationError::UnknownAsset(_) => InstructionStatus::UnknownAsset,
            ValidationError::DisabledAsset(_) => InstructionStatus::DisabledAsset,
            ValidationError::UnknownInstrument(_) => InstructionStatus::UnknownInstrument,
            ValidationError::NotEnoughFunds { .. } => InstructionStatus::NotEnoughFunds,
            ValidationError::InvalidPrice(_) => InstructionStatus::BadRequest,
            ValidationError::InvalidVolume(_) => InstructionStatus::InvalidVolume,
            ValidationError::TooSmallVolume { .. } => InstructionStatus::TooSmallVolume,
            ValidationError::NegativeBalance(_) => InstructionStatus::BadRequest,
        }
    }
}
