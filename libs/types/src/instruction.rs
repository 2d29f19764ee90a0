//! Inbound instructions, responses, and status codes
//!
//! Instructions arrive on the inbound queue one at a time, already
//! deserialized by the session layer. The kind set is closed; anything the
//! session layer could not map lands in `Instruction::Unknown` and is
//! rejected by the dispatcher without stopping the loop.

use crate::ids::{AssetId, ClientId, InstrumentId, MessageId, OrderId};
use crate::order::Side;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Cash in/out: a signed balance delta for one (client, asset) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashOperation {
    pub message_id: MessageId,
    /// Caller-supplied idempotency key
    pub business_id: Option<String>,
    pub client_id: ClientId,
    pub asset_id: AssetId,
    /// Positive credits, negative debits
    pub amount: Decimal,
    pub timestamp: i64,
}

/// Place a limit order. Price and volume are validated by the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub message_id: MessageId,
    pub client_id: ClientId,
    pub instrument_id: InstrumentId,
    pub side: Side,
    pub price: Decimal,
    pub volume: Decimal,
    pub timestamp: i64,
}

/// Cancel a single resting order by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub message_id: MessageId,
    pub client_id: ClientId,
    pub order_id: OrderId,
    pub timestamp: i64,
}

/// Cancel all of a client's resting orders on one side of one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MassCancel {
    pub message_id: MessageId,
    pub client_id: ClientId,
    pub instrument_id: InstrumentId,
    pub side: Side,
    pub timestamp: i64,
}

/// Overwrite the absolute balance for one (client, asset) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceUpdate {
    pub message_id: MessageId,
    pub client_id: ClientId,
    pub asset_id: AssetId,
    pub amount: Decimal,
    pub timestamp: i64,
}

/// The closed set of instruction kinds the dispatcher routes on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Instruction {
    CashOperation(CashOperation),
    PlaceOrder(PlaceOrder),
    CancelOrder(CancelOrder),
    MassCancel(MassCancel),
    BalanceUpdate(BalanceUpdate),
    /// A kind the session layer could not map to any of the above
    Unknown { message_id: MessageId, kind: String },
}

impl Instruction {
    pub fn message_id(&self) -> MessageId {
        match self {
            Instruction::CashOperation(i) => i.message_id,
            Instruction::PlaceOrder(i) => i.message_id,
            Instruction::CancelOrder(i) => i.message_id,
            Instruction::MassCancel(i) => i.message_id,
            Instruction::BalanceUpdate(i) => i.message_id,
            Instruction::Unknown { message_id, .. } => *message_id,
        }
    }

    pub fn kind_name(&self) -> &str {
        match self {
            Instruction::CashOperation(_) => "cash_operation",
            Instruction::PlaceOrder(_) => "place_order",
            Instruction::CancelOrder(_) => "cancel_order",
            Instruction::MassCancel(_) => "mass_cancel",
            Instruction::BalanceUpdate(_) => "balance_update",
            Instruction::Unknown { kind, .. } => kind,
        }
    }
}

/// Response status codes, one per instruction.
///
/// The numeric codes are part of the response protocol and stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstructionStatus {
    Ok,
    BadRequest,
    LowBalance,
    AlreadyProcessed,
    DisabledAsset,
    UnknownAsset,
    NotEnoughFunds,
    OrderNotFound,
    TooSmallVolume,
    InvalidVolume,
    UnknownInstrument,
    Duplicate,
    Runtime,
}

impl InstructionStatus {
    pub fn code(&self) -> u16 {
        match self {
            InstructionStatus::Ok => 0,
            InstructionStatus::BadRequest => 400,
            InstructionStatus::LowBalance => 401,
            InstructionStatus::AlreadyProcessed => 402,
            InstructionStatus::DisabledAsset => 403,
            InstructionStatus::UnknownAsset => 410,
            InstructionStatus::NotEnoughFunds => 412,
            InstructionStatus::OrderNotFound => 415,
            InstructionStatus::TooSmallVolume => 418,
            InstructionStatus::InvalidVolume => 420,
            InstructionStatus::UnknownInstrument => 421,
            InstructionStatus::Duplicate => 430,
            InstructionStatus::Runtime => 500,
        }
    }
}

/// What the originator receives for every instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstructionResponse {
    pub message_id: MessageId,
    pub status: InstructionStatus,
    /// Rejection detail, absent on success
    pub reason: Option<String>,
    /// Committed record identifier (cash operation record or order id)
    pub record_id: Option<String>,
}

impl InstructionResponse {
    pub fn ok(message_id: MessageId, record_id: Option<String>) -> Self {
        Self {
            message_id,
            status: InstructionStatus::Ok,
            reason: None,
            record_id,
        }
    }

    pub fn rejected(
        message_id: MessageId,
        status: InstructionStatus,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            message_id,
            status,
            reason: Some(reason.into()),
            record_id: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == InstructionStatus::Ok
    }
}

/// Record of a committed instruction, persisted inside its commit bundle and
/// consulted to detect duplicate submissions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedMessage {
    pub message_id: MessageId,
    pub client_id: Option<ClientId>,
    pub business_id: Option<String>,
    /// Record id handed back to the originator; replayed for duplicates
    pub record_id: Option<String>,
    pub timestamp: i64,
}

impl ProcessedMessage {
    pub fn new(message_id: MessageId, timestamp: i64) -> Self {
        Self {
            message_id,
            client_id: None,
            business_id: None,
            record_id: None,
            timestamp,
        }
    }

    pub fn with_dedup_key(
        mut self,
        client_id: ClientId,
        business_id: impl Into<String>,
        record_id: impl Into<String>,
    ) -> Self {
        self.client_id = Some(client_id);
        self.business_id = Some(business_id.into());
        self.record_id = Some(record_id.into());
        self
    }
}
