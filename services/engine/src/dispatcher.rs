//! Message dispatcher
//!
//! Single-threaded consumer of the inbound instruction queue. Owns every
//! mutable piece of engine state; per-entity invariants elsewhere hold
//! because all mutation funnels through this loop. Each instruction runs the
//! same pipeline: dedup-check and validate, pre-apply in memory, take the
//! next sequence number, write one atomic commit bundle, then apply, publish
//! the outgoing event, and answer the originator. A failed durable write
//! rolls pre-applied state back before the next instruction is dequeued.

use crossbeam_channel::{Receiver, Sender};
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use ledger::{CompletedOperation, DedupIndex, StagedBalances, WalletRegistry};
use order_book::OrderBookEngine;
use persistence::bundle::{BalanceEntry, CommitBundle, OrderBookDelta};
use persistence::recovery::RecoveredState;
use persistence::sequence::SequenceCounter;
use persistence::store::DurableStore;
use reference_price::{ReferencePriceConfig, ReferencePriceTracker};
use types::asset::{AssetRegistry, InstrumentRegistry};
use types::ids::{AssetId, ClientId, InstrumentId, OrderId};
use types::instruction::{
    BalanceUpdate, CancelOrder, CashOperation, Instruction, InstructionResponse,
    InstructionStatus, MassCancel, PlaceOrder, ProcessedMessage,
};
use types::order::LimitOrder;
use types::wallet::WalletOperation;

use crate::events::{EventPublisher, OutgoingEvent, PublishedBook};
use crate::validator;

/// One unit of work on the inbound queue. The reply channel is optional;
/// originators that do not care about the outcome may omit it.
#[derive(Debug)]
pub struct InstructionEnvelope {
    pub instruction: Instruction,
    pub reply: Option<Sender<InstructionResponse>>,
}

impl InstructionEnvelope {
    pub fn new(instruction: Instruction) -> Self {
        Self {
            instruction,
            reply: None,
        }
    }

    pub fn with_reply(instruction: Instruction, reply: Sender<InstructionResponse>) -> Self {
        Self {
            instruction,
            reply: Some(reply),
        }
    }
}

/// Dispatcher-owned tuning values.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub reference_price: ReferencePriceConfig,
    /// Processed-message retention horizon for dedup, in milliseconds
    pub dedup_retention_ms: i64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            reference_price: ReferencePriceConfig::default(),
            dedup_retention_ms: 86_400_000,
        }
    }
}

/// The single writer over ledger, books, estimator, and sequencer.
pub struct Dispatcher<S: DurableStore, P: EventPublisher> {
    assets: AssetRegistry,
    instruments: InstrumentRegistry,
    wallets: WalletRegistry,
    dedup: DedupIndex,
    books: OrderBookEngine,
    estimator: ReferencePriceTracker,
    sequencer: SequenceCounter,
    store: S,
    publisher: P,
    dedup_retention_ms: i64,
}

impl<S: DurableStore, P: EventPublisher> Dispatcher<S, P> {
    pub fn new(
        assets: AssetRegistry,
        instruments: InstrumentRegistry,
        config: DispatcherConfig,
        store: S,
        publisher: P,
    ) -> Self {
        Self {
            assets,
            instruments,
            wallets: WalletRegistry::new(),
            dedup: DedupIndex::new(),
            books: OrderBookEngine::new(),
            estimator: ReferencePriceTracker::new(config.reference_price),
            sequencer: SequenceCounter::default(),
            store,
            publisher,
            dedup_retention_ms: config.dedup_retention_ms,
        }
    }

    /// Rebuild in-memory state from a journal replay before dispatch starts.
    pub fn seed_from_recovery(&mut self, state: RecoveredState) {
        for entry in &state.balances {
            self.wallets
                .set_balance(entry.client_id, entry.asset_id.clone(), entry.balance);
        }

        let mut latest_order_ts = i64::MIN;
        for order in state.orders {
            latest_order_ts = latest_order_ts.max(order.created_at);
            if let Err(err) = self.books.insert(order) {
                warn!(error = %err, "recovered order skipped");
            }
        }

        for message in &state.processed_messages {
            self.dedup.restore(message);
        }

        self.sequencer = SequenceCounter::resume_after(state.last_sequence);

        // Re-seed the estimator from the recovered books; mid-price samples
        // themselves are not journalled
        let instrument_ids: Vec<InstrumentId> =
            self.books.instrument_ids().cloned().collect();
        for instrument_id in instrument_ids {
            if let Some(mid) = self.books.mid_price(&instrument_id) {
                self.estimator.add(&instrument_id, mid, latest_order_ts);
            }
        }

        info!(
            next_sequence = self.sequencer.peek(),
            wallets = self.wallets.wallet_count(),
            orders = self.books.order_count(),
            dedup_records = self.dedup.len(),
            "state recovered"
        );
    }

    /// Consume the inbound queue until it closes. Blocking; the caller
    /// dedicates a thread.
    pub fn run(&mut self, inbox: &Receiver<InstructionEnvelope>) {
        info!("dispatch loop started");
        while let Ok(envelope) = inbox.recv() {
            let response = self.process(envelope.instruction);
            if let Some(reply) = envelope.reply {
                if reply.send(response).is_err() {
                    warn!("response receiver dropped");
                }
            }
        }
        info!("inbound queue closed; dispatch loop stopped");
    }

    /// Process exactly one instruction through the commit pipeline.
    pub fn process(&mut self, instruction: Instruction) -> InstructionResponse {
        debug!(
            kind = instruction.kind_name(),
            message = %instruction.message_id(),
            "processing instruction"
        );
        match instruction {
            Instruction::CashOperation(cash) => self.handle_cash_operation(cash),
            Instruction::PlaceOrder(place) => self.handle_place_order(place),
            Instruction::CancelOrder(cancel) => self.handle_cancel_order(cancel),
            Instruction::MassCancel(mass_cancel) => self.handle_mass_cancel(mass_cancel),
            Instruction::BalanceUpdate(update) => self.handle_balance_update(update),
            Instruction::Unknown { message_id, kind } => {
                error!(kind = %kind, "unknown instruction kind");
                InstructionResponse::rejected(
                    message_id,
                    InstructionStatus::Runtime,
                    format!("unknown instruction kind: {kind}"),
                )
            }
        }
    }

    // ── Handlers ────────────────────────────────────────────────────

    fn handle_cash_operation(&mut self, cash: CashOperation) -> InstructionResponse {
        self.dedup
            .prune_older_than(cash.timestamp - self.dedup_retention_ms);

        if let Some(business_id) = &cash.business_id {
            if let Some(prior) = self.dedup.find(&cash.client_id, business_id) {
                debug!(
                    client = %cash.client_id,
                    business_id = %business_id,
                    record = %prior.record_id,
                    "cash operation already processed; replaying result"
                );
                return InstructionResponse::ok(
                    cash.message_id,
                    Some(prior.record_id.clone()),
                );
            }
        }

        if let Err(err) = validator::validate_cash_operation(&self.assets, &self.wallets, &cash)
        {
            warn!(reason = %err, "cash operation rejected");
            return InstructionResponse::rejected(cash.message_id, err.status(), err.to_string());
        }

        let mut operation = WalletOperation::new(
            cash.client_id,
            cash.asset_id.clone(),
            cash.amount,
            cash.timestamp,
        );
        if let Some(business_id) = &cash.business_id {
            operation = operation.with_business_id(business_id.clone());
        }
        let record_id = operation.operation_id.to_string();
        let operation_id = operation.operation_id;

        let staged = match self.wallets.pre_process(&[operation]) {
            Ok(staged) => staged,
            Err(err) => {
                warn!(reason = %err, "cash operation rejected at pre-process");
                return InstructionResponse::rejected(
                    cash.message_id,
                    InstructionStatus::LowBalance,
                    err.to_string(),
                );
            }
        };

        let old_balance = self.wallets.balance(&cash.client_id, &cash.asset_id);

        let mut message = ProcessedMessage::new(cash.message_id, cash.timestamp);
        match &cash.business_id {
            Some(business_id) => {
                message = message.with_dedup_key(
                    cash.client_id,
                    business_id.clone(),
                    record_id.clone(),
                );
            }
            None => message.record_id = Some(record_id.clone()),
        }

        let sequence = self.sequencer.next_value();
        let bundle = CommitBundle::new(sequence, cash.timestamp)
            .with_balances(Self::balance_entries(&staged))
            .with_processed_message(message);

        if let Err(err) = self.store.commit(&bundle) {
            error!(error = %err, "durable write failed; staged balances discarded");
            return InstructionResponse::rejected(
                cash.message_id,
                InstructionStatus::Runtime,
                "unable to save balance",
            );
        }

        self.wallets.apply(&staged);
        if let Some(business_id) = &cash.business_id {
            self.dedup.record(
                cash.client_id,
                business_id.clone(),
                CompletedOperation {
                    message_id: cash.message_id,
                    record_id: record_id.clone(),
                    timestamp: cash.timestamp,
                },
            );
        }

        let new_balance = self.wallets.balance(&cash.client_id, &cash.asset_id);
        self.publisher.submit(OutgoingEvent::CashOperation {
            sequence,
            message_id: cash.message_id,
            operation_id,
            client_id: cash.client_id,
            asset_id: cash.asset_id.clone(),
            amount: cash.amount,
            old_balance,
            new_balance,
            timestamp: cash.timestamp,
        });

        info!(
            client = %cash.client_id,
            asset = %cash.asset_id,
            amount = %cash.amount,
            sequence,
            "cash operation processed"
        );
        InstructionResponse::ok(cash.message_id, Some(record_id))
    }

    fn handle_place_order(&mut self, place: PlaceOrder) -> InstructionResponse {
        let (price, volume) = match validator::validate_place_order(&self.instruments, &place) {
            Ok(validated) => validated,
            Err(err) => {
                warn!(reason = %err, "limit order rejected");
                return InstructionResponse::rejected(
                    place.message_id,
                    err.status(),
                    err.to_string(),
                );
            }
        };

        let order = LimitOrder::new(
            place.client_id,
            place.instrument_id.clone(),
            place.side,
            price,
            volume,
            place.timestamp,
        );
        let order_id = order.order_id;

        let checkpoint = self.books.checkpoint(&place.instrument_id);
        if let Err(err) = self.books.insert(order.clone()) {
            warn!(reason = %err, "limit order rejected by book");
            return InstructionResponse::rejected(
                place.message_id,
                InstructionStatus::BadRequest,
                err.to_string(),
            );
        }

        let sequence = self.sequencer.next_value();
        let bundle = CommitBundle::new(sequence, place.timestamp)
            .with_order_delta(OrderBookDelta::save(
                place.instrument_id.clone(),
                vec![order.clone()],
            ))
            .with_processed_message(ProcessedMessage::new(place.message_id, place.timestamp));

        if let Err(err) = self.store.commit(&bundle) {
            error!(error = %err, "durable write failed; rolling back order insert");
            self.books.rollback(checkpoint, &[order_id], &[]);
            return InstructionResponse::rejected(
                place.message_id,
                InstructionStatus::Runtime,
                "unable to save order",
            );
        }

        self.record_mid_price(&place.instrument_id, place.timestamp);
        let book = self.published_book(&place.instrument_id, place.timestamp);
        self.publisher.submit(OutgoingEvent::OrderPlaced {
            sequence,
            message_id: place.message_id,
            order,
            book,
            timestamp: place.timestamp,
        });

        info!(
            client = %place.client_id,
            instrument = %place.instrument_id,
            order = %order_id,
            sequence,
            "limit order resting"
        );
        InstructionResponse::ok(place.message_id, Some(order_id.to_string()))
    }

    fn handle_cancel_order(&mut self, cancel: CancelOrder) -> InstructionResponse {
        let Some(instrument_id) = self.books.instrument_of(&cancel.order_id).cloned() else {
            debug!(order = %cancel.order_id, "cancel target not resting");
            return InstructionResponse::rejected(
                cancel.message_id,
                InstructionStatus::OrderNotFound,
                format!("order not found: {}", cancel.order_id),
            );
        };

        let checkpoint = self.books.checkpoint(&instrument_id);
        let Some(removed) = self.books.cancel(&cancel.order_id) else {
            return InstructionResponse::rejected(
                cancel.message_id,
                InstructionStatus::OrderNotFound,
                format!("order not found: {}", cancel.order_id),
            );
        };

        let sequence = self.sequencer.next_value();
        let bundle = CommitBundle::new(sequence, cancel.timestamp)
            .with_order_delta(OrderBookDelta::remove(
                instrument_id.clone(),
                vec![cancel.order_id],
            ))
            .with_processed_message(ProcessedMessage::new(cancel.message_id, cancel.timestamp));

        if let Err(err) = self.store.commit(&bundle) {
            error!(error = %err, "durable write failed; rolling back cancel");
            self.books
                .rollback(checkpoint, &[], std::slice::from_ref(&removed));
            return InstructionResponse::rejected(
                cancel.message_id,
                InstructionStatus::Runtime,
                "unable to save cancellation",
            );
        }

        self.record_mid_price(&instrument_id, cancel.timestamp);
        let book = self.published_book(&instrument_id, cancel.timestamp);
        self.publisher.submit(OutgoingEvent::OrdersCancelled {
            sequence,
            message_id: cancel.message_id,
            orders: vec![removed],
            book,
            timestamp: cancel.timestamp,
        });

        info!(order = %cancel.order_id, sequence, "order cancelled");
        InstructionResponse::ok(cancel.message_id, Some(cancel.order_id.to_string()))
    }

    fn handle_mass_cancel(&mut self, mass_cancel: MassCancel) -> InstructionResponse {
        if let Err(err) = validator::validate_mass_cancel(&self.instruments, &mass_cancel) {
            warn!(reason = %err, "mass cancel rejected");
            return InstructionResponse::rejected(
                mass_cancel.message_id,
                err.status(),
                err.to_string(),
            );
        }

        let checkpoint = self.books.checkpoint(&mass_cancel.instrument_id);
        // All removals happen before any snapshot, so publication only ever
        // sees the fully cancelled book
        let removed = self.books.cancel_all(
            &mass_cancel.client_id,
            &mass_cancel.instrument_id,
            mass_cancel.side,
        );

        if removed.is_empty() {
            debug!(
                client = %mass_cancel.client_id,
                instrument = %mass_cancel.instrument_id,
                "mass cancel matched no orders"
            );
            return InstructionResponse::ok(mass_cancel.message_id, None);
        }

        let removed_ids: Vec<OrderId> = removed.iter().map(|order| order.order_id).collect();
        let sequence = self.sequencer.next_value();
        let bundle = CommitBundle::new(sequence, mass_cancel.timestamp)
            .with_order_delta(OrderBookDelta::remove(
                mass_cancel.instrument_id.clone(),
                removed_ids,
            ))
            .with_processed_message(ProcessedMessage::new(
                mass_cancel.message_id,
                mass_cancel.timestamp,
            ));

        if let Err(err) = self.store.commit(&bundle) {
            error!(error = %err, "durable write failed; rolling back mass cancel");
            self.books.rollback(checkpoint, &[], &removed);
            return InstructionResponse::rejected(
                mass_cancel.message_id,
                InstructionStatus::Runtime,
                "unable to save cancellations",
            );
        }

        self.record_mid_price(&mass_cancel.instrument_id, mass_cancel.timestamp);
        let book = self.published_book(&mass_cancel.instrument_id, mass_cancel.timestamp);
        let cancelled = removed.len();
        self.publisher.submit(OutgoingEvent::OrdersCancelled {
            sequence,
            message_id: mass_cancel.message_id,
            orders: removed,
            book,
            timestamp: mass_cancel.timestamp,
        });

        info!(
            client = %mass_cancel.client_id,
            instrument = %mass_cancel.instrument_id,
            cancelled,
            sequence,
            "mass cancel processed"
        );
        InstructionResponse::ok(mass_cancel.message_id, None)
    }

    fn handle_balance_update(&mut self, update: BalanceUpdate) -> InstructionResponse {
        if let Err(err) = validator::validate_balance_update(&self.assets, &update) {
            warn!(reason = %err, "balance update rejected");
            return InstructionResponse::rejected(
                update.message_id,
                err.status(),
                err.to_string(),
            );
        }

        let old_balance = self.wallets.balance(&update.client_id, &update.asset_id);
        let mut staged = StagedBalances::new();
        staged.set(update.client_id, update.asset_id.clone(), update.amount);

        let sequence = self.sequencer.next_value();
        let bundle = CommitBundle::new(sequence, update.timestamp)
            .with_balances(Self::balance_entries(&staged))
            .with_processed_message(ProcessedMessage::new(update.message_id, update.timestamp));

        if let Err(err) = self.store.commit(&bundle) {
            error!(error = %err, "durable write failed; staged balance discarded");
            return InstructionResponse::rejected(
                update.message_id,
                InstructionStatus::Runtime,
                "unable to save balance",
            );
        }

        self.wallets.apply(&staged);
        self.publisher.submit(OutgoingEvent::BalanceUpdated {
            sequence,
            message_id: update.message_id,
            client_id: update.client_id,
            asset_id: update.asset_id.clone(),
            old_balance,
            new_balance: update.amount,
            timestamp: update.timestamp,
        });

        info!(
            client = %update.client_id,
            asset = %update.asset_id,
            old = %old_balance,
            new = %update.amount,
            sequence,
            "balance updated"
        );
        InstructionResponse::ok(update.message_id, None)
    }

    // ── Helpers ─────────────────────────────────────────────────────

    fn balance_entries(staged: &StagedBalances) -> Vec<BalanceEntry> {
        staged
            .entries()
            .map(|((client_id, asset_id), balance)| BalanceEntry {
                client_id: *client_id,
                asset_id: asset_id.clone(),
                balance: *balance,
            })
            .collect()
    }

    /// Feed the post-commit midpoint into the estimator.
    fn record_mid_price(&mut self, instrument_id: &InstrumentId, timestamp: i64) {
        if let Some(mid) = self.books.mid_price(instrument_id) {
            self.estimator.add(instrument_id, mid, timestamp);
        }
    }

    fn published_book(&self, instrument_id: &InstrumentId, timestamp: i64) -> PublishedBook {
        match self.books.snapshot(instrument_id) {
            Some(snapshot) => PublishedBook::from_snapshot(&snapshot, timestamp),
            None => PublishedBook {
                instrument_id: instrument_id.clone(),
                bids: Vec::new(),
                asks: Vec::new(),
                timestamp,
            },
        }
    }

    // ── Read-only accessors ─────────────────────────────────────────

    /// Committed balance for a (client, asset) pair; zero when untouched.
    pub fn balance(&self, client_id: &ClientId, asset_id: &AssetId) -> Decimal {
        self.wallets.balance(client_id, asset_id)
    }

    /// Immutable snapshot of one instrument's book.
    pub fn snapshot(&self, instrument_id: &InstrumentId) -> Option<order_book::BookSnapshot> {
        self.books.snapshot(instrument_id)
    }

    /// Reference mid price for an instrument, at display accuracy.
    pub fn reference_price(
        &mut self,
        instrument_id: &InstrumentId,
        as_of: i64,
    ) -> Option<Decimal> {
        let instrument = self.instruments.get(instrument_id)?.clone();
        self.estimator.reference_price(&instrument, as_of)
    }

    /// The sequence number the next committed instruction will take.
    pub fn next_sequence(&self) -> u64 {
        self.sequencer.peek()
    }

    /// Total resting orders across all instruments.
    pub fn resting_order_count(&self) -> usize {
        self.books.order_count()
    }
}
