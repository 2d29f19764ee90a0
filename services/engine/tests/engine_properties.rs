//! End-to-end properties of the commit pipeline: exactly-once application,
//! atomicity under write failure, sequence monotonicity, book priority and
//! multi-cancel publication, and journal recovery.

use crossbeam_channel::{unbounded, Receiver};
use engine::{ChannelPublisher, Dispatcher, DispatcherConfig, OutgoingEvent};
use persistence::journal::{JournalConfig, JournalStore};
use persistence::recovery;
use persistence::store::{DurableStore, FailingStore, MemoryStore};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::Ordering;
use types::asset::{Asset, AssetRegistry, Instrument, InstrumentRegistry};
use types::ids::{AssetId, ClientId, InstrumentId, MessageId, OrderId};
use types::instruction::{
    CancelOrder, CashOperation, Instruction, InstructionStatus, MassCancel, PlaceOrder,
};
use types::numeric::Price;
use types::order::Side;

fn registries() -> (AssetRegistry, InstrumentRegistry) {
    let mut assets = AssetRegistry::new();
    assets.insert(Asset::new(AssetId::new("BTC"), 8));
    assets.insert(Asset::new(AssetId::new("USDT"), 2));

    let mut instruments = InstrumentRegistry::new();
    instruments.insert(Instrument::new(InstrumentId::new("BTC/USDT"), 2));
    (assets, instruments)
}

fn dispatcher_with_store<S: DurableStore>(
    store: S,
) -> (Dispatcher<S, ChannelPublisher>, Receiver<OutgoingEvent>) {
    let (assets, instruments) = registries();
    let (sender, receiver) = unbounded();
    let dispatcher = Dispatcher::new(
        assets,
        instruments,
        DispatcherConfig::default(),
        store,
        ChannelPublisher::new(sender),
    );
    (dispatcher, receiver)
}

fn cash_with_business(client: ClientId, amount: Decimal, business_id: &str) -> Instruction {
    Instruction::CashOperation(CashOperation {
        message_id: MessageId::new(),
        business_id: Some(business_id.to_string()),
        client_id: client,
        asset_id: AssetId::new("BTC"),
        amount,
        timestamp: 1_000,
    })
}

fn place(client: ClientId, side: Side, price: Decimal, volume: Decimal) -> Instruction {
    Instruction::PlaceOrder(PlaceOrder {
        message_id: MessageId::new(),
        client_id: client,
        instrument_id: InstrumentId::new("BTC/USDT"),
        side,
        price,
        volume,
        timestamp: 1_000,
    })
}

#[test]
fn idempotency_same_business_id_applies_once() {
    let (mut dispatcher, events) = dispatcher_with_store(MemoryStore::new());
    let client = ClientId::new();
    let instruction = cash_with_business(client, dec!(5), "dep-1");

    let first = dispatcher.process(instruction.clone());
    let second = dispatcher.process(instruction);

    // One balance change, two identical success responses
    assert_eq!(dispatcher.balance(&client, &AssetId::new("BTC")), dec!(5));
    assert!(first.is_ok());
    assert_eq!(first, second);

    // Exactly one commit and one outgoing event
    let published: Vec<OutgoingEvent> = events.try_iter().collect();
    assert_eq!(published.len(), 1);
    assert_eq!(dispatcher.next_sequence(), 2);
}

#[test]
fn atomicity_failed_write_leaves_state_untouched() {
    let store = FailingStore::new(MemoryStore::new());
    let switch = store.switch();
    let (mut dispatcher, events) = dispatcher_with_store(store);
    let client = ClientId::new();
    let instrument = InstrumentId::new("BTC/USDT");

    // Establish committed state: a balance and a resting order
    dispatcher.process(cash_with_business(client, dec!(10), "dep-1"));
    dispatcher.process(place(client, Side::Buy, dec!(50000), dec!(1)));
    let balance_before = dispatcher.balance(&client, &AssetId::new("BTC"));
    let orders_before: Vec<OrderId> = dispatcher
        .snapshot(&instrument)
        .unwrap()
        .bids()
        .map(|order| order.order_id)
        .collect();
    let _ = events.try_iter().count();

    switch.store(true, Ordering::SeqCst);

    // Cash delta, a new order, and a mass cancel all fail to persist
    let response = dispatcher.process(cash_with_business(client, dec!(7), "dep-2"));
    assert_eq!(response.status, InstructionStatus::Runtime);

    let response = dispatcher.process(place(client, Side::Buy, dec!(49000), dec!(2)));
    assert_eq!(response.status, InstructionStatus::Runtime);

    let response = dispatcher.process(Instruction::MassCancel(MassCancel {
        message_id: MessageId::new(),
        client_id: client,
        instrument_id: instrument.clone(),
        side: Side::Buy,
        timestamp: 2_000,
    }));
    assert_eq!(response.status, InstructionStatus::Runtime);

    // Wallet and book are bit-identical to the pre-failure state
    assert_eq!(dispatcher.balance(&client, &AssetId::new("BTC")), balance_before);
    let orders_after: Vec<OrderId> = dispatcher
        .snapshot(&instrument)
        .unwrap()
        .bids()
        .map(|order| order.order_id)
        .collect();
    assert_eq!(orders_after, orders_before);

    // No outgoing events escaped
    assert_eq!(events.try_iter().count(), 0);

    // And the engine keeps working once writes succeed again
    switch.store(false, Ordering::SeqCst);
    let response = dispatcher.process(cash_with_business(client, dec!(7), "dep-3"));
    assert!(response.is_ok());
    assert_eq!(
        dispatcher.balance(&client, &AssetId::new("BTC")),
        balance_before + dec!(7)
    );
}

#[test]
fn sequence_numbers_strictly_increase() {
    let (mut dispatcher, events) = dispatcher_with_store(MemoryStore::new());
    let client = ClientId::new();

    for i in 0..10u32 {
        let response = dispatcher.process(cash_with_business(
            client,
            dec!(1),
            &format!("dep-{i}"),
        ));
        assert!(response.is_ok());
    }

    let sequences: Vec<u64> = events.try_iter().map(|event| event.sequence()).collect();
    assert_eq!(sequences.len(), 10);
    for pair in sequences.windows(2) {
        assert!(pair[0] < pair[1], "sequence not strictly increasing: {pair:?}");
    }
}

#[test]
fn sequence_gap_after_failed_write_is_not_reused() {
    let store = FailingStore::new(MemoryStore::new());
    let switch = store.switch();
    let (mut dispatcher, events) = dispatcher_with_store(store);
    let client = ClientId::new();

    dispatcher.process(cash_with_business(client, dec!(1), "dep-1"));

    switch.store(true, Ordering::SeqCst);
    dispatcher.process(cash_with_business(client, dec!(1), "dep-2"));
    switch.store(false, Ordering::SeqCst);

    dispatcher.process(cash_with_business(client, dec!(1), "dep-3"));

    let sequences: Vec<u64> = events.try_iter().map(|event| event.sequence()).collect();
    // The failed instruction consumed 2; it is skipped, never reassigned
    assert_eq!(sequences, vec![1, 3]);
}

#[test]
fn buy_side_iterates_price_then_time() {
    let (mut dispatcher, _events) = dispatcher_with_store(MemoryStore::new());
    let client = ClientId::new();
    let instrument = InstrumentId::new("BTC/USDT");

    let a = dispatcher.process(place(client, Side::Buy, dec!(10), dec!(1)));
    let b = dispatcher.process(place(client, Side::Buy, dec!(10), dec!(1)));
    let c = dispatcher.process(place(client, Side::Buy, dec!(11), dec!(1)));

    let expected: Vec<String> = [c, a, b]
        .iter()
        .map(|response| response.record_id.clone().unwrap())
        .collect();

    let snapshot = dispatcher.snapshot(&instrument).unwrap();
    let iterated: Vec<String> = snapshot
        .bids()
        .map(|order| order.order_id.to_string())
        .collect();

    // Higher price first, then earlier insertion at the same price
    assert_eq!(iterated, expected);
}

#[test]
fn mass_cancel_publishes_exactly_the_post_cancellation_book() {
    let (mut dispatcher, events) = dispatcher_with_store(MemoryStore::new());
    let client = ClientId::new();
    let other = ClientId::new();
    let instrument = InstrumentId::new("BTC/USDT");

    dispatcher.process(place(client, Side::Buy, dec!(10), dec!(1)));
    dispatcher.process(place(client, Side::Buy, dec!(11), dec!(1)));
    dispatcher.process(place(client, Side::Sell, dec!(20), dec!(1)));
    dispatcher.process(place(other, Side::Buy, dec!(12), dec!(1)));
    let _ = events.try_iter().count();

    let response = dispatcher.process(Instruction::MassCancel(MassCancel {
        message_id: MessageId::new(),
        client_id: client,
        instrument_id: instrument.clone(),
        side: Side::Buy,
        timestamp: 2_000,
    }));
    assert!(response.is_ok());

    // The live snapshot shows zero of the client's buys
    let snapshot = dispatcher.snapshot(&instrument).unwrap();
    assert!(snapshot.bids().all(|order| order.client_id != client));

    // Exactly one event was published for the whole multi-cancel, and its
    // book is the post-cancellation book
    let published: Vec<OutgoingEvent> = events.try_iter().collect();
    assert_eq!(published.len(), 1);
    match &published[0] {
        OutgoingEvent::OrdersCancelled { orders, book, .. } => {
            assert_eq!(orders.len(), 2);
            assert!(book.bids.iter().all(|order| order.client_id != client));
            assert_eq!(book.bids.len(), 1);
            assert_eq!(book.asks.len(), 1);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[test]
fn cancel_then_cancel_again_reports_not_found() {
    let (mut dispatcher, _events) = dispatcher_with_store(MemoryStore::new());
    let client = ClientId::new();

    let response = dispatcher.process(place(client, Side::Buy, dec!(10), dec!(1)));
    let order_id: OrderId = {
        let snapshot = dispatcher
            .snapshot(&InstrumentId::new("BTC/USDT"))
            .unwrap();
        let resting = snapshot.bids().next().unwrap();
        assert_eq!(resting.order_id.to_string(), response.record_id.unwrap());
        resting.order_id
    };

    let cancel = |id: OrderId| {
        Instruction::CancelOrder(CancelOrder {
            message_id: MessageId::new(),
            client_id: client,
            order_id: id,
            timestamp: 2_000,
        })
    };

    let first = dispatcher.process(cancel(order_id));
    assert!(first.is_ok());

    let second = dispatcher.process(cancel(order_id));
    assert_eq!(second.status, InstructionStatus::OrderNotFound);
}

#[test]
fn recovery_rebuilds_state_and_dedup() {
    let tmp = tempfile::TempDir::new().unwrap();
    let client = ClientId::new();
    let instrument = InstrumentId::new("BTC/USDT");
    let duplicate = cash_with_business(client, dec!(5), "dep-1");

    let (first_response, cancelled_id, resting_id) = {
        let store = JournalStore::open(JournalConfig::new(tmp.path())).unwrap();
        let (mut dispatcher, _events) = dispatcher_with_store(store);

        let first_response = dispatcher.process(duplicate.clone());
        assert!(first_response.is_ok());

        let placed = dispatcher.process(place(client, Side::Buy, dec!(50000), dec!(1)));
        let resting = dispatcher.process(place(client, Side::Buy, dec!(49000), dec!(2)));
        let cancelled_id: OrderId = {
            let snapshot = dispatcher.snapshot(&instrument).unwrap();
            let found = snapshot
                .bids()
                .find(|order| order.order_id.to_string() == *placed.record_id.as_ref().unwrap())
                .unwrap()
                .order_id;
            found
        };
        dispatcher.process(Instruction::CancelOrder(CancelOrder {
            message_id: MessageId::new(),
            client_id: client,
            order_id: cancelled_id,
            timestamp: 2_000,
        }));

        (
            first_response,
            cancelled_id,
            resting.record_id.unwrap(),
        )
    };

    // Restart: replay the journal into a fresh dispatcher
    let recovered = recovery::recover(tmp.path()).unwrap();
    let mut store = JournalStore::open(JournalConfig::new(tmp.path())).unwrap();
    store.set_last_sequence(recovered.last_sequence);
    let (mut dispatcher, _events) = dispatcher_with_store(store);
    dispatcher.seed_from_recovery(recovered);

    // Balances and resting orders are back
    assert_eq!(dispatcher.balance(&client, &AssetId::new("BTC")), dec!(5));
    let snapshot = dispatcher.snapshot(&instrument).unwrap();
    let resting: Vec<String> = snapshot
        .bids()
        .map(|order| order.order_id.to_string())
        .collect();
    assert_eq!(resting, vec![resting_id]);
    assert!(snapshot
        .bids()
        .all(|order| order.order_id != cancelled_id));

    // Sequencing resumes past the last committed value: 4 commits happened
    assert_eq!(dispatcher.next_sequence(), 5);

    // The dedup index survived: the duplicate replays the original result
    let replayed = dispatcher.process(duplicate);
    assert_eq!(replayed, first_response);
    assert_eq!(dispatcher.balance(&client, &AssetId::new("BTC")), dec!(5));
}

#[test]
fn reference_price_tracks_committed_book_changes() {
    let (mut dispatcher, _events) = dispatcher_with_store(MemoryStore::new());
    let instrument = InstrumentId::new("BTC/USDT");

    dispatcher.process(place(ClientId::new(), Side::Buy, dec!(100), dec!(1)));
    dispatcher.process(place(ClientId::new(), Side::Sell, dec!(102), dec!(1)));
    // Mid 101 sampled once both sides exist
    assert_eq!(
        dispatcher.reference_price(&instrument, 1_000),
        Some(dec!(101))
    );

    // A better bid moves the mid; the estimate is the mean of both samples
    dispatcher.process(place(ClientId::new(), Side::Buy, dec!(101), dec!(1)));
    let price = dispatcher.reference_price(&instrument, 1_000).unwrap();
    assert_eq!(price, dec!(101.25), "mean of 101 and 101.5");
}

#[test]
fn journal_store_end_to_end_with_price_time_priority() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = JournalStore::open(JournalConfig::new(tmp.path())).unwrap();
    let (mut dispatcher, events) = dispatcher_with_store(store);
    let client = ClientId::new();

    for price in [10u32, 11, 9] {
        let response = dispatcher.process(place(
            client,
            Side::Buy,
            Decimal::from(price),
            dec!(1),
        ));
        assert!(response.is_ok());
    }

    let sequences: Vec<u64> = events.try_iter().map(|event| event.sequence()).collect();
    assert_eq!(sequences, vec![1, 2, 3]);

    let snapshot = dispatcher.snapshot(&InstrumentId::new("BTC/USDT")).unwrap();
    let prices: Vec<Price> = snapshot.bids().map(|order| order.price).collect();
    assert_eq!(
        prices,
        vec![Price::from_u64(11), Price::from_u64(10), Price::from_u64(9)]
    );
}
