use anyhow::Context;
use crossbeam_channel::unbounded;
use engine::{ChannelPublisher, Dispatcher, InstructionEnvelope, Settings};
use persistence::journal::JournalStore;
use persistence::recovery;
use std::thread;

fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt::init();

    tracing::info!("starting transactional engine core");
    let settings = Settings::load().context("loading settings")?;

    // Rebuild state from the journal before accepting work
    let journal_config = settings.journal_config();
    let recovered =
        recovery::recover(&journal_config.dir).context("replaying commit journal")?;
    let mut store = JournalStore::open(journal_config).context("opening commit journal")?;
    store.set_last_sequence(recovered.last_sequence);

    let (event_sender, event_receiver) = unbounded::<engine::OutgoingEvent>();
    let (inbound_sender, inbound_receiver) = unbounded::<InstructionEnvelope>();

    // Stand-in consumer for the external fan-out transport: drain and log.
    // Runs on its own thread so a slow consumer never blocks dispatch.
    let event_logger = thread::spawn(move || {
        for event in event_receiver.iter() {
            tracing::info!(sequence = event.sequence(), ?event, "outgoing event");
        }
    });

    let mut dispatcher = Dispatcher::new(
        settings.asset_registry(),
        settings.instrument_registry(),
        settings.dispatcher_config(),
        store,
        ChannelPublisher::new(event_sender),
    );
    dispatcher.seed_from_recovery(recovered);

    tracing::info!(
        next_sequence = dispatcher.next_sequence(),
        started_at = chrono::Utc::now().timestamp_millis(),
        "engine ready; consuming inbound instructions"
    );

    // The session layer owns the sender half; dispatch blocks here until the
    // queue closes
    let _inbound_handle = inbound_sender;
    dispatcher.run(&inbound_receiver);

    drop(dispatcher);
    event_logger
        .join()
        .map_err(|_| anyhow::anyhow!("event logger thread panicked"))?;
    Ok(())
}
