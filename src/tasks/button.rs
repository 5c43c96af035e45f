use defmt::{info, trace, warn};
use embassy_executor::{SpawnError, Spawner};
use embassy_sync::{
    blocking_mutex::raw::CriticalSectionRawMutex,
    pubsub::{ImmediatePublisher, PubSubChannel, Subscriber},
};
use embassy_time::Instant;
use esp_hal::gpio::{AnyPin, Io};

use crate::{
    ButtonConfig, ButtonId, MAX_BUTTONS, SIGNAL_WAIT_TIMEOUT,
    classifier::{ButtonEventKind, Classifier, Input},
    drivers::button::{EdgeSource, install_edge_handler},
    signal::{SignalBits, SignalRegister},
};

/// What gets published for every classified interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub struct ButtonEvent {
    pub button: ButtonId,
    pub kind: ButtonEventKind,
}

/// Events queued per subscriber before the oldest is overwritten
const EVENT_QUEUE_SIZE: usize = 8;
const MAX_SUBSCRIBERS: usize = 4;
const MAX_PUBLISHERS: usize = 1;

/// Channel types for the button event bus.
pub type EventBus = PubSubChannel<
    CriticalSectionRawMutex,
    ButtonEvent,
    EVENT_QUEUE_SIZE,
    MAX_SUBSCRIBERS,
    MAX_PUBLISHERS,
>;
pub type EventPublisher = ImmediatePublisher<
    'static,
    CriticalSectionRawMutex,
    ButtonEvent,
    EVENT_QUEUE_SIZE,
    MAX_SUBSCRIBERS,
    MAX_PUBLISHERS,
>;
pub type EventSubscriber = Subscriber<
    'static,
    CriticalSectionRawMutex,
    ButtonEvent,
    EVENT_QUEUE_SIZE,
    MAX_SUBSCRIBERS,
    MAX_PUBLISHERS,
>;

/// Where a controller delivers its events. Must not block.
pub trait EventSink {
    fn publish(&mut self, event: ButtonEvent);
}

impl EventSink for EventPublisher {
    fn publish(&mut self, event: ButtonEvent) {
        // Never waits: a lagging subscriber loses its oldest message instead
        self.publish_immediate(event);
    }
}

/// Reasons a button could not be brought up
#[derive(Debug, Clone, Copy, defmt::Format)]
pub enum InitError {
    /// The id does not name a button on this board
    UnknownButton,
    /// A pin is already attached to this button
    AlreadyInitialized,
    /// Another controller already consumes this button's signal register
    AlreadyClaimed,
    /// No free slot in the classifier task pool
    Spawn(SpawnError),
}

impl From<SpawnError> for InitError {
    fn from(e: SpawnError) -> Self {
        InitError::Spawn(e)
    }
}

/// Owns everything one button needs on the task side: its signal register, its state machine and
/// the sink its events go to.
pub struct ButtonController<S: EventSink> {
    button: ButtonId,
    signals: &'static SignalRegister,
    classifier: Classifier,
    sink: S,
}

impl<S: EventSink> ButtonController<S> {
    /// Claim `signals` and build a controller around it.
    ///
    /// A register can only ever be consumed by one controller; a second claim fails.
    pub fn new(
        button: ButtonId,
        signals: &'static SignalRegister,
        config: ButtonConfig,
        sink: S,
    ) -> Result<Self, InitError> {
        if !signals.claim() {
            return Err(InitError::AlreadyClaimed);
        }
        Ok(Self {
            button,
            signals,
            classifier: Classifier::new(config),
            sink,
        })
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Advance the state machine to `now` and apply the edges taken from the register.
    ///
    /// Each edge is applied at the time it arrived, after any deadline that fell before it. The
    /// deadlines left between the last edge and `now` are handled at the end.
    pub fn process(&mut self, bits: SignalBits, now: Instant) {
        let Self {
            button,
            classifier,
            sink,
            ..
        } = self;
        let mut emit = |kind: ButtonEventKind| {
            info!("BUTTON_TASK: {} {}", *button, kind);
            sink.publish(ButtonEvent {
                button: *button,
                kind,
            });
        };

        for (edge, at) in bits.edges() {
            trace!("BUTTON_TASK: {} edge {} at {}", *button, edge, at);
            classifier.expire(at, &mut emit);
            if let Some(kind) = classifier.handle(Input::Edge(edge), at) {
                emit(kind);
            }
        }
        classifier.expire(now, &mut emit);
    }

    /// The classifier loop. Sleeps on the register until an edge or the next deadline, forever.
    pub async fn run(mut self) -> ! {
        info!("BUTTON_TASK: {} classifier started", self.button);
        loop {
            let deadline = self
                .classifier
                .deadline()
                .unwrap_or_else(|| Instant::now() + SIGNAL_WAIT_TIMEOUT);
            self.signals.wait(deadline).await;
            // Read the clock before taking so no taken edge can predate a deadline already served
            let now = Instant::now();
            let bits = self.signals.take();
            self.process(bits, now);
        }
    }
}

#[embassy_executor::task(pool_size = MAX_BUTTONS)]
async fn classifier_task(controller: ButtonController<EventPublisher>) {
    controller.run().await
}

/// Bring up one button: configure its pin, route its interrupt, claim its signal register and
/// start its classifier task.
///
/// Either every step succeeds or none leaves a trace: on failure the pin is detached and the
/// register released, so the button can be initialised again.
///
/// # Parameters
/// * `spawner` - Spawner for the classifier task
/// * `io` - The GPIO driver; the shared edge interrupt handler is installed on it
/// * `button` - Which button this is. Also tags every event it produces
/// * `pin` - The GPIO the button is wired to (active low)
/// * `publisher` - Where `Click` and `Hold` events are published
pub fn initialize(
    spawner: &Spawner,
    io: &mut Io<'_>,
    button: ButtonId,
    pin: AnyPin<'static>,
    publisher: EventPublisher,
) -> Result<(), InitError> {
    let source = EdgeSource::get(button).ok_or(InitError::UnknownButton)?;
    source.attach(pin)?;
    let controller =
        match ButtonController::new(button, source.signals(), ButtonConfig::default(), publisher) {
            Ok(controller) => controller,
            Err(e) => {
                source.detach();
                return Err(e);
            }
        };
    install_edge_handler(io);
    if let Err(e) = spawner.spawn(classifier_task(controller)) {
        warn!("BUTTON: {} classifier task not started: {}", button, e);
        source.release();
        return Err(e.into());
    }
    info!("BUTTON: {} initialised", button);
    Ok(())
}
