//! Signal register semantics and the controller that drains it into the event bus.

#![no_std]
#![no_main]

esp_bootloader_esp_idf::esp_app_desc!();

#[cfg(test)]
#[embedded_test::tests(executor = esp_hal_embassy::Executor::new())]
mod tests {
    use core::cell::Cell;

    use defmt::{assert, assert_eq};
    use embassy_executor::Spawner;
    use embassy_time::{Duration, Instant};
    use esp_hal::{
        gpio::{AnyPin, Io},
        peripherals::IO_MUX,
        timer::systimer::SystemTimer,
    };
    use stick_button::{
        BUTTON_A, BUTTON_B, ButtonConfig, ButtonController, ButtonEvent, ButtonId, EventBus,
        EventSink, InitError,
        classifier::{ButtonEventKind, State},
        drivers::button::{EdgePin, EdgeSource, sample_edge},
        initialize,
        signal::{Edge, SignalBits, SignalRegister},
    };

    /// The peripherals the bring-up tests need
    struct Board {
        io_mux: IO_MUX<'static>,
        button_a: AnyPin<'static>,
        button_b: AnyPin<'static>,
        spare: AnyPin<'static>,
        other_spare: AnyPin<'static>,
    }

    /// A pin on which one more edge lands straight after the interrupt path first touches it
    struct SettlingPin {
        low: Cell<bool>,
        interrupt: Cell<bool>,
        landing: Cell<Option<bool>>,
    }

    impl SettlingPin {
        fn land(&self) {
            if let Some(low) = self.landing.take() {
                self.low.set(low);
                self.interrupt.set(true);
            }
        }
    }

    impl EdgePin for SettlingPin {
        fn is_interrupt_set(&self) -> bool {
            self.interrupt.get()
        }

        fn clear_interrupt(&mut self) {
            self.interrupt.set(false);
            self.land();
        }

        fn is_low(&self) -> bool {
            let low = self.low.get();
            self.land();
            low
        }
    }

    /// Keeps everything a controller publishes
    struct RecordingSink {
        events: [Option<ButtonEvent>; 4],
        len: usize,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                events: [None; 4],
                len: 0,
            }
        }

        fn events(&self) -> &[Option<ButtonEvent>] {
            &self.events[..self.len]
        }
    }

    impl EventSink for RecordingSink {
        fn publish(&mut self, event: ButtonEvent) {
            self.events[self.len] = Some(event);
            self.len += 1;
        }
    }

    /// Plain helpers, kept out of the harness module so `embedded_test::tests` only sees
    /// `#[init]`/`#[test]` functions
    mod support {
        use super::*;

        pub(super) fn at(ms: u64) -> Instant {
            Instant::from_millis(ms)
        }

        pub(super) fn recording(
            button: ButtonId,
            signals: &'static SignalRegister,
        ) -> Result<ButtonController<RecordingSink>, InitError> {
            ButtonController::new(button, signals, ButtonConfig::default(), RecordingSink::new())
        }
    }
    use support::{at, recording};

    #[init]
    fn init() -> Board {
        rtt_target::rtt_init_defmt!();
        let peripherals = esp_hal::init(esp_hal::Config::default());
        let timer0 = SystemTimer::new(peripherals.SYSTIMER);
        esp_hal_embassy::init(timer0.alarm0);
        Board {
            io_mux: peripherals.IO_MUX,
            button_a: peripherals.GPIO9.into(),
            button_b: peripherals.GPIO3.into(),
            spare: peripherals.GPIO4.into(),
            other_spare: peripherals.GPIO5.into(),
        }
    }

    #[test]
    fn coalesced_edges_replay_in_arrival_order() {
        let push_then_release = SignalBits::EMPTY
            .with(Edge::Push, at(3))
            .with(Edge::Release, at(7));
        let mut edges = push_then_release.edges();
        assert_eq!(edges.next(), Some((Edge::Push, at(3))));
        assert_eq!(edges.next(), Some((Edge::Release, at(7))));
        assert_eq!(edges.next(), None);

        let release_then_push = SignalBits::EMPTY
            .with(Edge::Release, at(3))
            .with(Edge::Push, at(7));
        let mut edges = release_then_push.edges();
        assert_eq!(edges.next(), Some((Edge::Release, at(3))));
        assert_eq!(edges.next(), Some((Edge::Push, at(7))));
        assert_eq!(edges.next(), None);
    }

    #[test]
    fn repeated_edge_keeps_the_latest_arrival() {
        let bits = SignalBits::EMPTY
            .with(Edge::Push, at(1))
            .with(Edge::Push, at(4));
        let mut edges = bits.edges();
        assert_eq!(edges.next(), Some((Edge::Push, at(4))));
        assert_eq!(edges.next(), None);
        assert!(!bits.contains(Edge::Release));
        assert!(SignalBits::EMPTY.is_empty());
        assert_eq!(SignalBits::EMPTY.edges().next(), None);
    }

    #[test]
    fn take_clears_the_register() {
        static SIGNALS: SignalRegister = SignalRegister::new();

        let before = Instant::now();
        SIGNALS.raise(Edge::Push);
        assert!(SIGNALS.pending().contains(Edge::Push));
        let taken = SIGNALS.take();
        assert!(taken.contains(Edge::Push));
        assert!(!taken.contains(Edge::Release));
        assert!(taken.edges().all(|(_, arrived)| arrived >= before));
        assert!(SIGNALS.take().is_empty());
    }

    #[test]
    async fn wait_times_out_with_nothing_pending() {
        static SIGNALS: SignalRegister = SignalRegister::new();

        let started = Instant::now();
        let bits = SIGNALS
            .wait_until(started + Duration::from_millis(20))
            .await;
        assert!(bits.is_empty());
        assert!(Instant::now() >= started + Duration::from_millis(20));
    }

    #[test]
    #[timeout(1)]
    async fn wait_returns_pending_edges_immediately() {
        static SIGNALS: SignalRegister = SignalRegister::new();

        SIGNALS.raise(Edge::Release);
        let bits = SIGNALS
            .wait_until(Instant::now() + Duration::from_secs(10))
            .await;
        assert!(bits.contains(Edge::Release));
        assert!(SIGNALS.pending().is_empty());
    }

    #[test]
    fn register_has_a_single_owner() {
        static SIGNALS: SignalRegister = SignalRegister::new();

        let first = recording(BUTTON_A, &SIGNALS);
        assert!(first.is_ok());
        let second = recording(BUTTON_A, &SIGNALS);
        assert!(matches!(second, Err(InitError::AlreadyClaimed)));
    }

    #[test]
    fn edge_landing_while_acknowledging_is_not_lost() {
        // Pushed, and the release lands while the push interrupt is being handled
        let mut pin = SettlingPin {
            low: Cell::new(true),
            interrupt: Cell::new(true),
            landing: Cell::new(Some(false)),
        };

        let first = sample_edge(&mut pin);
        assert_eq!(first, Some(Edge::Release));
        // The landed edge latched the interrupt again, so the settled level is reported twice
        assert!(pin.is_interrupt_set());
        assert_eq!(sample_edge(&mut pin), Some(Edge::Release));
        assert_eq!(sample_edge(&mut pin), None);
    }

    #[test]
    fn quiet_pin_reports_nothing() {
        let mut pin = SettlingPin {
            low: Cell::new(true),
            interrupt: Cell::new(false),
            landing: Cell::new(None),
        };
        assert_eq!(sample_edge(&mut pin), None);
    }

    #[test]
    fn click_is_published_with_the_button_id() {
        static SIGNALS: SignalRegister = SignalRegister::new();
        let Ok(mut controller) = recording(BUTTON_B, &SIGNALS) else {
            defmt::panic!("register already claimed");
        };

        SIGNALS.raise_at(Edge::Push, at(0));
        controller.process(SIGNALS.take(), at(0));
        controller.process(SIGNALS.take(), at(10));
        SIGNALS.raise_at(Edge::Release, at(50));
        controller.process(SIGNALS.take(), at(50));
        assert!(controller.sink().events().is_empty());
        controller.process(SIGNALS.take(), at(60));

        assert_eq!(
            controller.sink().events(),
            &[Some(ButtonEvent {
                button: BUTTON_B,
                kind: ButtonEventKind::Click,
            })]
        );
        assert_eq!(controller.classifier().state(), State::Idle);
    }

    #[test]
    fn late_wakeup_applies_release_at_its_arrival_time() {
        static SIGNALS: SignalRegister = SignalRegister::new();
        let Ok(mut controller) = recording(BUTTON_A, &SIGNALS) else {
            defmt::panic!("register already claimed");
        };

        SIGNALS.raise_at(Edge::Push, at(0));
        controller.process(SIGNALS.take(), at(0));
        // Released well short of the hold threshold, but the task only runs again after it
        SIGNALS.raise_at(Edge::Release, at(1500));
        controller.process(SIGNALS.take(), at(2600));

        assert_eq!(
            controller.sink().events(),
            &[Some(ButtonEvent {
                button: BUTTON_A,
                kind: ButtonEventKind::Click,
            })]
        );
        assert_eq!(controller.classifier().state(), State::Idle);
    }

    #[test]
    fn late_wakeup_publishes_hold_before_applying_release() {
        static SIGNALS: SignalRegister = SignalRegister::new();
        let Ok(mut controller) = recording(BUTTON_A, &SIGNALS) else {
            defmt::panic!("register already claimed");
        };

        SIGNALS.raise_at(Edge::Push, at(0));
        controller.process(SIGNALS.take(), at(0));
        // Held past the threshold and released; the task only gets to run after both
        SIGNALS.raise_at(Edge::Release, at(2595));
        controller.process(SIGNALS.take(), at(2600));

        assert_eq!(
            controller.sink().events(),
            &[Some(ButtonEvent {
                button: BUTTON_A,
                kind: ButtonEventKind::Hold,
            })]
        );
        assert!(matches!(
            controller.classifier().state(),
            State::HoldReleasePending { .. }
        ));
        controller.process(SIGNALS.take(), at(2610));
        assert_eq!(controller.sink().events().len(), 1);
        assert_eq!(controller.classifier().state(), State::Idle);
    }

    #[test]
    fn bounce_processed_after_its_debounce_window_is_still_a_bounce() {
        static SIGNALS: SignalRegister = SignalRegister::new();
        let Ok(mut controller) = recording(BUTTON_A, &SIGNALS) else {
            defmt::panic!("register already claimed");
        };

        // Both edges arrive inside one debounce window; the task wakes after it has closed
        SIGNALS.raise_at(Edge::Push, at(0));
        SIGNALS.raise_at(Edge::Release, at(8));
        controller.process(SIGNALS.take(), at(11));
        assert!(controller.sink().events().is_empty());
        assert_eq!(controller.classifier().state(), State::Idle);

        // Same again with the push already applied before the release shows up late
        SIGNALS.raise_at(Edge::Push, at(100));
        controller.process(SIGNALS.take(), at(100));
        SIGNALS.raise_at(Edge::Release, at(108));
        controller.process(SIGNALS.take(), at(111));
        assert_eq!(controller.classifier().state(), State::Idle);

        controller.process(SIGNALS.take(), at(3000));
        assert!(controller.sink().events().is_empty());
    }

    #[test]
    fn coalesced_bounce_leaves_the_button_released() {
        static SIGNALS: SignalRegister = SignalRegister::new();
        let Ok(mut controller) = recording(BUTTON_A, &SIGNALS) else {
            defmt::panic!("register already claimed");
        };

        SIGNALS.raise_at(Edge::Push, at(0));
        SIGNALS.raise_at(Edge::Release, at(1));
        controller.process(SIGNALS.take(), at(1));
        assert_eq!(controller.classifier().state(), State::Idle);

        SIGNALS.raise_at(Edge::Release, at(4));
        SIGNALS.raise_at(Edge::Push, at(5));
        controller.process(SIGNALS.take(), at(5));
        assert_eq!(
            controller.classifier().state(),
            State::PressPending { pushed_at: at(5) }
        );

        SIGNALS.raise_at(Edge::Release, at(100));
        controller.process(SIGNALS.take(), at(100));
        controller.process(SIGNALS.take(), at(200));
        assert_eq!(
            controller.sink().events(),
            &[Some(ButtonEvent {
                button: BUTTON_A,
                kind: ButtonEventKind::Click,
            })]
        );
    }

    #[test]
    fn events_reach_every_subscriber() {
        static SIGNALS: SignalRegister = SignalRegister::new();
        static BUS: EventBus = EventBus::new();

        let (Ok(mut first), Ok(mut second)) = (BUS.subscriber(), BUS.subscriber()) else {
            defmt::panic!("no subscriber slots left");
        };
        let Ok(mut controller) = ButtonController::new(
            BUTTON_A,
            &SIGNALS,
            ButtonConfig::default(),
            BUS.immediate_publisher(),
        ) else {
            defmt::panic!("register already claimed");
        };

        SIGNALS.raise_at(Edge::Push, at(0));
        controller.process(SIGNALS.take(), at(0));
        controller.process(SIGNALS.take(), at(2000));

        let expected = ButtonEvent {
            button: BUTTON_A,
            kind: ButtonEventKind::Hold,
        };
        assert_eq!(first.try_next_message_pure(), Some(expected));
        assert_eq!(second.try_next_message_pure(), Some(expected));
        assert_eq!(first.try_next_message_pure(), None);
    }

    #[test]
    fn released_edge_source_can_be_brought_up_again(board: Board) {
        let Some(source) = EdgeSource::get(BUTTON_B) else {
            defmt::panic!("no edge source for button B");
        };

        assert!(source.attach(board.button_b).is_ok());
        assert!(matches!(
            source.attach(board.spare),
            Err(InitError::AlreadyInitialized)
        ));
        assert!(recording(BUTTON_B, source.signals()).is_ok());
        source.signals().raise(Edge::Push);

        source.release();
        assert!(!source.signals().is_claimed());
        assert!(source.signals().pending().is_empty());
        assert!(!source.detach());

        assert!(source.attach(board.other_spare).is_ok());
        assert!(recording(BUTTON_B, source.signals()).is_ok());
    }

    #[test]
    async fn second_bring_up_of_a_button_is_rejected_without_side_effects(board: Board) {
        static BUS: EventBus = EventBus::new();
        let spawner = Spawner::for_current_executor().await;
        let mut io = Io::new(board.io_mux);

        let first = initialize(
            &spawner,
            &mut io,
            BUTTON_A,
            board.button_a,
            BUS.immediate_publisher(),
        );
        assert!(first.is_ok());

        let again = initialize(
            &spawner,
            &mut io,
            BUTTON_A,
            board.spare,
            BUS.immediate_publisher(),
        );
        assert!(matches!(again, Err(InitError::AlreadyInitialized)));

        let unknown = initialize(
            &spawner,
            &mut io,
            ButtonId(7),
            board.other_spare,
            BUS.immediate_publisher(),
        );
        assert!(matches!(unknown, Err(InitError::UnknownButton)));

        // The first bring-up still owns its register and the other button is untouched
        let (Some(a), Some(b)) = (EdgeSource::get(BUTTON_A), EdgeSource::get(BUTTON_B)) else {
            defmt::panic!("missing edge source");
        };
        assert!(a.signals().is_claimed());
        assert!(!b.signals().is_claimed());
    }
}
