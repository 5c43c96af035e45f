use core::cell::RefCell;

use critical_section::Mutex;
use esp_hal::{
    gpio::{AnyPin, Event, Input, InputConfig, Io, Pull},
    handler, ram,
};

use crate::{
    ButtonId, MAX_BUTTONS,
    signal::{Edge, SignalRegister},
    tasks::button::InitError,
};

/// What the interrupt path needs from a pin
pub trait EdgePin {
    fn is_interrupt_set(&self) -> bool;
    fn clear_interrupt(&mut self);
    fn is_low(&self) -> bool;
}

impl EdgePin for Input<'static> {
    fn is_interrupt_set(&self) -> bool {
        Input::is_interrupt_set(self)
    }

    fn clear_interrupt(&mut self) {
        Input::clear_interrupt(self)
    }

    fn is_low(&self) -> bool {
        Input::is_low(self)
    }
}

/// Acknowledge a pending interrupt on `pin` and report which way it settled.
///
/// The interrupt is cleared before the level is sampled. An edge landing after the clear latches
/// the interrupt again and is reported on the next pass, so the last edge is never lost.
pub fn sample_edge(pin: &mut impl EdgePin) -> Option<Edge> {
    if !pin.is_interrupt_set() {
        return None;
    }
    pin.clear_interrupt();
    // Active low: the button pulls the pin to ground
    Some(if pin.is_low() {
        Edge::Push
    } else {
        Edge::Release
    })
}

/// Turns pin interrupts for one button into bits in its [`SignalRegister`]
pub struct EdgeSource {
    /// The pin is parked here once configured so the interrupt handler can read and acknowledge it
    pin: Mutex<RefCell<Option<Input<'static>>>>,
    signals: SignalRegister,
}

/// One edge source per button on the board, indexed by [`ButtonId`]
pub static EDGE_SOURCES: [EdgeSource; MAX_BUTTONS] = [const { EdgeSource::new() }; MAX_BUTTONS];

impl EdgeSource {
    pub const fn new() -> Self {
        Self {
            pin: Mutex::new(RefCell::new(None)),
            signals: SignalRegister::new(),
        }
    }

    /// Look up the edge source for a button
    pub fn get(button: ButtonId) -> Option<&'static EdgeSource> {
        EDGE_SOURCES.get(usize::from(button.0))
    }

    pub fn signals(&self) -> &SignalRegister {
        &self.signals
    }

    /// Configure `pin` as a pulled-up input interrupting on both edges and take ownership of it.
    ///
    /// Fails if a pin is already attached to this edge source.
    pub fn attach(&self, pin: AnyPin<'static>) -> Result<(), InitError> {
        critical_section::with(|cs| {
            let mut slot = self.pin.borrow_ref_mut(cs);
            if slot.is_some() {
                return Err(InitError::AlreadyInitialized);
            }
            let mut input = Input::new(pin, InputConfig::default().with_pull(Pull::Up));
            input.listen(Event::AnyEdge);
            slot.replace(input);
            Ok(())
        })
    }

    /// Stop listening on the attached pin and hand it back to the HAL. Returns false if no pin
    /// was attached.
    pub fn detach(&self) -> bool {
        critical_section::with(|cs| {
            let Some(mut input) = self.pin.borrow_ref_mut(cs).take() else {
                return false;
            };
            input.unlisten();
            input.clear_interrupt();
            true
        })
    }

    /// Undo a bring-up: detach the pin and release the signal register
    pub fn release(&self) {
        self.detach();
        self.signals.release();
    }

    /// Interrupt-side entry point. Acknowledges the interrupt, samples the level and raises the
    /// matching bit. Does nothing if this pin did not fire.
    pub fn on_edge(&self) {
        critical_section::with(|cs| {
            let mut slot = self.pin.borrow_ref_mut(cs);
            if let Some(edge) = slot.as_mut().and_then(sample_edge) {
                self.signals.raise(edge);
            }
        });
    }
}

impl Default for EdgeSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Route the GPIO interrupt to the edge sources. Installing it more than once is harmless.
pub fn install_edge_handler(io: &mut Io<'_>) {
    io.set_interrupt_handler(edge_handler);
}

/// The shared GPIO interrupt. All pins on the bank raise the same interrupt, so every edge source
/// checks its own status bit.
#[handler]
#[ram]
fn edge_handler() {
    for source in EDGE_SOURCES.iter() {
        source.on_edge();
    }
}
