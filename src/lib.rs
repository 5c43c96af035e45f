#![no_std]

pub mod classifier;
pub mod drivers;
pub mod signal;
pub mod tasks;

use embassy_time::Duration;

pub use tasks::*;

/// Time a pin level must stay unchanged before an edge is believed
pub const DEBOUNCE_TIME: Duration = Duration::from_millis(10);

/// Time a confirmed press must last, measured from its push edge, to be reported as a hold
pub const HOLD_TIME: Duration = Duration::from_millis(2000);

/// Upper bound on how long the classifier sleeps when it has no deadline armed
pub const SIGNAL_WAIT_TIMEOUT: Duration = Duration::from_secs(1);

/// Number of buttons wired to the board. Each one gets its own edge source and classifier task
pub const MAX_BUTTONS: usize = 2;

/// The colour flashed on the LED when a hold is reported (amber)
pub const HOLD_COLOUR: [u8; 3] = [255, 120, 0];

/// How long the hold colour stays on the LED
pub const HOLD_FLASH: Duration = Duration::from_millis(500);

/// Brightness used for all LED feedback
pub const LED_BRIGHTNESS: u8 = 40;

/// The number of LEDs in the string we are driving
pub const LED_STRING_SIZE: usize = 1;

/// Identifies which physical button produced an event. The value indexes the board's edge sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub struct ButtonId(pub u8);

/// The boot button on GPIO9
pub const BUTTON_A: ButtonId = ButtonId(0);

/// The auxiliary button on GPIO3
pub const BUTTON_B: ButtonId = ButtonId(1);

/// Timing thresholds for one classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub struct ButtonConfig {
    /// Debounce window applied to both the push and the release edge
    pub debounce: Duration,
    /// Press duration at which a hold is reported
    pub hold: Duration,
}

impl Default for ButtonConfig {
    fn default() -> Self {
        Self {
            debounce: DEBOUNCE_TIME,
            hold: HOLD_TIME,
        }
    }
}
