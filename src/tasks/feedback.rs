use defmt::{debug, info};
use embassy_time::Timer;
use smart_leds::RGB8;

use crate::{
    BUTTON_A, HOLD_COLOUR, HOLD_FLASH, LED_BRIGHTNESS, classifier::ButtonEventKind,
    drivers::neopixel::LedDriver, tasks::button::EventSubscriber,
};

/// LED feedback task.
/// A click on button A toggles the LED as a torch. A hold on any button flashes the hold colour,
/// then restores whatever the torch was showing.
///
/// # Parameters
/// * `events` - Subscription to the button event bus
/// * `led` - LED driver for the status LED
#[embassy_executor::task]
pub async fn feedback_task(mut events: EventSubscriber, led: &'static mut LedDriver) {
    let mut torch = false;
    led.all_off().await;

    info!("FEEDBACK_TASK: Task started. Waiting for button events...");
    loop {
        let event = events.next_message_pure().await;
        debug!("FEEDBACK_TASK: {}", event);
        match event.kind {
            ButtonEventKind::Click if event.button == BUTTON_A => {
                torch ^= true;
                info!("FEEDBACK_TASK: Torch {}", torch);
            }
            ButtonEventKind::Click => continue,
            ButtonEventKind::Hold => {
                led.fill(RGB8::from(HOLD_COLOUR), LED_BRIGHTNESS).await;
                Timer::after(HOLD_FLASH).await;
            }
        }
        if torch {
            led.white(LED_BRIGHTNESS).await;
        } else {
            led.all_off().await;
        }
    }
}
