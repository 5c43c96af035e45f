#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]

use defmt::info;
use embassy_executor::Spawner;
use esp_hal::{
    Config, clock::CpuClock, gpio::Io, rmt::Rmt, time::Rate, timer::systimer::SystemTimer,
};
#[cfg(not(feature = "rtt"))]
use esp_backtrace as _;
#[cfg(feature = "rtt")]
use panic_rtt_target as _;
use stick_button::{
    BUTTON_A, BUTTON_B, ButtonEvent, EventBus, classifier::ButtonEventKind,
    drivers::neopixel::LedDriver, feedback_task, initialize,
};

use static_cell::StaticCell;

/// Button events from every classifier task are published here
static EVENT_BUS: StaticCell<EventBus> = StaticCell::new();

/// Our LED driver that underlies the feedback task
static LED_DRIVER: StaticCell<LedDriver> = StaticCell::new();

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

#[esp_hal_embassy::main]
async fn main(spawner: Spawner) {
    #[cfg(all(feature = "rtt", feature = "defmt"))]
    rtt_target::rtt_init_defmt!();

    let peripherals = esp_hal::init(Config::default().with_cpu_clock(CpuClock::max()));
    let timer0 = SystemTimer::new(peripherals.SYSTIMER);
    esp_hal_embassy::init(timer0.alarm0);

    let bus: &'static EventBus = EVENT_BUS.init(EventBus::new());
    let mut events = bus.subscriber().expect("Failed to subscribe to button events");

    let rmt = Rmt::new(peripherals.RMT, Rate::from_mhz(80))
        .expect("Failed to initialise RMT0")
        .into_async();
    let led_driver = LED_DRIVER.init(LedDriver::new(rmt, peripherals.GPIO2));
    spawner
        .spawn(feedback_task(
            bus.subscriber()
                .expect("Failed to subscribe feedback task"),
            led_driver,
        ))
        .expect("Failed to spawn feedback task");

    // Both buttons share the GPIO interrupt but get their own classifier
    let mut io = Io::new(peripherals.IO_MUX);
    initialize(
        &spawner,
        &mut io,
        BUTTON_A,
        peripherals.GPIO9.into(),
        bus.immediate_publisher(),
    )
    .expect("Failed to initialise button A");
    initialize(
        &spawner,
        &mut io,
        BUTTON_B,
        peripherals.GPIO3.into(),
        bus.immediate_publisher(),
    )
    .expect("Failed to initialise button B");

    info!("MAIN: Starting main loop");
    loop {
        let ButtonEvent { button, kind } = events.next_message_pure().await;
        match kind {
            ButtonEventKind::Click => info!("MAIN: {} clicked", button),
            ButtonEventKind::Hold => info!("MAIN: {} held", button),
        }
    }
}
