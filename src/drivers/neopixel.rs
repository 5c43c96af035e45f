use crate::LED_STRING_SIZE;
use defmt::warn;
use esp_hal::{
    Async,
    gpio::interconnect::PeripheralOutput,
    rmt::{ConstChannelAccess, Rmt, Tx},
};
use esp_hal_smartled::{SmartLedsAdapterAsync, buffer_size_async};
use smart_leds::{RGB8, SmartLedsWriteAsync};

/// We must know what the LED TX buffer size is as a constant for the types involved here
const LED_INTERNAL_BUF_LEN: usize = buffer_size_async(LED_STRING_SIZE);

pub type LedBuffer = [RGB8; LED_STRING_SIZE];

/// Status LED used to acknowledge button events
pub struct LedDriver {
    /// Sized to exactly what `SmartLedsAdapterAsync::new()` hands back for our string length
    led: SmartLedsAdapterAsync<ConstChannelAccess<Tx, 0>, LED_INTERNAL_BUF_LEN>,
}

impl LedDriver {
    /// Create a new driver for the LED string.
    ///
    /// # Parameters
    /// * `rmt` - The RMT peripheral device to use for driving the LED strip
    /// * `pin` - The GPIO pin to which the LED strip is connected
    pub fn new<'a>(rmt: Rmt<Async>, pin: impl PeripheralOutput<'a>) -> Self {
        let channel = rmt.channel0;
        let buffer = [0_u32; buffer_size_async(LED_STRING_SIZE)];
        let led = SmartLedsAdapterAsync::new(channel, pin, buffer);
        Self { led }
    }

    /// Write the buffer to the string with gamma correction and the given brightness (0-255).
    ///
    /// A failed write leaves the LED showing its previous colour; feedback is best effort.
    async fn update_from_buffer(&mut self, led_buffer: &LedBuffer, brightness: u8) {
        let mut corrected = LedBuffer::default();
        let adjust_iter =
            smart_leds::brightness(smart_leds::gamma(led_buffer.iter().cloned()), brightness);
        for (pix, value) in corrected.iter_mut().zip(adjust_iter) {
            *pix = value;
        }
        if self.led.write(corrected).await.is_err() {
            warn!("LED: write to the LED string failed");
        }
    }

    pub async fn all_off(&mut self) {
        self.update_from_buffer(&LedBuffer::default(), 0).await;
    }

    /// Fill the whole string with one colour
    pub async fn fill(&mut self, colour: RGB8, brightness: u8) {
        let mut b = LedBuffer::default();
        b.fill(colour);
        self.update_from_buffer(&b, brightness).await;
    }

    pub async fn white(&mut self, brightness: u8) {
        self.fill(
            RGB8 {
                r: 255,
                g: 255,
                b: 255,
            },
            brightness,
        )
        .await;
    }
}
