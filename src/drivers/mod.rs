pub mod button;
pub mod neopixel;
