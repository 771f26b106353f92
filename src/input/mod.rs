mod gpio;
mod traits;

pub use gpio::{GpioPadInput, PAD_PINS, POLL_PERIOD};
pub use traits::{InputError, InputSource};
