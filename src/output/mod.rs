mod traits;
pub mod usb_hid;

pub use traits::{OutputError, OutputSink};
pub use usb_hid::{configure_usb_hid, HidReport, PadRequestHandler, UsbHidOutput, RUMBLE_SIGNAL};
