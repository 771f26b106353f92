//! Multi-console controller adapter firmware for RP2040.
//!
//! Hosts the external collaborators of the core: a GPIO-wired pad as an
//! input source, a USB HID gamepad as the output consumer, and a flash
//! sector holding the settings record.

#![no_std]

// Re-export core types for convenience
pub use multipad_core::{
    Buttons, CanonicalInputEvent, DeviceId, DeviceKind, FeedbackState, InputContext, OutputFrame,
    OutputTarget, Settings, SettingsStore, SnapshotCell, Transport, DEFAULT_CATALOG,
};

pub mod input;
pub mod output;
pub mod storage;

pub use input::{GpioPadInput, InputError, InputSource, PAD_PINS};
pub use output::{configure_usb_hid, HidReport, OutputError, OutputSink, PadRequestHandler, UsbHidOutput};
pub use storage::FlashStore;
