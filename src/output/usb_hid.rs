//! USB HID gamepad output implementation.

use defmt::Format;
use embassy_rp::peripherals::USB;
use embassy_rp::usb::Driver;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_usb::class::hid::{HidWriter, ReportId, RequestHandler, State};
use embassy_usb::control::OutResponse;
use embassy_usb::Builder;
use multipad_core::{AnalogAxis, CanonicalInputEvent, FeedbackState, OutputFrame};

use crate::output::traits::{OutputError, OutputSink};

/// Largest report this interface sends.
const MAX_REPORT: usize = 16;

/// Rumble requested by the host through output reports (player 1).
pub static RUMBLE_SIGNAL: Signal<CriticalSectionRawMutex, FeedbackState> = Signal::new();

/// USB HID Gamepad report structure.
///
/// This matches the HID report descriptor defined below.
/// Total size: 10 bytes (buttons: 4, sticks: 4x1, triggers: 2x1)
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, Format)]
#[repr(C)]
pub struct HidReport {
    /// Canonical button bitfield (32 buttons)
    pub buttons: u32,
    /// Left stick X (-127 to 127)
    pub left_stick_x: i8,
    /// Left stick Y (-127 to 127)
    pub left_stick_y: i8,
    /// Right stick X (-127 to 127)
    pub right_stick_x: i8,
    /// Right stick Y (-127 to 127)
    pub right_stick_y: i8,
    /// Left trigger (0-255)
    pub left_trigger: u8,
    /// Right trigger (0-255)
    pub right_trigger: u8,
}

impl HidReport {
    /// Size of the report in bytes.
    pub const SIZE: usize = 10;

    /// Convert the report to bytes.
    #[must_use]
    pub fn as_bytes(&self) -> [u8; Self::SIZE] {
        let b = self.buttons.to_le_bytes();
        [
            b[0],
            b[1],
            b[2],
            b[3],
            self.left_stick_x as u8,
            self.left_stick_y as u8,
            self.right_stick_x as u8,
            self.right_stick_y as u8,
            self.left_trigger,
            self.right_trigger,
        ]
    }

    /// Nothing pressed, sticks centered.
    #[must_use]
    pub const fn neutral() -> Self {
        Self {
            buttons: 0,
            left_stick_x: 0,
            left_stick_y: 0,
            right_stick_x: 0,
            right_stick_y: 0,
            left_trigger: 0,
            right_trigger: 0,
        }
    }
}

/// Map a 0-255 channel centered at 128 onto the signed HID range.
fn centered(value: u8) -> i8 {
    (i16::from(value) - 128).max(-127) as i8
}

impl From<&CanonicalInputEvent> for HidReport {
    fn from(event: &CanonicalInputEvent) -> Self {
        let a = &event.analog;
        Self {
            buttons: event.buttons.raw(),
            left_stick_x: centered(a[AnalogAxis::LeftX]),
            left_stick_y: centered(a[AnalogAxis::LeftY]),
            right_stick_x: centered(a[AnalogAxis::RightX]),
            right_stick_y: centered(a[AnalogAxis::RightY]),
            left_trigger: a[AnalogAxis::LeftTrigger],
            right_trigger: a[AnalogAxis::RightTrigger],
        }
    }
}

/// Standard HID Gamepad Report Descriptor.
///
/// This descriptor defines a gamepad with:
/// - 32 buttons
/// - 2 analog sticks (X/Y each, signed 8-bit)
/// - 2 triggers (unsigned 8-bit)
/// - a 2-byte vendor output report carrying rumble (left, right)
#[cfg(feature = "standard-hid")]
pub const REPORT_DESCRIPTOR: &[u8] = &[
    0x05, 0x01, // Usage Page (Generic Desktop)
    0x09, 0x05, // Usage (Gamepad)
    0xA1, 0x01, // Collection (Application)
    //
    // --- Buttons (32 buttons) ---
    0x05, 0x09, //   Usage Page (Button)
    0x19, 0x01, //   Usage Minimum (Button 1)
    0x29, 0x20, //   Usage Maximum (Button 32)
    0x15, 0x00, //   Logical Minimum (0)
    0x25, 0x01, //   Logical Maximum (1)
    0x95, 0x20, //   Report Count (32)
    0x75, 0x01, //   Report Size (1)
    0x81, 0x02, //   Input (Data, Variable, Absolute)
    //
    // --- Left Stick ---
    0x05, 0x01, //   Usage Page (Generic Desktop)
    0x09, 0x30, //   Usage (X)
    0x09, 0x31, //   Usage (Y)
    0x15, 0x81, //   Logical Minimum (-127)
    0x25, 0x7F, //   Logical Maximum (127)
    0x95, 0x02, //   Report Count (2)
    0x75, 0x08, //   Report Size (8)
    0x81, 0x02, //   Input (Data, Variable, Absolute)
    //
    // --- Right Stick ---
    0x09, 0x32, //   Usage (Z)
    0x09, 0x35, //   Usage (Rz)
    0x95, 0x02, //   Report Count (2)
    0x81, 0x02, //   Input (Data, Variable, Absolute)
    //
    // --- Triggers ---
    0x09, 0x33, //   Usage (Rx)
    0x09, 0x34, //   Usage (Ry)
    0x15, 0x00, //   Logical Minimum (0)
    0x26, 0xFF, 0x00, //   Logical Maximum (255)
    0x95, 0x02, //   Report Count (2)
    0x81, 0x02, //   Input (Data, Variable, Absolute)
    //
    // --- Rumble (output) ---
    0x06, 0x00, 0xFF, //   Usage Page (Vendor Defined)
    0x09, 0x01, //   Usage (Vendor 1)
    0x95, 0x02, //   Report Count (2)
    0x75, 0x08, //   Report Size (8)
    0x91, 0x02, //   Output (Data, Variable, Absolute)
    //
    0xC0, // End Collection
];

/// Default report descriptor (no rumble output).
#[cfg(not(feature = "standard-hid"))]
pub const REPORT_DESCRIPTOR: &[u8] = &[
    0x05, 0x01, // Usage Page (Generic Desktop)
    0x09, 0x05, // Usage (Gamepad)
    0xA1, 0x01, // Collection (Application)
    //
    // --- Buttons (32 buttons) ---
    0x05, 0x09, //   Usage Page (Button)
    0x19, 0x01, //   Usage Minimum (Button 1)
    0x29, 0x20, //   Usage Maximum (Button 32)
    0x15, 0x00, //   Logical Minimum (0)
    0x25, 0x01, //   Logical Maximum (1)
    0x95, 0x20, //   Report Count (32)
    0x75, 0x01, //   Report Size (1)
    0x81, 0x02, //   Input (Data, Variable, Absolute)
    //
    // --- Sticks ---
    0x05, 0x01, //   Usage Page (Generic Desktop)
    0x09, 0x30, //   Usage (X)
    0x09, 0x31, //   Usage (Y)
    0x09, 0x32, //   Usage (Z)
    0x09, 0x35, //   Usage (Rz)
    0x15, 0x81, //   Logical Minimum (-127)
    0x25, 0x7F, //   Logical Maximum (127)
    0x95, 0x04, //   Report Count (4)
    0x75, 0x08, //   Report Size (8)
    0x81, 0x02, //   Input (Data, Variable, Absolute)
    //
    // --- Triggers ---
    0x09, 0x33, //   Usage (Rx)
    0x09, 0x34, //   Usage (Ry)
    0x15, 0x00, //   Logical Minimum (0)
    0x26, 0xFF, 0x00, //   Logical Maximum (255)
    0x95, 0x02, //   Report Count (2)
    0x81, 0x02, //   Input (Data, Variable, Absolute)
    //
    0xC0, // End Collection
];

type UsbDriver<'d> = Driver<'d, USB>;

/// USB HID gamepad output.
///
/// Presents port 0 of each frame to the host.
pub struct UsbHidOutput<'d> {
    writer: HidWriter<'d, UsbDriver<'d>, MAX_REPORT>,
    ready: bool,
}

impl<'d> UsbHidOutput<'d> {
    /// Create a new USB HID output from the given HID writer.
    pub fn new(writer: HidWriter<'d, UsbDriver<'d>, MAX_REPORT>) -> Self {
        Self {
            writer,
            ready: false,
        }
    }

    /// Wait until the device is ready (USB enumerated).
    pub async fn wait_ready(&mut self) {
        self.writer.ready().await;
        self.ready = true;
    }
}

impl<'d> OutputSink for UsbHidOutput<'d> {
    async fn send(&mut self, frame: &OutputFrame) -> Result<(), OutputError> {
        if !self.ready {
            return Err(OutputError::NotReady);
        }
        let report = frame.ports[0]
            .as_ref()
            .map_or(HidReport::neutral(), HidReport::from);
        self.writer
            .write(&report.as_bytes())
            .await
            .map_err(|_| OutputError::Io)
    }

    fn is_ready(&self) -> bool {
        self.ready
    }
}

/// HID request handler: forwards rumble output reports to [`RUMBLE_SIGNAL`].
pub struct PadRequestHandler;

impl RequestHandler for PadRequestHandler {
    fn get_report(&mut self, _id: ReportId, _buf: &mut [u8]) -> Option<usize> {
        None
    }

    fn set_report(&mut self, _id: ReportId, data: &[u8]) -> OutResponse {
        match data {
            [left, right, ..] => {
                RUMBLE_SIGNAL.signal(FeedbackState {
                    rumble_left: *left,
                    rumble_right: *right,
                    led: 0,
                });
                OutResponse::Accepted
            }
            _ => OutResponse::Rejected,
        }
    }

    fn set_idle_ms(&mut self, _id: Option<ReportId>, _duration_ms: u32) {}

    fn get_idle_ms(&mut self, _id: Option<ReportId>) -> Option<u32> {
        None
    }
}

/// Configure the USB HID class in the USB builder.
///
/// Returns the HID writer for use by the application.
pub fn configure_usb_hid<'d>(
    builder: &mut Builder<'d, UsbDriver<'d>>,
    state: &'d mut State<'d>,
    handler: &'d mut PadRequestHandler,
) -> HidWriter<'d, UsbDriver<'d>, MAX_REPORT> {
    let config = embassy_usb::class::hid::Config {
        report_descriptor: REPORT_DESCRIPTOR,
        request_handler: Some(handler),
        poll_ms: 1,
        max_packet_size: MAX_REPORT as u16,
        hid_subclass: embassy_usb::class::hid::HidSubclass::No,
        hid_boot_protocol: embassy_usb::class::hid::HidBootProtocol::None,
    };

    HidWriter::new(builder, state, config)
}
