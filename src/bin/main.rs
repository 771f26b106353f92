#![no_std]
#![no_main]

use defmt::{error, info};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_futures::select::{select, Either};
use embassy_rp::bind_interrupts;
use embassy_rp::flash::{Blocking, Flash};
use embassy_rp::gpio::{Input, Level, Output, Pull};
use embassy_rp::peripherals::USB;
use embassy_rp::usb::Driver;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant, Ticker};
use embassy_usb::class::hid::State;
use embassy_usb::{Builder, Config as UsbConfig};
use multipad::output::RUMBLE_SIGNAL;
use multipad::storage::FLASH_SIZE;
use multipad::{
    configure_usb_hid, CanonicalInputEvent, DeviceId, DeviceKind, FeedbackState, FlashStore,
    GpioPadInput, InputContext, InputSource, OutputFrame, OutputSink, PadRequestHandler,
    SettingsStore, SnapshotCell, Transport, UsbHidOutput, DEFAULT_CATALOG, PAD_PINS,
};
use multipad_core::snapshot::{Publisher, Reader};
use static_cell::StaticCell;

#[cfg(feature = "dev-panic")]
use panic_probe as _;
#[cfg(feature = "prod-panic")]
use panic_reset as _;

bind_interrupts!(struct Irqs {
    USBCTRL_IRQ => embassy_rp::usb::InterruptHandler<USB>;
});

/// Poll-loop period when no input arrives (hotkey timers, indicator, persistence).
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// The wired pad's identity in the router.
const PAD_ID: DeviceId = DeviceId::new(0, 0);

type PadInput = GpioPadInput<Input<'static>, { PAD_PINS.len() }>;

/// Latest decoded pad state, from the input task to the poll loop.
/// Using Signal instead of Channel provides "latest value wins" semantics,
/// matching the router's last-value store.
static INPUT_SIGNAL: StaticCell<Signal<CriticalSectionRawMutex, CanonicalInputEvent>> =
    StaticCell::new();

/// Frames from the poll loop to the USB output task, never blocking either side.
static FRAMES: SnapshotCell<OutputFrame> = SnapshotCell::new(OutputFrame::EMPTY);

/// USB device configuration buffer.
static CONFIG_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
static BOS_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
static MSOS_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
static CONTROL_BUF: StaticCell<[u8; 64]> = StaticCell::new();

/// HID state.
static HID_STATE: StaticCell<State> = StaticCell::new();
static HID_HANDLER: StaticCell<PadRequestHandler> = StaticCell::new();

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("multipad starting...");

    let p = embassy_rp::init(embassy_rp::config::Config::default());

    let signal = INPUT_SIGNAL.init(Signal::new());
    let Some((publisher, reader)) = FRAMES.split() else {
        error!("frame cell already in use");
        return;
    };

    // --- Settings ---
    let mut store = FlashStore::new(Flash::<_, Blocking, FLASH_SIZE>::new_blocking(p.FLASH));
    let settings = store.load().unwrap_or_default();
    let ctx = InputContext::new(&DEFAULT_CATALOG, settings).with_default_hotkeys();

    // --- Wired pad (GPIO 2-13, active low) ---
    let pins = [
        Input::new(p.PIN_2, Pull::Up),
        Input::new(p.PIN_3, Pull::Up),
        Input::new(p.PIN_4, Pull::Up),
        Input::new(p.PIN_5, Pull::Up),
        Input::new(p.PIN_6, Pull::Up),
        Input::new(p.PIN_7, Pull::Up),
        Input::new(p.PIN_8, Pull::Up),
        Input::new(p.PIN_9, Pull::Up),
        Input::new(p.PIN_10, Pull::Up),
        Input::new(p.PIN_11, Pull::Up),
        Input::new(p.PIN_12, Pull::Up),
        Input::new(p.PIN_13, Pull::Up),
    ];
    let pad: PadInput = GpioPadInput::new(pins, PAD_PINS, PAD_ID);

    // --- USB Setup ---
    let usb_driver = Driver::new(p.USB, Irqs);

    let mut usb_config = UsbConfig::new(0x1209, 0x0001); // pid.codes test VID/PID
    usb_config.manufacturer = Some("Rust Gamepad");
    usb_config.product = Some("Multipad Adapter");
    usb_config.serial_number = Some("001");
    usb_config.max_power = 100;
    usb_config.max_packet_size_0 = 64;

    let config_descriptor = CONFIG_DESCRIPTOR.init([0; 256]);
    let bos_descriptor = BOS_DESCRIPTOR.init([0; 256]);
    let msos_descriptor = MSOS_DESCRIPTOR.init([0; 256]);
    let control_buf = CONTROL_BUF.init([0; 64]);

    let mut builder = Builder::new(
        usb_driver,
        usb_config,
        config_descriptor,
        bos_descriptor,
        msos_descriptor,
        control_buf,
    );

    // Configure HID class
    let hid_state = HID_STATE.init(State::new());
    let hid_handler = HID_HANDLER.init(PadRequestHandler);
    let hid_writer = configure_usb_hid(&mut builder, hid_state, hid_handler);

    // Build the USB device
    let usb_device = builder.build();

    // Create output
    let usb_output = UsbHidOutput::new(hid_writer);

    // On-board LED mirrors player 1 feedback (profile blinks included)
    let led = Output::new(p.PIN_25, Level::Low);

    // Spawn tasks (unwrap the SpawnToken, then spawn)
    spawner.spawn(usb_task(usb_device).unwrap());
    spawner.spawn(input_task(pad, signal).unwrap());
    spawner.spawn(poll_task(ctx, store, signal, publisher).unwrap());
    spawner.spawn(output_task(usb_output, reader, led).unwrap());

    info!("multipad initialized");
}

/// USB device task - runs the USB stack.
#[embassy_executor::task]
async fn usb_task(mut device: embassy_usb::UsbDevice<'static, Driver<'static, USB>>) {
    device.run().await;
}

/// Input task - samples the wired pad and signals each changed state.
#[embassy_executor::task]
async fn input_task(
    mut input: PadInput,
    signal: &'static Signal<CriticalSectionRawMutex, CanonicalInputEvent>,
) {
    loop {
        match input.receive().await {
            Ok(event) => signal.signal(event),
            Err(e) => {
                error!("Input error: {:?}", e);
                // Release everything rather than leave buttons stuck
                signal.signal(CanonicalInputEvent::neutral(
                    input.device_id(),
                    Transport::Gpio,
                    DeviceKind::Gamepad,
                ));
            }
        }
    }
}

/// Poll loop - owns the input context and publishes one frame per cycle.
#[embassy_executor::task]
async fn poll_task(
    mut ctx: InputContext,
    mut store: FlashStore<'static>,
    signal: &'static Signal<CriticalSectionRawMutex, CanonicalInputEvent>,
    mut publisher: Publisher<'static, OutputFrame>,
) {
    let lit = FeedbackState {
        led: FeedbackState::player_led(0),
        ..FeedbackState::OFF
    };
    ctx.set_feedback(0, lit);

    let mut ticker = Ticker::every(POLL_INTERVAL);
    loop {
        if let Either::First(event) = select(signal.wait(), ticker.next()).await {
            ctx.submit_input(&event);
        }
        if let Some(rumble) = RUMBLE_SIGNAL.try_take() {
            ctx.set_feedback(0, FeedbackState { led: lit.led, ..rumble });
        }

        for fired in ctx.task(Instant::now(), &mut store) {
            info!("hotkey {:?} fired ({:?})", fired.action, fired.player);
        }
        publisher.publish(ctx.frame());
    }
}

/// Output task - sends the latest frame to the host as a HID report.
#[embassy_executor::task]
async fn output_task(
    mut output: UsbHidOutput<'static>,
    mut reader: Reader<'static, OutputFrame>,
    mut led: Output<'static>,
) {
    // Wait for USB to be ready
    output.wait_ready().await;
    info!("USB HID ready, forwarding frames...");

    loop {
        let frame = reader.latest();
        let feedback = frame.feedback[0];
        led.set_level(if feedback.led != 0 { Level::High } else { Level::Low });

        if let Err(e) = output.send(&frame).await {
            error!("Output error: {:?}", e);
        }
    }
}
