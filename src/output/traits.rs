use defmt::Format;
use multipad_core::OutputFrame;

/// Error type for output operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum OutputError {
    /// USB/communication I/O error.
    Io,
    /// Device not ready (e.g., USB not enumerated).
    NotReady,
}

/// Async trait for output consumers (console encoders, USB device).
///
/// Consumers read the latest published [`OutputFrame`]; they never wait on
/// the poll loop.
///
/// # `no_std` Compatibility
///
/// All implementations must be `#![no_std]` compatible with no heap allocation.
pub trait OutputSink {
    /// Send one frame to the console or host.
    ///
    /// May block until the previous report has been sent.
    fn send(&mut self, frame: &OutputFrame)
        -> impl core::future::Future<Output = Result<(), OutputError>>;

    /// Check if the output is ready to accept data.
    fn is_ready(&self) -> bool;
}
