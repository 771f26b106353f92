use defmt::Format;
use multipad_core::CanonicalInputEvent;

/// Error type for input operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum InputError {
    /// Pin or bus read failed.
    Io,
    /// Device went away.
    Disconnected,
}

/// Async trait for device input sources.
///
/// An input source decodes native reports into canonical events. Drivers
/// never talk to the router directly; the poll loop submits what they yield.
///
/// # `no_std` Compatibility
///
/// All implementations must be `#![no_std]` compatible with no heap allocation.
pub trait InputSource {
    /// Wait for and return the device's next changed state.
    ///
    /// On error, callers should submit a neutral event for the device so
    /// stale buttons do not stay held.
    fn receive(
        &mut self,
    ) -> impl core::future::Future<Output = Result<CanonicalInputEvent, InputError>>;

    /// Check if the device is present.
    fn is_connected(&self) -> bool;
}
