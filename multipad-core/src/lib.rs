//! Platform-agnostic input virtualization for a multi-console controller
//! adapter.
//!
//! Device drivers turn native reports into [`CanonicalInputEvent`]s and hand
//! them to the [`Router`]. Console encoders read back one view per port,
//! remapped through the active [`Profile`]. Players, hotkeys and the profile
//! indicator all hang off the same player table.
//!
//! # Overview
//!
//! - [`event`]: canonical event ([`CanonicalInputEvent`], [`Buttons`], [`Analog`])
//! - [`players`]: player slots and allocation policies ([`PlayerManager`])
//! - [`router`]: last-value store and merge/per-player views ([`Router`])
//! - [`profile`]: remapping tables and active-profile tracking ([`ProfileSystem`])
//! - [`hotkey`]: hold/release/tap combos ([`HotkeyService`])
//! - [`feedback`]: rumble/LED state and the blink indicator ([`FeedbackIndicator`])
//! - [`settings`]: persisted record and the storage trait ([`SettingsStore`])
//! - [`snapshot`]: lock-free hand-off to the real-time side ([`SnapshotCell`])
//! - [`context`]: the poll-loop owner of all of the above ([`InputContext`])
//!
//! # Example
//!
//! ```rust
//! use embassy_time::Instant;
//! use multipad_core::{
//!     Buttons, CanonicalInputEvent, DeviceId, DeviceKind, InputContext, MemoryStore, Settings,
//!     Transport, DEFAULT_CATALOG,
//! };
//!
//! let mut ctx = InputContext::new(&DEFAULT_CATALOG, Settings::default());
//! let mut store = MemoryStore::new();
//!
//! let event = CanonicalInputEvent::neutral(DeviceId::new(1, 0), Transport::Usb, DeviceKind::Gamepad)
//!     .with_buttons(Buttons::B1);
//! ctx.submit_input(&event);
//! ctx.task(Instant::from_millis(0), &mut store);
//!
//! let frame = ctx.frame();
//! assert_eq!(frame.ports[0].map(|e| e.buttons), Some(Buttons::B1));
//! ```
//!
//! # Features
//!
//! - **`std`**: Enable standard library support (for host testing)
//! - **`defmt`**: Enable defmt formatting and logging (for embedded targets)
//! - **`log`**: Route logging through the `log` facade
//!
//! # No-std Support
//!
//! This crate is `#![no_std]` by default and uses no heap allocations,
//! making it suitable for embedded systems with limited resources.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
extern crate std;

// This mod MUST go first, so that the others see its macros.
#[macro_use]
mod fmt;

pub mod context;
pub mod event;
pub mod feedback;
pub mod hotkey;
pub mod players;
pub mod profile;
pub mod router;
pub mod settings;
pub mod snapshot;
pub mod target;

// Re-export main types at crate root
pub use context::{InputContext, OutputFrame};
pub use event::{
    Analog, AnalogAxis, Buttons, CanonicalInputEvent, DeviceId, DeviceKind, KeyMatrix, Motion,
    PointerDelta, Pressure, Transport,
};
pub use feedback::{FeedbackIndicator, FeedbackState, IndicatorPhase};
pub use hotkey::{
    HotkeyAction, HotkeyDefinition, HotkeyError, HotkeyFired, HotkeyId, HotkeyService, Trigger,
};
pub use players::{AllocationPolicy, InstanceSelector, PlayerError, PlayerManager, PlayerSlot, MAX_PLAYERS};
pub use profile::{Destination, MapRule, Profile, ProfileCatalog, ProfileSystem, DEFAULT_CATALOG};
pub use router::{Router, MAX_DEVICES};
pub use settings::{MemoryStore, Settings, SettingsError, SettingsStore, StorageError, SETTINGS_SIZE};
pub use snapshot::{Publisher, Reader, SnapshotCell};
pub use target::{OutputTarget, RoutingMode, TargetConfig, Transforms};
