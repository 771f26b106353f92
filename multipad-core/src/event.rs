//! Canonical input event: the transport-independent shape every driver
//! produces and the router consumes.

use core::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Index, IndexMut, Not};

/// Number of analog channel slots carried by every event.
pub const ANALOG_CHANNELS: usize = 8;

/// Rest value for centered axes.
pub const ANALOG_CENTER: u8 = 128;

/// Minimum deflection from rest before an axis counts as "in use".
///
/// Keeps stick drift on an idle pad from allocating a player slot or
/// stealing the merged analog value.
pub const ANALOG_ACTIVATION_THRESHOLD: u8 = 48;

/// Logical button state, one bit per canonical role. `1` = pressed.
///
/// Bit meaning is transport-independent: drivers translate native layouts
/// into this mask exactly once, at decode time.
///
/// # Example
///
/// ```
/// use multipad_core::Buttons;
///
/// let buttons = Buttons::B1 | Buttons::S2;
/// assert!(buttons.contains(Buttons::B1));
/// assert!(!buttons.contains(Buttons::B2));
/// ```
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Buttons(pub u32);

impl Buttons {
    pub const B1: Self = Self(1 << 0); // Bottom face (Cross / A)
    pub const B2: Self = Self(1 << 1); // Right face (Circle / B)
    pub const B3: Self = Self(1 << 2); // Left face (Square / X)
    pub const B4: Self = Self(1 << 3); // Top face (Triangle / Y)
    pub const L1: Self = Self(1 << 4);
    pub const R1: Self = Self(1 << 5);
    pub const L2: Self = Self(1 << 6);
    pub const R2: Self = Self(1 << 7);
    pub const S1: Self = Self(1 << 8); // Select / Back
    pub const S2: Self = Self(1 << 9); // Start
    pub const L3: Self = Self(1 << 10);
    pub const R3: Self = Self(1 << 11);
    pub const DPAD_UP: Self = Self(1 << 12);
    pub const DPAD_DOWN: Self = Self(1 << 13);
    pub const DPAD_LEFT: Self = Self(1 << 14);
    pub const DPAD_RIGHT: Self = Self(1 << 15);
    pub const GUIDE: Self = Self(1 << 16);
    pub const AUX1: Self = Self(1 << 17);
    pub const AUX2: Self = Self(1 << 18);
    pub const AUX3: Self = Self(1 << 19);
    pub const AUX4: Self = Self(1 << 20);

    /// No buttons pressed.
    pub const NONE: Self = Self(0);

    /// Every bit set; identity for AND-folding.
    pub const ALL: Self = Self(u32::MAX);

    /// Normalize an active-low native mask (`0` = pressed).
    #[inline]
    #[must_use]
    pub const fn from_active_low(raw: u32) -> Self {
        Self(!raw)
    }

    /// Check if all of the given button(s) are pressed.
    #[inline]
    #[must_use]
    pub const fn contains(self, button: Buttons) -> bool {
        (self.0 & button.0) == button.0
    }

    /// Both masks combined; usable in `const` items.
    #[inline]
    #[must_use]
    pub const fn union(self, other: Buttons) -> Self {
        Self(self.0 | other.0)
    }

    /// Check if any of the given button(s) are pressed.
    #[inline]
    #[must_use]
    pub const fn intersects(self, button: Buttons) -> bool {
        (self.0 & button.0) != 0
    }

    /// Alias for [`contains`](Self::contains).
    #[inline]
    #[must_use]
    pub const fn is_pressed(self, button: Buttons) -> bool {
        self.contains(button)
    }

    /// Set or clear button(s).
    #[inline]
    pub fn set(&mut self, button: Buttons, pressed: bool) {
        if pressed {
            self.0 |= button.0;
        } else {
            self.0 &= !button.0;
        }
    }

    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Check if no buttons are pressed.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Buttons {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Buttons {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Buttons {
    type Output = Self;

    #[inline]
    fn bitand(self, rhs: Self) -> Self::Output {
        Self(self.0 & rhs.0)
    }
}

impl BitAndAssign for Buttons {
    #[inline]
    fn bitand_assign(&mut self, rhs: Self) {
        self.0 &= rhs.0;
    }
}

impl Not for Buttons {
    type Output = Self;

    #[inline]
    fn not(self) -> Self::Output {
        Self(!self.0)
    }
}

/// Fixed analog channel slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum AnalogAxis {
    LeftX = 0,
    LeftY = 1,
    RightX = 2,
    RightY = 3,
    Spare = 4,
    LeftTrigger = 5,
    RightTrigger = 6,
    Spare2 = 7,
}

impl AnalogAxis {
    /// All channels, in slot order.
    pub const ALL: [AnalogAxis; ANALOG_CHANNELS] = [
        AnalogAxis::LeftX,
        AnalogAxis::LeftY,
        AnalogAxis::RightX,
        AnalogAxis::RightY,
        AnalogAxis::Spare,
        AnalogAxis::LeftTrigger,
        AnalogAxis::RightTrigger,
        AnalogAxis::Spare2,
    ];

    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Value the channel reports when untouched.
    ///
    /// Triggers rest at zero; every other channel rests at center.
    #[inline]
    #[must_use]
    pub const fn rest(self) -> u8 {
        match self {
            AnalogAxis::LeftTrigger | AnalogAxis::RightTrigger => 0,
            _ => ANALOG_CENTER,
        }
    }

    /// Whether `value` is far enough from rest to count as deliberate input.
    #[inline]
    #[must_use]
    pub const fn is_active(self, value: u8) -> bool {
        value.abs_diff(self.rest()) > ANALOG_ACTIVATION_THRESHOLD
    }
}

/// Analog channel values, 0-255 each.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Analog(pub [u8; ANALOG_CHANNELS]);

impl Analog {
    /// Every channel at its rest value.
    pub const NEUTRAL: Self = Self([
        ANALOG_CENTER,
        ANALOG_CENTER,
        ANALOG_CENTER,
        ANALOG_CENTER,
        ANALOG_CENTER,
        0,
        0,
        ANALOG_CENTER,
    ]);

    /// Check whether every channel sits within the activation threshold.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        AnalogAxis::ALL
            .iter()
            .all(|&axis| !axis.is_active(self[axis]))
    }
}

impl Default for Analog {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

impl Index<AnalogAxis> for Analog {
    type Output = u8;

    #[inline]
    fn index(&self, axis: AnalogAxis) -> &u8 {
        &self.0[axis.index()]
    }
}

impl IndexMut<AnalogAxis> for Analog {
    #[inline]
    fn index_mut(&mut self, axis: AnalogAxis) -> &mut u8 {
        &mut self.0[axis.index()]
    }
}

/// Physical interface identity: bus address plus interface/instance index.
///
/// Stable for the life of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceId {
    pub address: u8,
    pub instance: i8,
}

impl DeviceId {
    /// Reserved instance marking the secondary interface of a composite device.
    pub const EXTRA_INSTANCE: i8 = -1;

    #[must_use]
    pub const fn new(address: u8, instance: i8) -> Self {
        Self { address, instance }
    }

    /// The secondary ("extra") interface of a composite device at `address`.
    #[must_use]
    pub const fn extra(address: u8) -> Self {
        Self {
            address,
            instance: Self::EXTRA_INSTANCE,
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_extra(self) -> bool {
        self.instance == Self::EXTRA_INSTANCE
    }
}

/// Transport a report arrived over.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Transport {
    Usb,
    Bluetooth,
    Native,
    Gpio,
}

/// Device class of the reporting interface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceKind {
    Gamepad,
    Mouse,
    Keyboard,
}

/// Accelerometer and gyroscope triples.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Motion {
    pub accel: [i16; 3],
    pub gyro: [i16; 3],
}

/// Pressure-sensitive button readings (face, shoulder and d-pad buttons).
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Pressure(pub [u8; 12]);

/// Auxiliary key-matrix payload (keyboards, keypads on pad accessories).
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeyMatrix {
    pub modifiers: u8,
    pub keys: [u8; 6],
}

/// Relative pointer motion since the previous report.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PointerDelta {
    pub dx: i16,
    pub dy: i16,
    pub wheel: i8,
}

/// One device's instantaneous state.
///
/// The router keeps exactly one of these per [`DeviceId`]; a new submission
/// replaces the previous one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CanonicalInputEvent {
    pub device_id: DeviceId,
    pub transport: Transport,
    pub kind: DeviceKind,
    pub buttons: Buttons,
    pub analog: Analog,
    pub motion: Option<Motion>,
    pub pressure: Option<Pressure>,
    pub keys: Option<KeyMatrix>,
    pub pointer: Option<PointerDelta>,
}

impl CanonicalInputEvent {
    /// Nothing pressed, every axis at rest, no extensions.
    #[must_use]
    pub const fn neutral(device_id: DeviceId, transport: Transport, kind: DeviceKind) -> Self {
        Self {
            device_id,
            transport,
            kind,
            buttons: Buttons::NONE,
            analog: Analog::NEUTRAL,
            motion: None,
            pressure: None,
            keys: None,
            pointer: None,
        }
    }

    /// Set the button mask (builder style).
    #[must_use]
    pub const fn with_buttons(mut self, buttons: Buttons) -> Self {
        self.buttons = buttons;
        self
    }

    /// Set one analog channel (builder style).
    #[must_use]
    pub fn with_axis(mut self, axis: AnalogAxis, value: u8) -> Self {
        self.analog[axis] = value;
        self
    }

    /// True when the event carries no deliberate input.
    ///
    /// Idle reports never allocate a player slot.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        let keys_idle = self
            .keys
            .map_or(true, |k| k.modifiers == 0 && k.keys.iter().all(|&k| k == 0));
        self.buttons.is_empty() && self.analog.is_idle() && keys_idle
    }
}
