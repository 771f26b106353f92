//! Output targets and their static routing configuration.

use crate::players::AllocationPolicy;

/// How the router builds the view an output target sees.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RoutingMode {
    /// Every connected device folds into one logical controller.
    Merge,
    /// Each port shows one player slot.
    PerPlayer,
}

/// Per-target transforms applied to the router view.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Transforms {
    /// Accumulate relative pointer motion into the left stick.
    pub mouse_to_analog: bool,
}

/// Static configuration of one output target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TargetConfig {
    pub mode: RoutingMode,
    pub policy: AllocationPolicy,
    pub transforms: Transforms,
    /// Number of controller ports the console exposes.
    pub ports: u8,
}

/// The closed set of output targets this adapter can drive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum OutputTarget {
    UsbDevice = 0,
    PcEngine = 1,
    GameCube = 2,
    ThreeDo = 3,
    Nuon = 4,
    Loopy = 5,
}

impl OutputTarget {
    pub const COUNT: usize = 6;

    pub const ALL: [OutputTarget; Self::COUNT] = [
        OutputTarget::UsbDevice,
        OutputTarget::PcEngine,
        OutputTarget::GameCube,
        OutputTarget::ThreeDo,
        OutputTarget::Nuon,
        OutputTarget::Loopy,
    ];

    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub const fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(OutputTarget::UsbDevice),
            1 => Some(OutputTarget::PcEngine),
            2 => Some(OutputTarget::GameCube),
            3 => Some(OutputTarget::ThreeDo),
            4 => Some(OutputTarget::Nuon),
            5 => Some(OutputTarget::Loopy),
            _ => None,
        }
    }

    /// Routing configuration for this console.
    #[must_use]
    pub const fn config(self) -> TargetConfig {
        match self {
            OutputTarget::UsbDevice => TargetConfig {
                mode: RoutingMode::PerPlayer,
                policy: AllocationPolicy::Fixed,
                transforms: Transforms {
                    mouse_to_analog: false,
                },
                ports: 4,
            },
            // Multitap: player number must follow tap position.
            OutputTarget::PcEngine => TargetConfig {
                mode: RoutingMode::PerPlayer,
                policy: AllocationPolicy::Shift,
                transforms: Transforms {
                    mouse_to_analog: false,
                },
                ports: 5,
            },
            OutputTarget::GameCube => TargetConfig {
                mode: RoutingMode::Merge,
                policy: AllocationPolicy::Shift,
                transforms: Transforms {
                    mouse_to_analog: true,
                },
                ports: 1,
            },
            // Daisy chain: pads are addressed by chain position.
            OutputTarget::ThreeDo => TargetConfig {
                mode: RoutingMode::PerPlayer,
                policy: AllocationPolicy::Shift,
                transforms: Transforms {
                    mouse_to_analog: false,
                },
                ports: 8,
            },
            OutputTarget::Nuon => TargetConfig {
                mode: RoutingMode::Merge,
                policy: AllocationPolicy::Shift,
                transforms: Transforms {
                    mouse_to_analog: true,
                },
                ports: 1,
            },
            // Physical ports map 1:1 to player index.
            OutputTarget::Loopy => TargetConfig {
                mode: RoutingMode::PerPlayer,
                policy: AllocationPolicy::Fixed,
                transforms: Transforms {
                    mouse_to_analog: false,
                },
                ports: 4,
            },
        }
    }
}
