//! Player slots: virtual controller identities bound to physical devices.
//!
//! Two allocation policies decide what happens to the rest of the table when
//! a device leaves:
//!
//! - [`AllocationPolicy::Shift`]: the table stays dense; later players move
//!   down and are renumbered (player number always equals position).
//! - [`AllocationPolicy::Fixed`]: indices are stable; a freed index is reused
//!   by the next new device.

use heapless::Vec;

use crate::event::{Analog, Buttons, CanonicalInputEvent, DeviceId, DeviceKind};

/// Upper bound on simultaneously live player slots.
pub const MAX_PLAYERS: usize = 8;

/// Secondary interfaces one slot can absorb.
pub const MAX_ALTERNATES: usize = 4;

/// How slot removal affects the remaining slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AllocationPolicy {
    /// Dense array, compacted and renumbered on removal.
    Shift,
    /// Stable indices, holes reused by new devices.
    Fixed,
}

/// Which interfaces of a device a removal applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InstanceSelector {
    /// Every interface at the bus address (full device disconnect).
    All,
    /// One interface (a single interface unmounted).
    Instance(i8),
}

impl InstanceSelector {
    #[inline]
    #[must_use]
    pub const fn matches(self, address: u8, id: DeviceId) -> bool {
        if id.address != address {
            return false;
        }
        match self {
            InstanceSelector::All => true,
            InstanceSelector::Instance(instance) => id.instance == instance,
        }
    }
}

/// Error type for slot allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PlayerError {
    /// All `MAX_PLAYERS` slots are occupied.
    Full,
    /// The device already owns a slot.
    Duplicate,
}

/// A virtual player bound to one physical interface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PlayerSlot {
    device_id: DeviceId,
    slot_index: u8,
    event: CanonicalInputEvent,
    /// Secondary interfaces of composite devices: (bus address, buttons).
    alternates: [Option<(u8, Buttons)>; MAX_ALTERNATES],
    prev_buttons: Buttons,
    /// Profile index this player is currently using.
    pub profile_cursor: u8,
}

impl PlayerSlot {
    fn new(event: &CanonicalInputEvent, slot_index: u8, profile_cursor: u8) -> Self {
        Self {
            device_id: event.device_id,
            slot_index,
            event: *event,
            alternates: [None; MAX_ALTERNATES],
            prev_buttons: Buttons::NONE,
            profile_cursor,
        }
    }

    #[inline]
    #[must_use]
    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    #[inline]
    #[must_use]
    pub fn slot_index(&self) -> u8 {
        self.slot_index
    }

    /// One-based player number as shown to the user.
    #[inline]
    #[must_use]
    pub fn player_number(&self) -> u8 {
        self.slot_index + 1
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> DeviceKind {
        self.event.kind
    }

    /// Buttons reported by the owning (root) interface.
    #[inline]
    #[must_use]
    pub fn root_buttons(&self) -> Buttons {
        self.event.buttons
    }

    /// Buttons held on any attached secondary interface, or `None` if
    /// nothing is attached.
    #[must_use]
    pub fn alternate_buttons(&self) -> Option<Buttons> {
        self.alternates
            .iter()
            .flatten()
            .map(|&(_, buttons)| buttons)
            .reduce(|acc, buttons| acc | buttons)
    }

    /// Effective button mask.
    ///
    /// The released masks of the root and every secondary interface are
    /// ANDed: a button reads released only once every part reports it
    /// released.
    #[must_use]
    pub fn buttons(&self) -> Buttons {
        let released = self
            .alternates
            .iter()
            .flatten()
            .fold(!self.event.buttons, |acc, &(_, buttons)| acc & !buttons);
        !released
    }

    fn alternate_from(&self, address: u8) -> Option<usize> {
        self.alternates
            .iter()
            .position(|entry| entry.is_some_and(|(owner, _)| owner == address))
    }

    /// Insert or refresh the secondary interface at `address`.
    fn attach(&mut self, address: u8, buttons: Buttons) -> bool {
        let position = self
            .alternate_from(address)
            .or_else(|| self.alternates.iter().position(Option::is_none));
        match position {
            Some(position) => {
                self.alternates[position] = Some((address, buttons));
                true
            }
            None => false,
        }
    }

    fn detach(&mut self, address: u8) -> Option<Buttons> {
        let position = self.alternate_from(address)?;
        self.alternates[position].take().map(|(_, buttons)| buttons)
    }

    /// Effective buttons as of the previous frame.
    #[inline]
    #[must_use]
    pub fn previous_buttons(&self) -> Buttons {
        self.prev_buttons
    }

    /// Buttons that went down since the previous frame.
    #[inline]
    #[must_use]
    pub fn pressed_edges(&self) -> Buttons {
        self.buttons() & !self.prev_buttons
    }

    /// Buttons that went up since the previous frame.
    #[inline]
    #[must_use]
    pub fn released_edges(&self) -> Buttons {
        self.prev_buttons & !self.buttons()
    }

    #[inline]
    #[must_use]
    pub fn analog(&self) -> Analog {
        self.event.analog
    }

    /// Latest root event with the effective button mask folded in.
    #[must_use]
    pub fn event(&self) -> CanonicalInputEvent {
        CanonicalInputEvent {
            buttons: self.buttons(),
            ..self.event
        }
    }
}

/// Owns the player table.
///
/// Lookups are linear scans; the table never exceeds [`MAX_PLAYERS`].
#[derive(Debug, Clone)]
pub struct PlayerManager {
    policy: AllocationPolicy,
    slots: [Option<PlayerSlot>; MAX_PLAYERS],
}

impl PlayerManager {
    #[must_use]
    pub const fn new(policy: AllocationPolicy) -> Self {
        Self {
            policy,
            slots: [None; MAX_PLAYERS],
        }
    }

    #[inline]
    #[must_use]
    pub fn policy(&self) -> AllocationPolicy {
        self.policy
    }

    /// Slot index owned by `device_id`, if any.
    #[must_use]
    pub fn find(&self, device_id: DeviceId) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.is_some_and(|s| s.device_id == device_id))
    }

    /// Allocate a slot for the event's device.
    ///
    /// `Shift` appends after the last live slot; `Fixed` takes the lowest
    /// empty index.
    pub fn add(
        &mut self,
        event: &CanonicalInputEvent,
        profile_cursor: u8,
    ) -> Result<usize, PlayerError> {
        if self.find(event.device_id).is_some() {
            return Err(PlayerError::Duplicate);
        }

        let index = match self.policy {
            AllocationPolicy::Shift => Some(self.count()).filter(|&n| n < MAX_PLAYERS),
            AllocationPolicy::Fixed => self.slots.iter().position(Option::is_none),
        }
        .ok_or(PlayerError::Full)?;

        let mut slot = PlayerSlot::new(event, index as u8, profile_cursor);
        // A secondary interface parked elsewhere follows its root.
        let address = event.device_id.address;
        let root_present = self
            .iter()
            .any(|s| s.device_id.address == address && !s.device_id.is_extra());
        if !event.device_id.is_extra() && !root_present {
            for other in self.slots.iter_mut().flatten() {
                if let Some(buttons) = other.detach(address) {
                    slot.attach(address, buttons);
                }
            }
        }
        self.slots[index] = Some(slot);
        info!(
            "player {} assigned to device {}:{}",
            index + 1,
            event.device_id.address,
            event.device_id.instance
        );
        Ok(index)
    }

    /// Remove slots owned by matching interfaces.
    ///
    /// Returns the indices the removed slots occupied before any compaction.
    /// Under `Shift` the survivors are compacted and renumbered; under
    /// `Fixed` they keep their indices.
    pub fn remove(&mut self, address: u8, selector: InstanceSelector) -> Vec<usize, MAX_PLAYERS> {
        let mut removed = Vec::new();

        for (index, entry) in self.slots.iter_mut().enumerate() {
            let Some(slot) = entry else { continue };

            if selector.matches(address, slot.device_id) {
                *entry = None;
                // Capacity equals the slot count, so this cannot overflow.
                let _ = removed.push(index);
                info!("player {} released", index + 1);
                continue;
            }

            if selector.matches(address, DeviceId::extra(address)) {
                slot.detach(address);
            }
        }

        if self.policy == AllocationPolicy::Shift && !removed.is_empty() {
            self.compact();
        }

        removed
    }

    /// Close the gaps left by removals, renumbering survivors in order.
    fn compact(&mut self) {
        let mut write = 0;
        for read in 0..MAX_PLAYERS {
            if let Some(mut slot) = self.slots[read].take() {
                slot.slot_index = write as u8;
                self.slots[write] = Some(slot);
                write += 1;
            }
        }
    }

    /// Replace the latest root event of the slot at `index`.
    pub fn update(&mut self, index: usize, event: &CanonicalInputEvent) {
        if let Some(Some(slot)) = self.slots.get_mut(index) {
            slot.event = *event;
        }
    }

    /// Store the buttons of a composite device's secondary interface.
    ///
    /// The owning slot is the one whose root interface shares the bus
    /// address; without one, slot 0 takes it until the root claims a slot.
    /// Each address is attached to at most one slot. Returns the slot index,
    /// or `None` if there is no slot to attach to or the slot already holds
    /// [`MAX_ALTERNATES`] other interfaces.
    pub fn set_alternate(&mut self, address: u8, buttons: Buttons) -> Option<usize> {
        let index = self
            .slots
            .iter()
            .position(|slot| {
                slot.is_some_and(|s| s.device_id.address == address && !s.device_id.is_extra())
            })
            .or_else(|| self.slots[0].as_ref().map(|_| 0))?;

        for (other, slot) in self.slots.iter_mut().enumerate() {
            if other == index {
                continue;
            }
            if let Some(slot) = slot {
                slot.detach(address);
            }
        }

        let slot = self.slots[index].as_mut()?;
        let fresh = slot.alternate_from(address).is_none();
        if !slot.attach(address, buttons) {
            warn!(
                "player {} already has {} composite interfaces, {} rejected",
                index + 1,
                MAX_ALTERNATES,
                address
            );
            return None;
        }
        if fresh {
            debug!("composite interface {} merged into player {}", address, index + 1);
        }
        Some(index)
    }

    /// Record current buttons as the previous frame for edge detection.
    pub fn end_frame(&mut self) {
        for slot in self.slots.iter_mut().flatten() {
            slot.prev_buttons = slot.buttons();
        }
    }

    #[inline]
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&PlayerSlot> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut PlayerSlot> {
        self.slots.get_mut(index).and_then(Option::as_mut)
    }

    /// Live slots in index order.
    pub fn iter(&self) -> impl Iterator<Item = &PlayerSlot> {
        self.slots.iter().flatten()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PlayerSlot> {
        self.slots.iter_mut().flatten()
    }

    /// Number of live slots.
    #[must_use]
    pub fn count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Drop every slot.
    pub fn clear(&mut self) {
        self.slots = [None; MAX_PLAYERS];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Transport;

    fn pressing(address: u8, instance: i8, buttons: Buttons) -> CanonicalInputEvent {
        CanonicalInputEvent::neutral(
            DeviceId::new(address, instance),
            Transport::Usb,
            DeviceKind::Gamepad,
        )
        .with_buttons(buttons)
    }

    fn device_at(manager: &PlayerManager, index: usize) -> Option<u8> {
        manager.get(index).map(|s| s.device_id().address)
    }

    #[test]
    fn test_shift_renumbers_after_removal() {
        let mut manager = PlayerManager::new(AllocationPolicy::Shift);
        for address in [0xA, 0xB, 0xC] {
            manager.add(&pressing(address, 0, Buttons::B1), 0).unwrap();
        }

        let removed = manager.remove(0xB, InstanceSelector::All);
        assert_eq!(removed.as_slice(), &[1]);

        assert_eq!(manager.count(), 2);
        assert_eq!(device_at(&manager, 0), Some(0xA));
        assert_eq!(device_at(&manager, 1), Some(0xC));
        assert_eq!(device_at(&manager, 2), None);
        assert_eq!(manager.get(0).unwrap().player_number(), 1);
        assert_eq!(manager.get(1).unwrap().player_number(), 2);
    }

    #[test]
    fn test_fixed_keeps_indices_and_reuses_hole() {
        let mut manager = PlayerManager::new(AllocationPolicy::Fixed);
        for address in [0xA, 0xB, 0xC] {
            manager.add(&pressing(address, 0, Buttons::B1), 0).unwrap();
        }

        manager.remove(0xB, InstanceSelector::All);
        assert_eq!(device_at(&manager, 1), None);
        assert_eq!(device_at(&manager, 2), Some(0xC));
        assert_eq!(manager.get(2).unwrap().player_number(), 3);

        let index = manager.add(&pressing(0xD, 0, Buttons::B1), 0).unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn test_shift_appends_at_end() {
        let mut manager = PlayerManager::new(AllocationPolicy::Shift);
        manager.add(&pressing(1, 0, Buttons::B1), 0).unwrap();
        manager.add(&pressing(2, 0, Buttons::B1), 0).unwrap();
        manager.remove(1, InstanceSelector::All);
        assert_eq!(manager.add(&pressing(3, 0, Buttons::B1), 0), Ok(1));
    }

    #[test]
    fn test_full_table_rejects() {
        let mut manager = PlayerManager::new(AllocationPolicy::Fixed);
        for address in 0..MAX_PLAYERS as u8 {
            manager.add(&pressing(address, 0, Buttons::B1), 0).unwrap();
        }
        assert_eq!(
            manager.add(&pressing(0x40, 0, Buttons::B1), 0),
            Err(PlayerError::Full)
        );
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut manager = PlayerManager::new(AllocationPolicy::Shift);
        manager.add(&pressing(1, 0, Buttons::B1), 0).unwrap();
        assert_eq!(
            manager.add(&pressing(1, 0, Buttons::B2), 0),
            Err(PlayerError::Duplicate)
        );
    }

    #[test]
    fn test_remove_single_instance_keeps_siblings() {
        let mut manager = PlayerManager::new(AllocationPolicy::Shift);
        manager.add(&pressing(5, 0, Buttons::B1), 0).unwrap();
        manager.add(&pressing(5, 1, Buttons::B1), 0).unwrap();

        manager.remove(5, InstanceSelector::Instance(0));
        assert_eq!(manager.count(), 1);
        assert_eq!(manager.get(0).unwrap().device_id(), DeviceId::new(5, 1));

        manager.add(&pressing(5, 0, Buttons::B1), 0).unwrap();
        manager.remove(5, InstanceSelector::All);
        assert_eq!(manager.count(), 0);
    }

    #[test]
    fn test_composite_reads_released_only_when_both_parts_release() {
        let mut manager = PlayerManager::new(AllocationPolicy::Shift);
        let index = manager.add(&pressing(7, 0, Buttons::B1), 0).unwrap();

        // Root holds B1, secondary part has it up.
        assert_eq!(manager.set_alternate(7, Buttons::NONE), Some(index));
        assert!(manager.get(index).unwrap().buttons().contains(Buttons::B1));

        // Both up.
        manager.update(index, &pressing(7, 0, Buttons::NONE));
        assert!(!manager.get(index).unwrap().buttons().contains(Buttons::B1));

        // Both down.
        manager.update(index, &pressing(7, 0, Buttons::B1));
        manager.set_alternate(7, Buttons::B1);
        assert!(manager.get(index).unwrap().buttons().contains(Buttons::B1));

        // Root up, secondary still holding.
        manager.update(index, &pressing(7, 0, Buttons::NONE));
        assert!(manager.get(index).unwrap().buttons().contains(Buttons::B1));
    }

    #[test]
    fn test_alternate_falls_back_to_slot_zero() {
        let mut manager = PlayerManager::new(AllocationPolicy::Shift);
        manager.add(&pressing(1, 0, Buttons::B1), 0).unwrap();
        assert_eq!(manager.set_alternate(9, Buttons::B2), Some(0));
        assert_eq!(manager.get(0).unwrap().alternate_buttons(), Some(Buttons::B2));

        // Unplugging the secondary interface detaches it.
        manager.remove(9, InstanceSelector::Instance(DeviceId::EXTRA_INSTANCE));
        assert_eq!(manager.get(0).unwrap().alternate_buttons(), None);
        assert_eq!(manager.count(), 1);
    }

    #[test]
    fn test_parked_alternate_moves_to_its_root() {
        let mut manager = PlayerManager::new(AllocationPolicy::Shift);
        manager.add(&pressing(1, 0, Buttons::B1), 0).unwrap();

        // Secondary part of device 2 reports before its root has a slot.
        assert_eq!(manager.set_alternate(2, Buttons::L1), Some(0));

        let root = manager.add(&pressing(2, 0, Buttons::B2), 0).unwrap();
        assert_eq!(root, 1);
        assert_eq!(manager.get(0).unwrap().alternate_buttons(), None);
        assert_eq!(manager.get(1).unwrap().alternate_buttons(), Some(Buttons::L1));

        assert_eq!(manager.set_alternate(2, Buttons::NONE), Some(1));
        manager.update(1, &pressing(2, 0, Buttons::NONE));
        manager.update(0, &pressing(1, 0, Buttons::NONE));
        assert!(manager.get(0).unwrap().buttons().is_empty());
        assert!(manager.get(1).unwrap().buttons().is_empty());
    }

    #[test]
    fn test_alternates_from_different_addresses_are_kept_apart() {
        let mut manager = PlayerManager::new(AllocationPolicy::Shift);
        manager.add(&pressing(1, 0, Buttons::NONE), 0).unwrap();

        assert_eq!(manager.set_alternate(5, Buttons::L1), Some(0));
        assert_eq!(manager.set_alternate(6, Buttons::NONE), Some(0));
        assert_eq!(manager.get(0).unwrap().buttons(), Buttons::L1);

        // Releasing one part does not release the other.
        assert_eq!(manager.set_alternate(6, Buttons::R1), Some(0));
        assert_eq!(manager.set_alternate(5, Buttons::NONE), Some(0));
        assert_eq!(manager.get(0).unwrap().buttons(), Buttons::R1);

        manager.remove(6, InstanceSelector::Instance(DeviceId::EXTRA_INSTANCE));
        assert!(manager.get(0).unwrap().buttons().is_empty());
    }

    #[test]
    fn test_alternates_beyond_capacity_are_rejected() {
        let mut manager = PlayerManager::new(AllocationPolicy::Fixed);
        manager.add(&pressing(1, 0, Buttons::NONE), 0).unwrap();
        for address in 0..MAX_ALTERNATES as u8 {
            assert_eq!(manager.set_alternate(0x20 + address, Buttons::NONE), Some(0));
        }
        assert_eq!(manager.set_alternate(0x30, Buttons::L1), None);
        assert!(manager.get(0).unwrap().buttons().is_empty());

        // Known interfaces still update.
        assert_eq!(manager.set_alternate(0x20, Buttons::L1), Some(0));
    }

    #[test]
    fn test_alternate_without_slots_is_ignored() {
        let mut manager = PlayerManager::new(AllocationPolicy::Fixed);
        assert_eq!(manager.set_alternate(1, Buttons::B1), None);
    }

    #[test]
    fn test_edges_track_previous_frame() {
        let mut manager = PlayerManager::new(AllocationPolicy::Shift);
        let index = manager.add(&pressing(1, 0, Buttons::B1), 0).unwrap();
        assert_eq!(manager.get(index).unwrap().pressed_edges(), Buttons::B1);

        manager.end_frame();
        manager.update(index, &pressing(1, 0, Buttons::B2));
        let slot = manager.get(index).unwrap();
        assert_eq!(slot.pressed_edges(), Buttons::B2);
        assert_eq!(slot.released_edges(), Buttons::B1);
    }
}
