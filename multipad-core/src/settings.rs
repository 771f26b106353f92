//! Persisted settings record and debounced persistence.
//!
//! The record is fixed to one flash page:
//!
//! ```text
//! offset  size  field
//! 0       4     magic (LE)
//! 4       1     version
//! 5       1     output mode (OutputTarget index)
//! 6       8     active profile index per output target
//! 14      1     CRC-8/SMBUS over bytes 0..14
//! 15      241   reserved (0xFF, erased flash)
//! ```

use crc::{Crc, CRC_8_SMBUS};
use embassy_time::{Duration, Instant};

/// Size of the settings record; the storage medium's program granularity.
pub const SETTINGS_SIZE: usize = 256;

/// Record magic ("MPAD").
pub const SETTINGS_MAGIC: u32 = 0x4D50_4144;

pub const SETTINGS_VERSION: u8 = 1;

/// Active-profile slots in the record (room for future targets).
pub const PROFILE_SLOTS: usize = 8;

/// Quiet period a change must survive before it is written.
pub const PERSIST_DEBOUNCE: Duration = Duration::from_secs(5);

const HEADER_LEN: usize = 14;

const CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);

/// Error type for settings decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SettingsError {
    /// Record too short.
    Length,
    /// Magic mismatch (erased or foreign data).
    BadMagic,
    /// Written by an incompatible firmware.
    UnsupportedVersion,
    /// Header checksum mismatch.
    Checksum,
}

/// Error type for the storage collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageError {
    /// Read, erase or program failed.
    Io,
    /// Medium returned data of the wrong shape.
    Corrupt,
}

/// User settings that survive power cycles.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Settings {
    /// Selected output target (see [`OutputTarget::index`](crate::OutputTarget::index)).
    pub output_mode: u8,
    /// Active profile index per output target.
    pub active_profile: [u8; PROFILE_SLOTS],
}

impl Settings {
    /// Encode into a full record, reserved bytes left erased.
    #[must_use]
    pub fn encode(&self) -> [u8; SETTINGS_SIZE] {
        let mut record = [0xFF; SETTINGS_SIZE];
        record[0..4].copy_from_slice(&SETTINGS_MAGIC.to_le_bytes());
        record[4] = SETTINGS_VERSION;
        record[5] = self.output_mode;
        record[6..HEADER_LEN].copy_from_slice(&self.active_profile);
        record[HEADER_LEN] = CRC8.checksum(&record[..HEADER_LEN]);
        record
    }

    /// Decode a record read back from storage.
    pub fn decode(record: &[u8]) -> Result<Self, SettingsError> {
        if record.len() < HEADER_LEN + 1 {
            return Err(SettingsError::Length);
        }

        let magic = u32::from_le_bytes([record[0], record[1], record[2], record[3]]);
        if magic != SETTINGS_MAGIC {
            return Err(SettingsError::BadMagic);
        }
        if record[4] != SETTINGS_VERSION {
            return Err(SettingsError::UnsupportedVersion);
        }
        if CRC8.checksum(&record[..HEADER_LEN]) != record[HEADER_LEN] {
            return Err(SettingsError::Checksum);
        }

        let mut active_profile = [0; PROFILE_SLOTS];
        active_profile.copy_from_slice(&record[6..HEADER_LEN]);

        Ok(Self {
            output_mode: record[5],
            active_profile,
        })
    }
}

/// Storage collaborator holding one settings record.
///
/// Implementors provide raw record access; [`load`](Self::load) and
/// [`save`](Self::save) handle the encoding.
pub trait SettingsStore {
    /// Read the raw record.
    fn read(&mut self, record: &mut [u8; SETTINGS_SIZE]) -> Result<(), StorageError>;

    /// Erase and program the raw record.
    fn write(&mut self, record: &[u8; SETTINGS_SIZE]) -> Result<(), StorageError>;

    /// Load settings, or `None` if the medium holds no valid record.
    fn load(&mut self) -> Option<Settings> {
        let mut record = [0; SETTINGS_SIZE];
        if let Err(e) = self.read(&mut record) {
            warn!("settings read failed: {:?}", e);
            return None;
        }
        match Settings::decode(&record) {
            Ok(settings) => Some(settings),
            Err(e) => {
                info!("no valid settings ({:?}), using defaults", e);
                None
            }
        }
    }

    /// Encode and write settings.
    fn save(&mut self, settings: &Settings) -> Result<(), StorageError> {
        self.write(&settings.encode())
    }
}

/// RAM-backed store for hosts and boards without spare flash.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    record: [u8; SETTINGS_SIZE],
    writes: u32,
}

impl MemoryStore {
    /// An erased store.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            record: [0xFF; SETTINGS_SIZE],
            writes: 0,
        }
    }

    /// Number of committed writes.
    #[must_use]
    pub fn writes(&self) -> u32 {
        self.writes
    }

    /// Raw record contents.
    #[must_use]
    pub fn record(&self) -> &[u8; SETTINGS_SIZE] {
        &self.record
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsStore for MemoryStore {
    fn read(&mut self, record: &mut [u8; SETTINGS_SIZE]) -> Result<(), StorageError> {
        record.copy_from_slice(&self.record);
        Ok(())
    }

    fn write(&mut self, record: &[u8; SETTINGS_SIZE]) -> Result<(), StorageError> {
        self.record.copy_from_slice(record);
        self.writes += 1;
        Ok(())
    }
}

/// Coalesces rapid changes into one write after a quiet period.
#[derive(Debug, Clone, Copy, Default)]
pub struct Debounce {
    last_change: Option<Instant>,
}

impl Debounce {
    #[must_use]
    pub const fn new() -> Self {
        Self { last_change: None }
    }

    /// Record a change; restarts the quiet period.
    pub fn schedule(&mut self, now: Instant) {
        self.last_change = Some(now);
    }

    #[inline]
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.last_change.is_some()
    }

    /// Consume the pending change if the quiet period has elapsed.
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.last_change {
            Some(changed) if now.saturating_duration_since(changed) >= PERSIST_DEBOUNCE => {
                self.last_change = None;
                true
            }
            _ => false,
        }
    }

    /// Consume the pending change regardless of timing.
    pub fn take(&mut self) -> bool {
        self.last_change.take().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Settings {
        Settings {
            output_mode: 2,
            active_profile: [0, 1, 2, 0, 0, 0, 0, 0],
        }
    }

    #[test]
    fn test_encode_decode() {
        let record = sample().encode();
        assert_eq!(Settings::decode(&record), Ok(sample()));
        assert!(record[HEADER_LEN + 1..].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_erased_flash_is_bad_magic() {
        assert_eq!(
            Settings::decode(&[0xFF; SETTINGS_SIZE]),
            Err(SettingsError::BadMagic)
        );
    }

    #[test]
    fn test_corrupted_header_detected() {
        let mut record = sample().encode();
        record[7] ^= 0x01;
        assert_eq!(Settings::decode(&record), Err(SettingsError::Checksum));
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let mut record = sample().encode();
        record[4] = SETTINGS_VERSION + 1;
        assert_eq!(
            Settings::decode(&record),
            Err(SettingsError::UnsupportedVersion)
        );
    }

    #[test]
    fn test_short_record_rejected() {
        assert_eq!(Settings::decode(&[0; 4]), Err(SettingsError::Length));
    }

    #[test]
    fn test_memory_store_load_defaults_when_erased() {
        let mut store = MemoryStore::new();
        assert_eq!(store.load(), None);

        store.save(&sample()).unwrap();
        assert_eq!(store.load(), Some(sample()));
        assert_eq!(store.writes(), 1);
    }

    #[test]
    fn test_debounce_waits_for_quiet_period() {
        let mut debounce = Debounce::new();
        debounce.schedule(Instant::from_millis(0));
        debounce.schedule(Instant::from_millis(4_000));

        assert!(!debounce.take_due(Instant::from_millis(8_999)));
        assert!(debounce.take_due(Instant::from_millis(9_000)));
        assert!(!debounce.is_pending());
    }
}
