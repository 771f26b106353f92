//! Settings record in the last sector of on-board flash.

use embassy_rp::flash::{Blocking, Flash, ERASE_SIZE};
use embassy_rp::peripherals::FLASH;
use multipad_core::settings::{SettingsStore, StorageError, SETTINGS_SIZE};

/// On-board flash size (Raspberry Pi Pico: 2 MiB).
pub const FLASH_SIZE: usize = 2 * 1024 * 1024;

/// Offset of the settings sector from the start of flash.
pub const SETTINGS_OFFSET: u32 = (FLASH_SIZE - ERASE_SIZE) as u32;

/// Flash-backed [`SettingsStore`].
///
/// Erase and program run with interrupts held off and execution stalled,
/// so writes must stay rare; the core debounces them.
pub struct FlashStore<'d> {
    flash: Flash<'d, FLASH, Blocking, FLASH_SIZE>,
}

impl<'d> FlashStore<'d> {
    pub fn new(flash: Flash<'d, FLASH, Blocking, FLASH_SIZE>) -> Self {
        Self { flash }
    }
}

impl SettingsStore for FlashStore<'_> {
    fn read(&mut self, record: &mut [u8; SETTINGS_SIZE]) -> Result<(), StorageError> {
        self.flash.blocking_read(SETTINGS_OFFSET, record).map_err(|e| {
            defmt::warn!("flash read failed: {:?}", e);
            StorageError::Io
        })
    }

    fn write(&mut self, record: &[u8; SETTINGS_SIZE]) -> Result<(), StorageError> {
        self.flash
            .blocking_erase(SETTINGS_OFFSET, SETTINGS_OFFSET + ERASE_SIZE as u32)
            .map_err(|e| {
                defmt::warn!("flash erase failed: {:?}", e);
                StorageError::Io
            })?;
        self.flash.blocking_write(SETTINGS_OFFSET, record).map_err(|e| {
            defmt::warn!("flash program failed: {:?}", e);
            StorageError::Io
        })?;
        defmt::info!("settings written to flash");
        Ok(())
    }
}
