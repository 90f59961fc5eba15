//! Built-in region descriptors for common parts
//!
//! Each preset covers the whole flash array of the device. Use
//! [`FlashRegion::with_window`] to hand only part of it to an [`Nvm`](crate::Nvm).

use crate::region::{FlashRegion, ProgramWidth};

/// Start of the main flash array on STM32 parts
pub const STM32_FLASH_BASE: u32 = 0x0800_0000;

/// STM32G431xB: 128 KiB, single bank, 2 KiB pages
pub const STM32G431XB: FlashRegion =
    FlashRegion::single_bank(STM32_FLASH_BASE, 2048, 64, ProgramWidth::DoubleWord);

/// STM32G474xE in dual-bank mode: 2 x 256 KiB, 2 KiB pages
pub const STM32G474XE_DUAL: FlashRegion = FlashRegion::dual_bank(
    STM32_FLASH_BASE,
    0x0804_0000,
    2048,
    128,
    ProgramWidth::DoubleWord,
);

/// STM32L476xG: 2 x 512 KiB, 2 KiB pages
pub const STM32L476XG: FlashRegion = FlashRegion::dual_bank(
    STM32_FLASH_BASE,
    0x0808_0000,
    2048,
    256,
    ProgramWidth::DoubleWord,
);

/// All presets, by part name
pub const DEVICES: &[(&str, FlashRegion)] = &[
    ("STM32G431xB", STM32G431XB),
    ("STM32G474xE", STM32G474XE_DUAL),
    ("STM32L476xG", STM32L476XG),
];

/// Find a preset by part name (case-insensitive)
pub fn find(name: &str) -> Option<FlashRegion> {
    DEVICES
        .iter()
        .find(|(part, _)| part.eq_ignore_ascii_case(name))
        .map(|(_, region)| *region)
}
