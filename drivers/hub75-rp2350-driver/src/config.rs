//! Panel configuration: timing knobs, gamma/row-addressing selection, and
//! the PIO clock-divider / DREQ arithmetic shared by `pio.rs` and `dma.rs`.

use crate::error::ConfigError;
use crate::gamma::Gamma;
use fixed_macro::__fixed::types::U24F8;

/// How row address lines are driven.
///
/// `Direct` is what the address PIO program (`pio.rs`) actually drives;
/// `ShiftRegister` is carried as a configuration type only — see DESIGN.md
/// for why it isn't wired to a PIO program in this pass.
#[derive(Debug, Clone, Copy, PartialEq, defmt::Format)]
pub enum RowAddressing {
    /// `address_bits` contiguous GPIOs bound straight to the address PIO's
    /// `OUT` pins.
    Direct,
    /// Serial address shift register driven by a dedicated data/clock pin
    /// pair, `depth` bits deep.
    ShiftRegister {
        data_pin: u8,
        clock_pin: u8,
        depth: u8,
        clock_frequency_hz: u32,
    },
}

impl Default for RowAddressing {
    fn default() -> Self {
        RowAddressing::Direct
    }
}

/// Panel-level tuning knobs, independent of pin assignment and geometry.
///
/// Pin assignment lives on the call site of [`crate::Hub75::new`] (one
/// `Peri<'d, impl PioPin>` argument per signal, following
/// `hub75-rp2350-driver/src/pio.rs`'s constructor), not here — this struct
/// only holds values that can be freely reconfigured after `new`.
#[derive(Debug, Clone, Copy, defmt::Format)]
pub struct Hub75Config {
    /// Fraction of each bitplane's weighted window spent with OE asserted.
    pub brightness: f32,
    /// Anti-ghost pad, in nanoseconds, applied to both sides of every OE
    /// pulse.
    pub blanking_ns: u32,
    /// Shortest bitplane's "on" window, in PIO cycles. Bitplane `i`'s
    /// window is `base_cycles << i`. Tuned indirectly via
    /// `set_target_refresh_rate`.
    pub base_cycles: u32,
    /// Data SM shift clock rate, in Hz. The data PIO program runs at twice
    /// this (two PIO cycles per CLK period).
    pub data_frequency_hz: u32,
    pub gamma: Gamma,
    pub row_addressing: RowAddressing,
    /// When true, row 0 is the physical top of the panel; the address PIO
    /// program inverts its counter accordingly (see `driver.py`'s
    /// `row_origin_top`).
    pub row_origin_top: bool,
}

impl Default for Hub75Config {
    fn default() -> Self {
        Self {
            brightness: 1.0,
            blanking_ns: 0,
            base_cycles: 1,
            data_frequency_hz: 15_000_000,
            gamma: Gamma::default(),
            row_addressing: RowAddressing::default(),
            row_origin_top: true,
        }
    }
}

/// `address_bits` must leave room for the PIO `set x, <imm5>` row-reload
/// instruction (see `pio.rs`) — a HUB75 `OUT` group never drives more than
/// 5 address lines in practice, and 0 means no scanning at all.
pub fn validate_address_bits(address_bits: u32) -> Result<(), ConfigError> {
    if (1..=5).contains(&address_bits) {
        Ok(())
    } else {
        Err(ConfigError::InvalidAddressBits(address_bits))
    }
}

/// `bitplanes` must fit the packed byte's six lane bits (C1) and the PIO
/// `set y, <imm>` bitplane-reload instruction.
pub fn validate_bitplane_count(bitplanes: usize) -> Result<(), ConfigError> {
    if (1..=8).contains(&bitplanes) {
        Ok(())
    } else {
        Err(ConfigError::InvalidBitplaneCount(bitplanes))
    }
}

/// `width` must be nonzero and fit the data SM's ISR-cached column counter
/// (32 bits, so effectively unbounded on this target).
pub fn validate_width(width: usize) -> Result<(), ConfigError> {
    if width == 0 {
        Err(ConfigError::InvalidWidth(width))
    } else {
        Ok(())
    }
}

/// Reject overlapping pin assignments among the four contiguous pin
/// groups a panel needs: 6 color lanes, `address_bits` address lines, 2
/// clock/latch lines, and the output-enable line.
pub fn validate_pin_layout(
    base_data_pin: u8,
    base_address_pin: u8,
    address_bits: u32,
    base_clock_pin: u8,
    output_enable_pin: u8,
) -> Result<(), ConfigError> {
    let data_range = base_data_pin..base_data_pin + 6;
    let addr_range = base_address_pin..base_address_pin + address_bits as u8;
    let clock_range = base_clock_pin..base_clock_pin + 2;

    let ranges = [data_range.clone(), addr_range.clone(), clock_range.clone()];
    for (i, a) in ranges.iter().enumerate() {
        for b in &ranges[i + 1..] {
            if a.clone().any(|p| b.clone().contains(&p)) {
                return Err(ConfigError::OverlappingPins);
            }
        }
        if a.clone().any(|p| p == output_enable_pin) {
            return Err(ConfigError::OverlappingPins);
        }
    }
    Ok(())
}

/// Clock dividers and DREQ selectors for the two PIO programs and their
/// DMA pacing, generalized from `hub75-rp2350-driver/src/config.rs`'s
/// hardcoded `U24F8` constants into functions of the panel's configured
/// frequencies.
pub mod pio_clocks {
    use super::U24F8;

    /// Address SM runs at full `sys_clk` (§4.4): divider 1.0.
    pub fn address_sm_clock_div() -> U24F8 {
        U24F8::from_num(1)
    }

    /// Data SM runs at `2 * data_frequency_hz` (§4.5: two PIO cycles per
    /// CLK period).
    pub fn data_sm_clock_div(data_frequency_hz: u32, sys_clk_hz: u32) -> U24F8 {
        let divider = sys_clk_hz as f32 / (2.0 * data_frequency_hz as f32);
        U24F8::from_num(divider.max(1.0))
    }
}

/// DMA DREQ (data request) index arithmetic, per `driver.py`'s
/// `get_pio_data_request_index`: `(pio_block_id << 3) | (sm_id & 0b11)`.
pub mod dma_dreq {
    pub fn treq_sel(pio_block_id: u8, state_machine_id: u8) -> u8 {
        (pio_block_id << 3) | (state_machine_id & 0b11)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_bits_out_of_range_rejected() {
        assert!(validate_address_bits(0).is_err());
        assert!(validate_address_bits(6).is_err());
        assert!(validate_address_bits(5).is_ok());
    }

    #[test]
    fn bitplane_count_out_of_range_rejected() {
        assert!(validate_bitplane_count(0).is_err());
        assert!(validate_bitplane_count(9).is_err());
        assert!(validate_bitplane_count(8).is_ok());
    }

    #[test]
    fn overlapping_pins_detected() {
        // data pins 0..6, address pins 4..8 overlap at 4,5.
        assert!(validate_pin_layout(0, 4, 4, 10, 12).is_err());
        assert!(validate_pin_layout(0, 6, 4, 10, 12).is_ok());
    }

    #[test]
    fn output_enable_overlap_detected() {
        assert!(validate_pin_layout(0, 6, 4, 10, 2).is_err());
    }

    #[test]
    fn data_sm_clock_div_halves_for_double_rate() {
        let div = pio_clocks::data_sm_clock_div(15_000_000, 150_000_000);
        assert_eq!(div, U24F8::from_num(5));
    }

    #[test]
    fn treq_sel_packs_block_and_sm() {
        assert_eq!(dma_dreq::treq_sel(0, 0), 0);
        assert_eq!(dma_dreq::treq_sel(0, 2), 2);
        assert_eq!(dma_dreq::treq_sel(1, 1), 9);
    }
}
