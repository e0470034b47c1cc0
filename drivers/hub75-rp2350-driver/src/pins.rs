//! Pin assignment for a panel, grouped so [`crate::Hub75::new`] doesn't take
//! one argument per signal the way `hub75-rp2350-driver/src/pio.rs`'s
//! fourteen-argument constructor does.
//!
//! Unlike `hub75-rp2350-driver/src/pins.rs` (the bitbang predecessor, whose
//! `Hub75Pins` wraps `Output`s and toggles them directly), nothing here
//! drives a GPIO: every pin is handed straight to `pio.rs`, which binds it
//! to a PIO state machine. `address_bits` is only known at `Hub75::new`
//! call time (it isn't a type parameter pins.rs needs to carry), so
//! `AddressPins` is generic over it as a const.

use embassy_rp::Peri;
use embassy_rp::gpio::AnyPin;

/// The six HUB75 color lanes, top half then bottom half: R1, G1, B1, R2,
/// G2, B2.
pub struct ColorPins<'d> {
    pub r1: Peri<'d, AnyPin>,
    pub g1: Peri<'d, AnyPin>,
    pub b1: Peri<'d, AnyPin>,
    pub r2: Peri<'d, AnyPin>,
    pub g2: Peri<'d, AnyPin>,
    pub b2: Peri<'d, AnyPin>,
}

impl<'d> ColorPins<'d> {
    /// `[r1, g1, b1, r2, g2, b2]`, the order `encoder.rs`'s packed byte and
    /// `pio.rs`'s data program both assume.
    pub fn into_array(self) -> [Peri<'d, AnyPin>; 6] {
        [self.r1, self.g1, self.b1, self.r2, self.g2, self.b2]
    }
}

/// `address_bits` contiguous row-address lines, MSB-first — `A` pins is
/// `config::RowAddressing::Direct`'s only supported shape in this pass.
pub struct AddressPins<'d, const A: usize> {
    pins: [Peri<'d, AnyPin>; A],
}

impl<'d, const A: usize> AddressPins<'d, A> {
    pub fn new(pins: [Peri<'d, AnyPin>; A]) -> Self {
        Self { pins }
    }

    pub fn into_array(self) -> [Peri<'d, AnyPin>; A] {
        self.pins
    }
}

/// CLK (data-shift clock) and LAT (row latch), plus OE (active-low output
/// enable).
pub struct ControlPins<'d> {
    pub clk: Peri<'d, AnyPin>,
    pub lat: Peri<'d, AnyPin>,
    pub oe: Peri<'d, AnyPin>,
}

/// Every signal `Hub75::new` needs, grouped by role.
pub struct Hub75Pins<'d, const A: usize> {
    pub color: ColorPins<'d>,
    pub address: AddressPins<'d, A>,
    pub control: ControlPins<'d>,
}

/// Raw GPIO numbers for the four contiguous pin groups a panel needs,
/// checked by [`crate::config::validate_pin_layout`] against overlap before
/// [`Hub75Pins`]'s `Peri`s are bound to PIO. Once a pin is wrapped as
/// `Peri<'d, AnyPin>` its number is erased, so [`crate::Hub75::new`] needs
/// this passed alongside [`Hub75Pins`] to actually run the check — the
/// numbers here must match the pins handed to `Hub75Pins` one-for-one.
#[derive(Debug, Clone, Copy)]
pub struct PinLayout {
    /// First of 6 contiguous GPIOs: r1, g1, b1, r2, g2, b2.
    pub base_data_pin: u8,
    /// First of `address_bits` contiguous GPIOs.
    pub base_address_pin: u8,
    /// First of 2 contiguous GPIOs: clk, lat.
    pub base_clock_pin: u8,
    pub output_enable_pin: u8,
}
