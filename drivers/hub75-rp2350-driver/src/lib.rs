#![cfg_attr(not(test), no_std)]
//! HUB75 RGB LED matrix display engine.
//!
//! Built from `hub75-rp2350-driver`'s PIO/DMA-autonomous design: load a
//! frame into the back buffer (`load_rgb888`/`load_rgb565`), `flip()` it
//! live, and let `pio.rs`'s state machines and `dma.rs`'s chained rings
//! refresh the panel without further CPU attention. There is no per-pixel
//! bitbang path here — that belonged to the predecessor in
//! `hub75-rp2350-driver/src/lib.rs` (root), which this supersedes.
//!
//! # Example
//! ```ignore
//! static MEMORY: StaticCell<DisplayMemory> = StaticCell::new();
//! let memory = MEMORY.init(DisplayMemory::new());
//! let pins = Hub75Pins {
//!     color: ColorPins {
//!         r1: p.PIN_0.into(), g1: p.PIN_1.into(), b1: p.PIN_2.into(),
//!         r2: p.PIN_3.into(), g2: p.PIN_4.into(), b2: p.PIN_5.into(),
//!     },
//!     address: AddressPins::new([p.PIN_8.into(), p.PIN_9.into(), p.PIN_10.into(), p.PIN_11.into(), p.PIN_12.into()]),
//!     control: ControlPins { clk: p.PIN_6.into(), lat: p.PIN_7.into(), oe: p.PIN_13.into() },
//! };
//! let pin_layout = PinLayout {
//!     base_data_pin: 0, base_address_pin: 8, base_clock_pin: 6, output_enable_pin: 13,
//! };
//! let mut display = Hub75::new(
//!     p.PIO0, (p.DMA_CH0, p.DMA_CH1, p.DMA_CH2, p.DMA_CH3), memory, pins, pin_layout,
//!     DISPLAY_WIDTH, ACTIVE_ROW_BITS, COLOR_BITS,
//!     Hub75Config::default(), 125_000_000,
//! ).unwrap();
//! display.clear();
//! Circle::new(Point::new(4, 4), 8).draw(&mut display).unwrap();
//! display.flip();
//! ```

pub mod config;
pub mod dma;
pub mod encoder;
pub mod error;
pub mod gamma;
pub mod memory;
pub mod pins;
pub mod pio;
pub mod timing;

use core::convert::Infallible;
use core::sync::atomic::{AtomicU8, Ordering};

use config::{Hub75Config, pio_clocks, validate_address_bits, validate_bitplane_count, validate_pin_layout, validate_width};
use embassy_rp::Peri;
use embassy_rp::peripherals::{DMA_CH0, DMA_CH1, DMA_CH2, DMA_CH3, PIO0};
use embassy_rp::pio::{InterruptHandler, Pio};
use embedded_graphics_core::Pixel;
use embedded_graphics_core::draw_target::DrawTarget;
use embedded_graphics_core::geometry::{OriginDimensions, Size};
use embedded_graphics_core::pixelcolor::{Rgb565, RgbColor};
use error::{Error, Result};
use gamma::Gamma;
use memory::Hub75Memory;
use pins::{Hub75Pins, PinLayout};

embassy_rp::bind_interrupts!(struct Irqs {
    PIO0_IRQ_0 => InterruptHandler<PIO0>;
});

/// A panel's double-buffered memory. Placed in a [`static_cell::StaticCell`]
/// by the caller (as `hardware-tests/basic-panel` does), never owned by
/// [`Hub75`] itself — [`Hub75::new`] only takes a `&'static mut` to it.
pub type DisplayMemory<const BUF_BYTES: usize, const TIMING_WORDS: usize> = Hub75Memory<BUF_BYTES, TIMING_WORDS>;

/// Lifecycle state (§5): `Running` for the whole time a [`Hub75`] value
/// exists, `Deinitialized` only observable to other cores via
/// [`Hub75::is_running`] in the brief window `deinit` is executing before
/// the value itself is dropped. There's no externally reachable
/// `Uninitialized` state — [`Hub75::new`] either fails with
/// [`Error::ConfigError`] or returns an already-`Running` driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum LifecycleState {
    Running,
    Deinitialized,
}

impl LifecycleState {
    const fn to_bits(self) -> u8 {
        match self {
            LifecycleState::Running => 0,
            LifecycleState::Deinitialized => 1,
        }
    }

    const fn from_bits(bits: u8) -> Self {
        match bits {
            0 => LifecycleState::Running,
            _ => LifecycleState::Deinitialized,
        }
    }
}

/// The display engine. Owns the PIO state machines and DMA ring for one
/// panel; the frame memory lives separately at `'static` so DMA can read it
/// without the borrow checker needing `Hub75` itself to be `'static`.
pub struct Hub75<'d, const BUF_BYTES: usize, const TIMING_WORDS: usize> {
    memory: &'static mut Hub75Memory<BUF_BYTES, TIMING_WORDS>,
    programs: pio::Hub75Programs<'d>,
    dma: dma::Hub75DmaRing<'d>,
    width: usize,
    address_bits: u32,
    bitplanes: usize,
    config: Hub75Config,
    system_clock_hz: u32,
    state: AtomicU8,
}

impl<'d, const BUF_BYTES: usize, const TIMING_WORDS: usize> Hub75<'d, BUF_BYTES, TIMING_WORDS> {
    /// Validate geometry and pin layout, materialize the gamma LUT and
    /// initial timing words, install the PIO programs, start the DMA ring,
    /// and enable all three state machines. On success the panel is already
    /// scanning (§5: `Running` the instant this returns `Ok`).
    #[allow(clippy::too_many_arguments)]
    pub fn new<const A: usize>(
        pio: Peri<'d, PIO0>,
        dma_channels: (Peri<'d, DMA_CH0>, Peri<'d, DMA_CH1>, Peri<'d, DMA_CH2>, Peri<'d, DMA_CH3>),
        memory: &'static mut Hub75Memory<BUF_BYTES, TIMING_WORDS>,
        pins: Hub75Pins<'d, A>,
        pin_layout: PinLayout,
        width: usize,
        address_bits: u32,
        bitplanes: usize,
        config: Hub75Config,
        system_clock_hz: u32,
    ) -> Result<Self> {
        validate_width(width)?;
        validate_address_bits(address_bits)?;
        validate_bitplane_count(bitplanes)?;
        // `pins` is already made of type-erased `AnyPin`s by this point, so
        // the overlap check runs against the caller-supplied raw numbers in
        // `pin_layout` instead (§7: `ConfigError::OverlappingPins`).
        validate_pin_layout(
            pin_layout.base_data_pin,
            pin_layout.base_address_pin,
            address_bits,
            pin_layout.base_clock_pin,
            pin_layout.output_enable_pin,
        )?;
        let rows = 1usize << address_bits;
        Hub75Memory::<BUF_BYTES, TIMING_WORDS>::check_geometry(width, rows, bitplanes)?;

        memory.bind();
        memory.set_gamma(config.gamma, bitplanes as u32);
        memory.fill_timing(bitplanes, config.base_cycles, config.brightness, config.blanking_ns, system_clock_hz);

        let Pio { mut common, sm0, sm1, sm2, .. } = Pio::new(pio, Irqs);

        let data_clock_div = pio_clocks::data_sm_clock_div(config.data_frequency_hz, system_clock_hz);
        let address_clock_div = pio_clocks::address_sm_clock_div();

        let Hub75Pins { color, address, control } = pins;
        let programs = pio::Hub75Programs::new(
            &mut common,
            sm0,
            sm1,
            sm2,
            color.into_array(),
            control.clk,
            address.into_array(),
            control.lat,
            control.oe,
            width,
            address_bits,
            bitplanes,
            data_clock_div,
            address_clock_div,
        );

        let mut dma = dma::Hub75DmaRing::new(dma_channels, &*memory);
        let mut programs = programs;
        programs.start();

        // `dma` is only ever driven from `shutdown`; silence the otherwise
        // unused `mut` until deinit runs.
        let _ = &mut dma;

        Ok(Self {
            memory,
            programs,
            dma,
            width,
            address_bits,
            bitplanes,
            config,
            system_clock_hz,
            state: AtomicU8::new(LifecycleState::Running.to_bits()),
        })
    }

    /// §5/§9's lifecycle state, readable without consuming `self` — unlike
    /// `Running`/`Deinitialized` being distinguished by whether a `Hub75`
    /// value still exists at all, this is for another core to observe the
    /// brief window inside `deinit` where the ring has been torn down but
    /// the value hasn't been dropped yet.
    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_bits(self.state.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.state() == LifecycleState::Running
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn rows(&self) -> usize {
        1usize << self.address_bits
    }

    pub fn height(&self) -> usize {
        2 * self.rows()
    }

    pub fn load_rgb888(&mut self, src: &[u8]) -> Result<()> {
        self.memory.load_rgb888(src, self.width, self.rows(), self.bitplanes)
    }

    pub fn load_rgb565(&mut self, src: &[u8]) -> Result<()> {
        self.memory.load_rgb565(src, self.width, self.rows(), self.bitplanes)
    }

    pub fn clear(&mut self) {
        self.memory.clear();
    }

    /// Swap front/back buffers (§3, §4.1) — a pointer toggle, picked up by
    /// the buffer DMA's control channel no later than its next cycle.
    pub fn flip(&mut self) {
        self.memory.flip();
    }

    fn refill_timing(&mut self) {
        self.memory.fill_timing(
            self.bitplanes,
            self.config.base_cycles,
            self.config.brightness,
            self.config.blanking_ns,
            self.system_clock_hz,
        );
    }

    /// `brightness` is clamped to `[0.0, 1.0]` and takes effect on the next
    /// refresh — the timing buffer the OE SM reads from updates in place.
    pub fn set_brightness(&mut self, brightness: f32) {
        self.config.brightness = brightness.clamp(0.0, 1.0);
        self.refill_timing();
    }

    /// Anti-ghost pad, in nanoseconds, applied to both sides of every OE
    /// pulse (§4.3).
    pub fn set_blanking(&mut self, blanking_ns: u32) {
        self.config.blanking_ns = blanking_ns;
        self.refill_timing();
    }

    pub fn set_gamma(&mut self, gamma: Gamma) {
        self.config.gamma = gamma;
        self.memory.set_gamma(gamma, self.bitplanes as u32);
    }

    /// Binary-search `base_cycles` for the value whose estimated refresh
    /// rate is closest to `target_hz` (§4.3), apply it, and return the
    /// achieved rate.
    pub fn set_target_refresh_rate(&mut self, target_hz: f32) -> f32 {
        let inputs = timing::RefreshEstimateInputs {
            width: self.width,
            address_bits: self.address_bits,
            bitplanes: self.bitplanes,
            brightness: self.config.brightness,
            blanking_ns: self.config.blanking_ns,
            data_frequency_hz: self.config.data_frequency_hz,
            system_clock_hz: self.system_clock_hz,
        };
        let (base_cycles, achieved) = timing::fit_base_cycles(target_hz, &inputs);
        self.config.base_cycles = base_cycles;
        self.refill_timing();
        achieved
    }

    /// Data SM shift-clock rate, in Hz. Re-derives and applies the data
    /// SM's clock divider (§4.5 runs at `2 * data_frequency_hz`).
    pub fn set_data_frequency(&mut self, data_frequency_hz: u32) {
        self.config.data_frequency_hz = data_frequency_hz;
        let div = pio_clocks::data_sm_clock_div(data_frequency_hz, self.system_clock_hz);
        self.programs.data_sm.set_clock_divider(div);
    }

    /// §4.6's graceful shutdown: quiesce the DMA ring, unstick any state
    /// machine parked on a handshake that will no longer arrive, disable
    /// all three SMs, and unload their programs. Consumes `self` — there is
    /// no way to call `flip`/`load_*` afterward, matching the `Deinitialized`
    /// state being terminal.
    pub fn deinit(mut self) -> Result<()> {
        self.dma.shutdown(&mut self.programs)?;
        self.state.store(LifecycleState::Deinitialized.to_bits(), Ordering::Release);
        Ok(())
    }
}

impl<'d, const BUF_BYTES: usize, const TIMING_WORDS: usize> OriginDimensions for Hub75<'d, BUF_BYTES, TIMING_WORDS> {
    fn size(&self) -> Size {
        Size::new(self.width as u32, self.height() as u32)
    }
}

impl<'d, const BUF_BYTES: usize, const TIMING_WORDS: usize> DrawTarget for Hub75<'d, BUF_BYTES, TIMING_WORDS> {
    type Color = Rgb565;
    type Error = Infallible;

    /// Pixels outside the panel's bounds are silently dropped, the way
    /// `embedded-graphics` `DrawTarget` implementations conventionally
    /// clip rather than error (see `hub75-rp2350-driver/src/lib.rs`'s
    /// predecessor impl).
    fn draw_iter<I>(&mut self, pixels: I) -> core::result::Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let width = self.width;
        let height = self.height();
        let rows = self.rows();
        let bitplanes = self.bitplanes;
        let gamma = *self.memory.gamma_lut();
        for Pixel(point, color) in pixels {
            if point.x < 0 || point.y < 0 || point.x as usize >= width || point.y as usize >= height {
                continue;
            }
            let (x, y) = (point.x as usize, point.y as usize);
            let row_pair = y % rows;
            let r8 = (color.r() as u32) << 3;
            let g8 = (color.g() as u32) << 2;
            let b8 = (color.b() as u32) << 3;
            let (r, g, b) = (gamma[r8 as usize], gamma[g8 as usize], gamma[b8 as usize]);
            self.memory.set_encoded_pixel(row_pair, x, y < rows, r, g, b, width, bitplanes);
        }
        Ok(())
    }
}
