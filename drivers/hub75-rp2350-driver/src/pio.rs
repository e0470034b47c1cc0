//! PIO state machine programs for the address/OE contract (C4) and the data
//! contract (C5).
//!
//! §4.4 describes C4 as a single "address" program owning row advancement,
//! OE timing, and the two handshake IRQs with the data SM. Driving a
//! configurable `1..=5`-bit row counter, a `1..=8`-bit bitplane counter, and
//! a two-sided variable-length OE delay all at once needs three live
//! countdown values, and PIO state machines only have two (`x`, `y`) plus
//! the shift registers — the reason `hub75-rp2350-driver/src/pio.rs`'s
//! battle-tested program splits OE out into its own state machine. This file
//! keeps that split: `row_sm` carries the row/bitplane counters and the LAT
//! pulse (folding in C5's `lat_pin` responsibility — see the data program's
//! doc comment below), `oe_sm` carries the OE delay countdown. Together they
//! implement C4's contract; `data_sm` implements C5. See DESIGN.md for this
//! resolution.
//!
//! Row is the slow/outer counter and bitplane the fast/inner one, matching
//! C1's `byte_index = (row_pair * bitplanes + bitplane) * width + column`:
//! the buffer DMA pair feeds the data SM bytes in exactly that order, so the
//! row address asserted by `row_sm` must hold steady across all `bitplanes`
//! handshakes before advancing — not the reverse of what a literal reading
//! of "decrement row counter, reload on exhaustion and decrement bitplane
//! counter" suggests. `x` below is the bitplane counter, `y` the row
//! counter; that pairing is what keeps `pio.rs` consistent with `encoder.rs`
//! and the S1-S3 scenario tests already written against C1's byte layout.

use embassy_rp::Peri;
use embassy_rp::gpio::AnyPin;
use embassy_rp::pac::PIO0 as PIO0_REGS;
use embassy_rp::peripherals::PIO0;
use embassy_rp::pio::program::pio_asm;
use embassy_rp::pio::{Common, Config, Direction, FifoJoin, Pin, ShiftConfig, ShiftDirection, StateMachine};
use fixed_macro::__fixed::types::U24F8;

/// Handshake IRQ numbers, shared PIO-wide (§4.4/§4.5's "two shared IRQ
/// flags" plus the row<->OE pair the 3-SM split needs).
pub mod irq {
    /// Data SM -> row SM: this line's pixels are fully shifted out.
    pub const LINE_DONE: u8 = 4;
    /// Row SM -> data SM: row address and LAT are set, start the next line.
    pub const NEXT_LINE: u8 = 5;
    /// Row SM -> OE SM: latch just happened, safe to start this bitplane's
    /// OE pulse.
    pub const OE_START: u8 = 6;
    /// OE SM -> row SM: this bitplane's OE pulse (on + both off windows) is
    /// complete.
    pub const OE_DONE: u8 = 7;
}

/// The three state machines that together scan one panel. Owns `PIO0`'s
/// SM0 (data), SM1 (row/address), SM2 (OE).
pub struct Hub75Programs<'d> {
    pub data_sm: StateMachine<'d, PIO0, 0>,
    pub row_sm: StateMachine<'d, PIO0, 1>,
    pub oe_sm: StateMachine<'d, PIO0, 2>,
}

impl<'d> Hub75Programs<'d> {
    /// Install and configure all three programs. `address_pins.len()` is
    /// the panel's `address_bits`; `color_pins` is always the six HUB75
    /// lanes in `[r1, g1, b1, r2, g2, b2]` order.
    #[allow(clippy::too_many_arguments)]
    pub fn new<const A: usize>(
        common: &mut Common<'d, PIO0>,
        mut data_sm: StateMachine<'d, PIO0, 0>,
        mut row_sm: StateMachine<'d, PIO0, 1>,
        mut oe_sm: StateMachine<'d, PIO0, 2>,
        color_pins: [Peri<'d, AnyPin>; 6],
        clk_pin: Peri<'d, AnyPin>,
        address_pins: [Peri<'d, AnyPin>; A],
        lat_pin: Peri<'d, AnyPin>,
        oe_pin: Peri<'d, AnyPin>,
        width: usize,
        address_bits: u32,
        bitplanes: usize,
        data_clock_div: U24F8,
        address_clock_div: U24F8,
    ) -> Self {
        let color = color_pins.map(|p| common.make_pio_pin(p));
        let clk = common.make_pio_pin(clk_pin);
        let addr: [Pin<'d, PIO0>; A] = address_pins.map(|p| common.make_pio_pin(p));
        let lat = common.make_pio_pin(lat_pin);
        let oe = common.make_pio_pin(oe_pin);

        Self::setup_data_sm(common, &mut data_sm, &color, &clk, width, data_clock_div);
        Self::setup_row_sm(common, &mut row_sm, &addr, &lat, address_bits, bitplanes, address_clock_div);
        Self::setup_oe_sm(common, &mut oe_sm, &oe, address_clock_div);

        Self { data_sm, row_sm, oe_sm }
    }

    /// C5: shift `width` bytes (6 lanes in bits 7..2) per row, CLK as
    /// side-set, then hand off to the row SM and wait for the next line.
    fn setup_data_sm(
        common: &mut Common<'d, PIO0>,
        sm: &mut StateMachine<'d, PIO0, 0>,
        color_pins: &[Pin<'d, PIO0>; 6],
        clk_pin: &Pin<'d, PIO0>,
        width: usize,
        clock_div: U24F8,
    ) {
        let program = pio_asm!(
            ".side_set 1",
            "out isr, 32    side 0b0", // stash width-1, pushed once at setup
            ".wrap_target",
            "mov x, isr     side 0b0", // reload per-row column counter
            "pixel:",
            "out pins, 8    side 0b0", // shift one packed byte onto the 6 lanes
            "jmp x-- pixel  side 0b1", // CLK pulse, decrement column counter
            "irq 4          side 0b0", // LINE_DONE
            "wait 1 irq 5   side 0b0", // NEXT_LINE
            ".wrap",
        );

        let installed = common.load_program(&program.program);
        let refs: [&Pin<'d, PIO0>; 6] = core::array::from_fn(|i| &color_pins[i]);

        let mut cfg = Config::default();
        cfg.fifo_join = FifoJoin::TxOnly;
        cfg.use_program(&installed, &[clk_pin]);
        cfg.set_out_pins(&refs);
        cfg.shift_out = ShiftConfig { auto_fill: true, threshold: 32, direction: ShiftDirection::Right };
        cfg.clock_divider = clock_div;
        sm.set_config(&cfg);

        sm.set_pin_dirs(Direction::Out, &refs);
        sm.set_pin_dirs(Direction::Out, &[clk_pin]);

        if !sm.tx().try_push((width - 1) as u32) {
            defmt::error!("data SM: failed to push width-1");
        }
    }

    /// C4's row half: advance the row counter (outer, `2^address_bits`
    /// values) and bitplane counter (inner, `bitplanes` values), driving
    /// inverted address lines and pulsing LAT, handshaking with both the
    /// data SM (§4.5) and the OE SM (below) each bitplane.
    fn setup_row_sm<const A: usize>(
        common: &mut Common<'d, PIO0>,
        sm: &mut StateMachine<'d, PIO0, 1>,
        addr_pins: &[Pin<'d, PIO0>; A],
        lat_pin: &Pin<'d, PIO0>,
        address_bits: u32,
        bitplanes: usize,
        clock_div: U24F8,
    ) {
        let program = pio_asm!(
            ".side_set 1",
            "pull           side 0b0", // rows-1, pushed once at setup
            "out isr, 32    side 0b0",
            "pull           side 0b0", // bitplanes-1, pushed once at setup
            ".wrap_target",
            "mov y, isr     side 0b0", // reload row counter (outer, slow)
            "addr:",
            "mov pins, ~y   side 0b0", // drive inverted row address
            "mov x, osr     side 0b0", // reload bitplane counter (inner, fast)
            "row:",
            "wait 1 irq 4   side 0b0", // LINE_DONE from data SM
            "nop            side 0b1", // LAT pulse
            "irq 6          side 0b1", // OE_START
            "irq 5          side 0b0", // NEXT_LINE
            "wait 1 irq 7   side 0b0", // OE_DONE
            "jmp x-- row    side 0b0", // next bitplane, same row
            "jmp y-- addr   side 0b0", // next row
            ".wrap",
        );

        let installed = common.load_program(&program.program);
        let refs: [&Pin<'d, PIO0>; A] = core::array::from_fn(|i| &addr_pins[i]);

        let mut cfg = Config::default();
        cfg.use_program(&installed, &[lat_pin]);
        cfg.set_out_pins(&refs);
        cfg.clock_divider = clock_div;
        sm.set_config(&cfg);

        sm.set_pin_dirs(Direction::Out, &refs);
        sm.set_pin_dirs(Direction::Out, &[lat_pin]);

        let rows_minus_one = (1u32 << address_bits) - 1;
        if !sm.tx().try_push(rows_minus_one) {
            defmt::error!("row SM: failed to push rows-1");
        }
        if !sm.tx().try_push((bitplanes - 1) as u32) {
            defmt::error!("row SM: failed to push bitplanes-1");
        }
    }

    /// C4's OE half: per bitplane, burn the off/on/off cycle triple from
    /// `timing.rs`'s `(off, on)` words — fed continuously by the timing DMA
    /// pair (`dma.rs`) — with OE asserted only for the middle `on` window.
    fn setup_oe_sm(common: &mut Common<'d, PIO0>, sm: &mut StateMachine<'d, PIO0, 2>, oe_pin: &Pin<'d, PIO0>, clock_div: U24F8) {
        let program = pio_asm!(
            ".side_set 1",
            ".wrap_target",
            "out y, 32          side 0b1", // off cycles (OE deasserted), autofills OSR
            "mov x, y           side 0b1", // working copy for the pre-latch off window
            "pre_off:",
            "jmp x-- pre_off    side 0b1",
            "wait 1 irq 6       side 0b1", // OE_START from row SM
            "out x, 32          side 0b1", // on cycles, autofills OSR
            "on_window:",
            "jmp x-- on_window  side 0b0", // OE asserted (active-low)
            "mov x, y           side 0b1", // refresh off-copy for the anti-ghost tail
            "post_off:",
            "jmp x-- post_off   side 0b1",
            "irq 7              side 0b1", // OE_DONE
            ".wrap",
        );

        let installed = common.load_program(&program.program);

        let mut cfg = Config::default();
        cfg.fifo_join = FifoJoin::TxOnly;
        cfg.use_program(&installed, &[oe_pin]);
        cfg.shift_out = ShiftConfig { auto_fill: true, threshold: 32, direction: ShiftDirection::Right };
        cfg.clock_divider = clock_div;
        sm.set_config(&cfg);

        sm.set_pin_dirs(Direction::Out, &[oe_pin]);
    }

    pub fn start(&mut self) {
        self.data_sm.set_enable(true);
        self.row_sm.set_enable(true);
        self.oe_sm.set_enable(true);
    }

    pub fn stop(&mut self) {
        self.data_sm.set_enable(false);
        self.row_sm.set_enable(false);
        self.oe_sm.set_enable(false);
    }

    /// Whether the data SM's TX FIFO is stalled waiting for a pull that
    /// will never come — polled during `deinit`'s shutdown sequence (§4.6)
    /// after the buffer DMA has been chained to itself.
    pub fn data_sm_stalled(&self) -> bool {
        let dbg = PIO0_REGS.fdebug().read();
        dbg.txstall() & (1 << 0) != 0
    }
}
