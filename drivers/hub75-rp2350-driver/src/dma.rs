//! DMA ring (C6): two chained buffer/control pairs that keep the data SM
//! and OE SM fed without CPU intervention once started, plus the graceful
//! shutdown sequence (§4.6) `Hub75::deinit` drives.
//!
//! Generalized from `hub75-rp2350-driver/src/dma.rs`'s four-channel chained
//! layout: that version hardcoded `FRAME_SIZE`/`COLOR_BITS` and one delay
//! word per bitplane into `DisplayMemory`'s old pointer accessors. This
//! version reads byte/word counts from `Hub75Memory::buf_bytes`/
//! `timing_words` and points at `memory.rs`'s `active_ptr_cell`, so a
//! buffer flip (§3) is picked up by the control channel on its very next
//! cycle without this module knowing anything changed.

use crate::config::dma_dreq;
use crate::error::{Error, Result};
use crate::memory::Hub75Memory;
use embassy_rp::Peri;
use embassy_rp::pac::PIO0 as PIO0_REGS;
use embassy_rp::pac::dma::regs::{ChTransCount, CtrlTrig};
use embassy_rp::pac::dma::vals::{DataSize, TreqSel};
use embassy_rp::peripherals::{DMA_CH0, DMA_CH1, DMA_CH2, DMA_CH3};

/// Bound on the poll loops `shutdown` runs while waiting for DMA/PIO to go
/// quiet. Reaching it surfaces as [`Error::ShutdownTimeout`] rather than
/// spinning forever on wedged hardware.
const MAX_SHUTDOWN_POLLS: u32 = 100_000;

/// The four DMA channels behind one panel's pixel and timing rings.
///
/// - `buf_channel`/`buf_loop_channel`: pixel bytes, paced by the data SM's
///   TX DREQ, into PIO0 SM0's FIFO.
/// - `timing_channel`/`timing_loop_channel`: `(off, on)` words, paced by
///   the OE SM's TX DREQ, into PIO0 SM2's FIFO.
///
/// Each pair is "buffer DMA chains to control DMA chains back to buffer
/// DMA": the control channel's only job is to rewrite the buffer channel's
/// read-address-trigger register from the pointer cell it's bound to, so
/// the buffer channel restarts at the right address every cycle without
/// the CPU touching either channel after `new`.
pub struct Hub75DmaRing<'d> {
    buf_channel: Peri<'d, DMA_CH0>,
    buf_loop_channel: Peri<'d, DMA_CH1>,
    timing_channel: Peri<'d, DMA_CH2>,
    timing_loop_channel: Peri<'d, DMA_CH3>,
}

impl<'d> Hub75DmaRing<'d> {
    pub fn new<const BUF_BYTES: usize, const TIMING_WORDS: usize>(
        channels: (Peri<'d, DMA_CH0>, Peri<'d, DMA_CH1>, Peri<'d, DMA_CH2>, Peri<'d, DMA_CH3>),
        memory: &Hub75Memory<BUF_BYTES, TIMING_WORDS>,
    ) -> Self {
        let (buf_channel, buf_loop_channel, timing_channel, timing_loop_channel) = channels;

        Self::setup_pair(
            0,
            1,
            memory.front_buffer_ptr() as u32,
            memory.active_ptr_cell_addr() as u32,
            PIO0_REGS.txf(0).as_ptr() as u32,
            (memory.buf_bytes() / 4) as u32,
            dma_dreq::treq_sel(0, 0),
        );
        Self::setup_pair(
            2,
            3,
            memory.timing_ptr() as u32,
            memory.timing_ptr_cell_addr() as u32,
            PIO0_REGS.txf(2).as_ptr() as u32,
            memory.timing_words() as u32,
            dma_dreq::treq_sel(0, 2),
        );

        Self { buf_channel, buf_loop_channel, timing_channel, timing_loop_channel }
    }

    /// Program one buffer+control channel pair. `reload_source` is the
    /// address of a *cell holding a pointer* that the control channel
    /// re-reads every cycle to get the buffer channel's next read address:
    /// the pixel ring reads it from `active_ptr_cell` (so a `flip()` is
    /// observed), the timing ring reads it from `timing_ptr_cell` (whose
    /// value never changes, since the timing array never moves, but the
    /// control channel still needs a pointer-to-pointer — passing the
    /// timing array's own address here directly would have the control
    /// channel copy a timing word's *value* into the buffer channel's read
    /// address instead of the array's address).
    #[allow(clippy::too_many_arguments)]
    fn setup_pair(
        buf_idx: usize,
        ctrl_idx: usize,
        initial_read_addr: u32,
        reload_source: u32,
        fifo_addr: u32,
        word_count: u32,
        treq: u8,
    ) {
        let dma = embassy_rp::pac::DMA;

        let mut buf_ctrl = CtrlTrig(0);
        buf_ctrl.set_incr_read(true);
        buf_ctrl.set_incr_write(false);
        buf_ctrl.set_data_size(DataSize::SIZE_WORD);
        buf_ctrl.set_treq_sel(TreqSel::from_bits(treq));
        buf_ctrl.set_chain_to(ctrl_idx as u8);
        buf_ctrl.set_irq_quiet(true);
        buf_ctrl.set_en(true);

        dma.ch(buf_idx).al1_ctrl().write_value(buf_ctrl.0);
        dma.ch(buf_idx).read_addr().write_value(initial_read_addr);
        dma.ch(buf_idx).write_addr().write_value(fifo_addr);
        dma.ch(buf_idx).trans_count().write_value(ChTransCount(word_count));

        let mut ctrl_ctrl = CtrlTrig(0);
        ctrl_ctrl.set_incr_read(false);
        ctrl_ctrl.set_incr_write(false);
        ctrl_ctrl.set_data_size(DataSize::SIZE_WORD);
        ctrl_ctrl.set_treq_sel(TreqSel::PERMANENT);
        ctrl_ctrl.set_chain_to(buf_idx as u8);
        ctrl_ctrl.set_irq_quiet(true);
        ctrl_ctrl.set_en(true);

        dma.ch(ctrl_idx).al1_ctrl().write_value(ctrl_ctrl.0);
        dma.ch(ctrl_idx).read_addr().write_value(reload_source);
        dma.ch(ctrl_idx)
            .write_addr()
            .write_value(dma.ch(buf_idx).read_addr().as_ptr() as u32);
        dma.ch(ctrl_idx).trans_count().write_value(ChTransCount(1));
    }

    /// §4.6's graceful shutdown: stop the ring from re-triggering itself,
    /// let in-flight transfers drain, unstick any PIO SM parked on a
    /// handshake `wait` that will never arrive once the ring is quiet, then
    /// disable the state machines and unload their programs.
    pub fn shutdown(&mut self, programs: &mut crate::pio::Hub75Programs) -> Result<()> {
        let dma = embassy_rp::pac::DMA;

        // Chain the buffer channels to themselves so they stop handing off
        // to their control channels — the current in-flight transfer is
        // the last one that will ever complete.
        let mut quiesce = CtrlTrig(dma.ch(0).al1_ctrl().read());
        quiesce.set_chain_to(0);
        dma.ch(0).al1_ctrl().write_value(quiesce.0);
        let mut quiesce2 = CtrlTrig(dma.ch(2).al1_ctrl().read());
        quiesce2.set_chain_to(2);
        dma.ch(2).al1_ctrl().write_value(quiesce2.0);

        Self::wait_for_idle(0)?;
        Self::wait_for_idle(2)?;

        // Both SMs may be parked on a `wait 1 irq` for a partner that just
        // stopped being fed. Force every handshake flag so nothing is left
        // blocked before we disable the SMs outright.
        Self::force_irqs(0xF0);

        Self::wait_for_data_sm_stall(programs)?;

        programs.stop();

        // Clear any IRQ flags the forced set above left raised.
        PIO0_REGS.irq().write(|w| w.0 = 0xFF);

        dma.ch(0).al1_ctrl().write_value(0);
        dma.ch(1).al1_ctrl().write_value(0);
        dma.ch(2).al1_ctrl().write_value(0);
        dma.ch(3).al1_ctrl().write_value(0);

        Ok(())
    }

    fn wait_for_idle(channel: usize) -> Result<()> {
        let dma = embassy_rp::pac::DMA;
        for _ in 0..MAX_SHUTDOWN_POLLS {
            if !dma.ch(channel).ctrl_trig().read().busy() {
                return Ok(());
            }
        }
        Err(Error::ShutdownTimeout)
    }

    fn wait_for_data_sm_stall(programs: &crate::pio::Hub75Programs) -> Result<()> {
        for _ in 0..MAX_SHUTDOWN_POLLS {
            if programs.data_sm_stalled() {
                return Ok(());
            }
        }
        Err(Error::ShutdownTimeout)
    }

    fn force_irqs(mask: u8) {
        PIO0_REGS.irq_force().write(|w| w.0 = mask);
    }
}
