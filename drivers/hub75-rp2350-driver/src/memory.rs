//! Double-buffered bitplane memory (C1/C7), the gamma LUT, and the timing
//! buffer — the state `dma.rs`'s rings pull from and `encoder.rs` writes
//! into.
//!
//! `BUF_BYTES`/`TIMING_WORDS` are const generics so the buffers have no
//! per-frame allocation and their size is known at compile time, the way
//! `hub75-rp2350-driver/src/config.rs`'s `FRAME_SIZE` constant sized the
//! teacher's fixed-geometry buffers; unlike the teacher, the actual
//! geometry (`width`, row-pair count, bitplane count) is a runtime
//! quantity checked against these capacities in [`Hub75Memory::new`]
//! rather than baked into the type via a `generic_const_exprs` product —
//! that Rust feature is nightly-only, so the caller supplies both the
//! runtime geometry and the matching capacities and construction rejects
//! a mismatch as [`crate::error::ConfigError::BufferSizeMismatch`].

use crate::encoder;
use crate::error::{ConfigError, Result};
use crate::gamma::Gamma;
use crate::timing;

/// Owns both front/back bitplane buffers, the timing-word array the
/// address SM's DMA pair feeds from, and the materialized gamma LUT.
///
/// Must be placed at a `'static` address (a [`static_cell::StaticCell`],
/// as `hardware-tests/basic-panel` does for `DisplayMemory`) and
/// [`Hub75Memory::bind`] called exactly once before any DMA channel reads
/// `active_ptr_cell` — the buffers move with the struct, so binding before
/// the struct reaches its final address would capture a dangling pointer.
pub struct Hub75Memory<const BUF_BYTES: usize, const TIMING_WORDS: usize> {
    buf: [[u8; BUF_BYTES]; 2],
    active_index: bool,
    /// The 32-bit cell the control DMA copies into the buffer DMA's
    /// read-address-trigger register every cycle (§3, §4.6).
    active_ptr_cell: *mut u8,
    timing: [u32; TIMING_WORDS],
    /// Mirrors `active_ptr_cell` for the timing ring: a cell holding the
    /// address of `timing[0]`, read by the timing control DMA and rewritten
    /// into the timing buffer DMA's read-address-trigger register every
    /// cycle. `timing` never moves once bound, so this cell's *value* never
    /// changes either, but the control channel still needs a pointer-to-
    /// pointer to copy from — reusing `timing.as_ptr()` directly as the
    /// reload source would have the control channel copy `timing[0]` (an
    /// off/on cycle count) into the buffer channel's read address instead
    /// of `timing`'s own address.
    timing_ptr_cell: *const u32,
    gamma_lut: [u8; 256],
}

impl<const BUF_BYTES: usize, const TIMING_WORDS: usize> Hub75Memory<BUF_BYTES, TIMING_WORDS> {
    /// Zeroed, unbound memory. Pointers are null until [`Self::bind`] runs.
    pub const fn new() -> Self {
        Self {
            buf: [[0u8; BUF_BYTES], [0u8; BUF_BYTES]],
            active_index: false,
            active_ptr_cell: core::ptr::null_mut(),
            timing: [0u32; TIMING_WORDS],
            timing_ptr_cell: core::ptr::null(),
            gamma_lut: [0u8; 256],
        }
    }

    /// Check the compile-time buffer capacities against runtime geometry.
    ///
    /// `BUF_BYTES` must also be a multiple of 4 (§3: "required by 32-bit
    /// DMA") — `dma.rs` divides it by 4 for the buffer DMA's transfer
    /// count, and a non-multiple would truncate that count, silently
    /// under-running the ring instead of refusing construction.
    pub fn check_geometry(width: usize, rows: usize, bitplanes: usize) -> core::result::Result<(), ConfigError> {
        let expected_buf = width * rows * bitplanes;
        if expected_buf != BUF_BYTES {
            return Err(ConfigError::BufferSizeMismatch { expected: expected_buf, got: BUF_BYTES });
        }
        if BUF_BYTES % 4 != 0 {
            let rounded = BUF_BYTES.div_ceil(4) * 4;
            return Err(ConfigError::BufferSizeMismatch { expected: rounded, got: BUF_BYTES });
        }
        let expected_timing = 2 * bitplanes;
        if expected_timing != TIMING_WORDS {
            return Err(ConfigError::BufferSizeMismatch { expected: expected_timing, got: TIMING_WORDS });
        }
        Ok(())
    }

    /// Point `active_ptr_cell` at the front buffer and `timing_ptr_cell` at
    /// the timing array. Call once, after `self` has reached its final
    /// `'static` storage.
    pub fn bind(&mut self) {
        self.active_ptr_cell = self.buf[self.active_index as usize].as_mut_ptr();
        self.timing_ptr_cell = self.timing.as_ptr();
    }

    pub fn set_gamma(&mut self, gamma: Gamma, bitplanes: u32) {
        self.gamma_lut = gamma.build_lut(bitplanes);
    }

    pub fn fill_timing(
        &mut self,
        bitplanes: usize,
        base_cycles: u32,
        brightness: f32,
        blanking_ns: u32,
        system_clock_hz: u32,
    ) {
        timing::fill_timing_buffer(&mut self.timing, bitplanes, base_cycles, brightness, blanking_ns, system_clock_hz);
    }

    fn back_index(&self) -> usize {
        (!self.active_index) as usize
    }

    /// The already-materialized gamma LUT — for [`crate::Hub75`]'s
    /// `DrawTarget` impl, which quantizes one pixel at a time and must not
    /// rebuild the table per call (§9: "the hot path never dispatches").
    pub fn gamma_lut(&self) -> &[u8; 256] {
        &self.gamma_lut
    }

    pub fn load_rgb888(&mut self, src: &[u8], width: usize, rows: usize, bitplanes: usize) -> Result<()> {
        let back = self.back_index();
        let lut = self.gamma_lut;
        encoder::load_rgb888(&mut self.buf[back], src, width, rows, bitplanes, &lut)
    }

    pub fn load_rgb565(&mut self, src: &[u8], width: usize, rows: usize, bitplanes: usize) -> Result<()> {
        let back = self.back_index();
        let lut = self.gamma_lut;
        encoder::load_rgb565(&mut self.buf[back], src, width, rows, bitplanes, &lut)
    }

    pub fn clear(&mut self) {
        let back = self.back_index();
        encoder::clear(&mut self.buf[back]);
    }

    /// Write one already gamma-quantized pixel into the back buffer — backs
    /// [`crate::Hub75`]'s `DrawTarget` impl. See [`encoder::set_pixel`].
    #[allow(clippy::too_many_arguments)]
    pub fn set_encoded_pixel(
        &mut self,
        row_pair: usize,
        column: usize,
        is_top: bool,
        r: u8,
        g: u8,
        b: u8,
        width: usize,
        bitplanes: usize,
    ) {
        let back = self.back_index();
        encoder::set_pixel(&mut self.buf[back], row_pair, column, width, bitplanes, is_top, r, g, b);
    }

    /// Atomically toggle the front/back buffers and republish
    /// `active_ptr_cell`. Per §4.6, the control DMA picks this up no later
    /// than the next time it fires — one full frame, at most.
    pub fn flip(&mut self) {
        self.active_index = !self.active_index;
        self.active_ptr_cell = self.buf[self.active_index as usize].as_mut_ptr();
    }

    /// Address of the current front buffer, for the buffer DMA's initial
    /// read-address programming (`dma.rs::setup_buffer_dma`).
    pub fn front_buffer_ptr(&self) -> *const u8 {
        self.buf[self.active_index as usize].as_ptr()
    }

    /// Address of `active_ptr_cell` itself — what the control DMA reads
    /// from on every cycle.
    pub fn active_ptr_cell_addr(&self) -> *const *mut u8 {
        core::ptr::addr_of!(self.active_ptr_cell)
    }

    /// Address of `timing[0]`, for the timing DMA's initial read-address
    /// programming (`dma.rs`'s timing ring `initial_read_addr`).
    pub fn timing_ptr(&self) -> *const u32 {
        self.timing.as_ptr()
    }

    /// Address of `timing_ptr_cell` itself — what the timing ring's control
    /// channel reads from on every cycle to reload the buffer channel's
    /// read address (mirrors `active_ptr_cell_addr`).
    pub fn timing_ptr_cell_addr(&self) -> *const *const u32 {
        core::ptr::addr_of!(self.timing_ptr_cell)
    }

    pub const fn buf_bytes(&self) -> usize {
        BUF_BYTES
    }

    pub const fn timing_words(&self) -> usize {
        TIMING_WORDS
    }
}

impl<const BUF_BYTES: usize, const TIMING_WORDS: usize> Default for Hub75Memory<BUF_BYTES, TIMING_WORDS> {
    fn default() -> Self {
        Self::new()
    }
}

// Safety: plain data plus a raw pointer that is only ever written from the
// owning core (CPU, in `flip`) and only ever read by DMA hardware, never
// aliased by another thread's `&mut`.
unsafe impl<const BUF_BYTES: usize, const TIMING_WORDS: usize> Send for Hub75Memory<BUF_BYTES, TIMING_WORDS> {}
unsafe impl<const BUF_BYTES: usize, const TIMING_WORDS: usize> Sync for Hub75Memory<BUF_BYTES, TIMING_WORDS> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_mismatch_rejected() {
        let err = Hub75Memory::<10, 12>::check_geometry(2, 2, 6).unwrap_err();
        assert_eq!(err, ConfigError::BufferSizeMismatch { expected: 24, got: 10 });
    }

    #[test]
    fn geometry_match_accepted() {
        assert!(Hub75Memory::<24, 12>::check_geometry(2, 2, 6).is_ok());
    }

    #[test]
    fn non_multiple_of_four_buf_bytes_rejected() {
        // width=1, rows=1, bitplanes=2 -> expected_buf == BUF_BYTES == 2,
        // which matches but is not itself a multiple of 4.
        let err = Hub75Memory::<2, 4>::check_geometry(1, 1, 2).unwrap_err();
        assert_eq!(err, ConfigError::BufferSizeMismatch { expected: 4, got: 2 });
    }

    #[test]
    fn timing_ptr_cell_reads_back_timing_array_address() {
        let mut mem = Hub75Memory::<24, 12>::new();
        mem.bind();
        let cell = unsafe { *mem.timing_ptr_cell_addr() };
        assert_eq!(cell, mem.timing_ptr());
    }

    #[test]
    fn flip_toggles_front_buffer_identity() {
        let mut mem = Hub75Memory::<24, 12>::new();
        mem.bind();
        let first = mem.front_buffer_ptr();
        mem.flip();
        let second = mem.front_buffer_ptr();
        assert_ne!(first, second);
        mem.flip();
        assert_eq!(mem.front_buffer_ptr(), first);
    }

    #[test]
    fn all_zero_with_no_frame_loaded() {
        let mem = Hub75Memory::<24, 12>::new();
        assert!(unsafe { core::slice::from_raw_parts(mem.front_buffer_ptr(), 24) }
            .iter()
            .all(|&b| b == 0));
    }

    #[test]
    fn load_then_clear_leaves_front_buffer_alone_until_flip() {
        let mut mem = Hub75Memory::<24, 12>::new();
        mem.bind();
        mem.set_gamma(Gamma::None, 6);
        let front_before = snapshot(&mem);
        let src = [0xFFu8; 2 * 4 * 3];
        mem.load_rgb888(&src, 2, 2, 6).unwrap();
        assert_eq!(snapshot(&mem), front_before);
        mem.flip();
        assert_ne!(snapshot(&mem), front_before);
    }

    fn snapshot(mem: &Hub75Memory<24, 12>) -> [u8; 24] {
        let mut out = [0u8; 24];
        out.copy_from_slice(unsafe { core::slice::from_raw_parts(mem.front_buffer_ptr(), 24) });
        out
    }

    #[test]
    fn set_encoded_pixel_writes_back_buffer_only_until_flip() {
        let mut mem = Hub75Memory::<6, 12>::new(); // width=1, rows=1, bitplanes=6
        mem.bind();
        let front_before = snapshot6(&mem);
        mem.set_encoded_pixel(0, 0, true, 0x3F, 0, 0, 1, 6);
        assert_eq!(snapshot6(&mem), front_before);
        mem.flip();
        assert_eq!(snapshot6(&mem)[0], 0x80);
    }

    fn snapshot6(mem: &Hub75Memory<6, 12>) -> [u8; 6] {
        let mut out = [0u8; 6];
        out.copy_from_slice(unsafe { core::slice::from_raw_parts(mem.front_buffer_ptr(), 6) });
        out
    }
}
