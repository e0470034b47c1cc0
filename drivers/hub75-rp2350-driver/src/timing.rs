//! Per-bitplane OE timing words (C3): the off/on cycle counts fed to the
//! address PIO program, plus the refresh-rate estimator and fitter used by
//! `Hub75::set_target_refresh_rate`.

/// Fixed PIO overhead constants the estimator folds in, named for the
/// instructions they stand in for in `pio.rs`'s address/data programs.
mod overhead {
    /// One `mov x, isr`/`mov y, osr` reload per row.
    pub const DATA_RELOAD_CYCLES: u32 = 1;
    /// `out pins, 8` + `jmp x--` per column.
    pub const DATA_CYCLES_PER_COLUMN: u32 = 2;
    /// Row/bitplane counter bookkeeping and the `irq`/`mov pins` pair in
    /// the address program's `write_address` path.
    pub const ADDRESS_FIXED_CYCLES: u32 = 8;
    /// `irq` + `wait` handshake pair with the data SM.
    pub const ADDRESS_HANDSHAKE_CYCLES: u32 = 2;
    /// Extra settling cycles the address program burns moving between
    /// bitplanes (the `jmp y--`/reload path).
    pub const BITPLANE_TRANSITION_EXTRA: u32 = 3;
}

/// Off/on cycle-count pair for one bitplane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub struct TimingWord {
    pub off: u32,
    pub on: u32,
}

/// Compute the `(off, on)` pair for bitplane `i` per §4.3's formulas.
///
/// `window_i = base_cycles << i` grows exponentially so each bitplane's
/// "on" dwell time is twice the previous one's — this is binary-code
/// modulation, not PWM with equal slices.
pub fn bitplane_timing(
    bitplane: u32,
    base_cycles: u32,
    brightness: f32,
    blanking_cycles: u32,
) -> TimingWord {
    let window = base_cycles.checked_shl(bitplane).unwrap_or(u32::MAX);
    let on = (brightness.clamp(0.0, 1.0) * window as f32).floor() as u32;
    let on = on.min(window);
    let off = (window - on) / 2 + blanking_cycles;
    TimingWord { off, on }
}

/// `blanking_ns` converted to PIO cycles at `system_clock_hz`.
pub fn blanking_cycles(blanking_ns: u32, system_clock_hz: u32) -> u32 {
    ((blanking_ns as u64) * (system_clock_hz as u64) / 1_000_000_000) as u32
}

/// Fill `timing` (length `2 * bitplanes`) with little-endian
/// `[off_0, on_0, off_1, on_1, ...]` words for the address SM's DMA pair.
///
/// `timing.len()` must be exactly `2 * bitplanes`; the caller (`memory.rs`)
/// guarantees this via its const-generic `TIMING_WORDS` parameter.
pub fn fill_timing_buffer(
    timing: &mut [u32],
    bitplanes: usize,
    base_cycles: u32,
    brightness: f32,
    blanking_ns: u32,
    system_clock_hz: u32,
) {
    let blanking = blanking_cycles(blanking_ns, system_clock_hz);
    for i in 0..bitplanes {
        let word = bitplane_timing(i as u32, base_cycles, brightness, blanking);
        timing[2 * i] = word.off;
        timing[2 * i + 1] = word.on;
    }
}

/// Cycles (in `system_clock_hz` units) the data SM spends per row,
/// converted from its own `2 * data_frequency_hz` clock domain into the
/// address SM's `system_clock_hz` domain so the two are comparable.
fn data_cycles_scaled(width: usize, data_frequency_hz: u32, system_clock_hz: u32) -> u32 {
    let data_cycles =
        overhead::DATA_RELOAD_CYCLES + overhead::DATA_CYCLES_PER_COLUMN * width as u32;
    let ratio = system_clock_hz as f32 / (2.0 * data_frequency_hz as f32);
    (data_cycles as f32 * ratio).ceil() as u32
}

/// Estimate the achievable refresh rate (Hz) for a given geometry and
/// timing configuration, per §4.3's closed-form estimator.
pub fn estimate_refresh_hz(
    width: usize,
    address_bits: u32,
    bitplanes: usize,
    base_cycles: u32,
    brightness: f32,
    blanking_ns: u32,
    data_frequency_hz: u32,
    system_clock_hz: u32,
) -> f32 {
    let rows = 1u64 << address_bits;
    let blanking = blanking_cycles(blanking_ns, system_clock_hz);
    let data_cycles = data_cycles_scaled(width, data_frequency_hz, system_clock_hz) as u64;

    let mut frame_cycles: u64 = 0;
    for i in 0..bitplanes {
        let word = bitplane_timing(i as u32, base_cycles, brightness, blanking);
        let address_cycles = (overhead::ADDRESS_FIXED_CYCLES
            + overhead::ADDRESS_HANDSHAKE_CYCLES
            + word.off * 2
            + word.on) as u64;
        let row_time = address_cycles.max(data_cycles) + overhead::BITPLANE_TRANSITION_EXTRA as u64;
        frame_cycles += row_time;
    }
    frame_cycles = frame_cycles.saturating_mul(rows);

    if frame_cycles == 0 {
        return 0.0;
    }
    system_clock_hz as f32 / frame_cycles as f32
}

/// Parameters `estimate_refresh_hz` needs besides `base_cycles`, bundled so
/// the fitter below doesn't take an eleven-argument function pointer.
#[derive(Debug, Clone, Copy)]
pub struct RefreshEstimateInputs {
    pub width: usize,
    pub address_bits: u32,
    pub bitplanes: usize,
    pub brightness: f32,
    pub blanking_ns: u32,
    pub data_frequency_hz: u32,
    pub system_clock_hz: u32,
}

impl RefreshEstimateInputs {
    fn estimate(&self, base_cycles: u32) -> f32 {
        estimate_refresh_hz(
            self.width,
            self.address_bits,
            self.bitplanes,
            base_cycles,
            self.brightness,
            self.blanking_ns,
            self.data_frequency_hz,
            self.system_clock_hz,
        )
    }
}

/// Binary search over `base_cycles` for the value whose estimated refresh
/// rate is closest to `target_hz`, per §4.3's "Refresh-rate fitting".
///
/// `estimate_refresh_hz` is strictly decreasing in `base_cycles` (a larger
/// base window means a longer frame), so the search first grows an upper
/// bound by doubling until its estimate drops below the target, then
/// bisects, then compares the two candidates that bracket the target and
/// keeps the closer one.
pub fn fit_base_cycles(target_hz: f32, inputs: &RefreshEstimateInputs) -> (u32, f32) {
    let mut lo: u32 = 1;
    let mut hi: u32 = 1;
    while inputs.estimate(hi) > target_hz {
        match hi.checked_mul(2) {
            Some(next) => hi = next,
            None => break,
        }
    }

    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if inputs.estimate(mid) > target_hz {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    // `hi` is now the smallest base_cycles whose estimate is <= target_hz.
    let candidate_hi = hi.max(1);
    let candidate_lo = candidate_hi.saturating_sub(1).max(1);

    let est_hi = inputs.estimate(candidate_hi);
    let est_lo = inputs.estimate(candidate_lo);

    if (est_lo - target_hz).abs() <= (est_hi - target_hz).abs() {
        (candidate_lo, est_lo)
    } else {
        (candidate_hi, est_hi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_brightness_has_no_on_window() {
        let word = bitplane_timing(3, 10, 0.0, 0);
        assert_eq!(word.on, 0);
    }

    #[test]
    fn full_brightness_no_blanking_has_no_off_window() {
        let word = bitplane_timing(0, 16, 1.0, 0);
        assert_eq!(word.off, 0);
        assert_eq!(word.on, 16);
    }

    #[test]
    fn window_doubles_each_bitplane() {
        let w0 = bitplane_timing(0, 4, 1.0, 0);
        let w1 = bitplane_timing(1, 4, 1.0, 0);
        let w2 = bitplane_timing(2, 4, 1.0, 0);
        assert_eq!(w1.on, w0.on * 2);
        assert_eq!(w2.on, w1.on * 2);
    }

    #[test]
    fn fill_timing_buffer_matches_per_bitplane_computation() {
        let mut buf = [0u32; 12];
        fill_timing_buffer(&mut buf, 6, 8, 0.5, 100, 125_000_000);
        let blanking = blanking_cycles(100, 125_000_000);
        for i in 0..6 {
            let word = bitplane_timing(i as u32, 8, 0.5, blanking);
            assert_eq!(buf[2 * i], word.off);
            assert_eq!(buf[2 * i + 1], word.on);
        }
    }

    #[test]
    fn refresh_rate_decreases_as_base_cycles_grows() {
        let inputs = RefreshEstimateInputs {
            width: 64,
            address_bits: 4,
            bitplanes: 6,
            brightness: 1.0,
            blanking_ns: 0,
            data_frequency_hz: 15_000_000,
            system_clock_hz: 125_000_000,
        };
        let fast = inputs.estimate(1);
        let slow = inputs.estimate(64);
        assert!(slow < fast);
    }

    #[test]
    fn fit_base_cycles_brackets_target_s5() {
        let inputs = RefreshEstimateInputs {
            width: 64,
            address_bits: 4,
            bitplanes: 6,
            brightness: 1.0,
            blanking_ns: 0,
            data_frequency_hz: 15_000_000,
            system_clock_hz: 125_000_000,
        };
        let (_base_cycles, achieved) = fit_base_cycles(120.0, &inputs);
        assert!(achieved >= 108.0 && achieved <= 132.0);
    }
}
