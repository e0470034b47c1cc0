//! Error types for the Hub75 display engine.

/// Errors the driver can surface.
///
/// `ConfigError` is fatal for the driver instance and is only ever returned
/// from [`crate::Hub75::new`]. `SizeMismatch` is returned from the `load_*`
/// encoders and leaves the back buffer untouched. `ShutdownTimeout` should be
/// unreachable in normal operation — see [`crate::Hub75::deinit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum Error {
    /// The byte slice passed to `load_rgb888`/`load_rgb565` does not match
    /// the panel's expected geometry.
    SizeMismatch { expected: usize, got: usize },
    /// Geometry or pin configuration passed to `new` is not realizable.
    ConfigError(ConfigError),
    /// `deinit` could not observe the DMA ring stop within the expected
    /// number of polls. Reaching this indicates wedged hardware, not a
    /// software race.
    ShutdownTimeout,
}

/// Specific reasons a [`crate::config::Hub75Config`] was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum ConfigError {
    /// `address_bits` must be in `1..=5` — a HUB75 `OUT` group can drive at
    /// most 5 address lines, and `0` address lines means no scanning at all.
    InvalidAddressBits(u32),
    /// `bitplanes` must be in `1..=8`; wider BCM words than that don't fit a
    /// packed byte's six lane bits per the C1 wire-format contract.
    InvalidBitplaneCount(usize),
    /// `width` must be nonzero and must fit the data SM's column counter.
    InvalidWidth(usize),
    /// The const-generic buffer capacities passed to [`crate::memory::Hub75Memory`]
    /// don't match `width`/`address_bits`/`bitplanes`.
    BufferSizeMismatch { expected: usize, got: usize },
    /// `base_data_pin..base_data_pin+6`, `base_address_pin..+address_bits`,
    /// `base_clock_pin..+2`, and `output_enable_pin` overlap.
    OverlappingPins,
}

pub type Result<T> = core::result::Result<T, Error>;

impl From<ConfigError> for Error {
    fn from(value: ConfigError) -> Self {
        Error::ConfigError(value)
    }
}
