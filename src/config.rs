//! Acquisition parameters.
//!
//! Every packed field has its own type so that out-of-range values are caught
//! when the configuration is assembled, not when registers are written.

use bit_field::BitField;

use crate::validate::{self, validate};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid channel count {0}: must be a power of two between 1 and 256")]
    InvalidChannelCount(u32),

    #[error("invalid samples per channel {0}: must be positive and even")]
    InvalidSampleCount(u32),

    #[error("{channels} channels x {samples} samples violates the board's buffer constraint")]
    UnsatisfiableSampleCount {
        channels: u32,
        samples: u32,
        suggestion: Option<u32>,
    },

    #[error("timing bound {0} out of range 1..=16777216")]
    TimingBoundOutOfRange(u32),

    #[error("clock divider half {0} does not fit in 4 bits")]
    ClockDividerOutOfRange(u8),
}

impl ConfigError {
    /// Nearest admissible samples-per-channel below a rejected request, if any.
    pub fn suggestion(&self) -> Option<u32> {
        match self {
            ConfigError::UnsatisfiableSampleCount { suggestion, .. } => *suggestion,
            _ => None,
        }
    }
}

/// Power-of-two channel count, stored as its channel code (log2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelCount(u8);

impl ChannelCount {
    pub const MAX_CODE: u8 = 8;

    /// Channel count for a ladder index in `0..=8`.
    pub const fn from_code(code: u8) -> Option<Self> {
        if code <= Self::MAX_CODE {
            Some(Self(code))
        } else {
            None
        }
    }

    /// Smallest channel code whose channel count covers `count`.
    ///
    /// Returns `None` above 256 channels. Callers that must reject counts off
    /// the ladder compare [`ChannelCount::count`] with the request.
    pub fn covering(count: u32) -> Option<Self> {
        (0..=Self::MAX_CODE)
            .find(|code| (1u32 << code) >= count)
            .map(Self)
    }

    pub const fn code(self) -> u8 {
        self.0
    }

    pub const fn count(self) -> u32 {
        1 << self.0
    }
}

/// One edge of the conversion window, in master clock cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingBound(u32);

impl TimingBound {
    pub const MAX: u32 = 1 << 24;

    pub const fn new(cycles: u32) -> Result<Self, ConfigError> {
        if cycles >= 1 && cycles <= Self::MAX {
            Ok(Self(cycles))
        } else {
            Err(ConfigError::TimingBoundOutOfRange(cycles))
        }
    }

    pub const fn cycles(self) -> u32 {
        self.0
    }
}

/// High and low phase of a clock divider, 4 bits each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockDivider {
    high: u8,
    low: u8,
}

impl ClockDivider {
    pub const fn new(high: u8, low: u8) -> Result<Self, ConfigError> {
        if high > 0x0F {
            Err(ConfigError::ClockDividerOutOfRange(high))
        } else if low > 0x0F {
            Err(ConfigError::ClockDividerOutOfRange(low))
        } else {
            Ok(Self { high, low })
        }
    }

    pub const fn high(self) -> u8 {
        self.high
    }

    pub const fn low(self) -> u8 {
        self.low
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionMode {
    FreeRun = 0,
    Low = 2,
    High = 3,
}

/// Conversion wait counters and clock delay. The board honours these
/// registers but they are absent from its register documentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionWait {
    pub low: u16,
    pub high: u16,
    pub clock_delay_around_conv: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingConfig {
    pub conv_low: TimingBound,
    pub conv_high: TimingBound,
    pub conversion_mode: ConversionMode,
    pub ddc_clock: ClockDivider,
    pub ddc_clock_enabled: bool,
    pub data_clock: ClockDivider,
    pub data_clock_enabled: bool,
    pub ndvalid_ignore: u8,
    pub dclk_wait_mclk: u16,
    pub din_clock: ClockDivider,
    pub conversion_wait: Option<ConversionWait>,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            conv_low: TimingBound(1600),
            conv_high: TimingBound(1600),
            conversion_mode: ConversionMode::FreeRun,
            ddc_clock: ClockDivider { high: 7, low: 7 },
            ddc_clock_enabled: true,
            data_clock: ClockDivider { high: 0, low: 0 },
            data_clock_enabled: true,
            ndvalid_ignore: 255,
            dclk_wait_mclk: 13000,
            din_clock: ClockDivider { high: 3, low: 3 },
            conversion_wait: Some(ConversionWait {
                low: 1550,
                high: 1550,
                clock_delay_around_conv: 0,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    Bits16,
    Bits20,
}

impl SampleFormat {
    pub const fn flag(self) -> u8 {
        match self {
            SampleFormat::Bits16 => 0,
            SampleFormat::Bits20 => 1,
        }
    }
}

/// Full-scale input range of the converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Range {
    Pc12_5 = 0,
    Pc50 = 1,
    Pc100 = 2,
    Pc150 = 3,
}

/// The converter's own 16-bit configuration word, sent as CFGHIGH/CFGLOW.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DdcConfig {
    pub clock_divide: bool,
    pub range: Range,
    pub format: SampleFormat,
    pub speed: bool,
    pub slew: bool,
    pub test: bool,
}

impl Default for DdcConfig {
    fn default() -> Self {
        Self {
            clock_divide: false,
            range: Range::Pc150,
            format: SampleFormat::Bits20,
            speed: false,
            slew: false,
            test: false,
        }
    }
}

impl DdcConfig {
    /// Bits 15..8 of the configuration word.
    pub fn high_byte(&self) -> u8 {
        let mut byte = 0u8;
        byte.set_bit(5, self.clock_divide);
        byte.set_bits(1..=2, self.range as u8);
        byte.set_bit(0, self.format == SampleFormat::Bits20);
        byte
    }

    /// Bits 7..0 of the configuration word.
    pub fn low_byte(&self) -> u8 {
        let mut byte = 0u8;
        byte.set_bit(7, self.speed);
        byte.set_bit(4, self.slew);
        byte.set_bit(0, self.test);
        byte
    }
}

/// A validated acquisition request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionConfig {
    channels: ChannelCount,
    samples_per_channel: u32,
    pub timing: TimingConfig,
    pub ddc: DdcConfig,
}

impl AcquisitionConfig {
    pub fn new(
        channels: u32,
        samples_per_channel: u32,
        timing: TimingConfig,
        ddc: DdcConfig,
    ) -> Result<Self, ConfigError> {
        let channels = validate(channels, samples_per_channel)?;
        Ok(Self {
            channels,
            samples_per_channel,
            timing,
            ddc,
        })
    }

    /// Reference board settings with the given channel and sample counts.
    pub fn with_counts(channels: u32, samples_per_channel: u32) -> Result<Self, ConfigError> {
        Self::new(
            channels,
            samples_per_channel,
            TimingConfig::default(),
            DdcConfig::default(),
        )
    }

    pub fn channels(&self) -> ChannelCount {
        self.channels
    }

    pub fn samples_per_channel(&self) -> u32 {
        self.samples_per_channel
    }

    /// Length of the sample buffer a capture fills.
    pub fn sample_count(&self) -> usize {
        self.channels.count() as usize * self.samples_per_channel as usize
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            channels: ChannelCount(4),
            samples_per_channel: validate::DEFAULT_SAMPLES_PER_CHANNEL,
            timing: TimingConfig::default(),
            ddc: DdcConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_code_round_trips() {
        for code in 0..=ChannelCount::MAX_CODE {
            let channels = ChannelCount::from_code(code).unwrap();
            assert_eq!(channels.count(), 1 << code);
            assert_eq!(ChannelCount::covering(channels.count()), Some(channels));
        }
        assert_eq!(ChannelCount::from_code(9), None);
    }

    #[test]
    fn covering_widens_to_next_tier() {
        assert_eq!(ChannelCount::covering(3).map(ChannelCount::count), Some(4));
        assert_eq!(ChannelCount::covering(200).map(ChannelCount::count), Some(256));
        assert_eq!(ChannelCount::covering(257), None);
    }

    #[test]
    fn timing_bound_range() {
        assert!(TimingBound::new(0).is_err());
        assert!(TimingBound::new(1).is_ok());
        assert!(TimingBound::new(1 << 24).is_ok());
        assert_eq!(
            TimingBound::new((1 << 24) + 1),
            Err(ConfigError::TimingBoundOutOfRange((1 << 24) + 1))
        );
    }

    #[test]
    fn clock_divider_halves_are_nibbles() {
        assert!(ClockDivider::new(15, 15).is_ok());
        assert_eq!(
            ClockDivider::new(16, 0),
            Err(ConfigError::ClockDividerOutOfRange(16))
        );
        assert_eq!(
            ClockDivider::new(0, 20),
            Err(ConfigError::ClockDividerOutOfRange(20))
        );
    }

    #[test]
    fn reference_ddc_word() {
        let ddc = DdcConfig::default();
        assert_eq!(ddc.high_byte(), 0b0000_0111);
        assert_eq!(ddc.low_byte(), 0);

        let ddc = DdcConfig {
            clock_divide: true,
            range: Range::Pc50,
            format: SampleFormat::Bits16,
            speed: true,
            slew: true,
            test: true,
        };
        assert_eq!(ddc.high_byte(), 0b0010_0010);
        assert_eq!(ddc.low_byte(), 0b1001_0001);
    }

    #[test]
    fn default_config_is_admissible() {
        let config = AcquisitionConfig::default();
        assert_eq!(
            AcquisitionConfig::with_counts(16, 1024),
            Ok(config.clone())
        );
        assert_eq!(config.sample_count(), 16384);
    }

    #[test]
    fn invalid_counts_are_rejected() {
        assert_eq!(
            AcquisitionConfig::with_counts(12, 1024),
            Err(ConfigError::InvalidChannelCount(12))
        );
        assert_eq!(
            AcquisitionConfig::with_counts(16, 1023),
            Err(ConfigError::InvalidSampleCount(1023))
        );
    }
}
