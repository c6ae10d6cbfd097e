//! Buffer constraints imposed by the board's sample memory.
//!
//! `channels * 2 * samples_per_channel` must stay below 1 048 576 and fill the
//! 131 072-word memory blocks evenly: either a whole number of blocks or an
//! exact fraction of one. Samples per channel must be even.

use crate::config::{ChannelCount, ConfigError};

pub const MAX_BUFFER_WORDS: u64 = 1_048_576;
pub const BLOCK_WORDS: u64 = 131_072;
pub const DEFAULT_SAMPLES_PER_CHANNEL: u32 = 1024;

fn buffer_words(channels: ChannelCount, samples_per_channel: u32) -> u64 {
    u64::from(channels.count()) * 2 * u64::from(samples_per_channel)
}

/// Accepts only the exact power-of-two tiers 1, 2, 4 ... 256.
pub fn channel_count(count: u32) -> Result<ChannelCount, ConfigError> {
    ChannelCount::covering(count)
        .filter(|channels| channels.count() == count)
        .ok_or(ConfigError::InvalidChannelCount(count))
}

pub fn is_admissible(channels: ChannelCount, samples_per_channel: u32) -> bool {
    if samples_per_channel == 0 || samples_per_channel % 2 != 0 {
        return false;
    }
    let words = buffer_words(channels, samples_per_channel);
    words < MAX_BUFFER_WORDS && (words % BLOCK_WORDS == 0 || BLOCK_WORDS % words == 0)
}

/// Largest admissible samples-per-channel that does not exceed `requested`.
pub fn nearest_admissible(channels: ChannelCount, requested: u32) -> Option<u32> {
    let ceiling = (MAX_BUFFER_WORDS - 1) / (2 * u64::from(channels.count()));
    let start = u64::from(requested).min(ceiling) as u32;
    (1..=start)
        .rev()
        .find(|&samples| is_admissible(channels, samples))
}

/// Checks a requested channel/sample count pair before any device access.
///
/// A rejected sample count is never adjusted; the nearest admissible value is
/// only reported in the error.
pub fn validate(channels: u32, samples_per_channel: u32) -> Result<ChannelCount, ConfigError> {
    let count = channel_count(channels)?;
    if samples_per_channel == 0 || samples_per_channel % 2 != 0 {
        return Err(ConfigError::InvalidSampleCount(samples_per_channel));
    }
    if !is_admissible(count, samples_per_channel) {
        return Err(ConfigError::UnsatisfiableSampleCount {
            channels,
            samples: samples_per_channel,
            suggestion: nearest_admissible(count, samples_per_channel),
        });
    }
    Ok(count)
}
