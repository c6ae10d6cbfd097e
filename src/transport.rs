//! Primitive device operations the sequencer is written against.

use crate::config::ChannelCount;
use crate::register_map::RegisterWriteSet;
use crate::registers::RegisterSnapshot;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Non-zero status reported by a device primitive, passed through verbatim.
    #[error("status {0}")]
    Status(i32),

    #[error("usb transfer error: {0}")]
    UsbTransferError(nusb::transfer::TransferError),

    #[error("io error: {0}")]
    IoError(std::io::Error),

    #[error("could not read device descriptors: {0}")]
    Descriptor(String),
}

impl TransportError {
    /// Numeric status to surface to the operator, if the failure carried one.
    pub fn status(&self) -> Option<i32> {
        match self {
            TransportError::Status(status) => Some(*status),
            _ => None,
        }
    }
}

/// Which half of the dual integrator the sample stream starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    AFirst,
    BFirst,
}

impl ChannelOrder {
    /// Derived from the first byte of the first data chunk.
    pub fn from_marker(marker: u8) -> Self {
        if marker == 0x80 {
            ChannelOrder::AFirst
        } else {
            ChannelOrder::BFirst
        }
    }
}

pub trait Transport {
    /// Soft reset of the converter.
    fn reset(&mut self) -> Result<(), TransportError>;

    /// Resets the configuration state machine and clears pending triggers.
    fn clear_triggers(&mut self) -> Result<(), TransportError>;

    /// Shifts the converter's configuration word into the device.
    fn configure(&mut self, cfg_high: u8, cfg_low: u8) -> Result<(), TransportError>;

    /// Writes the enabled registers of `writes`, then reads every register back.
    fn transfer_registers(
        &mut self,
        writes: &RegisterWriteSet,
    ) -> Result<RegisterSnapshot, TransportError>;

    /// Runs one capture and fills `samples`, which holds
    /// `channels * samples_per_channel` entries.
    fn capture(
        &mut self,
        channels: ChannelCount,
        samples_per_channel: u32,
        samples: &mut [i32],
    ) -> Result<ChannelOrder, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn reset(&mut self) -> Result<(), TransportError> {
        (**self).reset()
    }

    fn clear_triggers(&mut self) -> Result<(), TransportError> {
        (**self).clear_triggers()
    }

    fn configure(&mut self, cfg_high: u8, cfg_low: u8) -> Result<(), TransportError> {
        (**self).configure(cfg_high, cfg_low)
    }

    fn transfer_registers(
        &mut self,
        writes: &RegisterWriteSet,
    ) -> Result<RegisterSnapshot, TransportError> {
        (**self).transfer_registers(writes)
    }

    fn capture(
        &mut self,
        channels: ChannelCount,
        samples_per_channel: u32,
        samples: &mut [i32],
    ) -> Result<ChannelOrder, TransportError> {
        (**self).capture(channels, samples_per_channel, samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_0x80_marks_a_first() {
        assert_eq!(ChannelOrder::from_marker(0x80), ChannelOrder::AFirst);
        for marker in (0..=u8::MAX).filter(|&marker| marker != 0x80) {
            assert_eq!(ChannelOrder::from_marker(marker), ChannelOrder::BFirst);
        }
    }

    #[test]
    fn only_status_failures_carry_a_code() {
        assert_eq!(TransportError::Status(-4).status(), Some(-4));
        let err = TransportError::IoError(std::io::Error::other("gone"));
        assert_eq!(err.status(), None);
    }
}
