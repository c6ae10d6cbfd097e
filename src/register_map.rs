//! Translation of an [`AcquisitionConfig`] into FPGA register writes.

use bit_field::BitField;

use crate::config::{AcquisitionConfig, ChannelCount, ClockDivider, SampleFormat, TimingBound};
use crate::registers::{REGISTER_COUNT, RegisterAddress};

/// Sparse set of register writes. Registers that were never set stay
/// disabled and keep whatever value the board currently holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterWriteSet {
    values: [u8; REGISTER_COUNT],
    enabled: [bool; REGISTER_COUNT],
}

impl Default for RegisterWriteSet {
    fn default() -> Self {
        Self {
            values: [0; REGISTER_COUNT],
            enabled: [false; REGISTER_COUNT],
        }
    }
}

impl RegisterWriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, address: RegisterAddress, value: u8) {
        self.values[address.index()] = value;
        self.enabled[address.index()] = true;
    }

    pub fn get(&self, address: RegisterAddress) -> Option<u8> {
        self.enabled[address.index()].then_some(self.values[address.index()])
    }

    pub fn is_enabled(&self, address: RegisterAddress) -> bool {
        self.enabled[address.index()]
    }

    /// Enabled registers in ascending address order.
    pub fn iter(&self) -> impl Iterator<Item = (RegisterAddress, u8)> + '_ {
        RegisterAddress::all().filter_map(|address| Some((address, self.get(address)?)))
    }

    pub fn len(&self) -> usize {
        self.enabled.iter().filter(|&&enabled| enabled).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `X - 1` as three big-endian bytes (MSB, MidB, LSB).
pub fn split_bound(bound: TimingBound) -> [u8; 3] {
    let [_, msb, mid, lsb] = (bound.cycles() - 1).to_be_bytes();
    [msb, mid, lsb]
}

/// Divider high phase in the upper nibble, low phase in the lower one.
pub fn pack_divider(divider: ClockDivider) -> u8 {
    let mut byte = 0u8;
    byte.set_bits(4..8, divider.high());
    byte.set_bits(0..4, divider.low());
    byte
}

/// Format flag in bit 4 above the channel code.
pub fn pack_format_channels(format: SampleFormat, channels: ChannelCount) -> u8 {
    let mut byte = 0u8;
    byte.set_bits(0..4, channels.code());
    byte.set_bit(4, format.flag() == 1);
    byte
}

fn set_bound(
    set: &mut RegisterWriteSet,
    [msb, mid, lsb]: [RegisterAddress; 3],
    bound: TimingBound,
) {
    let [hi, mi, lo] = split_bound(bound);
    set.set(msb, hi);
    set.set(mid, mi);
    set.set(lsb, lo);
}

pub fn build_register_map(config: &AcquisitionConfig) -> RegisterWriteSet {
    use RegisterAddress as R;

    let timing = &config.timing;
    let format = config.ddc.format;
    let mut set = RegisterWriteSet::new();

    set_bound(
        &mut set,
        [R::CONV_LOW_MSB, R::CONV_LOW_MID, R::CONV_LOW_LSB],
        timing.conv_low,
    );
    set_bound(
        &mut set,
        [R::CONV_HIGH_MSB, R::CONV_HIGH_MID, R::CONV_HIGH_LSB],
        timing.conv_high,
    );

    set.set(R::DIVXCLK, pack_divider(timing.ddc_clock));
    set.set(R::DDC_CLK_SEL, timing.ddc_clock_enabled.into());
    set.set(
        R::FORMAT_CHANNELS,
        pack_format_channels(format, config.channels()),
    );
    set.set(R::DIVXCLK_DATA, pack_divider(timing.data_clock));
    set.set(R::DDC_DATA_CLK_SEL, timing.data_clock_enabled.into());

    set.set(R::NDVALID_IGNORE, timing.ndvalid_ignore);
    let [lsb, mid, msb, _] = config.samples_per_channel().to_le_bytes();
    set.set(R::NDVALID_READ_LSB, lsb);
    set.set(R::NDVALID_READ_MID, mid);
    set.set(R::NDVALID_READ_MSB, msb);

    let [msb, lsb] = timing.dclk_wait_mclk.to_be_bytes();
    set.set(R::DCLK_WAIT_MSB, msb);
    set.set(R::DCLK_WAIT_LSB, lsb);

    set.set(R::FORMAT_DIN_CFG, format.flag());
    set.set(R::DIN_CLK_DIV, pack_divider(timing.din_clock));
    set.set(R::CONV_CONFIG, timing.conversion_mode as u8);

    if let Some(wait) = timing.conversion_wait {
        let [msb, lsb] = wait.low.to_be_bytes();
        set.set(R::CONV_WAIT_LOW_MSB, msb);
        set.set(R::CONV_WAIT_LOW_LSB, lsb);
        let [msb, lsb] = wait.high.to_be_bytes();
        set.set(R::CONV_WAIT_HIGH_MSB, msb);
        set.set(R::CONV_WAIT_HIGH_LSB, lsb);
        set.set(R::CLKDELAY_AROUND_CONV, wait.clock_delay_around_conv);
    }

    set
}
