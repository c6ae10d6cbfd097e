//! Register address space of the EVM's FPGA.
//!
//! The board exposes 255 byte-wide registers (0x00..=0xFE). Only a subset has a
//! published name; everything else reads back as `UNKNOWN`.

use std::fmt;

/// Number of register slots transferred on every register read/write.
pub const REGISTER_COUNT: usize = 255;

/// Address of one FPGA register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegisterAddress(u8);

impl RegisterAddress {
    pub const NO_OP: Self = Self(0x00);
    pub const CONV_LOW_MSB: Self = Self(0x01);
    pub const CONV_LOW_MID: Self = Self(0x02);
    pub const CONV_LOW_LSB: Self = Self(0x03);
    pub const CONV_HIGH_MSB: Self = Self(0x04);
    pub const CONV_HIGH_MID: Self = Self(0x05);
    pub const CONV_HIGH_LSB: Self = Self(0x06);
    pub const DIVXCLK: Self = Self(0x07);
    pub const DDC_CLK_SEL: Self = Self(0x08);
    pub const FORMAT_CHANNELS: Self = Self(0x09);
    pub const DIVXCLK_DATA: Self = Self(0x0A);
    pub const DDC_DATA_CLK_SEL: Self = Self(0x0B);
    pub const NDVALID_IGNORE: Self = Self(0x0C);
    pub const NDVALID_READ_LSB: Self = Self(0x0D);
    pub const NDVALID_READ_MID: Self = Self(0x0E);
    pub const NDVALID_READ_MSB: Self = Self(0x0F);
    pub const DCLK_WAIT_MSB: Self = Self(0x13);
    pub const DCLK_WAIT_LSB: Self = Self(0x14);
    pub const FORMAT_DIN_CFG: Self = Self(0x1F);
    pub const DIN_CLK_DIV: Self = Self(0x20);
    pub const CONV_WAIT_LOW_MSB: Self = Self(0x51);
    pub const CONV_WAIT_LOW_LSB: Self = Self(0x52);
    pub const CONV_WAIT_HIGH_MSB: Self = Self(0x53);
    pub const CONV_WAIT_HIGH_LSB: Self = Self(0x54);
    pub const RESET_CONV: Self = Self(0x56);
    pub const CONV_CONFIG: Self = Self(0x57);
    pub const FIRMWARE_VERSION_MSB: Self = Self(0x5E);
    pub const FIRMWARE_VERSION_LSB: Self = Self(0x5F);
    pub const READ_OUT_TRIGGER: Self = Self(0xD0);
    pub const CLKDELAY_AROUND_CONV: Self = Self(0xEB);

    /// Returns `None` for 0xFF, which is a command opcode rather than a register.
    pub const fn new(address: u8) -> Option<Self> {
        if (address as usize) < REGISTER_COUNT {
            Some(Self(address))
        } else {
            None
        }
    }

    pub const fn value(self) -> u8 {
        self.0
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Iterates over the whole address space in ascending order.
    pub fn all() -> impl Iterator<Item = Self> {
        (0..REGISTER_COUNT as u8).map(Self)
    }

    /// Human readable register name, for diagnostics only.
    pub fn name(self) -> &'static str {
        match self.0 {
            0x00 => "No Op",
            0x01 => "CONV_LOW_REG_MSB",
            0x02 => "CONV_LOW_REG_MidB",
            0x03 => "CONV_LOW_REG_LSB",
            0x04 => "CONV_HIGH_REG_MSB",
            0x05 => "CONV_HIGH_REG_MidB",
            0x06 => "CONV_HIGH_REG_LSB",
            0x07 => "DIVXCLK_REGS",
            0x08 => "DDC_CLK_SEL",
            0x09 => "FORMAT[4],CHANNELS",
            0x0A => "DIVXCLK_DATA_REGS",
            0x0B => "DDC_DATA_CLK_SEL",
            0x0C => "nDVALIDS_IGNORE",
            0x0D => "nDVALIDS_READ_LSB",
            0x0E => "nDVALIDS_READ_MidB",
            0x0F => "nDVALIDS_READ_MSB",
            0x10 => "DONE[1],START_CONVERSIONS[0]",
            0x11 => "CLK_CFG",
            0x12 => "DIN_CFG",
            0x13 => "DCLK_WAIT_COUNT_MSB",
            0x14 => "DCLK_WAIT_COUNT_LSB",
            0x15 => "DDC_RESETN",
            0x16 => "HARDWARE_TRIGGER_EN",
            0x1A => "DCLK_SELECT_MANUAL_OR_AUTO",
            0x1B => "DOUT_IN[1],DCLK_MANUAL_SET_VALUE[0]",
            0x1C => "DDC CFGHIGH",
            0x1D => "DDC CFGLOW",
            0x1E => "TRIGGER",
            0x1F => "FORMAT_DIN_CFG",
            0x20 => "REG_FREQ_DIV_DIN_CLK_HIGH[3:0],REG_FREQ_DIV_DIN_CLK_LOW[3:0]",
            0x22 => "DDC Daughter Card Select",
            0x23..=0x26 => "RESERVED",
            0x51 => "CONV_WAIT_LOW_REG_MSB",
            0x52 => "CONV_WAIT_LOW_REG_LSB",
            0x53 => "CONV_WAIT_HIGH_REG_MSB",
            0x54 => "CONV_WAIT_HIGH_REG_LSB",
            0x55 => "NON_CONT",
            0x56 => "RESET_CONV",
            0x57 => "CONV_CONFIG",
            0x5E => "FIRMWARE_VERSION_MSB",
            0x5F => "FIRMWARE_VERSION_LSB",
            0xD0 => "read_out_trigger",
            0xD1 => "RESERVED",
            0xDA => "TRIGGER_READ_AVG_RAM",
            0xDB => "STOP_ADDR_MSB",
            0xDC => "STOP_ADDR_LSB",
            0xDD => "AB_AVG_SEL",
            0xDE => "USE_RAM_CHIPS",
            0xE0..=0xE5 => "RESERVED",
            0xEB => "CLKDELAY_AROUND_CONV",
            _ => "UNKNOWN",
        }
    }
}

impl fmt::Display for RegisterAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [0x{:02X}]", self.name(), self.0)
    }
}

/// Register values read back from the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterSnapshot {
    values: [u8; REGISTER_COUNT],
}

impl Default for RegisterSnapshot {
    fn default() -> Self {
        Self {
            values: [0; REGISTER_COUNT],
        }
    }
}

impl RegisterSnapshot {
    pub fn get(&self, address: RegisterAddress) -> u8 {
        self.values[address.index()]
    }

    pub fn set(&mut self, address: RegisterAddress, value: u8) {
        self.values[address.index()] = value;
    }

    /// 16-bit firmware version held in registers 0x5E (high) and 0x5F (low).
    pub fn firmware_version(&self) -> u16 {
        u16::from_be_bytes([
            self.get(RegisterAddress::FIRMWARE_VERSION_MSB),
            self.get(RegisterAddress::FIRMWARE_VERSION_LSB),
        ])
    }

    /// Every register except the no-op slot, with its value.
    pub fn iter(&self) -> impl Iterator<Item = (RegisterAddress, u8)> + '_ {
        RegisterAddress::all()
            .skip(1)
            .map(|address| (address, self.get(address)))
    }
}
