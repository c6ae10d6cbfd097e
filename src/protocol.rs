//! Command stream understood by the EVM firmware.
//!
//! Everything sent to the bulk OUT endpoint is a sequence of `(opcode, value)`
//! byte pairs; opcodes are register addresses. Pairs of `00 00` are no-ops
//! that give the FPGA state machine time to settle.

use crate::register_map::RegisterWriteSet;
use crate::registers::{RegisterAddress, RegisterSnapshot};
use crate::transport::{ChannelOrder, TransportError};

/// Status codes reported by the transport, matching the vendor library.
pub mod status {
    pub const NO_DEVICE: i32 = -1;
    pub const OPEN_FAILED: i32 = -2;
    pub const DATA_TIMEOUT: i32 = -4;
    pub const COMMAND_FAILED: i32 = -5;
    pub const PIPE_NOT_DRAINED: i32 = -5;
    pub const END_FAILED: i32 = -6;
    pub const MISALIGNED_DATA: i32 = -8;
    pub const NO_OUT_ENDPOINT: i32 = -9;
    pub const NO_IN_ENDPOINT: i32 = -10;
}

/// Pulses DDC_RESETN (0x15) high, low, then high again.
pub const RESET_FRAME: [u8; 24] = [
    0x00, 0x00, 0x00, 0x00, //
    0x15, 0xFF, 0x15, 0xFF, //
    0x15, 0x00, 0x15, 0x00, 0x15, 0x00, 0x15, 0x00, //
    0x15, 0xFF, 0x15, 0xFF, 0x15, 0xFF, 0x15, 0xFF,
];

pub const CLEAR_TRIGGERS_FRAME: [u8; 12] = [
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x1E, 0x00, 0x1E, 0x00, //
    0xD1, 0x00,
];

/// Starts the FPGA register read-out.
pub const READ_REGISTERS: [u8; 2] = register_command(RegisterAddress::READ_OUT_TRIGGER, 0x01);

pub const NO_OP: [u8; 2] = register_command(RegisterAddress::NO_OP, 0x00);

/// Stops the read-out and pulses RESET_CONV.
pub const END_REGISTER_READ: [u8; 10] = [
    RegisterAddress::READ_OUT_TRIGGER.value(),
    0x00,
    NO_OP[0],
    NO_OP[1],
    RegisterAddress::RESET_CONV.value(),
    0x00,
    NO_OP[0],
    NO_OP[1],
    RegisterAddress::RESET_CONV.value(),
    0x01,
];

pub const STOP_CONVERSIONS: [u8; 2] = [0x10, 0x00];
pub const START_CONVERSIONS: [u8; 2] = [0x10, 0xFF];

/// Largest bulk IN transfer requested while capturing.
pub const CHUNK_SIZE: usize = 65536;
pub const REGISTER_READ_SIZE: usize = 512;
pub const BYTES_PER_SAMPLE: usize = 4;

/// A single `(address, value)` register write.
pub const fn register_command(address: RegisterAddress, value: u8) -> [u8; 2] {
    [address.value(), value]
}

/// Loads CFGHIGH (0x1C) and CFGLOW (0x1D) and shifts them into the converter.
pub fn data_sequence_frame(cfg_high: u8, cfg_low: u8) -> [u8; 22] {
    [
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
        0x11, 0x00, 0x12, 0x00, //
        0x1C, cfg_high, 0x1D, cfg_low, //
        0x1F, 0x01, 0x00, 0x00, 0x00, 0x00, //
        0x1E, 0x00,
    ]
}

/// Enabled registers framed by a leading no-op and a trailing read-out stop.
pub fn register_write_frame(writes: &RegisterWriteSet) -> Vec<u8> {
    let mut frame = Vec::with_capacity(4 + 2 * writes.len());
    frame.extend_from_slice(&NO_OP);
    for (address, value) in writes.iter() {
        frame.push(address.value());
        frame.push(value);
    }
    frame.extend_from_slice(&register_command(RegisterAddress::READ_OUT_TRIGGER, 0x00));
    frame
}

/// Applies `(address, value)` pairs read back from the FPGA to `snapshot`.
///
/// A trailing odd byte and addresses outside the register space are ignored.
pub fn parse_register_readback(data: &[u8], snapshot: &mut RegisterSnapshot) {
    for pair in data.chunks_exact(2) {
        if let Some(address) = RegisterAddress::new(pair[0]) {
            snapshot.set(address, pair[1]);
        }
    }
}

/// Decodes 4-byte sample words into `out`, returning how many were written.
///
/// Byte 0 of each word is a marker; bytes 1..=3 hold the 24-bit big-endian
/// conversion result. Words beyond the end of `out` are dropped.
pub fn decode_samples(chunk: &[u8], out: &mut [i32]) -> Result<usize, TransportError> {
    if chunk.len() % BYTES_PER_SAMPLE != 0 {
        return Err(TransportError::Status(status::MISALIGNED_DATA));
    }
    let mut written = 0;
    for (word, slot) in chunk.chunks_exact(BYTES_PER_SAMPLE).zip(out.iter_mut()) {
        *slot = i32::from_be_bytes([0, word[1], word[2], word[3]]);
        written += 1;
    }
    Ok(written)
}

/// Accumulates capture chunks into `samples` until `expected_bytes` have
/// arrived, returning the channel order and the number of bytes received.
///
/// The order comes from the marker byte of the first chunk. The last chunk may
/// overrun `expected_bytes`; surplus words are dropped. `progress` sees the
/// running sample count after every chunk.
pub fn collect_samples<I>(
    mut chunks: I,
    expected_bytes: usize,
    samples: &mut [i32],
    mut progress: impl FnMut(usize),
) -> Result<(ChannelOrder, usize), TransportError>
where
    I: Iterator<Item = Result<Vec<u8>, TransportError>>,
{
    let mut next_chunk = move || {
        chunks
            .next()
            .unwrap_or(Err(TransportError::Status(status::DATA_TIMEOUT)))
    };

    let first = next_chunk()?;
    let Some(&marker) = first.first() else {
        return Err(TransportError::Status(status::DATA_TIMEOUT));
    };
    let order = ChannelOrder::from_marker(marker);
    let mut filled = decode_samples(&first, samples)?;
    let mut bytes_read = first.len();
    progress(filled);

    while bytes_read < expected_bytes {
        let chunk = next_chunk()?;
        bytes_read += chunk.len();
        filled += decode_samples(&chunk, &mut samples[filled..])?;
        progress(filled);
    }
    Ok((order, bytes_read))
}
