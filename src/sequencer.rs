//! Acquisition sequence: read-back, reset, clear, configure, register write, capture.
//!
//! Steps run strictly in order and are never retried. Any failure except the
//! configure step aborts the run; no sample data is returned from an aborted run.

use log::{debug, error, info, warn};

use crate::config::{AcquisitionConfig, ChannelCount};
use crate::register_map::{RegisterWriteSet, build_register_map};
use crate::registers::RegisterSnapshot;
use crate::transport::{ChannelOrder, Transport, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    ShowingRegisters,
    Reset,
    ClearTriggers,
    Configure,
    BuildMap,
    WriteRegisters,
    Capture,
    Done,
    Failed,
}

#[derive(Debug, thiserror::Error)]
pub enum SequenceError {
    #[error("board is not connected or register transfer failed: {0}")]
    NotConnected(TransportError),

    #[error("error when resetting DDC: {0}")]
    ResetFailed(TransportError),

    #[error("error when clearing triggers: {0}")]
    ClearTriggersFailed(TransportError),

    #[error("error writing FPGA registers: {0}")]
    WriteRegistersFailed(TransportError),

    #[error("error in data capture: {0}")]
    CaptureFailed(TransportError),
}

impl SequenceError {
    pub fn transport(&self) -> &TransportError {
        match self {
            SequenceError::NotConnected(err)
            | SequenceError::ResetFailed(err)
            | SequenceError::ClearTriggersFailed(err)
            | SequenceError::WriteRegistersFailed(err)
            | SequenceError::CaptureFailed(err) => err,
        }
    }

    /// Process exit code: the low byte of the transport status, or 1.
    pub fn exit_code(&self) -> u8 {
        self.transport()
            .status()
            .map(|status| status as u8)
            .filter(|&code| code != 0)
            .unwrap_or(1)
    }
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct Acquisition {
    pub channels: ChannelCount,
    pub samples_per_channel: u32,
    /// `channels * samples_per_channel` samples in device order.
    pub samples: Vec<i32>,
    pub order: ChannelOrder,
    /// Register state before the run touched the board.
    pub initial_registers: RegisterSnapshot,
    /// Register state read back after the configuration was written.
    pub configured_registers: RegisterSnapshot,
}

impl Acquisition {
    pub fn firmware_version(&self) -> u16 {
        self.initial_registers.firmware_version()
    }
}

pub struct Sequencer<T> {
    transport: T,
    state: State,
}

impl<T: Transport> Sequencer<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            state: State::Idle,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Runs one acquisition from `Idle` to `Done` or `Failed`.
    pub fn run(&mut self, config: &AcquisitionConfig) -> Result<Acquisition, SequenceError> {
        self.state = State::Idle;
        let result = self.sequence(config);
        match &result {
            Ok(acquisition) => {
                info!("data captured: {} samples", acquisition.samples.len());
                self.state = State::Done;
            }
            Err(err) => {
                error!("acquisition aborted in {:?}: {}", self.state, err);
                self.state = State::Failed;
            }
        }
        result
    }

    fn enter(&mut self, state: State) {
        debug!("{:?} -> {:?}", self.state, state);
        self.state = state;
    }

    fn sequence(&mut self, config: &AcquisitionConfig) -> Result<Acquisition, SequenceError> {
        self.enter(State::ShowingRegisters);
        info!("reading current register values");
        let initial_registers = self
            .transport
            .transfer_registers(&RegisterWriteSet::new())
            .map_err(SequenceError::NotConnected)?;
        info!("firmware version: {}", initial_registers.firmware_version());
        for (address, value) in initial_registers.iter() {
            debug!("register {address} : 0x{value:02X}");
        }

        self.enter(State::Reset);
        self.transport.reset().map_err(SequenceError::ResetFailed)?;

        self.enter(State::ClearTriggers);
        self.transport
            .clear_triggers()
            .map_err(SequenceError::ClearTriggersFailed)?;

        self.enter(State::Configure);
        let (cfg_high, cfg_low) = (config.ddc.high_byte(), config.ddc.low_byte());
        if let Err(err) = self.transport.configure(cfg_high, cfg_low) {
            warn!("error when writing data sequence, continuing: {err}");
        }

        self.enter(State::BuildMap);
        let writes = build_register_map(config);
        debug!("{} registers enabled", writes.len());

        self.enter(State::WriteRegisters);
        let configured_registers = self
            .transport
            .transfer_registers(&writes)
            .map_err(SequenceError::WriteRegistersFailed)?;
        info!("FPGA registers written");
        verify(&writes, &configured_registers);
        drop(writes);

        self.enter(State::Capture);
        let mut samples = vec![0; config.sample_count()];
        let order = self
            .transport
            .capture(config.channels(), config.samples_per_channel(), &mut samples)
            .map_err(SequenceError::CaptureFailed)?;

        Ok(Acquisition {
            channels: config.channels(),
            samples_per_channel: config.samples_per_channel(),
            samples,
            order,
            initial_registers,
            configured_registers,
        })
    }
}

/// Logs registers whose read-back differs from what was written.
fn verify(writes: &RegisterWriteSet, readback: &RegisterSnapshot) -> usize {
    let mut mismatches = 0;
    for (address, written) in writes.iter() {
        let read = readback.get(address);
        if read != written {
            warn!("register {address} reads back 0x{read:02X}, wrote 0x{written:02X}");
            mismatches += 1;
        }
    }
    mismatches
}
