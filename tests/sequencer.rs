use ddc264_evm::config::{ChannelCount, TimingConfig};
use ddc264_evm::register_map::RegisterWriteSet;
use ddc264_evm::registers::{RegisterAddress, RegisterSnapshot};
use ddc264_evm::{
    AcquisitionConfig, ChannelOrder, SequenceError, Sequencer, State, Transport, TransportError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Call {
    TransferRegisters(usize),
    Reset,
    ClearTriggers,
    Configure(u8, u8),
    Capture(u32, u32),
}

/// Simulated board: echoes written registers, answers every step with the
/// configured status, and fills captures with a ramp.
#[derive(Default)]
struct SimulatedBoard {
    calls: Vec<Call>,
    registers: RegisterSnapshot,
    fail_read_back: Option<i32>,
    fail_reset: Option<i32>,
    fail_clear: Option<i32>,
    fail_configure: Option<i32>,
    fail_write: Option<i32>,
    fail_capture: Option<i32>,
    link_error_on_read_back: bool,
}

fn status(code: Option<i32>) -> Result<(), TransportError> {
    match code {
        Some(code) => Err(TransportError::Status(code)),
        None => Ok(()),
    }
}

impl Transport for SimulatedBoard {
    fn reset(&mut self) -> Result<(), TransportError> {
        self.calls.push(Call::Reset);
        status(self.fail_reset)
    }

    fn clear_triggers(&mut self) -> Result<(), TransportError> {
        self.calls.push(Call::ClearTriggers);
        status(self.fail_clear)
    }

    fn configure(&mut self, cfg_high: u8, cfg_low: u8) -> Result<(), TransportError> {
        self.calls.push(Call::Configure(cfg_high, cfg_low));
        status(self.fail_configure)
    }

    fn transfer_registers(
        &mut self,
        writes: &RegisterWriteSet,
    ) -> Result<RegisterSnapshot, TransportError> {
        self.calls.push(Call::TransferRegisters(writes.len()));
        if writes.is_empty() {
            if self.link_error_on_read_back {
                return Err(TransportError::IoError(std::io::Error::other("unplugged")));
            }
            status(self.fail_read_back)?;
        } else {
            status(self.fail_write)?;
        }
        for (address, value) in writes.iter() {
            self.registers.set(address, value);
        }
        Ok(self.registers.clone())
    }

    fn capture(
        &mut self,
        channels: ChannelCount,
        samples_per_channel: u32,
        samples: &mut [i32],
    ) -> Result<ChannelOrder, TransportError> {
        self.calls
            .push(Call::Capture(channels.count(), samples_per_channel));
        status(self.fail_capture)?;
        for (i, sample) in samples.iter_mut().enumerate() {
            *sample = i as i32;
        }
        Ok(ChannelOrder::AFirst)
    }
}

fn board() -> SimulatedBoard {
    let mut board = SimulatedBoard::default();
    board
        .registers
        .set(RegisterAddress::FIRMWARE_VERSION_MSB, 0x01);
    board
        .registers
        .set(RegisterAddress::FIRMWARE_VERSION_LSB, 0x02);
    board
}

fn documented_only(channels: u32, samples: u32) -> AcquisitionConfig {
    let timing = TimingConfig {
        conversion_wait: None,
        ..TimingConfig::default()
    };
    AcquisitionConfig::new(channels, samples, timing, Default::default()).unwrap()
}

#[test]
fn sixteen_channels_reach_done() {
    let config = documented_only(16, 1024);
    let mut board = board();
    let mut sequencer = Sequencer::new(&mut board);

    let acquisition = sequencer.run(&config).unwrap();
    assert_eq!(sequencer.state(), State::Done);
    assert_eq!(acquisition.samples.len(), 16384);
    assert_eq!(acquisition.samples[16383], 16383);
    assert_eq!(acquisition.order, ChannelOrder::AFirst);
    assert_eq!(acquisition.firmware_version(), 0x0102);
    assert_eq!(
        acquisition
            .configured_registers
            .get(RegisterAddress::FORMAT_CHANNELS),
        0x14
    );

    assert_eq!(
        board.calls,
        [
            Call::TransferRegisters(0),
            Call::Reset,
            Call::ClearTriggers,
            Call::Configure(0x07, 0x00),
            Call::TransferRegisters(20),
            Call::Capture(16, 1024),
        ]
    );
}

#[test]
fn reference_settings_also_write_undocumented_registers() {
    let mut board = board();
    Sequencer::new(&mut board)
        .run(&AcquisitionConfig::default())
        .unwrap();
    assert!(board.calls.contains(&Call::TransferRegisters(25)));
}

#[test]
fn failed_register_write_never_captures() {
    let mut board = SimulatedBoard {
        fail_write: Some(-9),
        ..board()
    };
    let mut sequencer = Sequencer::new(&mut board);

    let err = sequencer.run(&documented_only(16, 1024)).unwrap_err();
    assert_eq!(sequencer.state(), State::Failed);
    assert!(matches!(
        err,
        SequenceError::WriteRegistersFailed(TransportError::Status(-9))
    ));
    assert_eq!(err.exit_code(), 247);
    assert!(
        !board
            .calls
            .iter()
            .any(|call| matches!(call, Call::Capture(..)))
    );
}

#[test]
fn configure_failure_is_not_fatal() {
    let mut board = SimulatedBoard {
        fail_configure: Some(-1),
        ..board()
    };
    let mut sequencer = Sequencer::new(&mut board);
    assert!(sequencer.run(&AcquisitionConfig::default()).is_ok());
    assert_eq!(sequencer.state(), State::Done);
}

#[test]
fn reset_failure_aborts_before_clear() {
    let mut board = SimulatedBoard {
        fail_reset: Some(-1),
        ..board()
    };
    let err = Sequencer::new(&mut board)
        .run(&AcquisitionConfig::default())
        .unwrap_err();
    assert!(matches!(err, SequenceError::ResetFailed(_)));
    assert_eq!(board.calls, [Call::TransferRegisters(0), Call::Reset]);
}

#[test]
fn clear_failure_aborts_before_configure() {
    let mut board = SimulatedBoard {
        fail_clear: Some(-1),
        ..board()
    };
    let err = Sequencer::new(&mut board)
        .run(&AcquisitionConfig::default())
        .unwrap_err();
    assert!(matches!(err, SequenceError::ClearTriggersFailed(_)));
    assert_eq!(board.calls.last(), Some(&Call::ClearTriggers));
}

#[test]
fn unreachable_board_fails_on_read_back() {
    let mut board = SimulatedBoard {
        link_error_on_read_back: true,
        ..board()
    };
    let mut sequencer = Sequencer::new(&mut board);
    let err = sequencer.run(&AcquisitionConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        SequenceError::NotConnected(TransportError::IoError(_))
    ));
    assert_eq!(err.exit_code(), 1);
    assert_eq!(sequencer.state(), State::Failed);
    assert_eq!(board.calls, [Call::TransferRegisters(0)]);
}

#[test]
fn capture_failure_returns_no_samples() {
    let mut board = SimulatedBoard {
        fail_capture: Some(-4),
        ..board()
    };
    let mut sequencer = Sequencer::new(&mut board);
    let err = sequencer.run(&AcquisitionConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        SequenceError::CaptureFailed(TransportError::Status(-4))
    ));
    assert_eq!(sequencer.state(), State::Failed);
}

#[test]
fn sequencer_can_run_again_after_failure() {
    let mut board = SimulatedBoard {
        fail_capture: Some(-4),
        ..board()
    };
    let mut sequencer = Sequencer::new(&mut board);
    assert!(sequencer.run(&AcquisitionConfig::default()).is_err());
    drop(sequencer);

    board.fail_capture = None;
    board.calls.clear();
    let mut sequencer = Sequencer::new(&mut board);
    assert!(sequencer.run(&AcquisitionConfig::default()).is_ok());
    assert_eq!(sequencer.state(), State::Done);
}

#[test]
fn invalid_configuration_never_reaches_the_board() {
    assert!(AcquisitionConfig::with_counts(24, 1024).is_err());
    assert!(AcquisitionConfig::with_counts(32, 16384).is_err());
    assert_eq!(
        AcquisitionConfig::with_counts(32, 14336)
            .unwrap()
            .sample_count(),
        32 * 14336
    );
}
