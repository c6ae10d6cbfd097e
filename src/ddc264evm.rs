//! [`Transport`] for the DDC264EVM over its Cypress bulk endpoints.

use std::{
    fmt::{self, Display},
    future::Future,
    io, iter,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use futures_lite::future::{self, block_on};
use futures_timer::Delay;
use log::{debug, info, warn};
use nusb::transfer::{Direction, EndpointType, RequestBuffer};

use crate::config::ChannelCount;
use crate::protocol::{self, BYTES_PER_SAMPLE, CHUNK_SIZE, REGISTER_READ_SIZE, status};
use crate::register_map::RegisterWriteSet;
use crate::registers::{RegisterAddress, RegisterSnapshot};
use crate::transport::{ChannelOrder, Transport, TransportError};

pub const TI_VENDOR_ID: u16 = 0x0451;

const WRITE_TIMEOUT: Duration = Duration::from_millis(250);
const REGISTER_DRAIN_SIZE: usize = 2048;
const REGISTER_DRAIN_TIMEOUT: Duration = Duration::from_millis(50);
const REGISTER_DRAIN_ATTEMPTS: usize = 16383;
const REGISTER_READ_TIMEOUT: Duration = Duration::from_millis(100);
const CAPTURE_DRAIN_ATTEMPTS: usize = 32;
const CHUNK_TIMEOUT: Duration = Duration::from_millis(250);
const FIRST_CHUNK_TIMEOUT: Duration = Duration::from_secs(10);
const FIRST_CHUNK_ATTEMPTS: usize = 3;
const CHUNK_ATTEMPTS: usize = 40;

/// Selects which attached board to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceFilter {
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
    /// Position among the matching devices.
    pub index: usize,
}

impl Default for DeviceFilter {
    fn default() -> Self {
        Self {
            vendor_id: Some(TI_VENDOR_ID),
            product_id: None,
            index: 0,
        }
    }
}

impl DeviceFilter {
    fn matches(&self, vendor_id: u16, product_id: u16) -> bool {
        self.vendor_id.is_none_or(|id| id == vendor_id)
            && self.product_id.is_none_or(|id| id == product_id)
    }

    /// Devices passing the vendor and product filter, in the order `index`
    /// counts them.
    fn matching<D>(
        &self,
        devices: impl IntoIterator<Item = D>,
        ids: impl Fn(&D) -> (u16, u16),
    ) -> Vec<D> {
        devices
            .into_iter()
            .filter(|dev| {
                let (vendor_id, product_id) = ids(dev);
                self.matches(vendor_id, product_id)
            })
            .collect()
    }

    fn select<D>(
        &self,
        devices: impl IntoIterator<Item = D>,
        ids: impl Fn(&D) -> (u16, u16),
    ) -> Option<D> {
        self.matching(devices, ids).into_iter().nth(self.index)
    }
}

fn usb_ids(dev: &nusb::DeviceInfo) -> (u16, u16) {
    (dev.vendor_id(), dev.product_id())
}

fn find_device(filter: &DeviceFilter) -> Option<nusb::DeviceInfo> {
    filter.select(nusb::list_devices().ok()?, usb_ids)
}

/// An attached board as offered by [`list_devices`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardInfo {
    /// Value to put in [`DeviceFilter::index`] to open this board.
    pub index: usize,
    pub vendor_id: u16,
    pub product_id: u16,
    pub product: Option<String>,
}

impl Display for BoardInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {:04X}:{:04X} {}",
            self.index,
            self.vendor_id,
            self.product_id,
            self.product.as_deref().unwrap_or("(no product string)")
        )
    }
}

/// Boards matching the vendor and product ids of `filter`. Its `index` is
/// ignored.
pub fn list_devices(filter: &DeviceFilter) -> Result<Vec<BoardInfo>, TransportError> {
    let devices = nusb::list_devices().map_err(TransportError::IoError)?;
    Ok(filter
        .matching(devices, usb_ids)
        .into_iter()
        .enumerate()
        .map(|(index, dev)| BoardInfo {
            index,
            vendor_id: dev.vendor_id(),
            product_id: dev.product_id(),
            product: dev.product_string().map(str::to_owned),
        })
        .collect())
}

fn open_failed(err: io::Error) -> TransportError {
    warn!("could not open device: {err}");
    TransportError::Status(status::OPEN_FAILED)
}

/// Blocks on `transfer`, giving up after `timeout`. Dropping the transfer
/// future on timeout cancels it.
fn with_timeout<F: Future>(transfer: F, timeout: Duration) -> Option<F::Output> {
    block_on(future::or(async move { Some(transfer.await) }, async move {
        Delay::new(timeout).await;
        None
    }))
}

/// Best-effort `stop` after a capture failed with `err`, which is handed back
/// whatever the stop does.
fn abandon_capture(
    err: TransportError,
    stop: impl FnOnce() -> Result<(), TransportError>,
) -> TransportError {
    if let Err(stop_err) = stop() {
        warn!("could not stop conversions after failed capture: {stop_err}");
    }
    err
}

pub struct Ddc264Evm {
    interface: nusb::Interface,
    out_endpoint: u8,
    in_endpoint: u8,
    received: Arc<AtomicU64>,
}

impl Ddc264Evm {
    pub fn open(filter: &DeviceFilter) -> Result<Self, TransportError> {
        let descriptor =
            find_device(filter).ok_or(TransportError::Status(status::NO_DEVICE))?;
        info!(
            "Found DDC264EVM device {:04X}:{:04X}",
            descriptor.vendor_id(),
            descriptor.product_id()
        );
        let device = descriptor.open().map_err(open_failed)?;

        let configuration = device
            .active_configuration()
            .map_err(|err| TransportError::Descriptor(err.to_string()))?;
        let setting = configuration
            .interface_alt_settings()
            .find(|alt| {
                alt.endpoints()
                    .any(|ep| ep.transfer_type() == EndpointType::Bulk)
            })
            .ok_or(TransportError::Status(status::NO_OUT_ENDPOINT))?;
        let bulk = |direction: Direction| {
            setting
                .endpoints()
                .find(|ep| ep.transfer_type() == EndpointType::Bulk && ep.direction() == direction)
                .map(|ep| ep.address())
        };
        let out_endpoint =
            bulk(Direction::Out).ok_or(TransportError::Status(status::NO_OUT_ENDPOINT))?;
        let in_endpoint =
            bulk(Direction::In).ok_or(TransportError::Status(status::NO_IN_ENDPOINT))?;
        let interface_number = setting.interface_number();

        let interface = device
            .claim_interface(interface_number)
            .map_err(TransportError::IoError)?;
        debug!(
            "claimed interface {interface_number}, bulk out 0x{out_endpoint:02X}, bulk in 0x{in_endpoint:02X}"
        );

        Ok(Self {
            interface,
            out_endpoint,
            in_endpoint,
            received: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Samples decoded so far by the capture in progress.
    pub fn progress(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.received)
    }

    /// Writes a single register outside of a bulk register transfer.
    pub fn write_register(&self, address: RegisterAddress, value: u8) -> Result<(), TransportError> {
        self.command(&protocol::register_command(address, value))
    }

    fn command(&self, frame: &[u8]) -> Result<(), TransportError> {
        let timer = Instant::now();
        let completion = with_timeout(
            self.interface.bulk_out(self.out_endpoint, frame.to_vec()),
            WRITE_TIMEOUT,
        )
        .ok_or(TransportError::Status(status::COMMAND_FAILED))?;
        completion
            .into_result()
            .map_err(TransportError::UsbTransferError)?;
        debug!(
            "wrote {} bytes in {:?}us",
            frame.len(),
            timer.elapsed().as_micros()
        );
        Ok(())
    }

    /// `Ok(None)` when nothing arrived within `timeout`.
    fn read(&self, len: usize, timeout: Duration) -> Result<Option<Vec<u8>>, TransportError> {
        let timer = Instant::now();
        let Some(completion) = with_timeout(
            self.interface
                .bulk_in(self.in_endpoint, RequestBuffer::new(len)),
            timeout,
        ) else {
            return Ok(None);
        };
        let data = completion
            .into_result()
            .map_err(TransportError::UsbTransferError)?;
        debug!(
            "read {} bytes in {:?}us",
            data.len(),
            timer.elapsed().as_micros()
        );
        Ok(Some(data))
    }

    /// Discards pending IN data until a read times out. Returns `false` if
    /// data was still arriving after `attempts` reads.
    fn drain(&self, len: usize, timeout: Duration, attempts: usize) -> Result<bool, TransportError> {
        for _ in 0..attempts {
            match self.read(len, timeout)? {
                None => return Ok(true),
                Some(stale) => debug!("discarded {} stale bytes", stale.len()),
            }
        }
        Ok(false)
    }

    fn read_chunk(&self, timeout: Duration, attempts: usize) -> Result<Vec<u8>, TransportError> {
        for _ in 0..attempts {
            if let Some(chunk) = self.read(CHUNK_SIZE, timeout)? {
                if !chunk.is_empty() {
                    return Ok(chunk);
                }
            }
        }
        Err(TransportError::Status(status::DATA_TIMEOUT))
    }
}

impl Transport for Ddc264Evm {
    fn reset(&mut self) -> Result<(), TransportError> {
        self.command(&protocol::RESET_FRAME)
    }

    fn clear_triggers(&mut self) -> Result<(), TransportError> {
        self.command(&protocol::CLEAR_TRIGGERS_FRAME)
    }

    fn configure(&mut self, cfg_high: u8, cfg_low: u8) -> Result<(), TransportError> {
        self.command(&protocol::data_sequence_frame(cfg_high, cfg_low))
    }

    fn transfer_registers(
        &mut self,
        writes: &RegisterWriteSet,
    ) -> Result<RegisterSnapshot, TransportError> {
        self.command(&protocol::register_write_frame(writes))?;

        if !self.drain(
            REGISTER_DRAIN_SIZE,
            REGISTER_DRAIN_TIMEOUT,
            REGISTER_DRAIN_ATTEMPTS,
        )? {
            return Err(TransportError::Status(status::PIPE_NOT_DRAINED));
        }

        self.command(&protocol::READ_REGISTERS)?;
        let data = self
            .read(REGISTER_READ_SIZE, REGISTER_READ_TIMEOUT)?
            .ok_or(TransportError::Status(status::DATA_TIMEOUT))?;
        let mut snapshot = RegisterSnapshot::default();
        protocol::parse_register_readback(&data, &mut snapshot);

        self.command(&protocol::END_REGISTER_READ)?;
        Ok(snapshot)
    }

    fn capture(
        &mut self,
        channels: ChannelCount,
        samples_per_channel: u32,
        samples: &mut [i32],
    ) -> Result<ChannelOrder, TransportError> {
        let expected_bytes =
            channels.count() as usize * samples_per_channel as usize * BYTES_PER_SAMPLE;
        self.received.store(0, Ordering::Relaxed);

        self.command(&protocol::STOP_CONVERSIONS)?;
        self.command(&protocol::NO_OP)?;
        self.drain(CHUNK_SIZE, CHUNK_TIMEOUT, CAPTURE_DRAIN_ATTEMPTS)?;
        self.command(&protocol::START_CONVERSIONS)?;

        let start_time = Instant::now();
        let chunks = iter::once_with(|| self.read_chunk(FIRST_CHUNK_TIMEOUT, FIRST_CHUNK_ATTEMPTS))
            .chain(iter::repeat_with(|| {
                self.read_chunk(CHUNK_TIMEOUT, CHUNK_ATTEMPTS)
            }));
        let collected = protocol::collect_samples(chunks, expected_bytes, samples, |filled| {
            self.received.store(filled as u64, Ordering::Relaxed)
        });
        let (order, bytes_read) = collected.map_err(|err| {
            abandon_capture(err, || self.command(&protocol::STOP_CONVERSIONS))
        })?;
        debug!(
            "{} bytes in {:.02}s",
            bytes_read,
            start_time.elapsed().as_secs_f32()
        );

        self.command(&protocol::STOP_CONVERSIONS)
            .map_err(|_| TransportError::Status(status::END_FAILED))?;
        Ok(order)
    }
}
