pub mod config;
pub mod ddc264evm;
pub mod output;
pub mod protocol;
pub mod register_map;
pub mod registers;
pub mod sequencer;
pub mod transport;
pub mod validate;

pub use config::{AcquisitionConfig, ConfigError};
pub use sequencer::{Acquisition, SequenceError, Sequencer, State};
pub use transport::{ChannelOrder, Transport, TransportError};
