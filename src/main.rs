use std::process::ExitCode;

use ddc264_evm::ddc264evm::{Ddc264Evm, DeviceFilter};
use ddc264_evm::{AcquisitionConfig, Sequencer};

fn main() -> ExitCode {
    env_logger::init();

    eprintln!(
        "\nAcquisition software for the DDC264EVM, {} {}\n",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let config = AcquisitionConfig::default();
    let mut transport = match Ddc264Evm::open(&DeviceFilter::default()) {
        Ok(transport) => transport,
        Err(err) => {
            eprintln!("Board is not connected: {err}");
            return ExitCode::FAILURE;
        }
    };

    let mut sequencer = Sequencer::new(&mut transport);
    match sequencer.run(&config) {
        Ok(acquisition) => {
            eprintln!("Data captured\n");
            for (i, sample) in acquisition.samples.iter().enumerate() {
                println!("AllData[{i}] = {sample}");
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(err.exit_code())
        }
    }
}
