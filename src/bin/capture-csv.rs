use clap::{Arg, ArgAction, Command, value_parser};
use ddc264_evm::ddc264evm::{Ddc264Evm, DeviceFilter, list_devices};
use ddc264_evm::output::write_csv;
use ddc264_evm::{AcquisitionConfig, Sequencer};
use status_line::StatusLine;
use std::{
    error::Error,
    fmt::Display,
    fs::File,
    io::BufWriter,
    num::ParseIntError,
    path::PathBuf,
    process::exit,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

fn u16_from_hex(value: &str) -> Result<u16, ParseIntError> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    u16::from_str_radix(digits, 16)
}

fn cli() -> Command {
    Command::new("capture-csv")
        .about("Capture DDC264EVM samples into a CSV file")
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_parser(value_parser!(PathBuf))
                .default_value("capture.csv")
                .help("Output file"),
        )
        .arg(
            Arg::new("channels")
                .short('c')
                .long("channels")
                .value_parser(value_parser!(u32))
                .default_value("16")
                .help("Channel count, a power of two up to 256"),
        )
        .arg(
            Arg::new("samples")
                .short('s')
                .long("samples")
                .value_parser(value_parser!(u32))
                .default_value("1024")
                .help("Samples per channel"),
        )
        .arg(
            Arg::new("vid")
                .long("vid")
                .value_parser(u16_from_hex)
                .default_value("0x0451")
                .help("USB vendor ID in hexadecimal"),
        )
        .arg(
            Arg::new("pid")
                .long("pid")
                .value_parser(u16_from_hex)
                .help("USB product ID in hexadecimal (any if omitted)"),
        )
        .arg(
            Arg::new("index")
                .long("index")
                .value_parser(value_parser!(usize))
                .default_value("0")
                .help("Which matching board to use"),
        )
        .arg(
            Arg::new("list")
                .short('l')
                .long("list")
                .action(ArgAction::SetTrue)
                .help("List matching boards with their index and exit"),
        )
}

#[derive(Clone)]
struct Progress {
    captured: Arc<AtomicU64>,
    total: u64,
}

impl Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let captured = self.captured.load(Ordering::Relaxed);
        write!(
            f,
            "Captured: {} / {} samples ({:.01}%)",
            captured,
            self.total,
            captured as f64 * 100.0 / self.total as f64
        )
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let matches = cli().get_matches();
    let output = matches
        .get_one::<PathBuf>("output")
        .ok_or("missing output")?;
    let channels = *matches.get_one::<u32>("channels").ok_or("missing channels")?;
    let samples = *matches.get_one::<u32>("samples").ok_or("missing samples")?;
    let filter = DeviceFilter {
        vendor_id: matches.get_one::<u16>("vid").copied(),
        product_id: matches.get_one::<u16>("pid").copied(),
        index: *matches.get_one::<usize>("index").ok_or("missing index")?,
    };

    if matches.get_flag("list") {
        let boards = list_devices(&filter)?;
        if boards.is_empty() {
            eprintln!("No matching boards found");
        }
        for board in boards {
            println!("{board}");
        }
        return Ok(());
    }

    let config = match AcquisitionConfig::with_counts(channels, samples) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Invalid configuration: {err}");
            if let Some(suggestion) = err.suggestion() {
                eprintln!("Nearest admissible samples per channel: {suggestion}");
            }
            exit(2);
        }
    };

    let mut transport = Ddc264Evm::open(&filter)?;
    let progress = Progress {
        captured: transport.progress(),
        total: config.sample_count() as u64,
    };

    eprintln!(
        "starting acquisition with {} channels and {} samples per channel",
        config.channels().count(),
        config.samples_per_channel()
    );
    let status = StatusLine::new(progress.clone());
    let result = Sequencer::new(&mut transport).run(&config);
    drop(status);

    let acquisition = match result {
        Ok(acquisition) => acquisition,
        Err(err) => {
            eprintln!("{err}");
            exit(i32::from(err.exit_code()));
        }
    };
    eprintln!("{}", progress);

    let file = BufWriter::new(File::create(output)?);
    write_csv(file, &acquisition, &chrono::Local::now())?;
    eprintln!("Done! Wrote {}", output.display());

    Ok(())
}
