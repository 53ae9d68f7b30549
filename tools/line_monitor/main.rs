// tools/line_monitor/main.rs
//
// Diagnostic monitor: opens a serial port and prints lines as they arrive.
//
//   line_monitor --list
//   line_monitor --port /dev/ttyUSB0 --baud 115200
//   line_monitor --config reader.toml --seconds 10

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::Parser;
use serial_lines_lib::{
    init_file_logging, list_serial_ports, set_stderr_logging, LineEnd, ReaderConfig, ReaderHandle,
    Terminator, WorkerStatus,
};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Print lines received on a serial port
#[derive(Parser)]
#[command(name = "line_monitor")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// List available serial ports and exit
    #[arg(long)]
    list: bool,

    /// Serial device, e.g. /dev/ttyUSB0 or COM3
    #[arg(short, long, value_name = "PORT", required_unless_present_any = ["list", "config"])]
    port: Option<String>,

    #[arg(short, long, default_value_t = 9600)]
    baud: u32,

    /// Line buffer capacity in bytes
    #[arg(long, default_value_t = 256)]
    capacity: usize,

    /// TOML reader config; overrides --port/--baud/--capacity
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Terminator as hex bytes, e.g. 0D0A or 0A
    #[arg(short, long, value_name = "HEX")]
    terminator: Option<String>,

    /// Stop after this many seconds
    #[arg(long, value_name = "SECONDS")]
    seconds: Option<u64>,

    /// Also write the reader log to a timestamped file in this directory
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    /// Show reader log output on stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    set_stderr_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> serial_lines_lib::Result<()> {
    if cli.list {
        for port in list_serial_ports()? {
            let ids = match (port.vid, port.pid) {
                (Some(vid), Some(pid)) => format!(" {:04x}:{:04x}", vid, pid),
                _ => String::new(),
            };
            println!(
                "{}  {}{}  {}",
                port.port_name,
                port.port_type,
                ids,
                port.product.unwrap_or_default()
            );
        }
        return Ok(());
    }

    if let Some(dir) = &cli.log_dir {
        let path = init_file_logging(dir)?;
        eprintln!("logging to {}", path.display());
    }

    let mut config = match &cli.config {
        Some(path) => ReaderConfig::load(path)?,
        None => ReaderConfig::new(cli.port.clone().unwrap_or_default(), cli.baud, cli.capacity),
    };
    if let Some(hex) = &cli.terminator {
        config = config.with_terminator(Terminator::from_hex(hex)?);
    }

    let reader = ReaderHandle::new(config)?;
    if !reader.connect()? {
        return Err(serial_lines_lib::ReaderError::ChannelOpen(
            reader.last_error()?.unwrap_or_else(|| reader.port().to_string()),
        ));
    }
    eprintln!("reading {} (ctrl-c to quit)", reader.config()?.describe());
    reader.start_reading()?;

    let deadline = cli
        .seconds
        .and_then(|s| Instant::now().checked_add(Duration::from_secs(s)));
    let mut printed = 0;
    loop {
        for line in reader.lines_since(printed)? {
            let marker = match line.end {
                LineEnd::Terminator => "",
                LineEnd::Overflow => " [overflow]",
                LineEnd::EndOfStream => " [eof]",
            };
            println!("{}{}", line.text(), marker);
            printed += 1;
        }

        if let WorkerStatus::Ended(end) = reader.status()? {
            eprintln!("stream ended: {:?}", end);
            break;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    reader.stop_and_join()?;
    let stats = reader.stats()?;
    eprintln!(
        "{} lines, {} bytes, {} overflows",
        stats.lines, stats.bytes_read, stats.overflows
    );
    reader.destroy();
    Ok(())
}
