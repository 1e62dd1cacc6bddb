//! btelem command-line tool.
//!
//! # Usage
//!
//! ```bash
//! btelem dump capture.btlm
//! btelem schema capture.btlm
//! btelem info capture.btlm
//! btelem live --tcp 127.0.0.1:4200
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod transport;

use std::fs::File;
use std::io::BufReader;
use std::process::ExitCode;
use std::sync::Arc;

use btelem_core::{read_stream_schema, Capture, LogReader, Transport};
use btelem_proto::{DecodedEntry, PacketHeaderVersion, Schema, StreamFramer};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::transport::{TcpTransport, UdpTransport};

/// Top-level CLI error, distinguishing misuse (exit code 2) from I/O and
/// parse failures (exit code 1).
#[derive(Debug)]
enum CliError {
    /// Bad argument combination or missing requirement, not a data error.
    Misuse(String),
    /// I/O, parse, or query failure from the core/proto layers.
    Core(btelem_core::CoreError),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Misuse(msg) => write!(f, "{msg}"),
            Self::Core(err) => write!(f, "{err}"),
        }
    }
}

impl From<btelem_core::CoreError> for CliError {
    fn from(err: btelem_core::CoreError) -> Self {
        Self::Core(err)
    }
}

/// btelem telemetry tool
#[derive(Parser, Debug)]
#[command(name = "btelem")]
#[command(about = "Inspect and decode btelem telemetry log files and live streams")]
#[command(version)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Dump every entry in a log file
    Dump {
        /// Path to a .btlm log file
        file: String,
    },
    /// Print the schema embedded in a log file
    Schema {
        /// Path to a .btlm log file
        file: String,
    },
    /// Print summary info (counts, time range) about a log file
    Info {
        /// Path to a .btlm log file
        file: String,
    },
    /// Live-decode entries from a transport
    Live {
        /// Serial port, e.g. /dev/ttyUSB0 (unsupported in this build)
        #[arg(long)]
        serial: Option<String>,
        /// Baud rate for --serial
        #[arg(long, default_value_t = 115_200)]
        baud: u32,
        /// UDP host:port to bind and listen on
        #[arg(long)]
        udp: Option<String>,
        /// TCP host:port to connect to
        #[arg(long)]
        tcp: Option<String>,
        /// Log file to read the schema from, for non-TCP transports
        #[arg(long)]
        schema_file: Option<String>,
    },
}

fn format_entry(entry: &DecodedEntry) -> String {
    let seconds = entry.timestamp as f64 / 1_000_000_000.0;
    let name = entry.name.clone().unwrap_or_else(|| format!("id={}", entry.id));
    let fields = entry.fields.iter().map(|(k, v)| format!("{k}={v:?}")).collect::<Vec<_>>().join(", ");
    format!("[{seconds:12.6}] {name}: {fields}")
}

fn format_duration_ns(ns: u64) -> String {
    if ns < 1_000 {
        return format!("{ns}ns");
    }
    if ns < 1_000_000 {
        return format!("{:.1}us", ns as f64 / 1_000.0);
    }
    if ns < 1_000_000_000 {
        return format!("{:.1}ms", ns as f64 / 1_000_000.0);
    }
    let s = ns as f64 / 1_000_000_000.0;
    if s < 60.0 {
        return format!("{s:.2}s");
    }
    if s < 3600.0 {
        return format!("{:.1}m", s / 60.0);
    }
    format!("{:.1}h", s / 3600.0)
}

fn run_dump(file: &str) -> Result<(), CliError> {
    let f = File::open(file).map_err(btelem_core::CoreError::from)?;
    let mut reader = LogReader::open(BufReader::new(f), PacketHeaderVersion::V1)?;
    for entry in reader.entries(None, None, None)? {
        println!("{}", format_entry(&entry));
    }
    Ok(())
}

fn run_schema(file: &str) -> Result<(), CliError> {
    let f = File::open(file).map_err(btelem_core::CoreError::from)?;
    let reader = LogReader::open(BufReader::new(f), PacketHeaderVersion::V1)?;
    print_schema(reader.schema());
    Ok(())
}

fn print_schema(schema: &Schema) {
    for e in schema.entries() {
        println!("[{:3}] {} - {}", e.id, e.name, e.description);
        println!("      payload_size={}", e.payload_size);
        for f in &e.fields {
            println!("        {:<20} offset={:3} size={:2} type={:?} count={}", f.name, f.offset, f.size, f.ty, f.count);
        }
        println!();
    }
}

fn run_info(file: &str) -> Result<(), CliError> {
    let file_size = std::fs::metadata(file).map_err(btelem_core::CoreError::from)?.len();
    let f = File::open(file).map_err(btelem_core::CoreError::from)?;
    let mut capture = Capture::open(BufReader::new(f), PacketHeaderVersion::V1)?;
    let counts = capture.entry_counts()?;
    let time_range = capture.time_range();
    let total_entries: u64 = counts.values().sum();

    println!("File:       {file}");
    println!("Size:       {file_size} bytes");
    println!("Entries:    {total_entries}");
    match time_range {
        Some((lo, hi)) => {
            println!("Time range: {:.6}s - {:.6}s", lo as f64 / 1e9, hi as f64 / 1e9);
            println!("Duration:   {}", format_duration_ns(hi - lo));
        }
        None => println!("Time range: (empty)"),
    }

    let schema = capture.schema().clone();
    println!("\nSignals ({}):", schema.entries().len());
    for e in schema.entries() {
        let count = counts.get(&e.name).copied().unwrap_or(0);
        let field_names = e.fields.iter().map(|f| f.name.as_str()).collect::<Vec<_>>().join(", ");
        println!("  {:4} {:<24} {:8} {:5}B  {}", e.id, e.name, count, e.payload_size, field_names);
    }
    Ok(())
}

fn capture_schema(file: &str) -> btelem_core::Result<Schema> {
    let f = File::open(file).map_err(btelem_core::CoreError::from)?;
    let reader = LogReader::open(BufReader::new(f), PacketHeaderVersion::V1)?;
    Ok(reader.schema().clone())
}

fn run_live(
    serial: Option<&str>,
    baud: u32,
    udp: Option<&str>,
    tcp: Option<&str>,
    schema_file: Option<&str>,
) -> Result<(), CliError> {
    if let Some(port) = serial {
        tracing::error!(port, baud, "serial transport is not available in this build");
        return Err(CliError::Misuse("serial transport is not available in this build".to_string()));
    }

    enum AnyTransport {
        Tcp(TcpTransport),
        Udp(UdpTransport),
    }
    impl Transport for AnyTransport {
        fn read(&mut self, n: usize) -> std::io::Result<Vec<u8>> {
            match self {
                Self::Tcp(t) => t.read(n),
                Self::Udp(t) => t.read(n),
            }
        }
        fn write(&mut self, data: &[u8]) -> std::io::Result<()> {
            match self {
                Self::Tcp(t) => t.write(data),
                Self::Udp(t) => t.write(data),
            }
        }
        fn close(&mut self) -> std::io::Result<()> {
            match self {
                Self::Tcp(t) => t.close(),
                Self::Udp(t) => t.close(),
            }
        }
    }

    let mut transport = if let Some(addr) = tcp {
        AnyTransport::Tcp(TcpTransport::connect(addr).map_err(btelem_core::CoreError::from)?)
    } else if let Some(addr) = udp {
        AnyTransport::Udp(UdpTransport::bind(addr).map_err(btelem_core::CoreError::from)?)
    } else {
        return Err(CliError::Misuse("specify --serial, --udp, or --tcp".to_string()));
    };

    let schema = if let Some(path) = schema_file {
        capture_schema(path)?
    } else if let AnyTransport::Tcp(ref mut t) = transport {
        read_stream_schema(t)?
    } else {
        return Err(CliError::Misuse("--schema-file is required for non-TCP transports".to_string()));
    };

    let mut framer = StreamFramer::new(Arc::new(schema), PacketHeaderVersion::V1);

    loop {
        let chunk = transport.read(4096).map_err(btelem_core::CoreError::from)?;
        if chunk.is_empty() {
            std::thread::sleep(std::time::Duration::from_millis(10));
            continue;
        }
        for entry in framer.feed(&chunk) {
            println!("{}", format_entry(&entry));
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let result = match &args.command {
        Command::Dump { file } => run_dump(file),
        Command::Schema { file } => run_schema(file),
        Command::Info { file } => run_info(file),
        Command::Live { serial, baud, udp, tcp, schema_file } => {
            run_live(serial.as_deref(), *baud, udp.as_deref(), tcp.as_deref(), schema_file.as_deref())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err @ CliError::Misuse(_)) => {
            eprintln!("error: {err}");
            ExitCode::from(2)
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(1)
        }
    }
}
