/*!
# bzmctl

Command-line front end for a chain of BZM hashing ASICs reached through a
UDP serial bus bridge.

## Features

- Offline frame encoding for every opcode, printed as hex
- One-shot commands against a live bridge with decoded JSON output
- TOML configuration for the bridge address, header generation and timeout

## Usage

### Dump a frame without touching the bus
```bash
bzmctl encode read-reg --address 2 --engine 0xfff --offset 0x10 --count 4
```

### Run a command against the bridge
```bash
bzmctl --width wide32 noop --address 3
bzmctl read-result --address 4
```

### Generate a configuration file
```bash
bzmctl config --output bzmctl.toml
```
*/

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use bzm::{Bus, Command, HeaderWidth, JobDescriptor};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, Level};

mod config;
mod udp;

use config::AppConfig;
use udp::UdpBridge;

#[derive(Parser)]
#[command(name = "bzmctl")]
#[command(about = "Encode and send BZM bus commands through a UDP bridge")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "bzmctl.toml")]
    config: PathBuf,

    /// Override the wide header generation (wide24 or wide32)
    #[arg(short, long)]
    width: Option<HeaderWidth>,

    /// Override the bridge address
    #[arg(long)]
    bridge: Option<String>,

    /// Override the reply timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the encoded frame as hex without sending it
    Encode {
        #[command(subcommand)]
        op: Op,
    },

    /// Run a command against the bus bridge
    #[command(flatten)]
    Run(Op),

    /// Generate configuration file
    Config {
        /// Output path for configuration file
        #[arg(short, long, default_value = "bzmctl.toml")]
        output: PathBuf,
    },
}

#[derive(Args, Clone)]
struct Target {
    /// Physical ASIC address
    #[arg(short, long, value_parser = parse_u8)]
    address: u8,
}

#[derive(Subcommand, Clone)]
enum Op {
    /// Write register bytes
    WriteReg {
        #[command(flatten)]
        target: Target,
        #[arg(short, long, value_parser = parse_u16)]
        engine: u16,
        #[arg(short, long, value_parser = parse_u8)]
        offset: u8,
        /// Hex-encoded register bytes
        values: String,
    },

    /// Read 1, 2 or 4 register bytes
    ReadReg {
        #[command(flatten)]
        target: Target,
        #[arg(short, long, value_parser = parse_u16)]
        engine: u16,
        #[arg(short, long, value_parser = parse_u8)]
        offset: u8,
        #[arg(short = 'n', long, default_value = "4")]
        count: usize,
    },

    /// Write register bytes to an engine group
    McastWrite {
        #[command(flatten)]
        target: Target,
        #[arg(short, long, value_parser = parse_u16)]
        group: u16,
        #[arg(short, long, value_parser = parse_u8)]
        offset: u8,
        /// Hex-encoded register bytes
        values: String,
    },

    /// Send a hashing job
    WriteJob {
        #[command(flatten)]
        target: Target,
        #[arg(short, long, value_parser = parse_u16)]
        engine: u16,
        /// Hex-encoded 32-byte midstate
        #[arg(long)]
        midstate: String,
        /// Hex-encoded 4-byte merkle root residue
        #[arg(long)]
        merkle: String,
        #[arg(long, value_parser = parse_u8, default_value = "0")]
        sequence: u8,
        #[arg(long, value_parser = parse_u8, default_value = "0")]
        job_ctl: u8,
    },

    /// Fetch a result record
    ReadResult {
        #[command(flatten)]
        target: Target,
    },

    /// Read the temperature/voltage sensor block
    DtsVs {
        #[command(flatten)]
        target: Target,
        /// Reply length for this silicon generation
        #[arg(short = 'n', long)]
        len: usize,
    },

    /// Echo test
    Loopback {
        #[command(flatten)]
        target: Target,
        /// Hex-encoded data to echo
        #[arg(default_value = "")]
        data: String,
        #[arg(long, value_parser = parse_u8, default_value = "0")]
        tar: u8,
    },

    /// Self-test, expects "2ZB"
    Noop {
        #[command(flatten)]
        target: Target,
    },
}

impl Op {
    fn address(&self) -> u8 {
        match self {
            Op::WriteReg { target, .. }
            | Op::ReadReg { target, .. }
            | Op::McastWrite { target, .. }
            | Op::WriteJob { target, .. }
            | Op::ReadResult { target }
            | Op::DtsVs { target, .. }
            | Op::Loopback { target, .. }
            | Op::Noop { target } => target.address,
        }
    }

    /// Build the typed command, decoding any hex arguments
    fn to_command(&self) -> Result<Command> {
        let command = match self {
            Op::WriteReg { engine, offset, values, .. } => Command::WriteReg {
                engine: *engine,
                offset: *offset,
                values: parse_hex(values)?,
            },
            Op::ReadReg { engine, offset, count, .. } => Command::ReadReg {
                engine: *engine,
                offset: *offset,
                count: *count,
            },
            Op::McastWrite { group, offset, values, .. } => Command::McastWrite {
                group: *group,
                offset: *offset,
                values: parse_hex(values)?,
            },
            Op::WriteJob { engine, midstate, merkle, sequence, job_ctl, .. } => Command::WriteJob {
                engine: *engine,
                job: JobDescriptor::from_slices(
                    &parse_hex(midstate)?,
                    &parse_hex(merkle)?,
                    *sequence,
                    *job_ctl,
                )?,
            },
            Op::ReadResult { .. } => Command::ReadResult,
            Op::DtsVs { len, .. } => Command::DtsVs { len: *len },
            Op::Loopback { data, tar, .. } => Command::Loopback {
                data: parse_hex(data)?,
                tar_or_pad: *tar,
            },
            Op::Noop { .. } => Command::Noop,
        };
        Ok(command)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    // Log to stderr to keep stdout clean for frame and JSON output
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();

    let mut config = AppConfig::load_or_default(&cli.config)?;
    if let Some(width) = cli.width {
        config.bus.header_width = width;
    }
    if let Some(bridge) = cli.bridge {
        config.bus.bridge_addr = bridge;
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.bus.timeout_ms = timeout_ms;
    }

    match cli.command {
        Commands::Encode { op } => encode_frame(&op, config.bus.header_width),
        Commands::Run(op) => run_command(&op, &config),
        Commands::Config { output } => generate_config_file(output),
    }
}

/// Print the frame a command would send
fn encode_frame(op: &Op, width: HeaderWidth) -> Result<()> {
    let command = op.to_command()?;
    let frame = command.encode(op.address(), width)?;
    println!("{}", hex::encode(&frame));
    Ok(())
}

/// Send one command to the bridge and print the decoded reply as JSON
fn run_command(op: &Op, config: &AppConfig) -> Result<()> {
    let mut bridge = UdpBridge::connect(
        &config.bus.bind_addr,
        &config.bus.bridge_addr,
        config.bus.recv_buffer_size,
    )
    .with_context(|| format!("Failed to reach bus bridge at {}", config.bus.bridge_addr))?;

    let mut bus = Bus::new(&mut bridge, config.bus.header_width);
    let address = op.address();
    let timeout = config.bus.timeout();
    debug!("Using {:?} headers, {:?} timeout", bus.width(), timeout);

    let output = match op.to_command()? {
        Command::WriteReg { engine, offset, values } => {
            bus.write_reg(address, engine, offset, &values)?;
            serde_json::json!({ "address": address, "written": values.len() })
        }
        Command::McastWrite { group, offset, values } => {
            bus.multicast_write(address, group, offset, &values)?;
            serde_json::json!({ "address": address, "group": group, "written": values.len() })
        }
        Command::WriteJob { engine, job } => {
            bus.write_job(address, engine, &job)?;
            serde_json::json!({ "address": address, "engine": engine, "sequence": job.sequence })
        }
        Command::ReadReg { engine, offset, count } => {
            let data = bus.read_reg(address, engine, offset, count, timeout)?;
            serde_json::json!({ "address": address, "data": hex::encode(data) })
        }
        Command::ReadResult => {
            let result = bus.read_result(address, timeout)?;
            serde_json::json!({
                "address": address,
                "valid": result.is_valid(),
                "result": result,
            })
        }
        Command::DtsVs { len } => {
            let data = bus.dts_vs_read(address, len, timeout)?;
            serde_json::json!({ "address": address, "data": hex::encode(data) })
        }
        Command::Loopback { data, tar_or_pad } => {
            let echo = bus.loopback(address, &data, tar_or_pad, timeout)?;
            if echo != data {
                bail!(
                    "Loopback echo differs: sent {}, got {}",
                    hex::encode(&data),
                    hex::encode(&echo)
                );
            }
            serde_json::json!({ "address": address, "echo": hex::encode(echo) })
        }
        Command::Noop => {
            bus.noop(address, timeout)?;
            serde_json::json!({ "address": address, "noop": "ok" })
        }
    };

    println!("{}", output);
    Ok(())
}

/// Generate a default configuration file
fn generate_config_file(output_path: PathBuf) -> Result<()> {
    let config = AppConfig::new();
    config.save_to_file(&output_path)?;

    println!("✅ Generated configuration file: {}", output_path.display());
    println!("📝 Edit the file to point at your bus bridge, then run:");
    println!("   bzmctl --config {} noop --address 0", output_path.display());

    Ok(())
}

/// Parse a decimal or 0x-prefixed hex integer
fn parse_int(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse::<u32>(),
    };
    parsed.map_err(|e| format!("invalid number '{}': {}", s, e))
}

fn parse_u8(s: &str) -> Result<u8, String> {
    let value = parse_int(s)?;
    u8::try_from(value).map_err(|_| format!("{} does not fit in a byte", s))
}

fn parse_u16(s: &str) -> Result<u16, String> {
    let value = parse_int(s)?;
    u16::try_from(value).map_err(|_| format!("{} does not fit in 16 bits", s))
}

fn parse_hex(s: &str) -> Result<Vec<u8>> {
    let cleaned: String = s.chars().filter(|c| !c.is_whitespace() && *c != ':').collect();
    let cleaned = cleaned.strip_prefix("0x").unwrap_or(&cleaned);
    hex::decode(cleaned).with_context(|| format!("Invalid hex bytes: {}", s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_numbers() {
        assert_eq!(parse_u8("0x10").unwrap(), 0x10);
        assert_eq!(parse_u8("255").unwrap(), 255);
        assert!(parse_u8("256").is_err());
        assert_eq!(parse_u16("0xFFF").unwrap(), 0xFFF);
        assert!(parse_u16("nope").is_err());
    }

    #[test]
    fn test_parse_hex_bytes() {
        assert_eq!(parse_hex("deadbeef").unwrap(), vec![0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(parse_hex("0xde:ad").unwrap(), vec![0xDE, 0xAD]);
        assert!(parse_hex("").unwrap().is_empty());
        assert!(parse_hex("abc").is_err());
    }

    #[test]
    fn test_encode_readreg_cli() {
        let cli = Cli::try_parse_from([
            "bzmctl",
            "--width",
            "wide32",
            "encode",
            "read-reg",
            "--address",
            "2",
            "--engine",
            "0xfff",
            "--offset",
            "0x10",
            "-n",
            "4",
        ])
        .unwrap();

        assert_eq!(cli.width, Some(HeaderWidth::Wide32));
        let Commands::Encode { op } = cli.command else {
            panic!("expected encode subcommand");
        };
        let frame = op.to_command().unwrap().encode(op.address(), HeaderWidth::Wide32).unwrap();
        assert_eq!(&frame[..], &[0x02, 0x3F, 0xFF, 0x10, 0x03, 0x08]);
    }

    #[test]
    fn test_run_subcommand_flattened() {
        let cli = Cli::try_parse_from(["bzmctl", "noop", "--address", "3"]).unwrap();
        assert!(matches!(cli.command, Commands::Run(Op::Noop { target: Target { address: 3 } })));
    }

    #[test]
    fn test_write_job_checks_lengths() {
        let cli = Cli::try_parse_from([
            "bzmctl",
            "encode",
            "write-job",
            "-a",
            "1",
            "-e",
            "2",
            "--midstate",
            "00",
            "--merkle",
            "01020304",
        ])
        .unwrap();
        let Commands::Encode { op } = cli.command else {
            panic!("expected encode subcommand");
        };
        assert!(op.to_command().is_err());
    }
}
