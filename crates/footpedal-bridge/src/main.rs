//! footpedald - USB foot pedal to keyboard daemon

#![deny(static_mut_refs)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use footpedal_bridge::config::parse_usb_id;
use footpedal_bridge::device::{UsbDeviceSummary, list_devices};
use footpedal_bridge::{BridgeConfig, BridgeError, ConfigOverrides, ShutdownSignal, bridge};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "footpedald")]
#[command(about = "Forward USB foot pedal presses to a virtual keyboard")]
#[command(version)]
struct Cli {
    /// JSON config file (built-in defaults when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Vendor ID, hex (0x05f3) or decimal
    #[arg(long, global = true, value_parser = parse_usb_id)]
    vid: Option<u16>,

    /// Product ID, hex (0x00ff) or decimal
    #[arg(long, global = true, value_parser = parse_usb_id)]
    pid: Option<u16>,

    /// Read timeout in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Name of the virtual keyboard
    #[arg(long, global = true)]
    name: Option<String>,

    /// Verbose output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Run the bridge until SIGINT or SIGTERM (default)
    Run,
    /// List attached USB devices
    List,
    /// Print the effective configuration as JSON
    ShowConfig,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            vendor_id: self.vid,
            product_id: self.pid,
            read_timeout_ms: self.timeout_ms,
            device_name: self.name.clone(),
        }
    }

    fn effective_config(&self) -> Result<BridgeConfig> {
        let mut config = BridgeConfig::load(self.config.as_deref())?;
        config.apply(self.overrides());
        Ok(config)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("footpedald={log_level},footpedal_bridge={log_level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match execute_command(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}

fn execute_command(cli: &Cli) -> Result<()> {
    match cli.command.as_ref().unwrap_or(&Commands::Run) {
        Commands::Run => run_bridge(cli),
        Commands::List => list(cli),
        Commands::ShowConfig => show_config(cli),
    }
}

fn run_bridge(cli: &Cli) -> Result<()> {
    let config = cli.effective_config()?;
    let shutdown = ShutdownSignal::new();
    shutdown.install_signal_handler()?;

    let summary = bridge::run(&config, &shutdown).with_context(|| {
        format!(
            "Foot pedal bridge failed (VID=0x{:04X} PID=0x{:04X})",
            config.vendor_id, config.product_id
        )
    })?;

    info!(
        reports = summary.reports,
        edges = summary.edges,
        transport_errors = summary.transport_errors,
        "Clean shutdown"
    );
    Ok(())
}

fn list(cli: &Cli) -> Result<()> {
    let config = cli.effective_config()?;
    let devices = list_devices().context("Failed to enumerate USB devices")?;
    print!("{}", render_device_table(&devices, &config));
    Ok(())
}

fn show_config(cli: &Cli) -> Result<()> {
    let config = cli.effective_config()?;
    config.validate()?;
    let json = serde_json::to_string_pretty(&config).context("Failed to serialize config")?;
    println!("{json}");
    Ok(())
}

fn render_device_table(devices: &[UsbDeviceSummary], config: &BridgeConfig) -> String {
    if devices.is_empty() {
        return "No USB devices found.\n".to_string();
    }

    let mut out = format!("{:<4} {:<8} {:<8} PID\n", "Bus", "Address", "VID");
    out.push_str(&"-".repeat(40));
    out.push('\n');
    for dev in devices {
        let marker = if dev.vendor_id == config.vendor_id && dev.product_id == config.product_id {
            "  <- foot pedal"
        } else {
            ""
        };
        out.push_str(&format!(
            "{:03}  {:03}      0x{:04X}   0x{:04X}{marker}\n",
            dev.bus, dev.address, dev.vendor_id, dev.product_id
        ));
    }
    out
}

fn exit_code(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<BridgeError>())
        .map_or(1, BridgeError::exit_code)
}

// ── BDD-style scenario tests ────────────────────────────────────────────────
