//! axdl — command-line firmware flasher for AXDL/BSL USB bootloader
//! devices.
//!
//! Default (no-subcommand) action: flash the bundle named by `--axp`.
//! `list-devices` and `completions` are read-only diagnostics that
//! don't touch a device.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use console::style;
use env_logger::Env;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};

mod bundle;
mod config;

use config::Config;

/// axdl — flash AXDL/BSL USB bootloader devices from a firmware bundle.
#[derive(Parser)]
#[command(name = "axdl", author, version, about, long_about = None)]
struct Cli {
    /// Path to the AXP firmware bundle. Required for the default flash
    /// action unless a previous run in this directory remembered one.
    #[arg(long)]
    axp: Option<PathBuf>,

    /// USB vendor ID, hex (default 0x32C9).
    #[arg(long, value_parser = parse_hex_u16)]
    vid: Option<u16>,

    /// USB product ID, hex (default 0x1000).
    #[arg(long, value_parser = parse_hex_u16)]
    pid: Option<u16>,

    /// Send a RESET command after the burn completes.
    #[arg(long)]
    reset: bool,

    /// Raise log verbosity to debug for the axdl crates.
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List connected USB devices matching the (possibly overridden) VID/PID.
    ListDevices {
        /// Emit a JSON array instead of a human-readable table.
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completions on stdout.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

fn parse_hex_u16(s: &str) -> Result<u16, String> {
    let trimmed = s.trim_start_matches("0x").trim_start_matches("0X");
    u16::from_str_radix(trimmed, 16).map_err(|e| format!("invalid hex value '{s}': {e}"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    match cli.command {
        Some(Commands::ListDevices { json }) => cmd_list_devices(cli.vid, cli.pid, json),
        Some(Commands::Completions { shell }) => {
            cmd_completions(shell);
            Ok(())
        },
        None => cmd_flash(cli),
    }
}

fn init_logging(debug: bool) {
    let default_filter = if debug { "info,axdl=debug,axdl_cli=debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();
}

fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut std::io::stdout());
}

#[derive(serde::Serialize)]
struct DeviceRow {
    vid: String,
    pid: String,
    bus: u8,
    address: u8,
}

fn cmd_list_devices(vid_filter: Option<u16>, pid_filter: Option<u16>, json: bool) -> Result<()> {
    let mut rows = Vec::new();
    for device in rusb::devices().context("enumerating USB devices")?.iter() {
        let Ok(descriptor) = device.device_descriptor() else {
            continue;
        };
        if vid_filter.is_some_and(|v| v != descriptor.vendor_id()) {
            continue;
        }
        if pid_filter.is_some_and(|p| p != descriptor.product_id()) {
            continue;
        }
        rows.push(DeviceRow {
            vid: format!("{:#06x}", descriptor.vendor_id()),
            pid: format!("{:#06x}", descriptor.product_id()),
            bus: device.bus_number(),
            address: device.address(),
        });
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else if rows.is_empty() {
        println!("{}", style("no matching USB devices found").dim());
    } else {
        for row in &rows {
            println!(
                "  {} {}:{} (bus {}, addr {})",
                style("\u{2022}").green(),
                row.vid,
                row.pid,
                row.bus,
                row.address
            );
        }
    }
    Ok(())
}

fn cmd_flash(cli: Cli) -> Result<()> {
    let config = Config::load();
    let axp = cli
        .axp
        .or_else(|| config.axp.clone())
        .context("--axp is required (no bundle path given and none remembered from a previous run)")?;
    let vid = cli.vid.or(config.vid).unwrap_or(axdl::DEFAULT_VID);
    let pid = cli.pid.or(config.pid).unwrap_or(axdl::DEFAULT_PID);

    println!("{} loading bundle {}", style("\u{1F4E6}").cyan(), axp.display());
    let (extracted, manifest) = bundle::load(&axp).context("loading AXP bundle")?;
    info!(
        "manifest has {} partition(s), {} image(s)",
        manifest.partitions.len(),
        manifest.images.len()
    );

    println!("{} opening USB device {vid:#06x}:{pid:#06x}", style("\u{1F50C}").cyan());
    let mut transport = axdl::BulkTransport::new();
    transport
        .open(vid, pid, 15)
        .with_context(|| format!("opening USB device {vid:#06x}:{pid:#06x}"))?;

    let pb = ProgressBar::new(100);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
        .map(|s| s.progress_chars("#>-"))
    {
        pb.set_style(style);
    }

    let mut current_target = String::new();
    let result = axdl::sequencer::run(&mut transport, &manifest, |name| extracted.resolve(name), cli.reset, &mut |name, sent, total| {
        if name != current_target {
            current_target = name.to_string();
            pb.set_message(current_target.clone());
        }
        if total > 0 {
            pb.set_position((sent as u64 * 100) / total as u64);
        }
    });
    pb.finish_and_clear();

    // The transport is also closed by its own Drop impl on any early
    // return above this point; this call surfaces a close-time error
    // on the success path instead of silently discarding it.
    if let Err(e) = transport.close() {
        warn!("error closing transport: {e}");
    }

    result.context("flash job failed")?;

    if let Err(e) = config.remember(vid, pid, &axp) {
        warn!("could not persist config: {e}");
    }

    println!("{} flashing completed successfully", style("\u{2713}").green().bold());
    Ok(())
}
