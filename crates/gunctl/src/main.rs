//! gunctl - OpenSight light-gun control CLI
//!
//! Connects to a gun over its serial port for diagnostics and
//! configuration: device identity, raw opcode probing, recoil tests, and
//! button assignment. The vision pipeline is not involved; this tool talks
//! protocol only.

#![deny(static_mut_refs)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serial_lightgun_protocol::{
    Button, KeyCode, ProtocolEngine, SerialPortLink, SystemClock,
};

#[derive(Parser)]
#[command(name = "gunctl")]
#[command(about = "OpenSight light-gun control CLI - device diagnostics and configuration")]
#[command(version)]
struct Cli {
    /// Serial port the gun is attached to
    #[arg(long, global = true, default_value = default_port())]
    port: String,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connect, run the start procedure, and print device information
    Connect,
    /// Connect and print device information without starting the device
    Info,
    /// Transmit a raw opcode frame and print the response bytes
    Debug {
        /// Opcode byte
        opcode: u8,
        /// Up to four payload bytes as hex, e.g. "01ff"
        #[arg(default_value = "")]
        payload: String,
    },
    /// Fire a single recoil test pulse
    RecoilTest,
    /// Assign a key to a button, e.g. `assign trigger space`
    Assign {
        /// Button name (trigger, pump-action, front-left, dpad-up, ...)
        button: String,
        /// Key name (space, enter, a..z, 1..4, none, ...)
        key: String,
    },
    /// Validate a video settings file and print the parsed result
    Settings {
        /// Path to a TOML settings file
        path: PathBuf,
    },
}

fn default_port() -> &'static str {
    if cfg!(windows) { "COM3" } else { "/dev/ttyUSB0" }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Connect => {
            let mut engine = connect(&cli.port)?;
            engine.start()?;
            print_info(&mut engine)?;
            engine.disconnect();
        }
        Command::Info => {
            let mut engine = connect(&cli.port)?;
            print_info(&mut engine)?;
            engine.disconnect();
        }
        Command::Debug { opcode, payload } => {
            let payload = hex::decode(&payload).context("payload must be hex")?;
            let mut engine = connect(&cli.port)?;
            let response = engine.debug(opcode, &payload)?;
            if response.is_empty() {
                println!("(no response)");
            } else {
                println!("{response}");
            }
            engine.disconnect();
        }
        Command::RecoilTest => {
            let mut engine = connect(&cli.port)?;
            engine.recoil_test()?;
            println!("recoil pulse sent");
            engine.disconnect();
        }
        Command::Assign { button, key } => {
            let Some(button) = Button::from_name(&button) else {
                bail!("unknown button '{button}'");
            };
            let Some(key) = KeyCode::from_name(&key) else {
                bail!("unknown key '{key}'");
            };
            let mut engine = connect(&cli.port)?;
            engine.assign_button(button, key)?;
            println!("{button:?} -> {key:?}");
            engine.disconnect();
        }
        Command::Settings { path } => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let settings: opensight_vision::VideoSettings =
                toml::from_str(&text).context("parsing settings")?;
            println!("{settings:#?}");
        }
    }

    Ok(())
}

fn connect(port: &str) -> Result<ProtocolEngine<SerialPortLink, SystemClock>> {
    let mut engine = ProtocolEngine::new();
    let path = port.to_string();
    engine
        .connect_with(move || SerialPortLink::open(&path))
        .with_context(|| format!("connecting to {port}"))?;
    Ok(engine)
}

fn print_info(engine: &mut ProtocolEngine<SerialPortLink, SystemClock>) -> Result<()> {
    let firmware = engine.request_firmware()?;
    let unique_id = engine.request_unique_id()?;
    let colour = engine.request_colour()?;
    let date = engine.request_manufacture_date()?;
    let camera = engine.request_camera()?;
    let calibration_x = engine.request_calibration_x()?;
    let calibration_y = engine.request_calibration_y()?;

    println!("firmware:         v{firmware}");
    println!("unique id:        {unique_id}");
    println!("colour:           {colour}");
    println!("manufactured:     {date}");
    println!("camera:           {camera}");
    println!("calibration:      ({calibration_x:+.2}%, {calibration_y:+.2}%)");
    Ok(())
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_target(false)
        .init();
}
