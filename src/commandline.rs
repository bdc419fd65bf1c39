use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use solar_tracer_lib::protocol as proto;
use std::time::Duration;

fn default_device_name() -> String {
    if cfg!(target_os = "windows") {
        String::from("COM1") // Common default for Windows, though may vary.
    } else {
        String::from("/dev/ttyUSB0") // Common default for USB-to-serial adapters on Linux.
    }
}

fn parse_address(s: &str) -> Result<proto::Address, String> {
    let address_val =
        clap_num::maybe_hex::<u8>(s).map_err(|e| format!("Invalid address format: {e}"))?;
    proto::Address::try_from(address_val).map_err(|e| e.to_string())
}

fn parse_soc_offset(s: &str) -> Result<proto::RealtimeLayout, String> {
    let offset = clap_num::maybe_hex::<u16>(s)
        .map_err(|e| format!("Invalid state of charge offset format: {e}"))?;
    proto::RealtimeLayout::try_from(offset).map_err(|e| e.to_string())
}

fn parse_register_address(s: &str) -> Result<u16, String> {
    clap_num::maybe_hex::<u16>(s).map_err(|e| format!("Invalid register address format: {e}"))
}

/// Base settings curve for [`CliCommands::SetBatterySettings`].
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatteryPreset {
    /// Lead-acid curve (sealed/gel/flooded packs).
    LeadAcid,
    /// LiFePO4 curve.
    Lifepo4,
}

impl BatteryPreset {
    pub fn settings(self) -> proto::BatterySettings {
        match self {
            Self::LeadAcid => proto::BatterySettings::LEAD_ACID,
            Self::Lifepo4 => proto::BatterySettings::LIFEPO4,
        }
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CliCommands {
    /// Run in daemon mode: continuously poll realtime data at a specified
    /// interval and print it to the standard output.
    Daemon {
        /// Interval for fetching realtime data (e.g., "10s", "1m")
        #[arg(value_parser = humantime::parse_duration, short, long, default_value = "10sec")]
        poll_interval: Duration,
    },

    /// Read and display the rated (nameplate) data.
    ReadRated,

    /// Read and display the current realtime measurements.
    ReadCurrent,

    /// Read and display the accumulated energy statistics.
    ReadStats,

    /// Read and display the decoded battery and charging status bitfields.
    /// Not every firmware exposes this register bank.
    ReadStatus,

    /// Read and display the load/test/force coils and the discrete inputs
    /// (over-temperature, day/night).
    /// Not every firmware exposes these banks.
    ReadSystemStatus,

    /// Read and display the battery settings block.
    /// Not every firmware exposes this register bank.
    ReadSettings,

    /// Read and display all supported device values.
    ReadAll,

    /// Probe and display which optional register banks the device supports.
    ReadCapabilities,

    /// Read a single input register (function code 4) scaled by 10^decimals.
    /// The address can be specified in decimal or hexadecimal (e.g. "0x3100").
    #[clap(verbatim_doc_comment)]
    ReadRegister {
        /// Register address.
        #[arg(value_parser = parse_register_address)]
        address: u16,
        /// Number of decimals the raw value is scaled by.
        #[arg(default_value_t = 2)]
        decimals: u32,
    },

    /// Write the battery settings block from a preset curve.
    /// The curve is adapted to the pack before writing: the capacity word is
    /// replaced, and for packs above 12 V every voltage threshold is scaled
    /// by voltage/12.
    /// **Warning:** Writing wrong thresholds can damage the battery.
    #[clap(verbatim_doc_comment)]
    SetBatterySettings {
        /// Base settings curve.
        #[arg(value_enum, long)]
        preset: BatteryPreset,

        /// Battery capacity in Ah.
        #[arg(long, default_value_t = proto::BatterySettings::BASE_CAPACITY)]
        capacity: u16,

        /// Nominal pack voltage in V (12, 24, ...).
        #[arg(long, default_value_t = proto::BatterySettings::BASE_VOLTAGE)]
        voltage: u16,
    },

    /// Write the three load control coils (manual, test mode, force).
    /// All three coils are written in one command; omitted flags write "off".
    #[clap(verbatim_doc_comment)]
    LoadControl {
        /// Switch the load on in manual mode.
        #[arg(long)]
        manual_on: bool,

        /// Enable the load test mode.
        #[arg(long)]
        test_mode: bool,

        /// Force the load on regardless of mode.
        #[arg(long)]
        force_on: bool,
    },
}

const fn about_text() -> &'static str {
    "SolarTracer CLI - Interact with EPEver Tracer LS-B solar charge controllers via Modbus RTU."
}

#[derive(Parser, Debug)]
#[command(name="solartracer", author, version, about=about_text(), long_about = None, propagate_version = true)]
pub struct CliArgs {
    /// Configure verbosity of logging output.
    /// -v for info, -vv for debug, -vvv for trace. Default is off.
    #[command(flatten)]
    pub verbose: Verbosity<WarnLevel>,

    /// Serial port device name.
    /// Examples: "/dev/ttyUSB0" (Linux), "COM3" (Windows).
    #[arg(short, long, default_value_t = default_device_name())]
    pub device: String,

    /// The Modbus RTU device address.
    /// Must be unique on the RS485 bus, ranging from 1 to 247.
    #[arg(short, long, default_value_t = proto::Address::default(), value_parser = parse_address)]
    pub address: proto::Address,

    /// Block offset of the state of charge register within the realtime
    /// data block. Firmware dependent: deployed units use 0x13, the LS-B
    /// protocol document V1.1 specifies 0x1A.
    #[arg(long, default_value_t = proto::RealtimeLayout::default(), value_parser = parse_soc_offset, verbatim_doc_comment)]
    pub soc_offset: proto::RealtimeLayout,

    /// Modbus I/O timeout for read/write operations.
    /// Examples: "2s", "500ms".
    #[arg(global = true, long, default_value = "2s", value_parser = humantime::parse_duration, verbatim_doc_comment)]
    pub timeout: Duration,

    /// Minimum delay between multiple Modbus commands sent to the same device.
    /// Important for Modbus RTU, especially with USB-to-RS485 converters that
    /// need time to switch between transmitting (TX) and receiving (RX) modes.
    /// Examples: "50ms", "100ms".
    #[arg(global = true, long, default_value = "50ms", value_parser = humantime::parse_duration, verbatim_doc_comment)]
    pub delay: Duration,

    /// The device command to execute.
    #[command(subcommand)]
    pub command: CliCommands,
}
