//! SolarTracer CLI
//!
//! A command-line interface (CLI) application for interacting with EPEver
//! Tracer LS-B series solar charge controllers using Modbus RTU (serial).
//!
//! This tool allows users to:
//! - Read rated, realtime and statistical data from the controller.
//! - Read the decoded battery/charging status bitfields.
//! - Read the coil and discrete-input banks (load state, over-temperature,
//!   day/night), where the firmware supports them.
//! - Read and write the battery settings block, adapting a preset curve to
//!   the connected pack (capacity and nominal voltage).
//! - Control the load output coils.
//! - Run in a continuous daemon mode polling realtime data to the console.
//!
//! The CLI leverages the `solar_tracer_lib` crate for protocol definitions
//! and client operations.

use anyhow::{Context, Result, bail};
use clap::Parser;
use dialoguer::Confirm;
use flexi_logger::{Logger, LoggerHandle};
use log::*;
use solar_tracer_lib::{
    protocol as proto, tokio_common, tokio_sync_safe_client::SafeClient,
};
use std::{panic, time::Duration};

mod commandline;

fn logging_init(loglevel: LevelFilter) -> LoggerHandle {
    let log_handle = Logger::try_with_env_or_str(loglevel.as_str())
        .expect("Cannot init logging")
        .start()
        .expect("Cannot start logging");

    panic::set_hook(Box::new(|panic_info| {
        let (filename, line, column) = panic_info
            .location()
            .map(|loc| (loc.file(), loc.line(), loc.column()))
            .unwrap_or(("<unknown_file>", 0, 0)); // Provide defaults

        let cause_str = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            *s
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.as_str()
        } else {
            "<unknown_panic_cause>"
        };

        error!(
            target: "panic", // Optional target for filtering
            "Thread '{}' panicked at '{}': {}:{} - Cause: {}",
            std::thread::current().name().unwrap_or("<unnamed>"),
            filename,
            line,
            column,
            cause_str
        );
    }));
    log_handle
}

macro_rules! print_rated {
    ($device:expr) => {
        let rated = $device
            .read_rated_data()
            .with_context(|| "Cannot read rated data")?;
        println!("Rated: {}", rated);
    };
}

macro_rules! print_current {
    ($device:expr) => {
        let realtime = $device
            .read_realtime_data()
            .with_context(|| "Cannot read realtime data")?;
        println!("{}", realtime);
    };
}

macro_rules! print_stats {
    ($device:expr) => {
        let stats = $device
            .read_statistical_data()
            .with_context(|| "Cannot read statistics")?;
        println!("{}", stats);
    };
}

macro_rules! print_status {
    ($device:expr) => {
        match $device
            .read_device_status()
            .with_context(|| "Cannot read device status")?
        {
            Some(status) => println!("Status: {}", status),
            None => println!("Status registers are not supported by this device."),
        }
    };
}

macro_rules! print_system_status {
    ($device:expr) => {
        match $device
            .read_system_status()
            .with_context(|| "Cannot read system status")?
        {
            Some(status) => println!("System status: {}", status),
            None => println!("Coil/discrete-input banks are not supported by this device."),
        }
    };
}

macro_rules! print_settings {
    ($device:expr) => {
        match $device
            .read_battery_settings()
            .with_context(|| "Cannot read battery settings")?
        {
            Some(settings) => println!("{}", settings),
            None => println!("The settings bank is not supported by this device."),
        }
    };
}

/// Calculates the minimum recommended inter-command delay for Modbus RTU.
///
/// This is 3.5 character times at the fixed 115200 baud link, floored at the
/// 1.75 ms silence interval the Modbus specification requires for baud rates
/// above 19200.
fn minimum_rtu_delay() -> Duration {
    let bits_per_char = 11.0; // Common assumption for Modbus character time
    let char_time_secs = bits_per_char / f64::from(tokio_common::BAUD_RATE);
    let inter_frame_delay_secs = 3.5 * char_time_secs;
    let delay_micros = (inter_frame_delay_secs * 1_000_000.0) as u64;

    const MIN_INTER_FRAME_DELAY_MICROS: u64 = 1_750; // 1.75 ms
    Duration::from_micros(delay_micros.max(MIN_INTER_FRAME_DELAY_MICROS))
}

/// Checks if the user-provided RTU delay is sufficient; if not, uses the calculated minimum.
fn check_rtu_delay(user_delay: Duration) -> Duration {
    let min_rtu_delay = minimum_rtu_delay();
    if user_delay < min_rtu_delay {
        warn!(
            "User-defined RTU delay of {user_delay:?} is below the recommended minimum of {min_rtu_delay:?}. Using minimum."
        );
        min_rtu_delay
    } else {
        user_delay
    }
}

/// Opens the serial port and creates the stateful client.
///
/// Failure to open the transport is fatal and is never retried.
fn create_client(args: &commandline::CliArgs) -> Result<SafeClient> {
    info!(
        "Attempting to connect via RTU to device {} (Address: {}, SOC offset: {})...",
        args.device, args.address, args.soc_offset
    );
    let ctx = tokio_modbus::client::sync::rtu::connect_slave(
        &tokio_common::serial_port_builder(&args.device),
        tokio_modbus::Slave(*args.address),
    )
    .with_context(|| format!("Cannot open serial port {}", args.device))?;
    let mut client = SafeClient::with_layout(ctx, args.soc_offset);
    client.set_timeout(args.timeout);
    Ok(client)
}

/// Handles the battery settings write command.
///
/// This function adapts the preset to the pack, prompts the user for
/// confirmation, verifies the device supports the settings bank, and then
/// writes the block in one transaction.
fn handle_set_battery_settings(
    client: &mut SafeClient,
    preset: commandline::BatteryPreset,
    capacity: u16,
    voltage: u16,
) -> Result<()> {
    info!("Executing: Set Battery Settings ({preset:?}, {capacity} Ah, {voltage} V)");
    let settings = preset
        .settings()
        .customize(capacity, voltage)
        .with_context(|| "Cannot adapt the preset to the requested pack")?;

    println!("The following settings will be written to the controller:");
    println!("{settings}");
    println!(
        "WARNING: Wrong battery settings can damage the battery or the controller.\n\
         Make sure the values above match the connected pack."
    );

    if !Confirm::new()
        .with_prompt("Do you want to write these settings?")
        .default(false)
        .show_default(true)
        .interact()
        .context("Failed to get user confirmation.")?
    {
        info!("Battery settings write aborted by user.");
        return Ok(());
    }

    let capabilities = client
        .capabilities()
        .with_context(|| "Cannot probe device capabilities")?;
    if !capabilities.battery_settings {
        bail!("The connected device does not expose the settings bank; nothing was written.");
    }

    client
        .set_battery_settings(&settings)
        .with_context(|| "Failed to write battery settings")?;
    println!("Battery settings written successfully.");
    Ok(())
}

fn main() -> Result<()> {
    let args = commandline::CliArgs::parse();

    // 1. Initialize logging as early as possible
    let _log_handle = logging_init(args.verbose.log_level_filter());
    info!(
        "SolarTracer CLI started. Log level: {}",
        args.verbose.log_level_filter()
    );

    // 2. Connect; an unopenable serial port is fatal.
    let delay = check_rtu_delay(args.delay);
    let mut client = create_client(&args)?;

    // 3. Execute the command
    match &args.command {
        commandline::CliCommands::Daemon { poll_interval } => {
            info!("Starting daemon mode: interval={poll_interval:?}");
            loop {
                debug!("Daemon: Reading realtime data for stdout...");
                print_current!(&mut client);
                std::thread::sleep(delay.max(*poll_interval));
            }
        }
        commandline::CliCommands::ReadRated => {
            info!("Executing: Read Rated Data");
            print_rated!(&mut client);
        }
        commandline::CliCommands::ReadCurrent => {
            info!("Executing: Read Realtime Data");
            print_current!(&mut client);
        }
        commandline::CliCommands::ReadStats => {
            info!("Executing: Read Statistics");
            print_stats!(&mut client);
        }
        commandline::CliCommands::ReadStatus => {
            info!("Executing: Read Device Status");
            print_status!(&mut client);
        }
        commandline::CliCommands::ReadSystemStatus => {
            info!("Executing: Read System Status");
            print_system_status!(&mut client);
        }
        commandline::CliCommands::ReadSettings => {
            info!("Executing: Read Battery Settings");
            print_settings!(&mut client);
        }
        commandline::CliCommands::ReadAll => {
            info!("Executing: Read All Device Values");
            print_rated!(&mut client);
            std::thread::sleep(delay);
            print_current!(&mut client);
            std::thread::sleep(delay);
            print_stats!(&mut client);
            std::thread::sleep(delay);
            print_status!(&mut client);
            std::thread::sleep(delay);
            print_system_status!(&mut client);
            std::thread::sleep(delay);
            print_settings!(&mut client);
        }
        commandline::CliCommands::ReadCapabilities => {
            info!("Executing: Probe Capabilities");
            let capabilities = client
                .probe_capabilities()
                .with_context(|| "Cannot probe device capabilities")?;
            println!("Capabilities: {capabilities}");
        }
        commandline::CliCommands::ReadRegister { address, decimals } => {
            info!("Executing: Read Input Register {address:#06X} ({decimals} decimals)");
            let value = client
                .read_input_register(*address, *decimals)
                .with_context(|| format!("Cannot read register {address:#06X}"))?;
            println!("Register {address:#06X}: {value}");
        }
        commandline::CliCommands::SetBatterySettings {
            preset,
            capacity,
            voltage,
        } => {
            handle_set_battery_settings(&mut client, *preset, *capacity, *voltage)?;
        }
        commandline::CliCommands::LoadControl {
            manual_on,
            test_mode,
            force_on,
        } => {
            info!(
                "Executing: Load Control (manual={manual_on}, test={test_mode}, force={force_on})"
            );
            let capabilities = client
                .capabilities()
                .with_context(|| "Cannot probe device capabilities")?;
            if !capabilities.load_coils {
                bail!("The connected device does not expose the load control coils.");
            }
            let control = proto::LoadControl {
                manual_on: *manual_on,
                test_mode: *test_mode,
                force_on: *force_on,
            };
            if client.set_load_control(control) {
                println!("Load control coils written successfully.");
            } else {
                bail!("One or more coil writes failed; the load state may be inconsistent.");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimum_rtu_delay_is_clamped() {
        // 3.5 character times at 115200 baud are 334 us, well below the
        // 1.75 ms floor, so the floor always applies on this link.
        assert_eq!(minimum_rtu_delay(), Duration::from_micros(1_750));
    }

    #[test]
    fn test_check_rtu_delay() {
        let min_delay = minimum_rtu_delay();

        assert_eq!(check_rtu_delay(Duration::from_micros(100)), min_delay);
        assert_eq!(
            check_rtu_delay(Duration::from_millis(50)),
            Duration::from_millis(50)
        );
        assert_eq!(check_rtu_delay(min_delay), min_delay);
    }
}
