//! Asynchronous `tokio-modbus` client for the Tracer LS-B solar charge
//! controller.
//!
//! The same operation surface as [`crate::tokio_sync`], as `async` functions
//! over a `tokio_modbus::client::Context`. All methods must be `.await`ed,
//! and long-running transactions should be bounded with
//! `tokio::time::timeout` since the async context carries no built-in
//! response timeout.
//!
//! # Examples
//!
//! ```no_run
//! use solar_tracer_lib::protocol::RealtimeLayout;
//! use solar_tracer_lib::tokio_async::Tracer;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let builder = solar_tracer_lib::tokio_common::serial_port_builder("/dev/ttyUSB0");
//!     let port = tokio_serial::SerialStream::open(&builder)?;
//!     let mut modbus_ctx = tokio_modbus::client::rtu::attach_slave(port, tokio_modbus::Slave(1));
//!
//!     let result = tokio::time::timeout(
//!         solar_tracer_lib::tokio_common::RESPONSE_TIMEOUT,
//!         Tracer::read_realtime_data(&mut modbus_ctx, &RealtimeLayout::default()),
//!     )
//!     .await;
//!
//!     match result {
//!         Ok(Ok(realtime)) => println!("{realtime}"),
//!         Ok(Err(e)) => eprintln!("Modbus error: {e}"),
//!         Err(e) => eprintln!("Timeout error: {e}"),
//!     }
//!
//!     Ok(())
//! }
//! ```

use crate::{protocol as proto, tokio_common::Result};
use tokio_modbus::prelude::{Reader, Writer};

/// Asynchronous client for interacting with the Tracer controller over
/// Modbus RTU.
#[derive(Debug)]
pub struct Tracer;

impl Tracer {
    /// Helper function to map tokio result to our result.
    fn map_tokio_result<T>(result: tokio_modbus::Result<T>) -> Result<T> {
        match result {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(err)) => Err(err.into()), // Modbus exception
            Err(err) => Err(err.into()),     // IO error
        }
    }

    /// Helper function to read input registers and decode them into a specific type.
    async fn read_input_and_decode<T, F>(
        ctx: &mut tokio_modbus::client::Context,
        address: u16,
        quantity: u16,
        decoder: F,
    ) -> Result<T>
    where
        F: FnOnce(&[u16]) -> std::result::Result<T, proto::Error>,
    {
        Ok(decoder(&Self::map_tokio_result(
            ctx.read_input_registers(address, quantity).await,
        )?)?)
    }

    /// Helper function to read holding registers and decode them into a specific type.
    async fn read_holding_and_decode<T, F>(
        ctx: &mut tokio_modbus::client::Context,
        address: u16,
        quantity: u16,
        decoder: F,
    ) -> Result<T>
    where
        F: FnOnce(&[u16]) -> std::result::Result<T, proto::Error>,
    {
        Ok(decoder(&Self::map_tokio_result(
            ctx.read_holding_registers(address, quantity).await,
        )?)?)
    }

    /// Reads the rated (nameplate) data block (5 input registers at 0x3000).
    pub async fn read_rated_data(
        ctx: &mut tokio_modbus::client::Context,
    ) -> Result<proto::RatedData> {
        Self::read_input_and_decode(
            ctx,
            proto::RatedData::ADDRESS,
            proto::RatedData::QUANTITY,
            proto::RatedData::decode_from_input_registers,
        )
        .await
    }

    /// Reads the realtime measurement block laid out per `layout`.
    pub async fn read_realtime_data(
        ctx: &mut tokio_modbus::client::Context,
        layout: &proto::RealtimeLayout,
    ) -> Result<proto::RealtimeData> {
        Self::read_input_and_decode(
            ctx,
            proto::RealtimeData::ADDRESS,
            layout.quantity(),
            |regs| proto::RealtimeData::decode_from_input_registers(regs, layout),
        )
        .await
    }

    /// Reads the accumulated statistics block (20 input registers at 0x3300).
    pub async fn read_statistical_data(
        ctx: &mut tokio_modbus::client::Context,
    ) -> Result<proto::StatisticalData> {
        Self::read_input_and_decode(
            ctx,
            proto::StatisticalData::ADDRESS,
            proto::StatisticalData::QUANTITY,
            proto::StatisticalData::decode_from_input_registers,
        )
        .await
    }

    /// Reads and decodes both status bitfield registers (0x3200, 0x3201).
    pub async fn read_device_status(
        ctx: &mut tokio_modbus::client::Context,
    ) -> Result<proto::DeviceStatus> {
        Self::read_input_and_decode(
            ctx,
            proto::DeviceStatus::ADDRESS,
            proto::DeviceStatus::QUANTITY,
            proto::DeviceStatus::decode_from_input_registers,
        )
        .await
    }

    /// Reads the battery settings block (15 holding registers at 0x9000).
    pub async fn read_battery_settings(
        ctx: &mut tokio_modbus::client::Context,
    ) -> Result<proto::BatterySettings> {
        Self::read_holding_and_decode(
            ctx,
            proto::BatterySettings::ADDRESS,
            proto::BatterySettings::QUANTITY,
            proto::BatterySettings::decode_from_holding_registers,
        )
        .await
    }

    /// Writes the battery settings block as one multi-register transaction.
    pub async fn set_battery_settings(
        ctx: &mut tokio_modbus::client::Context,
        settings: &proto::BatterySettings,
    ) -> Result<()> {
        Self::map_tokio_result(
            ctx.write_multiple_registers(
                proto::BatterySettings::ADDRESS,
                settings.encode_for_write_registers(),
            )
            .await,
        )
    }

    /// Reads a single input register and scales it by `10^decimals`.
    pub async fn read_input_register(
        ctx: &mut tokio_modbus::client::Context,
        address: u16,
        decimals: u32,
    ) -> Result<f64> {
        let regs = Self::map_tokio_result(ctx.read_input_registers(address, 1).await)?;
        if regs.len() != 1 {
            return Err(proto::Error::RegisterCountMismatch {
                address,
                expected: 1,
                actual: regs.len(),
            }
            .into());
        }
        Ok(proto::scale(regs[0], decimals))
    }

    /// Reads a single holding register and scales it by `10^decimals`.
    pub async fn read_holding_register(
        ctx: &mut tokio_modbus::client::Context,
        address: u16,
        decimals: u32,
    ) -> Result<f64> {
        let regs = Self::map_tokio_result(ctx.read_holding_registers(address, 1).await)?;
        if regs.len() != 1 {
            return Err(proto::Error::RegisterCountMismatch {
                address,
                expected: 1,
                actual: regs.len(),
            }
            .into());
        }
        Ok(proto::scale(regs[0], decimals))
    }

    /// Reads one load control coil.
    pub async fn read_coil(
        ctx: &mut tokio_modbus::client::Context,
        coil: proto::Coil,
    ) -> Result<bool> {
        let bits = Self::map_tokio_result(ctx.read_coils(coil.address(), 1).await)?;
        if bits.len() != 1 {
            return Err(proto::Error::RegisterCountMismatch {
                address: coil.address(),
                expected: 1,
                actual: bits.len(),
            }
            .into());
        }
        Ok(bits[0])
    }

    /// Writes one load control coil. The write is not retried on failure.
    pub async fn set_coil(
        ctx: &mut tokio_modbus::client::Context,
        coil: proto::Coil,
        value: bool,
    ) -> Result<()> {
        Self::map_tokio_result(ctx.write_single_coil(coil.address(), value).await)
    }

    /// Reads one discrete input.
    pub async fn read_discrete_input(
        ctx: &mut tokio_modbus::client::Context,
        input: proto::DiscreteInput,
    ) -> Result<bool> {
        let bits = Self::map_tokio_result(ctx.read_discrete_inputs(input.address(), 1).await)?;
        if bits.len() != 1 {
            return Err(proto::Error::RegisterCountMismatch {
                address: input.address(),
                expected: 1,
                actual: bits.len(),
            }
            .into());
        }
        Ok(bits[0])
    }

    /// Reads the over-temperature discrete input (0x2000).
    pub async fn read_over_temperature(
        ctx: &mut tokio_modbus::client::Context,
    ) -> Result<bool> {
        Self::read_discrete_input(ctx, proto::DiscreteInput::OverTemperature).await
    }

    /// Reads the day/night discrete input (0x200C).
    pub async fn read_day_night(
        ctx: &mut tokio_modbus::client::Context,
    ) -> Result<proto::DayNight> {
        Ok(proto::DayNight::from(
            Self::read_discrete_input(ctx, proto::DiscreteInput::DayNight).await?,
        ))
    }

    /// Reads the coil and discrete-input banks as one snapshot.
    pub async fn read_system_status(
        ctx: &mut tokio_modbus::client::Context,
    ) -> Result<proto::SystemStatus> {
        let coils = Self::map_tokio_result(
            ctx.read_coils(
                proto::SystemStatus::COIL_ADDRESS,
                proto::SystemStatus::COIL_QUANTITY,
            )
            .await,
        )?;
        let discrete_inputs = Self::map_tokio_result(
            ctx.read_discrete_inputs(
                proto::SystemStatus::DISCRETE_ADDRESS,
                proto::SystemStatus::DISCRETE_QUANTITY,
            )
            .await,
        )?;
        Ok(proto::SystemStatus::decode_from_bits(
            &coils,
            &discrete_inputs,
        )?)
    }

    /// Writes all three load control coils.
    ///
    /// Every coil write is attempted regardless of earlier failures. Returns
    /// `true` only if all three writes succeeded.
    pub async fn set_load_control(
        ctx: &mut tokio_modbus::client::Context,
        control: proto::LoadControl,
    ) -> bool {
        let manual = Self::set_coil(ctx, proto::Coil::ManualLoadControl, control.manual_on)
            .await
            .is_ok();
        let test = Self::set_coil(ctx, proto::Coil::LoadTestMode, control.test_mode)
            .await
            .is_ok();
        let force = Self::set_coil(ctx, proto::Coil::ForceLoadOn, control.force_on)
            .await
            .is_ok();
        manual && test && force
    }

    /// Probes which optional register banks the connected device implements.
    ///
    /// See [`crate::tokio_sync::Tracer::probe_capabilities`] for the probe
    /// semantics.
    pub async fn probe_capabilities(
        ctx: &mut tokio_modbus::client::Context,
    ) -> Result<proto::Capabilities> {
        let battery_settings = Self::probe_outcome(
            ctx.read_holding_registers(proto::BatterySettings::ADDRESS, 1)
                .await,
        )?;
        let status_registers = Self::probe_outcome(
            ctx.read_input_registers(proto::DeviceStatus::ADDRESS, 1)
                .await,
        )?;
        let load_coils = Self::probe_outcome(
            ctx.read_coils(proto::Coil::ManualLoadControl.address(), 1)
                .await,
        )?;
        let discrete_inputs = Self::probe_outcome(
            ctx.read_discrete_inputs(proto::DiscreteInput::OverTemperature.address(), 1)
                .await,
        )?;
        Ok(proto::Capabilities {
            battery_settings,
            status_registers,
            load_coils,
            discrete_inputs,
        })
    }

    /// Maps a probe read outcome onto "bank supported".
    fn probe_outcome<T>(result: tokio_modbus::Result<T>) -> Result<bool> {
        match result {
            Ok(Ok(_)) => Ok(true),
            Ok(Err(
                tokio_modbus::ExceptionCode::IllegalFunction
                | tokio_modbus::ExceptionCode::IllegalDataAddress
                | tokio_modbus::ExceptionCode::IllegalDataValue,
            )) => Ok(false),
            Ok(Err(exception)) => Err(exception.into()),
            Err(tokio_modbus::Error::Transport(error))
                if error.kind() == std::io::ErrorKind::TimedOut =>
            {
                Ok(false)
            }
            Err(error) => Err(error.into()),
        }
    }
}
