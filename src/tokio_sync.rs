//! Synchronous `tokio-modbus` client for the Tracer LS-B solar charge
//! controller.
//!
//! This module provides a high-level API (`Tracer` struct) of stateless
//! operations over a `tokio_modbus::client::sync::Context` connected via
//! Modbus RTU. It handles the conversion between the Rust types defined in
//! the `crate::protocol` module and the raw Modbus register values.
//!
//! Every snapshot is produced from block reads: one transaction per register
//! bank, never per-register round trips. A failed transaction aborts the
//! whole snapshot; partial snapshots are never returned.
//!
//! # Examples
//!
//! ```no_run
//! use solar_tracer_lib::protocol::RealtimeLayout;
//! use solar_tracer_lib::tokio_sync::Tracer;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let builder = solar_tracer_lib::tokio_common::serial_port_builder("/dev/ttyUSB0");
//!     let slave = tokio_modbus::Slave(1);
//!     let mut modbus_ctx = tokio_modbus::client::sync::rtu::connect_slave(&builder, slave)?;
//!     modbus_ctx.set_timeout(Some(solar_tracer_lib::tokio_common::RESPONSE_TIMEOUT));
//!
//!     let rated = Tracer::read_rated_data(&mut modbus_ctx)?;
//!     println!("Rated: {rated}");
//!
//!     let realtime = Tracer::read_realtime_data(&mut modbus_ctx, &RealtimeLayout::default())?;
//!     println!("{realtime}");
//!
//!     Ok(())
//! }
//! ```

use crate::{protocol as proto, tokio_common::Result};
use tokio_modbus::prelude::{SyncReader, SyncWriter};

/// Synchronous client for interacting with the Tracer controller over
/// Modbus RTU.
///
/// All methods that interact with the device block the current thread for at
/// most the response timeout configured on the context.
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
    fn read_input_and_decode<T, F>(
        ctx: &mut tokio_modbus::client::sync::Context,
        address: u16,
        quantity: u16,
        decoder: F,
    ) -> Result<T>
    where
        F: FnOnce(&[u16]) -> std::result::Result<T, proto::Error>,
    {
        Ok(decoder(&Self::map_tokio_result(
            ctx.read_input_registers(address, quantity),
        )?)?)
    }

    /// Helper function to read holding registers and decode them into a specific type.
    fn read_holding_and_decode<T, F>(
        ctx: &mut tokio_modbus::client::sync::Context,
        address: u16,
        quantity: u16,
        decoder: F,
    ) -> Result<T>
    where
        F: FnOnce(&[u16]) -> std::result::Result<T, proto::Error>,
    {
        Ok(decoder(&Self::map_tokio_result(
            ctx.read_holding_registers(address, quantity),
        )?)?)
    }

    /// Reads the rated (nameplate) data block.
    ///
    /// One block read of 5 input registers starting at 0x3000.
    ///
    /// # Errors
    ///
    /// * `Error::TokioError` if the transaction fails (timeout, IO error).
    /// * `Error::TokioExceptionError` on a Modbus exception response.
    /// * `Error::ProtocolError` if the device returns an unexpected number of
    ///   registers.
    pub fn read_rated_data(
        ctx: &mut tokio_modbus::client::sync::Context,
    ) -> Result<proto::RatedData> {
        Self::read_input_and_decode(
            ctx,
            proto::RatedData::ADDRESS,
            proto::RatedData::QUANTITY,
            proto::RatedData::decode_from_input_registers,
        )
    }

    /// Reads the realtime measurement block.
    ///
    /// One block read starting at 0x3100; the quantity and the position of
    /// the state of charge register follow from `layout`, which is firmware
    /// dependent (see [`proto::RealtimeLayout`]).
    pub fn read_realtime_data(
        ctx: &mut tokio_modbus::client::sync::Context,
        layout: &proto::RealtimeLayout,
    ) -> Result<proto::RealtimeData> {
        Self::read_input_and_decode(
            ctx,
            proto::RealtimeData::ADDRESS,
            layout.quantity(),
            |regs| proto::RealtimeData::decode_from_input_registers(regs, layout),
        )
    }

    /// Reads the accumulated statistics block (20 input registers at 0x3300).
    pub fn read_statistical_data(
        ctx: &mut tokio_modbus::client::sync::Context,
    ) -> Result<proto::StatisticalData> {
        Self::read_input_and_decode(
            ctx,
            proto::StatisticalData::ADDRESS,
            proto::StatisticalData::QUANTITY,
            proto::StatisticalData::decode_from_input_registers,
        )
    }

    /// Reads and decodes both status bitfield registers (0x3200, 0x3201).
    ///
    /// Not every firmware exposes this bank; see
    /// [`Self::probe_capabilities`].
    pub fn read_device_status(
        ctx: &mut tokio_modbus::client::sync::Context,
    ) -> Result<proto::DeviceStatus> {
        Self::read_input_and_decode(
            ctx,
            proto::DeviceStatus::ADDRESS,
            proto::DeviceStatus::QUANTITY,
            proto::DeviceStatus::decode_from_input_registers,
        )
    }

    /// Reads the battery settings block (15 holding registers at 0x9000).
    pub fn read_battery_settings(
        ctx: &mut tokio_modbus::client::sync::Context,
    ) -> Result<proto::BatterySettings> {
        Self::read_holding_and_decode(
            ctx,
            proto::BatterySettings::ADDRESS,
            proto::BatterySettings::QUANTITY,
            proto::BatterySettings::decode_from_holding_registers,
        )
    }

    /// Writes the battery settings block as one multi-register transaction.
    ///
    /// The write is not retried on failure. Use
    /// [`proto::BatterySettings::customize`] to adapt a preset curve to the
    /// connected pack first.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use solar_tracer_lib::protocol::BatterySettings;
    /// use solar_tracer_lib::tokio_sync::Tracer;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// # let builder = solar_tracer_lib::tokio_common::serial_port_builder("/dev/ttyUSB0");
    /// # let mut modbus_ctx = tokio_modbus::client::sync::rtu::connect_slave(&builder, tokio_modbus::Slave(1))?;
    /// // 24 V / 150 Ah lead-acid pack.
    /// let settings = BatterySettings::LEAD_ACID.customize(150, 24)?;
    /// Tracer::set_battery_settings(&mut modbus_ctx, &settings)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn set_battery_settings(
        ctx: &mut tokio_modbus::client::sync::Context,
        settings: &proto::BatterySettings,
    ) -> Result<()> {
        Self::map_tokio_result(ctx.write_multiple_registers(
            proto::BatterySettings::ADDRESS,
            settings.encode_for_write_registers(),
        ))
    }

    /// Reads a single input register and scales it by `10^decimals`.
    pub fn read_input_register(
        ctx: &mut tokio_modbus::client::sync::Context,
        address: u16,
        decimals: u32,
    ) -> Result<f64> {
        let regs = Self::map_tokio_result(ctx.read_input_registers(address, 1))?;
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
    pub fn read_holding_register(
        ctx: &mut tokio_modbus::client::sync::Context,
        address: u16,
        decimals: u32,
    ) -> Result<f64> {
        let regs = Self::map_tokio_result(ctx.read_holding_registers(address, 1))?;
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
    pub fn read_coil(
        ctx: &mut tokio_modbus::client::sync::Context,
        coil: proto::Coil,
    ) -> Result<bool> {
        let bits = Self::map_tokio_result(ctx.read_coils(coil.address(), 1))?;
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
    pub fn set_coil(
        ctx: &mut tokio_modbus::client::sync::Context,
        coil: proto::Coil,
        value: bool,
    ) -> Result<()> {
        Self::map_tokio_result(ctx.write_single_coil(coil.address(), value))
    }

    /// Reads one discrete input.
    pub fn read_discrete_input(
        ctx: &mut tokio_modbus::client::sync::Context,
        input: proto::DiscreteInput,
    ) -> Result<bool> {
        let bits = Self::map_tokio_result(ctx.read_discrete_inputs(input.address(), 1))?;
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
    pub fn read_over_temperature(
        ctx: &mut tokio_modbus::client::sync::Context,
    ) -> Result<bool> {
        Self::read_discrete_input(ctx, proto::DiscreteInput::OverTemperature)
    }

    /// Reads the day/night discrete input (0x200C).
    pub fn read_day_night(
        ctx: &mut tokio_modbus::client::sync::Context,
    ) -> Result<proto::DayNight> {
        Ok(proto::DayNight::from(Self::read_discrete_input(
            ctx,
            proto::DiscreteInput::DayNight,
        )?))
    }

    /// Reads the coil and discrete-input banks as one snapshot.
    ///
    /// Two block reads: coils 0x0002..=0x0006 and discrete inputs
    /// 0x2000..=0x200C. A failure of either aborts the snapshot.
    pub fn read_system_status(
        ctx: &mut tokio_modbus::client::sync::Context,
    ) -> Result<proto::SystemStatus> {
        let coils = Self::map_tokio_result(ctx.read_coils(
            proto::SystemStatus::COIL_ADDRESS,
            proto::SystemStatus::COIL_QUANTITY,
        ))?;
        let discrete_inputs = Self::map_tokio_result(ctx.read_discrete_inputs(
            proto::SystemStatus::DISCRETE_ADDRESS,
            proto::SystemStatus::DISCRETE_QUANTITY,
        ))?;
        Ok(proto::SystemStatus::decode_from_bits(
            &coils,
            &discrete_inputs,
        )?)
    }

    /// Writes all three load control coils.
    ///
    /// Every coil write is attempted regardless of earlier failures, so a
    /// transient error on one coil does not leave the remaining coils in an
    /// unknown commanded state. Returns `true` only if all three writes
    /// succeeded. Callers that need the individual error use
    /// [`Self::set_coil`] per coil instead.
    pub fn set_load_control(
        ctx: &mut tokio_modbus::client::sync::Context,
        control: proto::LoadControl,
    ) -> bool {
        let manual = Self::set_coil(ctx, proto::Coil::ManualLoadControl, control.manual_on).is_ok();
        let test = Self::set_coil(ctx, proto::Coil::LoadTestMode, control.test_mode).is_ok();
        let force = Self::set_coil(ctx, proto::Coil::ForceLoadOn, control.force_on).is_ok();
        manual && test && force
    }

    /// Probes which optional register banks the connected device implements.
    ///
    /// One single-value read per bank. An illegal-function or
    /// illegal-data-address exception marks the bank as unsupported, as does
    /// a response timeout: deployed LS-B units simply stay silent on banks
    /// they do not implement. Any other failure propagates.
    ///
    /// The stateful [`crate::tokio_sync_safe_client::SafeClient`] runs this
    /// probe once and caches the result.
    pub fn probe_capabilities(
        ctx: &mut tokio_modbus::client::sync::Context,
    ) -> Result<proto::Capabilities> {
        let battery_settings =
            Self::probe_outcome(ctx.read_holding_registers(proto::BatterySettings::ADDRESS, 1))?;
        let status_registers =
            Self::probe_outcome(ctx.read_input_registers(proto::DeviceStatus::ADDRESS, 1))?;
        let load_coils =
            Self::probe_outcome(ctx.read_coils(proto::Coil::ManualLoadControl.address(), 1))?;
        let discrete_inputs = Self::probe_outcome(
            ctx.read_discrete_inputs(proto::DiscreteInput::OverTemperature.address(), 1),
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
