//! Synchronous stateful client for the Tracer LS-B solar charge controller.
//!
//! This module provides a high-level API (`SafeClient` struct) that owns the
//! Modbus context behind an `Arc<Mutex<_>>`. The serial link is half duplex,
//! so all transactions of all clones are serialized through that mutex; at
//! most one request/response round trip is in flight per device handle.
//!
//! The client also caches the capability probe: register banks the connected
//! firmware does not implement are reported as `Ok(None)`, distinct from a
//! failed transaction.
//!
//! ## Example
//!
//! ```no_run
//! use solar_tracer_lib::tokio_sync_safe_client::SafeClient;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let builder = solar_tracer_lib::tokio_common::serial_port_builder("/dev/ttyUSB0");
//!     let ctx = tokio_modbus::client::sync::rtu::connect_slave(&builder, tokio_modbus::Slave(1))?;
//!     let mut client = SafeClient::new(ctx);
//!     client.set_timeout(solar_tracer_lib::tokio_common::RESPONSE_TIMEOUT);
//!
//!     let rated = client.read_rated_data()?;
//!     println!("Rated: {rated}");
//!
//!     match client.read_battery_settings()? {
//!         Some(settings) => println!("{settings}"),
//!         None => println!("settings bank not supported by this device"),
//!     }
//!
//!     Ok(())
//! }
//! ```

use crate::{protocol as proto, tokio_common::Result, tokio_sync};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_modbus::client::sync::Context;

/// Synchronous stateful client for the Tracer controller.
///
/// Cloning is cheap; clones share the underlying Modbus context and the
/// cached capability probe. The serial port closes when the last clone is
/// dropped.
#[derive(Clone)]
pub struct SafeClient {
    ctx: Arc<Mutex<Context>>,
    capabilities: Arc<Mutex<Option<proto::Capabilities>>>,
    layout: proto::RealtimeLayout,
}

// `tokio_modbus::client::sync::Context` does not implement `Debug`, so the
// `Debug` impl is written by hand (skipping the opaque context) rather than
// derived.
impl std::fmt::Debug for SafeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafeClient")
            .field("ctx", &"..")
            .field("capabilities", &self.capabilities)
            .field("layout", &self.layout)
            .finish()
    }
}

impl SafeClient {
    /// Creates a new `SafeClient` with the default realtime block layout.
    pub fn new(ctx: Context) -> Self {
        Self::with_layout(ctx, proto::RealtimeLayout::default())
    }

    /// Creates a new `SafeClient` with a firmware-specific realtime layout.
    pub fn with_layout(ctx: Context, layout: proto::RealtimeLayout) -> Self {
        Self {
            ctx: Arc::new(Mutex::new(ctx)),
            capabilities: Arc::new(Mutex::new(None)),
            layout,
        }
    }

    /// Creates a new `SafeClient` from a shared `tokio-modbus` synchronous context.
    pub fn from_shared(ctx: Arc<Mutex<Context>>, layout: proto::RealtimeLayout) -> Self {
        Self {
            ctx,
            capabilities: Arc::new(Mutex::new(None)),
            layout,
        }
    }

    /// Clones the shared `tokio-modbus` synchronous context.
    pub fn clone_shared(&self) -> Arc<Mutex<Context>> {
        self.ctx.clone()
    }

    /// The realtime block layout this client decodes with.
    pub fn layout(&self) -> &proto::RealtimeLayout {
        &self.layout
    }

    /// Sets the timeout for Modbus communication.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.ctx.lock().unwrap().set_timeout(timeout);
    }

    /// Retrieves the current Modbus communication timeout.
    pub fn timeout(&self) -> Option<Duration> {
        self.ctx.lock().unwrap().timeout()
    }

    /// Probes the optional register banks and refreshes the cached result.
    pub fn probe_capabilities(&mut self) -> Result<proto::Capabilities> {
        let mut cached = self.capabilities.lock().unwrap();
        let mut ctx = self.ctx.lock().unwrap();
        let capabilities = tokio_sync::Tracer::probe_capabilities(&mut ctx)?;
        *cached = Some(capabilities);
        Ok(capabilities)
    }

    /// Returns the cached capabilities, probing the device on first use.
    pub fn capabilities(&mut self) -> Result<proto::Capabilities> {
        let mut cached = self.capabilities.lock().unwrap();
        if let Some(capabilities) = *cached {
            return Ok(capabilities);
        }
        let mut ctx = self.ctx.lock().unwrap();
        let capabilities = tokio_sync::Tracer::probe_capabilities(&mut ctx)?;
        *cached = Some(capabilities);
        Ok(capabilities)
    }

    /// Reads the rated (nameplate) data block.
    pub fn read_rated_data(&mut self) -> Result<proto::RatedData> {
        let mut ctx = self.ctx.lock().unwrap();
        tokio_sync::Tracer::read_rated_data(&mut ctx)
    }

    /// Reads the realtime measurement block.
    pub fn read_realtime_data(&mut self) -> Result<proto::RealtimeData> {
        let mut ctx = self.ctx.lock().unwrap();
        tokio_sync::Tracer::read_realtime_data(&mut ctx, &self.layout)
    }

    /// Reads the accumulated statistics block.
    pub fn read_statistical_data(&mut self) -> Result<proto::StatisticalData> {
        let mut ctx = self.ctx.lock().unwrap();
        tokio_sync::Tracer::read_statistical_data(&mut ctx)
    }

    /// Reads both status bitfield registers.
    ///
    /// Returns `Ok(None)` if the connected firmware does not expose the
    /// status bank.
    pub fn read_device_status(&mut self) -> Result<Option<proto::DeviceStatus>> {
        if !self.capabilities()?.status_registers {
            return Ok(None);
        }
        let mut ctx = self.ctx.lock().unwrap();
        Ok(Some(tokio_sync::Tracer::read_device_status(&mut ctx)?))
    }

    /// Reads the battery settings block.
    ///
    /// Returns `Ok(None)` if the connected firmware does not expose the
    /// settings bank.
    pub fn read_battery_settings(&mut self) -> Result<Option<proto::BatterySettings>> {
        if !self.capabilities()?.battery_settings {
            return Ok(None);
        }
        let mut ctx = self.ctx.lock().unwrap();
        Ok(Some(tokio_sync::Tracer::read_battery_settings(&mut ctx)?))
    }

    /// Writes the battery settings block as one transaction.
    ///
    /// Writes are not capability gated: attempting to write an unsupported
    /// bank surfaces the device's own response.
    pub fn set_battery_settings(&mut self, settings: &proto::BatterySettings) -> Result<()> {
        let mut ctx = self.ctx.lock().unwrap();
        tokio_sync::Tracer::set_battery_settings(&mut ctx, settings)
    }

    /// Reads the coil and discrete-input banks as one snapshot.
    ///
    /// Returns `Ok(None)` if the connected firmware exposes neither bank
    /// completely.
    pub fn read_system_status(&mut self) -> Result<Option<proto::SystemStatus>> {
        if !self.capabilities()?.system_status() {
            return Ok(None);
        }
        let mut ctx = self.ctx.lock().unwrap();
        Ok(Some(tokio_sync::Tracer::read_system_status(&mut ctx)?))
    }

    /// Reads one load control coil.
    pub fn read_coil(&mut self, coil: proto::Coil) -> Result<bool> {
        let mut ctx = self.ctx.lock().unwrap();
        tokio_sync::Tracer::read_coil(&mut ctx, coil)
    }

    /// Writes one load control coil.
    pub fn set_coil(&mut self, coil: proto::Coil, value: bool) -> Result<()> {
        let mut ctx = self.ctx.lock().unwrap();
        tokio_sync::Tracer::set_coil(&mut ctx, coil, value)
    }

    /// Reads one discrete input.
    pub fn read_discrete_input(&mut self, input: proto::DiscreteInput) -> Result<bool> {
        let mut ctx = self.ctx.lock().unwrap();
        tokio_sync::Tracer::read_discrete_input(&mut ctx, input)
    }

    /// Reads the over-temperature discrete input.
    pub fn read_over_temperature(&mut self) -> Result<bool> {
        let mut ctx = self.ctx.lock().unwrap();
        tokio_sync::Tracer::read_over_temperature(&mut ctx)
    }

    /// Reads the day/night discrete input.
    pub fn read_day_night(&mut self) -> Result<proto::DayNight> {
        let mut ctx = self.ctx.lock().unwrap();
        tokio_sync::Tracer::read_day_night(&mut ctx)
    }

    /// Writes all three load control coils; `true` only if all succeeded.
    pub fn set_load_control(&mut self, control: proto::LoadControl) -> bool {
        let mut ctx = self.ctx.lock().unwrap();
        tokio_sync::Tracer::set_load_control(&mut ctx, control)
    }

    /// Reads a single input register scaled by `10^decimals`.
    pub fn read_input_register(&mut self, address: u16, decimals: u32) -> Result<f64> {
        let mut ctx = self.ctx.lock().unwrap();
        tokio_sync::Tracer::read_input_register(&mut ctx, address, decimals)
    }

    /// Reads a single holding register scaled by `10^decimals`.
    pub fn read_holding_register(&mut self, address: u16, decimals: u32) -> Result<f64> {
        let mut ctx = self.ctx.lock().unwrap();
        tokio_sync::Tracer::read_holding_register(&mut ctx, address, decimals)
    }
}
