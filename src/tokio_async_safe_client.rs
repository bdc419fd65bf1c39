//! Asynchronous stateful client for the Tracer LS-B solar charge controller.
//!
//! The `async` counterpart of [`crate::tokio_sync_safe_client::SafeClient`]:
//! it owns the Modbus context behind an `Arc<tokio::sync::Mutex<_>>`,
//! serializing all transactions of all clones over the half-duplex serial
//! link, and caches the capability probe. All client methods are `async` and
//! must be `.await`ed.

use crate::{protocol as proto, tokio_async, tokio_common::Result};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_modbus::client::Context;

/// Asynchronous stateful client for the Tracer controller.
///
/// Cloning is cheap; clones share the underlying Modbus context and the
/// cached capability probe.
#[derive(Debug, Clone)]
pub struct SafeClient {
    ctx: Arc<Mutex<Context>>,
    capabilities: Arc<Mutex<Option<proto::Capabilities>>>,
    layout: proto::RealtimeLayout,
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

    /// Creates a new `SafeClient` from a shared `tokio-modbus` asynchronous context.
    pub fn from_shared(ctx: Arc<Mutex<Context>>, layout: proto::RealtimeLayout) -> Self {
        Self {
            ctx,
            capabilities: Arc::new(Mutex::new(None)),
            layout,
        }
    }

    /// Clones the shared `tokio-modbus` asynchronous context.
    pub fn clone_shared(&self) -> Arc<Mutex<Context>> {
        self.ctx.clone()
    }

    /// The realtime block layout this client decodes with.
    pub fn layout(&self) -> &proto::RealtimeLayout {
        &self.layout
    }

    /// Probes the optional register banks and refreshes the cached result.
    pub async fn probe_capabilities(&self) -> Result<proto::Capabilities> {
        let mut cached = self.capabilities.lock().await;
        let mut ctx = self.ctx.lock().await;
        let capabilities = tokio_async::Tracer::probe_capabilities(&mut ctx).await?;
        *cached = Some(capabilities);
        Ok(capabilities)
    }

    /// Returns the cached capabilities, probing the device on first use.
    pub async fn capabilities(&self) -> Result<proto::Capabilities> {
        let mut cached = self.capabilities.lock().await;
        if let Some(capabilities) = *cached {
            return Ok(capabilities);
        }
        let mut ctx = self.ctx.lock().await;
        let capabilities = tokio_async::Tracer::probe_capabilities(&mut ctx).await?;
        *cached = Some(capabilities);
        Ok(capabilities)
    }

    /// Reads the rated (nameplate) data block.
    pub async fn read_rated_data(&self) -> Result<proto::RatedData> {
        let mut ctx = self.ctx.lock().await;
        tokio_async::Tracer::read_rated_data(&mut ctx).await
    }

    /// Reads the realtime measurement block.
    pub async fn read_realtime_data(&self) -> Result<proto::RealtimeData> {
        let mut ctx = self.ctx.lock().await;
        tokio_async::Tracer::read_realtime_data(&mut ctx, &self.layout).await
    }

    /// Reads the accumulated statistics block.
    pub async fn read_statistical_data(&self) -> Result<proto::StatisticalData> {
        let mut ctx = self.ctx.lock().await;
        tokio_async::Tracer::read_statistical_data(&mut ctx).await
    }

    /// Reads both status bitfield registers, `Ok(None)` if unsupported.
    pub async fn read_device_status(&self) -> Result<Option<proto::DeviceStatus>> {
        if !self.capabilities().await?.status_registers {
            return Ok(None);
        }
        let mut ctx = self.ctx.lock().await;
        Ok(Some(tokio_async::Tracer::read_device_status(&mut ctx).await?))
    }

    /// Reads the battery settings block, `Ok(None)` if unsupported.
    pub async fn read_battery_settings(&self) -> Result<Option<proto::BatterySettings>> {
        if !self.capabilities().await?.battery_settings {
            return Ok(None);
        }
        let mut ctx = self.ctx.lock().await;
        Ok(Some(
            tokio_async::Tracer::read_battery_settings(&mut ctx).await?,
        ))
    }

    /// Writes the battery settings block as one transaction.
    pub async fn set_battery_settings(&self, settings: &proto::BatterySettings) -> Result<()> {
        let mut ctx = self.ctx.lock().await;
        tokio_async::Tracer::set_battery_settings(&mut ctx, settings).await
    }

    /// Reads the coil and discrete-input banks, `Ok(None)` if unsupported.
    pub async fn read_system_status(&self) -> Result<Option<proto::SystemStatus>> {
        if !self.capabilities().await?.system_status() {
            return Ok(None);
        }
        let mut ctx = self.ctx.lock().await;
        Ok(Some(tokio_async::Tracer::read_system_status(&mut ctx).await?))
    }

    /// Reads one load control coil.
    pub async fn read_coil(&self, coil: proto::Coil) -> Result<bool> {
        let mut ctx = self.ctx.lock().await;
        tokio_async::Tracer::read_coil(&mut ctx, coil).await
    }

    /// Writes one load control coil.
    pub async fn set_coil(&self, coil: proto::Coil, value: bool) -> Result<()> {
        let mut ctx = self.ctx.lock().await;
        tokio_async::Tracer::set_coil(&mut ctx, coil, value).await
    }

    /// Reads one discrete input.
    pub async fn read_discrete_input(&self, input: proto::DiscreteInput) -> Result<bool> {
        let mut ctx = self.ctx.lock().await;
        tokio_async::Tracer::read_discrete_input(&mut ctx, input).await
    }

    /// Reads the over-temperature discrete input.
    pub async fn read_over_temperature(&self) -> Result<bool> {
        let mut ctx = self.ctx.lock().await;
        tokio_async::Tracer::read_over_temperature(&mut ctx).await
    }

    /// Reads the day/night discrete input.
    pub async fn read_day_night(&self) -> Result<proto::DayNight> {
        let mut ctx = self.ctx.lock().await;
        tokio_async::Tracer::read_day_night(&mut ctx).await
    }

    /// Writes all three load control coils; `true` only if all succeeded.
    pub async fn set_load_control(&self, control: proto::LoadControl) -> bool {
        let mut ctx = self.ctx.lock().await;
        tokio_async::Tracer::set_load_control(&mut ctx, control).await
    }

    /// Reads a single input register scaled by `10^decimals`.
    pub async fn read_input_register(&self, address: u16, decimals: u32) -> Result<f64> {
        let mut ctx = self.ctx.lock().await;
        tokio_async::Tracer::read_input_register(&mut ctx, address, decimals).await
    }

    /// Reads a single holding register scaled by `10^decimals`.
    pub async fn read_holding_register(&self, address: u16, decimals: u32) -> Result<f64> {
        let mut ctx = self.ctx.lock().await;
        tokio_async::Tracer::read_holding_register(&mut ctx, address, decimals).await
    }
}
