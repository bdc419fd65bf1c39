//! A library for monitoring and controlling EPEver Tracer LS-B series solar
//! charge controllers via Modbus RTU.
//!
//! This crate provides two main ways to interact with the controller:
//!
//! 1.  **High-Level, Safe Clients**: Stateful clients that serialize all
//!     transactions over the half-duplex serial link and cache the device
//!     capability probe. This is the recommended approach for most users.
//!     See [`tokio_sync_safe_client::SafeClient`] (blocking) and
//!     [`tokio_async_safe_client::SafeClient`] (`async`).
//!
//! 2.  **Low-Level, Stateless Functions**: A set of stateless functions that
//!     directly map to the device's Modbus register blocks. This API offers
//!     maximum flexibility but requires manual management of the Modbus
//!     context. See the [`tokio_sync`] and [`tokio_async`] modules.
//!
//! ## Features
//!
//! - **Protocol Implementation**: The LS-B register map as a declarative
//!   catalog, plus strongly-typed snapshot decoding (rated, realtime,
//!   statistics, status bitfields, battery settings).
//! - **Fail-Closed Snapshots**: Every snapshot comes from block reads; a
//!   failed transaction yields an error, never a partially filled reading.
//! - **Capability Probing**: Register banks a firmware variant does not
//!   implement are detected once and reported as a distinct outcome.
//! - **Synchronous and Asynchronous APIs**: Both blocking and `async/await`
//!   APIs are available.
//!
//! ## Quick Start
//!
//! This example shows how to use the recommended high-level, synchronous
//! `SafeClient`.
//!
//! ```no_run
//! use solar_tracer_lib::tokio_sync_safe_client::SafeClient;
//! use tokio_modbus::Slave;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Connect to the device and create a stateful, safe client
//!     let builder = solar_tracer_lib::tokio_common::serial_port_builder("/dev/ttyUSB0");
//!     let ctx = tokio_modbus::client::sync::rtu::connect_slave(&builder, Slave(1))?;
//!     let mut client = SafeClient::new(ctx);
//!     client.set_timeout(solar_tracer_lib::tokio_common::RESPONSE_TIMEOUT);
//!
//!     // Use the client to interact with the device
//!     let realtime = client.read_realtime_data()?;
//!
//!     println!("Successfully read realtime data:\n{realtime}");
//!
//!     Ok(())
//! }
//! ```
//!
//! For more details, see the documentation for the specific client you wish
//! to use.

pub mod protocol;

#[cfg(any(feature = "tokio-rtu-sync", feature = "tokio-rtu"))]
pub mod tokio_common;

#[cfg_attr(docsrs, doc(cfg(feature = "tokio-rtu-sync")))]
#[cfg(feature = "tokio-rtu-sync")]
pub mod tokio_sync;

#[cfg_attr(docsrs, doc(cfg(feature = "tokio-rtu")))]
#[cfg(feature = "tokio-rtu")]
pub mod tokio_async;

#[cfg_attr(
    docsrs,
    doc(cfg(all(feature = "tokio-rtu-sync", feature = "safe-client-sync")))
)]
#[cfg(all(feature = "tokio-rtu-sync", feature = "safe-client-sync"))]
pub mod tokio_sync_safe_client;

#[cfg_attr(
    docsrs,
    doc(cfg(all(feature = "tokio-rtu", feature = "safe-client-async")))
)]
#[cfg(all(feature = "tokio-rtu", feature = "safe-client-async"))]
pub mod tokio_async_safe_client;
