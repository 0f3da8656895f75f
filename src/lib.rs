//! # Prologix GPIB-Ethernet protocol adapter
//!
//! This crate drives GPIB instruments behind a Prologix GPIB-Ethernet
//! controller: a bridge that exposes one TCP socket and accepts textual
//! `++`-prefixed directives (addressing, direction, framing) interleaved
//! with raw instrument payload lines. Several logical instruments, GPIB
//! primary addresses 0 through 30, share that single stateful channel.
//! The adapter guarantees that every payload is preceded by the correct
//! addressing and direction directives, and that concurrent callers never
//! interleave another instrument's lines into a transaction.
//!
//! ## Crate structure
//!
//! - **`transport`**: line framing over one stream connection, with the
//!   production TCP implementation. Outbound lines end in `\n`, inbound
//!   lines in `\r` or `\r\n` (one terminator stripped).
//! - **`session`**: the single owner of controller-side directive state.
//!   Caches the last successfully sent value per field and invalidates it
//!   on any failure, so a transaction after an error re-asserts its
//!   directives instead of trusting a cache the hardware may not reflect.
//! - **`arbiter`**: bounded-wait mutual exclusion over the session; one
//!   transaction's directive and payload lines are contiguous on the wire.
//! - **`instrument`**: validated addresses and the per-instrument handle
//!   callers hold (`write` sends, `query` sends and reads one line).
//! - **`controller`**: the connection facade that ties the above together
//!   and hands out handles.
//! - **`config`**: the setup-time configuration surface, loadable from
//!   TOML plus environment overrides.
//! - **`mock`**: a scripted in-memory controller for tests.
//! - **`error`**: the `GpibError` taxonomy shared by every operation.
//!
//! ## Example
//!
//! ```no_run
//! use prologix_gpib::{ControllerConfig, PrologixController};
//!
//! # async fn demo() -> Result<(), prologix_gpib::GpibError> {
//! let config = ControllerConfig::new("192.168.1.128");
//! let controller = PrologixController::connect(&config).await?;
//!
//! let awg = controller.instrument(10)?;
//! let idn = awg.query("*IDN?").await?;
//! println!("address 10: {idn}");
//!
//! awg.write("SOUR1:VOLT:OFFSET 1").await?;
//! controller.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod arbiter;
pub mod config;
pub mod controller;
pub mod error;
pub mod instrument;
pub mod mock;
pub mod session;
pub mod transport;

pub use arbiter::TransactionArbiter;
pub use config::{ControllerConfig, FramingConfig};
pub use controller::PrologixController;
pub use error::{GpibError, GpibResult};
pub use instrument::{InstrumentHandle, PrimaryAddress};
pub use mock::MockController;
pub use session::{ControllerMode, ControllerSession, ControllerState, EosMode, Transaction};
pub use transport::{TcpTransport, Transport, DEFAULT_PORT};
