//! Connection facade.
//!
//! [`PrologixController`] owns the arbiter/session pair for one socket and
//! hands out per-address [`InstrumentHandle`]s. Modeling the connection as
//! an explicit value passed to every handle (instead of a process-wide
//! singleton) keeps the single-writer invariant visible: all mutation of
//! controller state happens inside the arbiter's critical section, and an
//! explicit [`close`](PrologixController::close) invalidates every handle
//! at once.

use crate::arbiter::TransactionArbiter;
use crate::config::ControllerConfig;
use crate::error::GpibResult;
use crate::instrument::{InstrumentHandle, PrimaryAddress};
use crate::session::ControllerSession;
use crate::transport::{TcpTransport, Transport};
use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// One connection to a Prologix GPIB-Ethernet controller.
///
/// # Example
///
/// ```no_run
/// use prologix_gpib::{ControllerConfig, PrologixController};
///
/// # async fn demo() -> Result<(), prologix_gpib::GpibError> {
/// let config = ControllerConfig::new("192.168.1.128");
/// let controller = PrologixController::connect(&config).await?;
///
/// let awg = controller.instrument(10)?;
/// println!("{}", awg.query("*IDN?").await?);
/// controller.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct PrologixController {
    arbiter: Arc<TransactionArbiter>,
    read_timeout: Duration,
}

impl PrologixController {
    /// Connect over TCP and assert mode, framing and the controller-side
    /// read window once, so the session starts synced.
    pub async fn connect(config: &ControllerConfig) -> GpibResult<Self> {
        let transport =
            TcpTransport::connect(&config.host, config.port, config.connect_timeout).await?;
        Self::with_transport(Box::new(transport), config).await
    }

    /// Build a controller over an already-connected transport.
    ///
    /// This is the seam tests use to run the full stack against
    /// [`MockController`](crate::mock::MockController).
    pub async fn with_transport(
        transport: Box<dyn Transport>,
        config: &ControllerConfig,
    ) -> GpibResult<Self> {
        let mut session = ControllerSession::new(transport, config.default_read_timeout);
        session
            .initialize(config.framing.eoi, config.framing.eos)
            .await?;
        Ok(Self {
            arbiter: Arc::new(TransactionArbiter::new(session, config.lock_wait_timeout)),
            read_timeout: config.default_read_timeout,
        })
    }

    /// Handle for the instrument at `address`.
    ///
    /// # Errors
    /// [`GpibError::Address`](crate::GpibError::Address) outside 0-30.
    pub fn instrument(&self, address: u8) -> GpibResult<InstrumentHandle> {
        let address = PrimaryAddress::new(address)?;
        Ok(InstrumentHandle::new(
            address,
            Arc::clone(&self.arbiter),
            self.read_timeout,
        ))
    }

    /// Controller firmware version (`++ver`).
    pub async fn version(&self) -> GpibResult<String> {
        self.arbiter
            .run_exclusive(|session: &mut ControllerSession| {
                async move { session.query_version().await }.boxed()
            })
            .await
    }

    /// Instrument the controller currently addresses (`++addr` query).
    pub async fn current_address(&self) -> GpibResult<PrimaryAddress> {
        self.arbiter
            .run_exclusive(|session: &mut ControllerSession| {
                async move { session.query_address().await }.boxed()
            })
            .await
    }

    /// Pulse Interface Clear, asserting this box as controller-in-charge.
    pub async fn interface_clear(&self) -> GpibResult<()> {
        self.arbiter
            .run_exclusive(|session: &mut ControllerSession| {
                async move { session.interface_clear().await }.boxed()
            })
            .await
    }

    /// Selected Device Clear for `address`.
    pub async fn device_clear(&self, address: PrimaryAddress) -> GpibResult<()> {
        self.arbiter
            .run_exclusive(move |session: &mut ControllerSession| {
                async move { session.device_clear(address).await }.boxed()
            })
            .await
    }

    /// Return `address` to front-panel (local) control.
    pub async fn local(&self, address: PrimaryAddress) -> GpibResult<()> {
        self.arbiter
            .run_exclusive(move |session: &mut ControllerSession| {
                async move { session.local(address).await }.boxed()
            })
            .await
    }

    /// Group Execute Trigger for `address`.
    pub async fn trigger(&self, address: PrimaryAddress) -> GpibResult<()> {
        self.arbiter
            .run_exclusive(move |session: &mut ControllerSession| {
                async move { session.trigger(address).await }.boxed()
            })
            .await
    }

    /// Serial-poll `address`, returning its status byte.
    pub async fn serial_poll(&self, address: PrimaryAddress) -> GpibResult<u8> {
        self.arbiter
            .run_exclusive(move |session: &mut ControllerSession| {
                async move { session.serial_poll(address).await }.boxed()
            })
            .await
    }

    /// Controller usage text (`++help`).
    pub async fn help(&self) -> GpibResult<String> {
        self.arbiter
            .run_exclusive(|session: &mut ControllerSession| {
                async move { session.query_help().await }.boxed()
            })
            .await
    }

    /// Close the connection. Idempotent; every handle created from this
    /// controller fails with [`GpibError::Closed`](crate::GpibError::Closed)
    /// afterwards.
    pub async fn close(&self) -> GpibResult<()> {
        info!("Closing controller connection");
        self.arbiter
            .run_exclusive(|session: &mut ControllerSession| {
                async move { session.close().await }.boxed()
            })
            .await
    }
}
