//! Controller-side directive state and transaction execution.
//!
//! The Prologix box is configured through `++`-prefixed directive lines
//! sent on the same socket as instrument payloads: `++addr` selects the
//! addressed instrument, `++auto` chooses whether the controller reads the
//! instrument back after a payload, `++eoi`/`++eos` control bus framing.
//! The box keeps that configuration between commands, so the adapter has
//! to know what it last told the hardware, and has to stop trusting that
//! knowledge the moment anything fails mid-sequence.
//!
//! [`ControllerSession`] is the single owner of that state and the only
//! place `++` directives are emitted. Each field of [`ControllerState`] is
//! cached as the last *successfully sent* value; any I/O failure forces
//! the affected fields back to unknown so the next transaction re-asserts
//! them instead of assuming the controller retained the setting. That
//! costs a few redundant bytes after an error and removes a whole class of
//! mis-addressed commands.
//!
//! Sessions are never used directly by callers; every entry point goes
//! through [`crate::TransactionArbiter`], which serializes access so one
//! transaction's lines are contiguous on the wire.

use crate::error::{GpibError, GpibResult};
use crate::instrument::PrimaryAddress;
use crate::transport::Transport;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Terminator the controller appends to instrument payloads (`++eos 0..3`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EosMode {
    /// CR+LF (`++eos 0`), the controller's power-on default.
    #[default]
    CrLf,
    /// CR only (`++eos 1`).
    Cr,
    /// LF only (`++eos 2`).
    Lf,
    /// Nothing appended (`++eos 3`); EOI alone marks the end of a transfer.
    None,
}

impl EosMode {
    /// Numeric argument of the `++eos` directive.
    pub fn directive_value(self) -> u8 {
        match self {
            EosMode::CrLf => 0,
            EosMode::Cr => 1,
            EosMode::Lf => 2,
            EosMode::None => 3,
        }
    }
}

/// Role of the Prologix box on the bus (`++mode 0|1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerMode {
    /// Listen-only bus device (`++mode 0`).
    Device,
    /// Controller-in-charge (`++mode 1`), the adapter's operating mode.
    Controller,
}

impl ControllerMode {
    /// Numeric argument of the `++mode` directive.
    pub fn directive_value(self) -> u8 {
        match self {
            ControllerMode::Device => 0,
            ControllerMode::Controller => 1,
        }
    }
}

/// Last directive set successfully sent to the controller.
///
/// `None` in any field means unknown: never asserted, or invalidated by a
/// failure. Unknown fields are re-asserted by the next transaction that
/// depends on them; the cache is never trusted across a detected failure.
#[derive(Debug, Clone, Default)]
pub struct ControllerState {
    /// Bus role, asserted once at setup.
    pub mode: Option<ControllerMode>,
    /// Instrument the controller currently addresses.
    pub current_address: Option<PrimaryAddress>,
    /// Whether the controller reads the instrument back after each payload.
    pub auto_read: Option<bool>,
    /// EOI assertion on the last byte of each transfer.
    pub eoi: Option<bool>,
    /// Payload terminator policy.
    pub eos: Option<EosMode>,
}

/// One atomic unit of work against a single instrument.
///
/// A transaction is the ordered list of lines that must reach the wire
/// without interleaving (addressing and direction directives first, then
/// the payload), plus an optional read window when a response is expected.
/// Handles build one per operation instead of patching per-call prefixes
/// onto a shared connection.
#[derive(Debug, Clone)]
pub struct Transaction {
    address: PrimaryAddress,
    auto_read: bool,
    lines: Vec<String>,
    read_window: Option<Duration>,
}

impl Transaction {
    /// A send-only transaction (`++auto 0`, no response read).
    pub fn write(address: PrimaryAddress, payload: &str) -> Self {
        Self {
            address,
            auto_read: false,
            lines: split_payload(payload),
            read_window: None,
        }
    }

    /// A query transaction (`++auto 1`, one response line read).
    pub fn query(address: PrimaryAddress, payload: &str, read_window: Duration) -> Self {
        Self {
            address,
            auto_read: true,
            lines: split_payload(payload),
            read_window: Some(read_window),
        }
    }

    /// Target instrument address.
    pub fn address(&self) -> PrimaryAddress {
        self.address
    }

    /// Payload lines sent after addressing and direction are asserted.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Whether a response line is read after the payload.
    pub fn expects_response(&self) -> bool {
        self.read_window.is_some()
    }
}

/// A payload may embed several lines (for example a batched directive and
/// data sequence); each becomes its own outbound line, unparsed.
fn split_payload(payload: &str) -> Vec<String> {
    payload.lines().map(str::to_string).collect()
}

/// Stateful owner of the controller-side configuration.
#[derive(Debug)]
pub struct ControllerSession {
    transport: Box<dyn Transport>,
    state: ControllerState,
    read_timeout: Duration,
    closed: bool,
}

impl ControllerSession {
    /// Wrap a connected transport.
    ///
    /// Directive state starts unknown until [`initialize`](Self::initialize)
    /// or the first transaction asserts it. `read_timeout` is the window
    /// applied to directive queries and to query transactions that do not
    /// carry their own.
    pub fn new(transport: Box<dyn Transport>, read_timeout: Duration) -> Self {
        Self {
            transport,
            state: ControllerState::default(),
            read_timeout,
            closed: false,
        }
    }

    /// Last directive set known to be on the controller.
    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    /// Whether the session has been explicitly closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> GpibResult<()> {
        if self.closed {
            Err(GpibError::Closed)
        } else {
            Ok(())
        }
    }

    async fn send_directive(&mut self, directive: &str) -> GpibResult<()> {
        self.ensure_open()?;
        self.transport.send_line(directive).await
    }

    async fn receive(&mut self, window: Duration) -> GpibResult<String> {
        self.ensure_open()?;
        match self.transport.receive_line(window).await {
            Ok(line) => Ok(line),
            Err(err) => {
                self.invalidate_synced_state();
                Err(err)
            }
        }
    }

    /// Fields a mid-sequence failure leaves in doubt.
    fn invalidate_synced_state(&mut self) {
        self.state.current_address = None;
        self.state.auto_read = None;
    }

    /// Assert bus role, framing, listen direction and the controller-side
    /// read window once at connection setup, leaving the cache synced.
    pub async fn initialize(&mut self, eoi: bool, eos: EosMode) -> GpibResult<()> {
        self.set_mode(ControllerMode::Controller).await?;
        self.set_framing(eoi, eos).await?;
        self.ensure_direction(false).await?;
        let window = self.read_timeout;
        self.set_read_timeout(window).await?;
        info!("Controller session initialized");
        Ok(())
    }

    /// Address `addr`, unless the controller is already known to.
    ///
    /// The cache is updated on success only; on failure it is forced to
    /// unknown and the error propagates.
    pub async fn ensure_addressed(&mut self, addr: PrimaryAddress) -> GpibResult<()> {
        if self.state.current_address == Some(addr) {
            return Ok(());
        }
        match self.send_directive(&format!("++addr {addr}")).await {
            Ok(()) => {
                self.state.current_address = Some(addr);
                Ok(())
            }
            Err(err) => {
                self.state.current_address = None;
                Err(err)
            }
        }
    }

    /// Assert read-back direction, unless it matches the known state.
    pub async fn ensure_direction(&mut self, auto_read: bool) -> GpibResult<()> {
        if self.state.auto_read == Some(auto_read) {
            return Ok(());
        }
        let directive = if auto_read { "++auto 1" } else { "++auto 0" };
        match self.send_directive(directive).await {
            Ok(()) => {
                self.state.auto_read = Some(auto_read);
                Ok(())
            }
            Err(err) => {
                self.state.auto_read = None;
                Err(err)
            }
        }
    }

    /// Assert EOI and EOS framing. Used at setup, not per-transaction.
    pub async fn set_framing(&mut self, eoi: bool, eos: EosMode) -> GpibResult<()> {
        match self
            .send_directive(if eoi { "++eoi 1" } else { "++eoi 0" })
            .await
        {
            Ok(()) => self.state.eoi = Some(eoi),
            Err(err) => {
                self.state.eoi = None;
                return Err(err);
            }
        }
        match self
            .send_directive(&format!("++eos {}", eos.directive_value()))
            .await
        {
            Ok(()) => self.state.eos = Some(eos),
            Err(err) => {
                self.state.eos = None;
                return Err(err);
            }
        }
        Ok(())
    }

    /// Assert the bus role.
    pub async fn set_mode(&mut self, mode: ControllerMode) -> GpibResult<()> {
        match self
            .send_directive(&format!("++mode {}", mode.directive_value()))
            .await
        {
            Ok(()) => {
                self.state.mode = Some(mode);
                Ok(())
            }
            Err(err) => {
                self.state.mode = None;
                Err(err)
            }
        }
    }

    /// Set the controller-side read window (`++read_tmo_ms`).
    pub async fn set_read_timeout(&mut self, window: Duration) -> GpibResult<()> {
        self.send_directive(&format!("++read_tmo_ms {}", window.as_millis()))
            .await
    }

    /// Controller firmware version (`++ver`), returned verbatim apart from
    /// the standard terminator strip.
    pub async fn query_version(&mut self) -> GpibResult<String> {
        self.send_directive("++ver").await?;
        let window = self.read_timeout;
        self.receive(window).await
    }

    /// Instrument the controller currently addresses (`++addr` query).
    pub async fn query_address(&mut self) -> GpibResult<PrimaryAddress> {
        self.send_directive("++addr").await?;
        let window = self.read_timeout;
        let line = self.receive(window).await?;
        let raw: u8 = line
            .trim()
            .parse()
            .map_err(|_| GpibError::Protocol(format!("unparseable ++addr response: {line:?}")))?;
        PrimaryAddress::new(raw)
    }

    /// Run one transaction: addressing, direction, payload, optional read.
    ///
    /// Returns the response line for query transactions, `None` for
    /// writes. Any failure leaves the addressing/direction cache unknown
    /// so the next transaction re-asserts it.
    pub async fn execute(&mut self, txn: &Transaction) -> GpibResult<Option<String>> {
        self.ensure_open()?;
        self.ensure_addressed(txn.address).await?;
        self.ensure_direction(txn.auto_read).await?;

        let mut passthrough_directives = false;
        for line in txn.lines() {
            passthrough_directives |= line.starts_with("++");
            if let Err(err) = self.transport.send_line(line).await {
                self.invalidate_synced_state();
                return Err(err);
            }
        }

        let response = match txn.read_window {
            Some(window) => Some(self.receive(window).await?),
            None => None,
        };

        // Caller-embedded directives change the controller behind the
        // cache's back; stop trusting the cache once they went out.
        if passthrough_directives {
            debug!("Transaction carried embedded directives; cache invalidated");
            self.invalidate_synced_state();
        }

        Ok(response)
    }

    /// Selected Device Clear for `addr` (`++clr`).
    pub async fn device_clear(&mut self, addr: PrimaryAddress) -> GpibResult<()> {
        self.ensure_addressed(addr).await?;
        self.send_directive("++clr").await
    }

    /// Pulse the Interface Clear line, asserting this box as
    /// controller-in-charge (`++ifc`).
    pub async fn interface_clear(&mut self) -> GpibResult<()> {
        self.send_directive("++ifc").await
    }

    /// Return `addr` to front-panel control (`++loc`).
    pub async fn local(&mut self, addr: PrimaryAddress) -> GpibResult<()> {
        self.ensure_addressed(addr).await?;
        self.send_directive("++loc").await
    }

    /// Group Execute Trigger for `addr` (`++trg`).
    pub async fn trigger(&mut self, addr: PrimaryAddress) -> GpibResult<()> {
        self.ensure_addressed(addr).await?;
        self.send_directive("++trg").await
    }

    /// Serial-poll `addr` and return its status byte (`++spoll`).
    pub async fn serial_poll(&mut self, addr: PrimaryAddress) -> GpibResult<u8> {
        self.ensure_addressed(addr).await?;
        self.send_directive("++spoll").await?;
        let window = self.read_timeout;
        let line = self.receive(window).await?;
        line.trim()
            .parse()
            .map_err(|_| GpibError::Protocol(format!("unparseable ++spoll response: {line:?}")))
    }

    /// Controller usage text (`++help`).
    ///
    /// Help output is multi-line with no length marker; a short quiet gap
    /// ends the drain.
    pub async fn query_help(&mut self) -> GpibResult<String> {
        self.send_directive("++help").await?;
        let window = self.read_timeout;
        let mut lines = vec![self.receive(window).await?];
        loop {
            match self.transport.receive_line(Duration::from_millis(50)).await {
                Ok(line) => lines.push(line),
                Err(GpibError::Timeout(_)) => break,
                Err(err) => {
                    self.invalidate_synced_state();
                    return Err(err);
                }
            }
        }
        Ok(lines.join("\n"))
    }

    /// Close the session and its transport. Idempotent; all subsequent
    /// operations fail with [`GpibError::Closed`].
    pub async fn close(&mut self) -> GpibResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.state = ControllerState::default();
        self.transport.close().await
    }
}
