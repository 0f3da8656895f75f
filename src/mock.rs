//! In-memory fake controller for testing without hardware.
//!
//! [`MockController`] implements [`Transport`] and behaves like a scripted
//! Prologix box: it records every outbound line, tracks the directive
//! state those lines establish, and synthesizes replies for directive
//! queries (`++addr`, `++ver`, `++spoll`) and for scripted instrument
//! commands. Clones share state, so a test can keep one clone for
//! inspection after boxing another into the session.

use crate::error::{GpibError, GpibResult};
use crate::transport::{strip_line_terminator, Transport};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
struct MockState {
    sent: Vec<String>,
    inbound: VecDeque<String>,
    replies: HashMap<(u8, String), String>,
    current_address: Option<u8>,
    auto_read: bool,
    version: String,
    spoll_status: u8,
    fail_next_send: bool,
    closed: bool,
}

/// Scripted in-memory stand-in for a Prologix controller.
///
/// # Example
///
/// ```
/// use prologix_gpib::mock::MockController;
/// use prologix_gpib::transport::Transport;
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let mock = MockController::new();
/// mock.respond_to(10, "*idn?", "ACME,Model 1,0,1.0");
///
/// let mut transport: Box<dyn Transport> = Box::new(mock.clone());
/// transport.send_line("++addr 10").await.unwrap();
/// transport.send_line("++auto 1").await.unwrap();
/// transport.send_line("*idn?").await.unwrap();
///
/// let reply = transport.receive_line(Duration::from_millis(10)).await.unwrap();
/// assert_eq!(reply, "ACME,Model 1,0,1.0");
/// assert_eq!(mock.sent_lines().len(), 3);
/// # })
/// ```
#[derive(Clone, Debug)]
pub struct MockController {
    state: Arc<Mutex<MockState>>,
    send_latency: Duration,
}

impl Default for MockController {
    fn default() -> Self {
        Self::new()
    }
}

impl MockController {
    /// Create a fake controller with an empty wire.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                version: "Prologix GPIB-ETHERNET Controller version 01.06.06.00".to_string(),
                ..MockState::default()
            })),
            send_latency: Duration::ZERO,
        }
    }

    /// Add per-line latency, widening race windows in concurrency tests.
    pub fn with_send_latency(mut self, latency: Duration) -> Self {
        self.send_latency = latency;
        self
    }

    /// Script the reply the instrument at `address` gives to `command`.
    ///
    /// The reply is delivered with a CR terminator, the way the real
    /// controller forwards instrument talk, and only when the fake box is
    /// addressed to `address` with read-back enabled (`++auto 1`).
    pub fn respond_to(&self, address: u8, command: &str, response: &str) {
        self.lock()
            .replies
            .insert((address, command.to_string()), format!("{response}\r"));
    }

    /// Queue one raw inbound line exactly as the wire would carry it,
    /// terminator included.
    pub fn enqueue_raw(&self, raw: &str) {
        self.lock().inbound.push_back(raw.to_string());
    }

    /// Firmware string reported for `++ver`.
    pub fn set_version(&self, version: &str) {
        self.lock().version = version.to_string();
    }

    /// Status byte reported for `++spoll`.
    pub fn set_spoll_status(&self, status: u8) {
        self.lock().spoll_status = status;
    }

    /// Fail the next send with a broken-pipe error, then recover.
    pub fn fail_next_send(&self) {
        self.lock().fail_next_send = true;
    }

    /// Every line sent so far, oldest first.
    pub fn sent_lines(&self) -> Vec<String> {
        self.lock().sent.clone()
    }

    /// Forget captured lines; scripted replies stay.
    pub fn clear_sent(&self) {
        self.lock().sent.clear();
    }

    /// Address the fake box currently tracks from `++addr` lines.
    pub fn addressed(&self) -> Option<u8> {
        self.lock().current_address
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle_line(state: &mut MockState, line: &str) {
        if let Some(rest) = line.strip_prefix("++") {
            let mut parts = rest.split_whitespace();
            let name = parts.next().unwrap_or("");
            let arg = parts.next();
            match (name, arg) {
                ("addr", Some(raw)) => state.current_address = raw.parse().ok(),
                ("addr", None) => {
                    let reply = state
                        .current_address
                        .map_or_else(|| "0".to_string(), |a| a.to_string());
                    state.inbound.push_back(format!("{reply}\r"));
                }
                ("auto", Some(raw)) => state.auto_read = raw == "1",
                ("ver", None) => {
                    let version = state.version.clone();
                    state.inbound.push_back(format!("{version}\r"));
                }
                ("spoll", None) => {
                    state.inbound.push_back(format!("{}\r", state.spoll_status));
                }
                // mode, eoi, eos, read_tmo_ms, clr, ifc, loc, trg take
                // effect silently, like the real box.
                _ => {}
            }
        } else if state.auto_read {
            if let Some(addr) = state.current_address {
                if let Some(reply) = state.replies.get(&(addr, line.to_string())) {
                    state.inbound.push_back(reply.clone());
                }
            }
        }
    }
}

#[async_trait]
impl Transport for MockController {
    async fn send_line(&mut self, line: &str) -> GpibResult<()> {
        if self.send_latency > Duration::ZERO {
            tokio::time::sleep(self.send_latency).await;
        }
        let mut state = self.lock();
        if state.closed {
            return Err(GpibError::Closed);
        }
        if state.fail_next_send {
            state.fail_next_send = false;
            return Err(GpibError::Connection("simulated broken pipe".to_string()));
        }
        state.sent.push(line.to_string());
        Self::handle_line(&mut state, line);
        Ok(())
    }

    async fn receive_line(&mut self, window: Duration) -> GpibResult<String> {
        let raw = {
            let mut state = self.lock();
            if state.closed {
                return Err(GpibError::Closed);
            }
            state.inbound.pop_front()
        };
        match raw {
            Some(raw) => Ok(strip_line_terminator(&raw).to_string()),
            None => {
                // A silent wire: nothing arrives within the window.
                tokio::time::sleep(window).await;
                Err(GpibError::Timeout(window))
            }
        }
    }

    async fn close(&mut self) -> GpibResult<()> {
        self.lock().closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tracks_the_addressed_instrument() {
        let mock = MockController::new();
        let mut transport: Box<dyn Transport> = Box::new(mock.clone());

        assert_eq!(mock.addressed(), None);
        transport.send_line("++addr 15").await.unwrap();
        assert_eq!(mock.addressed(), Some(15));
    }

    #[tokio::test]
    async fn answers_the_addr_query_with_the_current_address() {
        let mock = MockController::new();
        let mut transport: Box<dyn Transport> = Box::new(mock.clone());

        transport.send_line("++addr 10").await.unwrap();
        transport.send_line("++addr").await.unwrap();
        let reply = transport
            .receive_line(Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(reply, "10");
    }

    #[tokio::test]
    async fn instrument_replies_require_read_back() {
        let mock = MockController::new();
        mock.respond_to(5, "MEAS?", "1.25");
        let mut transport: Box<dyn Transport> = Box::new(mock.clone());

        transport.send_line("++addr 5").await.unwrap();

        // auto off: the instrument's answer never reaches the socket.
        transport.send_line("MEAS?").await.unwrap();
        assert!(transport
            .receive_line(Duration::from_millis(10))
            .await
            .is_err());

        transport.send_line("++auto 1").await.unwrap();
        transport.send_line("MEAS?").await.unwrap();
        assert_eq!(
            transport
                .receive_line(Duration::from_millis(10))
                .await
                .unwrap(),
            "1.25"
        );
    }

    #[tokio::test]
    async fn failure_injection_is_one_shot() {
        let mock = MockController::new();
        let mut transport: Box<dyn Transport> = Box::new(mock.clone());

        mock.fail_next_send();
        assert!(transport.send_line("++addr 1").await.is_err());
        assert!(
            mock.sent_lines().is_empty(),
            "failed sends never reach the wire"
        );

        transport.send_line("++addr 1").await.unwrap();
        assert_eq!(mock.sent_lines(), ["++addr 1"]);
    }

    #[tokio::test]
    async fn raw_lines_are_stripped_like_real_traffic() {
        let mock = MockController::new();
        mock.enqueue_raw("10\r");
        let mut transport: Box<dyn Transport> = Box::new(mock.clone());

        assert_eq!(
            transport
                .receive_line(Duration::from_millis(10))
                .await
                .unwrap(),
            "10"
        );
    }

    #[tokio::test]
    async fn closed_mock_rejects_io() {
        let mock = MockController::new();
        let mut transport: Box<dyn Transport> = Box::new(mock.clone());

        transport.close().await.unwrap();
        assert!(matches!(
            transport.send_line("++ver").await.unwrap_err(),
            GpibError::Closed
        ));
    }
}
