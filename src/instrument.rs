//! Per-instrument facade over the shared bus.

use crate::arbiter::TransactionArbiter;
use crate::error::{GpibError, GpibResult};
use crate::session::{ControllerSession, Transaction};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// GPIB primary address, validated to 0..=30 at construction.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub struct PrimaryAddress(u8);

impl PrimaryAddress {
    /// Highest valid GPIB primary address.
    pub const MAX: u8 = 30;

    /// Validate `raw` as a primary address.
    ///
    /// # Errors
    /// [`GpibError::Address`] if `raw` is greater than 30.
    pub fn new(raw: u8) -> GpibResult<Self> {
        if raw > Self::MAX {
            return Err(GpibError::Address(raw));
        }
        Ok(Self(raw))
    }

    /// The numeric address.
    pub fn value(self) -> u8 {
        self.0
    }
}

impl fmt::Display for PrimaryAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u8> for PrimaryAddress {
    type Error = GpibError;

    fn try_from(raw: u8) -> GpibResult<Self> {
        Self::new(raw)
    }
}

impl From<PrimaryAddress> for u8 {
    fn from(addr: PrimaryAddress) -> u8 {
        addr.0
    }
}

/// Handle to one logical instrument on the shared bus.
///
/// Handles are cheap to clone and safe to use from concurrent tasks: each
/// [`write`](Self::write) or [`query`](Self::query) is one atomic
/// transaction through the arbiter, so no other handle's directives or
/// payload can interleave with it. The address is validated at
/// construction and immutable for the handle's lifetime.
#[derive(Clone, Debug)]
pub struct InstrumentHandle {
    address: PrimaryAddress,
    arbiter: Arc<TransactionArbiter>,
    read_timeout: Duration,
}

impl InstrumentHandle {
    pub(crate) fn new(
        address: PrimaryAddress,
        arbiter: Arc<TransactionArbiter>,
        read_timeout: Duration,
    ) -> Self {
        Self {
            address,
            arbiter,
            read_timeout,
        }
    }

    /// Address this handle was created for.
    pub fn address(&self) -> PrimaryAddress {
        self.address
    }

    /// Send `payload` to the instrument without reading a response.
    ///
    /// The payload may embed several lines (including further `++`
    /// directives for a one-off override); the whole block goes out under
    /// a single lock acquisition, in order, unparsed.
    pub async fn write(&self, payload: &str) -> GpibResult<()> {
        let txn = Transaction::write(self.address, payload);
        self.arbiter
            .run_exclusive(move |session: &mut ControllerSession| {
                async move { session.execute(&txn).await.map(|_| ()) }.boxed()
            })
            .await
    }

    /// Send `payload` and read one response line, using the connection's
    /// default read window.
    pub async fn query(&self, payload: &str) -> GpibResult<String> {
        self.query_with_timeout(payload, self.read_timeout).await
    }

    /// Send `payload` and read one response line within `window`.
    pub async fn query_with_timeout(
        &self,
        payload: &str,
        window: Duration,
    ) -> GpibResult<String> {
        let txn = Transaction::query(self.address, payload, window);
        let response = self
            .arbiter
            .run_exclusive(move |session: &mut ControllerSession| {
                async move { session.execute(&txn).await }.boxed()
            })
            .await?;
        response.ok_or_else(|| {
            GpibError::Protocol("query transaction completed without a response".to_string())
        })
    }
}
