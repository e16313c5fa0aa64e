use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use super::{MessageWriter, Upgraded};
use crate::protocol::{CancelScope, HttpError};

pub(crate) type BoxReader = Box<dyn AsyncRead + Send + Unpin>;
pub(crate) type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

pub(crate) type SharedWriter = Arc<tokio::sync::Mutex<Option<MessageWriter<BoxWriter>>>>;

/// Callback run once when a connection closes, with the cause if it failed.
pub type CloseHook = Box<dyn Fn(Option<&HttpError>) + Send + Sync>;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a connection, used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What the read loop leaves behind when the connection switches protocols.
pub(crate) struct UpgradeParts {
    pub(crate) reader: BoxReader,
    pub(crate) read_buf: BytesMut,
}

struct Shared {
    id: ConnectionId,
    scope: CancelScope,
    writer: SharedWriter,
    upgrade: Mutex<Option<UpgradeParts>>,
    close_hook: Option<CloseHook>,
}

/// The part of a connection shared by its read loop, its write tasks, the
/// bodies it hands out and the caller's handles.
///
/// Holding a handle never keeps the transport open; it only allows closing it.
#[derive(Clone)]
pub(crate) struct ConnectionHandle {
    shared: Arc<Shared>,
}

impl ConnectionHandle {
    pub(crate) fn new(writer: SharedWriter, scope: CancelScope, close_hook: Option<CloseHook>) -> Self {
        let shared = Shared { id: ConnectionId::next(), scope, writer, upgrade: Mutex::new(None), close_hook };
        Self { shared: Arc::new(shared) }
    }

    pub(crate) fn id(&self) -> ConnectionId {
        self.shared.id
    }

    /// The root scope; cancelling it tears the connection down.
    pub(crate) fn scope(&self) -> &CancelScope {
        &self.shared.scope
    }

    pub(crate) fn writer(&self) -> &SharedWriter {
        &self.shared.writer
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.shared.scope.is_cancelled()
    }

    /// Tears the connection down, recording `cause` if it is the first close.
    ///
    /// Returns true for the call that actually closed the connection.
    pub(crate) fn close(&self, cause: Option<Arc<HttpError>>) -> bool {
        if !self.shared.scope.cancel(cause) {
            return false;
        }

        let cause = self.shared.scope.cause().flatten();
        match &cause {
            Some(cause) => debug!(id = %self.id(), cause = %cause, "connection closed"),
            None => debug!(id = %self.id(), "connection closed"),
        }

        if let Some(close_hook) = &self.shared.close_hook {
            close_hook(cause.as_deref());
        }

        // the read loop has stopped after an upgrade, nobody else will shut the writer
        if self.take_upgrade().is_some()
            && let Ok(mut writer) = self.shared.writer.try_lock()
        {
            writer.take();
        }

        true
    }

    /// Shuts down and releases the write half.
    pub(crate) async fn shutdown_writer(&self) {
        let mut writer = self.shared.writer.lock().await;
        if let Some(mut writer) = writer.take()
            && let Err(e) = writer.get_mut().shutdown().await
        {
            trace!(id = %self.id(), cause = %e, "failed to shutdown writer");
        }
    }

    pub(crate) fn stash_upgrade(&self, parts: UpgradeParts) {
        trace!(id = %self.id(), buffered = parts.read_buf.len(), "connection switched protocols");
        *self.shared.upgrade.lock().unwrap_or_else(PoisonError::into_inner) = Some(parts);
    }

    fn take_upgrade(&self) -> Option<UpgradeParts> {
        self.shared.upgrade.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    /// Hands out the raw transport of an upgraded connection.
    ///
    /// Waits for a request write in progress to finish first.
    pub(crate) async fn stream(&self) -> Result<Upgraded, HttpError> {
        if self.is_closed() {
            return Err(self.shared.scope.error());
        }

        let Some(parts) = self.take_upgrade() else {
            return Err(HttpError::NotUpgraded);
        };

        let Some(writer) = self.shared.writer.lock().await.take() else {
            return Err(self.shared.scope.error());
        };

        Ok(Upgraded::new(self.clone(), parts, writer.into_inner()))
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle").field("id", &self.shared.id).field("closed", &self.is_closed()).finish()
    }
}
