use std::sync::{Arc, OnceLock};

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::protocol::HttpError;

/// A cancellation scope that remembers why it was cancelled.
///
/// Connections own a root scope and every streaming response body owns a
/// child of it. Cancelling a parent cancels its children, and a child that was
/// cancelled through its parent reports the parent's cause.
///
/// A recorded cause of `None` means the scope was closed cleanly.
#[derive(Debug, Clone, Default)]
pub struct CancelScope {
    token: CancellationToken,
    cause: Arc<OnceLock<Option<Arc<HttpError>>>>,
    parent: Option<Box<CancelScope>>,
}

impl CancelScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a scope that is cancelled whenever `self` is.
    pub fn child(&self) -> Self {
        Self { token: self.token.child_token(), cause: Arc::default(), parent: Some(Box::new(self.clone())) }
    }

    /// Cancels the scope, recording `cause` if no cause was recorded before.
    ///
    /// Returns true only for the call that recorded the cause.
    pub fn cancel(&self, cause: Option<Arc<HttpError>>) -> bool {
        let first = self.cause.set(cause).is_ok();
        self.token.cancel();
        first
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes once the scope is cancelled, directly or through a parent.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// The cancellation cause.
    ///
    /// `None` while the scope is live, `Some(None)` after a clean close and
    /// `Some(Some(err))` after a failure.
    pub fn cause(&self) -> Option<Option<Arc<HttpError>>> {
        if let Some(cause) = self.cause.get() {
            return Some(cause.clone());
        }
        if !self.token.is_cancelled() {
            return None;
        }
        Some(self.parent.as_ref().and_then(|parent| parent.cause()).flatten())
    }

    /// The error reported to operations attempted on a cancelled scope.
    pub fn error(&self) -> HttpError {
        HttpError::closed(self.cause().flatten())
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}
