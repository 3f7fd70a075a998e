//! Request correlation context.
//!
//! A [`RequestContext`] is threaded explicitly through every database call.
//! It carries the correlation id of the inbound request (if any) and an
//! optional deadline that drivers may honour. Contexts are immutable: the
//! `with_*` methods return a derived child and leave the parent untouched.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

/// HTTP header carrying the correlation id across service boundaries.
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";

/// Per-call context passed alongside SQL and arguments.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    correlation_id: Option<Arc<str>>,
    deadline: Option<Instant>,
}

impl RequestContext {
    /// An empty context: no correlation id, no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// Derive a child context carrying `id`.
    pub fn with_correlation_id(&self, id: impl Into<String>) -> Self {
        Self {
            correlation_id: Some(Arc::from(id.into())),
            ..self.clone()
        }
    }

    /// Correlation id, or `""` when none was attached.
    pub fn correlation_id(&self) -> &str {
        self.correlation_id.as_deref().unwrap_or("")
    }

    /// Whether a correlation id has been attached.
    pub fn has_correlation_id(&self) -> bool {
        self.correlation_id.is_some()
    }

    /// Derive a child context that expires at `deadline`.
    ///
    /// An earlier deadline already on the parent wins.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        };
        Self {
            deadline: Some(deadline),
            ..self.clone()
        }
    }

    /// Derive a child context that expires `timeout` from now.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

/// Return a child of `ctx` carrying `id` as its correlation id.
pub fn set_correlation_id(ctx: &RequestContext, id: impl Into<String>) -> RequestContext {
    ctx.with_correlation_id(id)
}

/// Correlation id stored on `ctx`, or `""` if absent.
pub fn get_correlation_id(ctx: &RequestContext) -> &str {
    ctx.correlation_id()
}

/// Generate a fresh random (v4) UUID correlation id.
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}
