//! HTTP middleware.

pub mod correlation;

pub use correlation::{correlation_id_middleware, CORRELATION_ID};
