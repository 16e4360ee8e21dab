//! HTTP boundary
//!
//! Exposes job submission and status endpoints, applying the gates in
//! order: rate limiter, idempotency, authentication. See [`router`] for
//! the handlers and [`server`] for the listener lifecycle.

pub mod router;
pub mod server;

pub use router::{
    router, AppState, IDEMPOTENCY_KEY_HEADER, IDEMPOTENCY_REPLAYED_HEADER, REQUEST_ID_HEADER,
    SUBMIT_ROUTE,
};
pub use server::serve;
