//! Submission gateway
//!
//! The two pieces of state shared across concurrent requests: the token
//! bucket rate limiter and the idempotency cache. Both sit behind store
//! traits with atomic single-call operations, so multi-instance
//! deployments can swap in a shared backend without changing the gates.

pub mod idempotency;
pub mod rate_limit;

pub use idempotency::{
    Admission, IdempotencyGateway, IdempotencyStore, MemoryIdempotencyStore, StoredResponse,
};
pub use rate_limit::{BucketStore, MemoryBucketStore, RateLimitDecision, RateLimiter};
