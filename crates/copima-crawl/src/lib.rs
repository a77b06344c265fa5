//! The crawl engine: drives the four-phase pipeline (areas -> users ->
//! resources -> repository), cursor pagination, per-phase resume
//! checkpoints, user-supplied transform callbacks, and per-entity fan-out
//! under a shared semaphore and rate limiter.

pub mod callback;
pub mod engine;
pub mod error;
pub mod phase;
pub mod ratelimit;
pub mod resume;

pub use callback::{CallbackContext, Identity, TransformCallback};
pub use engine::{CrawlEngine, PhaseReport};
pub use error::{Error, Result};
pub use phase::{Phase, PhaseOutcome, RetryAction, RetryEvent, RetryState, handle_retry};
pub use ratelimit::TokenBucket;
pub use resume::{DiscoveredEntity, FailureRecord, ResumeState};
