//! The user-supplied transform callback: `(node, ctx) -> outputOrNull`.
//! Design Notes specify this as a pure function; the engine treats any
//! callback failure as a per-entity failure, never fatal to the phase.

use serde_json::Value;

use crate::phase::Phase;

/// The `(host, accountId, resourceType)` triple passed to every transform,
/// plus the phase it was discovered in.
#[derive(Debug, Clone)]
pub struct CallbackContext {
    pub host: String,
    pub account_id: String,
    pub resource_type: String,
    pub phase: Phase,
}

/// Transforms a raw node into the record to persist, or drops it by
/// returning `None`.
pub trait TransformCallback: Send + Sync {
    fn transform(&self, node: Value, ctx: &CallbackContext) -> Option<Value>;
}

impl<F> TransformCallback for F
where
    F: Fn(Value, &CallbackContext) -> Option<Value> + Send + Sync,
{
    fn transform(&self, node: Value, ctx: &CallbackContext) -> Option<Value> {
        self(node, ctx)
    }
}

/// Keeps every record unchanged — the default when the caller supplies no
/// transform.
pub struct Identity;

impl TransformCallback for Identity {
    fn transform(&self, node: Value, _ctx: &CallbackContext) -> Option<Value> {
        Some(node)
    }
}
