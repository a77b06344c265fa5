//! A GraphQL query document paired with the type it deserializes to.
//!
//! Design Notes: the source mixes compile-time typed documents and runtime
//! file-loaded strings; this standardizes on one shape that accepts either
//! origin through `From` impls, so the client never cares where the query
//! text came from.

use std::marker::PhantomData;

/// A query (or mutation) document, tagged with the Rust type its response
/// deserializes to. `T` is a `PhantomData` marker only — it exists purely
/// so `GraphqlClient::query` can infer the return type from the document.
pub struct QueryDocument<T> {
    pub query_text: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> QueryDocument<T> {
    pub fn new(query_text: impl Into<String>) -> Self {
        Self {
            query_text: query_text.into(),
            _marker: PhantomData,
        }
    }
}

impl<T> From<&'static str> for QueryDocument<T> {
    /// A compile-time typed document embedded as a `&'static str` literal.
    fn from(query_text: &'static str) -> Self {
        QueryDocument::new(query_text)
    }
}

impl<T> From<String> for QueryDocument<T> {
    /// A runtime file-loaded query string.
    fn from(query_text: String) -> Self {
        QueryDocument::new(query_text)
    }
}

impl<T> Clone for QueryDocument<T> {
    fn clone(&self) -> Self {
        Self {
            query_text: self.query_text.clone(),
            _marker: PhantomData,
        }
    }
}
