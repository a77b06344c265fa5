//! Cursor-based pagination primitives.

use std::future::Future;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One page of a GraphQL connection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CursorPage<T> {
    pub nodes: Vec<T>,
    pub page_info: PageInfo,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_cursor: Option<String>,
}

/// Validate that a raw JSON value has the `nodes`/`pageInfo` shape a
/// connection is expected to, failing with `Error::UnexpectedShape`
/// otherwise. Typed helpers call this before deserializing into
/// `CursorPage<T>` so a malformed upstream response fails clearly instead
/// of silently deserializing into empty defaults.
pub fn validate_connection_shape(operation: &str, value: &serde_json::Value) -> Result<()> {
    let obj = value.as_object().ok_or_else(|| Error::UnexpectedShape {
        operation: operation.to_string(),
        detail: "expected a JSON object".to_string(),
    })?;
    if !obj.contains_key("nodes") {
        return Err(Error::UnexpectedShape {
            operation: operation.to_string(),
            detail: "missing `nodes` field".to_string(),
        });
    }
    let page_info = obj.get("pageInfo").ok_or_else(|| Error::UnexpectedShape {
        operation: operation.to_string(),
        detail: "missing `pageInfo` field".to_string(),
    })?;
    if !page_info
        .as_object()
        .is_some_and(|p| p.contains_key("hasNextPage"))
    {
        return Err(Error::UnexpectedShape {
            operation: operation.to_string(),
            detail: "pageInfo missing `hasNextPage`".to_string(),
        });
    }
    Ok(())
}

/// A lazy cursor-connection walker: holds the fetcher closure and current
/// cursor, yielding one page at a time so a caller can fold over an entire
/// connection without materializing all pages in memory (Design Notes:
/// "a generic lazy iterator over a connection").
///
/// `resume_cursor`, if set, starts the walk at that cursor instead of the
/// beginning — this is how the Crawl Engine resumes a paginated connection
/// at its last successful `endCursor`.
pub struct Connection<T, F> {
    fetch_page: F,
    cursor: Option<String>,
    done: bool,
    _marker: std::marker::PhantomData<T>,
}

impl<T, F, Fut> Connection<T, F>
where
    T: DeserializeOwned,
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<CursorPage<T>>>,
{
    pub fn new(fetch_page: F) -> Self {
        Self {
            fetch_page,
            cursor: None,
            done: false,
            _marker: std::marker::PhantomData,
        }
    }

    pub fn resuming_from(fetch_page: F, resume_cursor: Option<String>) -> Self {
        Self {
            fetch_page,
            cursor: resume_cursor,
            done: false,
            _marker: std::marker::PhantomData,
        }
    }

    /// Fetch and return the next page, or `None` once the connection is
    /// exhausted. Every page fetched has a cursor strictly after the
    /// previous one — callers must process page N's nodes before calling
    /// this again, guaranteeing monotonic cursor progress (spec §5).
    pub async fn next_page(&mut self) -> Result<Option<CursorPage<T>>> {
        if self.done {
            return Ok(None);
        }
        let page = (self.fetch_page)(self.cursor.clone()).await?;
        self.done = !page.page_info.has_next_page;
        self.cursor = page.page_info.end_cursor.clone();
        Ok(Some(page))
    }

    /// The cursor to resume from if the walk were interrupted right now —
    /// the last `endCursor` observed, or the resume cursor if no page has
    /// been fetched yet.
    pub fn current_cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn page(nodes: Vec<u32>, has_next: bool, cursor: Option<&str>) -> CursorPage<u32> {
        CursorPage {
            nodes,
            page_info: PageInfo {
                has_next_page: has_next,
                end_cursor: cursor.map(str::to_string),
            },
        }
    }

    #[tokio::test]
    async fn walks_pages_until_exhausted() {
        let call_count = AtomicUsize::new(0);
        let mut conn = Connection::new(|cursor: Option<String>| {
            let n = call_count.fetch_add(1, Ordering::SeqCst);
            async move {
                match n {
                    0 => {
                        assert_eq!(cursor, None);
                        Ok(page(vec![1, 2], true, Some("c1")))
                    }
                    1 => {
                        assert_eq!(cursor.as_deref(), Some("c1"));
                        Ok(page(vec![3], false, None))
                    }
                    _ => panic!("fetched too many pages"),
                }
            }
        });

        let mut all = Vec::new();
        while let Some(p) = conn.next_page().await.unwrap() {
            all.extend(p.nodes);
        }
        assert_eq!(all, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn resumes_from_supplied_cursor() {
        let mut conn = Connection::resuming_from(
            |cursor: Option<String>| async move {
                assert_eq!(cursor.as_deref(), Some("resume-here"));
                Ok(page(vec![9], false, None))
            },
            Some("resume-here".to_string()),
        );
        let p = conn.next_page().await.unwrap().unwrap();
        assert_eq!(p.nodes, vec![9]);
    }

    #[test]
    fn validate_connection_shape_accepts_well_formed_value() {
        let value = serde_json::json!({"nodes": [], "pageInfo": {"hasNextPage": false}});
        assert!(validate_connection_shape("fetchUsers", &value).is_ok());
    }

    #[test]
    fn validate_connection_shape_rejects_missing_nodes() {
        let value = serde_json::json!({"pageInfo": {"hasNextPage": false}});
        assert!(validate_connection_shape("fetchUsers", &value).is_err());
    }

    #[test]
    fn validate_connection_shape_rejects_missing_page_info() {
        let value = serde_json::json!({"nodes": []});
        assert!(validate_connection_shape("fetchUsers", &value).is_err());
    }
}
