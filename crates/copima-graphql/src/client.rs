//! GraphQL Client: executes a parameterized query with a bearer token,
//! refreshing once on 401 and never silently swallowing a GraphQL-level
//! error.

use std::sync::Arc;
use std::time::Duration;

use copima_provider::TokenSource;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::document::QueryDocument;
use crate::error::{Error, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, serde::Deserialize)]
struct GraphqlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphqlErrorEntry>,
}

#[derive(Debug, serde::Deserialize)]
struct GraphqlErrorEntry {
    message: String,
}

/// Speaks GraphQL to a GitLab-compatible endpoint. Never mutates credential
/// state itself — it asks `token_source` for a bearer token keyed by
/// `account_id` (Design Notes: "shared mutable token on the client" ->
/// "token provider capability").
pub struct GraphqlClient {
    http_client: reqwest::Client,
    host: String,
    token_source: Arc<dyn TokenSource>,
    account_id: String,
}

impl GraphqlClient {
    pub fn new(http_client: reqwest::Client, host: impl Into<String>, token_source: Arc<dyn TokenSource>, account_id: impl Into<String>) -> Self {
        Self {
            http_client,
            host: host.into(),
            token_source,
            account_id: account_id.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/graphql", self.host.trim_end_matches('/'))
    }

    /// Execute `document` with `variables`, retrying exactly once on a 401
    /// with a forced token refresh. A second 401 after that refresh
    /// surfaces immediately (spec's resolved Open Question: no second
    /// refresh attempt).
    pub async fn query<T: DeserializeOwned>(&self, document: &QueryDocument<T>, variables: Value) -> Result<T> {
        let bearer = self.bearer().await?;
        match self.execute(document, &variables, &bearer).await {
            Err(Error::AuthInvalid) => {
                debug!(account_id = %self.account_id, "401 received, forcing token refresh");
                let refreshed = self
                    .token_source
                    .force_refresh(&self.account_id)
                    .await
                    .map_err(|e| Error::RefreshFailed(e.to_string()))?;
                self.execute(document, &variables, &refreshed).await
            }
            other => other,
        }
    }

    async fn bearer(&self) -> Result<String> {
        self.token_source
            .get_bearer(&self.account_id)
            .await
            .map_err(|e| match e {
                copima_provider::Error::NotFound(_) => Error::AuthInvalid,
                other => Error::RefreshFailed(other.to_string()),
            })
    }

    async fn execute<T: DeserializeOwned>(&self, document: &QueryDocument<T>, variables: &Value, bearer: &str) -> Result<T> {
        let body = Request {
            query: &document.query_text,
            variables,
        };

        let response = self
            .http_client
            .post(self.endpoint())
            .timeout(REQUEST_TIMEOUT)
            .bearer_auth(bearer)
            .json(&body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();

        if status.as_u16() == 401 {
            return Err(Error::AuthInvalid);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "<no body>".to_string());
            return Err(Error::Http { status: status.as_u16(), body });
        }

        let parsed: GraphqlResponse<T> = response.json().await.map_err(|e| Error::Http {
            status: status.as_u16(),
            body: format!("failed to parse response body: {e}"),
        })?;

        if !parsed.errors.is_empty() {
            warn!(count = parsed.errors.len(), "graphql response carried errors");
            return Err(Error::GraphqlErrors(parsed.errors.into_iter().map(|e| e.message).collect()));
        }

        parsed.data.ok_or_else(|| Error::GraphqlErrors(vec!["response carried neither data nor errors".to_string()]))
    }
}

#[derive(Serialize)]
struct Request<'a> {
    query: &'a str,
    variables: &'a Value,
}

/// Map a `reqwest::Error` to the connectivity/timeout error kind. A
/// connection-level error is never mistaken for an authentication failure.
fn classify_transport_error(err: reqwest::Error) -> Error {
    Error::Connectivity(err.to_string())
}
