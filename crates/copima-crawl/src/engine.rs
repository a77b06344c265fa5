//! The Crawl Engine: drives the four-phase pipeline, pagination, resume
//! checkpoints, per-entity fan-out under a semaphore, and the global rate
//! limiter. Phase sequencing itself is a flat `match` — only a single
//! phase's reaction to a connectivity error is modeled as the closed
//! `phase::handle_retry` state machine.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use common::ErrorKind;
use copima_graphql::{CursorPage, GraphqlClient, PageInfo, QueryDocument, fetch_group_projects, fetch_groups, fetch_projects, fetch_subgroups, fetch_users};
use copima_sink::HierarchicalSink;
use serde_json::{Value, json};
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::callback::{CallbackContext, Identity, TransformCallback};
use crate::error::{Error, Result};
use crate::phase::{Phase, PhaseOutcome, RetryAction, RetryEvent, RetryState, handle_retry};
use crate::ratelimit::TokenBucket;
use crate::resume::{DiscoveredEntity, ResumeState};

const PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseReport {
    pub phase: Phase,
    pub outcome: PhaseOutcome,
    pub processed: usize,
    pub failed: usize,
}

/// Drives the crawl. Held as `Arc<CrawlEngine>` by callers so per-entity
/// fan-out tasks can clone a handle to it.
pub struct CrawlEngine {
    client: Arc<GraphqlClient>,
    sink: Arc<HierarchicalSink>,
    resume: Arc<ResumeState>,
    rate_limiter: Arc<TokenBucket>,
    semaphore: Arc<Semaphore>,
    cancellation: CancellationToken,
    callback: Arc<dyn TransformCallback>,
    host: String,
    account_id: String,
    max_retries: u32,
    auto_save_interval: Duration,
    last_flush: Mutex<tokio::time::Instant>,
}

impl CrawlEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: Arc<GraphqlClient>,
        sink: Arc<HierarchicalSink>,
        resume: Arc<ResumeState>,
        rate_limiter: Arc<TokenBucket>,
        max_concurrency: usize,
        cancellation: CancellationToken,
        host: impl Into<String>,
        account_id: impl Into<String>,
        max_retries: u32,
        auto_save_interval: Duration,
    ) -> Self {
        Self {
            client,
            sink,
            resume,
            rate_limiter,
            semaphore: Arc::new(Semaphore::new(max_concurrency.max(1))),
            cancellation,
            callback: Arc::new(Identity),
            host: host.into(),
            account_id: account_id.into(),
            max_retries,
            auto_save_interval,
            last_flush: Mutex::new(tokio::time::Instant::now()),
        }
    }

    pub fn with_callback(mut self, callback: Arc<dyn TransformCallback>) -> Self {
        self.callback = callback;
        self
    }

    /// Run `phases` in the order given. Phases already marked completed in
    /// the resume state are skipped entirely; a phase that exhausts its
    /// retry budget is reported `PartiallyFailed` but does not stop
    /// subsequent phases from running (propagating stops the whole run
    /// only on cancellation).
    pub async fn run(self: &Arc<Self>, phases: &[Phase]) -> Result<Vec<PhaseReport>> {
        let mut reports = Vec::new();
        for &phase in phases {
            if self.cancellation.is_cancelled() {
                self.resume.flush().await?;
                return Err(Error::Cancelled);
            }
            if self.resume.is_phase_completed(phase).await {
                tracing::info!(%phase, "phase already completed, skipping");
                continue;
            }

            let report = match self.run_phase(phase).await {
                Ok(report) => report,
                Err(Error::Cancelled) => {
                    // Mid-phase cancellation: the cursor/completed-id updates
                    // recorded so far are still only in memory. Flush them
                    // before propagating so a resumed run continues from the
                    // last completed page instead of restarting the phase.
                    self.resume.flush().await?;
                    return Err(Error::Cancelled);
                }
                Err(e) => return Err(e),
            };
            if report.outcome == PhaseOutcome::Completed {
                self.resume.mark_phase_completed(phase).await;
            }
            self.resume.flush().await?;
            reports.push(report);
        }
        Ok(reports)
    }

    async fn run_phase(self: &Arc<Self>, phase: Phase) -> Result<PhaseReport> {
        match phase {
            Phase::Areas => self.run_areas().await,
            Phase::Users => self.run_users().await,
            Phase::Resources => self.run_resources().await,
            Phase::Repository => self.run_repository().await,
        }
    }

    // -- areas --------------------------------------------------------

    async fn run_areas(self: &Arc<Self>) -> Result<PhaseReport> {
        let mut processed = 0usize;
        let mut failed = 0usize;

        let result = async {
            self.crawl_root_groups(&mut processed, &mut failed).await?;
            self.crawl_root_projects(&mut processed, &mut failed).await?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => Ok(PhaseReport { phase: Phase::Areas, outcome: PhaseOutcome::Completed, processed, failed }),
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(_) => Ok(PhaseReport { phase: Phase::Areas, outcome: PhaseOutcome::PartiallyFailed, processed, failed }),
        }
    }

    async fn crawl_root_groups(self: &Arc<Self>, processed: &mut usize, failed: &mut usize) -> Result<()> {
        let mut cursor = self.resume.cursor(Phase::Areas, "groups:root").await;
        loop {
            if self.cancellation.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let engine = Arc::clone(self);
            let current_cursor = cursor.clone();
            let page = self
                .fetch_with_retry(Phase::Areas, move || {
                    let engine = Arc::clone(&engine);
                    let cursor = current_cursor.clone();
                    async move { fetch_groups(&engine.client, PAGE_SIZE, cursor).await }
                })
                .await?;

            for node in page.nodes {
                self.process_group(node, processed, failed).await?;
            }

            cursor = page.page_info.end_cursor.clone();
            self.resume.record_cursor(Phase::Areas, "groups:root", cursor.clone()).await;
            self.maybe_autosave().await;
            if !page.page_info.has_next_page {
                break;
            }
        }
        Ok(())
    }

    async fn crawl_root_projects(self: &Arc<Self>, processed: &mut usize, failed: &mut usize) -> Result<()> {
        let mut cursor = self.resume.cursor(Phase::Areas, "projects:root").await;
        loop {
            if self.cancellation.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let engine = Arc::clone(self);
            let current_cursor = cursor.clone();
            let page = self
                .fetch_with_retry(Phase::Areas, move || {
                    let engine = Arc::clone(&engine);
                    let cursor = current_cursor.clone();
                    async move { fetch_projects(&engine.client, PAGE_SIZE, cursor).await }
                })
                .await?;

            for node in page.nodes {
                self.emit_discovered_project(node, &[], processed, failed).await;
            }

            cursor = page.page_info.end_cursor.clone();
            self.resume.record_cursor(Phase::Areas, "projects:root", cursor.clone()).await;
            self.maybe_autosave().await;
            if !page.page_info.has_next_page {
                break;
            }
        }
        Ok(())
    }

    /// Emit a group node, record it as discovered, and recurse into its
    /// `descendantGroups`/`projects` connections. Boxed because the
    /// recursion makes this an `async fn` that calls itself.
    fn process_group<'a>(self: &'a Arc<Self>, node: Value, processed: &'a mut usize, failed: &'a mut usize) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let full_path = node.get("fullPath").and_then(Value::as_str).unwrap_or_default().to_string();
            let id = node.get("id").and_then(Value::as_str).unwrap_or_default().to_string();

            match self.emit(Phase::Areas, "Group", &[], node).await {
                Ok(true) => *processed += 1,
                Ok(false) => {}
                Err(e) => {
                    *failed += 1;
                    self.resume.record_failure(Phase::Areas, id.clone(), e.to_string(), chrono::Utc::now()).await;
                }
            }
            self.resume
                .record_discovered(Phase::Areas, DiscoveredEntity { kind: "group".into(), id, full_path: full_path.clone() })
                .await;

            self.crawl_group_projects(&full_path, processed, failed).await?;
            self.crawl_subgroups(&full_path, processed, failed).await?;
            Ok(())
        })
    }

    async fn crawl_group_projects(self: &Arc<Self>, full_path: &str, processed: &mut usize, failed: &mut usize) -> Result<()> {
        let cursor_key = format!("group-projects:{full_path}");
        let hierarchy = vec!["groups".to_string(), full_path.to_string()];
        let mut cursor = self.resume.cursor(Phase::Areas, &cursor_key).await;
        loop {
            if self.cancellation.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let engine = Arc::clone(self);
            let fp = full_path.to_string();
            let current_cursor = cursor.clone();
            let page = self
                .fetch_with_retry(Phase::Areas, move || {
                    let engine = Arc::clone(&engine);
                    let fp = fp.clone();
                    let cursor = current_cursor.clone();
                    async move { fetch_group_projects(&engine.client, &fp, PAGE_SIZE, cursor).await }
                })
                .await?;

            for node in page.nodes {
                self.emit_discovered_project(node, &hierarchy, processed, failed).await;
            }

            cursor = page.page_info.end_cursor.clone();
            self.resume.record_cursor(Phase::Areas, &cursor_key, cursor.clone()).await;
            self.maybe_autosave().await;
            if !page.page_info.has_next_page {
                break;
            }
        }
        Ok(())
    }

    async fn crawl_subgroups(self: &Arc<Self>, full_path: &str, processed: &mut usize, failed: &mut usize) -> Result<()> {
        let cursor_key = format!("subgroups:{full_path}");
        let mut cursor = self.resume.cursor(Phase::Areas, &cursor_key).await;
        loop {
            if self.cancellation.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let engine = Arc::clone(self);
            let fp = full_path.to_string();
            let current_cursor = cursor.clone();
            let page = self
                .fetch_with_retry(Phase::Areas, move || {
                    let engine = Arc::clone(&engine);
                    let fp = fp.clone();
                    let cursor = current_cursor.clone();
                    async move { fetch_subgroups(&engine.client, &fp, PAGE_SIZE, cursor).await }
                })
                .await?;

            for node in page.nodes {
                self.process_group(node, processed, failed).await?;
            }

            cursor = page.page_info.end_cursor.clone();
            self.resume.record_cursor(Phase::Areas, &cursor_key, cursor.clone()).await;
            self.maybe_autosave().await;
            if !page.page_info.has_next_page {
                break;
            }
        }
        Ok(())
    }

    async fn emit_discovered_project(self: &Arc<Self>, node: Value, hierarchy: &[String], processed: &mut usize, failed: &mut usize) {
        let project_id = node.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
        let project_full_path = node.get("fullPath").and_then(Value::as_str).unwrap_or_default().to_string();

        match self.emit(Phase::Areas, "Project", hierarchy, node).await {
            Ok(true) => *processed += 1,
            Ok(false) => {}
            Err(e) => {
                *failed += 1;
                self.resume.record_failure(Phase::Areas, project_id.clone(), e.to_string(), chrono::Utc::now()).await;
            }
        }
        self.resume
            .record_discovered(Phase::Areas, DiscoveredEntity { kind: "project".into(), id: project_id, full_path: project_full_path })
            .await;
    }

    // -- users ----------------------------------------------------------

    async fn run_users(self: &Arc<Self>) -> Result<PhaseReport> {
        let mut processed = 0usize;
        let mut failed = 0usize;
        let mut cursor = self.resume.cursor(Phase::Users, "users").await;

        loop {
            if self.cancellation.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let engine = Arc::clone(self);
            let current_cursor = cursor.clone();
            let page = match self
                .fetch_with_retry(Phase::Users, move || {
                    let engine = Arc::clone(&engine);
                    let cursor = current_cursor.clone();
                    async move { fetch_users(&engine.client, PAGE_SIZE, cursor).await }
                })
                .await
            {
                Ok(page) => page,
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(_) => return Ok(PhaseReport { phase: Phase::Users, outcome: PhaseOutcome::PartiallyFailed, processed, failed }),
            };

            for node in page.nodes {
                let user_id = node.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
                match self.emit(Phase::Users, "User", &[], node).await {
                    Ok(true) => processed += 1,
                    Ok(false) => {}
                    Err(e) => {
                        failed += 1;
                        self.resume.record_failure(Phase::Users, user_id, e.to_string(), chrono::Utc::now()).await;
                    }
                }
            }

            cursor = page.page_info.end_cursor.clone();
            self.resume.record_cursor(Phase::Users, "users", cursor.clone()).await;
            self.maybe_autosave().await;
            if !page.page_info.has_next_page {
                break;
            }
        }

        Ok(PhaseReport { phase: Phase::Users, outcome: PhaseOutcome::Completed, processed, failed })
    }

    // -- resources / repository ------------------------------------------

    async fn run_resources(self: &Arc<Self>) -> Result<PhaseReport> {
        let entities = self.resume.discovered(Phase::Areas).await;
        self.fan_out(Phase::Resources, entities, |engine, entity| {
            let entity = entity.clone();
            Box::pin(async move { engine.process_resources_for(&entity).await })
        })
        .await
    }

    async fn run_repository(self: &Arc<Self>) -> Result<PhaseReport> {
        let entities: Vec<_> = self.resume.discovered(Phase::Areas).await.into_iter().filter(|e| e.kind == "project").collect();
        self.fan_out(Phase::Repository, entities, |engine, entity| {
            let entity = entity.clone();
            Box::pin(async move { engine.process_repository_for(&entity).await })
        })
        .await
    }

    /// Run `work` over `entities` concurrently, bounded by the shared
    /// semaphore (spec §4.6: "per-entity fan-out ... runs under a
    /// semaphore of width `maxConcurrency`"). Entities already in the
    /// phase's completed-id set are skipped entirely (spec §4.6: "within a
    /// phase, it skips ids in the completed set"); a successfully processed
    /// entity is recorded so a subsequent resumed run skips it too.
    async fn fan_out<F>(self: &Arc<Self>, phase: Phase, entities: Vec<DiscoveredEntity>, work: F) -> Result<PhaseReport>
    where
        F: Fn(Arc<Self>, &DiscoveredEntity) -> Pin<Box<dyn Future<Output = Result<(usize, usize)>> + Send>> + Send + Sync + 'static,
    {
        let already_done = self.resume.completed_ids(phase).await;
        let work = Arc::new(work);
        let mut join_set = tokio::task::JoinSet::new();
        let mut skipped = 0usize;
        for entity in entities {
            if already_done.contains(&entity.id) {
                skipped += 1;
                continue;
            }
            let engine = Arc::clone(self);
            let permit = Arc::clone(&self.semaphore);
            let work = Arc::clone(&work);
            join_set.spawn(async move {
                let _permit = permit.acquire_owned().await.expect("semaphore never closed");
                let result = work(Arc::clone(&engine), &entity).await;
                if result.is_ok() {
                    engine.resume.record_completed_id(phase, entity.id.clone()).await;
                }
                result
            });
        }
        if skipped > 0 {
            tracing::info!(%phase, skipped, "skipping entities already completed by a prior run");
        }

        let mut processed = 0usize;
        let mut failed = 0usize;
        let mut any_failure = false;
        while let Some(result) = join_set.join_next().await {
            match result {
                Ok(Ok((p, f))) => {
                    processed += p;
                    failed += f;
                }
                Ok(Err(Error::Cancelled)) => {
                    join_set.abort_all();
                    return Err(Error::Cancelled);
                }
                Ok(Err(e)) => {
                    warn!(%phase, error = %e, "entity task failed");
                    any_failure = true;
                }
                Err(join_error) => {
                    warn!(%phase, error = %join_error, "entity task panicked");
                    any_failure = true;
                }
            }
        }

        let outcome = if any_failure { PhaseOutcome::PartiallyFailed } else { PhaseOutcome::Completed };
        Ok(PhaseReport { phase, outcome, processed, failed })
    }

    async fn process_resources_for(self: &Arc<Self>, entity: &DiscoveredEntity) -> Result<(usize, usize)> {
        let hierarchy = hierarchy_for(entity);
        let sub_resources: &[(&str, &str)] = if entity.kind == "project" {
            &[("projectMembers", "Member"), ("labels", "Label"), ("milestones", "Milestone"), ("issues", "Issue"), ("mergeRequests", "MergeRequest")]
        } else {
            &[("groupMembers", "Member"), ("labels", "Label"), ("milestones", "Milestone")]
        };

        let mut processed = 0usize;
        let mut failed = 0usize;
        for (field, resource_type) in sub_resources {
            let (p, f) = self.walk_sub_connection(Phase::Resources, &entity.full_path, &entity.kind, field, resource_type, &hierarchy).await?;
            processed += p;
            failed += f;
        }
        Ok((processed, failed))
    }

    async fn process_repository_for(self: &Arc<Self>, entity: &DiscoveredEntity) -> Result<(usize, usize)> {
        let hierarchy = hierarchy_for(entity);
        let mut processed = 0usize;
        let mut failed = 0usize;
        for (field, resource_type) in [("repositoryRefs", "Ref"), ("commits", "Commit"), ("pipelines", "Pipeline")] {
            let (p, f) = self.walk_sub_connection(Phase::Repository, &entity.full_path, "project", field, resource_type, &hierarchy).await?;
            processed += p;
            failed += f;
        }
        Ok((processed, failed))
    }

    #[allow(clippy::too_many_arguments)]
    async fn walk_sub_connection(self: &Arc<Self>, phase: Phase, full_path: &str, owner_field: &str, connection_field: &str, resource_type: &str, hierarchy: &[String]) -> Result<(usize, usize)> {
        let mut processed = 0usize;
        let mut failed = 0usize;
        let cursor_key = format!("{full_path}:{connection_field}");
        let mut cursor = self.resume.cursor(phase, &cursor_key).await;

        loop {
            if self.cancellation.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let engine = Arc::clone(self);
            let fp = full_path.to_string();
            let owner = owner_field.to_string();
            let connection = connection_field.to_string();
            let current_cursor = cursor.clone();
            let page = self
                .fetch_with_retry(phase, move || {
                    let engine = Arc::clone(&engine);
                    let fp = fp.clone();
                    let owner = owner.clone();
                    let connection = connection.clone();
                    let cursor = current_cursor.clone();
                    async move { engine.fetch_sub_connection(&fp, &owner, &connection, cursor).await }
                })
                .await;

            let page = match page {
                Ok(p) => p,
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(_) => break,
            };

            for node in page.nodes {
                match self.emit(phase, resource_type, hierarchy, node).await {
                    Ok(true) => processed += 1,
                    Ok(false) => {}
                    Err(e) => {
                        failed += 1;
                        self.resume.record_failure(phase, format!("{full_path}:{connection_field}"), e.to_string(), chrono::Utc::now()).await;
                    }
                }
            }

            cursor = page.page_info.end_cursor.clone();
            self.resume.record_cursor(phase, &cursor_key, cursor.clone()).await;
            self.maybe_autosave().await;
            if !page.page_info.has_next_page {
                break;
            }
        }

        Ok((processed, failed))
    }

    async fn fetch_sub_connection(&self, full_path: &str, owner_field: &str, connection_field: &str, after: Option<String>) -> std::result::Result<CursorPage<Value>, copima_graphql::Error> {
        let query_text = format!(
            "query FetchSubConnection($fullPath: ID!, $first: Int!, $after: String) {{ {owner_field}(fullPath: $fullPath) {{ {connection_field}(first: $first, after: $after) {{ nodes {{ id }} pageInfo {{ hasNextPage endCursor }} }} }} }}"
        );
        let doc: QueryDocument<Value> = query_text.into();
        let data = self.client.query(&doc, json!({"fullPath": full_path, "first": PAGE_SIZE, "after": after})).await?;
        extract_nested_connection(&data, owner_field, connection_field)
    }

    // -- shared plumbing --------------------------------------------------

    async fn emit(&self, phase: Phase, resource_type: &str, hierarchy: &[String], node: Value) -> Result<bool> {
        let ctx = CallbackContext { host: self.host.clone(), account_id: self.account_id.clone(), resource_type: resource_type.to_string(), phase };
        let Some(record) = self.callback.transform(node, &ctx) else {
            return Ok(false);
        };
        self.sink.append(resource_type, hierarchy, std::slice::from_ref(&record)).await?;
        Ok(true)
    }

    async fn maybe_autosave(&self) {
        let mut last = self.last_flush.lock().await;
        if last.elapsed() < self.auto_save_interval {
            return;
        }
        if let Err(e) = self.resume.flush().await {
            warn!(error = %e, "autosave flush failed");
        }
        *last = tokio::time::Instant::now();
    }

    /// Retry a single GraphQL operation through the per-phase backoff
    /// state machine, rate-limited by the shared token bucket. Only a
    /// connectivity-classified error is retried; anything else (auth,
    /// graphql-level errors) surfaces immediately.
    async fn fetch_with_retry<T, F, Fut>(&self, phase: Phase, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, copima_graphql::Error>>,
    {
        let mut state = RetryState::initial();
        loop {
            if self.cancellation.is_cancelled() {
                return Err(Error::Cancelled);
            }
            self.rate_limiter.acquire().await;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.kind() == ErrorKind::Connectivity => {
                    let (new_state, action) = handle_retry(state, RetryEvent::ConnectivityError, self.max_retries);
                    state = new_state;
                    match action {
                        RetryAction::Sleep(delay) => {
                            warn!(%phase, delay_ms = delay.as_millis() as u64, "connectivity error, retrying with backoff");
                            tokio::time::sleep(delay).await;
                            let (next_state, _) = handle_retry(state, RetryEvent::BackoffElapsed, self.max_retries);
                            state = next_state;
                        }
                        RetryAction::GiveUp => return Err(Error::Graphql(e)),
                        RetryAction::Proceed => {}
                    }
                }
                Err(e) => return Err(Error::Graphql(e)),
            }
        }
    }
}

fn hierarchy_for(entity: &DiscoveredEntity) -> Vec<String> {
    vec!["groups".to_string(), entity.full_path.clone()]
}

fn extract_nested_connection(data: &Value, owner_field: &str, connection_field: &str) -> std::result::Result<CursorPage<Value>, copima_graphql::Error> {
    let operation = format!("{owner_field}.{connection_field}");
    let owner = data.get(owner_field).ok_or_else(|| copima_graphql::Error::UnexpectedShape { operation: operation.clone(), detail: format!("missing `{owner_field}` field") })?;
    let connection = owner
        .get(connection_field)
        .ok_or_else(|| copima_graphql::Error::UnexpectedShape { operation: operation.clone(), detail: format!("missing `{connection_field}` field") })?;
    copima_graphql::validate_connection_shape(&operation, connection)?;

    let nodes = connection.get("nodes").and_then(Value::as_array).cloned().unwrap_or_default();
    let page_info = connection.get("pageInfo").expect("validated above");
    let has_next_page = page_info.get("hasNextPage").and_then(Value::as_bool).unwrap_or(false);
    let end_cursor = page_info.get("endCursor").and_then(Value::as_str).map(str::to_string);

    Ok(CursorPage { nodes, page_info: PageInfo { has_next_page, end_cursor } })
}
