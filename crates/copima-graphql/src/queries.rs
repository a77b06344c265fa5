//! Typed helpers wrapping the crawl engine's seven connection/entity
//! queries. Each validates the response has the `nodes`/`pageInfo` shape a
//! connection is expected to (or, for single-entity fetches, that the
//! entity itself is present) before handing the caller a `CursorPage<Value>`
//! or bare `Value` node.
//!
//! Nodes stay untyped `serde_json::Value` rather than per-resource Rust
//! structs: the user-supplied transform callback operates on the raw node
//! and the sink writes it back out as JSON verbatim, so there's no point
//! the crawler itself needs a typed GitLab schema.

use serde_json::{Value, json};

use crate::client::GraphqlClient;
use crate::connection::{CursorPage, PageInfo, validate_connection_shape};
use crate::document::QueryDocument;
use crate::error::{Error, Result};

const FETCH_USERS: &str = r#"
query FetchUsers($first: Int!, $after: String) {
  users(first: $first, after: $after) {
    nodes { id username name email createdAt }
    pageInfo { hasNextPage endCursor }
  }
}
"#;

const FETCH_GROUPS: &str = r#"
query FetchGroups($first: Int!, $after: String) {
  groups(first: $first, after: $after) {
    nodes { id fullPath name description }
    pageInfo { hasNextPage endCursor }
  }
}
"#;

const FETCH_PROJECTS: &str = r#"
query FetchProjects($first: Int!, $after: String) {
  projects(first: $first, after: $after) {
    nodes { id fullPath name description }
    pageInfo { hasNextPage endCursor }
  }
}
"#;

const FETCH_GROUP_PROJECTS: &str = r#"
query FetchGroupProjects($fullPath: ID!, $first: Int!, $after: String) {
  group(fullPath: $fullPath) {
    projects(first: $first, after: $after, includeSubgroups: false) {
      nodes { id fullPath name description }
      pageInfo { hasNextPage endCursor }
    }
  }
}
"#;

const FETCH_SUBGROUPS: &str = r#"
query FetchSubgroups($fullPath: ID!, $first: Int!, $after: String) {
  group(fullPath: $fullPath) {
    descendantGroups(first: $first, after: $after) {
      nodes { id fullPath name description }
      pageInfo { hasNextPage endCursor }
    }
  }
}
"#;

const FETCH_GROUP: &str = r#"
query FetchGroup($fullPath: ID!) {
  group(fullPath: $fullPath) { id fullPath name description }
}
"#;

const FETCH_PROJECT: &str = r#"
query FetchProject($fullPath: ID!) {
  project(fullPath: $fullPath) { id fullPath name description }
}
"#;

pub async fn fetch_users(client: &GraphqlClient, first: u32, after: Option<String>) -> Result<CursorPage<Value>> {
    let doc: QueryDocument<Value> = FETCH_USERS.into();
    let data = client.query(&doc, json!({"first": first, "after": after})).await?;
    connection_from(&data, "users", "fetchUsers")
}

pub async fn fetch_groups(client: &GraphqlClient, first: u32, after: Option<String>) -> Result<CursorPage<Value>> {
    let doc: QueryDocument<Value> = FETCH_GROUPS.into();
    let data = client.query(&doc, json!({"first": first, "after": after})).await?;
    connection_from(&data, "groups", "fetchGroups")
}

pub async fn fetch_projects(client: &GraphqlClient, first: u32, after: Option<String>) -> Result<CursorPage<Value>> {
    let doc: QueryDocument<Value> = FETCH_PROJECTS.into();
    let data = client.query(&doc, json!({"first": first, "after": after})).await?;
    connection_from(&data, "projects", "fetchProjects")
}

pub async fn fetch_group_projects(client: &GraphqlClient, full_path: &str, first: u32, after: Option<String>) -> Result<CursorPage<Value>> {
    let doc: QueryDocument<Value> = FETCH_GROUP_PROJECTS.into();
    let data = client
        .query(&doc, json!({"fullPath": full_path, "first": first, "after": after}))
        .await?;
    let group = nested_group(&data, "fetchGroupProjects")?;
    connection_from(group, "projects", "fetchGroupProjects")
}

pub async fn fetch_subgroups(client: &GraphqlClient, full_path: &str, first: u32, after: Option<String>) -> Result<CursorPage<Value>> {
    let doc: QueryDocument<Value> = FETCH_SUBGROUPS.into();
    let data = client
        .query(&doc, json!({"fullPath": full_path, "first": first, "after": after}))
        .await?;
    let group = nested_group(&data, "fetchSubgroups")?;
    connection_from(group, "descendantGroups", "fetchSubgroups")
}

pub async fn fetch_group(client: &GraphqlClient, full_path: &str) -> Result<Value> {
    let doc: QueryDocument<Value> = FETCH_GROUP.into();
    let data = client.query(&doc, json!({"fullPath": full_path})).await?;
    entity_from(&data, "group", "fetchGroup")
}

pub async fn fetch_project(client: &GraphqlClient, full_path: &str) -> Result<Value> {
    let doc: QueryDocument<Value> = FETCH_PROJECT.into();
    let data = client.query(&doc, json!({"fullPath": full_path})).await?;
    entity_from(&data, "project", "fetchProject")
}

fn nested_group<'a>(data: &'a Value, operation: &str) -> Result<&'a Value> {
    data.get("group").ok_or_else(|| Error::UnexpectedShape {
        operation: operation.to_string(),
        detail: "missing `group` field".to_string(),
    })
}

fn entity_from(data: &Value, field: &str, operation: &str) -> Result<Value> {
    data.get(field)
        .filter(|v| !v.is_null())
        .cloned()
        .ok_or_else(|| Error::UnexpectedShape {
            operation: operation.to_string(),
            detail: format!("missing or null `{field}` field"),
        })
}

fn connection_from(data: &Value, field: &str, operation: &str) -> Result<CursorPage<Value>> {
    let connection = data.get(field).ok_or_else(|| Error::UnexpectedShape {
        operation: operation.to_string(),
        detail: format!("missing `{field}` field"),
    })?;
    validate_connection_shape(operation, connection)?;

    let nodes = connection
        .get("nodes")
        .and_then(|n| n.as_array())
        .cloned()
        .unwrap_or_default();
    let page_info = connection.get("pageInfo").expect("validated above");
    let has_next_page = page_info
        .get("hasNextPage")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let end_cursor = page_info
        .get("endCursor")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    Ok(CursorPage {
        nodes,
        page_info: PageInfo { has_next_page, end_cursor },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_from_extracts_nodes_and_page_info() {
        let data = json!({
            "users": {
                "nodes": [{"id": "1"}, {"id": "2"}],
                "pageInfo": {"hasNextPage": true, "endCursor": "c2"}
            }
        });
        let page = connection_from(&data, "users", "fetchUsers").unwrap();
        assert_eq!(page.nodes.len(), 2);
        assert!(page.page_info.has_next_page);
        assert_eq!(page.page_info.end_cursor.as_deref(), Some("c2"));
    }

    #[test]
    fn connection_from_fails_on_missing_field() {
        let data = json!({});
        assert!(connection_from(&data, "users", "fetchUsers").is_err());
    }

    #[test]
    fn nested_group_extracts_group_subobject() {
        let data = json!({"group": {"projects": {"nodes": [], "pageInfo": {"hasNextPage": false}}}});
        let group = nested_group(&data, "fetchGroupProjects").unwrap();
        assert!(group.get("projects").is_some());
    }

    #[test]
    fn entity_from_fails_on_null() {
        let data = json!({"group": null});
        assert!(entity_from(&data, "group", "fetchGroup").is_err());
    }

    #[test]
    fn entity_from_returns_present_entity() {
        let data = json!({"project": {"id": "p1", "fullPath": "g/p"}});
        let project = entity_from(&data, "project", "fetchProject").unwrap();
        assert_eq!(project["fullPath"], "g/p");
    }
}
