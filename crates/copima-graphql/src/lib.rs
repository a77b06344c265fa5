//! GraphQL client for a GitLab-compatible endpoint: typed query documents,
//! bearer-token execution with a single refresh-and-retry on 401, and
//! cursor-connection pagination helpers.

mod client;
mod connection;
mod document;
mod error;
mod queries;

pub use client::GraphqlClient;
pub use connection::{Connection, CursorPage, PageInfo, validate_connection_shape};
pub use document::QueryDocument;
pub use error::{Error, Result};
pub use queries::{
    fetch_group, fetch_group_projects, fetch_groups, fetch_project, fetch_projects, fetch_subgroups, fetch_users,
};
