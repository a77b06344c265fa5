//! Hierarchical JSONL sink: derives a directory path from a resource type
//! and an entity hierarchy, then appends newline-delimited JSON records to
//! it, creating missing parent directories as needed.

pub mod error;
pub mod naming;
pub mod path;
pub mod sink;

pub use error::{Error, Result};
pub use naming::NamingConvention;
pub use path::path_for;
pub use sink::{Compression, HierarchicalSink};
