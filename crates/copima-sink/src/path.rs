//! Pure derivation of a sink file path from a resource type and hierarchy.

use std::path::{Path, PathBuf};

use crate::naming::NamingConvention;

/// Derive the path a batch of `resource_type` records at `hierarchy` would be
/// written to, rooted at `root_dir`.
///
/// `path = root_dir / hierarchy[0] / hierarchy[1] / … / format(resource_type) + ".jsonl"`.
/// Hierarchy segments are used verbatim (a segment may itself contain `/`,
/// e.g. a group's own slash-separated path, and is joined as nested
/// components). Pure: no I/O, no directory creation.
pub fn path_for(root_dir: &Path, resource_type: &str, hierarchy: &[String], naming: NamingConvention) -> PathBuf {
    let mut path = root_dir.to_path_buf();
    for segment in hierarchy {
        path.push(segment);
    }
    path.push(format!("{}.jsonl", naming.format(resource_type)));
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_users_path_is_rooted_directly() {
        let path = path_for(Path::new("/out"), "users", &[], NamingConvention::KebabCase);
        assert_eq!(path, Path::new("/out/users.jsonl"));
    }

    #[test]
    fn group_path_nests_under_groups_and_its_own_path() {
        let hierarchy = vec!["groups".to_string(), "a/b/c".to_string()];
        let path = path_for(Path::new("/out"), "GroupMember", &hierarchy, NamingConvention::KebabCase);
        assert_eq!(path, Path::new("/out/groups/a/b/c/group-member.jsonl"));
    }

    #[test]
    fn project_path_nests_under_group_chain_and_projects() {
        let hierarchy = vec!["groups".to_string(), "g".to_string(), "projects".to_string()];
        let path = path_for(Path::new("/out"), "CommitComment", &hierarchy, NamingConvention::SnakeCase);
        assert_eq!(path, Path::new("/out/groups/g/projects/commit_comment.jsonl"));
    }

    #[test]
    fn naming_convention_only_affects_leaf_filename() {
        let hierarchy = vec!["Groups".to_string()];
        let path = path_for(Path::new("/out"), "users", &hierarchy, NamingConvention::KebabCase);
        assert_eq!(path, Path::new("/out/Groups/users.jsonl"));
    }
}
