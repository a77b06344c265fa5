//! Leaf filename formatting for sink paths.
//!
//! Applies only to the final path component (the resource type, e.g.
//! `GroupMember` → `group-member.jsonl`); directory segments supplied in a
//! hierarchy are used verbatim.

use serde::{Deserialize, Serialize};

/// Naming convention applied to a resource type when deriving a filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum NamingConvention {
    /// Strip whitespace and lowercase, no word separators inserted.
    Lowercase,
    /// Convert camelCase word boundaries to hyphens.
    #[default]
    KebabCase,
    /// Convert camelCase word boundaries to underscores.
    SnakeCase,
}

impl NamingConvention {
    /// Format `resource_type` as a filename stem per this convention.
    pub fn format(self, resource_type: &str) -> String {
        match self {
            NamingConvention::Lowercase => {
                resource_type.chars().filter(|c| !c.is_whitespace()).flat_map(char::to_lowercase).collect()
            }
            NamingConvention::KebabCase => split_words(resource_type, '-'),
            NamingConvention::SnakeCase => split_words(resource_type, '_'),
        }
    }
}

/// Insert `sep` at camelCase word boundaries and lowercase the result.
fn split_words(input: &str, sep: char) -> String {
    let mut out = String::with_capacity(input.len() + 4);
    let mut prev_lower_or_digit = false;
    for c in input.chars() {
        if c.is_whitespace() {
            if !out.is_empty() && !out.ends_with(sep) {
                out.push(sep);
            }
            prev_lower_or_digit = false;
            continue;
        }
        if c.is_uppercase() && prev_lower_or_digit && !out.is_empty() {
            out.push(sep);
        }
        out.extend(c.to_lowercase());
        prev_lower_or_digit = c.is_lowercase() || c.is_ascii_digit();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercase_strips_whitespace_and_lowercases() {
        assert_eq!(NamingConvention::Lowercase.format("Group Member"), "groupmember");
    }

    #[test]
    fn kebab_case_splits_camel_case() {
        assert_eq!(NamingConvention::KebabCase.format("GroupMember"), "group-member");
        assert_eq!(NamingConvention::KebabCase.format("groupMember"), "group-member");
    }

    #[test]
    fn snake_case_splits_camel_case() {
        assert_eq!(NamingConvention::SnakeCase.format("GroupMember"), "group_member");
    }

    #[test]
    fn single_word_is_unaffected_by_casing_convention() {
        assert_eq!(NamingConvention::KebabCase.format("users"), "users");
        assert_eq!(NamingConvention::SnakeCase.format("Users"), "users");
    }

    #[test]
    fn default_is_kebab_case() {
        assert_eq!(NamingConvention::default(), NamingConvention::KebabCase);
    }
}
