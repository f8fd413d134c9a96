//! Human-readable operation summaries.

use serde::Serialize;

/// Kind of mutating operation a summary describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Entry created.
    Create,
    /// Entry modified.
    Update,
    /// Entry removed.
    Delete,
    /// Members added.
    AddMember,
    /// Members removed.
    RemoveMember,
}

/// Summary of a mutating operation keyed by the object's primary key.
///
/// `count` is only rendered for membership operations.
#[must_use]
pub fn mutation_summary(kind: OperationKind, object_name: &str, value: &str, count: usize) -> String {
    match kind {
        OperationKind::Create => format!("Added {object_name} \"{value}\""),
        OperationKind::Update => format!("Modified {object_name} \"{value}\""),
        OperationKind::Delete => format!("Deleted {object_name} \"{value}\""),
        OperationKind::AddMember => format!(
            "Added {count} {} to {object_name} \"{value}\"",
            pluralize(count, "member", "members")
        ),
        OperationKind::RemoveMember => format!(
            "Removed {count} {} from {object_name} \"{value}\"",
            pluralize(count, "member", "members")
        ),
    }
}

/// Count-based summary of a search.
#[must_use]
pub fn search_summary(count: usize, singular: &str, plural: &str, truncated: bool) -> String {
    let mut summary = format!("{count} {} matched", pluralize(count, singular, plural));
    if truncated {
        summary.push_str(" (search result truncated by size limit)");
    }
    summary
}

fn pluralize<'a>(count: usize, singular: &'a str, plural: &'a str) -> &'a str {
    if count == 1 {
        singular
    } else {
        plural
    }
}

/// Result of a mutating operation with its summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome<T> {
    /// Operation payload.
    pub result: T,
    /// Primary key value the operation targeted.
    pub value: String,
    /// Rendered summary.
    pub summary: String,
    /// Operation kind.
    pub kind: OperationKind,
}

impl<T> Outcome<T> {
    pub(crate) fn new(kind: OperationKind, object_name: &str, value: String, result: T) -> Self {
        Self {
            summary: mutation_summary(kind, object_name, &value, 0),
            result,
            value,
            kind,
        }
    }
}
