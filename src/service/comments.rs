//! Commit comments

use crate::store::Metadata;

/// Builds the full commit comment from the user's comment and the request
/// metadata.
pub trait CommentFormatter: Send + Sync {
    fn format_comment(&self, comment: &str, metadata: &Metadata) -> String;
}

/// Kind of change a default comment describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
}

/// `comment` unless empty, else e.g. `Updating A/B test buttons`.
pub fn default_comment(kind: ChangeKind, test_name: &str, comment: &str) -> String {
    if !comment.is_empty() {
        return comment.to_string();
    }
    let verb = match kind {
        ChangeKind::Create => "Creating",
        ChangeKind::Update => "Updating",
        ChangeKind::Delete => "Deleting",
    };
    format!("{} A/B test {}", verb, test_name)
}

/// Apply `formatter` if configured, otherwise trim.
pub fn format_full_comment(
    formatter: Option<&dyn CommentFormatter>,
    comment: &str,
    metadata: &Metadata,
) -> String {
    match formatter {
        Some(formatter) => formatter.format_comment(comment, metadata),
        None => comment.trim().to_string(),
    }
}
