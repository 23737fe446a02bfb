//! Operation categories and status snapshots.

use serde::{Deserialize, Serialize};

/// Class of work admitted by the controller.
///
/// Each category has its own concurrency ceiling (see
/// `crate::config::ConcurrencyLimits`) and its own queue; categories never
/// contend with each other for slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationCategory {
    /// Interactive questions and word lookups against a document.
    Query,
    /// Content indexing.
    Indexing,
    /// Content summarization.
    Summarization,
}

impl OperationCategory {
    /// All categories, in a stable order (used for status snapshots).
    pub const ALL: [OperationCategory; 3] = [Self::Query, Self::Indexing, Self::Summarization];

    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Indexing => "indexing",
            Self::Summarization => "summarization",
        }
    }
}

impl std::fmt::Display for OperationCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Point-in-time snapshot of one category's bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryStatus {
    /// Operations currently executing.
    pub active: usize,
    /// Operations waiting in the queue.
    pub queued: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_snake_case() {
        assert_eq!(OperationCategory::Query.to_string(), "query");
        assert_eq!(OperationCategory::Summarization.to_string(), "summarization");
    }

    #[test]
    fn serializes_snake_case() {
        let json = serde_json::to_string(&OperationCategory::Indexing).unwrap();
        assert_eq!(json, "\"indexing\"");
    }
}
