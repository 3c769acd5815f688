use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use utoipa::ToSchema;

const TICKET_TYPES: &[&str] = &[
    "ticket",
    "issue",
    "jira_ticket",
    "jira_issue",
    "linear_issue",
    "github_issue",
    "story",
    "bug",
];
const TICKET_SOURCES: &[&str] = &["jira", "linear", "youtrack"];
const TICKET_TAGS: &[&str] = &["ticket", "issue"];

const REPOSITORY_TYPES: &[&str] = &["repository", "repo", "git_repository", "codebase"];
const REPOSITORY_SOURCES: &[&str] = &["github", "gitlab", "bitbucket", "git"];
const REPOSITORY_TAGS: &[&str] = &["repository", "repo", "codebase"];

const DOCUMENT_TYPES: &[&str] = &[
    "document",
    "doc",
    "markdown",
    "pdf",
    "wiki_page",
    "spec",
    "note",
];
const DOCUMENT_SOURCES: &[&str] = &["confluence", "notion", "google_docs", "sharepoint"];
const DOCUMENT_TAGS: &[&str] = &["document", "docs", "documentation"];

/// A piece of importable reference material held by the context catalog.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct ContextItem {
    pub id: String,
    pub name: String,
    pub item_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub metadata: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ContextItem {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        item_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            item_type: item_type.into(),
            source: None,
            tags: Vec::new(),
            metadata: HashMap::new(),
            updated_at: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = Some(updated_at);
        self
    }

    fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

/// Semantic category a wildcard requirement is expressed in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WildcardType {
    GenericTicket,
    GenericRepository,
    GenericDocument,
}

impl WildcardType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GenericTicket => "generic_ticket",
            Self::GenericRepository => "generic_repository",
            Self::GenericDocument => "generic_document",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "generic_ticket" => Some(Self::GenericTicket),
            "generic_repository" => Some(Self::GenericRepository),
            "generic_document" => Some(Self::GenericDocument),
            _ => None,
        }
    }

    /// Category heuristic over the item's concrete type, source and tags.
    pub fn matches(&self, item: &ContextItem) -> bool {
        let (types, sources, tags) = match self {
            Self::GenericTicket => (TICKET_TYPES, TICKET_SOURCES, TICKET_TAGS),
            Self::GenericRepository => (REPOSITORY_TYPES, REPOSITORY_SOURCES, REPOSITORY_TAGS),
            Self::GenericDocument => (DOCUMENT_TYPES, DOCUMENT_SOURCES, DOCUMENT_TAGS),
        };

        let item_type = item.item_type.to_ascii_lowercase();
        if types.contains(&item_type.as_str()) {
            return true;
        }

        if let Some(source) = &item.source {
            if sources.contains(&source.to_ascii_lowercase().as_str()) {
                return true;
            }
        }

        tags.iter().any(|tag| item.has_tag(tag))
    }
}

impl std::fmt::Display for WildcardType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Narrowing filters applied after category matching.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct WildcardFilters {
    /// Candidate must carry at least one of these tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Candidate source must be one of these
    #[serde(default)]
    pub source: Vec<String>,
}

impl WildcardFilters {
    pub fn accepts(&self, item: &ContextItem) -> bool {
        let tags_ok = self.tags.is_empty() || self.tags.iter().any(|t| item.has_tag(t));

        let source_ok = self.source.is_empty()
            || item
                .source
                .as_deref()
                .is_some_and(|s| self.source.iter().any(|allowed| allowed.eq_ignore_ascii_case(s)));

        tags_ok && source_ok
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionType {
    Explicit,
    WildcardResolved,
}

/// A requirement bound to a concrete catalog item.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct AppliedContextItem {
    pub requirement_id: String,
    pub context_item_id: String,
    pub resolution_type: ResolutionType,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub metadata: HashMap<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_category_by_type_source_or_tag() {
        let by_type = ContextItem::new("a", "A", "jira_ticket");
        let by_source = ContextItem::new("b", "B", "page").with_source("Jira");
        let by_tag = ContextItem::new("c", "C", "page").with_tags(["Issue"]);
        let neither = ContextItem::new("d", "D", "page").with_source("notion");

        assert!(WildcardType::GenericTicket.matches(&by_type));
        assert!(WildcardType::GenericTicket.matches(&by_source));
        assert!(WildcardType::GenericTicket.matches(&by_tag));
        assert!(!WildcardType::GenericTicket.matches(&neither));
        assert!(WildcardType::GenericDocument.matches(&neither));
    }

    #[test]
    fn test_repository_category() {
        let repo = ContextItem::new("r", "Repo", "folder").with_source("github");
        assert!(WildcardType::GenericRepository.matches(&repo));
        assert!(!WildcardType::GenericDocument.matches(&repo));
    }

    #[test]
    fn test_filters_tag_intersection_and_source_membership() {
        let item = ContextItem::new("a", "A", "ticket")
            .with_source("jira")
            .with_tags(["backend", "urgent"]);

        let matching = WildcardFilters {
            tags: vec!["frontend".into(), "backend".into()],
            source: vec!["jira".into(), "linear".into()],
        };
        assert!(matching.accepts(&item));

        let wrong_tags = WildcardFilters {
            tags: vec!["frontend".into()],
            source: Vec::new(),
        };
        assert!(!wrong_tags.accepts(&item));

        let wrong_source = WildcardFilters {
            tags: Vec::new(),
            source: vec!["linear".into()],
        };
        assert!(!wrong_source.accepts(&item));

        assert!(WildcardFilters::default().accepts(&item));
    }

    #[test]
    fn test_source_filter_rejects_sourceless_item() {
        let item = ContextItem::new("a", "A", "ticket");
        let filters = WildcardFilters {
            tags: Vec::new(),
            source: vec!["jira".into()],
        };
        assert!(!filters.accepts(&item));
    }

    #[test]
    fn test_wildcard_type_parse() {
        assert_eq!(WildcardType::parse("generic_document"), Some(WildcardType::GenericDocument));
        assert_eq!(WildcardType::parse("document"), None);
        assert_eq!(WildcardType::GenericRepository.as_str(), "generic_repository");
    }
}
