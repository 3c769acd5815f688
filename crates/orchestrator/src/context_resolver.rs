//! Binding template requirements to concrete catalog items.

use blueprint_core::{
    AppliedContextItem, ApplicationError, ApplicationWarning, ContextItem, ContextRequirement,
    RequirementKind, ResolutionType, WildcardFilters, WildcardType,
};
use events::{AuditLog, Event};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::catalog::ContextCatalog;

/// Picks one item out of the candidates that survived category matching and
/// filtering.
pub trait CandidateRanker: Send + Sync {
    fn name(&self) -> &'static str;

    fn select<'a>(&self, candidates: &'a [ContextItem]) -> Option<&'a ContextItem>;
}

/// First candidate in catalog order.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstMatch;

impl CandidateRanker for FirstMatch {
    fn name(&self) -> &'static str {
        "first_match"
    }

    fn select<'a>(&self, candidates: &'a [ContextItem]) -> Option<&'a ContextItem> {
        candidates.first()
    }
}

/// Candidate with the latest `updated_at`. Items without a timestamp rank
/// last; ties go to the earlier catalog position.
#[derive(Debug, Clone, Copy, Default)]
pub struct MostRecentlyUpdated;

impl CandidateRanker for MostRecentlyUpdated {
    fn name(&self) -> &'static str {
        "most_recently_updated"
    }

    fn select<'a>(&self, candidates: &'a [ContextItem]) -> Option<&'a ContextItem> {
        candidates.iter().reduce(|best, item| {
            if item.updated_at > best.updated_at {
                item
            } else {
                best
            }
        })
    }
}

/// Look up a ranker by its name
pub fn ranker_by_name(name: &str) -> Option<Arc<dyn CandidateRanker>> {
    match name {
        "first_match" => Some(Arc::new(FirstMatch)),
        "most_recently_updated" => Some(Arc::new(MostRecentlyUpdated)),
        _ => None,
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ResolutionFailure {
    #[error("Context item not found: {item_id}")]
    ItemNotFound { item_id: String },

    #[error("Override for {wildcard_type} names unknown context item: {item_id}")]
    OverrideNotFound {
        wildcard_type: WildcardType,
        item_id: String,
    },

    #[error("No context item matches {wildcard_type}")]
    NoCandidates { wildcard_type: WildcardType },

    #[error("Catalog unavailable: {0}")]
    Catalog(String),
}

/// Everything `resolve_all` learned about a template's requirements.
#[derive(Debug, Clone, Default)]
pub struct ContextResolution {
    pub items: Vec<AppliedContextItem>,
    pub errors: Vec<ApplicationError>,
    pub warnings: Vec<ApplicationWarning>,
}

impl ContextResolution {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

pub struct ContextRequirementResolver {
    catalog: Arc<dyn ContextCatalog>,
    ranker: Arc<dyn CandidateRanker>,
    audit: Option<Arc<dyn AuditLog>>,
}

impl ContextRequirementResolver {
    pub fn new(catalog: Arc<dyn ContextCatalog>) -> Self {
        Self {
            catalog,
            ranker: Arc::new(FirstMatch),
            audit: None,
        }
    }

    pub fn with_ranker(mut self, ranker: Arc<dyn CandidateRanker>) -> Self {
        self.ranker = ranker;
        self
    }

    pub fn with_audit_log(mut self, audit: Arc<dyn AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn ranker_name(&self) -> &'static str {
        self.ranker.name()
    }

    /// Bind a single requirement.
    ///
    /// Overrides apply to wildcard requirements only and are looked up by
    /// requirement id first, then by wildcard type.
    pub async fn resolve(
        &self,
        requirement: &ContextRequirement,
        overrides: &HashMap<String, String>,
    ) -> Result<AppliedContextItem, ResolutionFailure> {
        match &requirement.kind {
            RequirementKind::Explicit { context_item_id } => {
                let item = self.lookup(context_item_id).await?.ok_or_else(|| {
                    ResolutionFailure::ItemNotFound {
                        item_id: context_item_id.clone(),
                    }
                })?;

                Ok(AppliedContextItem {
                    requirement_id: requirement.id.clone(),
                    context_item_id: item.id.clone(),
                    resolution_type: ResolutionType::Explicit,
                    metadata: item_metadata(&item),
                })
            }
            RequirementKind::Wildcard {
                wildcard_type,
                wildcard_filters,
            } => {
                let override_id = overrides
                    .get(&requirement.id)
                    .or_else(|| overrides.get(wildcard_type.as_str()));

                if let Some(item_id) = override_id {
                    let item = self.lookup(item_id).await?.ok_or_else(|| {
                        ResolutionFailure::OverrideNotFound {
                            wildcard_type: *wildcard_type,
                            item_id: item_id.clone(),
                        }
                    })?;

                    let mut metadata = item_metadata(&item);
                    metadata.insert("wildcard_type".into(), json!(wildcard_type.as_str()));
                    metadata.insert("from_override".into(), json!(true));

                    return Ok(AppliedContextItem {
                        requirement_id: requirement.id.clone(),
                        context_item_id: item.id,
                        resolution_type: ResolutionType::WildcardResolved,
                        metadata,
                    });
                }

                self.match_wildcard(requirement, *wildcard_type, wildcard_filters.as_ref())
                    .await
            }
        }
    }

    async fn match_wildcard(
        &self,
        requirement: &ContextRequirement,
        wildcard_type: WildcardType,
        filters: Option<&WildcardFilters>,
    ) -> Result<AppliedContextItem, ResolutionFailure> {
        let mut candidates = self
            .catalog
            .query_by_category(wildcard_type)
            .await
            .map_err(|e| ResolutionFailure::Catalog(e.to_string()))?;

        if let Some(filters) = filters {
            candidates.retain(|item| filters.accepts(item));
        }

        debug!(
            requirement_id = %requirement.id,
            wildcard_type = %wildcard_type,
            candidates = candidates.len(),
            ranker = self.ranker.name(),
            "Ranking wildcard candidates"
        );

        let item = self
            .ranker
            .select(&candidates)
            .ok_or(ResolutionFailure::NoCandidates { wildcard_type })?;

        let mut metadata = item_metadata(item);
        metadata.insert("wildcard_type".into(), json!(wildcard_type.as_str()));
        metadata.insert("from_override".into(), json!(false));
        metadata.insert("ranker".into(), json!(self.ranker.name()));
        metadata.insert("candidate_count".into(), json!(candidates.len()));

        Ok(AppliedContextItem {
            requirement_id: requirement.id.clone(),
            context_item_id: item.id.clone(),
            resolution_type: ResolutionType::WildcardResolved,
            metadata,
        })
    }

    /// Resolve every requirement of a template in declaration order.
    ///
    /// A failed required requirement becomes a `context_resolution` error, a
    /// failed optional one a warning. Resolution always continues with the
    /// next requirement.
    pub async fn resolve_all(
        &self,
        template_id: &str,
        requirements: &[ContextRequirement],
        overrides: &HashMap<String, String>,
    ) -> ContextResolution {
        let mut resolution = ContextResolution::default();

        for requirement in requirements {
            match self.resolve(requirement, overrides).await {
                Ok(applied) => {
                    self.record_resolved(template_id, requirement, &applied);
                    resolution.items.push(applied);
                }
                Err(failure) => {
                    self.record_failed(template_id, requirement, &failure);
                    let message = failure.to_string();
                    if requirement.required {
                        resolution
                            .errors
                            .push(ApplicationError::context(&requirement.id, message));
                    } else {
                        resolution.warnings.push(ApplicationWarning::for_requirement(
                            &requirement.id,
                            format!("Optional requirement skipped: {}", message),
                        ));
                    }
                }
            }
        }

        resolution
    }

    async fn lookup(&self, id: &str) -> Result<Option<ContextItem>, ResolutionFailure> {
        self.catalog
            .lookup(id)
            .await
            .map_err(|e| ResolutionFailure::Catalog(e.to_string()))
    }

    fn record_resolved(
        &self,
        template_id: &str,
        requirement: &ContextRequirement,
        applied: &AppliedContextItem,
    ) {
        let Some(audit) = &self.audit else { return };

        let event = match &requirement.kind {
            RequirementKind::Explicit { .. } => Event::ContextResolved {
                template_id: template_id.to_string(),
                requirement_id: requirement.id.clone(),
                context_item_id: applied.context_item_id.clone(),
            },
            RequirementKind::Wildcard { wildcard_type, .. } => Event::WildcardResolved {
                template_id: template_id.to_string(),
                requirement_id: requirement.id.clone(),
                wildcard_type: wildcard_type.as_str().to_string(),
                context_item_id: applied.context_item_id.clone(),
                from_override: applied.metadata.get("from_override") == Some(&Value::Bool(true)),
            },
        };
        audit.record(event);
    }

    fn record_failed(
        &self,
        template_id: &str,
        requirement: &ContextRequirement,
        failure: &ResolutionFailure,
    ) {
        let Some(audit) = &self.audit else { return };

        let event = match &requirement.kind {
            RequirementKind::Explicit { .. } => Event::ContextFailed {
                template_id: template_id.to_string(),
                requirement_id: requirement.id.clone(),
                required: requirement.required,
                reason: failure.to_string(),
            },
            RequirementKind::Wildcard { wildcard_type, .. } => Event::WildcardFailed {
                template_id: template_id.to_string(),
                requirement_id: requirement.id.clone(),
                wildcard_type: wildcard_type.as_str().to_string(),
                required: requirement.required,
                reason: failure.to_string(),
            },
        };
        audit.record(event);
    }
}

fn item_metadata(item: &ContextItem) -> HashMap<String, Value> {
    let mut metadata = HashMap::new();
    metadata.insert("name".to_string(), json!(item.name));
    metadata.insert("item_type".to_string(), json!(item.item_type));
    if let Some(source) = &item.source {
        metadata.insert("source".to_string(), json!(source));
    }
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use blueprint_core::ErrorKind;
    use chrono::{TimeZone, Utc};
    use events::EventBus;

    fn catalog() -> Arc<InMemoryCatalog> {
        Arc::new(InMemoryCatalog::with_items([
            ContextItem::new("lib_1", "Style guide", "document"),
            ContextItem::new("t_1", "PROJ-1", "jira_issue")
                .with_source("jira")
                .with_tags(["backend"])
                .with_updated_at(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()),
            ContextItem::new("t_2", "PROJ-2", "jira_issue")
                .with_source("jira")
                .with_tags(["frontend"])
                .with_updated_at(Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()),
            ContextItem::new("gh_9", "Issue 9", "github_issue").with_source("github"),
        ]))
    }

    fn no_overrides() -> HashMap<String, String> {
        HashMap::new()
    }

    #[tokio::test]
    async fn test_explicit_requirement_resolves_to_its_item() {
        let resolver = ContextRequirementResolver::new(catalog());
        let requirement = ContextRequirement::explicit("req_1", "lib_1");

        let applied = resolver.resolve(&requirement, &no_overrides()).await.unwrap();

        assert_eq!(applied.context_item_id, "lib_1");
        assert_eq!(applied.requirement_id, "req_1");
        assert_eq!(applied.resolution_type, ResolutionType::Explicit);
        assert_eq!(applied.metadata["name"], "Style guide");
    }

    #[tokio::test]
    async fn test_explicit_requirement_missing_item() {
        let resolver = ContextRequirementResolver::new(catalog());
        let requirement = ContextRequirement::explicit("req_1", "lib_404");

        let failure = resolver
            .resolve(&requirement, &no_overrides())
            .await
            .unwrap_err();
        assert_eq!(
            failure,
            ResolutionFailure::ItemNotFound {
                item_id: "lib_404".into()
            }
        );
    }

    #[tokio::test]
    async fn test_override_always_wins_over_matching() {
        let resolver = ContextRequirementResolver::new(catalog());
        let requirement = ContextRequirement::wildcard("ticket", WildcardType::GenericTicket);
        let overrides = HashMap::from([("generic_ticket".to_string(), "t_2".to_string())]);

        for _ in 0..3 {
            let applied = resolver.resolve(&requirement, &overrides).await.unwrap();
            assert_eq!(applied.context_item_id, "t_2");
            assert_eq!(applied.resolution_type, ResolutionType::WildcardResolved);
            assert_eq!(applied.metadata["from_override"], true);
        }
    }

    #[tokio::test]
    async fn test_override_by_requirement_id_takes_precedence() {
        let resolver = ContextRequirementResolver::new(catalog());
        let requirement = ContextRequirement::wildcard("ticket", WildcardType::GenericTicket);
        let overrides = HashMap::from([
            ("generic_ticket".to_string(), "t_2".to_string()),
            ("ticket".to_string(), "gh_9".to_string()),
        ]);

        let applied = resolver.resolve(&requirement, &overrides).await.unwrap();
        assert_eq!(applied.context_item_id, "gh_9");
    }

    #[tokio::test]
    async fn test_unknown_override_does_not_fall_back() {
        let resolver = ContextRequirementResolver::new(catalog());
        let requirement = ContextRequirement::wildcard("ticket", WildcardType::GenericTicket);
        let overrides = HashMap::from([("generic_ticket".to_string(), "t_404".to_string())]);

        let failure = resolver.resolve(&requirement, &overrides).await.unwrap_err();
        assert!(matches!(failure, ResolutionFailure::OverrideNotFound { .. }));
    }

    #[tokio::test]
    async fn test_wildcard_first_match_in_catalog_order() {
        let resolver = ContextRequirementResolver::new(catalog());
        let requirement = ContextRequirement::wildcard("ticket", WildcardType::GenericTicket);

        let applied = resolver.resolve(&requirement, &no_overrides()).await.unwrap();
        assert_eq!(applied.context_item_id, "t_1");
        assert_eq!(applied.metadata["ranker"], "first_match");
        assert_eq!(applied.metadata["candidate_count"], 3);
    }

    #[tokio::test]
    async fn test_wildcard_filters_narrow_candidates() {
        let resolver = ContextRequirementResolver::new(catalog());
        let requirement = ContextRequirement::wildcard("ticket", WildcardType::GenericTicket)
            .with_filters(WildcardFilters {
                tags: vec!["frontend".into()],
                source: vec![],
            });

        let applied = resolver.resolve(&requirement, &no_overrides()).await.unwrap();
        assert_eq!(applied.context_item_id, "t_2");

        let by_source = ContextRequirement::wildcard("ticket", WildcardType::GenericTicket)
            .with_filters(WildcardFilters {
                tags: vec![],
                source: vec!["github".into()],
            });
        let applied = resolver.resolve(&by_source, &no_overrides()).await.unwrap();
        assert_eq!(applied.context_item_id, "gh_9");
    }

    #[tokio::test]
    async fn test_most_recently_updated_ranker() {
        let resolver =
            ContextRequirementResolver::new(catalog()).with_ranker(Arc::new(MostRecentlyUpdated));
        let requirement = ContextRequirement::wildcard("ticket", WildcardType::GenericTicket);

        let applied = resolver.resolve(&requirement, &no_overrides()).await.unwrap();
        assert_eq!(applied.context_item_id, "t_2");
        assert_eq!(resolver.ranker_name(), "most_recently_updated");
    }

    #[test]
    fn test_rankers_on_empty_candidates() {
        assert!(FirstMatch.select(&[]).is_none());
        assert!(MostRecentlyUpdated.select(&[]).is_none());
    }

    #[test]
    fn test_ranker_by_name() {
        assert_eq!(ranker_by_name("first_match").unwrap().name(), "first_match");
        assert!(ranker_by_name("random").is_none());
    }

    #[tokio::test]
    async fn test_resolve_all_accumulates_errors_and_warnings() {
        let bus = Arc::new(EventBus::new());
        let mut rx = bus.subscribe();
        let resolver = ContextRequirementResolver::new(catalog()).with_audit_log(bus.clone());

        let requirements = vec![
            ContextRequirement::explicit("missing", "lib_404"),
            ContextRequirement::wildcard("repo", WildcardType::GenericRepository)
                .with_filters(WildcardFilters {
                    tags: vec![],
                    source: vec!["gitlab".into()],
                })
                .optional(),
            ContextRequirement::explicit("docs", "lib_1"),
        ];

        let resolution = resolver
            .resolve_all("tpl_1", &requirements, &no_overrides())
            .await;

        assert!(resolution.has_errors());
        assert_eq!(resolution.errors.len(), 1);
        assert_eq!(resolution.errors[0].kind, ErrorKind::ContextResolution);
        assert_eq!(resolution.errors[0].requirement_id.as_deref(), Some("missing"));
        assert_eq!(resolution.warnings.len(), 1);
        assert_eq!(resolution.warnings[0].requirement_id.as_deref(), Some("repo"));
        assert_eq!(resolution.items.len(), 1);
        assert_eq!(resolution.items[0].context_item_id, "lib_1");

        let first = rx.recv().await.unwrap();
        assert!(matches!(first.event, Event::ContextFailed { required: true, .. }));
        let second = rx.recv().await.unwrap();
        assert!(matches!(second.event, Event::WildcardFailed { required: false, .. }));
        let third = rx.recv().await.unwrap();
        assert!(matches!(third.event, Event::ContextResolved { .. }));
    }
}
