//! Trigger condition evaluation over before/after snapshots.

use blueprint_core::{ConditionType, TriggerCondition};
use serde_json::Value;

use crate::snapshot::{display_string, field_string, lookup_field, lookup_path};

/// Evaluate one condition against the current and previous snapshots.
pub fn evaluate(condition: &TriggerCondition, current: &Value, previous: &Value) -> bool {
    let config = &condition.config;

    match condition.condition_type {
        ConditionType::StatusChange => field_changed(
            current,
            previous,
            "status",
            config.from_status.as_deref(),
            config.to_status.as_deref(),
        ),
        ConditionType::PriorityChange => field_changed(
            current,
            previous,
            "priority",
            config.from_priority.as_deref(),
            config.to_priority.as_deref(),
        ),
        ConditionType::AssigneeChange => field_changed(
            current,
            previous,
            "assignee",
            None,
            config.new_assignee.as_deref(),
        ),
        ConditionType::NewComment => comment_count(current) > comment_count(previous),
        ConditionType::StringMatch => {
            let Some(search) = config.search_string.as_deref() else {
                return false;
            };
            let Some(haystack) = searchable_text(current, config.field_path.as_deref()) else {
                return false;
            };

            if config.case_sensitive {
                haystack.contains(search)
            } else {
                haystack.to_lowercase().contains(&search.to_lowercase())
            }
        }
    }
}

/// AND over all conditions. An empty list is never satisfied.
pub fn evaluate_all(conditions: &[TriggerCondition], current: &Value, previous: &Value) -> bool {
    !conditions.is_empty()
        && conditions
            .iter()
            .all(|condition| evaluate(condition, current, previous))
}

fn field_changed(
    current: &Value,
    previous: &Value,
    field: &str,
    from: Option<&str>,
    to: Option<&str>,
) -> bool {
    let now = field_string(current, field);
    let before = field_string(previous, field);

    now != before
        && from.map_or(true, |expected| before.as_deref() == Some(expected))
        && to.map_or(true, |expected| now.as_deref() == Some(expected))
}

fn comment_count(state: &Value) -> usize {
    ["comments", "fields.comment.comments", "comment.comments"]
        .iter()
        .find_map(|path| lookup_path(state, path).and_then(Value::as_array))
        .map_or(0, Vec::len)
}

fn searchable_text(state: &Value, field_path: Option<&str>) -> Option<String> {
    match field_path {
        None => serde_json::to_string(state).ok(),
        Some(path) => {
            let value = lookup_field(state, path)?;
            display_string(value).or_else(|| serde_json::to_string(value).ok())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_change_to_status() {
        let previous = json!({"status": "Open"});
        let current = json!({"status": "In Progress"});

        let to_progress = TriggerCondition::status_change(None, Some("In Progress"));
        let to_closed = TriggerCondition::status_change(None, Some("Closed"));

        assert!(evaluate(&to_progress, &current, &previous));
        assert!(!evaluate(&to_closed, &current, &previous));
    }

    #[test]
    fn test_status_change_requires_an_actual_change() {
        let state = json!({"status": "Open"});
        let any = TriggerCondition::status_change(None, None);
        assert!(!evaluate(&any, &state, &state));
    }

    #[test]
    fn test_status_change_from_status() {
        let previous = json!({"status": "Open"});
        let current = json!({"status": "Done"});

        assert!(evaluate(
            &TriggerCondition::status_change(Some("Open"), None),
            &current,
            &previous
        ));
        assert!(!evaluate(
            &TriggerCondition::status_change(Some("Review"), None),
            &current,
            &previous
        ));
    }

    #[test]
    fn test_nested_jira_shape() {
        let previous = json!({"fields": {"status": {"name": "Open"}}});
        let current = json!({"fields": {"status": {"name": "In Progress"}}});

        let condition = TriggerCondition::status_change(Some("Open"), Some("In Progress"));
        assert!(evaluate(&condition, &current, &previous));
    }

    #[test]
    fn test_new_comment() {
        let condition = TriggerCondition::new("c", ConditionType::NewComment);
        let previous = json!({"comments": [{"body": "a"}]});
        let current = json!({"comments": [{"body": "a"}, {"body": "b"}]});
        let jira = json!({"fields": {"comment": {"comments": [{}, {}, {}]}}});

        assert!(evaluate(&condition, &current, &previous));
        assert!(!evaluate(&condition, &previous, &current));
        assert!(evaluate(&condition, &jira, &current));
        assert!(evaluate(&condition, &previous, &json!({})));
    }

    #[test]
    fn test_assignee_change() {
        let mut condition = TriggerCondition::new("a", ConditionType::AssigneeChange);
        let previous = json!({"assignee": null});
        let current = json!({
            "fields": {
                "assignee": { "displayName": "Ada", "emailAddress": "ada@example.com" }
            }
        });

        assert!(evaluate(&condition, &current, &previous));

        condition.config.new_assignee = Some("Ada".into());
        assert!(evaluate(&condition, &current, &previous));

        condition.config.new_assignee = Some("Grace".into());
        assert!(!evaluate(&condition, &current, &previous));
    }

    #[test]
    fn test_priority_change() {
        let mut condition = TriggerCondition::new("p", ConditionType::PriorityChange);
        condition.config.from_priority = Some("Low".into());
        condition.config.to_priority = Some("High".into());

        let previous = json!({"priority": "Low"});
        assert!(evaluate(&condition, &json!({"priority": "High"}), &previous));
        assert!(!evaluate(&condition, &json!({"priority": "Medium"}), &previous));
    }

    #[test]
    fn test_string_match_field_and_whole_state() {
        let state = json!({"summary": "Deploy the Payments service", "labels": ["urgent"]});
        let empty = json!({});

        let field_insensitive = TriggerCondition::string_match(Some("summary"), "payments", false);
        let field_sensitive = TriggerCondition::string_match(Some("summary"), "payments", true);
        let whole_state = TriggerCondition::string_match(None, "urgent", true);
        let missing_field = TriggerCondition::string_match(Some("description"), "x", false);

        assert!(evaluate(&field_insensitive, &state, &empty));
        assert!(!evaluate(&field_sensitive, &state, &empty));
        assert!(evaluate(&whole_state, &state, &empty));
        assert!(!evaluate(&missing_field, &state, &empty));
    }

    #[test]
    fn test_string_match_without_search_string() {
        let condition = TriggerCondition::new("s", ConditionType::StringMatch);
        assert!(!evaluate(&condition, &json!({"a": "b"}), &json!({})));
    }

    #[test]
    fn test_evaluate_all_is_conjunctive() {
        let previous = json!({"status": "Open", "comments": []});
        let current = json!({"status": "In Progress", "comments": [{}]});

        let both = vec![
            TriggerCondition::status_change(None, Some("In Progress")),
            TriggerCondition::new("c", ConditionType::NewComment),
        ];
        let one_fails = vec![
            TriggerCondition::status_change(None, Some("Closed")),
            TriggerCondition::new("c", ConditionType::NewComment),
        ];

        assert!(evaluate_all(&both, &current, &previous));
        assert!(!evaluate_all(&one_fails, &current, &previous));
        assert!(!evaluate_all(&[], &current, &previous));
    }
}
