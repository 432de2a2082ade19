use serde::{Deserialize, Serialize};

pub const API_VERSION: &str = "1.0.0";

/// Action item extracted from a meeting by the upstream insight pipeline.
///
/// `title` is the join key against [`ExternalAction`]. `task` is a legacy
/// alias for `title` kept for older payloads. Every field is optional at the
/// wire level; the kernel decides what a usable entry looks like.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionItem {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub task: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub issue_url: Option<String>,
}

/// Previously created or known external record. Read-only to this workflow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExternalAction {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub issue_url: Option<String>,
    #[serde(default)]
    pub ics_path: Option<String>,
    /// Not part of the originally observed upstream payload, but honored when
    /// present so the owner resolver can fall back to action records.
    #[serde(default)]
    pub owner: Option<String>,
}

/// Source of truth for assignable owners when present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskOwner {
    #[serde(default)]
    pub owner: Option<String>,
}

/// `decisions` arrives either as a single string or as an ordered list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Decisions {
    Text(String),
    List(Vec<String>),
}

/// Block of extracted insights when the payload nests them under `insights`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InsightsBlock {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub decisions: Option<Decisions>,
    #[serde(default)]
    pub action_items: Option<Vec<ActionItem>>,
}

/// Raw upstream analysis result. Two shapes are tolerated: insights nested
/// under an `insights` key, or the same fields flat at the top level. The
/// kernel collapses either shape into a [`MeetingRecord`] once, at the
/// boundary, so nothing downstream carries dual-field fallbacks.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalysisPayload {
    #[serde(default)]
    pub insights: Option<InsightsBlock>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub decisions: Option<Decisions>,
    #[serde(default)]
    pub action_items: Option<Vec<ActionItem>>,
    #[serde(default)]
    pub actions: Vec<ExternalAction>,
    #[serde(default)]
    pub task_owners: Vec<TaskOwner>,
}

/// Canonical, boundary-normalized form of one analysis result.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MeetingRecord {
    pub summary: String,
    pub decisions: Vec<String>,
    pub action_items: Vec<ActionItem>,
    pub actions: Vec<ExternalAction>,
    pub task_owners: Vec<TaskOwner>,
}

/// Unified display view of one action item after identity matching and field
/// reconciliation. Derived, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciledView {
    pub display_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_due_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_issue_url: Option<String>,
    pub has_calendar_event: bool,
    pub can_create: bool,
}

/// Display contract for one ingested meeting.
#[derive(Debug, Clone, Serialize)]
pub struct MeetingView {
    pub meeting_id: String,
    pub summary: String,
    pub decisions: Vec<String>,
    pub action_items: Vec<ReconciledView>,
}

/// Editable submission form fields. The caller's edits win over the prefilled
/// defaults; `task_id` is carried from the originating item and is never
/// editable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormDraft {
    pub title: String,
    pub due_date: String,
    pub priority: String,
    pub owner: String,
    pub details: String,
    #[serde(default)]
    pub task_id: Option<String>,
}

/// Wire body sent to the external task-creation endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionRequest {
    pub title: String,
    pub due: String,
    pub owner: String,
    pub priority: String,
    pub details: String,
    pub idempotency_key: String,
}

/// Success body from the task-creation endpoint. Carries at least `raw`;
/// `raw.issue_url` is present when the created record has an external link.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskCreated {
    pub raw: CreatedRaw,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreatedRaw {
    #[serde(default)]
    pub issue_url: Option<String>,
}

/// Failure body from the task-creation endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EndpointError {
    #[serde(default)]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_parses_with_nested_insights() {
        let payload: AnalysisPayload = serde_json::from_value(json!({
            "insights": {
                "summary": "weekly sync",
                "decisions": ["ship it"],
                "action_items": [{"title": "Send report", "owner": "A"}]
            },
            "actions": [{"title": "Send report", "issue_url": "http://x/1"}],
            "task_owners": [{"owner": "A"}]
        }))
        .expect("nested payload should parse");
        let insights = payload.insights.expect("insights block");
        assert_eq!(insights.summary.as_deref(), Some("weekly sync"));
        assert_eq!(payload.actions.len(), 1);
        assert_eq!(payload.task_owners.len(), 1);
    }

    #[test]
    fn payload_parses_with_flat_fields() {
        let payload: AnalysisPayload = serde_json::from_value(json!({
            "summary": "weekly sync",
            "decisions": "ship it",
            "action_items": [{"task": "Send report"}]
        }))
        .expect("flat payload should parse");
        assert!(payload.insights.is_none());
        assert!(matches!(payload.decisions, Some(Decisions::Text(_))));
        assert_eq!(payload.action_items.expect("items").len(), 1);
    }

    #[test]
    fn decisions_accepts_string_and_list() {
        let one: Decisions = serde_json::from_value(json!("ship it")).unwrap();
        assert!(matches!(one, Decisions::Text(_)));
        let many: Decisions = serde_json::from_value(json!(["a", "b"])).unwrap();
        assert!(matches!(many, Decisions::List(ref v) if v.len() == 2));
    }
}
