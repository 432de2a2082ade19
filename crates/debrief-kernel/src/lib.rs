use chrono::NaiveDate;
use debrief_contracts::{
    ActionItem, AnalysisPayload, Decisions, ExternalAction, FormDraft, MeetingRecord,
    ReconciledView, SubmissionRequest, TaskOwner,
};

/// Collapses either tolerated upstream shape into the canonical record.
/// Nested `insights` fields win over their flat counterparts.
pub fn canonicalize(payload: AnalysisPayload) -> MeetingRecord {
    let insights = payload.insights.unwrap_or_default();
    let summary = insights
        .summary
        .or(payload.summary)
        .unwrap_or_default();
    let decisions = match insights.decisions.or(payload.decisions) {
        Some(Decisions::Text(text)) => vec![text],
        Some(Decisions::List(list)) => list,
        None => Vec::new(),
    };
    let action_items = insights
        .action_items
        .or(payload.action_items)
        .unwrap_or_default();
    MeetingRecord {
        summary,
        decisions,
        action_items,
        actions: payload.actions,
        task_owners: payload.task_owners,
    }
}

/// Returns the first external action whose title is exactly equal to the
/// item's title. No trimming, no case folding; duplicate titles are not an
/// error, collection order decides.
pub fn match_external<'a>(
    item: &ActionItem,
    actions: &'a [ExternalAction],
) -> Option<&'a ExternalAction> {
    let title = item.title.as_deref()?;
    actions.iter().find(|action| action.title == title)
}

/// Projects one item and its matched external action (if any) into the
/// display view. Pure; `today` feeds due-date normalization.
pub fn reconcile(
    item: &ActionItem,
    matched: Option<&ExternalAction>,
    today: NaiveDate,
) -> ReconciledView {
    let display_title = non_empty(item.title.as_deref())
        .or_else(|| non_empty(item.task.as_deref()))
        .unwrap_or_default()
        .to_string();
    // The item's own link always wins over the matched record's link.
    let resolved_issue_url = non_empty(item.issue_url.as_deref())
        .or_else(|| non_empty(matched.and_then(|a| a.issue_url.as_deref())))
        .map(str::to_string);
    let can_create = resolved_issue_url.is_none();
    ReconciledView {
        display_title,
        display_owner: non_empty(item.owner.as_deref()).map(str::to_string),
        display_due_date: non_empty(item.due_date.as_deref())
            .map(|raw| normalize_due_date(Some(raw), today)),
        resolved_issue_url,
        has_calendar_event: non_empty(matched.and_then(|a| a.ics_path.as_deref())).is_some(),
        can_create,
    }
}

/// Coerces a date string into canonical `yyyy-mm-dd` form.
///
/// Absent or empty input falls back to `today` (callers pass the UTC date).
/// An already-canonical string is returned unchanged. A `dd-mm-yyyy` string
/// is rearranged by pure string surgery, with no calendar validation:
/// `99-99-9999` becomes `9999-99-99`. Anything else silently falls back to
/// `today`; unparseable dates are never surfaced as errors.
pub fn normalize_due_date(input: Option<&str>, today: NaiveDate) -> String {
    match input {
        Some(s) if has_dash_shape(s, 4, 7) => s.to_string(),
        Some(s) if has_dash_shape(s, 2, 5) => {
            format!("{}-{}-{}", &s[6..10], &s[3..5], &s[0..2])
        }
        _ => today.format("%Y-%m-%d").to_string(),
    }
}

/// Ordered, deduplicated, non-empty owner names. A non-empty TaskOwner
/// collection is authoritative even when every entry is blank; only an absent
/// collection falls back to owner-bearing external action records. An empty
/// result is a normal state, never an error.
pub fn resolve_owners(task_owners: &[TaskOwner], actions: &[ExternalAction]) -> Vec<String> {
    if !task_owners.is_empty() {
        return dedup_owners(task_owners.iter().map(|o| o.owner.as_deref()));
    }
    dedup_owners(actions.iter().map(|a| a.owner.as_deref()))
}

/// Builds the prefilled, editable form draft for one item.
pub fn prefill_form(
    item: &ActionItem,
    owners: &[String],
    default_priority: &str,
    today: NaiveDate,
) -> FormDraft {
    FormDraft {
        title: non_empty(item.title.as_deref()).unwrap_or_default().to_string(),
        due_date: normalize_due_date(item.due_date.as_deref(), today),
        priority: non_empty(item.priority.as_deref())
            .unwrap_or(default_priority)
            .to_string(),
        owner: non_empty(item.owner.as_deref())
            .or_else(|| owners.first().map(String::as_str))
            .unwrap_or_default()
            .to_string(),
        details: non_empty(item.details.as_deref()).unwrap_or_default().to_string(),
        task_id: non_empty(item.task_id.as_deref()).map(str::to_string),
    }
}

/// Builds the wire request for one submission attempt. A stable `task_id`
/// becomes the idempotency key; otherwise `fresh_token` is used as-is. The
/// token is generated once per attempt by the caller, so a later attempt for
/// the same item without a `task_id` gets a new key.
pub fn build_submission(draft: &FormDraft, fresh_token: String) -> SubmissionRequest {
    let idempotency_key = match non_empty(draft.task_id.as_deref()) {
        Some(task_id) => task_id.to_string(),
        None => fresh_token,
    };
    SubmissionRequest {
        title: draft.title.clone(),
        due: draft.due_date.clone(),
        owner: draft.owner.clone(),
        priority: draft.priority.clone(),
        details: draft.details.clone(),
        idempotency_key,
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

// Ten bytes, dashes at the two given positions, digits everywhere else.
fn has_dash_shape(s: &str, first_dash: usize, second_dash: usize) -> bool {
    let bytes = s.as_bytes();
    bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| {
            if i == first_dash || i == second_dash {
                *b == b'-'
            } else {
                b.is_ascii_digit()
            }
        })
}

fn dedup_owners<'a>(values: impl Iterator<Item = Option<&'a str>>) -> Vec<String> {
    let mut owners: Vec<String> = Vec::new();
    for value in values.flatten() {
        if !value.is_empty() && !owners.iter().any(|seen| seen == value) {
            owners.push(value.to_string());
        }
    }
    owners
}
