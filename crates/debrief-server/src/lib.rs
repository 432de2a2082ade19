use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use debrief_config::Config;
use debrief_contracts::{
    AnalysisPayload, EndpointError, FormDraft, MeetingRecord, MeetingView, SubmissionRequest,
    TaskCreated,
};
use debrief_kernel::{build_submission, canonicalize, match_external, prefill_form, reconcile,
    resolve_owners};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{info, warn};
use uuid::Uuid;

const GENERIC_FAILURE: &str = "failed to create action";

pub async fn serve(cfg: Config) -> Result<(), String> {
    let addr: SocketAddr = cfg
        .server
        .listen_addr
        .parse()
        .map_err(|e| format!("invalid listen_addr: {e}"))?;

    let app = build_app(cfg).await?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("bind failed: {e}"))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| format!("serve failed: {e}"))
}

pub async fn build_app(cfg: Config) -> Result<Router, String> {
    let state = AppState::new(cfg)?;
    Ok(Router::new()
        .route("/v1/healthz", get(healthz))
        .route("/v1/meetings", post(ingest_meeting))
        .route("/v1/meetings/{meeting_id}", get(get_meeting))
        .route("/v1/meetings/{meeting_id}/forms", post(open_form))
        .route("/v1/forms/{form_id}", get(get_form).delete(close_form))
        .route("/v1/forms/{form_id}/submit", post(submit_form))
        .with_state(state))
}

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, code: &str, message: &str) -> ApiError {
    (
        status,
        Json(json!({"error": {"code": code, "message": message}})),
    )
}

#[derive(Clone)]
struct AppState {
    cfg: Config,
    store: Arc<Mutex<MemoryStore>>,
    client: Client,
}

/// Session-scoped state: ingested meetings and open forms, nothing else.
/// Nothing here survives a restart.
#[derive(Default)]
struct MemoryStore {
    meetings: HashMap<String, MeetingRecord>,
    forms: HashMap<String, FormInstance>,
}

/// One open submission form. Closing the form removes the instance; a late
/// result for a removed instance is discarded.
struct FormInstance {
    meeting_id: String,
    draft: FormDraft,
    owners: Vec<String>,
    state: FormState,
}

/// Submission lifecycle per attempt. `Succeeded` is terminal for the form;
/// `Failed` keeps the entered values and accepts another attempt.
enum FormState {
    Idle,
    Submitting,
    Succeeded { issue_url: Option<String> },
    Failed { message: String },
}

#[derive(Serialize)]
struct SubmitOutcome {
    state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    issue_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    closes_in_ms: Option<u64>,
}

impl AppState {
    fn new(cfg: Config) -> Result<Self, String> {
        // Bounded outbound call: a hung task endpoint must not pin a form in
        // Submitting forever.
        let client = Client::builder()
            .timeout(Duration::from_millis(cfg.tasks.timeout_ms))
            .build()
            .map_err(|e| e.to_string())?;
        Ok(Self {
            cfg,
            store: Arc::new(Mutex::new(MemoryStore::default())),
            client,
        })
    }

    /// Runs one submission attempt to completion.
    ///
    /// The store lock is held while the form transitions into `Submitting`
    /// and again while the result is applied; the outbound call itself runs
    /// unlocked, so the service stays responsive and the form can be closed
    /// mid-flight. Applying success mutates the meeting's items under the
    /// same lock readers take, so reconciliation never sees a torn update.
    async fn process_submit(
        &self,
        form_id: &str,
        mut edits: FormDraft,
    ) -> Result<SubmitOutcome, ApiError> {
        let request = {
            let mut store = self.store.lock().await;
            let form = store.forms.get_mut(form_id).ok_or_else(|| {
                api_error(StatusCode::NOT_FOUND, "form_not_found", "unknown form_id")
            })?;
            match form.state {
                FormState::Submitting => {
                    return Err(api_error(
                        StatusCode::CONFLICT,
                        "submission_in_flight",
                        "a submission is already in flight for this form",
                    ))
                }
                FormState::Succeeded { .. } => {
                    return Err(api_error(
                        StatusCode::CONFLICT,
                        "already_created",
                        "this form already produced an external record",
                    ))
                }
                FormState::Idle | FormState::Failed { .. } => {}
            }
            // The caller's edits win over the prefilled defaults; the
            // originating item's task_id is carried, never edited.
            edits.task_id = form.draft.task_id.clone();
            form.draft = edits;
            form.state = FormState::Submitting;
            build_submission(&form.draft, fresh_idempotency_token())
        };

        let outcome = self.create_task(&request).await;

        let mut guard = self.store.lock().await;
        let store = &mut *guard;
        let Some(form) = store.forms.get_mut(form_id) else {
            // Form was closed while the request was in flight; the result is
            // safely ignorable.
            warn!(%form_id, "discarding submission result for a closed form");
            return Ok(SubmitOutcome {
                state: "closed",
                error: None,
                issue_url: None,
                closes_in_ms: None,
            });
        };

        match outcome {
            Ok(issue_url) => {
                form.state = FormState::Succeeded {
                    issue_url: issue_url.clone(),
                };
                if let (Some(task_id), Some(url)) = (form.draft.task_id.clone(), issue_url.clone())
                {
                    if let Some(meeting) = store.meetings.get_mut(&form.meeting_id) {
                        for item in &mut meeting.action_items {
                            if item.task_id.as_deref() == Some(task_id.as_str()) {
                                item.issue_url = Some(url.clone());
                            }
                        }
                    }
                }
                info!(%form_id, key = %request.idempotency_key, "action created");

                let close_delay = self.cfg.form.close_delay_ms;
                let store_handle = Arc::clone(&self.store);
                let closing_form = form_id.to_string();
                tokio::spawn(async move {
                    sleep(Duration::from_millis(close_delay)).await;
                    store_handle.lock().await.forms.remove(&closing_form);
                });
                Ok(SubmitOutcome {
                    state: "succeeded",
                    error: None,
                    issue_url,
                    closes_in_ms: Some(close_delay),
                })
            }
            Err(message) => {
                warn!(%form_id, %message, "submission failed");
                form.state = FormState::Failed {
                    message: message.clone(),
                };
                Ok(SubmitOutcome {
                    state: "failed",
                    error: Some(message),
                    issue_url: None,
                    closes_in_ms: None,
                })
            }
        }
    }

    /// Single POST to the task-creation endpoint. Failure text preference:
    /// the endpoint's own `error` string, else the generic message, else the
    /// transport error's message.
    async fn create_task(&self, request: &SubmissionRequest) -> Result<Option<String>, String> {
        let response = match self
            .client
            .post(&self.cfg.tasks.create_url)
            .json(request)
            .send()
            .await
        {
            Ok(v) => v,
            Err(e) => return Err(e.to_string()),
        };
        if !response.status().is_success() {
            let body = response.json::<EndpointError>().await.unwrap_or_default();
            return Err(body
                .error
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| GENERIC_FAILURE.to_string()));
        }
        match response.json::<TaskCreated>().await {
            Ok(created) => Ok(created.raw.issue_url.filter(|u| !u.is_empty())),
            Err(_) => Err(GENERIC_FAILURE.to_string()),
        }
    }
}

fn fresh_idempotency_token() -> String {
    format!(
        "task-{}-{}",
        Utc::now().timestamp_millis(),
        Uuid::new_v4().as_simple()
    )
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn meeting_view(meeting_id: &str, record: &MeetingRecord) -> MeetingView {
    let today = today();
    MeetingView {
        meeting_id: meeting_id.to_string(),
        summary: record.summary.clone(),
        decisions: record.decisions.clone(),
        action_items: record
            .action_items
            .iter()
            .map(|item| reconcile(item, match_external(item, &record.actions), today))
            .collect(),
    }
}

fn form_status(form_id: &str, form: &FormInstance) -> Value {
    let (state, error, issue_url) = match &form.state {
        FormState::Idle => ("idle", None, None),
        FormState::Submitting => ("submitting", None, None),
        FormState::Succeeded { issue_url } => ("succeeded", None, issue_url.clone()),
        FormState::Failed { message } => ("failed", Some(message.clone()), None),
    };
    json!({
        "form_id": form_id,
        "state": state,
        "error": error,
        "issue_url": issue_url,
        "draft": form.draft,
        "owners": form.owners,
    })
}

async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

async fn ingest_meeting(
    State(state): State<AppState>,
    Json(payload): Json<AnalysisPayload>,
) -> (StatusCode, Json<Value>) {
    let record = canonicalize(payload);
    let meeting_id = format!("mtg_{}", Uuid::new_v4().as_simple());
    info!(
        %meeting_id,
        items = record.action_items.len(),
        actions = record.actions.len(),
        "meeting ingested"
    );
    state
        .store
        .lock()
        .await
        .meetings
        .insert(meeting_id.clone(), record);
    (StatusCode::CREATED, Json(json!({"meeting_id": meeting_id})))
}

async fn get_meeting(
    State(state): State<AppState>,
    Path(meeting_id): Path<String>,
) -> Result<Json<MeetingView>, ApiError> {
    let store = state.store.lock().await;
    let meeting = store.meetings.get(&meeting_id).ok_or_else(|| {
        api_error(
            StatusCode::NOT_FOUND,
            "meeting_not_found",
            "unknown meeting_id",
        )
    })?;
    Ok(Json(meeting_view(&meeting_id, meeting)))
}

#[derive(Debug, Deserialize)]
struct OpenFormInput {
    item_index: usize,
}

async fn open_form(
    State(state): State<AppState>,
    Path(meeting_id): Path<String>,
    Json(input): Json<OpenFormInput>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let mut store = state.store.lock().await;
    let meeting = store.meetings.get(&meeting_id).ok_or_else(|| {
        api_error(
            StatusCode::NOT_FOUND,
            "meeting_not_found",
            "unknown meeting_id",
        )
    })?;
    let item = meeting.action_items.get(input.item_index).ok_or_else(|| {
        api_error(
            StatusCode::BAD_REQUEST,
            "invalid_item_index",
            "item_index is out of range for this meeting",
        )
    })?;
    // Creation is only offered for items with no resolved external link.
    let view = reconcile(item, match_external(item, &meeting.actions), today());
    if !view.can_create {
        return Err(api_error(
            StatusCode::CONFLICT,
            "already_created",
            "this item already resolves to an external record",
        ));
    }

    let owners = resolve_owners(&meeting.task_owners, &meeting.actions);
    let draft = prefill_form(item, &owners, &state.cfg.form.default_priority, today());
    let form_id = format!("form_{}", Uuid::new_v4().as_simple());
    store.forms.insert(
        form_id.clone(),
        FormInstance {
            meeting_id: meeting_id.clone(),
            draft: draft.clone(),
            owners: owners.clone(),
            state: FormState::Idle,
        },
    );
    Ok((
        StatusCode::CREATED,
        Json(json!({"form_id": form_id, "draft": draft, "owners": owners})),
    ))
}

async fn get_form(
    State(state): State<AppState>,
    Path(form_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let store = state.store.lock().await;
    let form = store
        .forms
        .get(&form_id)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "form_not_found", "unknown form_id"))?;
    Ok(Json(form_status(&form_id, form)))
}

async fn close_form(State(state): State<AppState>, Path(form_id): Path<String>) -> StatusCode {
    let mut store = state.store.lock().await;
    if let Some(form) = store.forms.remove(&form_id) {
        if matches!(form.state, FormState::Submitting) {
            warn!(%form_id, "form closed while a submission is in flight");
        }
    }
    StatusCode::NO_CONTENT
}

async fn submit_form(
    State(state): State<AppState>,
    Path(form_id): Path<String>,
    Json(edits): Json<FormDraft>,
) -> Result<Json<SubmitOutcome>, ApiError> {
    state.process_submit(&form_id, edits).await.map(Json)
}
