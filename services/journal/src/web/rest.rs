//! services/journal/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use for_me_core::{
    calendar::{has_marker, CalendarMonth},
    AdReadiness, DailyRecord, DateKey, DayEditor, EditorError, PortError, UserId,
};
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::{OpenApi, ToSchema};

use crate::web::state::AppState;

type ApiResult<T> = Result<T, (StatusCode, String)>;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        get_identity_handler,
        reset_identity_handler,
        list_records_handler,
        get_record_handler,
        save_record_handler,
        delete_record_handler,
        get_summary_handler,
        calendar_handler,
        ads_handler,
    ),
    components(
        schemas(
            IdentityResponse,
            RecordResponse,
            SaveRecordRequest,
            SummaryResponse,
            CalendarResponse,
            CalendarCell,
            MonthRef,
            AdsResponse,
        )
    ),
    tags(
        (name = "For Me API", description = "Daily records, summaries and ad readiness for the journal client.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, Deserialize, ToSchema)]
pub struct IdentityResponse {
    pub user_id: String,
}

/// A stored day as returned to the client.
#[derive(Serialize, Deserialize, ToSchema)]
pub struct RecordResponse {
    /// `YYYY-MM-DD`
    pub date: String,
    /// 0 (unset) to 5.
    pub score: u8,
    pub tasks: Vec<String>,
    pub summary: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<DailyRecord> for RecordResponse {
    fn from(record: DailyRecord) -> Self {
        Self {
            date: record.date.to_string(),
            score: record.score.value(),
            tasks: record.tasks,
            summary: record.summary,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// The payload for saving a day. Omitting `summary` keeps the stored one.
#[derive(Serialize, Deserialize, ToSchema)]
pub struct SaveRecordRequest {
    pub score: u8,
    #[serde(default)]
    pub tasks: Vec<String>,
    pub summary: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct SummaryResponse {
    pub date: String,
    pub summary: String,
}

#[derive(Serialize, Deserialize, ToSchema, PartialEq, Eq, Debug)]
pub struct MonthRef {
    pub year: i32,
    pub month: u32,
}

impl From<CalendarMonth> for MonthRef {
    fn from(month: CalendarMonth) -> Self {
        Self { year: month.year(), month: month.month() }
    }
}

/// One grid slot. Blank slots have no date.
#[derive(Serialize, Deserialize, ToSchema)]
pub struct CalendarCell {
    pub date: Option<String>,
    pub marker: bool,
    pub is_today: bool,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct CalendarResponse {
    pub year: i32,
    pub month: u32,
    pub previous: MonthRef,
    pub next: MonthRef,
    /// Sunday-first, a multiple of 7 long.
    pub cells: Vec<CalendarCell>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct AdsResponse {
    pub banner: bool,
    pub interstitial: bool,
    pub rewarded: bool,
}

impl From<AdReadiness> for AdsResponse {
    fn from(readiness: AdReadiness) -> Self {
        Self {
            banner: readiness.banner,
            interstitial: readiness.interstitial,
            rewarded: readiness.rewarded,
        }
    }
}

//=========================================================================================
// Error mapping
//=========================================================================================

fn port_error(context: &str, e: PortError) -> (StatusCode, String) {
    error!("{}: {:?}", context, e);
    let status = match &e {
        PortError::NotFound(_) => StatusCode::NOT_FOUND,
        PortError::Invalid(_) => StatusCode::BAD_REQUEST,
        PortError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        PortError::Rejected(_) => StatusCode::BAD_GATEWAY,
        PortError::Storage(_) | PortError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, format!("{}: {}", context, e))
}

fn editor_error(e: EditorError) -> (StatusCode, String) {
    match e {
        EditorError::Port(e) => port_error("Failed to save the day", e),
        read_only @ EditorError::ReadOnlyDay(_) => (StatusCode::CONFLICT, read_only.to_string()),
        other => (StatusCode::BAD_REQUEST, other.to_string()),
    }
}

fn parse_date(raw: &str) -> ApiResult<DateKey> {
    raw.parse().map_err(|e: for_me_core::domain::DateKeyError| (StatusCode::BAD_REQUEST, e.to_string()))
}

fn current_user(app_state: &AppState) -> ApiResult<UserId> {
    app_state
        .identity
        .get_user_id()
        .map_err(|e| port_error("Failed to load the user id", e))
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Returns this installation's user id, creating it on first use.
#[utoipa::path(
    get,
    path = "/identity",
    responses(
        (status = 200, description = "The current user id", body = IdentityResponse),
        (status = 500, description = "Local settings could not be written")
    )
)]
pub async fn get_identity_handler(State(app_state): State<Arc<AppState>>) -> ApiResult<Json<IdentityResponse>> {
    let user_id = current_user(&app_state)?;
    Ok(Json(IdentityResponse { user_id: user_id.to_string() }))
}

/// Replaces the user id. Records stored under the old id are no longer reachable.
#[utoipa::path(
    post,
    path = "/identity/reset",
    responses(
        (status = 200, description = "The new user id", body = IdentityResponse),
        (status = 500, description = "Local settings could not be written")
    )
)]
pub async fn reset_identity_handler(State(app_state): State<Arc<AppState>>) -> ApiResult<Json<IdentityResponse>> {
    let user_id = app_state
        .identity
        .reset_user_id()
        .map_err(|e| port_error("Failed to reset the user id", e))?;
    Ok(Json(IdentityResponse { user_id: user_id.to_string() }))
}

/// Lists every stored day, keyed by date.
#[utoipa::path(
    get,
    path = "/records",
    responses(
        (status = 200, description = "All records of the user", body = BTreeMap<String, RecordResponse>),
        (status = 503, description = "The record store is unreachable")
    )
)]
pub async fn list_records_handler(
    State(app_state): State<Arc<AppState>>,
) -> ApiResult<Json<BTreeMap<String, RecordResponse>>> {
    let user_id = current_user(&app_state)?;
    let records = app_state
        .records
        .fetch_all_records(&user_id)
        .await
        .map_err(|e| port_error("Failed to list records", e))?;
    Ok(Json(
        records
            .into_iter()
            .map(|(date, record)| (date.to_string(), record.into()))
            .collect(),
    ))
}

#[utoipa::path(
    get,
    path = "/records/{date}",
    params(("date" = String, Path, description = "The day, as YYYY-MM-DD")),
    responses(
        (status = 200, description = "The stored day", body = RecordResponse),
        (status = 400, description = "Malformed date"),
        (status = 404, description = "Nothing stored for that day")
    )
)]
pub async fn get_record_handler(
    State(app_state): State<Arc<AppState>>,
    Path(date): Path<String>,
) -> ApiResult<Json<RecordResponse>> {
    let date = parse_date(&date)?;
    let user_id = current_user(&app_state)?;
    match app_state.records.fetch_record(&user_id, date).await {
        Ok(Some(record)) => Ok(Json(record.into())),
        Ok(None) => Err((StatusCode::NOT_FOUND, format!("No record for {}", date))),
        Err(e) => Err(port_error("Failed to fetch the record", e)),
    }
}

/// Saves a day through the day editor: tasks must be unique and non-empty,
/// and only today's score can change.
#[utoipa::path(
    put,
    path = "/records/{date}",
    params(("date" = String, Path, description = "The day, as YYYY-MM-DD")),
    request_body = SaveRecordRequest,
    responses(
        (status = 200, description = "The day as stored", body = RecordResponse),
        (status = 400, description = "Malformed date, score or task list"),
        (status = 409, description = "The score of a day other than today was changed"),
        (status = 503, description = "The record store is unreachable")
    )
)]
pub async fn save_record_handler(
    State(app_state): State<Arc<AppState>>,
    Path(date): Path<String>,
    Json(payload): Json<SaveRecordRequest>,
) -> ApiResult<Json<RecordResponse>> {
    let date = parse_date(&date)?;
    let user_id = current_user(&app_state)?;

    let mut editor = DayEditor::open(
        app_state.records.clone(),
        app_state.summaries.clone(),
        user_id.clone(),
        date,
        app_state.today(),
    )
    .await
    .map_err(editor_error)?;

    if payload.score != editor.score().value() {
        editor.set_score(payload.score).map_err(editor_error)?;
    }
    for task in editor.tasks().to_vec() {
        editor.remove_task(&task).map_err(editor_error)?;
    }
    for task in &payload.tasks {
        editor.add_task(task).map_err(editor_error)?;
    }
    // Cached only once the edits are accepted; `save` writes it through.
    if let Some(summary) = payload.summary.as_deref() {
        app_state
            .summaries
            .save_summary(summary, date)
            .map_err(|e| port_error("Failed to cache the summary", e))?;
    }
    editor.save().await.map_err(editor_error)?;

    match app_state.records.fetch_record(&user_id, date).await {
        Ok(Some(record)) => Ok(Json(record.into())),
        Ok(None) => Err((StatusCode::INTERNAL_SERVER_ERROR, format!("{} vanished after saving", date))),
        Err(e) => Err(port_error("Failed to read back the record", e)),
    }
}

#[utoipa::path(
    delete,
    path = "/records/{date}",
    params(("date" = String, Path, description = "The day, as YYYY-MM-DD")),
    responses(
        (status = 204, description = "The day was deleted"),
        (status = 400, description = "Malformed date"),
        (status = 503, description = "The record store is unreachable")
    )
)]
pub async fn delete_record_handler(
    State(app_state): State<Arc<AppState>>,
    Path(date): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let date = parse_date(&date)?;
    let user_id = current_user(&app_state)?;
    app_state
        .records
        .delete_record(&user_id, date)
        .await
        .map_err(|e| port_error("Failed to delete the record", e))?;
    Ok(StatusCode::NO_CONTENT)
}

/// Returns the locally cached conversation summary for a day.
#[utoipa::path(
    get,
    path = "/summaries/{date}",
    params(("date" = String, Path, description = "The day, as YYYY-MM-DD")),
    responses(
        (status = 200, description = "The cached summary", body = SummaryResponse),
        (status = 404, description = "No conversation was summarized that day")
    )
)]
pub async fn get_summary_handler(
    State(app_state): State<Arc<AppState>>,
    Path(date): Path<String>,
) -> ApiResult<Json<SummaryResponse>> {
    let date = parse_date(&date)?;
    app_state
        .summaries
        .get_summary(date)
        .map(|summary| Json(SummaryResponse { date: date.to_string(), summary }))
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("No summary for {}", date)))
}

/// Builds the month grid, marking days that have a score or tasks.
#[utoipa::path(
    get,
    path = "/calendar/{year}/{month}",
    params(
        ("year" = i32, Path, description = "Four-digit year"),
        ("month" = u32, Path, description = "Month, 1 to 12")
    ),
    responses(
        (status = 200, description = "The month grid", body = CalendarResponse),
        (status = 400, description = "No such month")
    )
)]
pub async fn calendar_handler(
    State(app_state): State<Arc<AppState>>,
    Path((year, month)): Path<(i32, u32)>,
) -> ApiResult<Json<CalendarResponse>> {
    let calendar = CalendarMonth::new(year, month)
        .ok_or_else(|| (StatusCode::BAD_REQUEST, format!("{}-{} is not a month", year, month)))?;
    let user_id = current_user(&app_state)?;
    let records = app_state
        .records
        .fetch_all_records(&user_id)
        .await
        .map_err(|e| port_error("Failed to list records", e))?;
    let today = app_state.today();

    let cells = calendar
        .grid()
        .into_iter()
        .map(|slot| match slot {
            Some(day) => {
                let key = DateKey::new(day);
                CalendarCell {
                    date: Some(key.to_string()),
                    marker: has_marker(records.get(&key)),
                    is_today: key == today,
                }
            }
            None => CalendarCell { date: None, marker: false, is_today: false },
        })
        .collect();

    Ok(Json(CalendarResponse {
        year,
        month,
        previous: calendar.previous().into(),
        next: calendar.next().into(),
        cells,
    }))
}

/// Reports which ad surfaces have a loaded ad.
#[utoipa::path(
    get,
    path = "/ads",
    responses((status = 200, description = "Readiness per surface", body = AdsResponse))
)]
pub async fn ads_handler(State(app_state): State<Arc<AppState>>) -> Json<AdsResponse> {
    Json(app_state.ads.readiness().await.into())
}
