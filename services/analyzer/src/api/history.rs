//! Persisted-history queries.

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

use super::AppState;
use super::response::{bad_request, internal_error};
use crate::db::HistoryQuery;

#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub session_id: Option<String>,
    pub cem_id: Option<String>,
    pub rm_id: Option<String>,
    pub origin: Option<String>,
    pub s2_msg_type: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.is_empty())
}

fn parse_date(raw: &str, end_of_day: bool) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    // A bare date is accepted and pinned to the start or end of that day.
    if let Ok(date) = raw.parse::<NaiveDate>() {
        let time = if end_of_day {
            date.and_hms_opt(23, 59, 59)
        } else {
            date.and_hms_opt(0, 0, 0)
        };
        if let Some(naive) = time {
            return Ok(DateTime::from_naive_utc_and_offset(naive, Utc));
        }
    }
    Err(format!("unparseable timestamp: {raw}"))
}

impl HistoryParams {
    fn into_query(self) -> Result<HistoryQuery, String> {
        let session_id = match non_empty(self.session_id) {
            None => None,
            Some(raw) => Some(
                raw.parse::<Uuid>()
                    .map_err(|e| format!("invalid session_id: {e}"))?,
            ),
        };
        let start_date = match non_empty(self.start_date) {
            None => None,
            Some(raw) => Some(parse_date(&raw, false)?),
        };
        let end_date = match non_empty(self.end_date) {
            None => None,
            Some(raw) => Some(parse_date(&raw, true)?),
        };
        Ok(HistoryQuery {
            session_id,
            cem_id: non_empty(self.cem_id),
            rm_id: non_empty(self.rm_id),
            origin: non_empty(self.origin),
            s2_msg_type: non_empty(self.s2_msg_type),
            start_date,
            end_date,
        })
    }
}

/// `GET /backend/history-filter/`
pub async fn get_filtered_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Response {
    let query = match params.into_query() {
        Ok(query) => query,
        Err(e) => return bad_request(e),
    };

    let store = state.store.clone();
    let records = tokio::task::spawn_blocking(move || store.filtered(&query)).await;
    match records {
        Ok(Ok(records)) => Json(records).into_response(),
        Ok(Err(e)) => internal_error(e),
        Err(e) => internal_error(e),
    }
}

/// `GET /backend/connections/` — unique persisted sessions.
pub async fn list_sessions(State(state): State<AppState>) -> Response {
    let store = state.store.clone();
    let sessions = tokio::task::spawn_blocking(move || store.unique_sessions()).await;
    match sessions {
        Ok(Ok(sessions)) => Json(sessions).into_response(),
        Ok(Err(e)) => internal_error(e),
        Err(e) => internal_error(e),
    }
}
