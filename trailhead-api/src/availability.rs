use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use trailhead_catalog::Availability;

use crate::error::{ok, ApiResponse, AppResult};
use crate::params;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct DayQuery {
    date: Option<String>,
    timeslot: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RangeQuery {
    from: Option<String>,
    to: Option<String>,
    timeslot: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/availability/{poi_id}", get(check_day))
        .route("/availability/{poi_id}/range", get(check_range))
}

/// GET /availability/{poi_id}?date=&timeslot=
async fn check_day(
    State(state): State<AppState>,
    Path(poi_id): Path<String>,
    Query(query): Query<DayQuery>,
) -> AppResult<Json<ApiResponse<Availability>>> {
    let poi_id = params::uuid(&poi_id, "poiId")?;
    let date = params::required_date(query.date.as_deref(), "date")?;

    let availability = state
        .availability
        .check(poi_id, date, params::optional_text(query.timeslot.as_deref()))
        .await?;
    Ok(ok(availability))
}

/// GET /availability/{poi_id}/range?from=&to=&timeslot=
async fn check_range(
    State(state): State<AppState>,
    Path(poi_id): Path<String>,
    Query(query): Query<RangeQuery>,
) -> AppResult<Json<ApiResponse<Vec<Availability>>>> {
    let poi_id = params::uuid(&poi_id, "poiId")?;
    let from = params::required_date(query.from.as_deref(), "from")?;
    let to = params::required_date(query.to.as_deref(), "to")?;

    let days = state
        .availability
        .check_range(poi_id, from, to, params::optional_text(query.timeslot.as_deref()))
        .await?;
    Ok(ok(days))
}
