use crate::render::{render_chart_svg, render_page, PageView, NO_DATA_WARNING};
use crate::AppState;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use cancel_risk_core::{codec::LookupError, schema::InvalidRange, schema::RiskOutcome};
use serde::Deserialize;
use serde_json::json;

/// 表单提交的空输入框会带 `min=`，所以先按字符串收
#[derive(Debug, Default, Deserialize)]
pub struct RiskQuery {
    pub hotel: Option<String>,
    pub min: Option<String>,
    pub max: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        // 用户可修正的输入错误 -> 400，其余 -> 500
        if let Some(l) = e.downcast_ref::<LookupError>() {
            return ApiError::BadRequest(l.to_string());
        }
        if let Some(r) = e.downcast_ref::<InvalidRange>() {
            return ApiError::BadRequest(r.to_string());
        }
        ApiError::Internal(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(e) => {
                tracing::error!("request failed: {e:#}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (
            status,
            Json(json!({"error": self.to_string(), "success": false})),
        )
            .into_response()
    }
}

fn parse_day(name: &str, v: Option<&str>) -> Result<Option<i64>, ApiError> {
    match v.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s
            .parse::<i64>()
            .map(Some)
            .map_err(|_| ApiError::BadRequest(format!("`{name}` must be an integer, got {s:?}"))),
    }
}

/// 没选酒店时默认第一个；未注册的 label 直接 400
fn hotel_of(st: &AppState, q: &RiskQuery) -> Result<String, ApiError> {
    let hotel = match q.hotel.as_deref().map(str::trim) {
        Some(h) if !h.is_empty() => h.to_string(),
        _ => st
            .core
            .hotel_labels()
            .first()
            .cloned()
            .ok_or_else(|| ApiError::BadRequest("no hotels available".into()))?,
    };
    st.core
        .encode_hotel(&hotel)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    Ok(hotel)
}

fn view(st: &AppState, hotel: &str, q: &RiskQuery) -> Result<RiskOutcome, ApiError> {
    let min = parse_day("min", q.min.as_deref())?;
    let max = parse_day("max", q.max.as_deref())?;
    Ok(st.core.risk_view(hotel, min, max)?)
}

fn resolve(st: &AppState, q: &RiskQuery) -> Result<(String, RiskOutcome), ApiError> {
    let hotel = hotel_of(st, q)?;
    let outcome = view(st, &hotel, q)?;
    Ok((hotel, outcome))
}

/// 页面上范围填错不返回 JSON 400：照常画整条序列，错误内联提示
pub async fn index(
    State(st): State<AppState>,
    Query(q): Query<RiskQuery>,
) -> Result<Html<String>, ApiError> {
    let hotel = hotel_of(&st, &q)?;
    let (outcome, error) = match view(&st, &hotel, &q) {
        Ok(outcome) => (outcome, None),
        Err(ApiError::BadRequest(msg)) => (st.core.risk_view(&hotel, None, None)?, Some(msg)),
        Err(e) => return Err(e),
    };
    Ok(Html(render_page(&PageView {
        hotels: st.core.hotel_labels(),
        selected: &hotel,
        outcome: &outcome,
        error: error.as_deref(),
    })))
}

pub async fn hotels(State(st): State<AppState>) -> Json<Vec<String>> {
    Json(st.core.hotel_labels().to_vec())
}

pub async fn risk(
    State(st): State<AppState>,
    Query(q): Query<RiskQuery>,
) -> Result<Json<RiskOutcome>, ApiError> {
    let (_, outcome) = resolve(&st, &q)?;
    Ok(Json(outcome))
}

pub async fn chart(
    State(st): State<AppState>,
    Query(q): Query<RiskQuery>,
) -> Result<Response, ApiError> {
    let (_, outcome) = resolve(&st, &q)?;
    match outcome {
        RiskOutcome::Series(r) => Ok((
            [(header::CONTENT_TYPE, "image/svg+xml")],
            render_chart_svg(&r.series),
        )
            .into_response()),
        RiskOutcome::NoData { .. } => Ok((
            StatusCode::NOT_FOUND,
            Json(json!({"warning": NO_DATA_WARNING, "success": false})),
        )
            .into_response()),
    }
}

pub async fn metrics(State(st): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, st.prom.render())
}
