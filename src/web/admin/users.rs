use axum::{
    Json,
    extract::{Path, Query, State},
    http::HeaderMap,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    domain::model::{AccountView, ApplicationView, ApprovalStatus, ReviewDecision},
    web::{
        AppState,
        auth::current_actor,
        responses::{ApiResult, core_error},
    },
};

#[derive(Deserialize)]
pub struct AccountListQuery {
    #[serde(default)]
    pub status: Option<ApprovalStatus>,
}

/// Optional body for approve/reject and moderation actions.
#[derive(Deserialize, Default)]
pub struct ReviewBody {
    #[serde(default)]
    pub comment: Option<String>,
}

pub async fn list_users(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Query(query): Query<AccountListQuery>,
) -> ApiResult<Vec<AccountView>> {
    let actor = current_actor(&state, &headers, &jar).await?;
    state
        .engine()
        .list_accounts(&actor, query.status)
        .await
        .map(Json)
        .map_err(core_error)
}

pub async fn list_applications(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> ApiResult<Vec<ApplicationView>> {
    let actor = current_actor(&state, &headers, &jar).await?;
    state
        .engine()
        .list_applications(&actor)
        .await
        .map(Json)
        .map_err(core_error)
}

async fn review(
    state: AppState,
    headers: HeaderMap,
    jar: CookieJar,
    account_id: Uuid,
    decision: ReviewDecision,
    body: Option<Json<ReviewBody>>,
) -> ApiResult<AccountView> {
    let actor = current_actor(&state, &headers, &jar).await?;
    let comment = body.and_then(|Json(body)| body.comment);
    state
        .engine()
        .review_account(&actor, account_id, decision, comment)
        .await
        .map(Json)
        .map_err(core_error)
}

pub async fn approve_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Path(account_id): Path<Uuid>,
    body: Option<Json<ReviewBody>>,
) -> ApiResult<AccountView> {
    review(state, headers, jar, account_id, ReviewDecision::Approve, body).await
}

pub async fn reject_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Path(account_id): Path<Uuid>,
    body: Option<Json<ReviewBody>>,
) -> ApiResult<AccountView> {
    review(state, headers, jar, account_id, ReviewDecision::Reject, body).await
}
