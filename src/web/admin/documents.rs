use axum::{
    Json,
    extract::{Path, Query, State},
    http::HeaderMap,
};
use axum_extra::extract::cookie::CookieJar;
use uuid::Uuid;

use crate::{
    domain::{
        documents::Audience,
        model::{DocumentFilter, DocumentView, ModerationStatus},
    },
    web::{
        AppState,
        auth::current_actor,
        responses::{ApiResult, core_error},
    },
};

use super::users::ReviewBody;

pub async fn list_documents(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Query(filter): Query<DocumentFilter>,
) -> ApiResult<Vec<DocumentView>> {
    let actor = current_actor(&state, &headers, &jar).await?;
    state
        .engine()
        .list_documents(&actor, Audience::All, &filter)
        .await
        .map(Json)
        .map_err(core_error)
}

async fn moderate(
    state: AppState,
    headers: HeaderMap,
    jar: CookieJar,
    document_id: Uuid,
    target: ModerationStatus,
    body: Option<Json<ReviewBody>>,
) -> ApiResult<DocumentView> {
    let actor = current_actor(&state, &headers, &jar).await?;
    let comment = body.and_then(|Json(body)| body.comment);
    state
        .engine()
        .set_document_status(&actor, document_id, target, comment)
        .await
        .map(Json)
        .map_err(core_error)
}

pub async fn approve_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Path(document_id): Path<Uuid>,
    body: Option<Json<ReviewBody>>,
) -> ApiResult<DocumentView> {
    moderate(state, headers, jar, document_id, ModerationStatus::Approved, body).await
}

pub async fn reject_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Path(document_id): Path<Uuid>,
    body: Option<Json<ReviewBody>>,
) -> ApiResult<DocumentView> {
    moderate(state, headers, jar, document_id, ModerationStatus::Rejected, body).await
}

pub async fn feature_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Path(document_id): Path<Uuid>,
    body: Option<Json<ReviewBody>>,
) -> ApiResult<DocumentView> {
    moderate(state, headers, jar, document_id, ModerationStatus::Featured, body).await
}
