use axum::{
    Json,
    extract::{Multipart, Query, State},
    http::{HeaderMap, StatusCode},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::warn;

use crate::{
    domain::{
        ErrorKind,
        documents::Audience,
        identity::ApplicationForm,
        model::{ApplicationView, DocumentFilter, DocumentView},
    },
    web::{
        AppState,
        auth::current_actor,
        responses::{ApiResult, ErrorResponse, core_error, json_error},
        uploads::read_upload_form,
    },
};

pub async fn upload_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    multipart: Multipart,
) -> Result<(StatusCode, Json<DocumentView>), ErrorResponse> {
    let actor = current_actor(&state, &headers, &jar).await?;

    let submission = read_upload_form(multipart)
        .await
        .and_then(|outcome| outcome.into_submission())
        .map_err(|err| {
            warn!(error = %err, "rejected upload form");
            json_error(StatusCode::BAD_REQUEST, ErrorKind::Validation, err.message())
        })?;

    let document = state
        .engine()
        .submit_document(&actor, submission)
        .await
        .map_err(core_error)?;
    Ok((StatusCode::CREATED, Json(document)))
}

pub async fn my_documents(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Query(filter): Query<DocumentFilter>,
) -> ApiResult<Vec<DocumentView>> {
    let actor = current_actor(&state, &headers, &jar).await?;
    state
        .engine()
        .list_documents(&actor, Audience::Own, &filter)
        .await
        .map(Json)
        .map_err(core_error)
}

pub async fn submit_application(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(form): Json<ApplicationForm>,
) -> Result<(StatusCode, Json<ApplicationView>), ErrorResponse> {
    let actor = current_actor(&state, &headers, &jar).await?;
    let application = state
        .engine()
        .submit_application(&actor, form)
        .await
        .map_err(core_error)?;
    Ok((StatusCode::CREATED, Json(application)))
}
