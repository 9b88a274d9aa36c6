use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    domain::model::{Branch, Semester, Subject},
    web::{
        AppState,
        auth::current_actor,
        public::{SemesterQuery, SubjectQuery},
        responses::{ApiResult, ErrorResponse, core_error},
    },
};

#[derive(Deserialize)]
pub struct CreateBranch {
    pub name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSemester {
    pub branch_id: Uuid,
    pub number: i32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubject {
    pub branch_id: Uuid,
    pub semester_id: Uuid,
    pub name: String,
}

pub async fn create_branch(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(body): Json<CreateBranch>,
) -> Result<(StatusCode, Json<Branch>), ErrorResponse> {
    let actor = current_actor(&state, &headers, &jar).await?;
    let branch = state
        .engine()
        .create_branch(&actor, &body.name)
        .await
        .map_err(core_error)?;
    Ok((StatusCode::CREATED, Json(branch)))
}

pub async fn list_branches(State(state): State<AppState>) -> ApiResult<Vec<Branch>> {
    state
        .engine()
        .list_branches()
        .await
        .map(Json)
        .map_err(core_error)
}

pub async fn delete_branch(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ErrorResponse> {
    let actor = current_actor(&state, &headers, &jar).await?;
    state
        .engine()
        .delete_branch(&actor, id)
        .await
        .map_err(core_error)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_semester(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(body): Json<CreateSemester>,
) -> Result<(StatusCode, Json<Semester>), ErrorResponse> {
    let actor = current_actor(&state, &headers, &jar).await?;
    let semester = state
        .engine()
        .create_semester(&actor, body.branch_id, body.number)
        .await
        .map_err(core_error)?;
    Ok((StatusCode::CREATED, Json(semester)))
}

pub async fn list_semesters(
    State(state): State<AppState>,
    Query(query): Query<SemesterQuery>,
) -> ApiResult<Vec<Semester>> {
    state
        .engine()
        .list_semesters(query.branch_id)
        .await
        .map(Json)
        .map_err(core_error)
}

pub async fn delete_semester(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ErrorResponse> {
    let actor = current_actor(&state, &headers, &jar).await?;
    state
        .engine()
        .delete_semester(&actor, id)
        .await
        .map_err(core_error)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_subject(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(body): Json<CreateSubject>,
) -> Result<(StatusCode, Json<Subject>), ErrorResponse> {
    let actor = current_actor(&state, &headers, &jar).await?;
    let subject = state
        .engine()
        .create_subject(&actor, body.branch_id, body.semester_id, &body.name)
        .await
        .map_err(core_error)?;
    Ok((StatusCode::CREATED, Json(subject)))
}

pub async fn list_subjects(
    State(state): State<AppState>,
    Query(query): Query<SubjectQuery>,
) -> ApiResult<Vec<Subject>> {
    state
        .engine()
        .list_subjects(query.branch_id, query.semester_id)
        .await
        .map(Json)
        .map_err(core_error)
}

pub async fn delete_subject(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ErrorResponse> {
    let actor = current_actor(&state, &headers, &jar).await?;
    state
        .engine()
        .delete_subject(&actor, id)
        .await
        .map_err(core_error)?;
    Ok(StatusCode::NO_CONTENT)
}
