use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    domain::{
        Actor,
        documents::Audience,
        model::{Branch, DocumentFilter, DocumentView, Semester, Subject},
    },
    web::{
        AppState,
        responses::{ApiResult, core_error},
    },
};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemesterQuery {
    pub branch_id: Uuid,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectQuery {
    pub branch_id: Uuid,
    #[serde(default)]
    pub semester_id: Option<Uuid>,
}

pub async fn documents(
    State(state): State<AppState>,
    Query(filter): Query<DocumentFilter>,
) -> ApiResult<Vec<DocumentView>> {
    state
        .engine()
        .list_documents(&Actor::Anonymous, Audience::Public, &filter)
        .await
        .map(Json)
        .map_err(core_error)
}

pub async fn branches(State(state): State<AppState>) -> ApiResult<Vec<Branch>> {
    state
        .engine()
        .list_branches()
        .await
        .map(Json)
        .map_err(core_error)
}

pub async fn semesters(
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

pub async fn subjects(
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
