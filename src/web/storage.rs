use axum::{
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

use crate::{
    domain::ErrorKind,
    objects::StorageRef,
    web::{
        AppState,
        responses::{ErrorResponse, core_error, json_error},
    },
};

/// Serves a stored document inline as PDF.
pub async fn serve_file(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Response, ErrorResponse> {
    let reference = StorageRef::new(reference);
    let bytes = state
        .engine()
        .fetch_file(&reference)
        .await
        .map_err(core_error)?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/pdf"),
    );
    let disposition = format!("inline; filename=\"{}\"", display_name(&reference));
    let disposition = HeaderValue::from_str(&disposition).map_err(|_| {
        json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Unavailable,
            "Invalid download header.",
        )
    })?;
    headers.insert(header::CONTENT_DISPOSITION, disposition);

    Ok((headers, bytes).into_response())
}

/// Strips the uniqueness prefix added by the object store.
fn display_name(reference: &StorageRef) -> &str {
    reference
        .as_str()
        .split_once('_')
        .map(|(_, rest)| rest)
        .filter(|rest| !rest.is_empty())
        .unwrap_or(reference.as_str())
}
