use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, patch, post},
};

use crate::web::{AppState, admin, auth, documents, public, storage, uploads::MAX_UPLOAD_BYTES};

/// Headroom for multipart framing and the text fields around the file.
const BODY_LIMIT_SLACK: usize = 64 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/verify-email", get(auth::verify_email))
        .route("/api/auth/forgot-password", post(auth::forgot_password))
        .route("/api/auth/reset-password", post(auth::reset_password))
        .route("/api/auth/application-status", get(auth::application_status))
        .route("/api/auth/me", get(auth::me))
        .route("/api/applications", post(documents::submit_application))
        .route(
            "/api/documents",
            post(documents::upload_document)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + BODY_LIMIT_SLACK)),
        )
        .route("/api/documents/mine", get(documents::my_documents))
        .route("/api/public/documents", get(public::documents))
        .route("/api/public/branches", get(public::branches))
        .route("/api/public/semesters", get(public::semesters))
        .route("/api/public/subjects", get(public::subjects))
        .route("/api/admin/users", get(admin::list_users))
        .route("/api/admin/applications", get(admin::list_applications))
        .route("/api/admin/users/:id/approve", patch(admin::approve_user))
        .route("/api/admin/users/:id/reject", patch(admin::reject_user))
        .route(
            "/api/admin/branches",
            get(admin::list_branches).post(admin::create_branch),
        )
        .route("/api/admin/branches/:id", delete(admin::delete_branch))
        .route(
            "/api/admin/semesters",
            get(admin::list_semesters).post(admin::create_semester),
        )
        .route("/api/admin/semesters/:id", delete(admin::delete_semester))
        .route(
            "/api/admin/subjects",
            get(admin::list_subjects).post(admin::create_subject),
        )
        .route("/api/admin/subjects/:id", delete(admin::delete_subject))
        .route("/api/admin/documents", get(admin::list_documents))
        .route(
            "/api/admin/documents/:id/approve",
            patch(admin::approve_document),
        )
        .route(
            "/api/admin/documents/:id/reject",
            patch(admin::reject_document),
        )
        .route(
            "/api/admin/documents/:id/feature",
            patch(admin::feature_document),
        )
        .route("/files/:reference", get(storage::serve_file))
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}
