use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use cookie::time::Duration as CookieDuration;
use serde::Deserialize;

use crate::{
    domain::{
        Actor, CoreError,
        identity::{ApplicationStatus, Registration, SESSION_TTL_DAYS, Session},
        model::AccountView,
    },
    web::{
        AppState,
        responses::{ApiMessage, ApiResult, ErrorResponse, core_error},
    },
};

pub const SESSION_COOKIE: &str = "auth_token";

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct TokenQuery {
    pub token: String,
}

#[derive(Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Resolves the caller from the `Authorization` header or the session cookie.
/// A missing or stale token yields an anonymous actor; the policy layer then
/// decides whether the route needs more.
pub async fn current_actor(
    state: &AppState,
    headers: &HeaderMap,
    jar: &CookieJar,
) -> Result<Actor, ErrorResponse> {
    let token = match bearer_token(headers) {
        Some(token) => token.to_string(),
        None => match jar.get(SESSION_COOKIE) {
            Some(cookie) => cookie.value().to_string(),
            None => return Ok(Actor::Anonymous),
        },
    };

    match state.engine().authenticate(&token).await {
        Ok(principal) => Ok(Actor::Account(principal)),
        Err(CoreError::InvalidToken) => Ok(Actor::Anonymous),
        Err(err) => Err(core_error(err)),
    }
}

fn session_cookie(token: String) -> Cookie<'static> {
    let mut cookie = Cookie::new(SESSION_COOKIE, token);
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_max_age(CookieDuration::days(SESSION_TTL_DAYS));
    cookie
}

pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<Registration>,
) -> Result<(StatusCode, Json<AccountView>), ErrorResponse> {
    let account = state
        .engine()
        .register(request)
        .await
        .map_err(core_error)?;
    Ok((StatusCode::CREATED, Json(account)))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> Result<(CookieJar, Json<Session>), ErrorResponse> {
    let session = state
        .engine()
        .login(&request.email, &request.password)
        .await
        .map_err(core_error)?;
    let jar = jar.add(session_cookie(session.token.clone()));
    Ok((jar, Json(session)))
}

pub async fn logout(jar: CookieJar) -> (CookieJar, Json<ApiMessage>) {
    let mut removal = Cookie::new(SESSION_COOKIE, "");
    removal.set_path("/");
    removal.set_http_only(true);
    removal.set_same_site(SameSite::Lax);
    removal.set_max_age(CookieDuration::seconds(0));
    (jar.remove(removal), Json(ApiMessage::new("Logged out")))
}

pub async fn verify_email(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> ApiResult<AccountView> {
    state
        .engine()
        .verify_email(&query.token)
        .await
        .map(Json)
        .map_err(core_error)
}

pub async fn forgot_password(
    State(state): State<AppState>,
    Json(request): Json<EmailRequest>,
) -> ApiResult<ApiMessage> {
    state
        .engine()
        .request_password_reset(&request.email)
        .await
        .map_err(core_error)?;
    Ok(Json(ApiMessage::new("Password reset link sent")))
}

pub async fn reset_password(
    State(state): State<AppState>,
    Json(request): Json<ResetPasswordRequest>,
) -> ApiResult<ApiMessage> {
    state
        .engine()
        .reset_password(&request.token, &request.new_password)
        .await
        .map_err(core_error)?;
    Ok(Json(ApiMessage::new("Password has been reset")))
}

pub async fn application_status(
    State(state): State<AppState>,
    Query(query): Query<EmailRequest>,
) -> ApiResult<ApplicationStatus> {
    state
        .engine()
        .application_status(&query.email)
        .await
        .map(Json)
        .map_err(core_error)
}

pub async fn me(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> ApiResult<AccountView> {
    let actor = current_actor(&state, &headers, &jar).await?;
    state.engine().me(&actor).await.map(Json).map_err(core_error)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn bearer_token_is_extracted() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic xyz"));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn session_cookie_is_http_only() {
        let cookie = session_cookie("tok".into());
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.max_age(), Some(CookieDuration::days(SESSION_TTL_DAYS)));
    }
}
