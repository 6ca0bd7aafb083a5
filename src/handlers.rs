// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! HTTP handlers for sign-in, sign-out and registration.
//!
//! Every route runs behind [`session_guard`], which resolves the caller,
//! validates the session cookie against the caller's fingerprint and
//! stamps the security headers on the way out.

use crate::auth::{AuthenticationService, Registration};
use crate::config::Config;
use crate::error::AuthError;
use crate::session::{CallerIdentity, Session, SessionId, UserRef};
use crate::users::UserRecord;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::debug;

/// Shared application state.
pub struct AppState {
    pub auth: AuthenticationService,
    pub config: Config,
}

/// What the guard learned about the current request.
#[derive(Debug, Clone)]
pub struct RequestSession {
    pub caller: CallerIdentity,
    /// Identifier presented in the session cookie, valid or not
    pub session_id: Option<SessionId>,
    /// The session, if it survived validation
    pub session: Option<Session>,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Sign-in form (`u` = username or e-mail, `p` = password).
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub u: Option<String>,
    #[serde(default)]
    pub p: Option<String>,
}

/// Registration form.
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub u: Option<String>,
    #[serde(default, rename = "fn")]
    pub full_name: Option<String>,
    #[serde(default)]
    pub e: Option<String>,
    #[serde(default)]
    pub w: Option<String>,
    #[serde(default)]
    pub pw: Option<String>,
    #[serde(default)]
    pub cpw: Option<String>,
    #[serde(default)]
    pub anticsrf: Option<String>,
}

/// Token to echo back in the registration form's `anticsrf` field.
#[derive(Debug, Serialize)]
pub struct AntiCsrfResponse {
    pub anticsrf: String,
}

/// Current session as reported by `/session`.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/login", post(login))
        .route("/logout", get(logout))
        .route("/register", get(register_form).post(register))
        .route("/session", get(current_session))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn_with_state(state.clone(), session_guard)),
        )
        .with_state(state)
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "sketchspace-auth",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Resolve the caller and session, then add security headers to the response.
pub async fn session_guard(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let caller = caller_identity(&request);
    let session_id = session_cookie(request.headers(), &state.config.session.cookie_name);
    let session = state.auth.current_session(&caller, session_id.as_ref());

    debug!(
        address = %caller.address,
        path = %request.uri().path(),
        authenticated = session.is_some(),
        "Guarding request"
    );

    request.extensions_mut().insert(RequestSession {
        caller,
        session_id,
        session,
    });

    let mut response = next.run(request).await;
    apply_security_headers(response.headers_mut());
    response
}

/// Headers that keep session-bearing pages out of frames and caches.
pub fn apply_security_headers(headers: &mut HeaderMap) {
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store, no-cache, must-revalidate"),
    );
    headers.insert(
        header::EXPIRES,
        HeaderValue::from_static("Wed, 04 Apr 1984 00:00:00 GMT"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
}

fn caller_identity(request: &Request) -> CallerIdentity {
    let address = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    CallerIdentity::new(address, user_agent)
}

/// Extract the session identifier from the `Cookie` header.
pub fn session_cookie(headers: &HeaderMap, name: &str) -> Option<SessionId> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| SessionId::from(value))
}

fn set_cookie(name: &str, id: &SessionId) -> String {
    format!("{name}={id}; Path=/; HttpOnly; SameSite=Lax")
}

fn clear_cookie(name: &str) -> String {
    format!("{name}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

fn redirect_home(cookie: String) -> Response {
    (
        StatusCode::FOUND,
        [
            (header::LOCATION, "/".to_string()),
            (header::SET_COOKIE, cookie),
        ],
    )
        .into_response()
}

/// Sign in and redirect home with a fresh session cookie.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestSession>,
    Form(form): Form<LoginForm>,
) -> Result<Response, AuthError> {
    let session = state
        .auth
        .sign_in(
            &ctx.caller,
            ctx.session_id.as_ref(),
            form.u.as_deref().unwrap_or_default(),
            form.p.as_deref().unwrap_or_default(),
        )
        .await?;

    Ok(redirect_home(set_cookie(&state.config.session.cookie_name, &session.id)))
}

/// Sign out and redirect home.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestSession>,
) -> Response {
    state.auth.log_out(&ctx.caller, ctx.session_id.as_ref());
    redirect_home(clear_cookie(&state.config.session.cookie_name))
}

/// Issue the registration form's anti-CSRF token, opening a session if needed.
pub async fn register_form(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestSession>,
) -> Response {
    let (session_id, anticsrf) = state.auth.anti_csrf_token(ctx.session_id.as_ref());
    (
        [(
            header::SET_COOKIE,
            set_cookie(&state.config.session.cookie_name, &session_id),
        )],
        Json(AntiCsrfResponse { anticsrf }),
    )
        .into_response()
}

/// Create an account.
pub async fn register(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestSession>,
    Form(form): Form<RegisterForm>,
) -> Result<(StatusCode, Json<UserRecord>), AuthError> {
    let registration = Registration {
        username: form.u.unwrap_or_default(),
        full_name: form.full_name.unwrap_or_default(),
        email: form.e.unwrap_or_default(),
        url: form.w,
        password: form.pw.unwrap_or_default(),
        confirm_password: form.cpw.unwrap_or_default(),
        anti_csrf: form.anticsrf.unwrap_or_default(),
    };

    let user = state
        .auth
        .register(&ctx.caller, ctx.session_id.as_ref(), registration)
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// Report the current session.
pub async fn current_session(Extension(ctx): Extension<RequestSession>) -> Json<SessionResponse> {
    Json(match ctx.session {
        Some(session) => SessionResponse {
            authenticated: true,
            user: Some(session.user),
            expires_at: Some(session.expires_at),
        },
        None => SessionResponse {
            authenticated: false,
            user: None,
            expires_at: None,
        },
    })
}
