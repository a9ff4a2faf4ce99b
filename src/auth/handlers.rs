use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::Redirect,
    routing::{get, post},
    Form, Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{
            EmailMessage, LoginForm, ProfileResponse, RegisterForm, ResetRequestForm,
            ResetTokenResponse, StatusMessage, UpdatePasswordForm,
        },
        service::AuthError,
    },
    state::AppState,
};

/// Cookie carrying the opaque session token.
pub const SESSION_COOKIE: &str = "session_id";

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(register))
        .route("/sessions", post(login).delete(logout))
        .route("/profile", get(profile))
}

pub fn reset_routes() -> Router<AppState> {
    Router::new().route("/reset_password", post(reset_password).put(update_password))
}

fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookie = headers.get(header::COOKIE)?;
    let s = cookie.to_str().ok()?;
    for part in s.split(';') {
        let p = part.trim();
        if let Some(eq) = p.find('=') {
            let (k, v) = p.split_at(eq);
            if k == name {
                return Some(v[1..].to_string());
            }
        }
    }
    None
}

fn session_cookie(token: &str) -> HeaderValue {
    // Token is a UUID, always a valid header value
    HeaderValue::from_str(&format!("{SESSION_COOKIE}={token}; HttpOnly; Path=/")).unwrap()
}

fn internal(e: AuthError) -> (StatusCode, String) {
    error!(error = %e, "auth operation failed");
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

pub async fn status() -> Json<StatusMessage> {
    Json(StatusMessage::new("Bienvenue"))
}

#[instrument(skip(state, form))]
pub async fn register(
    State(state): State<AppState>,
    Form(mut form): Form<RegisterForm>,
) -> Result<Json<EmailMessage>, (StatusCode, Json<StatusMessage>)> {
    form.email = form.email.trim().to_lowercase();

    if !is_valid_email(&form.email) {
        warn!(email = %form.email, "invalid email");
        return Err((
            StatusCode::BAD_REQUEST,
            Json(StatusMessage::new("invalid email")),
        ));
    }

    match state.auth.register_user(&form.email, &form.password).await {
        Ok(user) => Ok(Json(EmailMessage {
            email: user.email,
            message: "user created".into(),
        })),
        Err(AuthError::AlreadyRegistered(_)) => Err((
            StatusCode::BAD_REQUEST,
            Json(StatusMessage::new("email already registered")),
        )),
        Err(e) => {
            error!(error = %e, "register failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(StatusMessage::new(e.to_string())),
            ))
        }
    }
}

#[instrument(skip(state, form))]
pub async fn login(
    State(state): State<AppState>,
    Form(mut form): Form<LoginForm>,
) -> Result<(HeaderMap, Json<EmailMessage>), (StatusCode, String)> {
    form.email = form.email.trim().to_lowercase();

    let ok = state
        .auth
        .valid_login(&form.email, &form.password)
        .await
        .map_err(internal)?;
    if !ok {
        warn!(email = %form.email, "login rejected");
        return Err((StatusCode::UNAUTHORIZED, "Invalid credentials".into()));
    }

    let token = state
        .auth
        .create_session(&form.email)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::UNAUTHORIZED, "Invalid credentials".to_string()))?;

    let mut headers = HeaderMap::new();
    headers.insert(header::SET_COOKIE, session_cookie(&token));
    info!(email = %form.email, "user logged in");
    Ok((
        headers,
        Json(EmailMessage {
            email: form.email,
            message: "logged in".into(),
        }),
    ))
}

#[instrument(skip(state, headers))]
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Redirect, (StatusCode, String)> {
    let cookie = parse_cookie(&headers, SESSION_COOKIE);
    let user = state
        .auth
        .user_from_session_token(cookie.as_deref())
        .await
        .map_err(internal)?
        .ok_or((StatusCode::FORBIDDEN, "Forbidden".to_string()))?;

    state
        .auth
        .destroy_session(Some(user.id))
        .await
        .map_err(internal)?;
    info!(user_id = %user.id, "user logged out");
    Ok(Redirect::to("/"))
}

#[instrument(skip(state, headers))]
pub async fn profile(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ProfileResponse>, (StatusCode, String)> {
    let cookie = parse_cookie(&headers, SESSION_COOKIE);
    let user = state
        .auth
        .user_from_session_token(cookie.as_deref())
        .await
        .map_err(internal)?
        .ok_or((StatusCode::FORBIDDEN, "Forbidden".to_string()))?;

    Ok(Json(ProfileResponse { email: user.email }))
}

#[instrument(skip(state, form))]
pub async fn reset_password(
    State(state): State<AppState>,
    Form(form): Form<ResetRequestForm>,
) -> Result<Json<ResetTokenResponse>, (StatusCode, String)> {
    match state.auth.reset_password_token(&form.email).await {
        Ok(token) => Ok(Json(ResetTokenResponse {
            email: form.email,
            reset_token: token,
        })),
        Err(AuthError::UserNotFound) => Err((StatusCode::FORBIDDEN, "Forbidden".into())),
        Err(e) => Err(internal(e)),
    }
}

#[instrument(skip(state, form))]
pub async fn update_password(
    State(state): State<AppState>,
    Form(form): Form<UpdatePasswordForm>,
) -> Result<Json<EmailMessage>, (StatusCode, String)> {
    match state
        .auth
        .update_password(form.reset_token.as_deref(), form.new_password.as_deref())
        .await
    {
        Ok(()) => Ok(Json(EmailMessage {
            email: form.email,
            message: "Password updated".into(),
        })),
        Err(AuthError::InvalidResetToken) => Err((StatusCode::FORBIDDEN, "Forbidden".into())),
        Err(e) => Err(internal(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cookie_headers(set_cookie: &HeaderValue) -> HeaderMap {
        // "session_id=<token>; HttpOnly; Path=/" → request Cookie header
        let pair = set_cookie
            .to_str()
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_string();
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(&pair).unwrap());
        headers
    }

    #[test]
    fn email_regex_accepts_plausible_addresses_only() {
        assert!(is_valid_email("bob@dylan.test"));
        assert!(!is_valid_email("bob"));
        assert!(!is_valid_email("bob@dylan"));
        assert!(!is_valid_email("bob dylan@x.test"));
    }

    #[test]
    fn parse_cookie_picks_the_named_pair() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("other=1; session_id=abc; theme=dark"),
        );
        assert_eq!(parse_cookie(&headers, SESSION_COOKIE).as_deref(), Some("abc"));
        assert_eq!(parse_cookie(&headers, "missing"), None);
    }

    #[tokio::test]
    async fn register_login_profile_logout_flow() {
        let state = AppState::fake();

        register(
            State(state.clone()),
            Form(RegisterForm {
                email: "Bob@Dylan.test".into(),
                password: "my-password".into(),
            }),
        )
        .await
        .expect("registration succeeds");

        let (headers, body) = login(
            State(state.clone()),
            Form(LoginForm {
                email: "bob@dylan.test".into(),
                password: "my-password".into(),
            }),
        )
        .await
        .expect("login succeeds");
        assert_eq!(body.0.message, "logged in");
        let set_cookie = headers.get(header::SET_COOKIE).expect("session cookie set");

        let request_headers = cookie_headers(set_cookie);
        let profile_body = profile(State(state.clone()), request_headers.clone())
            .await
            .expect("profile resolves");
        assert_eq!(profile_body.0.email, "bob@dylan.test");

        logout(State(state.clone()), request_headers.clone())
            .await
            .expect("logout succeeds");

        let (code, _) = profile(State(state.clone()), request_headers)
            .await
            .unwrap_err();
        assert_eq!(code, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn duplicate_registration_is_a_bad_request() {
        let state = AppState::fake();
        let form = || {
            Form(RegisterForm {
                email: "bob@dylan.test".into(),
                password: "my-password".into(),
            })
        };

        register(State(state.clone()), form()).await.expect("first");
        let (code, body) = register(State(state.clone()), form()).await.unwrap_err();
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert_eq!(body.0.message, "email already registered");
    }

    #[tokio::test]
    async fn login_with_bad_credentials_is_unauthorized() {
        let state = AppState::fake();
        register(
            State(state.clone()),
            Form(RegisterForm {
                email: "bob@dylan.test".into(),
                password: "my-password".into(),
            }),
        )
        .await
        .expect("registration succeeds");

        let (code, _) = login(
            State(state.clone()),
            Form(LoginForm {
                email: "bob@dylan.test".into(),
                password: "wrong".into(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(code, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn password_reset_flow_over_http() {
        let state = AppState::fake();
        register(
            State(state.clone()),
            Form(RegisterForm {
                email: "bob@dylan.test".into(),
                password: "old-password".into(),
            }),
        )
        .await
        .expect("registration succeeds");

        let (code, _) = reset_password(
            State(state.clone()),
            Form(ResetRequestForm {
                email: "nobody@dylan.test".into(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(code, StatusCode::FORBIDDEN);

        let token = reset_password(
            State(state.clone()),
            Form(ResetRequestForm {
                email: "bob@dylan.test".into(),
            }),
        )
        .await
        .expect("token issued")
        .0
        .reset_token;

        update_password(
            State(state.clone()),
            Form(UpdatePasswordForm {
                email: "bob@dylan.test".into(),
                reset_token: Some(token.clone()),
                new_password: Some("new-password".into()),
            }),
        )
        .await
        .expect("password updated");

        // Token is single-use.
        let (code, _) = update_password(
            State(state.clone()),
            Form(UpdatePasswordForm {
                email: "bob@dylan.test".into(),
                reset_token: Some(token),
                new_password: Some("again".into()),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(code, StatusCode::FORBIDDEN);

        login(
            State(state.clone()),
            Form(LoginForm {
                email: "bob@dylan.test".into(),
                password: "new-password".into(),
            }),
        )
        .await
        .expect("login with new password");
    }
}
