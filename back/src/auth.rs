use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Query, State},
    http::{header, request::Parts, HeaderMap},
    response::{AppendHeaders, IntoResponse, Redirect},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::{error::Error, AppState};

pub const SESSION_COOKIE: &str = "session";

const AUTHORIZATION_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const USERINFO_ENDPOINT: &str = "https://openidconnect.googleapis.com/v1/userinfo";

/// Identity resolved by the provider. `sub` is the stable subject identifier
/// that item ownership is keyed on.
#[derive(Clone, Debug, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// The authentication capability: exchange a provider assertion for the
/// caller's claims. The rest of the application only sees this trait, so a
/// test double can stand in for the real provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Provider consent URL carrying the CSRF `state`.
    fn authorization_url(&self, state: &str) -> String;

    /// Exchanges a callback authorization code for the caller's claims.
    async fn exchange_code(&self, code: &str) -> Result<Claims, Error>;
}

/// Google OAuth 2.0 / OIDC code flow.
pub struct GoogleIdentity {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    redirect_url: String,
}

impl GoogleIdentity {
    pub fn new(client_id: String, client_secret: String, redirect_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id,
            client_secret,
            redirect_url,
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[async_trait]
impl IdentityProvider for GoogleIdentity {
    fn authorization_url(&self, state: &str) -> String {
        let url = reqwest::Url::parse_with_params(
            AUTHORIZATION_ENDPOINT,
            [
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_url.as_str()),
                ("response_type", "code"),
                ("scope", "openid email"),
                ("state", state),
            ],
        )
        .expect("authorization endpoint is a valid url");

        url.to_string()
    }

    async fn exchange_code(&self, code: &str) -> Result<Claims, Error> {
        let response = self
            .http
            .post(TOKEN_ENDPOINT)
            .form(&[
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", self.redirect_url.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|err| Error::Internal(err.into()))?;

        if !response.status().is_success() {
            return Err(Error::AuthenticationFailed);
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|_| Error::AuthenticationFailed)?;

        let response = self
            .http
            .get(USERINFO_ENDPOINT)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .map_err(|err| Error::Internal(err.into()))?;

        if !response.status().is_success() {
            return Err(Error::AuthenticationFailed);
        }

        response.json().await.map_err(|_| Error::AuthenticationFailed)
    }
}

/// An established sign-in, held in memory and keyed by the cookie token.
#[derive(Clone, Debug)]
pub struct Session {
    pub subject: String,
    pub created: DateTime<Utc>,
}

impl AppState {
    /// Records a fresh CSRF state for an outgoing authorization redirect.
    /// States expire after ten minutes.
    pub async fn begin_auth(&self) -> String {
        let state = Uuid::new_v4().to_string();
        let mut states = self.auth_states.lock().await;
        states.retain(|_, expires| *expires > Utc::now());
        states.insert(state.clone(), Utc::now() + Duration::minutes(10));
        state
    }

    /// Consumes a callback state. Unknown, expired, and replayed states all
    /// fail authentication.
    pub async fn take_auth_state(&self, state: &str) -> Result<(), Error> {
        let mut states = self.auth_states.lock().await;
        match states.remove(state) {
            Some(expires) if expires > Utc::now() => Ok(()),
            _ => Err(Error::AuthenticationFailed),
        }
    }

    pub async fn create_session(&self, subject: String) -> String {
        let token = Uuid::new_v4().to_string();
        let session = Session {
            subject,
            created: Utc::now(),
        };
        self.sessions.lock().await.insert(token.clone(), session);
        token
    }

    /// Looks up a session, evicting it once it is more than 30 days old.
    pub async fn resolve_session(&self, token: &str) -> Option<Session> {
        let mut sessions = self.sessions.lock().await;
        match sessions.get(token) {
            Some(session) if Utc::now() - session.created < Duration::days(30) => {
                Some(session.clone())
            }
            Some(_) => {
                sessions.remove(token);
                None
            }
            None => None,
        }
    }

    pub async fn drop_session(&self, token: &str) {
        self.sessions.lock().await.remove(token);
    }

    fn session_cookie(&self, token: &str) -> String {
        let mut cookie = format!("{SESSION_COOKIE}={token}; HttpOnly; Path=/; SameSite=Lax");
        if self.secure_cookies {
            cookie.push_str("; Secure");
        }
        cookie
    }
}

fn clear_session_cookie() -> String {
    format!("{SESSION_COOKIE}=; Max-Age=0; HttpOnly; Path=/; SameSite=Lax")
}

pub fn session_token(headers: &HeaderMap) -> Option<&str> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE).then_some(value)
    })
}

/// The authenticated caller. Extraction fails with
/// [`Error::AuthenticationFailed`] when no valid session cookie is present.
pub struct CurrentUser {
    pub subject: String,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = Error;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Error> {
        let token = session_token(&parts.headers).ok_or(Error::AuthenticationFailed)?;
        let session = state
            .resolve_session(token)
            .await
            .ok_or(Error::AuthenticationFailed)?;

        Ok(CurrentUser {
            subject: session.subject,
        })
    }
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/google", get(sign_in_with_google))
        .route("/auth/callback", get(callback))
        .route("/auth/sign-out", post(sign_out))
}

async fn sign_in_with_google(State(state): State<Arc<AppState>>) -> Redirect {
    let auth_state = state.begin_auth().await;
    Redirect::to(&state.provider.authorization_url(&auth_state))
}

#[derive(Deserialize)]
struct CallbackParams {
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

async fn callback(
    State(app): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Result<impl IntoResponse, Error> {
    let (auth_state, code) = params
        .state
        .zip(params.code)
        .ok_or(Error::AuthenticationFailed)?;

    app.take_auth_state(&auth_state).await?;
    let claims = app.provider.exchange_code(&code).await?;
    let token = app.create_session(claims.sub.clone()).await;

    info!(subject = %claims.sub, email = ?claims.email, "session established");

    Ok((
        AppendHeaders([(header::SET_COOKIE, app.session_cookie(&token))]),
        Redirect::to("/"),
    ))
}

async fn sign_out(State(app): State<Arc<AppState>>, headers: HeaderMap) -> impl IntoResponse {
    if let Some(token) = session_token(&headers) {
        app.drop_session(token).await;
    }

    (
        AppendHeaders([(header::SET_COOKIE, clear_session_cookie())]),
        Redirect::to("/sign-in"),
    )
}
