//! Sign-up, sign-in and session lifecycle.

use api_types::auth::{RegisterUser, SessionToken};
use axum::{Extension, Json, extract::State, http::StatusCode};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Basic},
};
use chrono::Utc;
use engine::Session;

use crate::{
    ServerError,
    server::{BearerHeader, ServerState},
};

type BasicHeader = TypedHeader<Authorization<Basic>>;

fn token_view(session: Session) -> SessionToken {
    SessionToken {
        token: session.token,
        user_id: session.user_id,
        expires_at: session.expires_at,
    }
}

fn credentials(header: Option<BasicHeader>) -> Result<Authorization<Basic>, ServerError> {
    let Some(TypedHeader(auth)) = header else {
        return Err(ServerError::Unauthorized);
    };
    if auth.username().is_empty() || auth.password().is_empty() {
        return Err(ServerError::Unauthorized);
    }
    Ok(auth)
}

/// Create an account and sign it in.
pub async fn register(
    State(state): State<ServerState>,
    Json(payload): Json<RegisterUser>,
) -> Result<(StatusCode, Json<SessionToken>), ServerError> {
    let now = Utc::now();
    let username = state
        .engine
        .register(
            &payload.username,
            &payload.password,
            payload.full_name.as_deref(),
            now,
        )
        .await?;
    let session = state
        .engine
        .sign_in(&username, &payload.password, now)
        .await?;

    Ok((StatusCode::CREATED, Json(token_view(session))))
}

pub async fn sign_in(
    State(state): State<ServerState>,
    header: Option<BasicHeader>,
) -> Result<Json<SessionToken>, ServerError> {
    let auth = credentials(header)?;
    let session = state
        .engine
        .sign_in(auth.username(), auth.password(), Utc::now())
        .await?;
    Ok(Json(token_view(session)))
}

/// Sign-in for the admin console. Non-admins get 403.
pub async fn admin_sign_in(
    State(state): State<ServerState>,
    header: Option<BasicHeader>,
) -> Result<Json<SessionToken>, ServerError> {
    let auth = credentials(header)?;
    let session = state
        .engine
        .sign_in_admin(auth.username(), auth.password(), Utc::now())
        .await?;
    Ok(Json(token_view(session)))
}

pub async fn refresh(
    Extension(session): Extension<Session>,
    State(state): State<ServerState>,
) -> Result<Json<SessionToken>, ServerError> {
    let session = state.engine.refresh(&session.token, Utc::now()).await?;
    Ok(Json(token_view(session)))
}

/// Close the bearer's session. Closing an already closed session succeeds.
pub async fn sign_out(
    State(state): State<ServerState>,
    bearer: Option<BearerHeader>,
) -> Result<StatusCode, ServerError> {
    let Some(TypedHeader(Authorization(bearer))) = bearer else {
        return Err(ServerError::Unauthorized);
    };
    state.engine.sign_out(bearer.token()).await?;
    Ok(StatusCode::NO_CONTENT)
}
