use axum::{Extension, extract::State, http::StatusCode};
use engine::Session;

use crate::{ServerError, server::ServerState};

/// Delete the signed-in user and everything attached to it.
pub async fn delete_account(
    Extension(session): Extension<Session>,
    State(state): State<ServerState>,
) -> Result<StatusCode, ServerError> {
    state.engine.delete_account(&session.user_id).await?;
    tracing::info!(user_id = %session.user_id, "account deleted");
    Ok(StatusCode::NO_CONTENT)
}
