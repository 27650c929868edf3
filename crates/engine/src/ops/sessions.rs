use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, QueryFilter, prelude::*};

use crate::{
    EngineError, ResultEngine, Session, SessionEvent, profiles, sessions, users,
    util::{new_session_token, normalize_username, verify_password},
};

use super::Engine;

impl From<sessions::Model> for Session {
    fn from(model: sessions::Model) -> Self {
        Self {
            token: model.token,
            user_id: model.user_id,
            expires_at: model.expires_at,
        }
    }
}

impl Engine {
    /// Check credentials and open a new session.
    ///
    /// Unknown user and wrong password are indistinguishable to the caller.
    pub async fn sign_in(
        &self,
        username: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> ResultEngine<Session> {
        let username = normalize_username(username)?;
        let user = users::Entity::find_by_id(username.clone())
            .one(&self.database)
            .await?
            .ok_or_else(|| EngineError::InvalidCredentials("wrong username or password".to_string()))?;

        if !verify_password(&user.password, password)? {
            tracing::info!(user_id = %username, "sign-in rejected");
            return Err(EngineError::InvalidCredentials(
                "wrong username or password".to_string(),
            ));
        }

        let expires_at = self.session_expiry_from(now)?;
        let session = sessions::ActiveModel {
            token: ActiveValue::Set(new_session_token()),
            user_id: ActiveValue::Set(user.username.clone()),
            created_at: ActiveValue::Set(now),
            expires_at: ActiveValue::Set(expires_at),
        }
        .insert(&self.database)
        .await?;

        tracing::info!(user_id = %user.username, "signed in");
        self.hub.publish(SessionEvent::SignedIn {
            user_id: user.username,
        });
        Ok(session.into())
    }

    /// As [`Engine::sign_in`], but only for admins. A non-admin gets
    /// `Forbidden` and the session just opened is closed again.
    pub async fn sign_in_admin(
        &self,
        username: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> ResultEngine<Session> {
        let session = self.sign_in(username, password, now).await?;

        let is_admin = profiles::Entity::find_by_id(session.user_id.clone())
            .one(&self.database)
            .await?
            .is_some_and(|profile| profile.is_admin);
        if !is_admin {
            self.sign_out(&session.token).await?;
            return Err(EngineError::Forbidden(
                "administrator access required".to_string(),
            ));
        }

        Ok(session)
    }

    /// The session behind `token`, if it exists and has not expired.
    pub async fn session(&self, token: &str, now: DateTime<Utc>) -> ResultEngine<Option<Session>> {
        let session = sessions::Entity::find_by_id(token.to_string())
            .one(&self.database)
            .await?
            .map(Session::from);
        Ok(session.filter(|session| !session.is_expired_at(now)))
    }

    /// Push the expiry of a live session to `now + ttl`.
    pub async fn refresh(&self, token: &str, now: DateTime<Utc>) -> ResultEngine<Session> {
        let Some(session) = self.session(token, now).await? else {
            return Err(EngineError::KeyNotFound("session not exists".to_string()));
        };

        let expires_at = self.session_expiry_from(now)?;
        let model = sessions::ActiveModel {
            token: ActiveValue::Unchanged(session.token),
            expires_at: ActiveValue::Set(expires_at),
            ..Default::default()
        }
        .update(&self.database)
        .await?;

        self.hub.publish(SessionEvent::TokenRefreshed {
            user_id: model.user_id.clone(),
        });
        Ok(model.into())
    }

    /// Close a session. Closing an unknown token is a no-op.
    pub async fn sign_out(&self, token: &str) -> ResultEngine<()> {
        let Some(model) = sessions::Entity::find_by_id(token.to_string())
            .one(&self.database)
            .await?
        else {
            return Ok(());
        };

        sessions::Entity::delete_by_id(model.token)
            .exec(&self.database)
            .await?;

        tracing::info!(user_id = %model.user_id, "signed out");
        self.hub.publish(SessionEvent::SignedOut {
            user_id: model.user_id,
        });
        Ok(())
    }

    /// Drop every expired session. Returns how many were removed.
    pub async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> ResultEngine<u64> {
        let result = sessions::Entity::delete_many()
            .filter(sessions::Column::ExpiresAt.lte(now))
            .exec(&self.database)
            .await?;
        Ok(result.rows_affected)
    }
}
