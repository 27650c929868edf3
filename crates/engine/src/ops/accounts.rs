use chrono::{DateTime, SecondsFormat, Utc};
use sea_orm::{ActiveValue, QueryFilter, TransactionTrait, prelude::*};

use crate::{
    EngineError, ResultEngine, SessionEvent, billing_customers, profiles, sessions, subscriptions,
    users,
    util::{hash_password, normalize_optional_text, normalize_username, require_password},
};

use super::{Engine, with_tx};

impl Engine {
    /// Create a user and its profile. The profile starts a trial of
    /// [`Engine::trial_period`] from `now`.
    ///
    /// Returns the normalized username.
    pub async fn register(
        &self,
        username: &str,
        password: &str,
        full_name: Option<&str>,
        now: DateTime<Utc>,
    ) -> ResultEngine<String> {
        let username = normalize_username(username)?;
        let password_hash = hash_password(require_password(password)?)?;
        let trial_ends_at = self
            .trial_end_from(now)?
            .to_rfc3339_opts(SecondsFormat::Secs, true);

        with_tx!(self, |db_tx| {
            if users::Entity::find_by_id(username.clone())
                .one(&db_tx)
                .await?
                .is_some()
            {
                return Err(EngineError::ExistingKey(username));
            }

            users::ActiveModel {
                username: ActiveValue::Set(username.clone()),
                password: ActiveValue::Set(password_hash),
            }
            .insert(&db_tx)
            .await?;

            profiles::ActiveModel {
                id: ActiveValue::Set(username.clone()),
                full_name: ActiveValue::Set(normalize_optional_text(full_name)),
                is_admin: ActiveValue::Set(false),
                trial_ends_at: ActiveValue::Set(trial_ends_at),
                created_at: ActiveValue::Set(now),
            }
            .insert(&db_tx)
            .await?;

            tracing::info!(user_id = %username, "user registered");
            Ok(username)
        })
    }

    /// Return the stored profile of a user.
    pub async fn profile(&self, user_id: &str) -> ResultEngine<profiles::Model> {
        profiles::Entity::find_by_id(user_id.to_string())
            .one(&self.database)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound("profile not exists".to_string()))
    }

    pub async fn set_admin(&self, user_id: &str, is_admin: bool) -> ResultEngine<()> {
        let mut profile: profiles::ActiveModel = self.profile(user_id).await?.into();
        profile.is_admin = ActiveValue::Set(is_admin);
        profile.update(&self.database).await?;
        tracing::info!(user_id, is_admin, "admin flag updated");
        Ok(())
    }

    pub async fn set_trial_end(
        &self,
        user_id: &str,
        trial_ends_at: DateTime<Utc>,
    ) -> ResultEngine<()> {
        let mut profile: profiles::ActiveModel = self.profile(user_id).await?.into();
        profile.trial_ends_at =
            ActiveValue::Set(trial_ends_at.to_rfc3339_opts(SecondsFormat::Secs, true));
        profile.update(&self.database).await?;
        tracing::info!(user_id, %trial_ends_at, "trial end updated");
        Ok(())
    }

    /// Remove a user and everything keyed by it, then announce the sign-out.
    ///
    /// Canceling the subscription at the payment provider is the caller's job;
    /// the local row goes away with the customer.
    pub async fn delete_account(&self, user_id: &str) -> ResultEngine<()> {
        with_tx!(self, |db_tx| {
            if users::Entity::find_by_id(user_id.to_string())
                .one(&db_tx)
                .await?
                .is_none()
            {
                return Err(EngineError::KeyNotFound("user not exists".to_string()));
            }

            sessions::Entity::delete_many()
                .filter(sessions::Column::UserId.eq(user_id))
                .exec(&db_tx)
                .await?;

            let customer = billing_customers::Entity::find_by_id(user_id.to_string())
                .one(&db_tx)
                .await?;
            if let Some(customer) = customer {
                subscriptions::Entity::delete_many()
                    .filter(subscriptions::Column::CustomerId.eq(customer.customer_id.clone()))
                    .exec(&db_tx)
                    .await?;
                billing_customers::Entity::delete_by_id(customer.user_id)
                    .exec(&db_tx)
                    .await?;
            }

            profiles::Entity::delete_by_id(user_id.to_string())
                .exec(&db_tx)
                .await?;
            users::Entity::delete_by_id(user_id.to_string())
                .exec(&db_tx)
                .await?;
            Ok(())
        })?;

        tracing::info!(user_id, "account deleted");
        self.hub.publish(SessionEvent::SignedOut {
            user_id: user_id.to_string(),
        });
        Ok(())
    }
}
