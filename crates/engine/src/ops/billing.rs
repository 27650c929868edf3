use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, QueryFilter, TransactionTrait, prelude::*, sea_query::OnConflict};

use crate::{
    AccountStore, BillingCustomerRecord, EngineError, ProfileRecord, ResultEngine,
    SubscriptionRecord, SubscriptionStatus, SubscriptionSummary, TrialStatus, billing_customers,
    plans::plan_name_for, profiles, subscriptions, trial::parse_trial_end, users,
};

use super::{Engine, with_tx};

/// Subscription fields as reported by the payment provider.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubscriptionUpdate {
    pub subscription_id: Option<String>,
    pub status: String,
    pub price_id: Option<String>,
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
    pub cancel_at_period_end: bool,
    pub payment_method_brand: Option<String>,
    pub payment_method_last4: Option<String>,
}

#[async_trait]
impl AccountStore for Engine {
    async fn get_profile(&self, user_id: &str) -> ResultEngine<Option<ProfileRecord>> {
        let profile = profiles::Entity::find_by_id(user_id.to_string())
            .one(&self.database)
            .await?;
        Ok(profile.map(|model| ProfileRecord {
            id: model.id,
            is_admin: model.is_admin,
            trial_ends_at: model.trial_ends_at,
        }))
    }

    async fn get_billing_customer(
        &self,
        user_id: &str,
    ) -> ResultEngine<Option<BillingCustomerRecord>> {
        let customer = billing_customers::Entity::find_by_id(user_id.to_string())
            .one(&self.database)
            .await?;
        Ok(customer.map(|model| BillingCustomerRecord {
            customer_id: model.customer_id,
        }))
    }

    async fn get_subscription(
        &self,
        customer_id: &str,
    ) -> ResultEngine<Option<SubscriptionRecord>> {
        let subscription = subscriptions::Entity::find_by_id(customer_id.to_string())
            .one(&self.database)
            .await?;
        Ok(subscription.map(|model| SubscriptionRecord {
            status: SubscriptionStatus::from(model.status),
        }))
    }
}

impl Engine {
    /// Link `user_id` to a payment provider customer, replacing any previous link.
    ///
    /// Relinking to a different customer drops the subscription stored for the
    /// previous one.
    pub async fn upsert_billing_customer(
        &self,
        user_id: &str,
        customer_id: &str,
    ) -> ResultEngine<()> {
        let customer_id = customer_id.trim();
        if customer_id.is_empty() {
            return Err(EngineError::InvalidInput(
                "customer id must not be empty".to_string(),
            ));
        }

        with_tx!(self, |db_tx| {
            if users::Entity::find_by_id(user_id.to_string())
                .one(&db_tx)
                .await?
                .is_none()
            {
                return Err(EngineError::KeyNotFound("user not exists".to_string()));
            }

            let taken = billing_customers::Entity::find()
                .filter(billing_customers::Column::CustomerId.eq(customer_id))
                .filter(billing_customers::Column::UserId.ne(user_id))
                .one(&db_tx)
                .await?
                .is_some();
            if taken {
                return Err(EngineError::ExistingKey(customer_id.to_string()));
            }

            let previous = billing_customers::Entity::find_by_id(user_id.to_string())
                .one(&db_tx)
                .await?
                .filter(|link| link.customer_id != customer_id);
            if let Some(previous) = previous {
                // The old customer's subscription does not follow the user.
                subscriptions::Entity::delete_by_id(previous.customer_id.clone())
                    .exec(&db_tx)
                    .await?;
                tracing::info!(
                    user_id,
                    previous = %previous.customer_id,
                    customer_id,
                    "billing customer relinked"
                );
            }

            billing_customers::Entity::insert(billing_customers::ActiveModel {
                user_id: ActiveValue::Set(user_id.to_string()),
                customer_id: ActiveValue::Set(customer_id.to_string()),
            })
            .on_conflict(
                OnConflict::column(billing_customers::Column::UserId)
                    .update_column(billing_customers::Column::CustomerId)
                    .to_owned(),
            )
            .exec(&db_tx)
            .await?;
            Ok(())
        })
    }

    /// Store the latest subscription state for a known customer.
    pub async fn upsert_subscription(
        &self,
        customer_id: &str,
        update: SubscriptionUpdate,
    ) -> ResultEngine<()> {
        with_tx!(self, |db_tx| {
            let customer = billing_customers::Entity::find()
                .filter(billing_customers::Column::CustomerId.eq(customer_id))
                .one(&db_tx)
                .await?;
            if customer.is_none() {
                return Err(EngineError::KeyNotFound("customer not exists".to_string()));
            }

            let model = subscriptions::ActiveModel {
                customer_id: ActiveValue::Set(customer_id.to_string()),
                subscription_id: ActiveValue::Set(update.subscription_id),
                status: ActiveValue::Set(update.status),
                price_id: ActiveValue::Set(update.price_id),
                current_period_start: ActiveValue::Set(update.current_period_start),
                current_period_end: ActiveValue::Set(update.current_period_end),
                cancel_at_period_end: ActiveValue::Set(update.cancel_at_period_end),
                payment_method_brand: ActiveValue::Set(update.payment_method_brand),
                payment_method_last4: ActiveValue::Set(update.payment_method_last4),
            };
            subscriptions::Entity::insert(model)
                .on_conflict(
                    OnConflict::column(subscriptions::Column::CustomerId)
                        .update_columns([
                            subscriptions::Column::SubscriptionId,
                            subscriptions::Column::Status,
                            subscriptions::Column::PriceId,
                            subscriptions::Column::CurrentPeriodStart,
                            subscriptions::Column::CurrentPeriodEnd,
                            subscriptions::Column::CancelAtPeriodEnd,
                            subscriptions::Column::PaymentMethodBrand,
                            subscriptions::Column::PaymentMethodLast4,
                        ])
                        .to_owned(),
                )
                .exec(&db_tx)
                .await?;
            Ok(())
        })?;

        tracing::info!(customer_id, "subscription updated");
        Ok(())
    }

    /// The user's subscription with its plan name, if the user has one.
    pub async fn subscription_summary(
        &self,
        user_id: &str,
    ) -> ResultEngine<Option<SubscriptionSummary>> {
        let Some(customer) = billing_customers::Entity::find_by_id(user_id.to_string())
            .one(&self.database)
            .await?
        else {
            return Ok(None);
        };
        let subscription = subscriptions::Entity::find_by_id(customer.customer_id.clone())
            .one(&self.database)
            .await?;

        Ok(subscription.map(|model| SubscriptionSummary {
            plan_name: plan_name_for(model.price_id.as_deref()),
            customer_id: model.customer_id,
            subscription_id: model.subscription_id,
            status: SubscriptionStatus::from(model.status),
            price_id: model.price_id,
            current_period_start: model.current_period_start,
            current_period_end: model.current_period_end,
            cancel_at_period_end: model.cancel_at_period_end,
            payment_method_brand: model.payment_method_brand,
            payment_method_last4: model.payment_method_last4,
        }))
    }

    /// Trial countdown and access flags for the profile page.
    ///
    /// Unlike the resolver this surfaces lookup errors; `None` means the user
    /// has no profile.
    pub async fn trial_status(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> ResultEngine<Option<TrialStatus>> {
        let Some(profile) = self.get_profile(user_id).await? else {
            return Ok(None);
        };
        let is_subscription_active = match self.get_billing_customer(user_id).await? {
            Some(customer) => self
                .get_subscription(&customer.customer_id)
                .await?
                .is_some_and(|subscription| subscription.status.grants_access()),
            None => false,
        };
        let trial_ends_at = parse_trial_end(&profile.trial_ends_at)?;

        Ok(Some(TrialStatus::compute(
            trial_ends_at,
            profile.is_admin,
            is_subscription_active,
            now,
        )))
    }
}
