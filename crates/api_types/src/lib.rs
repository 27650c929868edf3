use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod auth {
    use super::*;

    /// Request body for creating an account.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct RegisterUser {
        pub username: String,
        pub password: String,
        pub full_name: Option<String>,
    }

    /// A bearer token and when it stops working.
    ///
    /// Send it back as `Authorization: Bearer <token>`.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct SessionToken {
        pub token: String,
        pub user_id: String,
        /// RFC3339 timestamp (UTC).
        pub expires_at: DateTime<Utc>,
    }
}

pub mod access {
    use super::*;

    /// Why access was granted or denied.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum AccessReasonView {
        Admin,
        Subscription,
        Trial,
        TrialExpired,
        MissingProfile,
        LookupFailed,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct AccessView {
        pub has_access: bool,
        pub reason: AccessReasonView,
    }
}

pub mod account {
    use super::*;

    /// Profile fields are empty when the user has no profile row, and
    /// `trial` is `None` when the stored trial end cannot be read.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct ProfileView {
        pub user_id: String,
        pub full_name: Option<String>,
        pub is_admin: bool,
        pub created_at: Option<DateTime<Utc>>,
        pub trial: Option<TrialStatusView>,
        pub subscription: Option<SubscriptionView>,
    }

    /// Trial countdown. The remaining fields are zero once the trial is over.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct TrialStatusView {
        pub is_trial_active: bool,
        pub is_subscription_active: bool,
        pub is_admin: bool,
        pub has_access: bool,
        pub days_remaining: i64,
        pub hours_remaining: i64,
        pub minutes_remaining: i64,
        pub trial_ends_at: DateTime<Utc>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct SubscriptionView {
        pub customer_id: String,
        pub subscription_id: Option<String>,
        /// Provider status string, e.g. `active` or `past_due`.
        pub status: String,
        pub plan_name: Option<String>,
        pub price_id: Option<String>,
        /// Unix seconds.
        pub current_period_start: Option<i64>,
        /// Unix seconds.
        pub current_period_end: Option<i64>,
        pub cancel_at_period_end: bool,
        pub payment_method_brand: Option<String>,
        pub payment_method_last4: Option<String>,
        pub is_active: bool,
        pub is_trialing: bool,
        /// The catalogue entry for `price_id`, if it is one.
        pub plan: Option<super::plans::PlanView>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct DashboardView {
        pub user_id: String,
        pub full_name: Option<String>,
    }
}

pub mod plans {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum PlanMode {
        Subscription,
        Payment,
    }

    /// A purchasable plan. `price_minor` is in minor units of `currency`.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct PlanView {
        pub name: String,
        pub description: String,
        pub product_id: String,
        pub price_id: String,
        pub price_minor: i64,
        /// Lowercase ISO 4217 code.
        pub currency: String,
        /// Display symbol for `currency`, e.g. `R$`.
        pub currency_symbol: String,
        pub mode: PlanMode,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct PlansResponse {
        pub plans: Vec<PlanView>,
    }
}
