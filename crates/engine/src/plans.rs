//! Catalogue of the plans users can buy.

use serde::{Deserialize, Serialize};

use crate::SubscriptionStatus;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanMode {
    Subscription,
    Payment,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub product_id: &'static str,
    pub price_id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    /// Price in minor units of `currency`.
    pub price_minor: i64,
    pub currency: &'static str,
    pub currency_symbol: &'static str,
    pub mode: PlanMode,
}

pub const CATALOG: &[Plan] = &[Plan {
    product_id: "prod_TEF3VU2muH1DlR",
    price_id: "price_1SHmZMEtRKYSN4c1nsPg51FI",
    name: "Control Tips - All Green",
    description: "Full access to the bankroll tracker with every premium feature for professional bet management.",
    price_minor: 1999,
    currency: "brl",
    currency_symbol: "R$",
    mode: PlanMode::Subscription,
}];

/// Shown when a subscription references a price missing from [`CATALOG`].
pub const UNKNOWN_PLAN_NAME: &str = "Unknown Plan";

pub fn plan_by_price_id(price_id: &str) -> Option<&'static Plan> {
    CATALOG.iter().find(|plan| plan.price_id == price_id)
}

/// A user's subscription as shown on the subscription page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SubscriptionSummary {
    pub customer_id: String,
    pub subscription_id: Option<String>,
    pub status: SubscriptionStatus,
    pub price_id: Option<String>,
    /// `None` when the row has no price, [`UNKNOWN_PLAN_NAME`] when the price
    /// is not in the catalogue.
    pub plan_name: Option<String>,
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
    pub cancel_at_period_end: bool,
    pub payment_method_brand: Option<String>,
    pub payment_method_last4: Option<String>,
}

impl SubscriptionSummary {
    pub fn is_active(&self) -> bool {
        self.status.grants_access()
    }

    pub fn is_trialing(&self) -> bool {
        self.status == SubscriptionStatus::Trialing
    }

    pub fn plan(&self) -> Option<&'static Plan> {
        self.price_id.as_deref().and_then(plan_by_price_id)
    }
}

pub(crate) fn plan_name_for(price_id: Option<&str>) -> Option<String> {
    price_id.map(|price_id| {
        plan_by_price_id(price_id)
            .map(|plan| plan.name)
            .unwrap_or(UNKNOWN_PLAN_NAME)
            .to_string()
    })
}
