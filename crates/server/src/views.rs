//! Protected pages. Every handler here sits behind the gate middleware, so a
//! session is always present.

use api_types::{
    account::{DashboardView, ProfileView, SubscriptionView, TrialStatusView},
    plans::{PlanMode as PlanModeView, PlanView, PlansResponse},
};
use axum::{Extension, Json, extract::State};
use chrono::Utc;
use engine::{
    EngineError, PlanMode, Session, SubscriptionSummary, TrialStatus,
    plans::{CATALOG, Plan},
};

use crate::{ServerError, server::ServerState};

fn trial_view(status: TrialStatus) -> TrialStatusView {
    TrialStatusView {
        is_trial_active: status.is_trial_active,
        is_subscription_active: status.is_subscription_active,
        is_admin: status.is_admin,
        has_access: status.has_access,
        days_remaining: status.days_remaining,
        hours_remaining: status.hours_remaining,
        minutes_remaining: status.minutes_remaining,
        trial_ends_at: status.trial_ends_at,
    }
}

fn subscription_view(summary: SubscriptionSummary) -> SubscriptionView {
    SubscriptionView {
        is_active: summary.is_active(),
        is_trialing: summary.is_trialing(),
        plan: summary.plan().map(plan_view),
        status: summary.status.as_str().to_string(),
        customer_id: summary.customer_id,
        subscription_id: summary.subscription_id,
        plan_name: summary.plan_name,
        price_id: summary.price_id,
        current_period_start: summary.current_period_start,
        current_period_end: summary.current_period_end,
        cancel_at_period_end: summary.cancel_at_period_end,
        payment_method_brand: summary.payment_method_brand,
        payment_method_last4: summary.payment_method_last4,
    }
}

fn plan_view(plan: &Plan) -> PlanView {
    PlanView {
        name: plan.name.to_string(),
        description: plan.description.to_string(),
        product_id: plan.product_id.to_string(),
        price_id: plan.price_id.to_string(),
        price_minor: plan.price_minor,
        currency: plan.currency.to_string(),
        currency_symbol: plan.currency_symbol.to_string(),
        mode: match plan.mode {
            PlanMode::Subscription => PlanModeView::Subscription,
            PlanMode::Payment => PlanModeView::Payment,
        },
    }
}

pub async fn dashboard(
    Extension(session): Extension<Session>,
    State(state): State<ServerState>,
) -> Result<Json<DashboardView>, ServerError> {
    let full_name = match state.engine.profile(&session.user_id).await {
        Ok(profile) => profile.full_name,
        // Access may have been granted without a profile.
        Err(EngineError::KeyNotFound(_)) => None,
        Err(err) => return Err(err.into()),
    };

    Ok(Json(DashboardView {
        user_id: session.user_id,
        full_name,
    }))
}

/// The billing page. It is the gate's fallback, so it also renders for users
/// granted access without a profile or with an unreadable trial end.
pub async fn profile(
    Extension(session): Extension<Session>,
    State(state): State<ServerState>,
) -> Result<Json<ProfileView>, ServerError> {
    let profile = match state.engine.profile(&session.user_id).await {
        Ok(profile) => Some(profile),
        Err(EngineError::KeyNotFound(_)) => None,
        Err(err) => return Err(err.into()),
    };
    let trial = match state.engine.trial_status(&session.user_id, Utc::now()).await {
        Ok(trial) => trial,
        Err(EngineError::MalformedRow(reason)) => {
            tracing::warn!(user_id = %session.user_id, "trial status unavailable: {reason}");
            None
        }
        Err(err) => return Err(err.into()),
    };
    let subscription = state.engine.subscription_summary(&session.user_id).await?;

    Ok(Json(ProfileView {
        full_name: profile.as_ref().and_then(|profile| profile.full_name.clone()),
        is_admin: profile.as_ref().is_some_and(|profile| profile.is_admin),
        created_at: profile.map(|profile| profile.created_at),
        user_id: session.user_id,
        trial: trial.map(trial_view),
        subscription: subscription.map(subscription_view),
    }))
}

pub async fn subscription(
    Extension(session): Extension<Session>,
    State(state): State<ServerState>,
) -> Result<Json<SubscriptionView>, ServerError> {
    let summary = state
        .engine
        .subscription_summary(&session.user_id)
        .await?
        .ok_or_else(|| EngineError::KeyNotFound("subscription not exists".to_string()))?;
    Ok(Json(subscription_view(summary)))
}

pub async fn plans() -> Json<PlansResponse> {
    Json(PlansResponse {
        plans: CATALOG.iter().map(plan_view).collect(),
    })
}
