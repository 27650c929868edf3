use api_types::access::{AccessReasonView, AccessView};
use axum::{Extension, Json, extract::State};
use engine::{AccessReason, Entitlement, Session};

use crate::server::ServerState;

fn reason_view(reason: AccessReason) -> AccessReasonView {
    match reason {
        AccessReason::Admin => AccessReasonView::Admin,
        AccessReason::Subscription => AccessReasonView::Subscription,
        AccessReason::Trial => AccessReasonView::Trial,
        AccessReason::TrialExpired => AccessReasonView::TrialExpired,
        AccessReason::MissingProfile => AccessReasonView::MissingProfile,
        AccessReason::LookupFailed => AccessReasonView::LookupFailed,
    }
}

fn access_view(entitlement: Entitlement) -> AccessView {
    AccessView {
        has_access: entitlement.has_access,
        reason: reason_view(entitlement.reason),
    }
}

/// The entitlement decision for the signed-in user. Never fails; lookup
/// errors are folded into the decision by the access policy.
pub async fn get_access(
    Extension(session): Extension<Session>,
    State(state): State<ServerState>,
) -> Json<AccessView> {
    let entitlement = state.resolver.resolve(&session.user_id).await;
    Json(access_view(entitlement))
}
