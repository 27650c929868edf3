//! Session gate for protected routes.
//!
//! A [`Gate`] is the per-view state machine:
//!
//! ```text
//! Init -> CheckingSession -> Unauthenticated
//!                         -> CheckingEntitlement -> Granted | Denied
//! ```
//!
//! Every non-terminal state renders as [`GateOutcome::Loading`], so protected
//! content is never shown before both checks settle. A session event puts the
//! gate back into `CheckingSession` from any state.
//!
//! [`spawn_gate`] runs a gate for as long as its [`GateHandle`] lives.

use std::sync::Arc;

use tokio::{sync::watch, task::JoinHandle};

use crate::{
    AccountStore, Entitlement, EntitlementResolver, Session, SessionSource, SessionSubscription,
};

pub const LOGIN_ROUTE: &str = "/login";
pub const FALLBACK_ROUTE: &str = "/profile";

/// Where a gate sends users it turns away.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GateRoutes {
    pub login: String,
    /// The billing/profile page. Never redirected away from.
    pub fallback: String,
}

impl Default for GateRoutes {
    fn default() -> Self {
        Self {
            login: LOGIN_ROUTE.to_string(),
            fallback: FALLBACK_ROUTE.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateState {
    Init,
    CheckingSession,
    Unauthenticated,
    CheckingEntitlement { user_id: String },
    Granted,
    Denied,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateOutcome {
    Loading,
    RedirectToLogin(String),
    RedirectToFallback(String),
    Render,
}

#[derive(Clone, Debug)]
pub struct Gate {
    route: String,
    routes: GateRoutes,
    state: GateState,
}

impl Gate {
    pub fn new(route: impl Into<String>) -> Self {
        Self::with_routes(route, GateRoutes::default())
    }

    pub fn with_routes(route: impl Into<String>, routes: GateRoutes) -> Self {
        Self {
            route: route.into(),
            routes,
            state: GateState::Init,
        }
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn state(&self) -> &GateState {
        &self.state
    }

    /// Enter `CheckingSession`. Valid from any state.
    pub fn begin(&mut self) {
        self.state = GateState::CheckingSession;
    }

    /// Record the session check. Returns the user to resolve, if any.
    ///
    /// Ignored unless the gate is in `CheckingSession`.
    pub fn session_checked(&mut self, session: Option<&Session>) -> Option<String> {
        if self.state != GateState::CheckingSession {
            tracing::trace!(route = %self.route, state = ?self.state, "stale session result dropped");
            return None;
        }
        match session {
            Some(session) => {
                self.state = GateState::CheckingEntitlement {
                    user_id: session.user_id.clone(),
                };
                Some(session.user_id.clone())
            }
            None => {
                self.state = GateState::Unauthenticated;
                None
            }
        }
    }

    /// Record the entitlement check for `user_id`.
    ///
    /// Ignored unless the gate is waiting on that same user.
    pub fn entitlement_checked(&mut self, user_id: &str, entitlement: Entitlement) {
        let awaited = matches!(
            &self.state,
            GateState::CheckingEntitlement { user_id: pending } if pending == user_id
        );
        if !awaited {
            tracing::trace!(route = %self.route, state = ?self.state, "stale entitlement result dropped");
            return;
        }
        self.state = if entitlement.has_access {
            GateState::Granted
        } else {
            GateState::Denied
        };
    }

    pub fn outcome(&self) -> GateOutcome {
        match self.state {
            GateState::Init | GateState::CheckingSession | GateState::CheckingEntitlement { .. } => {
                GateOutcome::Loading
            }
            GateState::Unauthenticated => GateOutcome::RedirectToLogin(self.routes.login.clone()),
            GateState::Denied if self.route != self.routes.fallback => {
                GateOutcome::RedirectToFallback(self.routes.fallback.clone())
            }
            GateState::Denied | GateState::Granted => GateOutcome::Render,
        }
    }

    /// Run one full check cycle and return the settled outcome.
    ///
    /// A session lookup error counts as no session.
    pub async fn evaluate<Src, S>(
        &mut self,
        sessions: &Src,
        resolver: &EntitlementResolver<S>,
    ) -> GateOutcome
    where
        Src: SessionSource + ?Sized,
        S: AccountStore,
    {
        self.begin();
        let session = match sessions.current_session().await {
            Ok(session) => session,
            Err(err) => {
                tracing::warn!(route = %self.route, "session lookup failed: {err}");
                None
            }
        };

        if let Some(user_id) = self.session_checked(session.as_ref()) {
            let entitlement = resolver.resolve(&user_id).await;
            self.entitlement_checked(&user_id, entitlement);
        }

        let outcome = self.outcome();
        tracing::debug!(route = %self.route, ?outcome, "gate settled");
        outcome
    }
}

/// A running gate. Dropping the handle stops the gate and releases its
/// session subscription.
#[derive(Debug)]
pub struct GateHandle {
    outcome: watch::Receiver<GateOutcome>,
    task: JoinHandle<()>,
}

impl GateHandle {
    /// The latest published outcome.
    pub fn outcome(&self) -> GateOutcome {
        self.outcome.borrow().clone()
    }

    /// Wait for the next outcome change. `None` once the gate has stopped.
    pub async fn changed(&mut self) -> Option<GateOutcome> {
        self.outcome.changed().await.ok()?;
        Some(self.outcome.borrow_and_update().clone())
    }

    /// Wait until the gate publishes something other than `Loading`.
    pub async fn settled(&mut self) -> Option<GateOutcome> {
        let outcome = self
            .outcome
            .wait_for(|outcome| *outcome != GateOutcome::Loading)
            .await
            .ok()?;
        Some(outcome.clone())
    }
}

impl Drop for GateHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn publish(sender: &watch::Sender<GateOutcome>, outcome: GateOutcome) {
    sender.send_if_modified(|current| {
        if *current == outcome {
            return false;
        }
        *current = outcome;
        true
    });
}

/// Mount `gate`: check now, then re-check on every session event.
///
/// An event that arrives mid-check drops the in-flight check; its result is
/// never published. Once the hub closes the current check still runs to the
/// end and is published, then the task stops. It also stops when the handle
/// is dropped.
pub fn spawn_gate<Src, S>(
    mut gate: Gate,
    sessions: Src,
    resolver: Arc<EntitlementResolver<S>>,
    mut subscription: SessionSubscription,
) -> GateHandle
where
    Src: SessionSource + 'static,
    S: AccountStore + 'static,
{
    let (sender, outcome) = watch::channel(GateOutcome::Loading);

    let task = tokio::spawn(async move {
        let route = gate.route().to_string();
        let mut listening = true;
        loop {
            publish(&sender, GateOutcome::Loading);

            let settled = tokio::select! {
                outcome = gate.evaluate(&sessions, &*resolver) => Some(outcome),
                event = subscription.recv(), if listening => {
                    match event {
                        Some(event) => {
                            tracing::debug!(%route, ?event, "check restarted by session event");
                        }
                        None => {
                            tracing::debug!(%route, "session hub closed, finishing last check");
                            listening = false;
                        }
                    }
                    None
                }
            };

            let Some(outcome) = settled else {
                continue;
            };
            if sender.is_closed() {
                return;
            }
            publish(&sender, outcome);
            if !listening {
                return;
            }

            match subscription.recv().await {
                Some(event) => tracing::debug!(%route, ?event, "session changed"),
                None => return,
            }
        }
    });

    GateHandle { outcome, task }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::AccessReason;

    fn session(user_id: &str) -> Session {
        Session {
            token: "token".to_string(),
            user_id: user_id.to_string(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
        }
    }

    fn entitlement(has_access: bool) -> Entitlement {
        Entitlement {
            has_access,
            reason: if has_access {
                AccessReason::Trial
            } else {
                AccessReason::TrialExpired
            },
        }
    }

    fn settle(route: &str, user: Option<&str>, has_access: bool) -> GateOutcome {
        let mut gate = Gate::new(route);
        gate.begin();
        let session = user.map(session);
        if let Some(user_id) = gate.session_checked(session.as_ref()) {
            gate.entitlement_checked(&user_id, entitlement(has_access));
        }
        gate.outcome()
    }

    #[test]
    fn pending_states_render_loading() {
        let mut gate = Gate::new("/dashboard");
        assert_eq!(gate.outcome(), GateOutcome::Loading);
        gate.begin();
        assert_eq!(gate.outcome(), GateOutcome::Loading);
        gate.session_checked(Some(&session("alice")));
        assert_eq!(
            gate.state(),
            &GateState::CheckingEntitlement {
                user_id: "alice".to_string()
            }
        );
        assert_eq!(gate.outcome(), GateOutcome::Loading);
    }

    #[test]
    fn unauthenticated_redirects_to_login() {
        assert_eq!(
            settle("/dashboard", None, true),
            GateOutcome::RedirectToLogin("/login".to_string())
        );
        assert_eq!(
            settle("/profile", None, true),
            GateOutcome::RedirectToLogin("/login".to_string())
        );
    }

    #[test]
    fn denied_redirects_to_fallback() {
        assert_eq!(
            settle("/dashboard", Some("alice"), false),
            GateOutcome::RedirectToFallback("/profile".to_string())
        );
    }

    #[test]
    fn denied_on_fallback_renders() {
        assert_eq!(settle("/profile", Some("alice"), false), GateOutcome::Render);
    }

    #[test]
    fn granted_renders() {
        assert_eq!(settle("/dashboard", Some("alice"), true), GateOutcome::Render);
    }

    #[test]
    fn custom_routes_are_honored() {
        let routes = GateRoutes {
            login: "/sign-in".to_string(),
            fallback: "/billing".to_string(),
        };
        let mut gate = Gate::with_routes("/billing", routes);
        gate.begin();
        let user = gate.session_checked(Some(&session("alice")));
        gate.entitlement_checked(user.as_deref().unwrap_or_default(), entitlement(false));
        assert_eq!(gate.outcome(), GateOutcome::Render);
    }

    #[test]
    fn stale_results_are_ignored() {
        let mut gate = Gate::new("/dashboard");
        gate.begin();
        gate.session_checked(Some(&session("alice")));

        // A session event restarts the check before alice's entitlement lands.
        gate.begin();
        gate.entitlement_checked("alice", entitlement(true));
        assert_eq!(gate.state(), &GateState::CheckingSession);

        gate.session_checked(Some(&session("bob")));
        gate.entitlement_checked("alice", entitlement(true));
        assert_eq!(gate.outcome(), GateOutcome::Loading);

        gate.entitlement_checked("bob", entitlement(false));
        assert_eq!(gate.state(), &GateState::Denied);

        // Already settled: a late session result changes nothing.
        assert_eq!(gate.session_checked(None), None);
        assert_eq!(gate.state(), &GateState::Denied);
    }

    #[test]
    fn begin_reenters_from_terminal_states() {
        let mut gate = Gate::new("/dashboard");
        gate.begin();
        gate.session_checked(None);
        assert_eq!(gate.state(), &GateState::Unauthenticated);
        gate.begin();
        assert_eq!(gate.state(), &GateState::CheckingSession);
        assert_eq!(gate.outcome(), GateOutcome::Loading);
    }
}
