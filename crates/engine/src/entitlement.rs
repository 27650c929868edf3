//! Entitlement resolution.
//!
//! [`EntitlementResolver`] answers one question: may this user see protected
//! content right now? The answer is recomputed from the stores on every call
//! and never cached.
//!
//! Rules, first match wins:
//!
//! 1. no profile row: [`AccessPolicy::missing_profile`]
//! 2. admin profile: granted
//! 3. billing customer with an `active` subscription: granted
//! 4. otherwise granted iff `trial_ends_at > now`
//!
//! Any lookup failure, including a `trial_ends_at` that cannot be parsed,
//! yields [`AccessPolicy::lookup_failure`] instead of an error.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ResultEngine, SubscriptionStatus, trial::parse_trial_end};

/// The fields of a profile the resolver reads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProfileRecord {
    pub id: String,
    pub is_admin: bool,
    /// ISO 8601 text as stored.
    pub trial_ends_at: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BillingCustomerRecord {
    pub customer_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionRecord {
    pub status: SubscriptionStatus,
}

/// Read access to the three tables entitlement depends on.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get_profile(&self, user_id: &str) -> ResultEngine<Option<ProfileRecord>>;

    async fn get_billing_customer(
        &self,
        user_id: &str,
    ) -> ResultEngine<Option<BillingCustomerRecord>>;

    async fn get_subscription(&self, customer_id: &str)
    -> ResultEngine<Option<SubscriptionRecord>>;
}

#[async_trait]
impl<T: AccountStore + ?Sized> AccountStore for Arc<T> {
    async fn get_profile(&self, user_id: &str) -> ResultEngine<Option<ProfileRecord>> {
        (**self).get_profile(user_id).await
    }

    async fn get_billing_customer(
        &self,
        user_id: &str,
    ) -> ResultEngine<Option<BillingCustomerRecord>> {
        (**self).get_billing_customer(user_id).await
    }

    async fn get_subscription(
        &self,
        customer_id: &str,
    ) -> ResultEngine<Option<SubscriptionRecord>> {
        (**self).get_subscription(customer_id).await
    }
}

/// What to answer when a check cannot be completed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Fail open: let the user in.
    #[default]
    Grant,
    /// Fail closed: send the user to the fallback page.
    Deny,
}

impl FailureMode {
    pub fn grants(self) -> bool {
        matches!(self, Self::Grant)
    }
}

/// How the resolver treats users it cannot fully evaluate.
///
/// The default grants access in both cases, so a backend hiccup never locks
/// a paying user out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessPolicy {
    /// Applied when the user has no profile row.
    pub missing_profile: FailureMode,
    /// Applied when any lookup fails or returns a malformed row.
    pub lookup_failure: FailureMode,
}

impl AccessPolicy {
    pub const FAIL_OPEN: Self = Self {
        missing_profile: FailureMode::Grant,
        lookup_failure: FailureMode::Grant,
    };

    pub const FAIL_CLOSED: Self = Self {
        missing_profile: FailureMode::Deny,
        lookup_failure: FailureMode::Deny,
    };
}

/// Which rule produced an [`Entitlement`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessReason {
    Admin,
    Subscription,
    Trial,
    TrialExpired,
    MissingProfile,
    LookupFailed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlement {
    pub has_access: bool,
    pub reason: AccessReason,
}

impl Entitlement {
    fn granted(reason: AccessReason) -> Self {
        Self {
            has_access: true,
            reason,
        }
    }

    fn denied(reason: AccessReason) -> Self {
        Self {
            has_access: false,
            reason,
        }
    }

    fn by_policy(mode: FailureMode, reason: AccessReason) -> Self {
        Self {
            has_access: mode.grants(),
            reason,
        }
    }
}

#[derive(Debug)]
pub struct EntitlementResolver<S> {
    store: S,
    policy: AccessPolicy,
}

impl<S: AccountStore> EntitlementResolver<S> {
    pub fn new(store: S) -> Self {
        Self::with_policy(store, AccessPolicy::default())
    }

    pub fn with_policy(store: S, policy: AccessPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> AccessPolicy {
        self.policy
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Resolve against the current wall clock.
    pub async fn resolve(&self, user_id: &str) -> Entitlement {
        self.resolve_at(user_id, Utc::now()).await
    }

    /// Resolve as of `now`. Never fails: lookup errors are logged and mapped
    /// through the policy.
    pub async fn resolve_at(&self, user_id: &str, now: DateTime<Utc>) -> Entitlement {
        let entitlement = match self.decide(user_id, now).await {
            Ok(entitlement) => entitlement,
            Err(err) => {
                tracing::warn!(user_id, "entitlement lookup failed: {err}");
                Entitlement::by_policy(self.policy.lookup_failure, AccessReason::LookupFailed)
            }
        };
        tracing::debug!(
            user_id,
            has_access = entitlement.has_access,
            reason = ?entitlement.reason,
            "entitlement resolved"
        );
        entitlement
    }

    async fn decide(&self, user_id: &str, now: DateTime<Utc>) -> ResultEngine<Entitlement> {
        let Some(profile) = self.store.get_profile(user_id).await? else {
            return Ok(Entitlement::by_policy(
                self.policy.missing_profile,
                AccessReason::MissingProfile,
            ));
        };

        if profile.is_admin {
            return Ok(Entitlement::granted(AccessReason::Admin));
        }

        // The subscription is keyed by customer id, so these two stay sequential.
        if let Some(customer) = self.store.get_billing_customer(user_id).await? {
            let active = self
                .store
                .get_subscription(&customer.customer_id)
                .await?
                .is_some_and(|subscription| subscription.status.grants_access());
            if active {
                return Ok(Entitlement::granted(AccessReason::Subscription));
            }
        }

        let trial_ends_at = parse_trial_end(&profile.trial_ends_at)?;
        if trial_ends_at > now {
            Ok(Entitlement::granted(AccessReason::Trial))
        } else {
            Ok(Entitlement::denied(AccessReason::TrialExpired))
        }
    }
}
