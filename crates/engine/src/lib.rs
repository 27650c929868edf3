//! Access control for the bankroll tracker.
//!
//! The crate owns the tables behind sign-in and billing, and the two pieces
//! every protected route goes through:
//!
//! - [`EntitlementResolver`], which decides whether a user may see protected
//!   content;
//! - [`Gate`], the per-view state machine that combines the current
//!   [`Session`] with that decision.
//!
//! [`Engine`] is the database-backed store and account API.

pub use auth::{Session, SessionEvent, SessionHub, SessionSource, SessionSubscription, TokenSession};
pub use entitlement::{
    AccessPolicy, AccessReason, AccountStore, BillingCustomerRecord, Entitlement,
    EntitlementResolver, FailureMode, ProfileRecord, SubscriptionRecord,
};
pub use error::EngineError;
pub use gate::{
    FALLBACK_ROUTE, Gate, GateHandle, GateOutcome, GateRoutes, GateState, LOGIN_ROUTE, spawn_gate,
};
pub use ops::{
    DEFAULT_SESSION_TTL_HOURS, DEFAULT_TRIAL_DAYS, Engine, EngineBuilder, SubscriptionUpdate,
};
pub use plans::{Plan, PlanMode, SubscriptionSummary};
pub use status::SubscriptionStatus;
pub use trial::TrialStatus;

pub mod billing_customers;
pub mod plans;
pub mod profiles;
pub mod sessions;
pub mod subscriptions;
pub mod trial;
pub mod users;

mod auth;
mod entitlement;
mod error;
mod gate;
mod ops;
mod status;
mod util;

type ResultEngine<T> = Result<T, EngineError>;
