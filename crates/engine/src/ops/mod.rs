use chrono::{DateTime, Duration, Utc};
use sea_orm::DatabaseConnection;

use crate::{EngineError, ResultEngine, SessionHub};

mod accounts;
mod billing;
mod sessions;

pub use billing::SubscriptionUpdate;

/// Run a block inside a DB transaction, committing on success and rolling back on error.
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let $tx = $self.database.begin().await?;
        let result: $crate::ResultEngine<_> = $body;
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }};
}

pub(crate) use with_tx;

pub const DEFAULT_TRIAL_DAYS: i64 = 7;
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 24 * 7;

#[derive(Debug)]
pub struct Engine {
    database: DatabaseConnection,
    hub: SessionHub,
    trial_period: Duration,
    session_ttl: Duration,
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// The stream sign-in, sign-out and refresh events are published on.
    pub fn session_hub(&self) -> &SessionHub {
        &self.hub
    }

    pub fn trial_period(&self) -> Duration {
        self.trial_period
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    fn trial_end_from(&self, now: DateTime<Utc>) -> ResultEngine<DateTime<Utc>> {
        now.checked_add_signed(self.trial_period).ok_or_else(|| {
            EngineError::InvalidInput("trial end is out of range".to_string())
        })
    }

    fn session_expiry_from(&self, now: DateTime<Utc>) -> ResultEngine<DateTime<Utc>> {
        now.checked_add_signed(self.session_ttl).ok_or_else(|| {
            EngineError::InvalidInput("session expiry is out of range".to_string())
        })
    }
}

/// The builder for `Engine`
pub struct EngineBuilder {
    database: DatabaseConnection,
    hub: SessionHub,
    trial_days: i64,
    session_ttl_hours: i64,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            database: DatabaseConnection::default(),
            hub: SessionHub::default(),
            trial_days: DEFAULT_TRIAL_DAYS,
            session_ttl_hours: DEFAULT_SESSION_TTL_HOURS,
        }
    }
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = db;
        self
    }

    /// Share an existing hub instead of creating one.
    pub fn session_hub(mut self, hub: SessionHub) -> EngineBuilder {
        self.hub = hub;
        self
    }

    /// Length of the free trial granted at registration.
    pub fn trial_days(mut self, days: i64) -> EngineBuilder {
        self.trial_days = days;
        self
    }

    pub fn session_ttl_hours(mut self, hours: i64) -> EngineBuilder {
        self.session_ttl_hours = hours;
        self
    }

    /// Construct `Engine`
    pub async fn build(self) -> ResultEngine<Engine> {
        if self.trial_days < 0 {
            return Err(EngineError::InvalidInput(
                "trial days must be >= 0".to_string(),
            ));
        }
        if self.session_ttl_hours <= 0 {
            return Err(EngineError::InvalidInput(
                "session ttl must be > 0".to_string(),
            ));
        }

        let trial_period = Duration::try_days(self.trial_days)
            .ok_or_else(|| EngineError::InvalidInput("trial days out of range".to_string()))?;
        let session_ttl = Duration::try_hours(self.session_ttl_hours)
            .ok_or_else(|| EngineError::InvalidInput("session ttl out of range".to_string()))?;

        Ok(Engine {
            database: self.database,
            hub: self.hub,
            trial_period,
            session_ttl,
        })
    }
}
