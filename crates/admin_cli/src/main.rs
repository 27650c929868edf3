use std::{error::Error, io::Write, sync::Arc};

use chrono::{Duration, Utc};
use clap::{Args, Parser, Subcommand};
use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    style::Print,
    terminal,
    terminal::ClearType,
};
use engine::{Engine, EngineError, EntitlementResolver, SubscriptionUpdate, trial::parse_trial_end};
use migration::MigratorTrait;
use sea_orm::{Database, DatabaseConnection};

#[derive(Parser, Debug)]
#[command(name = "bankroll_admin")]
#[command(about = "Admin utilities for Bankroll (users, trials, billing records)")]
struct Cli {
    /// Database connection string (also read from `DATABASE_URL`).
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "sqlite:./bankroll.db?mode=rwc"
    )]
    database_url: String,

    /// Trial length for newly created users.
    #[arg(long, default_value_t = engine::DEFAULT_TRIAL_DAYS)]
    trial_days: i64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    User(User),
    Trial(Trial),
    Billing(Billing),
    /// Explain whether a user can see protected pages.
    Access(UserArg),
    /// Remove expired sessions.
    PurgeSessions,
}

#[derive(Args, Debug)]
struct UserArg {
    #[arg(long)]
    username: String,
}

#[derive(Args, Debug)]
struct User {
    #[command(subcommand)]
    command: UserCommand,
}

#[derive(Subcommand, Debug)]
enum UserCommand {
    Create(UserCreateArgs),
    Delete(UserArg),
    /// Grant or revoke the admin flag.
    Admin(UserAdminArgs),
}

#[derive(Args, Debug)]
struct UserCreateArgs {
    #[arg(long)]
    username: String,
    #[arg(long)]
    full_name: Option<String>,
    #[arg(long)]
    admin: bool,
}

#[derive(Args, Debug)]
struct UserAdminArgs {
    #[arg(long)]
    username: String,
    #[arg(long)]
    revoke: bool,
}

#[derive(Args, Debug)]
struct Trial {
    #[command(subcommand)]
    command: TrialCommand,
}

#[derive(Subcommand, Debug)]
enum TrialCommand {
    /// Set the trial end (RFC 3339 timestamp or YYYY-MM-DD).
    Set(TrialSetArgs),
    /// Push the trial end forward, starting from now if it already passed.
    Extend(TrialExtendArgs),
}

#[derive(Args, Debug)]
struct TrialSetArgs {
    #[arg(long)]
    username: String,
    #[arg(long)]
    ends_at: String,
}

#[derive(Args, Debug)]
struct TrialExtendArgs {
    #[arg(long)]
    username: String,
    #[arg(long)]
    days: i64,
}

#[derive(Args, Debug)]
struct Billing {
    #[command(subcommand)]
    command: BillingCommand,
}

#[derive(Subcommand, Debug)]
enum BillingCommand {
    /// Link a user to a payment provider customer.
    Link(BillingLinkArgs),
    /// Record the provider's view of a customer's subscription.
    Subscription(SubscriptionArgs),
}

#[derive(Args, Debug)]
struct BillingLinkArgs {
    #[arg(long)]
    username: String,
    #[arg(long)]
    customer_id: String,
}

#[derive(Args, Debug)]
struct SubscriptionArgs {
    #[arg(long)]
    customer_id: String,
    #[arg(long)]
    status: String,
    #[arg(long)]
    subscription_id: Option<String>,
    #[arg(long)]
    price_id: Option<String>,
    /// Unix seconds.
    #[arg(long)]
    period_start: Option<i64>,
    /// Unix seconds.
    #[arg(long)]
    period_end: Option<i64>,
    #[arg(long)]
    cancel_at_period_end: bool,
}

struct RawModeGuard;

impl RawModeGuard {
    fn enter() -> Result<Self, Box<dyn Error + Send + Sync>> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

fn prompt_password(prompt: &str) -> Result<String, Box<dyn Error + Send + Sync>> {
    let _raw = RawModeGuard::enter()?;

    let mut out = std::io::stderr();
    execute!(
        out,
        cursor::MoveToColumn(0),
        terminal::Clear(ClearType::CurrentLine),
        Print(prompt)
    )?;
    out.flush()?;

    let mut buf = String::new();
    loop {
        let Event::Key(KeyEvent {
            code, modifiers, ..
        }) = event::read()?
        else {
            continue;
        };

        match code {
            KeyCode::Enter => {
                execute!(out, Print("\r\n"))?;
                out.flush()?;
                break;
            }
            KeyCode::Backspace => {
                if buf.pop().is_some() {
                    execute!(out, cursor::MoveLeft(1), Print(" "), cursor::MoveLeft(1))?;
                    out.flush()?;
                }
            }
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                execute!(out, Print("\r\n"))?;
                out.flush()?;
                return Err("interrupted".into());
            }
            KeyCode::Char(ch) if !modifiers.contains(KeyModifiers::CONTROL) => {
                buf.push(ch);
                execute!(out, Print("*"))?;
                out.flush()?;
            }
            _ => {}
        }
    }

    Ok(buf)
}

fn prompt_password_twice() -> Result<String, Box<dyn Error + Send + Sync>> {
    let mut out = std::io::stderr();
    for _ in 0..3 {
        let p1 = prompt_password("Password: ")?;
        if p1.is_empty() {
            execute!(
                out,
                cursor::MoveToColumn(0),
                terminal::Clear(ClearType::CurrentLine),
                Print("Password must not be empty.\r\n")
            )?;
            continue;
        }

        let p2 = prompt_password("Confirm password: ")?;
        if p1 == p2 {
            return Ok(p1);
        }

        execute!(
            out,
            cursor::MoveToColumn(0),
            terminal::Clear(ClearType::CurrentLine),
            Print("Passwords do not match. Try again.\r\n")
        )?;
    }

    Err("too many attempts".into())
}

async fn connect_db(
    database_url: &str,
) -> Result<DatabaseConnection, Box<dyn Error + Send + Sync>> {
    let db = Database::connect(database_url).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let cli = Cli::parse();

    let db = connect_db(&cli.database_url).await?;
    let engine = Engine::builder()
        .database(db)
        .trial_days(cli.trial_days)
        .build()
        .await?;
    let engine = Arc::new(engine);
    let now = Utc::now();

    match cli.command {
        Command::User(User { command }) => match command {
            UserCommand::Create(args) => {
                let password = prompt_password_twice()?;
                let username = engine
                    .register(&args.username, &password, args.full_name.as_deref(), now)
                    .await?;
                if args.admin {
                    engine.set_admin(&username, true).await?;
                }
                println!("created user: {username}");
            }
            UserCommand::Delete(args) => {
                engine.delete_account(&args.username).await?;
                println!("deleted user: {}", args.username);
            }
            UserCommand::Admin(args) => {
                engine.set_admin(&args.username, !args.revoke).await?;
                let verb = if args.revoke { "revoked" } else { "granted" };
                println!("admin {verb}: {}", args.username);
            }
        },
        Command::Trial(Trial { command }) => match command {
            TrialCommand::Set(args) => {
                let ends_at = parse_trial_end(&args.ends_at)?;
                engine.set_trial_end(&args.username, ends_at).await?;
                println!("trial of {} ends at {ends_at}", args.username);
            }
            TrialCommand::Extend(args) => {
                if args.days <= 0 {
                    eprintln!("days must be > 0");
                    std::process::exit(2);
                }
                let profile = engine.profile(&args.username).await?;
                let current = parse_trial_end(&profile.trial_ends_at)?;
                let ends_at = Duration::try_days(args.days)
                    .and_then(|extra| current.max(now).checked_add_signed(extra))
                    .ok_or_else(|| {
                        EngineError::InvalidInput(format!("cannot extend by {} days", args.days))
                    })?;
                engine.set_trial_end(&args.username, ends_at).await?;
                println!("trial of {} ends at {ends_at}", args.username);
            }
        },
        Command::Billing(Billing { command }) => match command {
            BillingCommand::Link(args) => {
                engine
                    .upsert_billing_customer(&args.username, &args.customer_id)
                    .await?;
                println!("linked {} to {}", args.username, args.customer_id);
            }
            BillingCommand::Subscription(args) => {
                let update = SubscriptionUpdate {
                    subscription_id: args.subscription_id,
                    status: args.status,
                    price_id: args.price_id,
                    current_period_start: args.period_start,
                    current_period_end: args.period_end,
                    cancel_at_period_end: args.cancel_at_period_end,
                    ..SubscriptionUpdate::default()
                };
                engine.upsert_subscription(&args.customer_id, update).await?;
                println!("subscription updated: {}", args.customer_id);
            }
        },
        Command::Access(args) => {
            let entitlement = EntitlementResolver::new(engine.clone())
                .resolve_at(&args.username, now)
                .await;
            println!(
                "access: {} ({:?})",
                if entitlement.has_access { "granted" } else { "denied" },
                entitlement.reason
            );
            match engine.trial_status(&args.username, now).await? {
                Some(trial) if trial.is_trial_active => println!(
                    "trial: {}d {}h {}m left (ends {})",
                    trial.days_remaining,
                    trial.hours_remaining,
                    trial.minutes_remaining,
                    trial.trial_ends_at
                ),
                Some(trial) => println!("trial: ended {}", trial.trial_ends_at),
                None => println!("trial: no profile"),
            }
            if let Some(summary) = engine.subscription_summary(&args.username).await? {
                println!(
                    "subscription: {} ({})",
                    summary.status,
                    summary.plan_name.as_deref().unwrap_or("no plan")
                );
            }
        }
        Command::PurgeSessions => {
            let purged = engine.purge_expired_sessions(now).await?;
            println!("purged sessions: {purged}");
        }
    }

    Ok(())
}
