use axum::{
    Router,
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Redirect, Response},
    routing::{delete, get, post},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use chrono::Utc;

use std::sync::Arc;

use crate::{ServerError, access, account, auth, views};
use engine::{AccessPolicy, Engine, EntitlementResolver, Gate, GateOutcome, Session};

pub(crate) type BearerHeader = TypedHeader<Authorization<Bearer>>;

#[derive(Clone)]
pub struct ServerState {
    pub engine: Arc<Engine>,
    pub resolver: Arc<EntitlementResolver<Arc<Engine>>>,
}

impl ServerState {
    pub fn new(engine: Arc<Engine>, policy: AccessPolicy) -> Self {
        let resolver = EntitlementResolver::with_policy(engine.clone(), policy);
        Self {
            engine,
            resolver: Arc::new(resolver),
        }
    }
}

/// Require a live bearer session and hand it to the handler as an extension.
async fn require_session(
    bearer: Option<BearerHeader>,
    State(state): State<ServerState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ServerError> {
    let Some(TypedHeader(Authorization(bearer))) = bearer else {
        return Err(ServerError::Unauthorized);
    };
    let session = state
        .engine
        .session(bearer.token(), Utc::now())
        .await?
        .ok_or(ServerError::Unauthorized)?;

    request.extensions_mut().insert(session);
    Ok(next.run(request).await)
}

/// Run the access gate for the requested path.
///
/// Every request is checked from scratch; nothing is cached between requests.
async fn gate(
    bearer: Option<BearerHeader>,
    State(state): State<ServerState>,
    mut request: Request,
    next: Next,
) -> Response {
    let session: Option<Session> = match bearer {
        Some(TypedHeader(Authorization(bearer))) => {
            match state.engine.session(bearer.token(), Utc::now()).await {
                Ok(session) => session,
                Err(err) => {
                    tracing::warn!("session lookup failed: {err}");
                    None
                }
            }
        }
        None => None,
    };

    let mut gate = Gate::new(request.uri().path());
    match gate.evaluate(&session, &*state.resolver).await {
        GateOutcome::Render => {
            if let Some(session) = session {
                request.extensions_mut().insert(session);
            }
            next.run(request).await
        }
        GateOutcome::RedirectToLogin(to) | GateOutcome::RedirectToFallback(to) => {
            Redirect::to(&to).into_response()
        }
        GateOutcome::Loading => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

pub fn router(state: ServerState) -> Router {
    let gated = Router::new()
        .route("/dashboard", get(views::dashboard))
        .route("/profile", get(views::profile))
        .route("/subscription", get(views::subscription))
        .route("/plans", get(views::plans))
        .route_layer(middleware::from_fn_with_state(state.clone(), gate));

    let authenticated = Router::new()
        .route("/auth/refresh", post(auth::refresh))
        .route("/account", delete(account::delete_account))
        .route("/access", get(access::get_access))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ));

    Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/session", post(auth::sign_in).delete(auth::sign_out))
        .route("/auth/admin-session", post(auth::admin_sign_in))
        .merge(authenticated)
        .merge(gated)
        .with_state(state)
}

pub async fn run(state: ServerState, bind: &str, port: u16) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind((bind, port)).await?;
    run_with_listener(state, listener).await
}

pub async fn run_with_listener(
    state: ServerState,
    listener: tokio::net::TcpListener,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, router(state)).await
}

pub fn spawn_with_listener(
    state: ServerState,
    listener: tokio::net::TcpListener,
) -> Result<std::net::SocketAddr, std::io::Error> {
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        if let Err(err) = run_with_listener(state, listener).await {
            tracing::error!("server failed: {err}");
        }
    });

    Ok(addr)
}
