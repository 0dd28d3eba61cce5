//! Auth Router

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tasks::TaskQueue;

use crate::domain::repository::UserDirectory;
use crate::presentation::handlers::{self, AuthAppState};
use crate::presentation::middleware::{AuthGateState, require_bearer};

/// Auth routes, to be nested under `/v1/auth`
///
/// `/me` sits behind the bearer gate; the rest are public.
pub fn auth_router<D, Q>(state: AuthAppState<D, Q>) -> Router
where
    D: UserDirectory + Send + Sync + 'static,
    Q: TaskQueue + Send + Sync + 'static,
{
    let gate = AuthGateState::new(state.verifier.clone());

    let protected = Router::new()
        .route(
            "/me",
            get(handlers::profile::<D, Q>).patch(handlers::update_profile::<D, Q>),
        )
        .route_layer(middleware::from_fn_with_state(gate, require_bearer));

    Router::new()
        .route("/sign-up", post(handlers::sign_up::<D, Q>))
        .route("/sign-in", post(handlers::sign_in::<D, Q>))
        .route("/verify-email", get(handlers::verify_email::<D, Q>))
        .merge(protected)
        .with_state(state)
}
