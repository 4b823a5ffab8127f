pub mod models;

mod auth_api;
mod poll_api;
mod user_api;
mod workshop_api;

use std::convert::Infallible;
use std::sync::Arc;

use chrono::Utc;
use warp::{Filter, Rejection, Reply};

use crate::auth::Sessions;
use crate::config::Config;
use crate::error::{self, Error};
use crate::meetings::Id;
use crate::notify::Notifier;
use crate::store::Store;

/// Shared collaborators handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub notifier: Arc<dyn Notifier>,
    pub sessions: Sessions,
    pub config: Arc<Config>,
}

/// Bounded retries for the optimistic read-modify-write loops on polls.
pub(crate) const CAS_RETRIES: usize = 4;

pub fn routes(state: AppState) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    auth_api::routes(state.clone())
        .or(user_api::routes(state.clone()))
        .or(poll_api::routes(state.clone()))
        .or(workshop_api::routes(state))
        .recover(error::handle_rejection)
}

fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// Resolves the `x-token` header to a user id through the session registry.
fn authenticated(state: AppState) -> impl Filter<Extract = (Id,), Error = Rejection> + Clone {
    warp::header::optional::<String>("x-token")
        .and(with_state(state))
        .and_then(|token: Option<String>, state: AppState| async move {
            token
                .and_then(|t| state.sessions.resolve(&t, Utc::now()))
                .ok_or_else(|| Rejection::from(Error::Unauthorized))
        })
}
