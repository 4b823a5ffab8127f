use uuid::Uuid;
use warp::{reply, Filter, Rejection, Reply};

use super::models::{ListParams, UserResponse};
use super::{with_state, AppState};
use crate::error::Error;
use crate::meetings::Id;

pub(super) fn routes(
    state: AppState,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let list = warp::get()
        .and(warp::path!("api" / "users"))
        .and(warp::query::<ListParams>())
        .and(with_state(state.clone()))
        .and_then(list);

    let get = warp::get()
        .and(warp::path!("api" / "users" / Uuid))
        .and(with_state(state))
        .and_then(get);

    list.or(get)
}

async fn list(params: ListParams, state: AppState) -> Result<impl Reply, Rejection> {
    let users = state.store.list_users(&params.page()).await?;
    let body: Vec<UserResponse> = users.iter().map(UserResponse::from).collect();
    Ok(reply::json(&body))
}

async fn get(id: Uuid, state: AppState) -> Result<impl Reply, Rejection> {
    let user = state
        .store
        .find_user(&Id(id))
        .await?
        .ok_or_else(|| Error::not_found("user"))?;
    Ok(reply::json(&UserResponse::from(&user)))
}
