use chrono::Utc;
use uuid::Uuid;
use warp::http::StatusCode;
use warp::{reply, Filter, Rejection, Reply};

use super::models::{CreatePollRequest, ListParams, PollResponse, VoteRequest};
use super::{authenticated, with_state, AppState, CAS_RETRIES};
use crate::error::Error;
use crate::meetings::{Id, Poll, PollUpdate};

pub(super) fn routes(
    state: AppState,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let create = warp::post()
        .and(warp::path!("api" / "polls"))
        .and(authenticated(state.clone()))
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(create);

    let mine = warp::get()
        .and(warp::path!("api" / "polls" / "mine"))
        .and(authenticated(state.clone()))
        .and(warp::query::<ListParams>())
        .and(with_state(state.clone()))
        .and_then(list_mine);

    let list = warp::get()
        .and(warp::path!("api" / "polls"))
        .and(warp::query::<ListParams>())
        .and(with_state(state.clone()))
        .and_then(list);

    let get = warp::get()
        .and(warp::path!("api" / "polls" / Uuid))
        .and(with_state(state.clone()))
        .and_then(get);

    let update = warp::put()
        .and(warp::path!("api" / "polls" / Uuid))
        .and(authenticated(state.clone()))
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(update);

    let delete = warp::delete()
        .and(warp::path!("api" / "polls" / Uuid))
        .and(authenticated(state.clone()))
        .and(with_state(state.clone()))
        .and_then(delete);

    let vote = warp::post()
        .and(warp::path!("api" / "polls" / Uuid / "vote"))
        .and(authenticated(state.clone()))
        .and(warp::body::json())
        .and(with_state(state))
        .and_then(vote);

    create
        .or(mine)
        .or(list)
        .or(get)
        .or(update)
        .or(delete)
        .or(vote)
}

async fn create(user: Id, body: CreatePollRequest, state: AppState) -> Result<impl Reply, Rejection> {
    let now = Utc::now();
    let poll = Poll::new(user, body.name, body.deadline, body.subjects, now)?;
    state.store.insert_poll(&poll).await?;
    tracing::info!(poll = %poll.id, "poll created");
    Ok(reply::with_status(
        reply::json(&PollResponse::new(&poll, now)),
        StatusCode::CREATED,
    ))
}

async fn list(params: ListParams, state: AppState) -> Result<impl Reply, Rejection> {
    let now = Utc::now();
    let query = params.poll_query(None)?;
    let polls = state.store.list_polls(&query, now).await?;
    let body: Vec<PollResponse> = polls.iter().map(|p| PollResponse::new(p, now)).collect();
    Ok(reply::json(&body))
}

async fn list_mine(user: Id, params: ListParams, state: AppState) -> Result<impl Reply, Rejection> {
    let now = Utc::now();
    let query = params.poll_query(Some(user))?;
    let polls = state.store.list_polls(&query, now).await?;
    let body: Vec<PollResponse> = polls.iter().map(|p| PollResponse::new(p, now)).collect();
    Ok(reply::json(&body))
}

async fn get(id: Uuid, state: AppState) -> Result<impl Reply, Rejection> {
    let now = Utc::now();
    let poll = state
        .store
        .find_poll(&Id(id))
        .await?
        .ok_or_else(|| Error::not_found("poll"))?;
    Ok(reply::json(&PollResponse::new(&poll, now)))
}

async fn update(
    id: Uuid,
    user: Id,
    body: PollUpdate,
    state: AppState,
) -> Result<impl Reply, Rejection> {
    let now = Utc::now();
    for _ in 0..CAS_RETRIES {
        let mut poll = state
            .store
            .find_poll(&Id(id))
            .await?
            .ok_or_else(|| Error::not_found("poll"))?;
        if poll.owner != user {
            return Err(Error::forbidden("only the poll owner can change it").into());
        }
        poll.apply_update(now, body.clone())?;
        match state.store.update_poll(&poll).await {
            Ok(saved) => return Ok(reply::json(&PollResponse::new(&saved, now))),
            Err(Error::StaleWrite) => continue,
            Err(error) => return Err(error.into()),
        }
    }
    Err(Error::StaleWrite.into())
}

async fn delete(id: Uuid, user: Id, state: AppState) -> Result<impl Reply, Rejection> {
    let poll = state
        .store
        .find_poll(&Id(id))
        .await?
        .ok_or_else(|| Error::not_found("poll"))?;
    if poll.owner != user {
        return Err(Error::forbidden("only the poll owner can delete it").into());
    }
    state.store.delete_poll(&poll.id).await?;
    tracing::info!(poll = %poll.id, "poll deleted");
    Ok(reply::with_status(reply::reply(), StatusCode::NO_CONTENT))
}

/// Casts, switches, or withdraws a vote. The read-modify-write runs under a
/// bounded compare-and-swap loop so concurrent votes on the same poll
/// serialize instead of clobbering each other.
async fn vote(
    id: Uuid,
    user: Id,
    body: VoteRequest,
    state: AppState,
) -> Result<impl Reply, Rejection> {
    let now = Utc::now();
    for _ in 0..CAS_RETRIES {
        let mut poll = state
            .store
            .find_poll(&Id(id))
            .await?
            .ok_or_else(|| Error::not_found("poll"))?;
        poll.cast_vote(now, &user, &body.subject)?;
        match state.store.update_poll(&poll).await {
            Ok(saved) => return Ok(reply::json(&PollResponse::new(&saved, now))),
            Err(Error::StaleWrite) => continue,
            Err(error) => return Err(error.into()),
        }
    }
    Err(Error::StaleWrite.into())
}
