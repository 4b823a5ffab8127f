use std::collections::HashMap;

use chrono::Utc;
use uuid::Uuid;
use warp::http::StatusCode;
use warp::{reply, Filter, Rejection, Reply};

use super::models::{CreateWorkshopRequest, ListParams, UpdateWorkshopRequest, WorkshopResponse};
use super::{authenticated, with_state, AppState, CAS_RETRIES};
use crate::error::Error;
use crate::meetings::{Id, User, Workshop};
use crate::notify::{self, WorkshopMailKind};
use crate::store::Store;

pub(super) fn routes(
    state: AppState,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let create = warp::post()
        .and(warp::path!("api" / "workshops"))
        .and(authenticated(state.clone()))
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(create);

    let mine = warp::get()
        .and(warp::path!("api" / "workshops" / "mine"))
        .and(authenticated(state.clone()))
        .and(warp::query::<ListParams>())
        .and(with_state(state.clone()))
        .and_then(list_mine);

    let list = warp::get()
        .and(warp::path!("api" / "workshops"))
        .and(warp::query::<ListParams>())
        .and(with_state(state.clone()))
        .and_then(list);

    let get = warp::get()
        .and(warp::path!("api" / "workshops" / Uuid))
        .and(with_state(state.clone()))
        .and_then(get);

    let update = warp::put()
        .and(warp::path!("api" / "workshops" / Uuid))
        .and(authenticated(state.clone()))
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(update);

    let delete = warp::delete()
        .and(warp::path!("api" / "workshops" / Uuid))
        .and(authenticated(state.clone()))
        .and(with_state(state))
        .and_then(delete);

    create.or(mine).or(list).or(get).or(update).or(delete)
}

/// Points the poll at its workshop (or clears the reference) under the same
/// compare-and-swap discipline votes use.
async fn set_poll_workshop(
    store: &dyn Store,
    poll_id: &Id,
    workshop: Option<Id>,
) -> Result<(), Error> {
    for _ in 0..CAS_RETRIES {
        let mut poll = store
            .find_poll(poll_id)
            .await?
            .ok_or_else(|| Error::not_found("poll"))?;
        poll.workshop = workshop.clone();
        match store.update_poll(&poll).await {
            Ok(_) => return Ok(()),
            Err(Error::StaleWrite) => continue,
            Err(error) => return Err(error),
        }
    }
    Err(Error::StaleWrite)
}

/// Mails every voter across every subject of the poll. Dispatch happens
/// after the core mutation is committed and never fails the request.
async fn notify_voters(
    state: &AppState,
    voter_ids: Vec<Id>,
    workshop: &Workshop,
    owner_name: &str,
    kind: WorkshopMailKind,
) {
    let voters = match state.store.find_users(&voter_ids).await {
        Ok(voters) => voters,
        Err(error) => {
            tracing::warn!(error = %error, "could not load voters for notification");
            return;
        }
    };
    let mails = voters
        .into_iter()
        .map(|voter| notify::workshop_mail(kind, workshop, owner_name, voter.email))
        .collect();
    notify::dispatch_all(state.notifier.as_ref(), mails).await;
}

async fn create(
    user: Id,
    body: CreateWorkshopRequest,
    state: AppState,
) -> Result<impl Reply, Rejection> {
    let now = Utc::now();
    let owner = state
        .store
        .find_user(&user)
        .await?
        .ok_or_else(|| Error::not_found("user"))?;
    let poll = state
        .store
        .find_poll(&body.poll_id)
        .await?
        .ok_or_else(|| Error::not_found("poll"))?;
    if poll.owner != user {
        return Err(Error::forbidden("only the poll owner can schedule its workshop").into());
    }
    if state.store.find_workshop_by_poll(&poll.id).await?.is_some() {
        return Err(Error::conflict("a workshop already exists for this poll").into());
    }

    let workshop = Workshop::schedule(&poll, body.date, now, &state.config.room_base_url)?;
    // the store's uniqueness guarantee closes the check-then-insert race
    state.store.insert_workshop(&workshop).await?;
    set_poll_workshop(state.store.as_ref(), &poll.id, Some(workshop.id.clone())).await?;
    tracing::info!(workshop = %workshop.id, poll = %poll.id, "workshop scheduled");

    notify_voters(
        &state,
        poll.voters(),
        &workshop,
        &owner.name,
        WorkshopMailKind::Scheduled,
    )
    .await;

    Ok(reply::with_status(
        reply::json(&WorkshopResponse::new(&workshop, &owner, now)),
        StatusCode::CREATED,
    ))
}

async fn list(params: ListParams, state: AppState) -> Result<impl Reply, Rejection> {
    let now = Utc::now();
    let query = params.workshop_query(None)?;
    let workshops = state.store.list_workshops(&query, now).await?;
    Ok(reply::json(&expand_owners(&state, workshops).await?))
}

async fn list_mine(
    user: Id,
    params: ListParams,
    state: AppState,
) -> Result<impl Reply, Rejection> {
    let now = Utc::now();
    let query = params.workshop_query(Some(user))?;
    let workshops = state.store.list_workshops(&query, now).await?;
    Ok(reply::json(&expand_owners(&state, workshops).await?))
}

/// Expands owner references into user records with one batched lookup.
async fn expand_owners(
    state: &AppState,
    workshops: Vec<Workshop>,
) -> Result<Vec<WorkshopResponse>, Error> {
    let now = Utc::now();
    let owner_ids: Vec<Id> = workshops.iter().map(|w| w.owner.clone()).collect();
    let owners: HashMap<Id, User> = state
        .store
        .find_users(&owner_ids)
        .await?
        .into_iter()
        .map(|u| (u.id.clone(), u))
        .collect();
    Ok(workshops
        .iter()
        .filter_map(|w| {
            owners
                .get(&w.owner)
                .map(|owner| WorkshopResponse::new(w, owner, now))
        })
        .collect())
}

async fn get(id: Uuid, state: AppState) -> Result<impl Reply, Rejection> {
    let now = Utc::now();
    let workshop = state
        .store
        .find_workshop(&Id(id))
        .await?
        .ok_or_else(|| Error::not_found("workshop"))?;
    let owner = state
        .store
        .find_user(&workshop.owner)
        .await?
        .ok_or_else(|| Error::not_found("user"))?;
    Ok(reply::json(&WorkshopResponse::new(&workshop, &owner, now)))
}

async fn update(
    id: Uuid,
    user: Id,
    body: UpdateWorkshopRequest,
    state: AppState,
) -> Result<impl Reply, Rejection> {
    let now = Utc::now();
    let mut workshop = state
        .store
        .find_workshop(&Id(id))
        .await?
        .ok_or_else(|| Error::not_found("workshop"))?;
    if workshop.owner != user {
        return Err(Error::forbidden("only the workshop owner can change it").into());
    }
    let owner = state
        .store
        .find_user(&workshop.owner)
        .await?
        .ok_or_else(|| Error::not_found("user"))?;

    // an empty body changes nothing; don't write and don't mail anyone
    let Some(date) = body.date else {
        return Ok(reply::json(&WorkshopResponse::new(&workshop, &owner, now)));
    };
    workshop.reschedule(now, date)?;
    state.store.update_workshop(&workshop).await?;
    tracing::info!(workshop = %workshop.id, "workshop updated");

    notify_voters(
        &state,
        poll_voters(&state, &workshop.poll).await,
        &workshop,
        &owner.name,
        WorkshopMailKind::Updated,
    )
    .await;

    Ok(reply::json(&WorkshopResponse::new(&workshop, &owner, now)))
}

async fn delete(id: Uuid, user: Id, state: AppState) -> Result<impl Reply, Rejection> {
    let workshop = state
        .store
        .find_workshop(&Id(id))
        .await?
        .ok_or_else(|| Error::not_found("workshop"))?;
    if workshop.owner != user {
        return Err(Error::forbidden("only the workshop owner can cancel it").into());
    }

    let voters = poll_voters(&state, &workshop.poll).await;
    state.store.delete_workshop(&workshop.id).await?;
    // clearing the reference lets the poll schedule a replacement
    if let Err(error) = set_poll_workshop(state.store.as_ref(), &workshop.poll, None).await {
        tracing::warn!(error = %error, "could not clear the poll's workshop reference");
    }
    tracing::info!(workshop = %workshop.id, "workshop cancelled");

    let owner_name = state
        .store
        .find_user(&workshop.owner)
        .await
        .ok()
        .flatten()
        .map(|u| u.name)
        .unwrap_or_default();
    notify_voters(
        &state,
        voters,
        &workshop,
        &owner_name,
        WorkshopMailKind::Cancelled,
    )
    .await;

    Ok(reply::with_status(reply::reply(), StatusCode::NO_CONTENT))
}

async fn poll_voters(state: &AppState, poll_id: &Id) -> Vec<Id> {
    match state.store.find_poll(poll_id).await {
        Ok(Some(poll)) => poll.voters(),
        Ok(None) => vec![],
        Err(error) => {
            tracing::warn!(error = %error, "could not load poll for notification");
            vec![]
        }
    }
}
