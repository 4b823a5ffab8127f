use chrono::Utc;
use warp::http::StatusCode;
use warp::{reply, Filter, Rejection, Reply};

use super::models::{LoginRequest, RegisterRequest, TokenResponse, UserResponse};
use super::{with_state, AppState};
use crate::auth::{self, MIN_PASSWORD_LEN};
use crate::error::Error;
use crate::meetings::User;

pub(super) fn routes(
    state: AppState,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let register = warp::post()
        .and(warp::path!("api" / "auth" / "register"))
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(register);

    let login = warp::post()
        .and(warp::path!("api" / "auth" / "login"))
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(login);

    let logout = warp::post()
        .and(warp::path!("api" / "auth" / "logout"))
        .and(warp::header::optional::<String>("x-token"))
        .and(with_state(state))
        .and_then(logout);

    register.or(login).or(logout)
}

async fn register(body: RegisterRequest, state: AppState) -> Result<impl Reply, Rejection> {
    if body.name.trim().is_empty() {
        return Err(Error::invalid_input("name must not be empty").into());
    }
    if !body.email.contains('@') {
        return Err(Error::invalid_input("invalid email address").into());
    }
    if body.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(Error::invalid_input(format!(
            "password must have at least {MIN_PASSWORD_LEN} characters"
        ))
        .into());
    }

    let user = User::new(body.name, body.email, auth::hash_password(&body.password));
    // the store enforces email uniqueness atomically
    state.store.insert_user(&user).await?;
    tracing::info!(user = %user.id, "user registered");

    Ok(reply::with_status(
        reply::json(&UserResponse::from(&user)),
        StatusCode::CREATED,
    ))
}

async fn login(body: LoginRequest, state: AppState) -> Result<impl Reply, Rejection> {
    // same error for unknown email and wrong password
    let user = state
        .store
        .find_user_by_email(&body.email)
        .await?
        .ok_or(Error::Unauthorized)?;
    if !auth::verify_password(&body.password, &user.password_hash) {
        return Err(Error::Unauthorized.into());
    }

    let token = state.sessions.issue(&user.id, Utc::now());
    Ok(reply::json(&TokenResponse {
        auth: true,
        token: Some(token),
    }))
}

async fn logout(token: Option<String>, state: AppState) -> Result<impl Reply, Rejection> {
    if let Some(token) = token {
        state.sessions.revoke(&token);
    }
    Ok(reply::json(&TokenResponse {
        auth: false,
        token: None,
    }))
}
