//! Request and response shapes for the HTTP surface. Derived status fields
//! are computed at serialization time, never read from storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::meetings::{
    Id, Poll, PollStatus, Subject, User, Workshop, WorkshopStatus,
};
use crate::store::{Page, PollQuery, WorkshopQuery};

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub auth: bool,
    pub token: Option<String>,
}

#[derive(Serialize)]
pub struct UserResponse {
    pub id: Id,
    pub name: String,
    pub email: String,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> UserResponse {
        UserResponse {
            id: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
        }
    }
}

#[derive(Deserialize)]
pub struct CreatePollRequest {
    pub name: String,
    pub deadline: DateTime<Utc>,
    pub subjects: Vec<String>,
}

#[derive(Deserialize)]
pub struct VoteRequest {
    pub subject: String,
}

#[derive(Serialize)]
pub struct PollResponse {
    pub id: Id,
    pub name: String,
    pub deadline: DateTime<Utc>,
    pub owner: Id,
    pub status: PollStatus,
    pub subjects: Vec<Subject>,
    pub workshop: Option<Id>,
}

impl PollResponse {
    pub fn new(poll: &Poll, now: DateTime<Utc>) -> PollResponse {
        PollResponse {
            id: poll.id.clone(),
            name: poll.name.clone(),
            deadline: poll.deadline,
            owner: poll.owner.clone(),
            status: poll.status(now),
            subjects: poll.subjects.clone(),
            workshop: poll.workshop.clone(),
        }
    }
}

#[derive(Deserialize)]
pub struct CreateWorkshopRequest {
    #[serde(rename = "pollId")]
    pub poll_id: Id,
    pub date: DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct UpdateWorkshopRequest {
    pub date: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
pub struct WorkshopResponse {
    pub id: Id,
    pub name: String,
    pub subject: String,
    pub date: DateTime<Utc>,
    pub room: String,
    pub status: WorkshopStatus,
    pub owner: UserResponse,
    pub poll: Id,
}

impl WorkshopResponse {
    pub fn new(workshop: &Workshop, owner: &User, now: DateTime<Utc>) -> WorkshopResponse {
        WorkshopResponse {
            id: workshop.id.clone(),
            name: workshop.name.clone(),
            subject: workshop.subject.clone(),
            date: workshop.date,
            room: workshop.room.clone(),
            status: workshop.status(now),
            owner: UserResponse::from(owner),
            poll: workshop.poll.clone(),
        }
    }
}

/// Common listing query string: `?page=2&pageSize=10&status=ended&filter=rust`.
#[derive(Deserialize)]
pub struct ListParams {
    pub page: Option<i64>,
    #[serde(rename = "pageSize")]
    pub page_size: Option<i64>,
    pub status: Option<String>,
    pub filter: Option<String>,
}

impl ListParams {
    pub fn page(&self) -> Page {
        Page::new(self.page, self.page_size)
    }

    pub fn poll_query(&self, owner: Option<Id>) -> Result<PollQuery, Error> {
        Ok(PollQuery {
            page: self.page(),
            status: self
                .status
                .as_deref()
                .map(|s| s.parse::<PollStatus>())
                .transpose()?,
            name_filter: self.filter.clone(),
            owner,
        })
    }

    pub fn workshop_query(&self, owner: Option<Id>) -> Result<WorkshopQuery, Error> {
        Ok(WorkshopQuery {
            page: self.page(),
            status: self
                .status
                .as_deref()
                .map(|s| s.parse::<WorkshopStatus>())
                .transpose()?,
            name_filter: self.filter.clone(),
            owner,
        })
    }
}
