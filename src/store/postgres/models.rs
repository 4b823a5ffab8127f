use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use super::schema;
use crate::error::Error;
use crate::meetings::{Id, Poll, Subject, User, Workshop};

#[derive(Queryable, Selectable, Insertable)]
#[diesel(table_name = schema::users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserRow {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

impl From<&User> for UserRow {
    fn from(user: &User) -> UserRow {
        UserRow {
            id: user.id.0,
            name: user.name.clone(),
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
        }
    }
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> User {
        User {
            id: Id(row.id),
            name: row.name,
            email: row.email,
            password_hash: row.password_hash,
        }
    }
}

/// Poll row with the subject list persisted as one JSONB document, keeping
/// the vote write a single-row atomic update.
#[derive(Queryable, Selectable, Insertable)]
#[diesel(table_name = schema::polls)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PollRow {
    pub id: Uuid,
    pub name: String,
    pub deadline: DateTime<Utc>,
    pub owner_id: Uuid,
    pub workshop_id: Option<Uuid>,
    pub subjects: serde_json::Value,
    pub version: i64,
}

impl PollRow {
    pub fn from_domain(poll: &Poll) -> Result<PollRow, Error> {
        Ok(PollRow {
            id: poll.id.0,
            name: poll.name.clone(),
            deadline: poll.deadline,
            owner_id: poll.owner.0,
            workshop_id: poll.workshop.as_ref().map(|w| w.0),
            subjects: serde_json::to_value(&poll.subjects)
                .map_err(|e| Error::store(format!("subject encode: {e}")))?,
            version: poll.version,
        })
    }

    pub fn into_domain(self) -> Result<Poll, Error> {
        let subjects: Vec<Subject> = serde_json::from_value(self.subjects)
            .map_err(|e| Error::store(format!("subject decode: {e}")))?;
        Ok(Poll {
            id: Id(self.id),
            name: self.name,
            deadline: self.deadline,
            owner: Id(self.owner_id),
            subjects,
            workshop: self.workshop_id.map(Id),
            version: self.version,
        })
    }
}

#[derive(Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = schema::workshops)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct WorkshopRow {
    pub id: Uuid,
    pub name: String,
    pub subject: String,
    pub date: DateTime<Utc>,
    pub room: String,
    pub owner_id: Uuid,
    pub poll_id: Uuid,
}

impl From<&Workshop> for WorkshopRow {
    fn from(workshop: &Workshop) -> WorkshopRow {
        WorkshopRow {
            id: workshop.id.0,
            name: workshop.name.clone(),
            subject: workshop.subject.clone(),
            date: workshop.date,
            room: workshop.room.clone(),
            owner_id: workshop.owner.0,
            poll_id: workshop.poll.0,
        }
    }
}

impl From<WorkshopRow> for Workshop {
    fn from(row: WorkshopRow) -> Workshop {
        Workshop {
            id: Id(row.id),
            name: row.name,
            subject: row.subject,
            date: row.date,
            room: row.room,
            owner: Id(row.owner_id),
            poll: Id(row.poll_id),
        }
    }
}
