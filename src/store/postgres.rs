//! Diesel-backed store. Handlers run on the async runtime, so every database
//! job is pushed onto the blocking pool with its own connection.

mod models;
mod schema;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DbError};
use uuid::Uuid;

use self::models::{PollRow, UserRow, WorkshopRow};
use self::schema::{polls, users, workshops};
use super::{Page, PollQuery, Store, WorkshopQuery};
use crate::error::Error;
use crate::meetings::{Id, Poll, PollStatus, User, Workshop, WorkshopStatus};

pub struct PgStore {
    database_url: String,
}

impl PgStore {
    pub fn new(database_url: String) -> PgStore {
        PgStore { database_url }
    }

    async fn run<T, F>(&self, job: F) -> Result<T, Error>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> Result<T, Error> + Send + 'static,
    {
        let url = self.database_url.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = PgConnection::establish(&url).map_err(Error::store)?;
            job(&mut conn)
        })
        .await
        .map_err(Error::store)?
    }
}

fn unique_violation(error: &DbError) -> bool {
    matches!(
        error,
        DbError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)
    )
}

fn foreign_key_violation(error: &DbError) -> bool {
    matches!(
        error,
        DbError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _)
    )
}

#[async_trait]
impl Store for PgStore {
    async fn insert_user(&self, user: &User) -> Result<(), Error> {
        let row = UserRow::from(user);
        self.run(move |conn| {
            diesel::insert_into(users::table)
                .values(&row)
                .execute(conn)
                .map_err(|e| {
                    if unique_violation(&e) {
                        Error::conflict("a user with this email already exists")
                    } else {
                        Error::store(e)
                    }
                })?;
            Ok(())
        })
        .await
    }

    async fn find_user(&self, id: &Id) -> Result<Option<User>, Error> {
        let id = id.0;
        self.run(move |conn| {
            let row = users::table
                .find(id)
                .select(UserRow::as_select())
                .first(conn)
                .optional()
                .map_err(Error::store)?;
            Ok(row.map(User::from))
        })
        .await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, Error> {
        let email = email.to_string();
        self.run(move |conn| {
            let row = users::table
                .filter(users::email.eq(&email))
                .select(UserRow::as_select())
                .first(conn)
                .optional()
                .map_err(Error::store)?;
            Ok(row.map(User::from))
        })
        .await
    }

    async fn find_users(&self, ids: &[Id]) -> Result<Vec<User>, Error> {
        let ids: Vec<Uuid> = ids.iter().map(|id| id.0).collect();
        self.run(move |conn| {
            let rows: Vec<UserRow> = users::table
                .filter(users::id.eq_any(&ids))
                .select(UserRow::as_select())
                .load(conn)
                .map_err(Error::store)?;
            Ok(rows.into_iter().map(User::from).collect())
        })
        .await
    }

    async fn list_users(&self, page: &Page) -> Result<Vec<User>, Error> {
        let page = *page;
        self.run(move |conn| {
            let rows: Vec<UserRow> = users::table
                .order(users::name.asc())
                .offset(page.offset())
                .limit(page.limit())
                .select(UserRow::as_select())
                .load(conn)
                .map_err(Error::store)?;
            Ok(rows.into_iter().map(User::from).collect())
        })
        .await
    }

    async fn insert_poll(&self, poll: &Poll) -> Result<(), Error> {
        let row = PollRow::from_domain(poll)?;
        self.run(move |conn| {
            diesel::insert_into(polls::table)
                .values(&row)
                .execute(conn)
                .map_err(Error::store)?;
            Ok(())
        })
        .await
    }

    async fn find_poll(&self, id: &Id) -> Result<Option<Poll>, Error> {
        let id = id.0;
        self.run(move |conn| {
            let row = polls::table
                .find(id)
                .select(PollRow::as_select())
                .first(conn)
                .optional()
                .map_err(Error::store)?;
            row.map(PollRow::into_domain).transpose()
        })
        .await
    }

    async fn list_polls(&self, query: &PollQuery, now: DateTime<Utc>) -> Result<Vec<Poll>, Error> {
        let query = query.clone();
        self.run(move |conn| {
            let mut q = polls::table.into_boxed();
            if let Some(filter) = &query.name_filter {
                q = q.filter(polls::name.ilike(format!("%{filter}%")));
            }
            if let Some(owner) = &query.owner {
                q = q.filter(polls::owner_id.eq(owner.0));
            }
            // derived status becomes a range comparison at query time
            match query.status {
                Some(PollStatus::Scheduled) => q = q.filter(polls::workshop_id.is_not_null()),
                Some(PollStatus::Voting) => {
                    q = q.filter(polls::workshop_id.is_null().and(polls::deadline.ge(now)))
                }
                Some(PollStatus::Ended) => {
                    q = q.filter(polls::workshop_id.is_null().and(polls::deadline.lt(now)))
                }
                None => {}
            }
            let rows: Vec<PollRow> = q
                .order(polls::deadline.asc())
                .offset(query.page.offset())
                .limit(query.page.limit())
                .select(PollRow::as_select())
                .load(conn)
                .map_err(Error::store)?;
            rows.into_iter().map(PollRow::into_domain).collect()
        })
        .await
    }

    async fn update_poll(&self, poll: &Poll) -> Result<Poll, Error> {
        let row = PollRow::from_domain(poll)?;
        self.run(move |conn| {
            let expected = row.version;
            let target = polls::table.filter(polls::id.eq(row.id).and(polls::version.eq(expected)));
            let changed = diesel::update(target)
                .set((
                    polls::name.eq(&row.name),
                    polls::deadline.eq(row.deadline),
                    polls::workshop_id.eq(row.workshop_id),
                    polls::subjects.eq(&row.subjects),
                    polls::version.eq(expected + 1),
                ))
                .execute(conn)
                .map_err(Error::store)?;
            if changed == 0 {
                let exists: i64 = polls::table
                    .filter(polls::id.eq(row.id))
                    .count()
                    .get_result(conn)
                    .map_err(Error::store)?;
                return Err(if exists == 0 {
                    Error::not_found("poll")
                } else {
                    Error::StaleWrite
                });
            }
            let mut updated = row.into_domain()?;
            updated.version = expected + 1;
            Ok(updated)
        })
        .await
    }

    async fn delete_poll(&self, id: &Id) -> Result<(), Error> {
        let id = id.0;
        self.run(move |conn| {
            // workshops.poll_id references polls, so a scheduled poll is
            // rejected here instead of surfacing as a storage failure
            let deleted = diesel::delete(polls::table.find(id))
                .execute(conn)
                .map_err(|e| {
                    if foreign_key_violation(&e) {
                        Error::conflict("poll has a scheduled workshop")
                    } else {
                        Error::store(e)
                    }
                })?;
            if deleted == 0 {
                return Err(Error::not_found("poll"));
            }
            Ok(())
        })
        .await
    }

    async fn insert_workshop(&self, workshop: &Workshop) -> Result<(), Error> {
        let row = WorkshopRow::from(workshop);
        self.run(move |conn| {
            diesel::insert_into(workshops::table)
                .values(&row)
                .execute(conn)
                .map_err(|e| {
                    if unique_violation(&e) {
                        Error::conflict("a workshop already exists for this poll")
                    } else {
                        Error::store(e)
                    }
                })?;
            Ok(())
        })
        .await
    }

    async fn find_workshop(&self, id: &Id) -> Result<Option<Workshop>, Error> {
        let id = id.0;
        self.run(move |conn| {
            let row = workshops::table
                .find(id)
                .select(WorkshopRow::as_select())
                .first(conn)
                .optional()
                .map_err(Error::store)?;
            Ok(row.map(Workshop::from))
        })
        .await
    }

    async fn find_workshop_by_poll(&self, poll: &Id) -> Result<Option<Workshop>, Error> {
        let poll = poll.0;
        self.run(move |conn| {
            let row = workshops::table
                .filter(workshops::poll_id.eq(poll))
                .select(WorkshopRow::as_select())
                .first(conn)
                .optional()
                .map_err(Error::store)?;
            Ok(row.map(Workshop::from))
        })
        .await
    }

    async fn list_workshops(
        &self,
        query: &WorkshopQuery,
        now: DateTime<Utc>,
    ) -> Result<Vec<Workshop>, Error> {
        let query = query.clone();
        self.run(move |conn| {
            let mut q = workshops::table.into_boxed();
            if let Some(filter) = &query.name_filter {
                q = q.filter(workshops::name.ilike(format!("%{filter}%")));
            }
            if let Some(owner) = &query.owner {
                q = q.filter(workshops::owner_id.eq(owner.0));
            }
            match query.status {
                Some(WorkshopStatus::Scheduled) => q = q.filter(workshops::date.ge(now)),
                Some(WorkshopStatus::Ended) => q = q.filter(workshops::date.lt(now)),
                None => {}
            }
            let rows: Vec<WorkshopRow> = q
                .order(workshops::date.asc())
                .offset(query.page.offset())
                .limit(query.page.limit())
                .select(WorkshopRow::as_select())
                .load(conn)
                .map_err(Error::store)?;
            Ok(rows.into_iter().map(Workshop::from).collect())
        })
        .await
    }

    async fn update_workshop(&self, workshop: &Workshop) -> Result<(), Error> {
        let row = WorkshopRow::from(workshop);
        self.run(move |conn| {
            let changed = diesel::update(workshops::table.find(row.id))
                .set(&row)
                .execute(conn)
                .map_err(Error::store)?;
            if changed == 0 {
                return Err(Error::not_found("workshop"));
            }
            Ok(())
        })
        .await
    }

    async fn delete_workshop(&self, id: &Id) -> Result<(), Error> {
        let id = id.0;
        self.run(move |conn| {
            let deleted = diesel::delete(workshops::table.find(id))
                .execute(conn)
                .map_err(Error::store)?;
            if deleted == 0 {
                return Err(Error::not_found("workshop"));
            }
            Ok(())
        })
        .await
    }
}
