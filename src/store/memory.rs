//! Mutex-guarded store used by the test suites. Keeps insertion order so
//! pagination is deterministic.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{Page, PollQuery, Store, WorkshopQuery};
use crate::error::Error;
use crate::meetings::{Id, Poll, User, Workshop};

#[derive(Default)]
struct Records {
    users: Vec<User>,
    polls: Vec<Poll>,
    workshops: Vec<Workshop>,
}

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Records>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Records> {
        // a poisoned lock only happens after a panicked test; propagate the data
        match self.records.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn paginate<T: Clone>(items: impl Iterator<Item = T>, page: &Page) -> Vec<T> {
    items
        .skip(page.offset() as usize)
        .take(page.limit() as usize)
        .collect()
}

fn name_matches(name: &str, filter: &Option<String>) -> bool {
    match filter {
        Some(f) => name.to_lowercase().contains(&f.to_lowercase()),
        None => true,
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: &User) -> Result<(), Error> {
        let mut records = self.lock();
        if records.users.iter().any(|u| u.email == user.email) {
            return Err(Error::conflict("a user with this email already exists"));
        }
        records.users.push(user.clone());
        Ok(())
    }

    async fn find_user(&self, id: &Id) -> Result<Option<User>, Error> {
        Ok(self.lock().users.iter().find(|u| &u.id == id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, Error> {
        Ok(self.lock().users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_users(&self, ids: &[Id]) -> Result<Vec<User>, Error> {
        Ok(self
            .lock()
            .users
            .iter()
            .filter(|u| ids.contains(&u.id))
            .cloned()
            .collect())
    }

    async fn list_users(&self, page: &Page) -> Result<Vec<User>, Error> {
        Ok(paginate(self.lock().users.iter().cloned(), page))
    }

    async fn insert_poll(&self, poll: &Poll) -> Result<(), Error> {
        self.lock().polls.push(poll.clone());
        Ok(())
    }

    async fn find_poll(&self, id: &Id) -> Result<Option<Poll>, Error> {
        Ok(self.lock().polls.iter().find(|p| &p.id == id).cloned())
    }

    async fn list_polls(&self, query: &PollQuery, now: DateTime<Utc>) -> Result<Vec<Poll>, Error> {
        let records = self.lock();
        let matching = records.polls.iter().filter(|p| {
            query.status.map_or(true, |s| p.status(now) == s)
                && name_matches(&p.name, &query.name_filter)
                && query.owner.as_ref().map_or(true, |o| &p.owner == o)
        });
        Ok(paginate(matching.cloned(), &query.page))
    }

    async fn update_poll(&self, poll: &Poll) -> Result<Poll, Error> {
        let mut records = self.lock();
        let stored = records
            .polls
            .iter_mut()
            .find(|p| p.id == poll.id)
            .ok_or_else(|| Error::not_found("poll"))?;
        if stored.version != poll.version {
            return Err(Error::StaleWrite);
        }
        let mut updated = poll.clone();
        updated.version += 1;
        *stored = updated.clone();
        Ok(updated)
    }

    async fn delete_poll(&self, id: &Id) -> Result<(), Error> {
        let mut records = self.lock();
        if records.workshops.iter().any(|w| &w.poll == id) {
            return Err(Error::conflict("poll has a scheduled workshop"));
        }
        let before = records.polls.len();
        records.polls.retain(|p| &p.id != id);
        if records.polls.len() == before {
            return Err(Error::not_found("poll"));
        }
        Ok(())
    }

    async fn insert_workshop(&self, workshop: &Workshop) -> Result<(), Error> {
        let mut records = self.lock();
        if records.workshops.iter().any(|w| w.poll == workshop.poll) {
            return Err(Error::conflict("a workshop already exists for this poll"));
        }
        records.workshops.push(workshop.clone());
        Ok(())
    }

    async fn find_workshop(&self, id: &Id) -> Result<Option<Workshop>, Error> {
        Ok(self.lock().workshops.iter().find(|w| &w.id == id).cloned())
    }

    async fn find_workshop_by_poll(&self, poll: &Id) -> Result<Option<Workshop>, Error> {
        Ok(self
            .lock()
            .workshops
            .iter()
            .find(|w| &w.poll == poll)
            .cloned())
    }

    async fn list_workshops(
        &self,
        query: &WorkshopQuery,
        now: DateTime<Utc>,
    ) -> Result<Vec<Workshop>, Error> {
        let records = self.lock();
        let matching = records.workshops.iter().filter(|w| {
            query.status.map_or(true, |s| w.status(now) == s)
                && name_matches(&w.name, &query.name_filter)
                && query.owner.as_ref().map_or(true, |o| &w.owner == o)
        });
        Ok(paginate(matching.cloned(), &query.page))
    }

    async fn update_workshop(&self, workshop: &Workshop) -> Result<(), Error> {
        let mut records = self.lock();
        let stored = records
            .workshops
            .iter_mut()
            .find(|w| w.id == workshop.id)
            .ok_or_else(|| Error::not_found("workshop"))?;
        *stored = workshop.clone();
        Ok(())
    }

    async fn delete_workshop(&self, id: &Id) -> Result<(), Error> {
        let mut records = self.lock();
        let before = records.workshops.len();
        records.workshops.retain(|w| &w.id != id);
        if records.workshops.len() == before {
            return Err(Error::not_found("workshop"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::meetings::{PollStatus, WorkshopStatus};

    fn poll(name: &str, now: DateTime<Utc>, offset: Duration) -> Poll {
        Poll {
            id: Id::new(),
            name: name.into(),
            deadline: now + offset,
            owner: Id::new(),
            subjects: vec![crate::meetings::Subject::new("X".into())],
            workshop: None,
            version: 0,
        }
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let store = MemoryStore::new();
        let user = User::new("Alice".into(), "alice@example.test".into(), "h".into());
        store.insert_user(&user).await.expect("first insert");

        let twin = User::new("Alice 2".into(), "alice@example.test".into(), "h".into());
        let err = store.insert_user(&twin).await.expect_err("duplicate email");
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn update_poll_is_a_compare_and_swap() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let stored = poll("CAS", now, Duration::hours(1));
        store.insert_poll(&stored).await.expect("insert");

        let first = store.update_poll(&stored).await.expect("first update");
        assert_eq!(first.version, 1);

        // a writer still holding version 0 must lose
        let err = store
            .update_poll(&stored)
            .await
            .expect_err("stale version must fail");
        assert!(matches!(err, Error::StaleWrite));
    }

    #[tokio::test]
    async fn one_workshop_per_poll() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let subject_poll = poll("Topic", now, Duration::hours(-1));
        let workshop = Workshop {
            id: Id::new(),
            name: subject_poll.name.clone(),
            subject: "X".into(),
            date: now + Duration::days(1),
            room: "r/1".into(),
            owner: subject_poll.owner.clone(),
            poll: subject_poll.id.clone(),
        };
        store.insert_workshop(&workshop).await.expect("insert");

        let mut second = workshop.clone();
        second.id = Id::new();
        let err = store
            .insert_workshop(&second)
            .await
            .expect_err("same poll must conflict");
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn poll_listing_filters_by_derived_status_and_name() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .insert_poll(&poll("Rust workshop", now, Duration::hours(1)))
            .await
            .expect("insert");
        store
            .insert_poll(&poll("Go workshop", now, Duration::hours(-1)))
            .await
            .expect("insert");

        let voting = store
            .list_polls(
                &PollQuery {
                    status: Some(PollStatus::Voting),
                    ..PollQuery::default()
                },
                now,
            )
            .await
            .expect("list");
        assert_eq!(voting.len(), 1);
        assert_eq!(voting[0].name, "Rust workshop");

        let filtered = store
            .list_polls(
                &PollQuery {
                    name_filter: Some("GO".into()),
                    ..PollQuery::default()
                },
                now,
            )
            .await
            .expect("list");
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].name, "Go workshop");
    }

    #[tokio::test]
    async fn workshop_listing_paginates_in_insertion_order() {
        let store = MemoryStore::new();
        let now = Utc::now();
        for i in 0..5 {
            let p = poll(&format!("P{i}"), now, Duration::hours(-1));
            let w = Workshop {
                id: Id::new(),
                name: format!("W{i}"),
                subject: "X".into(),
                date: now + Duration::days(1),
                room: format!("r/{i}"),
                owner: p.owner.clone(),
                poll: p.id.clone(),
            };
            store.insert_workshop(&w).await.expect("insert");
        }

        let query = WorkshopQuery {
            page: Page::new(Some(2), Some(2)),
            status: Some(WorkshopStatus::Scheduled),
            ..WorkshopQuery::default()
        };
        let page = store.list_workshops(&query, now).await.expect("list");
        assert_eq!(
            page.iter().map(|w| w.name.as_str()).collect::<Vec<_>>(),
            vec!["W2", "W3"]
        );
    }

    #[tokio::test]
    async fn page_clamps_out_of_range_values() {
        let page = Page::new(Some(0), Some(-3));
        assert_eq!(page.offset(), 0);
        assert_eq!(page.limit(), 1);
    }

    #[tokio::test]
    async fn page_survives_extreme_query_values() {
        let page = Page::new(Some(i64::MAX), Some(i64::MAX));
        assert_eq!(page.limit(), crate::store::MAX_PAGE_SIZE);
        assert!(page.offset() > 0);
    }

    #[tokio::test]
    async fn scheduled_poll_cannot_be_deleted() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let subject_poll = poll("Taken", now, Duration::hours(-1));
        store.insert_poll(&subject_poll).await.expect("insert poll");
        let workshop = Workshop {
            id: Id::new(),
            name: subject_poll.name.clone(),
            subject: "X".into(),
            date: now + Duration::days(1),
            room: "r/1".into(),
            owner: subject_poll.owner.clone(),
            poll: subject_poll.id.clone(),
        };
        store.insert_workshop(&workshop).await.expect("insert");

        let err = store
            .delete_poll(&subject_poll.id)
            .await
            .expect_err("attached workshop must block the delete");
        assert!(matches!(err, Error::Conflict(_)));

        store.delete_workshop(&workshop.id).await.expect("cancel");
        store.delete_poll(&subject_poll.id).await.expect("delete");
    }
}
