pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Error;
use crate::meetings::{Id, Poll, PollStatus, User, Workshop, WorkshopStatus};

/// 1-based page selector. Out-of-range inputs are clamped rather than
/// rejected, matching the original API's lenient query handling.
#[derive(Clone, Copy, Debug)]
pub struct Page {
    page: i64,
    page_size: i64,
}

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

impl Page {
    pub fn new(page: Option<i64>, page_size: Option<i64>) -> Page {
        Page {
            page: page.unwrap_or(1).max(1),
            page_size: page_size
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE),
        }
    }

    // both values come straight from the query string, so the arithmetic
    // must hold up under arbitrary input
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.page_size)
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }
}

impl Default for Page {
    fn default() -> Page {
        Page::new(None, None)
    }
}

/// Filters for poll listings. Status is derived from time, so adapters turn
/// it into range comparisons against the deadline at query time.
#[derive(Clone, Debug, Default)]
pub struct PollQuery {
    pub page: Page,
    pub status: Option<PollStatus>,
    pub name_filter: Option<String>,
    pub owner: Option<Id>,
}

#[derive(Clone, Debug, Default)]
pub struct WorkshopQuery {
    pub page: Page,
    pub status: Option<WorkshopStatus>,
    pub name_filter: Option<String>,
    pub owner: Option<Id>,
}

/// Entity store port. Identity-keyed lookups, paginated queries, atomic
/// updates. `update_poll` is a compare-and-swap on the poll's version;
/// `insert_workshop` enforces at most one workshop per poll.
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_user(&self, user: &User) -> Result<(), Error>;
    async fn find_user(&self, id: &Id) -> Result<Option<User>, Error>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, Error>;
    async fn find_users(&self, ids: &[Id]) -> Result<Vec<User>, Error>;
    async fn list_users(&self, page: &Page) -> Result<Vec<User>, Error>;

    async fn insert_poll(&self, poll: &Poll) -> Result<(), Error>;
    async fn find_poll(&self, id: &Id) -> Result<Option<Poll>, Error>;
    async fn list_polls(&self, query: &PollQuery, now: DateTime<Utc>) -> Result<Vec<Poll>, Error>;
    /// Persists the poll if its version is unchanged, returning the stored
    /// copy with the version bumped. Fails with [`Error::StaleWrite`] when a
    /// concurrent writer got there first.
    async fn update_poll(&self, poll: &Poll) -> Result<Poll, Error>;
    async fn delete_poll(&self, id: &Id) -> Result<(), Error>;

    async fn insert_workshop(&self, workshop: &Workshop) -> Result<(), Error>;
    async fn find_workshop(&self, id: &Id) -> Result<Option<Workshop>, Error>;
    async fn find_workshop_by_poll(&self, poll: &Id) -> Result<Option<Workshop>, Error>;
    async fn list_workshops(
        &self,
        query: &WorkshopQuery,
        now: DateTime<Utc>,
    ) -> Result<Vec<Workshop>, Error>;
    async fn update_workshop(&self, workshop: &Workshop) -> Result<(), Error>;
    async fn delete_workshop(&self, id: &Id) -> Result<(), Error>;
}
