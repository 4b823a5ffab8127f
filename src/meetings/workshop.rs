use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::Id;
use super::poll::{Poll, PollStatus};
use crate::error::Error;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkshopStatus {
    Scheduled,
    Ended,
}

impl std::str::FromStr for WorkshopStatus {
    type Err = Error;
    fn from_str(s: &str) -> Result<WorkshopStatus, Error> {
        match s {
            "scheduled" => Ok(WorkshopStatus::Scheduled),
            "ended" => Ok(WorkshopStatus::Ended),
            other => Err(Error::invalid_input(format!(
                "unknown workshop status '{other}'"
            ))),
        }
    }
}

/// A scheduled follow-up event for the winning subject of an ended poll.
#[derive(Clone, Debug, Serialize)]
pub struct Workshop {
    pub id: Id,
    pub name: String,
    pub subject: String,
    pub date: DateTime<Utc>,
    pub room: String,
    pub owner: Id,
    pub poll: Id,
}

impl Workshop {
    /// Materializes a workshop from an ended poll. The room URL is a pure
    /// function of configuration and poll identity, so rescheduling keeps it.
    pub fn schedule(
        poll: &Poll,
        date: DateTime<Utc>,
        now: DateTime<Utc>,
        room_base_url: &str,
    ) -> Result<Workshop, Error> {
        if date <= now {
            return Err(Error::invalid_input("workshop date must be in the future"));
        }
        if poll.status(now) != PollStatus::Ended {
            return Err(Error::invalid_state("poll has not ended yet"));
        }
        let winner = poll
            .winning_subject()
            .ok_or_else(|| Error::invalid_state("poll has no subjects"))?;

        Ok(Workshop {
            id: Id::new(),
            name: poll.name.clone(),
            subject: winner.name.clone(),
            date,
            room: format!("{room_base_url}/{}", poll.id),
            owner: poll.owner.clone(),
            poll: poll.id.clone(),
        })
    }

    pub fn status(&self, now: DateTime<Utc>) -> WorkshopStatus {
        if now <= self.date {
            WorkshopStatus::Scheduled
        } else {
            WorkshopStatus::Ended
        }
    }

    /// Moving the date is rejected once the workshop has already ended.
    pub fn reschedule(&mut self, now: DateTime<Utc>, date: DateTime<Utc>) -> Result<(), Error> {
        if self.status(now) == WorkshopStatus::Ended {
            return Err(Error::invalid_state("workshop has already ended"));
        }
        if date <= now {
            return Err(Error::invalid_input("workshop date must be in the future"));
        }
        self.date = date;
        Ok(())
    }
}
