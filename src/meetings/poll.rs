use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::Id;
use crate::error::Error;

/// One selectable option within a poll, accumulating voters.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Subject {
    pub name: String,
    pub voters: Vec<Id>,
}

impl Subject {
    pub fn new(name: String) -> Subject {
        Subject {
            name,
            voters: vec![],
        }
    }
}

/// Lifecycle label derived from wall-clock time, never stored.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollStatus {
    Voting,
    Ended,
    Scheduled,
}

impl std::str::FromStr for PollStatus {
    type Err = Error;
    fn from_str(s: &str) -> Result<PollStatus, Error> {
        match s {
            "voting" => Ok(PollStatus::Voting),
            "ended" => Ok(PollStatus::Ended),
            "scheduled" => Ok(PollStatus::Scheduled),
            other => Err(Error::invalid_input(format!(
                "unknown poll status '{other}'"
            ))),
        }
    }
}

/// Owner edits applied through [`Poll::apply_update`].
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PollUpdate {
    pub name: Option<String>,
    pub deadline: Option<DateTime<Utc>>,
    pub subjects: Option<Vec<String>>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Poll {
    pub id: Id,
    pub name: String,
    pub deadline: DateTime<Utc>,
    pub owner: Id,
    pub subjects: Vec<Subject>,
    pub workshop: Option<Id>,
    /// Compare-and-swap token; the store bumps it on every successful update.
    pub version: i64,
}

fn validate_subject_names(names: &[String]) -> Result<(), Error> {
    if names.is_empty() {
        return Err(Error::invalid_input("poll must have at least one subject"));
    }
    let mut seen = HashSet::new();
    for name in names {
        if name.trim().is_empty() {
            return Err(Error::invalid_input("subject name must not be empty"));
        }
        if !seen.insert(name.as_str()) {
            return Err(Error::invalid_input(format!(
                "duplicate subject name '{name}'"
            )));
        }
    }
    Ok(())
}

impl Poll {
    pub fn new(
        owner: Id,
        name: String,
        deadline: DateTime<Utc>,
        subjects: Vec<String>,
        now: DateTime<Utc>,
    ) -> Result<Poll, Error> {
        if name.trim().is_empty() {
            return Err(Error::invalid_input("poll name must not be empty"));
        }
        if deadline <= now {
            return Err(Error::invalid_input("poll deadline must be in the future"));
        }
        validate_subject_names(&subjects)?;

        Ok(Poll {
            id: Id::new(),
            name,
            deadline,
            owner,
            subjects: subjects.into_iter().map(Subject::new).collect(),
            workshop: None,
            version: 0,
        })
    }

    /// Recomputed on every read: a workshop reference wins over the deadline
    /// comparison.
    pub fn status(&self, now: DateTime<Utc>) -> PollStatus {
        if self.workshop.is_some() {
            PollStatus::Scheduled
        } else if now <= self.deadline {
            PollStatus::Voting
        } else {
            PollStatus::Ended
        }
    }

    pub fn subject(&self, name: &str) -> Option<&Subject> {
        self.subjects.iter().find(|s| s.name == name)
    }

    /// Casts, switches, or withdraws a vote, keeping the voter in at most one
    /// subject. Voting for the currently held subject withdraws the vote.
    pub fn cast_vote(
        &mut self,
        now: DateTime<Utc>,
        voter: &Id,
        subject_name: &str,
    ) -> Result<(), Error> {
        if self.status(now) != PollStatus::Voting {
            return Err(Error::invalid_state("poll is not open for voting"));
        }
        let target = self
            .subjects
            .iter()
            .position(|s| s.name == subject_name)
            .ok_or_else(|| Error::not_found("subject"))?;

        // at most one subject holds this voter
        let mut withdrawn = None;
        for (i, subject) in self.subjects.iter_mut().enumerate() {
            if let Some(pos) = subject.voters.iter().position(|v| v == voter) {
                subject.voters.remove(pos);
                withdrawn = Some(i);
                break;
            }
        }
        if withdrawn == Some(target) {
            // toggle-off: the removal above is the whole mutation
            return Ok(());
        }
        self.subjects[target].voters.push(voter.clone());
        Ok(())
    }

    /// Subject with the greatest voter count; ties go to the first subject in
    /// stored order.
    pub fn winning_subject(&self) -> Option<&Subject> {
        let mut best: Option<&Subject> = None;
        for subject in &self.subjects {
            match best {
                Some(b) if subject.voters.len() <= b.voters.len() => {}
                _ => best = Some(subject),
            }
        }
        best
    }

    /// Every voter across every subject. Disjoint by the one-vote invariant,
    /// so no deduplication is needed.
    pub fn voters(&self) -> Vec<Id> {
        self.subjects
            .iter()
            .flat_map(|s| s.voters.iter().cloned())
            .collect()
    }

    /// Owner edits are only accepted while the poll is still voting. Subjects
    /// kept by name retain their voters.
    pub fn apply_update(&mut self, now: DateTime<Utc>, update: PollUpdate) -> Result<(), Error> {
        if self.status(now) != PollStatus::Voting {
            return Err(Error::invalid_state("poll is no longer accepting changes"));
        }
        if let Some(name) = update.name {
            if name.trim().is_empty() {
                return Err(Error::invalid_input("poll name must not be empty"));
            }
            self.name = name;
        }
        if let Some(deadline) = update.deadline {
            if deadline <= now {
                return Err(Error::invalid_input("poll deadline must be in the future"));
            }
            self.deadline = deadline;
        }
        if let Some(names) = update.subjects {
            validate_subject_names(&names)?;
            let rebuilt = names
                .into_iter()
                .map(|name| match self.subjects.iter().find(|s| s.name == name) {
                    Some(existing) => existing.clone(),
                    None => Subject::new(name),
                })
                .collect();
            self.subjects = rebuilt;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use rstest::rstest;

    use super::*;

    fn open_poll(subjects: &[&str]) -> (Poll, DateTime<Utc>) {
        let now = Utc::now();
        let poll = Poll::new(
            Id::new(),
            "Team workshop".into(),
            now + Duration::hours(1),
            subjects.iter().map(|s| s.to_string()).collect(),
            now,
        )
        .expect("valid poll");
        (poll, now)
    }

    fn votes(poll: &Poll, subject: &str) -> Vec<Id> {
        poll.subject(subject).expect("subject exists").voters.clone()
    }

    #[test]
    fn rejects_empty_subject_list() {
        let now = Utc::now();
        let err = Poll::new(
            Id::new(),
            "No subjects".into(),
            now + Duration::hours(1),
            vec![],
            now,
        )
        .expect_err("empty subjects must fail");
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn rejects_past_deadline() {
        let now = Utc::now();
        let err = Poll::new(
            Id::new(),
            "Too late".into(),
            now - Duration::minutes(1),
            vec!["X".into()],
            now,
        )
        .expect_err("past deadline must fail");
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn rejects_duplicate_subject_names() {
        let now = Utc::now();
        let err = Poll::new(
            Id::new(),
            "Dupes".into(),
            now + Duration::hours(1),
            vec!["X".into(), "X".into()],
            now,
        )
        .expect_err("duplicate subjects must fail");
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn status_follows_workshop_then_deadline() {
        let (mut poll, now) = open_poll(&["X"]);
        assert_eq!(poll.status(now), PollStatus::Voting);
        assert_eq!(poll.status(poll.deadline), PollStatus::Voting);
        assert_eq!(
            poll.status(poll.deadline + Duration::seconds(1)),
            PollStatus::Ended
        );

        poll.workshop = Some(Id::new());
        // the workshop reference wins even before the deadline
        assert_eq!(poll.status(now), PollStatus::Scheduled);
    }

    #[test]
    fn vote_switch_moves_voter_in_one_step() {
        let (mut poll, now) = open_poll(&["X", "Y"]);
        let alice = Id::new();

        poll.cast_vote(now, &alice, "X").expect("vote X");
        assert_eq!(votes(&poll, "X"), vec![alice.clone()]);

        poll.cast_vote(now, &alice, "Y").expect("switch to Y");
        assert!(votes(&poll, "X").is_empty());
        assert_eq!(votes(&poll, "Y"), vec![alice.clone()]);

        // the voter never appears in more than one subject
        let total: usize = poll.subjects.iter().map(|s| s.voters.len()).sum();
        assert_eq!(total, 1);
    }

    #[test]
    fn double_vote_is_a_toggle() {
        let (mut poll, now) = open_poll(&["X", "Y"]);
        let before = poll.subjects.clone();
        let alice = Id::new();

        poll.cast_vote(now, &alice, "X").expect("vote X");
        poll.cast_vote(now, &alice, "X").expect("unvote X");
        assert_eq!(poll.subjects, before);
    }

    #[test]
    fn vote_after_deadline_is_invalid_state() {
        let (mut poll, _) = open_poll(&["X"]);
        let after = poll.deadline + Duration::minutes(1);
        let err = poll
            .cast_vote(after, &Id::new(), "X")
            .expect_err("ended poll must reject votes");
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[test]
    fn vote_for_unknown_subject_is_not_found() {
        let (mut poll, now) = open_poll(&["X"]);
        let err = poll
            .cast_vote(now, &Id::new(), "Z")
            .expect_err("unknown subject must fail");
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[rstest]
    #[case(&[3, 5, 1], "B")]
    #[case(&[2, 2], "A")]
    #[case(&[0, 0, 0], "A")]
    fn winner_is_max_votes_first_on_tie(#[case] counts: &[usize], #[case] expected: &str) {
        let names = ["A", "B", "C"];
        let (mut poll, now) = open_poll(&names[..counts.len()]);
        for (subject, count) in names.iter().zip(counts) {
            for _ in 0..*count {
                poll.cast_vote(now, &Id::new(), subject).expect("vote");
            }
        }
        let winner = poll.winning_subject().expect("poll has subjects");
        assert_eq!(winner.name, expected);
    }

    #[test]
    fn update_preserves_voters_of_kept_subjects() {
        let (mut poll, now) = open_poll(&["X", "Y"]);
        let alice = Id::new();
        poll.cast_vote(now, &alice, "X").expect("vote X");

        poll.apply_update(
            now,
            PollUpdate {
                subjects: Some(vec!["X".into(), "Z".into()]),
                ..PollUpdate::default()
            },
        )
        .expect("update subjects");

        assert_eq!(votes(&poll, "X"), vec![alice]);
        assert!(votes(&poll, "Z").is_empty());
        assert!(poll.subject("Y").is_none());
    }

    #[test]
    fn update_rejected_once_ended() {
        let (mut poll, _) = open_poll(&["X"]);
        let after = poll.deadline + Duration::minutes(1);
        let err = poll
            .apply_update(
                after,
                PollUpdate {
                    name: Some("Renamed".into()),
                    ..PollUpdate::default()
                },
            )
            .expect_err("ended poll must reject edits");
        assert!(matches!(err, Error::InvalidState(_)));
    }
}
