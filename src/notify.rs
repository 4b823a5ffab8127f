//! Outbound mail. Dispatch is fire-and-forget per recipient: failures are
//! logged and collected, never propagated to the request that triggered them.

use async_trait::async_trait;
use futures_util::future::join_all;
use serde::Serialize;
use thiserror::Error as ThisError;

use crate::meetings::Workshop;

#[derive(Clone, Debug)]
pub struct Mail {
    pub to: String,
    pub subject: String,
    pub text: String,
}

#[derive(Debug, ThisError)]
#[error("notification to {to} failed: {reason}")]
pub struct NotifyError {
    pub to: String,
    pub reason: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, mail: &Mail) -> Result<(), NotifyError>;
}

/// Delivers mail through an HTTP mail API endpoint.
pub struct MailApiNotifier {
    client: reqwest::Client,
    endpoint: String,
    from: String,
}

impl MailApiNotifier {
    pub fn new(endpoint: String, from: String) -> MailApiNotifier {
        MailApiNotifier {
            client: reqwest::Client::new(),
            endpoint,
            from,
        }
    }
}

#[derive(Serialize)]
struct MailPayload<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

#[async_trait]
impl Notifier for MailApiNotifier {
    async fn send(&self, mail: &Mail) -> Result<(), NotifyError> {
        let failed = |reason: String| NotifyError {
            to: mail.to.clone(),
            reason,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&MailPayload {
                from: &self.from,
                to: &mail.to,
                subject: &mail.subject,
                text: &mail.text,
            })
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;
        response
            .error_for_status()
            .map(|_| ())
            .map_err(|e| failed(e.to_string()))
    }
}

/// One send per recipient, concurrently; a failure for one recipient never
/// blocks or aborts delivery to the others.
pub async fn dispatch_all(
    notifier: &dyn Notifier,
    mails: Vec<Mail>,
) -> Vec<Result<(), NotifyError>> {
    let results = join_all(mails.iter().map(|mail| notifier.send(mail))).await;
    for error in results.iter().filter_map(|r| r.as_ref().err()) {
        tracing::warn!(error = %error, "mail dispatch failed");
    }
    results
}

#[derive(Clone, Copy, Debug)]
pub enum WorkshopMailKind {
    Scheduled,
    Updated,
    Cancelled,
}

/// Builds the per-voter email for a workshop lifecycle event.
pub fn workshop_mail(
    kind: WorkshopMailKind,
    workshop: &Workshop,
    owner_name: &str,
    to: String,
) -> Mail {
    let subject = match kind {
        WorkshopMailKind::Scheduled => format!("MeetFinder - Workshop - {}", workshop.subject),
        WorkshopMailKind::Updated => {
            format!("MeetFinder - Workshop - {} (updated)", workshop.subject)
        }
        WorkshopMailKind::Cancelled => {
            format!("MeetFinder - Workshop - {} (cancelled)", workshop.subject)
        }
    };
    let lead = match kind {
        WorkshopMailKind::Scheduled => {
            "Hi! A workshop was scheduled for a poll you took part in.\n\
             Save the details below and don't miss it!"
        }
        WorkshopMailKind::Updated => {
            "Hi! The workshop for a poll you took part in was changed.\n\
             Save the details below and don't miss it!"
        }
        WorkshopMailKind::Cancelled => {
            "Hi! Unfortunately the following workshop for a poll you took part in was cancelled."
        }
    };
    let text = format!(
        "{lead}\n\n{}\nSubject: {}\nDate: {}\nOrganizer: {owner_name}\nRoom: {}",
        workshop.name, workshop.subject, workshop.date, workshop.room
    );
    Mail { to, subject, text }
}
