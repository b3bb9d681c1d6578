//! Sequential reminder runs over the contributors of one collection.
//!
//! Each contributor is sent, then flagged. A failure is recorded and the run
//! moves on; nothing already sent is rolled back.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::email::reminder_email;
use super::whatsapp::{reminder_text, whatsapp_link};
use super::Mailer;
use crate::community::dashboard::contributors_of;
use crate::community::models::{ActiveEvent, Community, Contributor, PaymentStatus};
use crate::error::{AppError, Result};
use crate::store::Store;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Skipped {
    pub contributor_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Failed {
    pub contributor_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchReport {
    pub sent: Vec<String>,
    pub skipped: Vec<Skipped>,
    pub failed: Vec<Failed>,
}

impl DispatchReport {
    fn skip(&mut self, contributor_id: &str, reason: &str) {
        self.skipped.push(Skipped {
            contributor_id: contributor_id.to_string(),
            reason: reason.to_string(),
        });
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WhatsAppLink {
    pub contributor_id: String,
    pub parent_name: String,
    /// `None` when the contributor has no usable phone number.
    pub url: Option<String>,
    /// Whether `whatsapp_notified` was saved for this contributor.
    pub marked: bool,
}

#[derive(Clone)]
pub struct Dispatcher {
    store: Store,
    mailer: Arc<dyn Mailer>,
}

impl Dispatcher {
    pub fn new(store: Store, mailer: Arc<dyn Mailer>) -> Self {
        Self { store, mailer }
    }

    async fn load(&self, active_event_id: &str) -> Result<(ActiveEvent, Community, Vec<Contributor>)> {
        let event: ActiveEvent = self
            .store
            .get(active_event_id)
            .await?
            .ok_or_else(|| AppError::not_found("active event", active_event_id))?;
        let community: Community = self
            .store
            .get(&event.community_id)
            .await?
            .ok_or_else(|| AppError::not_found("community", &event.community_id))?;
        let contributors = contributors_of(&self.store, active_event_id).await?;
        Ok((event, community, contributors))
    }

    /// An empty selection means every contributor still pending payment.
    /// Selected ids that do not belong to the event are reported as skipped.
    fn select(
        contributors: Vec<Contributor>,
        selection: &[String],
        report: &mut DispatchReport,
    ) -> Vec<Contributor> {
        if selection.is_empty() {
            return contributors
                .into_iter()
                .filter(|c| c.payment_status == PaymentStatus::Pending)
                .collect();
        }
        for id in selection {
            if !contributors.iter().any(|c| &c.id == id) {
                report.skip(id, "not a contributor of this event");
            }
        }
        contributors
            .into_iter()
            .filter(|c| selection.contains(&c.id))
            .collect()
    }

    pub async fn send_email_reminders(
        &self,
        active_event_id: &str,
        selection: &[String],
        force: bool,
        now: DateTime<Utc>,
    ) -> Result<DispatchReport> {
        let (event, community, contributors) = self.load(active_event_id).await?;
        let mut report = DispatchReport::default();

        for contributor in Self::select(contributors, selection, &mut report) {
            if contributor.email_notified && !force {
                report.skip(&contributor.id, "already notified");
                continue;
            }
            let Some(email) = reminder_email(&contributor, &event, &community) else {
                report.skip(&contributor.id, "no email address");
                continue;
            };

            if let Err(e) = self.mailer.send(&email).await {
                tracing::warn!(contributor = %contributor.id, to = %email.to, error = %e, "reminder email failed");
                report.failed.push(Failed {
                    contributor_id: contributor.id.clone(),
                    error: e.to_string(),
                });
                continue;
            }

            let patch = serde_json::json!({ "email_notified": true, "email_notified_at": now });
            if let Err(e) = self.store.update::<Contributor>(&contributor.id, patch).await {
                tracing::error!(contributor = %contributor.id, error = %e, "email sent but flag not saved");
                report.failed.push(Failed {
                    contributor_id: contributor.id.clone(),
                    error: format!("sent, but the flag was not saved: {e}"),
                });
                continue;
            }
            tracing::info!(contributor = %contributor.id, to = %email.to, "reminder email sent");
            report.sent.push(contributor.id);
        }

        tracing::info!(
            active_event = %active_event_id,
            sent = report.sent.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "email reminders finished"
        );
        Ok(report)
    }

    /// One link per selected contributor. With `mark`, contributors that
    /// got a link are flagged as notified.
    pub async fn whatsapp_links(
        &self,
        active_event_id: &str,
        selection: &[String],
        mark: bool,
        now: DateTime<Utc>,
    ) -> Result<Vec<WhatsAppLink>> {
        let (event, community, contributors) = self.load(active_event_id).await?;
        let mut ignored = DispatchReport::default();
        let mut links = Vec::new();

        for contributor in Self::select(contributors, selection, &mut ignored) {
            let phone = contributor
                .parent_whatsapp
                .as_deref()
                .or(contributor.parent_phone.as_deref())
                .unwrap_or_default();
            let text = reminder_text(&contributor, &event, &community);
            links.push(WhatsAppLink {
                contributor_id: contributor.id,
                parent_name: contributor.parent_name,
                url: whatsapp_link(phone, &text).map(String::from),
                marked: false,
            });
        }
        if mark {
            self.mark_whatsapp(&mut links, now).await;
        }
        Ok(links)
    }

    /// Flags every link with a url. A failed write is logged and leaves
    /// that link unmarked; the rest of the run goes on.
    async fn mark_whatsapp(&self, links: &mut [WhatsAppLink], now: DateTime<Utc>) {
        for link in links.iter_mut().filter(|l| l.url.is_some()) {
            let patch = serde_json::json!({ "whatsapp_notified": true, "whatsapp_notified_at": now });
            match self.store.update::<Contributor>(&link.contributor_id, patch).await {
                Ok(_) => link.marked = true,
                Err(e) => {
                    tracing::error!(contributor = %link.contributor_id, error = %e, "whatsapp flag not saved");
                }
            }
        }
    }
}
