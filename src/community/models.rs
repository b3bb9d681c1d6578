use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::store::{Record, Table};

/// Closed status sets. `transition` is the only way a status changes.
pub trait Status: Copy + PartialEq + std::fmt::Debug {
    fn allows(self, next: Self) -> bool;

    fn transition(self, next: Self) -> Result<Self, AppError> {
        if self == next || self.allows(next) {
            Ok(next)
        } else {
            Err(AppError::InvalidTransition(format!("{self:?} -> {next:?}")))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CommunityStatus {
    #[default]
    Active,
    Inactive,
}

impl Status for CommunityStatus {
    fn allows(self, _next: Self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    #[default]
    Active,
    Inactive,
}

impl Status for MemberStatus {
    fn allows(self, _next: Self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    #[default]
    Pending,
    Active,
    Completed,
    Cancelled,
}

impl Status for EventStatus {
    fn allows(self, next: Self) -> bool {
        use EventStatus::*;
        matches!(
            (self, next),
            (Pending, Active) | (Pending, Cancelled) | (Active, Completed) | (Active, Cancelled)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActiveEventStatus {
    Pending,
    #[default]
    Active,
    Completed,
}

impl Status for ActiveEventStatus {
    fn allows(self, next: Self) -> bool {
        use ActiveEventStatus::*;
        matches!((self, next), (Pending, Active) | (Pending, Completed) | (Active, Completed))
    }
}

impl ActiveEventStatus {
    pub fn is_open(self) -> bool {
        self != ActiveEventStatus::Completed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
}

impl Status for PaymentStatus {
    fn allows(self, next: Self) -> bool {
        matches!((self, next), (PaymentStatus::Pending, PaymentStatus::Paid))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Community {
    pub id: String,
    pub name: String,
    pub institution: String,
    pub grade: String,
    pub division: String,
    pub creator_name: String,
    pub creator_email: String,
    pub creator_whatsapp: Option<String>,
    pub creator_alias: Option<String>,
    pub contribution_amount: f64,
    #[serde(default)]
    pub status: CommunityStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    pub community_id: String,
    pub parent_name: String,
    pub parent_email: Option<String>,
    pub parent_whatsapp: Option<String>,
    pub payment_alias: Option<String>,
    pub child_name: String,
    /// Raw as entered: `YYYY-MM-DD` or `DD/MM/YYYY`.
    pub child_birthdate: String,
    #[serde(default)]
    pub status: MemberStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub community_id: String,
    /// Member whose child the event is for, when it was generated from a birthday.
    pub member_id: Option<String>,
    pub child_name: String,
    pub event_date: NaiveDate,
    pub event_type: String,
    pub description: Option<String>,
    #[serde(default)]
    pub status: EventStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveEvent {
    pub id: String,
    pub community_id: String,
    pub event_id: String,
    pub child_name: String,
    pub event_date: NaiveDate,
    pub target_amount: f64,
    #[serde(default)]
    pub amount_raised: f64,
    #[serde(default)]
    pub status: ActiveEventStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contributor {
    pub id: String,
    pub active_event_id: String,
    pub community_id: String,
    pub member_id: Option<String>,
    pub parent_name: String,
    pub parent_email: Option<String>,
    pub parent_phone: Option<String>,
    pub parent_whatsapp: Option<String>,
    /// Amount owed.
    pub amount: f64,
    #[serde(default)]
    pub payment_status: PaymentStatus,
    pub paid_amount: Option<f64>,
    pub payment_method: Option<String>,
    pub payment_reference: Option<String>,
    pub payment_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub email_notified: bool,
    pub email_notified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub whatsapp_notified: bool,
    pub whatsapp_notified_at: Option<DateTime<Utc>>,
}

impl Record for Community {
    const TABLE: Table = Table::Communities;

    fn id(&self) -> &str {
        &self.id
    }
}

impl Record for Member {
    const TABLE: Table = Table::Members;

    fn id(&self) -> &str {
        &self.id
    }
}

impl Record for Event {
    const TABLE: Table = Table::Events;

    fn id(&self) -> &str {
        &self.id
    }
}

impl Record for ActiveEvent {
    const TABLE: Table = Table::ActiveEvents;

    fn id(&self) -> &str {
        &self.id
    }
}

impl Record for Contributor {
    const TABLE: Table = Table::Contributors;

    fn id(&self) -> &str {
        &self.id
    }
}

impl Member {
    pub fn normalized_email(&self) -> Option<String> {
        normalized(self.parent_email.as_deref())
    }
}

impl Contributor {
    pub fn normalized_email(&self) -> Option<String> {
        normalized(self.parent_email.as_deref())
    }

    /// What a paid contributor actually put in; falls back to the owed amount.
    pub fn settled_amount(&self) -> f64 {
        self.paid_amount.unwrap_or(self.amount)
    }
}

fn normalized(email: Option<&str>) -> Option<String> {
    email
        .map(crate::config::normalize_email)
        .filter(|e| !e.is_empty())
}

/// Payload for creating a member, from the join page or the admin panel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMember {
    pub parent_name: String,
    pub parent_email: Option<String>,
    pub parent_whatsapp: Option<String>,
    pub payment_alias: Option<String>,
    pub child_name: String,
    pub child_birthdate: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEvent {
    pub community_id: String,
    pub member_id: Option<String>,
    pub child_name: String,
    pub event_date: NaiveDate,
    #[serde(default = "default_event_type")]
    pub event_type: String,
    pub description: Option<String>,
}

fn default_event_type() -> String {
    "birthday".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommunityUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub institution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub division: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator_whatsapp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator_alias: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contribution_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CommunityStatus>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemberUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_whatsapp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_alias: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child_birthdate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<MemberStatus>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<EventStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_status_moves_forward_only() {
        assert_eq!(EventStatus::Pending.transition(EventStatus::Active).unwrap(), EventStatus::Active);
        assert!(EventStatus::Active.transition(EventStatus::Completed).is_ok());
        assert!(EventStatus::Completed.transition(EventStatus::Pending).is_err());
        assert!(EventStatus::Cancelled.transition(EventStatus::Active).is_err());
        assert!(EventStatus::Pending.transition(EventStatus::Completed).is_err());
    }

    #[test]
    fn paid_is_final() {
        assert!(PaymentStatus::Pending.transition(PaymentStatus::Paid).is_ok());
        assert!(matches!(
            PaymentStatus::Paid.transition(PaymentStatus::Pending),
            Err(AppError::InvalidTransition(_))
        ));
        // Re-writing the current value is allowed.
        assert!(PaymentStatus::Paid.transition(PaymentStatus::Paid).is_ok());
    }

    #[test]
    fn statuses_use_snake_case_on_the_wire() {
        assert_eq!(serde_json::to_string(&EventStatus::Cancelled).unwrap(), "\"cancelled\"");
        let parsed: ActiveEventStatus = serde_json::from_str("\"pending\"").unwrap();
        assert_eq!(parsed, ActiveEventStatus::Pending);
        assert!(serde_json::from_str::<PaymentStatus>("\"refunded\"").is_err());
    }

    #[test]
    fn settled_amount_prefers_recorded_payment() {
        let mut c = Contributor {
            id: "c".into(),
            active_event_id: "e".into(),
            community_id: "k".into(),
            member_id: None,
            parent_name: "Laura".into(),
            parent_email: Some(" Laura@Mail.com ".into()),
            parent_phone: None,
            parent_whatsapp: None,
            amount: 1000.0,
            payment_status: PaymentStatus::Paid,
            paid_amount: None,
            payment_method: None,
            payment_reference: None,
            payment_date: None,
            email_notified: false,
            email_notified_at: None,
            whatsapp_notified: false,
            whatsapp_notified_at: None,
        };
        assert_eq!(c.settled_amount(), 1000.0);
        c.paid_amount = Some(1200.0);
        assert_eq!(c.settled_amount(), 1200.0);
        assert_eq!(c.normalized_email().as_deref(), Some("laura@mail.com"));
    }
}
