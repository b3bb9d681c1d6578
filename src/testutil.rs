//! Row builders shared by the unit tests.

use chrono::{NaiveDate, TimeZone, Utc};

use crate::community::models::{
    ActiveEvent, ActiveEventStatus, Community, CommunityStatus, Contributor, Member, MemberStatus,
    PaymentStatus,
};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn community(id: &str) -> Community {
    let now = Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap();
    Community {
        id: id.into(),
        name: "3ro A".into(),
        institution: "Escuela San Martín".into(),
        grade: "3er. Grado".into(),
        division: "A".into(),
        creator_name: "Marta".into(),
        creator_email: "marta@mail.com".into(),
        creator_whatsapp: Some("+54 9 11 5555-0000".into()),
        creator_alias: Some("marta.mp".into()),
        contribution_amount: 500.0,
        status: CommunityStatus::Active,
        created_at: now,
        updated_at: now,
    }
}

pub fn member(id: &str, community_id: &str, email: Option<&str>, birthdate: &str) -> Member {
    Member {
        id: id.into(),
        community_id: community_id.into(),
        parent_name: format!("Parent {id}"),
        parent_email: email.map(str::to_string),
        parent_whatsapp: Some("11 4444-0000".into()),
        payment_alias: None,
        child_name: format!("Child {id}"),
        child_birthdate: birthdate.into(),
        status: MemberStatus::Active,
        created_at: Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap(),
    }
}

pub fn active_event(id: &str, community_id: &str, target: f64) -> ActiveEvent {
    ActiveEvent {
        id: id.into(),
        community_id: community_id.into(),
        event_id: format!("event-{id}"),
        child_name: "Lola".into(),
        event_date: date(2026, 5, 18),
        target_amount: target,
        amount_raised: 0.0,
        status: ActiveEventStatus::Active,
        created_at: Utc.with_ymd_and_hms(2026, 5, 2, 12, 0, 0).unwrap(),
    }
}

pub fn contributor(id: &str, active_event_id: &str, email: Option<&str>, amount: f64) -> Contributor {
    Contributor {
        id: id.into(),
        active_event_id: active_event_id.into(),
        community_id: "k1".into(),
        member_id: None,
        parent_name: format!("Parent {id}"),
        parent_email: email.map(str::to_string),
        parent_phone: None,
        parent_whatsapp: None,
        amount,
        payment_status: PaymentStatus::Pending,
        paid_amount: None,
        payment_method: None,
        payment_reference: None,
        payment_date: None,
        email_notified: false,
        email_notified_at: None,
        whatsapp_notified: false,
        whatsapp_notified_at: None,
    }
}
