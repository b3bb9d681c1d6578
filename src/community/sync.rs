//! Keeps the contributor rows of open events in line with the member table.
//!
//! Contributors carry a copy of their member's contact fields. Every write
//! to that copy goes through [`sync_event`], which matches on the normalized
//! email and falls back to the member id, so reruns never add rows.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::dashboard::{active_events_of, contributors_of, members_of};
use super::models::{
    ActiveEvent, Community, CommunityStatus, Contributor, Member, MemberStatus, PaymentStatus,
};
use crate::error::{AppError, Result};
use crate::store::{Query, Store};

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
}

impl SyncReport {
    fn absorb(&mut self, other: SyncReport) {
        self.created += other.created;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
    }
}

/// Sync every open event of one community, or of all active communities.
pub async fn sync_contributors(store: &Store, scope: Option<&str>) -> Result<SyncReport> {
    let communities: Vec<Community> = match scope {
        Some(id) => vec![
            store
                .get(id)
                .await?
                .ok_or_else(|| AppError::not_found("community", id))?,
        ],
        None => {
            store
                .list(&Query::new().eq("status", "active"))
                .await?
        }
    };

    let mut report = SyncReport::default();
    for community in &communities {
        if community.status != CommunityStatus::Active {
            tracing::debug!(community = %community.id, "skipping inactive community");
            continue;
        }
        let members = members_of(store, &community.id).await?;
        for event in active_events_of(store, &community.id).await? {
            if !event.status.is_open() {
                continue;
            }
            let event_report = sync_event(store, community, &event, &members).await?;
            tracing::info!(
                community = %community.id,
                active_event = %event.id,
                created = event_report.created,
                updated = event_report.updated,
                "synced contributors"
            );
            report.absorb(event_report);
        }
    }
    Ok(report)
}

/// Upsert one contributor per active member of `community` on `event`.
pub async fn sync_event(
    store: &Store,
    community: &Community,
    event: &ActiveEvent,
    members: &[Member],
) -> Result<SyncReport> {
    let mut existing = contributors_of(store, &event.id).await?;
    let mut report = SyncReport::default();

    for member in members.iter().filter(|m| m.status == MemberStatus::Active) {
        match find_contributor(&existing, member) {
            Some(idx) => {
                let patch = mirror_patch(&existing[idx], member);
                if patch.is_empty() {
                    report.unchanged += 1;
                    continue;
                }
                let id = existing[idx].id.clone();
                match store.update::<Contributor>(&id, Value::Object(patch)).await? {
                    Some(updated) => existing[idx] = updated,
                    None => tracing::warn!(contributor = %id, "contributor vanished during sync"),
                }
                report.updated += 1;
            }
            None => {
                let contributor = new_contributor(community, event, member);
                store.insert(&contributor).await?;
                existing.push(contributor);
                report.created += 1;
            }
        }
    }
    Ok(report)
}

/// Email first, member id second. A contributor already linked to a
/// different member is only matched through the email.
fn find_contributor(existing: &[Contributor], member: &Member) -> Option<usize> {
    if let Some(email) = member.normalized_email() {
        if let Some(idx) = existing
            .iter()
            .position(|c| c.normalized_email().as_deref() == Some(email.as_str()))
        {
            return Some(idx);
        }
    }
    existing
        .iter()
        .position(|c| c.member_id.as_deref() == Some(member.id.as_str()))
}

/// Fields of `contributor` that differ from `member`, as a merge patch.
fn mirror_patch(contributor: &Contributor, member: &Member) -> Map<String, Value> {
    let mut patch = Map::new();
    match contributor.member_id.as_deref() {
        None => {
            patch.insert("member_id".into(), Value::from(member.id.as_str()));
        }
        Some(linked) if linked != member.id => return patch,
        Some(_) => {}
    }

    let mut mirror = |field: &str, current: Option<&str>, wanted: Option<&str>| {
        if current != wanted {
            patch.insert(field.to_string(), wanted.map_or(Value::Null, Value::from));
        }
    };
    mirror(
        "parent_name",
        Some(contributor.parent_name.as_str()),
        Some(member.parent_name.as_str()),
    );
    mirror(
        "parent_email",
        contributor.parent_email.as_deref(),
        member.parent_email.as_deref(),
    );
    mirror(
        "parent_phone",
        contributor.parent_phone.as_deref(),
        member.parent_whatsapp.as_deref(),
    );
    mirror(
        "parent_whatsapp",
        contributor.parent_whatsapp.as_deref(),
        member.parent_whatsapp.as_deref(),
    );
    patch
}

fn new_contributor(community: &Community, event: &ActiveEvent, member: &Member) -> Contributor {
    Contributor {
        id: Uuid::new_v4().to_string(),
        active_event_id: event.id.clone(),
        community_id: community.id.clone(),
        member_id: Some(member.id.clone()),
        parent_name: member.parent_name.clone(),
        parent_email: member.parent_email.clone(),
        parent_phone: member.parent_whatsapp.clone(),
        parent_whatsapp: member.parent_whatsapp.clone(),
        amount: community.contribution_amount,
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

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct LinkReport {
    pub linked_by_email: usize,
    pub linked_by_name: usize,
    pub unresolved: Vec<String>,
}

/// Fill in `member_id` on contributors that lost it. Email within the same
/// community wins; otherwise the single best parent-name match at or above
/// `threshold` (Jaro-Winkler) is used.
pub async fn repair_member_links(store: &Store, threshold: f64) -> Result<LinkReport> {
    let contributors: Vec<Contributor> = store.all().await?;
    let mut members_by_community: HashMap<String, Vec<Member>> = HashMap::new();
    let mut report = LinkReport::default();

    for contributor in contributors.iter().filter(|c| c.member_id.is_none()) {
        if !members_by_community.contains_key(&contributor.community_id) {
            let members = members_of(store, &contributor.community_id).await?;
            members_by_community.insert(contributor.community_id.clone(), members);
        }
        let members = &members_by_community[&contributor.community_id];

        let (member_id, by_email) = match link_candidate(contributor, members, threshold) {
            Some(found) => found,
            None => {
                tracing::warn!(
                    contributor = %contributor.id,
                    parent = %contributor.parent_name,
                    "no member matches contributor"
                );
                report.unresolved.push(contributor.id.clone());
                continue;
            }
        };

        let patch = serde_json::json!({ "member_id": member_id });
        store.update::<Contributor>(&contributor.id, patch).await?;
        if by_email {
            report.linked_by_email += 1;
        } else {
            report.linked_by_name += 1;
        }
    }
    Ok(report)
}

fn link_candidate(contributor: &Contributor, members: &[Member], threshold: f64) -> Option<(String, bool)> {
    if let Some(email) = contributor.normalized_email() {
        if let Some(member) = members
            .iter()
            .find(|m| m.normalized_email().as_deref() == Some(email.as_str()))
        {
            return Some((member.id.clone(), true));
        }
    }

    let wanted = normalize_name(&contributor.parent_name);
    if wanted.is_empty() {
        return None;
    }
    let mut scored: Vec<(f64, &Member)> = members
        .iter()
        .map(|m| (strsim::jaro_winkler(&wanted, &normalize_name(&m.parent_name)), m))
        .filter(|(score, _)| *score >= threshold)
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));

    match scored.as_slice() {
        [(_, best)] => Some((best.id.clone(), false)),
        [(top, best), (second, _), ..] if top > second => Some((best.id.clone(), false)),
        _ => None,
    }
}

fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .map(super::slug::slugify)
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Drift {
    pub contributor_id: String,
    pub member_id: String,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DuplicatePair {
    pub active_event_id: String,
    pub email: String,
    pub contributor_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CoverageGap {
    pub active_event_id: String,
    pub member_id: String,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct DiagnosticReport {
    pub missing_member_link: Vec<String>,
    pub orphan_links: Vec<String>,
    pub drifted: Vec<Drift>,
    pub duplicates: Vec<DuplicatePair>,
    pub coverage_gaps: Vec<CoverageGap>,
}

impl DiagnosticReport {
    pub fn is_clean(&self) -> bool {
        self.missing_member_link.is_empty()
            && self.orphan_links.is_empty()
            && self.drifted.is_empty()
            && self.duplicates.is_empty()
            && self.coverage_gaps.is_empty()
    }
}

/// Read-only health report of the member/contributor copy.
pub async fn diagnose(store: &Store) -> Result<DiagnosticReport> {
    let members: Vec<Member> = store.all().await?;
    let events: Vec<ActiveEvent> = store.all().await?;
    let contributors: Vec<Contributor> = store.all().await?;

    let members_by_id: HashMap<&str, &Member> = members.iter().map(|m| (m.id.as_str(), m)).collect();
    let mut report = DiagnosticReport::default();

    let mut by_event_email: BTreeMap<(String, String), Vec<String>> = BTreeMap::new();
    for c in &contributors {
        if let Some(email) = c.normalized_email() {
            by_event_email
                .entry((c.active_event_id.clone(), email))
                .or_default()
                .push(c.id.clone());
        }

        let Some(member_id) = c.member_id.as_deref() else {
            report.missing_member_link.push(c.id.clone());
            continue;
        };
        let Some(member) = members_by_id.get(member_id) else {
            report.orphan_links.push(c.id.clone());
            continue;
        };
        let fields: Vec<String> = mirror_patch(c, member)
            .keys()
            .filter(|k| k.as_str() != "member_id")
            .cloned()
            .collect();
        if !fields.is_empty() {
            report.drifted.push(Drift {
                contributor_id: c.id.clone(),
                member_id: member.id.clone(),
                fields,
            });
        }
    }

    report.duplicates = by_event_email
        .into_iter()
        .filter(|(_, ids)| ids.len() > 1)
        .map(|((active_event_id, email), contributor_ids)| DuplicatePair {
            active_event_id,
            email,
            contributor_ids,
        })
        .collect();

    for event in events.iter().filter(|e| e.status.is_open()) {
        let on_event: Vec<&Contributor> = contributors
            .iter()
            .filter(|c| c.active_event_id == event.id)
            .collect();
        for member in members
            .iter()
            .filter(|m| m.community_id == event.community_id && m.status == MemberStatus::Active)
        {
            let covered = on_event.iter().any(|c| {
                c.member_id.as_deref() == Some(member.id.as_str())
                    || (member.normalized_email().is_some() && c.normalized_email() == member.normalized_email())
            });
            if !covered {
                report.coverage_gaps.push(CoverageGap {
                    active_event_id: event.id.clone(),
                    member_id: member.id.clone(),
                });
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Table;
    use crate::testutil::{active_event, community, contributor, member};

    async fn seeded() -> Store {
        let store = Store::memory();
        store.insert(&community("k1")).await.unwrap();
        store
            .insert(&member("m1", "k1", Some("Laura@Mail.com"), "2018-05-18"))
            .await
            .unwrap();
        store.insert(&member("m2", "k1", None, "2018-07-02")).await.unwrap();
        store.insert(&active_event("ae1", "k1", 1000.0)).await.unwrap();
        store
    }

    #[tokio::test]
    async fn second_run_creates_nothing() {
        let store = seeded().await;

        let first = sync_contributors(&store, None).await.unwrap();
        assert_eq!(first.created, 2);

        let second = sync_contributors(&store, None).await.unwrap();
        assert_eq!(second, SyncReport { created: 0, updated: 0, unchanged: 2 });
        assert_eq!(store.count(Table::Contributors).await.unwrap(), 2);

        let report = diagnose(&store).await.unwrap();
        assert!(report.is_clean(), "{report:?}");
    }

    #[tokio::test]
    async fn existing_row_with_same_email_is_updated_not_duplicated() {
        let store = seeded().await;
        // Legacy row: different casing, stale phone, no member link.
        let mut legacy = contributor("legacy", "ae1", Some("laura@mail.com "), 500.0);
        legacy.parent_name = "Laura".into();
        store.insert(&legacy).await.unwrap();

        let report = sync_contributors(&store, Some("k1")).await.unwrap();
        assert_eq!(report.created, 1);
        assert_eq!(report.updated, 1);

        let rows = contributors_of(&store, "ae1").await.unwrap();
        assert_eq!(rows.len(), 2);
        let fixed = rows.iter().find(|c| c.id == "legacy").unwrap();
        assert_eq!(fixed.member_id.as_deref(), Some("m1"));
        assert_eq!(fixed.parent_name, "Parent m1");
        assert_eq!(fixed.parent_whatsapp.as_deref(), Some("11 4444-0000"));
    }

    #[tokio::test]
    async fn member_without_email_is_matched_by_id() {
        let store = seeded().await;
        sync_contributors(&store, None).await.unwrap();

        // Member gains an email after the first sync.
        store
            .update::<Member>("m2", serde_json::json!({ "parent_email": "pablo@mail.com" }))
            .await
            .unwrap();
        let report = sync_contributors(&store, None).await.unwrap();
        assert_eq!(report.created, 0);
        assert_eq!(report.updated, 1);
    }

    #[tokio::test]
    async fn repair_links_by_email_then_name() {
        let store = seeded().await;
        store
            .insert(&contributor("by-email", "ae1", Some("laura@mail.com"), 500.0))
            .await
            .unwrap();
        let mut by_name = contributor("by-name", "ae1", None, 500.0);
        by_name.parent_name = "parent  M2".into();
        store.insert(&by_name).await.unwrap();
        let mut stranger = contributor("stranger", "ae1", None, 500.0);
        stranger.parent_name = "Zulema Quiroga".into();
        store.insert(&stranger).await.unwrap();

        let report = repair_member_links(&store, 0.92).await.unwrap();
        assert_eq!(report.linked_by_email, 1);
        assert_eq!(report.linked_by_name, 1);
        assert_eq!(report.unresolved, vec!["stranger".to_string()]);

        let linked: Contributor = store.get("by-name").await.unwrap().unwrap();
        assert_eq!(linked.member_id.as_deref(), Some("m2"));
    }

    #[tokio::test]
    async fn tied_name_matches_stay_unresolved() {
        let store = seeded().await;
        let mut namesake = member("m3", "k1", None, "2019-01-20");
        namesake.parent_name = "Parent m2".into();
        store.insert(&namesake).await.unwrap();
        let mut ambiguous = contributor("ambiguous", "ae1", None, 500.0);
        ambiguous.parent_name = "parent m2".into();
        store.insert(&ambiguous).await.unwrap();

        let report = repair_member_links(&store, 0.92).await.unwrap();
        assert_eq!(report.linked_by_name, 0);
        assert_eq!(report.unresolved, vec!["ambiguous".to_string()]);

        let untouched: Contributor = store.get("ambiguous").await.unwrap().unwrap();
        assert_eq!(untouched.member_id, None);
    }

    #[tokio::test]
    async fn diagnose_flags_duplicates_orphans_and_gaps() {
        let store = seeded().await;
        store
            .insert(&contributor("d1", "ae1", Some("laura@mail.com"), 500.0))
            .await
            .unwrap();
        store
            .insert(&contributor("d2", "ae1", Some("LAURA@mail.com"), 500.0))
            .await
            .unwrap();
        let mut orphan = contributor("o1", "ae1", Some("ghost@mail.com"), 500.0);
        orphan.member_id = Some("deleted-member".into());
        store.insert(&orphan).await.unwrap();

        let report = diagnose(&store).await.unwrap();
        assert_eq!(report.duplicates.len(), 1);
        assert_eq!(report.duplicates[0].contributor_ids, vec!["d1", "d2"]);
        assert_eq!(report.orphan_links, vec!["o1"]);
        assert_eq!(report.missing_member_link, vec!["d1", "d2"]);
        assert_eq!(
            report.coverage_gaps,
            vec![CoverageGap { active_event_id: "ae1".into(), member_id: "m2".into() }]
        );
    }
}
