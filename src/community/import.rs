//! Bulk member seeding from a CSV export of the class roster.
//!
//! Expected header: `parent_name,parent_email,parent_whatsapp,payment_alias,child_name,child_birthdate`.

use std::collections::HashSet;
use std::io::Read;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::dashboard::members_of;
use super::models::{Community, NewMember};
use super::onboarding::join_community;
use crate::config::normalize_email;
use crate::error::{AppError, Result};
use crate::store::Store;

#[derive(Debug, Deserialize)]
struct MemberRow {
    parent_name: String,
    #[serde(default)]
    parent_email: Option<String>,
    #[serde(default)]
    parent_whatsapp: Option<String>,
    #[serde(default)]
    payment_alias: Option<String>,
    child_name: String,
    child_birthdate: String,
}

impl From<MemberRow> for NewMember {
    fn from(row: MemberRow) -> Self {
        NewMember {
            parent_name: row.parent_name,
            parent_email: row.parent_email,
            parent_whatsapp: row.parent_whatsapp,
            payment_alias: row.payment_alias,
            child_name: row.child_name,
            child_birthdate: row.child_birthdate,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped_duplicates: usize,
    /// One entry per rejected line, prefixed with its line number.
    pub errors: Vec<String>,
}

fn roster_key(email: Option<&str>, child_name: &str) -> Option<(String, String)> {
    let email = normalize_email(email?);
    if email.is_empty() {
        return None;
    }
    Some((email, child_name.trim().to_lowercase()))
}

/// Imports every valid row. Rows already on the roster (same parent email
/// and child name) are skipped; invalid rows are reported and do not stop
/// the import.
pub async fn import_members_csv<R: Read>(
    store: &Store,
    community_id: &str,
    reader: R,
    now: DateTime<Utc>,
) -> Result<ImportReport> {
    let community: Option<Community> = store.get(community_id).await?;
    if community.is_none() {
        return Err(AppError::not_found("community", community_id));
    }

    let mut seen: HashSet<(String, String)> = members_of(store, community_id)
        .await?
        .iter()
        .filter_map(|m| roster_key(m.parent_email.as_deref(), &m.child_name))
        .collect();

    let mut csv = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut report = ImportReport::default();

    for (index, row) in csv.deserialize::<MemberRow>().enumerate() {
        // Header is line 1.
        let line = index + 2;
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                report.errors.push(format!("line {line}: {e}"));
                continue;
            }
        };

        let key = roster_key(row.parent_email.as_deref(), &row.child_name);
        if key.as_ref().is_some_and(|k| seen.contains(k)) {
            report.skipped_duplicates += 1;
            continue;
        }

        match join_community(store, community_id, &row.into(), now).await {
            Ok(_) => {
                report.imported += 1;
                if let Some(key) = key {
                    seen.insert(key);
                }
            }
            Err(AppError::Validation(msg)) => report.errors.push(format!("line {line}: {msg}")),
            Err(e) => return Err(e),
        }
    }

    tracing::info!(
        community = %community_id,
        imported = report.imported,
        skipped = report.skipped_duplicates,
        rejected = report.errors.len(),
        "member import finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{community, member};

    const ROSTER: &str = "\
parent_name,parent_email,parent_whatsapp,payment_alias,child_name,child_birthdate
Laura Gómez,Laura@Mail.com,11 4444-1111,laura.mp,Lola,2018-05-18
Pablo Ruiz,pablo@mail.com,,,Tomás,02/11/2018
Sin Fecha,nofecha@mail.com,,,Juan,pronto
Ana Díaz,ana@mail.com,,,Sofi,2018-07-01
";

    #[tokio::test]
    async fn imports_valid_rows_and_reports_the_rest() {
        let store = Store::memory();
        store.insert(&community("k1")).await.unwrap();
        let mut existing = member("m1", "k1", Some("ana@mail.com"), "2018-07-01");
        existing.child_name = "Sofi".into();
        store.insert(&existing).await.unwrap();

        let report = import_members_csv(&store, "k1", ROSTER.as_bytes(), Utc::now())
            .await
            .unwrap();
        assert_eq!(report.imported, 2);
        assert_eq!(report.skipped_duplicates, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("line 4:"));

        let members = members_of(&store, "k1").await.unwrap();
        assert_eq!(members.len(), 3);
        assert!(members.iter().any(|m| m.parent_email.as_deref() == Some("laura@mail.com")));

        let again = import_members_csv(&store, "k1", ROSTER.as_bytes(), Utc::now())
            .await
            .unwrap();
        assert_eq!(again.imported, 0);
        assert_eq!(again.skipped_duplicates, 3);
    }

    #[tokio::test]
    async fn unknown_community_is_rejected_before_reading() {
        let store = Store::memory();
        let err = import_members_csv(&store, "nope", ROSTER.as_bytes(), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
