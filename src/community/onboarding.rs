use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::birthdays::parse_birthdate;
use super::models::{Community, CommunityStatus, Member, MemberStatus, NewMember};
use super::slug::{community_id, slugify};
use super::sync::sync_contributors;
use crate::config::normalize_email;
use crate::error::{AppError, Result};
use crate::store::{Query, Store, StoreError};

const MAX_ID_ATTEMPTS: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    Basics,
    Creator,
    Contribution,
}

impl WizardStep {
    pub const ALL: [WizardStep; 3] = [WizardStep::Basics, WizardStep::Creator, WizardStep::Contribution];
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    fn new(field: &'static str, message: &str) -> Self {
        Self {
            field,
            message: message.to_string(),
        }
    }
}

/// Everything the "create community" wizard collects.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommunityDraft {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub institution: String,
    #[serde(default)]
    pub grade: String,
    #[serde(default)]
    pub division: String,
    #[serde(default)]
    pub creator_name: String,
    #[serde(default)]
    pub creator_email: String,
    pub creator_whatsapp: Option<String>,
    pub creator_alias: Option<String>,
    pub contribution_amount: Option<f64>,
    /// When both are present the creator also joins as the first member.
    pub creator_child_name: Option<String>,
    pub creator_child_birthdate: Option<String>,
}

impl CommunityDraft {
    pub fn validate_step(&self, step: WizardStep) -> Vec<FieldError> {
        let mut errors = Vec::new();
        match step {
            WizardStep::Basics => {
                require(&mut errors, "institution", &self.institution);
                if !self.institution.trim().is_empty() && slugify(&self.institution).is_empty() {
                    errors.push(FieldError::new(
                        "institution",
                        "needs at least one letter or digit from a-z or 0-9",
                    ));
                }
                require(&mut errors, "grade", &self.grade);
                require(&mut errors, "division", &self.division);
            }
            WizardStep::Creator => {
                require(&mut errors, "creator_name", &self.creator_name);
                if !is_valid_email(&self.creator_email) {
                    errors.push(FieldError::new("creator_email", "a valid email is required"));
                }
                if let Some(whatsapp) = self.creator_whatsapp.as_deref() {
                    if !whatsapp.trim().is_empty() && !has_phone_digits(whatsapp) {
                        errors.push(FieldError::new("creator_whatsapp", "phone number has no digits"));
                    }
                }
                match (
                    non_blank(self.creator_child_name.as_deref()),
                    non_blank(self.creator_child_birthdate.as_deref()),
                ) {
                    (Some(_), Some(date)) if parse_birthdate(date).is_none() => {
                        errors.push(FieldError::new(
                            "creator_child_birthdate",
                            "use YYYY-MM-DD or DD/MM/YYYY",
                        ));
                    }
                    (Some(_), None) => errors.push(FieldError::new(
                        "creator_child_birthdate",
                        "birthdate is required with a child name",
                    )),
                    (None, Some(_)) => errors.push(FieldError::new(
                        "creator_child_name",
                        "child name is required with a birthdate",
                    )),
                    _ => {}
                }
            }
            WizardStep::Contribution => match self.contribution_amount {
                Some(amount) if amount.is_finite() && amount > 0.0 => {}
                _ => errors.push(FieldError::new(
                    "contribution_amount",
                    "amount per person must be greater than zero",
                )),
            },
        }
        errors
    }

    pub fn validate(&self) -> Vec<FieldError> {
        WizardStep::ALL
            .iter()
            .flat_map(|step| self.validate_step(*step))
            .collect()
    }

    fn display_name(&self) -> String {
        match non_blank(Some(self.name.as_str())) {
            Some(name) => name.to_string(),
            None => format!("{} {} - {}", self.grade.trim(), self.division.trim(), self.institution.trim()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedCommunity {
    pub community: Community,
    pub creator_member: Option<Member>,
}

/// Final wizard submission.
pub async fn create_community(
    store: &Store,
    draft: &CommunityDraft,
    now: DateTime<Utc>,
) -> Result<CreatedCommunity> {
    reject_field_errors(draft.validate())?;

    let mut community = Community {
        id: String::new(),
        name: draft.display_name(),
        institution: draft.institution.trim().to_string(),
        grade: draft.grade.trim().to_string(),
        division: draft.division.trim().to_string(),
        creator_name: draft.creator_name.trim().to_string(),
        creator_email: normalize_email(&draft.creator_email),
        creator_whatsapp: non_blank(draft.creator_whatsapp.as_deref()).map(str::to_string),
        creator_alias: non_blank(draft.creator_alias.as_deref()).map(str::to_string),
        contribution_amount: draft.contribution_amount.unwrap_or_default(),
        status: CommunityStatus::Active,
        created_at: now,
        updated_at: now,
    };

    // Ids are only probably unique; step the timestamp on a clash.
    let millis = now.timestamp_millis();
    let mut attempt = 0;
    loop {
        community.id = community_id(&draft.institution, &draft.grade, &draft.division, millis + attempt);
        match store.insert(&community).await {
            Ok(()) => break,
            Err(StoreError::Conflict(_)) if attempt + 1 < MAX_ID_ATTEMPTS => {
                tracing::debug!(id = %community.id, "community id taken, retrying");
                attempt += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
    tracing::info!(community = %community.id, "community created");

    let creator_member = match (
        non_blank(draft.creator_child_name.as_deref()),
        non_blank(draft.creator_child_birthdate.as_deref()),
    ) {
        (Some(child_name), Some(birthdate)) => {
            let member = NewMember {
                parent_name: community.creator_name.clone(),
                parent_email: Some(community.creator_email.clone()),
                parent_whatsapp: community.creator_whatsapp.clone(),
                payment_alias: community.creator_alias.clone(),
                child_name: child_name.to_string(),
                child_birthdate: birthdate.to_string(),
            };
            Some(join_community(store, &community.id, &member, now).await?)
        }
        _ => None,
    };

    Ok(CreatedCommunity {
        community,
        creator_member,
    })
}

pub fn validate_member(member: &NewMember) -> Vec<FieldError> {
    let mut errors = Vec::new();
    require(&mut errors, "parent_name", &member.parent_name);
    require(&mut errors, "child_name", &member.child_name);
    if parse_birthdate(&member.child_birthdate).is_none() {
        errors.push(FieldError::new("child_birthdate", "use YYYY-MM-DD or DD/MM/YYYY"));
    }
    if let Some(email) = non_blank(member.parent_email.as_deref()) {
        if !is_valid_email(email) {
            errors.push(FieldError::new("parent_email", "invalid email"));
        }
    }
    errors
}

/// Adds a member to an active community and gives them a contributor row on
/// each open event.
pub async fn join_community(
    store: &Store,
    community_id: &str,
    new_member: &NewMember,
    now: DateTime<Utc>,
) -> Result<Member> {
    reject_field_errors(validate_member(new_member))?;

    let community: Community = store
        .get(community_id)
        .await?
        .ok_or_else(|| AppError::not_found("community", community_id))?;
    if community.status != CommunityStatus::Active {
        return Err(AppError::Validation(format!("community {community_id} is not active")));
    }

    let parent_email = non_blank(new_member.parent_email.as_deref()).map(normalize_email);
    if let Some(email) = parent_email.as_deref() {
        let same_parent: Vec<Member> = store
            .list(&Query::new().eq("community_id", community_id).eq("parent_email", email))
            .await?;
        let child = new_member.child_name.trim();
        if same_parent.iter().any(|m| m.child_name.trim().eq_ignore_ascii_case(child)) {
            return Err(AppError::Validation(format!(
                "{email} is already registered with {child}"
            )));
        }
    }

    let member = Member {
        id: Uuid::new_v4().to_string(),
        community_id: community_id.to_string(),
        parent_name: new_member.parent_name.trim().to_string(),
        parent_email,
        parent_whatsapp: non_blank(new_member.parent_whatsapp.as_deref()).map(str::to_string),
        payment_alias: non_blank(new_member.payment_alias.as_deref()).map(str::to_string),
        child_name: new_member.child_name.trim().to_string(),
        child_birthdate: new_member.child_birthdate.trim().to_string(),
        status: MemberStatus::Active,
        created_at: now,
    };
    store.insert(&member).await?;
    tracing::info!(community = %community_id, member = %member.id, "member joined");

    sync_contributors(store, Some(community_id)).await?;
    Ok(member)
}

pub(crate) fn reject_field_errors(errors: Vec<FieldError>) -> Result<()> {
    if errors.is_empty() {
        return Ok(());
    }
    let message = errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ");
    Err(AppError::Validation(message))
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    email.trim().parse::<lettre::Address>().is_ok()
}

fn has_phone_digits(phone: &str) -> bool {
    phone.chars().any(|c| c.is_ascii_digit())
}

fn require(errors: &mut Vec<FieldError>, field: &'static str, value: &str) {
    if value.trim().is_empty() {
        errors.push(FieldError::new(field, "required"));
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
