//! Signed sessions for members and admins.
//!
//! A login hands back an HS256 token; every later request presents it as a
//! bearer token. Nothing about a session is trusted unless it verifies.

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::community::models::{Community, CommunityStatus, Member, MemberStatus};
use crate::config::{Config, normalize_email};
use crate::error::{AppError, Result};
use crate::store::{Query, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Member,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub community_id: Option<String>,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub token: String,
    pub email: String,
    pub community_id: Option<String>,
    pub role: Role,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl SessionKeys {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::hours(ttl_hours),
        }
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        let secret = cfg
            .session_secret
            .as_deref()
            .ok_or_else(|| AppError::Config("HEYJACK_SESSION_SECRET is not set".into()))?;
        Ok(Self::new(secret, cfg.session_ttl_hours))
    }

    pub fn issue(
        &self,
        email: &str,
        community_id: Option<String>,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<Session> {
        let email = normalize_email(email);
        let expires_at = now + self.ttl;
        let claims = Claims {
            sub: email.clone(),
            community_id: community_id.clone(),
            role,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::Session(format!("failed to sign token: {e}")))?;

        Ok(Session {
            token,
            email,
            community_id,
            role,
            expires_at,
        })
    }

    /// Checks signature and expiry. Admin tokens are only honoured while
    /// the email is still in the configured admin list.
    pub fn verify(&self, token: &str, cfg: &Config) -> Result<Claims> {
        let claims = decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map_err(|e| AppError::Session(format!("invalid token: {e}")))?
            .claims;
        if claims.role == Role::Admin && !cfg.is_admin(&claims.sub) {
            return Err(AppError::Forbidden(format!("{} is no longer an admin", claims.sub)));
        }
        Ok(claims)
    }
}

impl Claims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.exp, 0).single()
    }
}

/// Member login by email. Allow-listed addresses never reach the store.
pub async fn login(
    store: &Store,
    cfg: &Config,
    keys: &SessionKeys,
    email: &str,
    now: DateTime<Utc>,
) -> Result<Session> {
    let email = normalize_email(email);
    if email.is_empty() {
        return Err(AppError::Validation("email: required".into()));
    }

    if let Some(entry) = cfg.allow_listed(&email) {
        tracing::info!(email = %email, "allow-listed login");
        return keys.issue(&email, entry.community_id.clone(), Role::Member, now);
    }

    let members: Vec<Member> = store
        .list(&Query::new().eq("parent_email", email.as_str()))
        .await?;
    if let Some(member) = members.iter().find(|m| m.status == MemberStatus::Active) {
        tracing::info!(email = %email, community = %member.community_id, "member login");
        return keys.issue(&email, Some(member.community_id.clone()), Role::Member, now);
    }

    let created: Vec<Community> = store
        .list(&Query::new().eq("creator_email", email.as_str()))
        .await?;
    if let Some(community) = created.iter().find(|c| c.status == CommunityStatus::Active) {
        tracing::info!(email = %email, community = %community.id, "creator login");
        return keys.issue(&email, Some(community.id.clone()), Role::Member, now);
    }

    tracing::debug!(email = %email, "login for unknown email");
    Err(AppError::Unauthorized(format!("no community found for {email}")))
}

/// An address in `HEYJACK_ADMIN_EMAILS`, plus `HEYJACK_ADMIN_SECRET` when one
/// is configured.
pub fn admin_login(
    cfg: &Config,
    keys: &SessionKeys,
    email: &str,
    secret: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Session> {
    if !cfg.is_admin(email) {
        return Err(AppError::Unauthorized("not an admin".into()));
    }
    if let Some(expected) = cfg.admin_secret.as_deref() {
        if !secret.is_some_and(|given| same_secret(given, expected)) {
            tracing::warn!(email = %normalize_email(email), "admin login with a wrong secret");
            return Err(AppError::Unauthorized("not an admin".into()));
        }
    }
    tracing::info!(email = %normalize_email(email), "admin login");
    keys.issue(email, None, Role::Admin, now)
}

// Compares every byte so the running time does not depend on the first mismatch.
fn same_secret(given: &str, expected: &str) -> bool {
    given.len() == expected.len()
        && given
            .bytes()
            .zip(expected.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AllowListedLogin;
    use crate::store::MemoryStore;
    use crate::testutil::{community, member};

    fn cfg() -> Config {
        Config {
            session_secret: Some("test-secret".into()),
            admin_emails: vec!["admin@heyjack.app".into()],
            login_allow_list: vec![AllowListedLogin {
                email: "demo@heyjack.app".into(),
                community_id: Some("demo1a000001".into()),
            }],
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn allow_listed_login_skips_the_store() {
        let memory = MemoryStore::new();
        memory.set_unavailable(true);
        let store = Store::Memory(memory);
        let cfg = cfg();
        let keys = SessionKeys::from_config(&cfg).unwrap();

        let session = login(&store, &cfg, &keys, " Demo@HeyJack.app ", Utc::now())
            .await
            .unwrap();
        assert_eq!(session.email, "demo@heyjack.app");
        assert_eq!(session.community_id.as_deref(), Some("demo1a000001"));

        let err = login(&store, &cfg, &keys, "someone@mail.com", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Store(_)));
    }

    #[tokio::test]
    async fn members_then_creators_can_log_in() {
        let store = Store::memory();
        store.insert(&community("k1")).await.unwrap();
        store
            .insert(&member("m1", "k1", Some("laura@mail.com"), "2018-05-18"))
            .await
            .unwrap();
        let cfg = cfg();
        let keys = SessionKeys::from_config(&cfg).unwrap();

        let as_member = login(&store, &cfg, &keys, "LAURA@mail.com", Utc::now()).await.unwrap();
        assert_eq!(as_member.community_id.as_deref(), Some("k1"));
        let as_creator = login(&store, &cfg, &keys, "marta@mail.com", Utc::now()).await.unwrap();
        assert_eq!(as_creator.community_id.as_deref(), Some("k1"));

        let claims = keys.verify(&as_member.token, &cfg).unwrap();
        assert_eq!(claims.sub, "laura@mail.com");
        assert_eq!(claims.role, Role::Member);

        let err = login(&store, &cfg, &keys, "nadie@mail.com", Utc::now()).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn expired_and_foreign_tokens_are_rejected() {
        let cfg = cfg();
        let keys = SessionKeys::from_config(&cfg).unwrap();
        let old = keys
            .issue("laura@mail.com", None, Role::Member, Utc::now() - Duration::hours(13))
            .unwrap();
        assert!(matches!(keys.verify(&old.token, &cfg), Err(AppError::Session(_))));

        let other = SessionKeys::new("other-secret", 12)
            .issue("laura@mail.com", None, Role::Member, Utc::now())
            .unwrap();
        assert!(matches!(keys.verify(&other.token, &cfg), Err(AppError::Session(_))));
    }

    #[test]
    fn admin_tokens_lapse_when_the_admin_is_removed() {
        let mut cfg = cfg();
        let keys = SessionKeys::from_config(&cfg).unwrap();
        assert!(admin_login(&cfg, &keys, "laura@mail.com", None, Utc::now()).is_err());

        let session = admin_login(&cfg, &keys, "Admin@HeyJack.app", None, Utc::now()).unwrap();
        assert_eq!(keys.verify(&session.token, &cfg).unwrap().role, Role::Admin);

        cfg.admin_emails.clear();
        assert!(matches!(keys.verify(&session.token, &cfg), Err(AppError::Forbidden(_))));
    }

    #[test]
    fn configured_admin_secret_is_required() {
        let cfg = Config {
            admin_secret: Some("correct horse".into()),
            ..cfg()
        };
        let keys = SessionKeys::from_config(&cfg).unwrap();

        for wrong in [None, Some("correct hors"), Some("Correct horse")] {
            let err = admin_login(&cfg, &keys, "admin@heyjack.app", wrong, Utc::now()).unwrap_err();
            assert!(matches!(err, AppError::Unauthorized(_)), "{wrong:?}");
        }
        let session = admin_login(&cfg, &keys, "admin@heyjack.app", Some("correct horse"), Utc::now()).unwrap();
        assert_eq!(keys.verify(&session.token, &cfg).unwrap().role, Role::Admin);

        // The secret alone is not enough.
        assert!(admin_login(&cfg, &keys, "laura@mail.com", Some("correct horse"), Utc::now()).is_err());
    }

    #[test]
    fn missing_secret_is_a_config_error() {
        assert!(matches!(
            SessionKeys::from_config(&Config::default()),
            Err(AppError::Config(_))
        ));
    }
}
