//! Participant lanes: who may act on a process lane.

use crate::ast::{RuleOp, Where};
use crate::error::Result;
use crate::Row;
use async_trait::async_trait;
use futures::future::try_join;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;
use std::collections::HashSet;

/// A site user as returned by the user directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteUser {
    pub uuid: String,
    pub username: String,
    #[serde(flatten)]
    pub extra: Row,
}

/// Role members are linked by username, either bare or as a user record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoleMember {
    Username(String),
    Record { username: String },
}

impl RoleMember {
    pub fn username(&self) -> &str {
        match self {
            RoleMember::Username(name) | RoleMember::Record { username: name } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleRecord {
    pub uuid: String,
    #[serde(default)]
    pub users: Vec<RoleMember>,
}

/// Site user and role lookups, filtered with ordinary condition trees.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_users(&self, condition: &Where) -> Result<Vec<SiteUser>>;

    /// Roles with their members populated.
    async fn find_roles(&self, condition: &Where) -> Result<Vec<RoleRecord>>;
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::One(id)) => vec![id],
        Some(OneOrMany::Many(ids)) => ids,
        None => Vec::new(),
    })
}

/// Lane configuration as stored on the process diagram.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantLane {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub use_role: bool,
    #[serde(default, deserialize_with = "one_or_many")]
    pub role: Vec<String>,
    #[serde(default)]
    pub use_account: bool,
    #[serde(default, deserialize_with = "one_or_many")]
    pub account: Vec<String>,
}

impl ParticipantLane {
    /// Users eligible for this lane, one entry per user uuid.
    ///
    /// Role and account lookups run concurrently; either failing fails the whole call.
    pub async fn users(&self, directory: &dyn UserDirectory) -> Result<Vec<SiteUser>> {
        let (from_roles, from_accounts) =
            try_join(self.users_for_roles(directory), self.users_for_accounts(directory)).await?;

        let mut seen = HashSet::new();
        let users: Vec<SiteUser> = from_roles
            .into_iter()
            .chain(from_accounts)
            .filter(|u| seen.insert(u.uuid.clone()))
            .collect();

        tracing::debug!(lane = %self.id, participants = users.len(), "resolved lane participants");
        Ok(users)
    }

    async fn users_for_accounts(&self, directory: &dyn UserDirectory) -> Result<Vec<SiteUser>> {
        if !self.use_account || self.account.is_empty() {
            return Ok(Vec::new());
        }
        directory
            .find_users(&Where::rule("uuid", RuleOp::In, json!(self.account)))
            .await
    }

    async fn users_for_roles(&self, directory: &dyn UserDirectory) -> Result<Vec<SiteUser>> {
        if !self.use_role || self.role.is_empty() {
            return Ok(Vec::new());
        }

        let roles = directory
            .find_roles(&Where::rule("uuid", RuleOp::In, json!(self.role)))
            .await?;

        let mut seen = HashSet::new();
        let usernames: Vec<&str> = roles
            .iter()
            .flat_map(|r| r.users.iter().map(RoleMember::username))
            .filter(|name| seen.insert(*name))
            .collect();
        if usernames.is_empty() {
            return Ok(Vec::new());
        }

        directory
            .find_users(&Where::rule("username", RuleOp::In, json!(usernames)))
            .await
    }
}
