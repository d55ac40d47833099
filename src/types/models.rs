use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Admin,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "member" => Ok(Role::Member),
            "admin" => Ok(Role::Admin),
            other => Err(Error::InvalidValue(format!("unknown role '{other}'"))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a build. Only ever advances: started, processing, completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildState {
    Started,
    Processing,
    Completed,
}

impl BuildState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            BuildState::Started => "started",
            BuildState::Processing => "processing",
            BuildState::Completed => "completed",
        }
    }
}

impl FromStr for BuildState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(BuildState::Started),
            "processing" => Ok(BuildState::Processing),
            "completed" => Ok(BuildState::Completed),
            other => Err(Error::InvalidValue(format!("unknown build state '{other}'"))),
        }
    }
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildFileState {
    Uploading,
    Uploaded,
}

impl BuildFileState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            BuildFileState::Uploading => "uploading",
            BuildFileState::Uploaded => "uploaded",
        }
    }
}

impl FromStr for BuildFileState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploading" => Ok(BuildFileState::Uploading),
            "uploaded" => Ok(BuildFileState::Uploaded),
            other => Err(Error::InvalidValue(format!(
                "unknown build file state '{other}'"
            ))),
        }
    }
}

impl fmt::Display for BuildFileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub role: Role,
    pub is_active: bool,
    #[serde(skip)]
    pub key_lookup: String,
    #[serde(skip)]
    pub key_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_text: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub classification: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A deliverable line within a game; channels attach to uploads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Upload {
    pub id: i64,
    pub game_id: i64,
    pub filename: String,
    pub display_name: String,
    pub storage: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub platforms: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: i64,
    pub name: String,
    pub upload_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_build_id: Option<i64>,
    /// Bumped on every pointer move; used as the optimistic concurrency token.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Build {
    pub id: i64,
    pub upload_id: i64,
    pub user_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_build_id: Option<i64>,
    pub state: BuildState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildFile {
    pub id: i64,
    pub build_id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub sub_type: String,
    pub size: i64,
    pub state: BuildFileState,
    pub storage_path: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A build whose archive could not be assembled and is waiting for another attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveRetry {
    pub build_id: i64,
    pub last_error: String,
    pub attempts: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
