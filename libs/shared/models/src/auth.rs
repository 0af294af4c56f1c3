use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtHeader {
    pub alg: String,
    pub typ: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub user_metadata: Option<serde_json::Value>,
    pub aud: Option<String>,
    pub iat: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    /// Resolve the role-bearing identity for this user, if the role claim is one we know.
    pub fn actor(&self) -> Option<Actor> {
        let role = self.role.as_deref()?.parse::<ActorRole>().ok()?;
        Some(Actor {
            actor_id: self.id.clone(),
            role,
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Patient,
    Doctor,
    Staff,
    Admin,
}

impl ActorRole {
    /// Doctors, staff and admins operate the clinical management flow.
    pub fn is_clinician(&self) -> bool {
        matches!(self, ActorRole::Doctor | ActorRole::Staff | ActorRole::Admin)
    }

    pub fn all() -> [ActorRole; 4] {
        [ActorRole::Patient, ActorRole::Doctor, ActorRole::Staff, ActorRole::Admin]
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActorRole::Patient => write!(f, "patient"),
            ActorRole::Doctor => write!(f, "doctor"),
            ActorRole::Staff => write!(f, "staff"),
            ActorRole::Admin => write!(f, "admin"),
        }
    }
}

impl FromStr for ActorRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "patient" => Ok(ActorRole::Patient),
            "doctor" | "clinician" => Ok(ActorRole::Doctor),
            "staff" => Ok(ActorRole::Staff),
            "admin" => Ok(ActorRole::Admin),
            other => Err(format!("Unknown role: {}", other)),
        }
    }
}

/// Who is invoking an operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    pub actor_id: String,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(actor_id: impl Into<String>, role: ActorRole) -> Self {
        Self {
            actor_id: actor_id.into(),
            role,
        }
    }

    pub fn is_clinician(&self) -> bool {
        self.role.is_clinician()
    }
}
