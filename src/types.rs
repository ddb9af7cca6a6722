/// Shared types used across the codebase

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Access scope protected by its own shared PIN
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinScope {
    Staff,
    Manager,
}

impl PinScope {
    pub const ALL: [PinScope; 2] = [PinScope::Staff, PinScope::Manager];

    pub fn as_str(&self) -> &'static str {
        match self {
            PinScope::Staff => "staff",
            PinScope::Manager => "manager",
        }
    }

    /// Whether a session unlocked for `self` may pass a gate requiring `required`.
    /// Manager sessions cover staff areas, never the reverse.
    pub fn grants(&self, required: PinScope) -> bool {
        match (self, required) {
            (PinScope::Manager, _) => true,
            (PinScope::Staff, PinScope::Staff) => true,
            (PinScope::Staff, PinScope::Manager) => false,
        }
    }

    /// Scopes whose sessions satisfy a gate requiring `self`.
    pub fn granted_by(self) -> impl Iterator<Item = PinScope> {
        Self::ALL.into_iter().filter(move |s| s.grants(self))
    }

    /// Name of the cookie that carries this scope's session token
    pub fn cookie_name(&self) -> String {
        format!("pin_session_{}", self.as_str())
    }
}

impl fmt::Display for PinScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PinScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "staff" => Ok(PinScope::Staff),
            "manager" => Ok(PinScope::Manager),
            other => Err(format!("unknown PIN scope '{}'", other)),
        }
    }
}

/// Who is checking in at a kiosk. Each kind has its own attendance table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersonKind {
    Student,
    Staff,
}

impl PersonKind {
    pub const ALL: [PersonKind; 2] = [PersonKind::Student, PersonKind::Staff];

    pub fn as_str(&self) -> &'static str {
        match self {
            PersonKind::Student => "student",
            PersonKind::Staff => "staff",
        }
    }

    // Table and column names are compile-time literals; safe to interpolate into SQL.
    pub(crate) fn table(&self) -> &'static str {
        match self {
            PersonKind::Student => "student_attendance",
            PersonKind::Staff => "staff_attendance",
        }
    }

    pub(crate) fn id_column(&self) -> &'static str {
        match self {
            PersonKind::Student => "student_id",
            PersonKind::Staff => "staff_id",
        }
    }
}

impl fmt::Display for PersonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PersonKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" | "students" => Ok(PersonKind::Student),
            "staff" => Ok(PersonKind::Staff),
            other => Err(format!("unknown person kind '{}'", other)),
        }
    }
}
