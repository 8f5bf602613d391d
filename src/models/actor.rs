// src/models/actor.rs
use serde::{Deserialize, Serialize};
use std::fmt;

/// The party performing an operation.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "role", content = "id", rename_all = "snake_case")]
pub enum Actor {
    CooperativeOfficer(String), // cooperative id
    Driver(String),             // driver id
    Admin(String),
}

impl Actor {
    pub fn role(&self) -> &'static str {
        match self {
            Actor::CooperativeOfficer(_) => "cooperative",
            Actor::Driver(_) => "driver",
            Actor::Admin(_) => "admin",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Actor::CooperativeOfficer(id) | Actor::Driver(id) | Actor::Admin(id) => id,
        }
    }

    pub fn parse(role: &str, id: &str) -> Option<Self> {
        let id = id.trim();
        if id.is_empty() {
            return None;
        }
        match role.trim().to_ascii_lowercase().as_str() {
            "cooperative" | "cooperative_officer" => Some(Actor::CooperativeOfficer(id.to_string())),
            "driver" => Some(Actor::Driver(id.to_string())),
            "admin" => Some(Actor::Admin(id.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.role(), self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roles() {
        assert_eq!(
            Actor::parse("Driver", "drv-251018-abc12"),
            Some(Actor::Driver("drv-251018-abc12".to_string()))
        );
        assert_eq!(
            Actor::parse("cooperative_officer", "cop-1"),
            Some(Actor::CooperativeOfficer("cop-1".to_string()))
        );
        assert_eq!(Actor::parse("farmer", "frm-1"), None);
        assert_eq!(Actor::parse("admin", "  "), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Actor::Admin("ops".to_string()).to_string(), "admin:ops");
    }
}
