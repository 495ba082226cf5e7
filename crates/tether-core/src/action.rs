use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The four verbs of the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::Create, Action::Read, Action::Update, Action::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }

    /// HTTP method name carrying this action.
    pub fn verb(&self) -> &'static str {
        match self {
            Action::Create => "POST",
            Action::Read => "GET",
            Action::Update => "PUT",
            Action::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid operation name {0:?}: expected <noun>[_<noun>...]_<create|read|update|delete>")]
pub struct OperationNameError(pub String);

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown action {0:?}")]
pub struct UnknownAction(pub String);

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownAction(s.to_string()))
    }
}

/// Where an operation name lands: `user_profile_update` is `PUT /user/profile`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Binding {
    pub action: Action,
    pub path: String,
}

impl Binding {
    pub fn parse(name: &str) -> Result<Self, OperationNameError> {
        let invalid = || OperationNameError(name.to_string());
        let (noun, action) = name.rsplit_once('_').ok_or_else(invalid)?;
        let action = Action::ALL
            .into_iter()
            .find(|a| a.as_str() == action)
            .ok_or_else(invalid)?;

        let segments: Vec<&str> = noun.split('_').collect();
        let well_formed = segments
            .iter()
            .all(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_lowercase()));
        if !well_formed {
            return Err(invalid());
        }

        Ok(Self {
            action,
            path: format!("/{}", segments.join("/")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_map_to_verb_and_path() {
        let b = Binding::parse("user_profile_update").unwrap();
        assert_eq!((b.action.verb(), b.path.as_str()), ("PUT", "/user/profile"));

        let b = Binding::parse("order_create").unwrap();
        assert_eq!((b.action.verb(), b.path.as_str()), ("POST", "/order"));

        let b = Binding::parse("session_read").unwrap();
        assert_eq!((b.action.verb(), b.path.as_str()), ("GET", "/session"));

        let b = Binding::parse("cart_item_delete").unwrap();
        assert_eq!((b.action.verb(), b.path.as_str()), ("DELETE", "/cart/item"));
    }

    #[test]
    fn names_outside_the_convention_are_rejected() {
        for name in ["read", "_read", "user_fetch", "user__read", "User_read", "user2_read", "user_read_"] {
            assert!(Binding::parse(name).is_err(), "{name} should not bind");
        }
    }

    #[test]
    fn action_parses_case_insensitively() {
        assert_eq!("Update".parse::<Action>().unwrap(), Action::Update);
        assert!("patch".parse::<Action>().is_err());
    }
}
