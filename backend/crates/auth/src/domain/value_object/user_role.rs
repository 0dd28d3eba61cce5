use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse capability tag, stored as TEXT and carried in access tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    #[default]
    User,
    Admin,
}

impl UserRole {
    const ALL: [UserRole; 2] = [UserRole::User, UserRole::Admin];

    pub const fn code(self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Admin => "admin",
        }
    }

    /// Exact, case-sensitive match on [`UserRole::code`]
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.code() == code)
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_match_serde_names() {
        for role in UserRole::ALL {
            assert_eq!(UserRole::from_code(role.code()), Some(role));
            assert_eq!(
                serde_json::to_string(&role).unwrap(),
                format!("\"{role}\"")
            );
        }
    }

    #[test]
    fn test_unknown_codes() {
        assert_eq!(UserRole::from_code("root"), None);
        assert_eq!(UserRole::from_code("Admin"), None);
        assert_eq!(UserRole::default(), UserRole::User);
    }
}
