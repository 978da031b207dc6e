//! Common types shared across models: roles, account status, list plumbing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User role, stored as lowercase text in the users table
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
    SubAdmin,
    SuperAdmin,
}

impl Role {
    /// Roles allowed to manage packages and see cross-user listings
    pub const PRIVILEGED: [Role; 3] = [Role::Admin, Role::SubAdmin, Role::SuperAdmin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::SubAdmin => "sub_admin",
            Role::SuperAdmin => "super_admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            "sub_admin" => Ok(Role::SubAdmin),
            "super_admin" => Ok(Role::SuperAdmin),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

/// Account status; blocked accounts fail the auth gate but keep their data
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Blocked,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Blocked => "blocked",
        }
    }
}

impl std::str::FromStr for AccountStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AccountStatus::Active),
            "blocked" => Ok(AccountStatus::Blocked),
            _ => Err(format!("Unknown account status: {}", s)),
        }
    }
}

/// Query-string parameters accepted by every list endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    /// Comma-separated columns, `-` prefix for descending
    pub sort: Option<String>,
    #[serde(alias = "searchTerm")]
    pub search_term: Option<String>,
}

impl ListParams {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(10).clamp(1, 100)
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1) * self.limit()
    }

    /// Translate the sort parameter into an ORDER BY clause. Only columns in
    /// `allowed` survive; anything else falls back to `default`.
    pub fn order_by(&self, allowed: &[&str], default: &str) -> String {
        let Some(sort) = self.sort.as_deref() else {
            return default.to_string();
        };

        let clauses: Vec<String> = sort
            .split(',')
            .filter_map(|field| {
                let trimmed = field.trim();
                let (column, direction) = match trimmed.strip_prefix('-') {
                    Some(rest) => (rest, "DESC"),
                    None => (trimmed, "ASC"),
                };
                if allowed.contains(&column) {
                    Some(format!("{} {}", column, direction))
                } else {
                    None
                }
            })
            .collect();

        if clauses.is_empty() {
            default.to_string()
        } else {
            clauses.join(", ")
        }
    }

    /// LIKE pattern for the search term, if one was given
    pub fn like_pattern(&self) -> Option<String> {
        self.search_term
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| format!("%{}%", t))
    }
}

/// Pagination metadata returned next to list data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meta {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
}

/// Parse a stored RFC3339 timestamp; None for empty or malformed values
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip() {
        for role in ["user", "admin", "sub_admin", "super_admin"] {
            let parsed: Role = role.parse().unwrap();
            assert_eq!(parsed.as_str(), role);
        }
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn test_pagination_defaults() {
        let params = ListParams::default();
        assert_eq!(params.page(), 1);
        assert_eq!(params.limit(), 10);
        assert_eq!(params.offset(), 0);
    }

    #[test]
    fn test_pagination_offset() {
        let params = ListParams {
            page: Some(3),
            limit: Some(20),
            ..Default::default()
        };
        assert_eq!(params.offset(), 40);
    }

    #[test]
    fn test_order_by_whitelist() {
        let params = ListParams {
            sort: Some("-created_at, title, drop table".to_string()),
            ..Default::default()
        };
        let clause = params.order_by(&["title", "created_at"], "created_at DESC");
        assert_eq!(clause, "created_at DESC, title ASC");
    }

    #[test]
    fn test_order_by_falls_back_to_default() {
        let params = ListParams {
            sort: Some("nonsense".to_string()),
            ..Default::default()
        };
        assert_eq!(params.order_by(&["title"], "title ASC"), "title ASC");
    }

    #[test]
    fn test_like_pattern() {
        let params = ListParams {
            search_term: Some("  anna ".to_string()),
            ..Default::default()
        };
        assert_eq!(params.like_pattern().unwrap(), "%anna%");
        assert!(ListParams::default().like_pattern().is_none());
    }

    #[test]
    fn test_parse_timestamp() {
        assert!(parse_timestamp("2026-01-15T10:30:00+00:00").is_some());
        assert!(parse_timestamp("not a date").is_none());
    }
}
