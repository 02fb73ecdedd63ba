use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::UserId;

pub type GroupId = Uuid;

pub const MAX_GROUP_NAME_LEN: usize = 100;

/// A named collection of users sharing expenses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

/// Record that a user belongs to a group. A user appears at most once per group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub group_id: GroupId,
    pub user_id: UserId,
    pub joined_at: DateTime<Utc>,
}

impl Membership {
    pub fn new(group_id: GroupId, user_id: UserId) -> Self {
        Self {
            group_id,
            user_id,
            joined_at: Utc::now(),
        }
    }
}

pub fn validate_group_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("group name is required".to_string());
    }
    if name.chars().count() > MAX_GROUP_NAME_LEN {
        return Err(format!(
            "group name must not exceed {} characters",
            MAX_GROUP_NAME_LEN
        ));
    }
    Ok(())
}
