use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type UserId = Uuid;

pub const MAX_USER_NAME_LEN: usize = 50;
pub const MAX_EMAIL_LEN: usize = 100;
pub const MAX_CONTACT_LEN: usize = 20;

/// A person who can join groups, pay for expenses and take part in them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    /// Unique across all users
    pub email: String,
    pub contact_no: Option<String>,
    pub joined_at: DateTime<Utc>,
}

impl User {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            email: email.into(),
            contact_no: None,
            joined_at: Utc::now(),
        }
    }

    pub fn with_contact_no(mut self, contact_no: impl Into<String>) -> Self {
        self.contact_no = Some(contact_no.into());
        self
    }
}

/// Check the editable profile fields of a user, returning a message for the
/// first field that is not acceptable.
pub fn validate_profile(name: &str, email: &str, contact_no: Option<&str>) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("name is required".to_string());
    }
    if name.chars().count() > MAX_USER_NAME_LEN {
        return Err(format!("name must not exceed {} characters", MAX_USER_NAME_LEN));
    }
    if email.trim().is_empty() {
        return Err("email is required".to_string());
    }
    if email.chars().count() > MAX_EMAIL_LEN {
        return Err(format!("email must not exceed {} characters", MAX_EMAIL_LEN));
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {}
        _ => return Err(format!("email '{}' is not valid", email)),
    }
    if let Some(contact) = contact_no {
        if contact.chars().count() > MAX_CONTACT_LEN {
            return Err(format!(
                "contact number must not exceed {} characters",
                MAX_CONTACT_LEN
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_user() {
        let user = User::new("Alice", "alice@example.com").with_contact_no("555-0100");
        assert_eq!(user.name, "Alice");
        assert_eq!(user.email, "alice@example.com");
        assert_eq!(user.contact_no.as_deref(), Some("555-0100"));
    }

    #[test]
    fn test_validate_profile() {
        assert!(validate_profile("Alice", "alice@example.com", None).is_ok());
        assert!(validate_profile("  ", "alice@example.com", None).is_err());
        assert!(validate_profile("Alice", "", None).is_err());
        assert!(validate_profile("Alice", "not-an-email", None).is_err());
        assert!(validate_profile("Alice", "@example.com", None).is_err());
        assert!(validate_profile(&"a".repeat(51), "alice@example.com", None).is_err());
        assert!(validate_profile("Alice", "alice@example.com", Some(&"1".repeat(21))).is_err());
    }
}
