use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Cents, GroupId, UserId};

pub type ExpenseId = Uuid;
pub type ShareId = Uuid;

pub const MAX_DESCRIPTION_LEN: usize = 200;

/// A single payment made by one member on behalf of a set of participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub group_id: GroupId,
    /// Member who paid the whole amount
    pub paid_by: UserId,
    /// Amount in cents (always positive)
    pub amount_cents: Cents,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl Expense {
    pub fn new(
        group_id: GroupId,
        paid_by: UserId,
        amount_cents: Cents,
        description: impl Into<String>,
    ) -> Self {
        assert!(amount_cents > 0, "Expense amount must be positive");
        Self {
            id: Uuid::new_v4(),
            group_id,
            paid_by,
            amount_cents,
            description: description.into(),
            created_at: Utc::now(),
        }
    }
}

/// The portion of an expense attributed to one participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseShare {
    pub id: ShareId,
    pub expense_id: ExpenseId,
    pub user_id: UserId,
    /// Share in cents (never negative, may be zero)
    pub share_cents: Cents,
}

impl ExpenseShare {
    pub fn new(expense_id: ExpenseId, user_id: UserId, share_cents: Cents) -> Self {
        assert!(share_cents >= 0, "Share amount must not be negative");
        Self {
            id: Uuid::new_v4(),
            expense_id,
            user_id,
            share_cents,
        }
    }
}

pub fn validate_description(description: &str) -> Result<(), String> {
    if description.trim().is_empty() {
        return Err("description is required".to_string());
    }
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(format!(
            "description must not exceed {} characters",
            MAX_DESCRIPTION_LEN
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_expense() {
        let group = Uuid::new_v4();
        let payer = Uuid::new_v4();
        let expense = Expense::new(group, payer, 3000, "Dinner");

        assert_eq!(expense.group_id, group);
        assert_eq!(expense.paid_by, payer);
        assert_eq!(expense.amount_cents, 3000);
        assert_eq!(expense.description, "Dinner");
    }

    #[test]
    #[should_panic(expected = "Expense amount must be positive")]
    fn test_expense_requires_positive_amount() {
        Expense::new(Uuid::new_v4(), Uuid::new_v4(), 0, "Nothing");
    }

    #[test]
    fn test_zero_share_is_allowed() {
        let share = ExpenseShare::new(Uuid::new_v4(), Uuid::new_v4(), 0);
        assert_eq!(share.share_cents, 0);
    }

    #[test]
    fn test_validate_description() {
        assert!(validate_description("Groceries").is_ok());
        assert!(validate_description(" ").is_err());
        assert!(validate_description(&"d".repeat(201)).is_err());
    }
}
