use thiserror::Error;

use crate::domain::{ExpenseId, GroupId, SplitError, UserId};

/// Broad classification of an [`AppError`], for callers that map errors onto
/// a coarser surface (exit codes, HTTP statuses).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A referenced user, group, expense or membership does not exist
    NotFound,
    /// The request breaks a business rule
    Validation,
    /// The ledger store failed
    Storage,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("User not found with id: {0}")]
    UserNotFound(UserId),

    #[error("User not found with email: {0}")]
    UserEmailNotFound(String),

    #[error("Group not found with id: {0}")]
    GroupNotFound(GroupId),

    #[error("Expense not found with id: {0}")]
    ExpenseNotFound(ExpenseId),

    #[error("User {user_id} is not a member of group {group_id}")]
    NotAMember { group_id: GroupId, user_id: UserId },

    #[error("At least one participant must be selected")]
    NoParticipants,

    #[error("Payer {0} is not a member of this group")]
    PayerNotMember(UserId),

    #[error("User with id {0} is not a member of this group")]
    ParticipantNotMember(UserId),

    #[error("User {user_id} is already a member of group {group_id}")]
    AlreadyMember { group_id: GroupId, user_id: UserId },

    #[error("User with email {0} already exists")]
    EmailAlreadyExists(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Split(#[from] SplitError),

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::UserNotFound(_)
            | AppError::UserEmailNotFound(_)
            | AppError::GroupNotFound(_)
            | AppError::ExpenseNotFound(_)
            | AppError::NotAMember { .. } => ErrorKind::NotFound,

            AppError::NoParticipants
            | AppError::PayerNotMember(_)
            | AppError::ParticipantNotMember(_)
            | AppError::AlreadyMember { .. }
            | AppError::EmailAlreadyExists(_)
            | AppError::InvalidAmount(_)
            | AppError::InvalidInput(_)
            | AppError::Split(_) => ErrorKind::Validation,

            AppError::Database(_) => ErrorKind::Storage,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn test_error_kinds() {
        assert!(AppError::ExpenseNotFound(Uuid::new_v4()).is_not_found());
        assert!(AppError::GroupNotFound(Uuid::new_v4()).is_not_found());
        assert!(AppError::NoParticipants.is_validation());
        assert!(AppError::ParticipantNotMember(Uuid::new_v4()).is_validation());
        assert!(AppError::Split(SplitError::NoParticipants).is_validation());
        assert_eq!(
            AppError::Database(anyhow::anyhow!("disk full")).kind(),
            ErrorKind::Storage
        );
    }

    #[test]
    fn test_participant_error_names_the_user() {
        let id = Uuid::new_v4();
        let message = AppError::ParticipantNotMember(id).to_string();
        assert!(message.contains(&id.to_string()));
    }

    #[test]
    fn test_split_error_message_is_kept() {
        let err = AppError::from(SplitError::SharesDoNotSumToAmount {
            total: 900,
            amount: 1000,
        });
        assert!(err.to_string().starts_with("Shares do not sum to amount"));
    }
}
