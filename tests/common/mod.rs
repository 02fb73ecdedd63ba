// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::collections::HashMap;

use anyhow::Result;
use divvy::application::{ExpenseDetails, LedgerService, NewExpense};
use divvy::domain::{Cents, Group, User, UserId};
use tempfile::TempDir;

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = LedgerService::init(db_path.to_str().unwrap()).await?;
    Ok((service, temp_dir))
}

/// Test fixture: a group of three friends, all of them members
pub struct Trip {
    pub group: Group,
    pub alice: User,
    pub bob: User,
    pub carol: User,
}

impl Trip {
    pub async fn create(service: &LedgerService) -> Result<Self> {
        let alice = service
            .create_user("Alice".into(), "alice@example.com".into(), None)
            .await?;
        let bob = service
            .create_user("Bob".into(), "bob@example.com".into(), None)
            .await?;
        let carol = service
            .create_user(
                "Carol".into(),
                "carol@example.com".into(),
                Some("555-0100".into()),
            )
            .await?;

        let group = service.create_group("Trip".into()).await?;
        for user in [&alice, &bob, &carol] {
            service.add_member(group.id, user.id).await?;
        }

        Ok(Self {
            group,
            alice,
            bob,
            carol,
        })
    }

    pub fn everyone(&self) -> Vec<UserId> {
        vec![self.alice.id, self.bob.id, self.carol.id]
    }

    /// Record an equal-split expense
    pub async fn expense(
        &self,
        service: &LedgerService,
        paid_by: &User,
        amount_cents: Cents,
        participants: Vec<UserId>,
    ) -> Result<ExpenseDetails> {
        let details = service
            .create_expense(NewExpense {
                group_id: self.group.id,
                paid_by: paid_by.id,
                amount_cents,
                description: "Shared cost".into(),
                participants,
                custom_shares: None,
            })
            .await?;
        Ok(details)
    }

    /// Record an expense with explicit per-user shares
    pub async fn custom_expense(
        &self,
        service: &LedgerService,
        paid_by: &User,
        amount_cents: Cents,
        shares: &[(UserId, Cents)],
    ) -> Result<ExpenseDetails> {
        let custom: HashMap<UserId, Cents> = shares.iter().copied().collect();
        let details = service
            .create_expense(NewExpense {
                group_id: self.group.id,
                paid_by: paid_by.id,
                amount_cents,
                description: "Custom split".into(),
                participants: shares.iter().map(|(id, _)| *id).collect(),
                custom_shares: Some(custom),
            })
            .await?;
        Ok(details)
    }
}

/// Net balance of one user, looked up by id in a balance list
pub fn net_of(balances: &[divvy::domain::Balance], user: &User) -> Cents {
    balances
        .iter()
        .find(|b| b.user_id == user.id)
        .map(|b| b.net_balance)
        .unwrap_or_else(|| panic!("no balance for {}", user.name))
}
