use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Cents, GroupId, UserId};

pub type SettlementId = Uuid;

/// A recorded direct payment between two users of a group, independent of
/// any expense. Settlements are not checked against outstanding balances, so
/// over- and under-settling are both possible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub id: SettlementId,
    pub group_id: GroupId,
    /// User handing over the money
    pub from_user: UserId,
    /// User receiving the money
    pub to_user: UserId,
    /// Amount in cents (always positive)
    pub amount_cents: Cents,
    pub settled_at: DateTime<Utc>,
}

impl Settlement {
    pub fn new(group_id: GroupId, from_user: UserId, to_user: UserId, amount_cents: Cents) -> Self {
        assert!(amount_cents > 0, "Settlement amount must be positive");
        Self {
            id: Uuid::new_v4(),
            group_id,
            from_user,
            to_user,
            amount_cents,
            settled_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_settlement() {
        let (group, from, to) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let settlement = Settlement::new(group, from, to, 1000);

        assert_eq!(settlement.from_user, from);
        assert_eq!(settlement.to_user, to);
        assert_eq!(settlement.amount_cents, 1000);
    }

    #[test]
    #[should_panic(expected = "Settlement amount must be positive")]
    fn test_settlement_requires_positive_amount() {
        Settlement::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), -5);
    }
}
