use serde::{Deserialize, Serialize};

use super::{Cents, Expense, ExpenseShare, Settlement, User, UserId};

/// Raw sums for one member of a group, as read from the ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberTotals {
    /// Sum of the expenses this member paid for
    pub paid: Cents,
    /// Sum of this member's shares across the group's expenses
    pub owed: Cents,
    /// Sum of settlements this member handed over
    pub settled_from: Cents,
    /// Sum of settlements this member received
    pub settled_to: Cents,
}

impl MemberTotals {
    /// Positive means the member is owed money, negative means they owe money.
    ///
    /// Paying a settlement moves the payer toward zero from below; receiving
    /// one reduces what the receiver is still owed.
    pub fn net_balance(&self) -> Cents {
        self.paid
            .saturating_sub(self.owed)
            .saturating_add(self.settled_from)
            .saturating_sub(self.settled_to)
    }
}

/// Where a member of a group stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub user_id: UserId,
    pub user_name: String,
    pub user_email: String,
    pub total_paid: Cents,
    pub total_owed: Cents,
    pub total_settled_from: Cents,
    pub total_settled_to: Cents,
    pub net_balance: Cents,
}

impl Balance {
    pub fn from_totals(user: &User, totals: MemberTotals) -> Self {
        Self {
            user_id: user.id,
            user_name: user.name.clone(),
            user_email: user.email.clone(),
            total_paid: totals.paid,
            total_owed: totals.owed,
            total_settled_from: totals.settled_from,
            total_settled_to: totals.settled_to,
            net_balance: totals.net_balance(),
        }
    }

    pub fn is_settled(&self) -> bool {
        self.net_balance == 0
    }
}

/// Compute one member's totals from the records of a single group.
///
/// `shares` must belong to `expenses` and `settlements` to the same group.
pub fn compute_member_totals(
    user_id: UserId,
    expenses: &[Expense],
    shares: &[ExpenseShare],
    settlements: &[Settlement],
) -> MemberTotals {
    let paid = expenses
        .iter()
        .filter(|e| e.paid_by == user_id)
        .fold(0, |acc: Cents, e| acc.saturating_add(e.amount_cents));

    let owed = shares
        .iter()
        .filter(|s| s.user_id == user_id)
        .fold(0, |acc: Cents, s| acc.saturating_add(s.share_cents));

    let (settled_from, settled_to) =
        settlements
            .iter()
            .fold((0 as Cents, 0 as Cents), |(from, to), settlement| {
                let from = if settlement.from_user == user_id {
                    from.saturating_add(settlement.amount_cents)
                } else {
                    from
                };
                let to = if settlement.to_user == user_id {
                    to.saturating_add(settlement.amount_cents)
                } else {
                    to
                };
                (from, to)
            });

    MemberTotals {
        paid,
        owed,
        settled_from,
        settled_to,
    }
}

/// Compute balances for every member, in member order, from the records of a
/// single group.
pub fn compute_group_balances(
    members: &[User],
    expenses: &[Expense],
    shares: &[ExpenseShare],
    settlements: &[Settlement],
) -> Vec<Balance> {
    members
        .iter()
        .map(|member| {
            let totals = compute_member_totals(member.id, expenses, shares, settlements);
            Balance::from_totals(member, totals)
        })
        .collect()
}
