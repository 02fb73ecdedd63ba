use std::collections::{BTreeMap, HashMap};

use super::{Cents, UserId, divide_half_up, format_cents, within_tolerance};

/// Compute how much each participant owes for an expense of `amount_cents`.
///
/// With `custom_shares` present and non-empty, the provided values are used
/// as-is once they add up to the amount (within one cent). Participants left
/// out of the map owe nothing. Keys that are not participants still count
/// toward the total but get no entry in the result.
///
/// Otherwise the amount is split equally, each share rounded half-up to the
/// cent. The rounding residual is dropped: 10.00 among three people yields
/// three shares of 3.33.
///
/// The result has exactly one entry per distinct participant.
pub fn compute_shares(
    amount_cents: Cents,
    participants: &[UserId],
    custom_shares: Option<&HashMap<UserId, Cents>>,
) -> Result<BTreeMap<UserId, Cents>, SplitError> {
    if amount_cents <= 0 {
        return Err(SplitError::NonPositiveAmount(amount_cents));
    }
    if participants.is_empty() {
        return Err(SplitError::NoParticipants);
    }

    match custom_shares.filter(|shares| !shares.is_empty()) {
        Some(shares) => custom_split(amount_cents, participants, shares),
        None => Ok(equal_split(amount_cents, participants)),
    }
}

fn equal_split(amount_cents: Cents, participants: &[UserId]) -> BTreeMap<UserId, Cents> {
    let mut shares: BTreeMap<UserId, Cents> =
        participants.iter().map(|&user| (user, 0)).collect();
    let share = divide_half_up(amount_cents, shares.len());
    for value in shares.values_mut() {
        *value = share;
    }
    shares
}

fn custom_split(
    amount_cents: Cents,
    participants: &[UserId],
    custom_shares: &HashMap<UserId, Cents>,
) -> Result<BTreeMap<UserId, Cents>, SplitError> {
    if let Some((&user, &share)) = custom_shares.iter().find(|(_, share)| **share < 0) {
        return Err(SplitError::NegativeShare { user, share });
    }

    let total = custom_shares
        .values()
        .try_fold(0 as Cents, |acc, &share| acc.checked_add(share))
        .ok_or(SplitError::AmountTooLarge)?;
    if !within_tolerance(total, amount_cents) {
        return Err(SplitError::SharesDoNotSumToAmount {
            total,
            amount: amount_cents,
        });
    }

    Ok(participants
        .iter()
        .map(|user| (*user, custom_shares.get(user).copied().unwrap_or(0)))
        .collect())
}

/// Sum of the shares produced by [`compute_shares`]. Half-up rounding can
/// push the sum one cent past `Cents::MAX`, so it saturates.
pub fn total_of(shares: &BTreeMap<UserId, Cents>) -> Cents {
    shares
        .values()
        .fold(0 as Cents, |acc, &share| acc.saturating_add(share))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitError {
    NonPositiveAmount(Cents),
    NoParticipants,
    NegativeShare { user: UserId, share: Cents },
    SharesDoNotSumToAmount { total: Cents, amount: Cents },
    AmountTooLarge,
}

impl std::fmt::Display for SplitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SplitError::NonPositiveAmount(amount) => {
                write!(f, "Expense amount must be positive, got {}", format_cents(*amount))
            }
            SplitError::NoParticipants => write!(f, "At least one participant must be selected"),
            SplitError::NegativeShare { user, share } => write!(
                f,
                "Share for user {} must not be negative, got {}",
                user,
                format_cents(*share)
            ),
            SplitError::SharesDoNotSumToAmount { total, amount } => write!(
                f,
                "Shares do not sum to amount: total of custom shares ({}) does not match expense amount ({})",
                format_cents(*total),
                format_cents(*amount)
            ),
            SplitError::AmountTooLarge => {
                write!(f, "Custom shares add up to more than can be recorded")
            }
        }
    }
}

impl std::error::Error for SplitError {}
