use std::collections::HashSet;

use thiserror::Error;

use super::{BasisPoints, Cents, FULL_SHARE, ParticipantId, Split, TOLERANCE_CENTS};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SplitError {
    #[error("expense amount must be positive, got {0} cents")]
    InvalidAmount(Cents),

    #[error("at least one split is required")]
    Empty,

    #[error("split for participant {0} must be positive")]
    NonPositiveShare(ParticipantId),

    #[error("participant {0} appears more than once in the splits")]
    DuplicateParticipant(ParticipantId),

    #[error("splits sum to {actual} cents but the expense is {expected} cents")]
    SumMismatch { expected: Cents, actual: Cents },

    #[error("percentages sum to {0} basis points, expected 10000")]
    PercentagesDoNotTotal(BasisPoints),
}

/// How an expense amount is divided among participants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitStrategy {
    /// Same share for everyone listed; leftover cents go to the first ones.
    Equal(Vec<ParticipantId>),
    /// Shares as percentages (basis points) that must total 100%.
    Percentage(Vec<(ParticipantId, BasisPoints)>),
    /// Explicit amounts that must sum to the expense amount.
    Exact(Vec<Split>),
}

impl SplitStrategy {
    /// Build concrete splits for `amount_cents`.
    pub fn build(&self, amount_cents: Cents) -> Result<Vec<Split>, SplitError> {
        match self {
            SplitStrategy::Equal(participants) => split_equally(amount_cents, participants),
            SplitStrategy::Percentage(shares) => split_by_percentage(amount_cents, shares),
            SplitStrategy::Exact(splits) => {
                validate_splits(amount_cents, splits)?;
                Ok(splits.clone())
            }
        }
    }
}

/// Split `amount_cents` equally among `participants`.
///
/// Leftover cents are handed out one at a time in the given order, so the
/// result always sums to the amount exactly. Participants whose share would
/// be zero (amount smaller than the head count) are left out.
pub fn split_equally(
    amount_cents: Cents,
    participants: &[ParticipantId],
) -> Result<Vec<Split>, SplitError> {
    if amount_cents <= 0 {
        return Err(SplitError::InvalidAmount(amount_cents));
    }
    if participants.is_empty() {
        return Err(SplitError::Empty);
    }
    ensure_unique(participants.iter().copied())?;

    let count = participants.len() as Cents;
    let base = amount_cents / count;
    let remainder = amount_cents % count;

    Ok(participants
        .iter()
        .enumerate()
        .map(|(idx, &id)| {
            let extra = if (idx as Cents) < remainder { 1 } else { 0 };
            Split::new(id, base + extra)
        })
        .filter(|split| split.amount_cents > 0)
        .collect())
}

/// Split `amount_cents` by percentage shares expressed in basis points.
///
/// Each share is rounded half-up; whatever rounding leaves over (or takes
/// too much) is corrected one cent at a time in the given order.
pub fn split_by_percentage(
    amount_cents: Cents,
    shares: &[(ParticipantId, BasisPoints)],
) -> Result<Vec<Split>, SplitError> {
    if amount_cents <= 0 {
        return Err(SplitError::InvalidAmount(amount_cents));
    }
    if shares.is_empty() {
        return Err(SplitError::Empty);
    }
    if let Some((id, _)) = shares.iter().find(|(_, bp)| *bp <= 0) {
        return Err(SplitError::NonPositiveShare(*id));
    }
    ensure_unique(shares.iter().map(|(id, _)| *id))?;

    let total: BasisPoints = shares.iter().map(|(_, bp)| bp).sum();
    if total != FULL_SHARE {
        return Err(SplitError::PercentagesDoNotTotal(total));
    }

    let mut splits: Vec<Split> = shares
        .iter()
        .map(|&(id, bp)| {
            let raw = i128::from(amount_cents) * i128::from(bp);
            let rounded = (raw + i128::from(FULL_SHARE / 2)) / i128::from(FULL_SHARE);
            Split::new(id, rounded as Cents)
        })
        .collect();

    let allocated: Cents = splits.iter().map(|s| s.amount_cents).sum();
    let mut drift = amount_cents - allocated;
    let step = drift.signum();
    let mut idx = 0;
    while drift != 0 {
        let split = &mut splits[idx % shares.len()];
        if step > 0 || split.amount_cents > 0 {
            split.amount_cents += step;
            drift -= step;
        }
        idx += 1;
    }

    splits.retain(|split| split.amount_cents > 0);
    Ok(splits)
}

/// Check the split invariants for an expense of `amount_cents`:
/// at least one split, every share positive, no participant twice, and the
/// shares summing to the amount within [`TOLERANCE_CENTS`].
pub fn validate_splits(amount_cents: Cents, splits: &[Split]) -> Result<(), SplitError> {
    if amount_cents <= 0 {
        return Err(SplitError::InvalidAmount(amount_cents));
    }
    if splits.is_empty() {
        return Err(SplitError::Empty);
    }
    if let Some(split) = splits.iter().find(|s| s.amount_cents <= 0) {
        return Err(SplitError::NonPositiveShare(split.participant_id));
    }
    ensure_unique(splits.iter().map(|s| s.participant_id))?;

    let actual: Cents = splits.iter().map(|s| s.amount_cents).sum();
    if (actual - amount_cents).abs() > TOLERANCE_CENTS {
        return Err(SplitError::SumMismatch {
            expected: amount_cents,
            actual,
        });
    }
    Ok(())
}

fn ensure_unique(ids: impl Iterator<Item = ParticipantId>) -> Result<(), SplitError> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(SplitError::DuplicateParticipant(id));
        }
    }
    Ok(())
}
