use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Cents, ParticipantId, TripId};

pub type ExpenseId = Uuid;

/// The share of one expense owed by a single participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Split {
    pub participant_id: ParticipantId,
    /// Amount in cents owed by this participant
    pub amount_cents: Cents,
}

impl Split {
    pub fn new(participant_id: ParticipantId, amount_cents: Cents) -> Self {
        Self {
            participant_id,
            amount_cents,
        }
    }
}

/// Something one participant paid for on behalf of (part of) the group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub trip_id: TripId,
    pub description: String,
    /// Total amount in cents (always positive)
    pub amount_cents: Cents,
    /// Participant who paid
    pub paid_by: ParticipantId,
    /// How the amount is shared; sums to `amount_cents` within tolerance
    pub splits: Vec<Split>,
    /// When the expense happened in the real world, if known
    pub expense_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Expense {
    pub fn new(
        trip_id: TripId,
        description: impl Into<String>,
        amount_cents: Cents,
        paid_by: ParticipantId,
        splits: Vec<Split>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            trip_id,
            description: description.into(),
            amount_cents,
            paid_by,
            splits,
            expense_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_expense_date(mut self, date: DateTime<Utc>) -> Self {
        self.expense_date = Some(date);
        self
    }

    /// Returns true if `participant` pays for or shares this expense.
    pub fn involves(&self, participant: ParticipantId) -> bool {
        self.paid_by == participant || self.splits.iter().any(|s| s.participant_id == participant)
    }

    /// Mark the expense as modified now.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
