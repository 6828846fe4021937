use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Cents, ParticipantId, TripId};

pub type PaymentId = Uuid;

/// Money handed directly from one participant to another, outside of any
/// expense. A payment reduces what `from_participant` owes `to_participant`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub trip_id: TripId,
    pub from_participant: ParticipantId,
    pub to_participant: ParticipantId,
    /// Amount in cents (always positive)
    pub amount_cents: Cents,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    pub fn new(
        trip_id: TripId,
        from_participant: ParticipantId,
        to_participant: ParticipantId,
        amount_cents: Cents,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            trip_id,
            from_participant,
            to_participant,
            amount_cents,
            created_at: Utc::now(),
        }
    }

    pub fn is_self_payment(&self) -> bool {
        self.from_participant == self.to_participant
    }

    pub fn involves(&self, participant: ParticipantId) -> bool {
        self.from_participant == participant || self.to_participant == participant
    }
}
