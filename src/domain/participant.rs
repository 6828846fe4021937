use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::TripId;

pub type ParticipantId = Uuid;

/// Display name used when an expense or payment refers to a participant
/// that has since been removed from the trip.
pub const UNKNOWN_PARTICIPANT: &str = "Unknown";

/// A person taking part in a trip. Participants are immutable once created;
/// removing one leaves their historical expenses and payments in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub trip_id: TripId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Participant {
    pub fn new(trip_id: TripId, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            trip_id,
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

/// Resolve a participant id to its display name, falling back to
/// [`UNKNOWN_PARTICIPANT`] for orphaned references.
pub fn display_name(participants: &[Participant], id: ParticipantId) -> &str {
    participants
        .iter()
        .find(|p| p.id == id)
        .map(|p| p.name.as_str())
        .unwrap_or(UNKNOWN_PARTICIPANT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_known() {
        let trip = Uuid::new_v4();
        let alice = Participant::new(trip, "Alice");
        let bob = Participant::new(trip, "Bob");
        let participants = vec![alice.clone(), bob.clone()];

        assert_eq!(display_name(&participants, alice.id), "Alice");
        assert_eq!(display_name(&participants, bob.id), "Bob");
    }

    #[test]
    fn test_display_name_orphaned_reference() {
        let trip = Uuid::new_v4();
        let participants = vec![Participant::new(trip, "Alice")];

        assert_eq!(display_name(&participants, Uuid::new_v4()), "Unknown");
        assert_eq!(display_name(&[], Uuid::new_v4()), UNKNOWN_PARTICIPANT);
    }
}
