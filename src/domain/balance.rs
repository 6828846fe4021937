use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{Cents, Expense, Participant, ParticipantId, Payment, TOLERANCE_CENTS, money};

/// Where a participant stands after all expenses and payments of a trip.
///
/// `paid` is what they laid out for expenses, `owes` their share of all
/// expenses adjusted by direct payments, and `net = paid - owes`:
/// positive means the group owes them, negative means they owe the group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub participant_id: ParticipantId,
    pub participant_name: String,
    #[serde(with = "money::decimal")]
    pub paid: Cents,
    #[serde(with = "money::decimal")]
    pub owes: Cents,
    #[serde(with = "money::decimal")]
    pub net: Cents,
}

impl Balance {
    pub fn zero(participant: &Participant) -> Self {
        Self {
            participant_id: participant.id,
            participant_name: participant.name.clone(),
            paid: 0,
            owes: 0,
            net: 0,
        }
    }

    /// Within the rounding tolerance of zero.
    pub fn is_settled(&self) -> bool {
        self.net.abs() <= TOLERANCE_CENTS
    }
}

/// Compute one balance per participant, in the order the participants are given.
///
/// Expenses add to the payer's `paid` and to each split participant's `owes`.
/// A payment discharges debt: it lowers the sender's `owes` and raises the
/// recipient's by the same amount, so `net` moves by the payment amount and
/// `net = paid - owes` holds for every row.
///
/// References to participants not in `participants` (e.g. removed ones) are
/// skipped for that side only and never produce a row.
pub fn compute_balances(
    participants: &[Participant],
    expenses: &[Expense],
    payments: &[Payment],
) -> Vec<Balance> {
    let mut index: HashMap<ParticipantId, usize> = HashMap::with_capacity(participants.len());
    let mut rows: Vec<Balance> = Vec::with_capacity(participants.len());
    for participant in participants {
        if !index.contains_key(&participant.id) {
            index.insert(participant.id, rows.len());
            rows.push(Balance::zero(participant));
        }
    }

    for expense in expenses {
        if let Some(&slot) = index.get(&expense.paid_by) {
            rows[slot].paid += expense.amount_cents;
        }
        for split in &expense.splits {
            if let Some(&slot) = index.get(&split.participant_id) {
                rows[slot].owes += split.amount_cents;
            }
        }
    }

    for payment in payments {
        if let Some(&slot) = index.get(&payment.from_participant) {
            rows[slot].owes -= payment.amount_cents;
        }
        if let Some(&slot) = index.get(&payment.to_participant) {
            rows[slot].owes += payment.amount_cents;
        }
    }

    for row in &mut rows {
        row.net = row.paid - row.owes;
    }
    rows
}

/// Sum of all nets. Zero whenever every reference in the input is known.
pub fn total_net(balances: &[Balance]) -> Cents {
    balances.iter().map(|b| b.net).sum()
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::domain::{Split, TripId, split_equally};

    struct Crew {
        trip: TripId,
        alice: Participant,
        bob: Participant,
        charlie: Participant,
    }

    impl Crew {
        fn new() -> Self {
            let trip = Uuid::new_v4();
            Self {
                trip,
                alice: Participant::new(trip, "Alice"),
                bob: Participant::new(trip, "Bob"),
                charlie: Participant::new(trip, "Charlie"),
            }
        }

        fn all(&self) -> Vec<Participant> {
            vec![self.alice.clone(), self.bob.clone(), self.charlie.clone()]
        }

        fn ids(&self) -> Vec<ParticipantId> {
            vec![self.alice.id, self.bob.id, self.charlie.id]
        }

        fn equal_expense(&self, payer: &Participant, amount: Cents) -> Expense {
            let splits = split_equally(amount, &self.ids()).unwrap();
            Expense::new(self.trip, "Shared", amount, payer.id, splits)
        }
    }

    fn nets(balances: &[Balance]) -> Vec<Cents> {
        balances.iter().map(|b| b.net).collect()
    }

    #[test]
    fn test_no_activity_yields_zero_rows() {
        let crew = Crew::new();
        let balances = compute_balances(&crew.all(), &[], &[]);

        assert_eq!(balances.len(), 3);
        assert!(balances.iter().all(|b| b.paid == 0 && b.owes == 0 && b.net == 0));
    }

    #[test]
    fn test_empty_input() {
        assert!(compute_balances(&[], &[], &[]).is_empty());
    }

    #[test]
    fn test_dinner_split_three_ways() {
        let crew = Crew::new();
        let dinner = crew.equal_expense(&crew.alice, 7500);

        let balances = compute_balances(&crew.all(), &[dinner], &[]);

        assert_eq!(balances[0].paid, 7500);
        assert_eq!(balances[0].owes, 2500);
        assert_eq!(nets(&balances), vec![5000, -2500, -2500]);
    }

    #[test]
    fn test_two_payers_cancel_out() {
        let crew = Crew::new();
        let expenses = vec![
            crew.equal_expense(&crew.alice, 6000),
            crew.equal_expense(&crew.bob, 3000),
        ];

        let balances = compute_balances(&crew.all(), &expenses, &[]);
        assert_eq!(nets(&balances), vec![3000, 0, -3000]);
    }

    #[test]
    fn test_payment_moves_net_once() {
        let crew = Crew::new();
        let dinner = crew.equal_expense(&crew.alice, 7500);
        let payment = Payment::new(crew.trip, crew.bob.id, crew.alice.id, 2000);

        let balances = compute_balances(&crew.all(), &[dinner], &[payment]);

        assert_eq!(nets(&balances), vec![3000, -500, -2500]);
        // net = paid - owes still holds with payments folded into owes
        for b in &balances {
            assert_eq!(b.net, b.paid - b.owes);
        }
        assert_eq!(balances[1].owes, 500);
        assert_eq!(balances[0].owes, 4500);
    }

    #[test]
    fn test_output_follows_participant_order() {
        let crew = Crew::new();
        let reversed = vec![crew.charlie.clone(), crew.alice.clone(), crew.bob.clone()];

        let balances = compute_balances(&reversed, &[], &[]);
        let names: Vec<&str> = balances.iter().map(|b| b.participant_name.as_str()).collect();
        assert_eq!(names, vec!["Charlie", "Alice", "Bob"]);
    }

    #[test]
    fn test_duplicate_participant_rows_collapse() {
        let crew = Crew::new();
        let participants = vec![crew.alice.clone(), crew.alice.clone(), crew.bob.clone()];
        let expense = Expense::new(
            crew.trip,
            "Taxi",
            1000,
            crew.alice.id,
            vec![Split::new(crew.bob.id, 1000)],
        );

        let balances = compute_balances(&participants, &[expense], &[]);
        assert_eq!(balances.len(), 2);
        assert_eq!(nets(&balances), vec![1000, -1000]);
    }

    #[test]
    fn test_unknown_references_are_skipped() {
        let crew = Crew::new();
        let ghost = Uuid::new_v4();

        let expenses = vec![
            // paid by someone who has been removed
            Expense::new(crew.trip, "Tickets", 3000, ghost, vec![
                Split::new(crew.alice.id, 1500),
                Split::new(ghost, 1500),
            ]),
        ];
        let payments = vec![Payment::new(crew.trip, ghost, crew.bob.id, 500)];

        let balances = compute_balances(&crew.all(), &expenses, &payments);

        assert_eq!(balances.len(), 3);
        assert!(balances.iter().all(|b| b.participant_id != ghost));
        assert_eq!(nets(&balances), vec![-1500, -500, 0]);
    }

    #[test]
    fn test_balances_sum_to_zero() {
        let crew = Crew::new();
        let expenses = vec![
            crew.equal_expense(&crew.alice, 10001),
            crew.equal_expense(&crew.bob, 333),
            crew.equal_expense(&crew.charlie, 7),
        ];
        let payments = vec![Payment::new(crew.trip, crew.charlie.id, crew.alice.id, 1234)];

        let balances = compute_balances(&crew.all(), &expenses, &payments);
        assert_eq!(total_net(&balances), 0, "closed system must sum to zero");
    }

    #[test]
    fn test_is_settled_tolerance() {
        let crew = Crew::new();
        let mut balance = Balance::zero(&crew.alice);
        assert!(balance.is_settled());

        balance.net = -1;
        assert!(balance.is_settled());

        balance.net = 2;
        assert!(!balance.is_settled());
    }
}
