use std::collections::HashSet;
use std::fmt;

use super::{
    Cents, Expense, ExpenseId, Participant, ParticipantId, Payment, PaymentId, SplitError,
    compute_balances, total_net, validate_splits,
};

/// A data problem found in a trip. None of these stop balances from being
/// computed; they explain why the numbers may look off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityIssue {
    /// Splits violate the split invariants (sum, positivity, duplicates).
    InvalidSplits {
        expense_id: ExpenseId,
        description: String,
        error: SplitError,
    },
    /// The payer of an expense is no longer part of the trip.
    OrphanedPayer {
        expense_id: ExpenseId,
        participant_id: ParticipantId,
    },
    /// A split points at someone no longer part of the trip.
    OrphanedSplit {
        expense_id: ExpenseId,
        participant_id: ParticipantId,
    },
    /// A payment endpoint is no longer part of the trip.
    OrphanedPayment {
        payment_id: PaymentId,
        participant_id: ParticipantId,
    },
    /// A payment with a zero or negative amount, or sent to oneself.
    InvalidPayment { payment_id: PaymentId },
    /// Nets differ from the cents that accepted splits leave unassigned.
    /// Orphaned references and invalid splits both end up here.
    Unbalanced { total_net: Cents, expected: Cents },
}

impl fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrityIssue::InvalidSplits {
                expense_id,
                description,
                error,
            } => write!(f, "Expense \"{}\" ({}): {}", description, expense_id, error),
            IntegrityIssue::OrphanedPayer {
                expense_id,
                participant_id,
            } => write!(
                f,
                "Expense {} was paid by removed participant {}",
                expense_id, participant_id
            ),
            IntegrityIssue::OrphanedSplit {
                expense_id,
                participant_id,
            } => write!(
                f,
                "Expense {} has a split for removed participant {}",
                expense_id, participant_id
            ),
            IntegrityIssue::OrphanedPayment {
                payment_id,
                participant_id,
            } => write!(
                f,
                "Payment {} involves removed participant {}",
                payment_id, participant_id
            ),
            IntegrityIssue::InvalidPayment { payment_id } => {
                write!(f, "Payment {} has an invalid amount or endpoints", payment_id)
            }
            IntegrityIssue::Unbalanced {
                total_net,
                expected,
            } => write!(
                f,
                "Net balances sum to {} cents instead of {}",
                total_net, expected
            ),
        }
    }
}

/// Result of re-validating a trip's stored data.
#[derive(Debug, Clone)]
pub struct IntegrityReport {
    pub participant_count: usize,
    pub expense_count: usize,
    pub payment_count: usize,
    pub total_net: Cents,
    /// Sum of `amount - splits` over clean expenses. Exact splits may be a
    /// cent off, and that cent stays in the net total.
    pub split_drift: Cents,
    pub issues: Vec<IntegrityIssue>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Re-check everything the input boundary is supposed to guarantee.
pub fn check_integrity(
    participants: &[Participant],
    expenses: &[Expense],
    payments: &[Payment],
) -> IntegrityReport {
    let known: HashSet<ParticipantId> = participants.iter().map(|p| p.id).collect();
    let mut issues = Vec::new();
    let mut split_drift: Cents = 0;

    for expense in expenses {
        let found = issues.len();
        if let Err(error) = validate_splits(expense.amount_cents, &expense.splits) {
            issues.push(IntegrityIssue::InvalidSplits {
                expense_id: expense.id,
                description: expense.description.clone(),
                error,
            });
        }
        if !known.contains(&expense.paid_by) {
            issues.push(IntegrityIssue::OrphanedPayer {
                expense_id: expense.id,
                participant_id: expense.paid_by,
            });
        }
        for split in &expense.splits {
            if !known.contains(&split.participant_id) {
                issues.push(IntegrityIssue::OrphanedSplit {
                    expense_id: expense.id,
                    participant_id: split.participant_id,
                });
            }
        }
        if issues.len() == found {
            let assigned: Cents = expense.splits.iter().map(|s| s.amount_cents).sum();
            split_drift += expense.amount_cents - assigned;
        }
    }

    for payment in payments {
        if payment.amount_cents <= 0 || payment.is_self_payment() {
            issues.push(IntegrityIssue::InvalidPayment {
                payment_id: payment.id,
            });
        }
        for endpoint in [payment.from_participant, payment.to_participant] {
            if !known.contains(&endpoint) {
                issues.push(IntegrityIssue::OrphanedPayment {
                    payment_id: payment.id,
                    participant_id: endpoint,
                });
            }
        }
    }

    let total = total_net(&compute_balances(participants, expenses, payments));
    if total != split_drift {
        issues.push(IntegrityIssue::Unbalanced {
            total_net: total,
            expected: split_drift,
        });
    }

    IntegrityReport {
        participant_count: participants.len(),
        expense_count: expenses.len(),
        payment_count: payments.len(),
        total_net: total,
        split_drift,
        issues,
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::domain::Split;

    #[test]
    fn test_clean_trip_is_healthy() {
        let trip = Uuid::new_v4();
        let alice = Participant::new(trip, "Alice");
        let bob = Participant::new(trip, "Bob");
        let expense = Expense::new(
            trip,
            "Dinner",
            1000,
            alice.id,
            vec![Split::new(alice.id, 500), Split::new(bob.id, 500)],
        );
        let payment = Payment::new(trip, bob.id, alice.id, 500);

        let report = check_integrity(&[alice, bob], &[expense], &[payment]);

        assert!(report.is_healthy(), "issues: {:?}", report.issues);
        assert_eq!(report.total_net, 0);
        assert_eq!(report.expense_count, 1);
        assert_eq!(report.payment_count, 1);
    }

    #[test]
    fn test_detects_bad_split_sum() {
        let trip = Uuid::new_v4();
        let alice = Participant::new(trip, "Alice");
        let expense = Expense::new(trip, "Hotel", 1000, alice.id, vec![Split::new(alice.id, 900)]);

        let report = check_integrity(&[alice], &[expense], &[]);

        assert!(matches!(
            report.issues.as_slice(),
            [IntegrityIssue::InvalidSplits {
                error: SplitError::SumMismatch { .. },
                ..
            }, IntegrityIssue::Unbalanced {
                total_net: 100,
                expected: 0
            }]
        ));
    }

    #[test]
    fn test_detects_orphaned_references() {
        let trip = Uuid::new_v4();
        let alice = Participant::new(trip, "Alice");
        let ghost = Uuid::new_v4();
        let expense = Expense::new(
            trip,
            "Museum",
            2000,
            alice.id,
            vec![Split::new(alice.id, 1000), Split::new(ghost, 1000)],
        );
        let expense_id = expense.id;
        let payment = Payment::new(trip, ghost, alice.id, 1000);

        let report = check_integrity(&[alice], &[expense], &[payment]);

        assert!(report.issues.contains(&IntegrityIssue::OrphanedSplit {
            expense_id,
            participant_id: ghost,
        }));
        assert!(
            report
                .issues
                .iter()
                .any(|i| matches!(i, IntegrityIssue::OrphanedPayment { participant_id, .. } if *participant_id == ghost))
        );
        assert!(!report.is_healthy());
    }

    #[test]
    fn test_split_drift_within_tolerance_is_healthy() {
        let trip = Uuid::new_v4();
        let people: Vec<Participant> = ["Alice", "Bob", "Charlie"]
            .into_iter()
            .map(|name| Participant::new(trip, name))
            .collect();
        let splits = people.iter().map(|p| Split::new(p.id, 3333)).collect();
        let expense = Expense::new(trip, "Taxi", 10000, people[0].id, splits);

        let report = check_integrity(&people, &[expense], &[]);

        assert!(report.is_healthy(), "issues: {:?}", report.issues);
        assert_eq!(report.total_net, 1);
        assert_eq!(report.split_drift, 1);
    }

    #[test]
    fn test_drift_of_orphaned_expense_is_not_excused() {
        let trip = Uuid::new_v4();
        let alice = Participant::new(trip, "Alice");
        let ghost = Uuid::new_v4();
        let expense = Expense::new(
            trip,
            "Taxi",
            10000,
            alice.id,
            vec![Split::new(alice.id, 5000), Split::new(ghost, 4999)],
        );

        let report = check_integrity(&[alice], &[expense], &[]);

        assert_eq!(report.split_drift, 0);
        assert!(report.issues.contains(&IntegrityIssue::Unbalanced {
            total_net: 5000,
            expected: 0,
        }));
    }
}
