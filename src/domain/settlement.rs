use serde::{Deserialize, Serialize};

use super::{Balance, Cents, ParticipantId, TOLERANCE_CENTS, money};

/// A directed instruction: `from` should pay `to` the given amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimplifiedDebt {
    pub from_participant_id: ParticipantId,
    pub from_participant_name: String,
    pub to_participant_id: ParticipantId,
    pub to_participant_name: String,
    #[serde(with = "money::decimal")]
    pub amount: Cents,
}

/// Working copy of one side of the ledger during the sweep.
struct Party<'a> {
    balance: &'a Balance,
    remaining: Cents,
}

/// Reduce balances to a short list of payments that settles everyone.
///
/// Participants whose net is within [`TOLERANCE_CENTS`] of zero are treated
/// as settled and left out. Creditors and debtors are each sorted largest
/// first (ties keep input order) and matched greedily with two pointers: the
/// largest remaining debtor pays the largest remaining creditor as much as
/// both can absorb. Transfers no larger than the tolerance are not emitted.
///
/// Greedy matching is deterministic but not guaranteed to use the fewest
/// possible transfers (finding that minimum is NP-hard). It never emits more
/// than `creditors + debtors - 1` transfers.
pub fn simplify_debts(balances: &[Balance]) -> Vec<SimplifiedDebt> {
    let mut creditors: Vec<Party> = balances
        .iter()
        .filter(|b| b.net > TOLERANCE_CENTS)
        .map(|balance| Party {
            balance,
            remaining: balance.net,
        })
        .collect();
    let mut debtors: Vec<Party> = balances
        .iter()
        .filter(|b| b.net < -TOLERANCE_CENTS)
        .map(|balance| Party {
            balance,
            remaining: -balance.net,
        })
        .collect();

    creditors.sort_by(|a, b| b.remaining.cmp(&a.remaining));
    debtors.sort_by(|a, b| b.remaining.cmp(&a.remaining));

    let mut debts = Vec::new();
    let (mut i, mut j) = (0, 0);

    while i < creditors.len() && j < debtors.len() {
        let creditor = &mut creditors[i];
        let debtor = &mut debtors[j];

        let payment = creditor.remaining.min(debtor.remaining);
        if payment > TOLERANCE_CENTS {
            debts.push(SimplifiedDebt {
                from_participant_id: debtor.balance.participant_id,
                from_participant_name: debtor.balance.participant_name.clone(),
                to_participant_id: creditor.balance.participant_id,
                to_participant_name: creditor.balance.participant_name.clone(),
                amount: payment,
            });
        }

        creditor.remaining -= payment;
        debtor.remaining -= payment;

        if creditor.remaining < TOLERANCE_CENTS {
            i += 1;
        }
        if debtor.remaining < TOLERANCE_CENTS {
            j += 1;
        }
    }

    debts
}

/// Apply debts to balances as if each one had been paid.
///
/// Uses the same payment rule as the balance calculation: the payer's
/// `owes` drops, the recipient's rises. Debts naming unknown participants
/// only affect the side that is known.
pub fn apply_debts(balances: &[Balance], debts: &[SimplifiedDebt]) -> Vec<Balance> {
    let mut settled = balances.to_vec();
    for debt in debts {
        if let Some(from) = settled
            .iter_mut()
            .find(|b| b.participant_id == debt.from_participant_id)
        {
            from.owes -= debt.amount;
            from.net = from.paid - from.owes;
        }
        if let Some(to) = settled
            .iter_mut()
            .find(|b| b.participant_id == debt.to_participant_id)
        {
            to.owes += debt.amount;
            to.net = to.paid - to.owes;
        }
    }
    settled
}

/// True when every participant is within tolerance of zero.
pub fn is_settled(balances: &[Balance]) -> bool {
    balances.iter().all(Balance::is_settled)
}
