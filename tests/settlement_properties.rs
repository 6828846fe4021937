use proptest::prelude::*;
use tripsplit::domain::{
    Balance, Expense, Participant, Payment, TOLERANCE_CENTS, apply_debts, compute_balances,
    is_settled, simplify_debts, split_equally, total_net,
};
use uuid::Uuid;

/// Build balances for `member_count` participants from index-based expenses
/// (payer, amount) and payments (from, to, amount). Self-payments are skipped.
fn balances_for(
    member_count: usize,
    expenses: &[(usize, i64)],
    payments: &[(usize, usize, i64)],
) -> Vec<Balance> {
    let trip = Uuid::new_v4();
    let participants: Vec<Participant> = (0..member_count)
        .map(|i| Participant::new(trip, format!("P{}", i)))
        .collect();
    let ids: Vec<_> = participants.iter().map(|p| p.id).collect();

    let expenses: Vec<Expense> = expenses
        .iter()
        .map(|&(payer, amount)| {
            let splits = split_equally(amount, &ids).expect("valid equal split");
            Expense::new(trip, "expense", amount, ids[payer % member_count], splits)
        })
        .collect();

    let payments: Vec<Payment> = payments
        .iter()
        .map(|&(from, to, amount)| (from % member_count, to % member_count, amount))
        .filter(|(from, to, _)| from != to)
        .map(|(from, to, amount)| Payment::new(trip, ids[from], ids[to], amount))
        .collect();

    compute_balances(&participants, &expenses, &payments)
}

proptest! {
    #[test]
    fn balances_sum_to_zero(
        member_count in 1usize..=6,
        expenses in prop::collection::vec((0usize..6, 1i64..=100_000), 0..=20),
        payments in prop::collection::vec((0usize..6, 0usize..6, 1i64..=50_000), 0..=10),
    ) {
        let balances = balances_for(member_count, &expenses, &payments);
        prop_assert_eq!(balances.len(), member_count);
        prop_assert_eq!(total_net(&balances), 0);
        for b in &balances {
            prop_assert_eq!(b.net, b.paid - b.owes);
        }
    }
}

proptest! {
    #[test]
    fn debts_never_pay_oneself_and_stay_bounded(
        member_count in 1usize..=6,
        expenses in prop::collection::vec((0usize..6, 1i64..=100_000), 0..=20),
        payments in prop::collection::vec((0usize..6, 0usize..6, 1i64..=50_000), 0..=10),
    ) {
        let balances = balances_for(member_count, &expenses, &payments);
        let debts = simplify_debts(&balances);

        let creditors = balances.iter().filter(|b| b.net > TOLERANCE_CENTS).count();
        let debtors = balances.iter().filter(|b| b.net < -TOLERANCE_CENTS).count();
        prop_assert!(debts.len() <= (creditors + debtors).saturating_sub(1));

        for debt in &debts {
            prop_assert_ne!(debt.from_participant_id, debt.to_participant_id);
            prop_assert!(debt.amount > TOLERANCE_CENTS);
        }
    }
}

proptest! {
    #[test]
    fn applying_debts_settles_whole_amounts(
        member_count in 1usize..=6,
        expenses in prop::collection::vec((0usize..6, 1i64..=50), 0..=20),
        payments in prop::collection::vec((0usize..6, 0usize..6, 1i64..=50), 0..=10),
    ) {
        // Whole-unit shares keep every net a multiple of 100 cents, away
        // from the tolerance band where residual cents can be left over.
        let unit = member_count as i64 * 100;
        let expenses: Vec<(usize, i64)> = expenses
            .into_iter()
            .map(|(payer, units)| (payer, units * unit))
            .collect();
        let payments: Vec<(usize, usize, i64)> = payments
            .into_iter()
            .map(|(from, to, units)| (from, to, units * 100))
            .collect();

        let balances = balances_for(member_count, &expenses, &payments);
        let debts = simplify_debts(&balances);
        let settled = apply_debts(&balances, &debts);

        prop_assert!(is_settled(&settled));
        prop_assert!(simplify_debts(&settled).is_empty());
    }
}
