use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::domain::{
    Balance, BasisPoints, Cents, Expense, ExpenseId, IntegrityReport, Participant, ParticipantId,
    Payment, PaymentId, SimplifiedDebt, Split, SplitError, SplitStrategy, Trip, check_integrity,
    compute_balances, display_name, simplify_debts, validate_splits,
};
use crate::storage::{Repository, TripLedger, is_unique_violation};

use super::AppError;

/// Application service for trips and their shared expenses.
/// This is the primary interface for any client (CLI, export, tests).
pub struct TripService {
    repo: Repository,
}

/// How the CLI (or any client) asks for an expense to be split, by name.
#[derive(Debug, Clone)]
pub enum SplitRequest {
    /// Equal shares among the named participants; everyone when empty.
    Equal(Vec<String>),
    /// Percentage shares in basis points, must total 100%.
    Percentage(Vec<(String, BasisPoints)>),
    /// Exact amounts, must sum to the expense amount within one cent.
    Exact(Vec<(String, Cents)>),
}

/// Input for recording an expense.
#[derive(Debug, Clone)]
pub struct NewExpense {
    pub description: String,
    pub amount_cents: Cents,
    pub payer: String,
    pub split: SplitRequest,
    pub expense_date: Option<DateTime<Utc>>,
}

/// Changes to an existing expense. Fields left as `None` keep their value.
#[derive(Debug, Clone, Default)]
pub struct ExpenseUpdate {
    pub description: Option<String>,
    pub amount_cents: Option<Cents>,
    pub payer: Option<String>,
    pub split: Option<SplitRequest>,
    pub expense_date: Option<DateTime<Utc>>,
}

/// One split with the participant's display name.
#[derive(Debug, Clone)]
pub struct SplitDetails {
    pub participant_id: ParticipantId,
    pub participant_name: String,
    pub amount_cents: Cents,
}

/// An expense with names resolved for display.
#[derive(Debug, Clone)]
pub struct ExpenseDetails {
    pub expense: Expense,
    pub payer_name: String,
    pub splits: Vec<SplitDetails>,
}

/// A payment with names resolved for display.
#[derive(Debug, Clone)]
pub struct PaymentDetails {
    pub payment: Payment,
    pub from_name: String,
    pub to_name: String,
}

/// A removed participant and how much history still points at them.
#[derive(Debug, Clone)]
pub struct RemovedParticipant {
    pub participant: Participant,
    pub expense_refs: usize,
    pub payment_refs: usize,
}

impl RemovedParticipant {
    pub fn is_referenced(&self) -> bool {
        self.expense_refs > 0 || self.payment_refs > 0
    }
}

/// Everything known about a trip, derived from a single consistent read.
#[derive(Debug, Clone)]
pub struct TripSnapshot {
    pub trip: Trip,
    pub participants: Vec<Participant>,
    pub expenses: Vec<ExpenseDetails>,
    pub payments: Vec<PaymentDetails>,
    pub balances: Vec<Balance>,
    pub debts: Vec<SimplifiedDebt>,
}

impl TripService {
    /// Create a new trip service with the given repository.
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Initialize a new database at the given path.
    pub async fn init(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url).await?;
        info!(database = database_path, "initialized database");
        Ok(Self::new(repo))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url).await?;
        debug!(database = database_path, "connected to database");
        Ok(Self::new(repo))
    }

    // ========================
    // Trip operations
    // ========================

    /// Create a new trip with a unique name.
    pub async fn create_trip(&self, name: &str) -> Result<Trip, AppError> {
        let name = required("Trip name", name)?;
        if self.repo.get_trip_by_name(&name).await?.is_some() {
            return Err(AppError::TripAlreadyExists(name));
        }

        let trip = Trip::new(name);
        self.repo
            .save_trip(&trip)
            .await
            .map_err(|err| conflict(err, || AppError::TripAlreadyExists(trip.name.clone())))?;
        info!(trip = %trip.name, id = %trip.id, "created trip");
        Ok(trip)
    }

    /// Get a trip by name.
    pub async fn get_trip(&self, name: &str) -> Result<Trip, AppError> {
        self.repo
            .get_trip_by_name(name.trim())
            .await?
            .ok_or_else(|| AppError::TripNotFound(name.to_string()))
    }

    /// List all trips.
    pub async fn list_trips(&self) -> Result<Vec<Trip>, AppError> {
        Ok(self.repo.list_trips().await?)
    }

    /// Rename a trip. The new name must be free.
    pub async fn rename_trip(&self, name: &str, new_name: &str) -> Result<Trip, AppError> {
        let trip = self.get_trip(name).await?;
        let new_name = required("Trip name", new_name)?;
        if new_name != trip.name && self.repo.get_trip_by_name(&new_name).await?.is_some() {
            return Err(AppError::TripAlreadyExists(new_name));
        }

        let trip = trip.renamed(new_name);
        self.repo
            .update_trip(&trip)
            .await
            .map_err(|err| conflict(err, || AppError::TripAlreadyExists(trip.name.clone())))?;
        info!(from = name, to = %trip.name, "renamed trip");
        Ok(trip)
    }

    /// Delete a trip with all its participants, expenses and payments.
    pub async fn delete_trip(&self, name: &str) -> Result<Trip, AppError> {
        let trip = self.get_trip(name).await?;
        self.repo.delete_trip(trip.id).await?;
        info!(trip = %trip.name, "deleted trip");
        Ok(trip)
    }

    // ========================
    // Participant operations
    // ========================

    /// Add a participant to a trip. Names are unique within a trip.
    pub async fn add_participant(&self, trip: &str, name: &str) -> Result<Participant, AppError> {
        let trip = self.get_trip(trip).await?;
        let name = required("Participant name", name)?;
        if self
            .repo
            .get_participant_by_name(trip.id, &name)
            .await?
            .is_some()
        {
            return Err(AppError::ParticipantAlreadyExists(name));
        }

        let participant = Participant::new(trip.id, name);
        self.repo.save_participant(&participant).await.map_err(|err| {
            conflict(err, || {
                AppError::ParticipantAlreadyExists(participant.name.clone())
            })
        })?;
        info!(trip = %trip.name, participant = %participant.name, "added participant");
        Ok(participant)
    }

    /// List a trip's participants in the order they joined.
    pub async fn list_participants(&self, trip: &str) -> Result<Vec<Participant>, AppError> {
        let trip = self.get_trip(trip).await?;
        Ok(self.repo.list_participants(trip.id).await?)
    }

    /// Remove a participant. Their expenses and payments are kept and will
    /// show up under the name "Unknown".
    pub async fn remove_participant(
        &self,
        trip: &str,
        name: &str,
    ) -> Result<RemovedParticipant, AppError> {
        let trip = self.get_trip(trip).await?;
        let participant = self.find_participant(&trip, name).await?;

        let ledger = self.repo.load_ledger(trip.id).await?;
        let expense_refs = ledger
            .expenses
            .iter()
            .filter(|e| e.involves(participant.id))
            .count();
        let payment_refs = ledger
            .payments
            .iter()
            .filter(|p| p.involves(participant.id))
            .count();

        self.repo.delete_participant(participant.id).await?;

        let removed = RemovedParticipant {
            participant,
            expense_refs,
            payment_refs,
        };
        if removed.is_referenced() {
            warn!(
                participant = %removed.participant.name,
                expenses = expense_refs,
                payments = payment_refs,
                "removed participant is still referenced"
            );
        }
        info!(trip = %trip.name, participant = %removed.participant.name, "removed participant");
        Ok(removed)
    }

    async fn find_participant(&self, trip: &Trip, name: &str) -> Result<Participant, AppError> {
        self.repo
            .get_participant_by_name(trip.id, name.trim())
            .await?
            .ok_or_else(|| AppError::ParticipantNotFound(name.to_string()))
    }

    // ========================
    // Expense operations
    // ========================

    /// Record a new expense, building and validating its splits.
    pub async fn record_expense(
        &self,
        trip: &str,
        new: NewExpense,
    ) -> Result<ExpenseDetails, AppError> {
        let trip = self.get_trip(trip).await?;
        let participants = self.repo.list_participants(trip.id).await?;

        let description = required("Description", &new.description)?;
        let amount_cents = positive(new.amount_cents)?;
        let payer = lookup(&participants, &new.payer)?;
        let splits = build_splits(&participants, &new.split, amount_cents)?;

        let mut expense = Expense::new(trip.id, description, amount_cents, payer.id, splits);
        if let Some(date) = new.expense_date {
            expense = expense.with_expense_date(date);
        }

        self.repo.save_expense(&expense).await?;
        info!(
            trip = %trip.name,
            expense = %expense.id,
            amount_cents = expense.amount_cents,
            payer = %payer.name,
            "recorded expense"
        );
        Ok(expense_details(&participants, expense))
    }

    /// Update an expense. The result is validated as a whole: changing the
    /// amount without new splits fails unless the old splits still add up.
    pub async fn update_expense(
        &self,
        trip: &str,
        id: ExpenseId,
        update: ExpenseUpdate,
    ) -> Result<ExpenseDetails, AppError> {
        let trip = self.get_trip(trip).await?;
        let mut expense = self
            .repo
            .get_expense(id)
            .await?
            .filter(|e| e.trip_id == trip.id)
            .ok_or_else(|| AppError::ExpenseNotFound(id.to_string()))?;
        let participants = self.repo.list_participants(trip.id).await?;

        if let Some(description) = update.description {
            expense.description = required("Description", &description)?;
        }
        if let Some(amount_cents) = update.amount_cents {
            expense.amount_cents = positive(amount_cents)?;
        }
        if let Some(payer) = update.payer {
            expense.paid_by = lookup(&participants, &payer)?.id;
        }
        if let Some(split) = update.split {
            expense.splits = build_splits(&participants, &split, expense.amount_cents)?;
        }
        if let Some(date) = update.expense_date {
            expense.expense_date = Some(date);
        }

        validate_splits(expense.amount_cents, &expense.splits)?;
        expense.touch();

        self.repo.update_expense(&expense).await?;
        info!(trip = %trip.name, expense = %expense.id, "updated expense");
        Ok(expense_details(&participants, expense))
    }

    /// Delete an expense and its splits.
    pub async fn delete_expense(&self, trip: &str, id: ExpenseId) -> Result<Expense, AppError> {
        let trip = self.get_trip(trip).await?;
        let expense = self
            .repo
            .get_expense(id)
            .await?
            .filter(|e| e.trip_id == trip.id)
            .ok_or_else(|| AppError::ExpenseNotFound(id.to_string()))?;

        self.repo.delete_expense(expense.id).await?;
        info!(trip = %trip.name, expense = %expense.id, "deleted expense");
        Ok(expense)
    }

    /// List a trip's expenses, newest first, with names resolved.
    pub async fn list_expenses(&self, trip: &str) -> Result<Vec<ExpenseDetails>, AppError> {
        let trip = self.get_trip(trip).await?;
        let ledger = self.repo.load_ledger(trip.id).await?;
        Ok(ledger
            .expenses
            .into_iter()
            .map(|e| expense_details(&ledger.participants, e))
            .collect())
    }

    // ========================
    // Payment operations
    // ========================

    /// Record a direct payment between two participants of a trip.
    pub async fn record_payment(
        &self,
        trip: &str,
        from: &str,
        to: &str,
        amount_cents: Cents,
    ) -> Result<PaymentDetails, AppError> {
        let trip = self.get_trip(trip).await?;
        let amount_cents = positive(amount_cents)?;
        let from = self.find_participant(&trip, from).await?;
        let to = self.find_participant(&trip, to).await?;
        if from.id == to.id {
            return Err(AppError::SelfPayment(from.name));
        }

        let payment = Payment::new(trip.id, from.id, to.id, amount_cents);
        self.repo.save_payment(&payment).await?;
        info!(
            trip = %trip.name,
            from = %from.name,
            to = %to.name,
            amount_cents,
            "recorded payment"
        );

        Ok(PaymentDetails {
            payment,
            from_name: from.name,
            to_name: to.name,
        })
    }

    /// Change the amount of a payment.
    pub async fn update_payment(
        &self,
        trip: &str,
        id: PaymentId,
        amount_cents: Cents,
    ) -> Result<PaymentDetails, AppError> {
        let trip = self.get_trip(trip).await?;
        let amount_cents = positive(amount_cents)?;
        let mut payment = self.find_payment(&trip, id).await?;

        self.repo.update_payment_amount(payment.id, amount_cents).await?;
        payment.amount_cents = amount_cents;
        info!(trip = %trip.name, payment = %payment.id, amount_cents, "updated payment");

        let participants = self.repo.list_participants(trip.id).await?;
        Ok(payment_details(&participants, payment))
    }

    /// Delete a payment.
    pub async fn delete_payment(&self, trip: &str, id: PaymentId) -> Result<Payment, AppError> {
        let trip = self.get_trip(trip).await?;
        let payment = self.find_payment(&trip, id).await?;

        self.repo.delete_payment(payment.id).await?;
        info!(trip = %trip.name, payment = %payment.id, "deleted payment");
        Ok(payment)
    }

    /// List a trip's payments, newest first, with names resolved.
    pub async fn list_payments(&self, trip: &str) -> Result<Vec<PaymentDetails>, AppError> {
        let trip = self.get_trip(trip).await?;
        let ledger = self.repo.load_ledger(trip.id).await?;
        Ok(ledger
            .payments
            .into_iter()
            .map(|p| payment_details(&ledger.participants, p))
            .collect())
    }

    async fn find_payment(&self, trip: &Trip, id: PaymentId) -> Result<Payment, AppError> {
        self.repo
            .get_payment(id)
            .await?
            .filter(|p| p.trip_id == trip.id)
            .ok_or_else(|| AppError::PaymentNotFound(id.to_string()))
    }

    // ========================
    // Balances and settlement
    // ========================

    /// Net balance of every participant of a trip.
    pub async fn balances(&self, trip: &str) -> Result<Vec<Balance>, AppError> {
        let trip = self.get_trip(trip).await?;
        let ledger = self.repo.load_ledger(trip.id).await?;
        let balances = compute_balances(&ledger.participants, &ledger.expenses, &ledger.payments);
        debug!(trip = %trip.name, participants = balances.len(), "computed balances");
        Ok(balances)
    }

    /// Payments that would settle the trip.
    pub async fn simplified_debts(&self, trip: &str) -> Result<Vec<SimplifiedDebt>, AppError> {
        let balances = self.balances(trip).await?;
        let debts = simplify_debts(&balances);
        debug!(trip = trip, debts = debts.len(), "simplified debts");
        Ok(debts)
    }

    /// Record every current simplified debt as a payment, leaving all
    /// participants settled. Returns the recorded payments.
    pub async fn settle_up(&self, trip: &str) -> Result<Vec<PaymentDetails>, AppError> {
        let trip = self.get_trip(trip).await?;
        let ledger = self.repo.load_ledger(trip.id).await?;
        let balances = compute_balances(&ledger.participants, &ledger.expenses, &ledger.payments);
        let debts = simplify_debts(&balances);

        let payments: Vec<Payment> = debts
            .iter()
            .map(|d| {
                Payment::new(
                    trip.id,
                    d.from_participant_id,
                    d.to_participant_id,
                    d.amount,
                )
            })
            .collect();

        if !payments.is_empty() {
            self.repo.save_payments(&payments).await?;
        }
        info!(trip = %trip.name, payments = payments.len(), "settled up");

        Ok(debts
            .into_iter()
            .zip(payments)
            .map(|(debt, payment)| PaymentDetails {
                payment,
                from_name: debt.from_participant_name,
                to_name: debt.to_participant_name,
            })
            .collect())
    }

    /// Everything about a trip from one consistent read.
    pub async fn snapshot(&self, trip: &str) -> Result<TripSnapshot, AppError> {
        let trip = self.get_trip(trip).await?;
        let TripLedger {
            participants,
            expenses,
            payments,
        } = self.repo.load_ledger(trip.id).await?;

        let balances = compute_balances(&participants, &expenses, &payments);
        let debts = simplify_debts(&balances);

        let expenses = expenses
            .into_iter()
            .map(|e| expense_details(&participants, e))
            .collect();
        let payments = payments
            .into_iter()
            .map(|p| payment_details(&participants, p))
            .collect();

        Ok(TripSnapshot {
            trip,
            participants,
            expenses,
            payments,
            balances,
            debts,
        })
    }

    // ========================
    // Integrity operations
    // ========================

    /// Re-validate a trip's stored data and return a report.
    pub async fn check_integrity(&self, trip: &str) -> Result<IntegrityReport, AppError> {
        let trip = self.get_trip(trip).await?;
        let ledger = self.repo.load_ledger(trip.id).await?;
        let report = check_integrity(&ledger.participants, &ledger.expenses, &ledger.payments);
        debug!(trip = %trip.name, issues = report.issues.len(), "checked integrity");
        Ok(report)
    }
}

fn required(field: &str, value: &str) -> Result<String, AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::InvalidInput(format!("{} cannot be empty", field)));
    }
    Ok(value.to_string())
}

fn positive(amount_cents: Cents) -> Result<Cents, AppError> {
    if amount_cents <= 0 {
        return Err(AppError::InvalidAmount(
            "Amount must be positive".to_string(),
        ));
    }
    Ok(amount_cents)
}

fn lookup<'a>(participants: &'a [Participant], name: &str) -> Result<&'a Participant, AppError> {
    let trimmed = name.trim();
    participants
        .iter()
        .find(|p| p.name == trimmed)
        .ok_or_else(|| AppError::ParticipantNotFound(name.to_string()))
}

/// Resolve names to participants and build the concrete splits.
fn build_splits(
    participants: &[Participant],
    request: &SplitRequest,
    amount_cents: Cents,
) -> Result<Vec<Split>, AppError> {
    let strategy = match request {
        SplitRequest::Equal(names) if names.is_empty() => {
            if participants.is_empty() {
                return Err(SplitError::Empty.into());
            }
            SplitStrategy::Equal(participants.iter().map(|p| p.id).collect())
        }
        SplitRequest::Equal(names) => SplitStrategy::Equal(
            names
                .iter()
                .map(|n| lookup(participants, n).map(|p| p.id))
                .collect::<Result<_, _>>()?,
        ),
        SplitRequest::Percentage(shares) => SplitStrategy::Percentage(
            shares
                .iter()
                .map(|(n, bp)| lookup(participants, n).map(|p| (p.id, *bp)))
                .collect::<Result<_, _>>()?,
        ),
        SplitRequest::Exact(amounts) => SplitStrategy::Exact(
            amounts
                .iter()
                .map(|(n, cents)| lookup(participants, n).map(|p| Split::new(p.id, *cents)))
                .collect::<Result<_, _>>()?,
        ),
    };

    Ok(strategy.build(amount_cents)?)
}

/// Turn a lost race on a unique name into the matching "already exists" error.
fn conflict(err: anyhow::Error, already_exists: impl FnOnce() -> AppError) -> AppError {
    if is_unique_violation(&err) {
        already_exists()
    } else {
        AppError::Database(err)
    }
}

fn expense_details(participants: &[Participant], expense: Expense) -> ExpenseDetails {
    let splits = expense
        .splits
        .iter()
        .map(|s| SplitDetails {
            participant_id: s.participant_id,
            participant_name: display_name(participants, s.participant_id).to_string(),
            amount_cents: s.amount_cents,
        })
        .collect();

    ExpenseDetails {
        payer_name: display_name(participants, expense.paid_by).to_string(),
        splits,
        expense,
    }
}

fn payment_details(participants: &[Participant], payment: Payment) -> PaymentDetails {
    PaymentDetails {
        from_name: display_name(participants, payment.from_participant).to_string(),
        to_name: display_name(participants, payment.to_participant).to_string(),
        payment,
    }
}
