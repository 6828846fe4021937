use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteExecutor, SqlitePool};
use uuid::Uuid;

use crate::domain::{
    Cents, Expense, ExpenseId, Participant, ParticipantId, Payment, PaymentId, Split, Trip,
    TripId,
};

use super::MIGRATION_001_INITIAL;

/// Everything the balance engine needs for one trip, read in a single
/// transaction so the parts are consistent with each other.
#[derive(Debug, Clone, Default)]
pub struct TripLedger {
    pub participants: Vec<Participant>,
    pub expenses: Vec<Expense>,
    pub payments: Vec<Payment>,
}

/// Repository for persisting and querying trips, participants, expenses and payments.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database at the given URL.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    // ========================
    // Trip operations
    // ========================

    /// Save a new trip.
    pub async fn save_trip(&self, trip: &Trip) -> Result<()> {
        sqlx::query("INSERT INTO trips (id, name, created_at, updated_at) VALUES (?, ?, ?, ?)")
            .bind(trip.id.to_string())
            .bind(&trip.name)
            .bind(trip.created_at.to_rfc3339())
            .bind(trip.updated_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .context("Failed to save trip")?;
        Ok(())
    }

    /// Get a trip by name.
    pub async fn get_trip_by_name(&self, name: &str) -> Result<Option<Trip>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, created_at, updated_at
            FROM trips
            WHERE name = ?
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch trip by name")?;

        row.as_ref().map(Self::row_to_trip).transpose()
    }

    /// List all trips, most recently created first.
    pub async fn list_trips(&self) -> Result<Vec<Trip>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, created_at, updated_at
            FROM trips
            ORDER BY created_at DESC, name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list trips")?;

        rows.iter().map(Self::row_to_trip).collect()
    }

    /// Persist a trip's name and update timestamp.
    pub async fn update_trip(&self, trip: &Trip) -> Result<()> {
        sqlx::query("UPDATE trips SET name = ?, updated_at = ? WHERE id = ?")
            .bind(&trip.name)
            .bind(trip.updated_at.to_rfc3339())
            .bind(trip.id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to update trip")?;
        Ok(())
    }

    /// Delete a trip and, through cascading keys, everything it owns.
    pub async fn delete_trip(&self, id: TripId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM trips WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to delete trip")?;
        Ok(result.rows_affected() > 0)
    }

    fn row_to_trip(row: &sqlx::sqlite::SqliteRow) -> Result<Trip> {
        Ok(Trip {
            id: parse_id(row, "id")?,
            name: row.get("name"),
            created_at: parse_timestamp(row, "created_at")?,
            updated_at: parse_timestamp(row, "updated_at")?,
        })
    }

    // ========================
    // Participant operations
    // ========================

    /// Save a new participant.
    pub async fn save_participant(&self, participant: &Participant) -> Result<()> {
        sqlx::query("INSERT INTO participants (id, trip_id, name, created_at) VALUES (?, ?, ?, ?)")
            .bind(participant.id.to_string())
            .bind(participant.trip_id.to_string())
            .bind(&participant.name)
            .bind(participant.created_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .context("Failed to save participant")?;
        Ok(())
    }

    /// List a trip's participants in the order they joined.
    pub async fn list_participants(&self, trip_id: TripId) -> Result<Vec<Participant>> {
        fetch_participants(&self.pool, trip_id).await
    }

    /// Get a participant of a trip by name.
    pub async fn get_participant_by_name(
        &self,
        trip_id: TripId,
        name: &str,
    ) -> Result<Option<Participant>> {
        let row = sqlx::query(
            r#"
            SELECT id, trip_id, name, created_at
            FROM participants
            WHERE trip_id = ? AND name = ?
            "#,
        )
        .bind(trip_id.to_string())
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch participant by name")?;

        row.as_ref().map(row_to_participant).transpose()
    }

    /// Delete a participant. Expenses, splits and payments referring to them stay.
    pub async fn delete_participant(&self, id: ParticipantId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM participants WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to delete participant")?;
        Ok(result.rows_affected() > 0)
    }

    // ========================
    // Expense operations
    // ========================

    /// Save a new expense together with its splits.
    pub async fn save_expense(&self, expense: &Expense) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query(
            r#"
            INSERT INTO expenses (id, trip_id, description, amount_cents, paid_by, expense_date, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(expense.id.to_string())
        .bind(expense.trip_id.to_string())
        .bind(&expense.description)
        .bind(expense.amount_cents)
        .bind(expense.paid_by.to_string())
        .bind(expense.expense_date.map(|dt| dt.to_rfc3339()))
        .bind(expense.created_at.to_rfc3339())
        .bind(expense.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .context("Failed to save expense")?;

        insert_splits(&mut tx, expense.id, &expense.splits).await?;

        tx.commit().await.context("Failed to commit expense")?;
        Ok(())
    }

    /// Overwrite an expense and replace its splits.
    pub async fn update_expense(&self, expense: &Expense) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query(
            r#"
            UPDATE expenses
            SET description = ?, amount_cents = ?, paid_by = ?, expense_date = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&expense.description)
        .bind(expense.amount_cents)
        .bind(expense.paid_by.to_string())
        .bind(expense.expense_date.map(|dt| dt.to_rfc3339()))
        .bind(expense.updated_at.to_rfc3339())
        .bind(expense.id.to_string())
        .execute(&mut *tx)
        .await
        .context("Failed to update expense")?;

        sqlx::query("DELETE FROM expense_splits WHERE expense_id = ?")
            .bind(expense.id.to_string())
            .execute(&mut *tx)
            .await
            .context("Failed to clear expense splits")?;

        insert_splits(&mut tx, expense.id, &expense.splits).await?;

        tx.commit().await.context("Failed to commit expense update")?;
        Ok(())
    }

    /// Get an expense (with splits) by ID.
    pub async fn get_expense(&self, id: ExpenseId) -> Result<Option<Expense>> {
        let row = sqlx::query(
            r#"
            SELECT id, trip_id, description, amount_cents, paid_by, expense_date, created_at, updated_at
            FROM expenses
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch expense")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut expense = row_to_expense(&row)?;
        let split_rows = sqlx::query(
            "SELECT participant_id, amount_cents FROM expense_splits WHERE expense_id = ? ORDER BY position",
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch expense splits")?;

        expense.splits = split_rows
            .iter()
            .map(row_to_split)
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(expense))
    }

    /// List a trip's expenses (with splits), newest first.
    pub async fn list_expenses(&self, trip_id: TripId) -> Result<Vec<Expense>> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire connection")?;
        fetch_expenses(&mut conn, trip_id).await
    }

    /// Delete an expense; its splits go with it.
    pub async fn delete_expense(&self, id: ExpenseId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM expenses WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to delete expense")?;
        Ok(result.rows_affected() > 0)
    }

    // ========================
    // Payment operations
    // ========================

    /// Save a new payment.
    pub async fn save_payment(&self, payment: &Payment) -> Result<()> {
        insert_payment(&self.pool, payment).await
    }

    /// Save several payments atomically.
    pub async fn save_payments(&self, payments: &[Payment]) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        for payment in payments {
            insert_payment(&mut *tx, payment).await?;
        }
        tx.commit().await.context("Failed to commit payments")?;
        Ok(())
    }

    /// Change the amount of an existing payment.
    pub async fn update_payment_amount(&self, id: PaymentId, amount_cents: Cents) -> Result<bool> {
        let result = sqlx::query("UPDATE payments SET amount_cents = ? WHERE id = ?")
            .bind(amount_cents)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to update payment")?;
        Ok(result.rows_affected() > 0)
    }

    /// Get a payment by ID.
    pub async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        let row = sqlx::query(
            r#"
            SELECT id, trip_id, from_participant_id, to_participant_id, amount_cents, created_at
            FROM payments
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch payment")?;

        row.as_ref().map(row_to_payment).transpose()
    }

    /// List a trip's payments, newest first.
    pub async fn list_payments(&self, trip_id: TripId) -> Result<Vec<Payment>> {
        fetch_payments(&self.pool, trip_id).await
    }

    /// Delete a payment.
    pub async fn delete_payment(&self, id: PaymentId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM payments WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to delete payment")?;
        Ok(result.rows_affected() > 0)
    }

    // ========================
    // Snapshot
    // ========================

    /// Load participants, expenses and payments of a trip in one read transaction.
    pub async fn load_ledger(&self, trip_id: TripId) -> Result<TripLedger> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let participants = fetch_participants(&mut *tx, trip_id).await?;
        let expenses = fetch_expenses(&mut tx, trip_id).await?;
        let payments = fetch_payments(&mut *tx, trip_id).await?;

        tx.commit().await.context("Failed to close snapshot")?;

        Ok(TripLedger {
            participants,
            expenses,
            payments,
        })
    }
}

async fn insert_splits(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    expense_id: ExpenseId,
    splits: &[Split],
) -> Result<()> {
    for (position, split) in splits.iter().enumerate() {
        sqlx::query(
            "INSERT INTO expense_splits (expense_id, participant_id, amount_cents, position) VALUES (?, ?, ?, ?)",
        )
        .bind(expense_id.to_string())
        .bind(split.participant_id.to_string())
        .bind(split.amount_cents)
        .bind(position as i64)
        .execute(&mut **tx)
        .await
        .context("Failed to save expense split")?;
    }
    Ok(())
}

async fn insert_payment<'e>(executor: impl SqliteExecutor<'e>, payment: &Payment) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO payments (id, trip_id, from_participant_id, to_participant_id, amount_cents, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payment.id.to_string())
    .bind(payment.trip_id.to_string())
    .bind(payment.from_participant.to_string())
    .bind(payment.to_participant.to_string())
    .bind(payment.amount_cents)
    .bind(payment.created_at.to_rfc3339())
    .execute(executor)
    .await
    .context("Failed to save payment")?;
    Ok(())
}

async fn fetch_participants<'e>(
    executor: impl SqliteExecutor<'e>,
    trip_id: TripId,
) -> Result<Vec<Participant>> {
    let rows = sqlx::query(
        r#"
        SELECT id, trip_id, name, created_at
        FROM participants
        WHERE trip_id = ?
        ORDER BY rowid
        "#,
    )
    .bind(trip_id.to_string())
    .fetch_all(executor)
    .await
    .context("Failed to list participants")?;

    rows.iter().map(row_to_participant).collect()
}

/// Expenses and their splits are read with two queries and stitched together.
/// Both queries need the same connection, hence the concrete connection type.
async fn fetch_expenses(conn: &mut sqlx::SqliteConnection, trip_id: TripId) -> Result<Vec<Expense>> {
    let rows = sqlx::query(
        r#"
        SELECT id, trip_id, description, amount_cents, paid_by, expense_date, created_at, updated_at
        FROM expenses
        WHERE trip_id = ?
        ORDER BY created_at DESC, rowid DESC
        "#,
    )
    .bind(trip_id.to_string())
    .fetch_all(&mut *conn)
    .await
    .context("Failed to list expenses")?;

    let split_rows = sqlx::query(
        r#"
        SELECT s.expense_id, s.participant_id, s.amount_cents
        FROM expense_splits s
        JOIN expenses e ON e.id = s.expense_id
        WHERE e.trip_id = ?
        ORDER BY s.expense_id, s.position
        "#,
    )
    .bind(trip_id.to_string())
    .fetch_all(&mut *conn)
    .await
    .context("Failed to list expense splits")?;

    let mut splits_by_expense: HashMap<ExpenseId, Vec<Split>> = HashMap::new();
    for row in &split_rows {
        let expense_id = parse_id(row, "expense_id")?;
        splits_by_expense
            .entry(expense_id)
            .or_default()
            .push(row_to_split(row)?);
    }

    rows.iter()
        .map(|row| {
            let mut expense = row_to_expense(row)?;
            expense.splits = splits_by_expense.remove(&expense.id).unwrap_or_default();
            Ok(expense)
        })
        .collect()
}

async fn fetch_payments<'e>(
    executor: impl SqliteExecutor<'e>,
    trip_id: TripId,
) -> Result<Vec<Payment>> {
    let rows = sqlx::query(
        r#"
        SELECT id, trip_id, from_participant_id, to_participant_id, amount_cents, created_at
        FROM payments
        WHERE trip_id = ?
        ORDER BY created_at DESC, rowid DESC
        "#,
    )
    .bind(trip_id.to_string())
    .fetch_all(executor)
    .await
    .context("Failed to list payments")?;

    rows.iter().map(row_to_payment).collect()
}

fn row_to_participant(row: &sqlx::sqlite::SqliteRow) -> Result<Participant> {
    Ok(Participant {
        id: parse_id(row, "id")?,
        trip_id: parse_id(row, "trip_id")?,
        name: row.get("name"),
        created_at: parse_timestamp(row, "created_at")?,
    })
}

fn row_to_expense(row: &sqlx::sqlite::SqliteRow) -> Result<Expense> {
    let expense_date: Option<String> = row.get("expense_date");

    Ok(Expense {
        id: parse_id(row, "id")?,
        trip_id: parse_id(row, "trip_id")?,
        description: row.get("description"),
        amount_cents: row.get("amount_cents"),
        paid_by: parse_id(row, "paid_by")?,
        splits: Vec::new(),
        expense_date: expense_date
            .map(|s| DateTime::parse_from_rfc3339(&s))
            .transpose()
            .context("Invalid expense_date timestamp")?
            .map(|dt| dt.with_timezone(&Utc)),
        created_at: parse_timestamp(row, "created_at")?,
        updated_at: parse_timestamp(row, "updated_at")?,
    })
}

fn row_to_split(row: &sqlx::sqlite::SqliteRow) -> Result<Split> {
    Ok(Split {
        participant_id: parse_id(row, "participant_id")?,
        amount_cents: row.get("amount_cents"),
    })
}

fn row_to_payment(row: &sqlx::sqlite::SqliteRow) -> Result<Payment> {
    Ok(Payment {
        id: parse_id(row, "id")?,
        trip_id: parse_id(row, "trip_id")?,
        from_participant: parse_id(row, "from_participant_id")?,
        to_participant: parse_id(row, "to_participant_id")?,
        amount_cents: row.get("amount_cents"),
        created_at: parse_timestamp(row, "created_at")?,
    })
}

fn parse_id(row: &sqlx::sqlite::SqliteRow, column: &str) -> Result<Uuid> {
    let value: String = row.get(column);
    Uuid::parse_str(&value).with_context(|| format!("Invalid {} UUID: {}", column, value))
}

fn parse_timestamp(row: &sqlx::sqlite::SqliteRow, column: &str) -> Result<DateTime<Utc>> {
    let value: String = row.get(column);
    Ok(DateTime::parse_from_rfc3339(&value)
        .with_context(|| format!("Invalid {} timestamp: {}", column, value))?
        .with_timezone(&Utc))
}

/// Whether a storage error was caused by a `UNIQUE` constraint, e.g. two
/// writers inserting the same trip or participant name at once.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.downcast_ref::<sqlx::Error>()
        .and_then(|e| e.as_database_error())
        .is_some_and(|db| db.is_unique_violation())
}
