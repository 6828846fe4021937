use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::application::{ExpenseDetails, PaymentDetails, TripService};
use crate::domain::{
    Balance, Cents, ExpenseId, Participant, ParticipantId, PaymentId, SimplifiedDebt, Trip,
    decimal, format_cents,
};

/// Full trip snapshot, including derived balances and debts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripExport {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub trip: Trip,
    pub participants: Vec<Participant>,
    pub expenses: Vec<ExportedExpense>,
    pub payments: Vec<ExportedPayment>,
    pub balances: Vec<Balance>,
    pub simplified_debts: Vec<SimplifiedDebt>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedExpense {
    pub id: ExpenseId,
    pub description: String,
    #[serde(with = "decimal")]
    pub amount: Cents,
    pub paid_by: ParticipantId,
    pub paid_by_name: String,
    pub expense_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub splits: Vec<ExportedSplit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedSplit {
    pub participant_id: ParticipantId,
    pub participant_name: String,
    #[serde(with = "decimal")]
    pub amount: Cents,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedPayment {
    pub id: PaymentId,
    pub from_participant_id: ParticipantId,
    pub from_participant_name: String,
    pub to_participant_id: ParticipantId,
    pub to_participant_name: String,
    #[serde(with = "decimal")]
    pub amount: Cents,
    pub created_at: DateTime<Utc>,
}

impl From<ExpenseDetails> for ExportedExpense {
    fn from(details: ExpenseDetails) -> Self {
        let ExpenseDetails {
            expense,
            payer_name,
            splits,
        } = details;

        Self {
            id: expense.id,
            description: expense.description,
            amount: expense.amount_cents,
            paid_by: expense.paid_by,
            paid_by_name: payer_name,
            expense_date: expense.expense_date,
            created_at: expense.created_at,
            splits: splits
                .into_iter()
                .map(|s| ExportedSplit {
                    participant_id: s.participant_id,
                    participant_name: s.participant_name,
                    amount: s.amount_cents,
                })
                .collect(),
        }
    }
}

impl From<PaymentDetails> for ExportedPayment {
    fn from(details: PaymentDetails) -> Self {
        Self {
            id: details.payment.id,
            from_participant_id: details.payment.from_participant,
            from_participant_name: details.from_name,
            to_participant_id: details.payment.to_participant,
            to_participant_name: details.to_name,
            amount: details.payment.amount_cents,
            created_at: details.payment.created_at,
        }
    }
}

/// Exporter for writing a trip out in various formats
pub struct Exporter<'a> {
    service: &'a TripService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a TripService) -> Self {
        Self { service }
    }

    /// Export a trip's expenses to CSV, one row per split
    pub async fn export_expenses_csv<W: Write>(&self, trip: &str, writer: W) -> Result<usize> {
        let expenses = self.service.list_expenses(trip).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "expense_id",
            "date",
            "description",
            "amount",
            "paid_by",
            "participant",
            "share",
        ])?;

        let mut count = 0;
        for details in &expenses {
            let expense = &details.expense;
            let date = expense.expense_date.unwrap_or(expense.created_at);
            for split in &details.splits {
                csv_writer.write_record([
                    expense.id.to_string(),
                    date.format("%Y-%m-%d").to_string(),
                    expense.description.clone(),
                    format_cents(expense.amount_cents),
                    details.payer_name.clone(),
                    split.participant_name.clone(),
                    format_cents(split.amount_cents),
                ])?;
            }
            count += 1;
        }

        csv_writer.flush()?;
        Ok(count)
    }

    /// Export a trip's payments to CSV
    pub async fn export_payments_csv<W: Write>(&self, trip: &str, writer: W) -> Result<usize> {
        let payments = self.service.list_payments(trip).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["payment_id", "created_at", "from", "to", "amount"])?;

        for details in &payments {
            csv_writer.write_record([
                details.payment.id.to_string(),
                details.payment.created_at.to_rfc3339(),
                details.from_name.clone(),
                details.to_name.clone(),
                format_cents(details.payment.amount_cents),
            ])?;
        }

        csv_writer.flush()?;
        Ok(payments.len())
    }

    /// Export a trip's balances to CSV
    pub async fn export_balances_csv<W: Write>(&self, trip: &str, writer: W) -> Result<usize> {
        let balances = self.service.balances(trip).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["participant", "paid", "owes", "net"])?;

        for balance in &balances {
            csv_writer.write_record([
                balance.participant_name.clone(),
                format_cents(balance.paid),
                format_cents(balance.owes),
                format_cents(balance.net),
            ])?;
        }

        csv_writer.flush()?;
        Ok(balances.len())
    }

    /// Export the simplified debts of a trip to CSV
    pub async fn export_debts_csv<W: Write>(&self, trip: &str, writer: W) -> Result<usize> {
        let debts = self.service.simplified_debts(trip).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["from", "to", "amount"])?;

        for debt in &debts {
            csv_writer.write_record([
                debt.from_participant_name.clone(),
                debt.to_participant_name.clone(),
                format_cents(debt.amount),
            ])?;
        }

        csv_writer.flush()?;
        Ok(debts.len())
    }

    /// Export a whole trip as a JSON snapshot
    pub async fn export_full_json<W: Write>(&self, trip: &str, mut writer: W) -> Result<TripExport> {
        let snapshot = self.service.snapshot(trip).await?;

        let export = TripExport {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            trip: snapshot.trip,
            participants: snapshot.participants,
            expenses: snapshot.expenses.into_iter().map(Into::into).collect(),
            payments: snapshot.payments.into_iter().map(Into::into).collect(),
            balances: snapshot.balances,
            simplified_debts: snapshot.debts,
        };

        let json = serde_json::to_string_pretty(&export)?;
        writer.write_all(json.as_bytes())?;
        writer.flush()?;

        Ok(export)
    }
}
