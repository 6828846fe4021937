use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::application::{
    ExpenseDetails, ExpenseUpdate, NewExpense, PaymentDetails, SplitRequest, TripService,
};
use crate::domain::{
    Balance, Cents, SimplifiedDebt, UNKNOWN_PARTICIPANT, format_cents, parse_cents, parse_percent,
    total_net,
};

/// Tripsplit - shared expenses for trips
#[derive(Parser)]
#[command(name = "tripsplit")]
#[command(about = "Track shared trip expenses and work out who owes whom")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, env = "TRIPSPLIT_DATABASE", default_value = "tripsplit.db")]
    pub database: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Trip management commands
    #[command(subcommand)]
    Trip(TripCommands),

    /// Participant management commands
    #[command(subcommand)]
    Participant(ParticipantCommands),

    /// Expense management commands
    #[command(subcommand)]
    Expense(ExpenseCommands),

    /// Payment management commands
    #[command(subcommand)]
    Payment(PaymentCommands),

    /// Show where every participant stands
    Balances {
        /// Trip name
        #[arg(short, long)]
        trip: String,

        /// Output format: table, json
        #[arg(long, default_value = "table", value_parser = ["table", "json"])]
        format: String,
    },

    /// Show the payments that would settle a trip
    Settle {
        /// Trip name
        #[arg(short, long)]
        trip: String,

        /// Output format: table, json
        #[arg(long, default_value = "table", value_parser = ["table", "json"])]
        format: String,

        /// Record the payments instead of only listing them
        #[arg(long)]
        record: bool,
    },

    /// Export a trip to CSV or JSON
    Export {
        /// What to export: full, expenses, payments, balances, debts
        export_type: String,

        /// Trip name
        #[arg(short, long)]
        trip: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Verify the stored data of a trip
    Check {
        /// Trip name
        #[arg(short, long)]
        trip: String,
    },
}

#[derive(Subcommand)]
pub enum TripCommands {
    /// Create a new trip
    Create {
        /// Trip name (must be unique)
        name: String,
    },

    /// List all trips
    List,

    /// Show trip details
    Show {
        /// Trip name
        name: String,
    },

    /// Rename a trip
    Rename {
        /// Current name
        name: String,

        /// New name
        new_name: String,
    },

    /// Delete a trip and everything in it
    Delete {
        /// Trip name
        name: String,
    },
}

#[derive(Subcommand)]
pub enum ParticipantCommands {
    /// Add a participant to a trip
    Add {
        /// Participant name (unique within the trip)
        name: String,

        /// Trip name
        #[arg(short, long)]
        trip: String,
    },

    /// List participants of a trip
    List {
        /// Trip name
        #[arg(short, long)]
        trip: String,
    },

    /// Remove a participant (their expenses and payments are kept)
    Remove {
        /// Participant name
        name: String,

        /// Trip name
        #[arg(short, long)]
        trip: String,
    },
}

#[derive(Subcommand)]
pub enum ExpenseCommands {
    /// Record an expense
    Add {
        /// What the money was spent on
        description: String,

        /// Amount (e.g., "50.00" or "50")
        amount: String,

        /// Trip name
        #[arg(short, long)]
        trip: String,

        /// Who paid
        #[arg(long)]
        paid_by: String,

        /// Split equally among these participants (default: everyone)
        #[arg(long, value_delimiter = ',', conflicts_with_all = ["split", "percent"])]
        among: Vec<String>,

        /// Exact share, repeatable: NAME=AMOUNT
        #[arg(long, conflicts_with = "percent")]
        split: Vec<String>,

        /// Percentage share, repeatable: NAME=PERCENT
        #[arg(long)]
        percent: Vec<String>,

        /// Date of the expense (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,
    },

    /// List expenses of a trip
    List {
        /// Trip name
        #[arg(short, long)]
        trip: String,

        /// Show how each expense is split
        #[arg(long)]
        splits: bool,
    },

    /// Edit an expense
    Edit {
        /// Expense ID
        id: String,

        /// Trip name
        #[arg(short, long)]
        trip: String,

        /// New description
        #[arg(long)]
        description: Option<String>,

        /// New amount
        #[arg(long)]
        amount: Option<String>,

        /// New payer
        #[arg(long)]
        paid_by: Option<String>,

        /// Re-split equally among these participants
        #[arg(long, value_delimiter = ',', conflicts_with_all = ["split", "percent", "equal"])]
        among: Vec<String>,

        /// Re-split equally among everyone
        #[arg(long, conflicts_with_all = ["split", "percent"])]
        equal: bool,

        /// Exact share, repeatable: NAME=AMOUNT
        #[arg(long, conflicts_with = "percent")]
        split: Vec<String>,

        /// Percentage share, repeatable: NAME=PERCENT
        #[arg(long)]
        percent: Vec<String>,

        /// New date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,
    },

    /// Delete an expense
    Delete {
        /// Expense ID
        id: String,

        /// Trip name
        #[arg(short, long)]
        trip: String,
    },
}

#[derive(Subcommand)]
pub enum PaymentCommands {
    /// Record a payment between two participants
    Add {
        /// Amount (e.g., "50.00" or "50")
        amount: String,

        /// Trip name
        #[arg(short, long)]
        trip: String,

        /// Who paid
        #[arg(long)]
        from: String,

        /// Who received the money
        #[arg(long)]
        to: String,
    },

    /// List payments of a trip
    List {
        /// Trip name
        #[arg(short, long)]
        trip: String,
    },

    /// Change the amount of a payment
    Edit {
        /// Payment ID
        id: String,

        /// New amount
        amount: String,

        /// Trip name
        #[arg(short, long)]
        trip: String,
    },

    /// Delete a payment
    Delete {
        /// Payment ID
        id: String,

        /// Trip name
        #[arg(short, long)]
        trip: String,
    },
}

/// Set up logging to stderr. `RUST_LOG` wins over `--verbose`.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "warn,tripsplit=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Init => {
                TripService::init(&self.database).await?;
                println!("Database initialized: {}", self.database);
            }

            Commands::Trip(trip_cmd) => {
                let service = TripService::connect(&self.database).await?;
                run_trip_command(&service, trip_cmd).await?;
            }

            Commands::Participant(participant_cmd) => {
                let service = TripService::connect(&self.database).await?;
                run_participant_command(&service, participant_cmd).await?;
            }

            Commands::Expense(expense_cmd) => {
                let service = TripService::connect(&self.database).await?;
                run_expense_command(&service, expense_cmd).await?;
            }

            Commands::Payment(payment_cmd) => {
                let service = TripService::connect(&self.database).await?;
                run_payment_command(&service, payment_cmd).await?;
            }

            Commands::Balances { trip, format } => {
                let service = TripService::connect(&self.database).await?;
                let balances = service.balances(&trip).await?;
                match format.as_str() {
                    "json" => println!("{}", serde_json::to_string_pretty(&balances)?),
                    _ => print_balances(&balances),
                }
            }

            Commands::Settle {
                trip,
                format,
                record,
            } => {
                let service = TripService::connect(&self.database).await?;
                run_settle_command(&service, &trip, &format, record).await?;
            }

            Commands::Export {
                export_type,
                trip,
                output,
            } => {
                let service = TripService::connect(&self.database).await?;
                run_export_command(&service, &export_type, &trip, output.as_deref()).await?;
            }

            Commands::Check { trip } => {
                let service = TripService::connect(&self.database).await?;
                run_check_command(&service, &trip).await?;
            }
        }

        Ok(())
    }
}

async fn run_trip_command(service: &TripService, cmd: TripCommands) -> Result<()> {
    match cmd {
        TripCommands::Create { name } => {
            let trip = service.create_trip(&name).await?;
            println!("Created trip: {}", trip.name);
        }

        TripCommands::List => {
            let trips = service.list_trips().await?;
            if trips.is_empty() {
                println!("No trips found.");
            } else {
                println!("{:<30} {:<12}", "NAME", "CREATED");
                println!("{}", "-".repeat(44));
                for trip in trips {
                    println!(
                        "{:<30} {:<12}",
                        truncate(&trip.name, 30),
                        trip.created_at.format("%Y-%m-%d")
                    );
                }
            }
        }

        TripCommands::Show { name } => {
            let snapshot = service.snapshot(&name).await?;
            let trip = &snapshot.trip;
            let total_spent: Cents = snapshot
                .expenses
                .iter()
                .map(|e| e.expense.amount_cents)
                .sum();

            println!("Trip: {}", trip.name);
            println!("  ID:           {}", trip.id);
            println!(
                "  Created:      {}",
                trip.created_at.format("%Y-%m-%d %H:%M:%S")
            );
            println!("  Participants: {}", snapshot.participants.len());
            println!("  Expenses:     {}", snapshot.expenses.len());
            println!("  Total spent:  {}", format_cents(total_spent));
            println!("  Payments:     {}", snapshot.payments.len());
            println!(
                "  Open debts:   {}",
                if snapshot.debts.is_empty() {
                    "none".to_string()
                } else {
                    snapshot.debts.len().to_string()
                }
            );
        }

        TripCommands::Rename { name, new_name } => {
            let trip = service.rename_trip(&name, &new_name).await?;
            println!("Renamed trip: {} -> {}", name, trip.name);
        }

        TripCommands::Delete { name } => {
            let trip = service.delete_trip(&name).await?;
            println!("Deleted trip: {}", trip.name);
        }
    }
    Ok(())
}

async fn run_participant_command(service: &TripService, cmd: ParticipantCommands) -> Result<()> {
    match cmd {
        ParticipantCommands::Add { name, trip } => {
            let participant = service.add_participant(&trip, &name).await?;
            println!("Added participant: {} ({})", participant.name, trip);
        }

        ParticipantCommands::List { trip } => {
            let participants = service.list_participants(&trip).await?;
            if participants.is_empty() {
                println!("No participants found.");
            } else {
                for participant in participants {
                    println!("{}", participant.name);
                }
            }
        }

        ParticipantCommands::Remove { name, trip } => {
            let removed = service.remove_participant(&trip, &name).await?;
            println!("Removed participant: {}", removed.participant.name);
            if removed.is_referenced() {
                println!(
                    "  Still referenced by {} expense(s) and {} payment(s); shown as \"{}\"",
                    removed.expense_refs, removed.payment_refs, UNKNOWN_PARTICIPANT
                );
            }
        }
    }
    Ok(())
}

async fn run_expense_command(service: &TripService, cmd: ExpenseCommands) -> Result<()> {
    match cmd {
        ExpenseCommands::Add {
            description,
            amount,
            trip,
            paid_by,
            among,
            split,
            percent,
            date,
        } => {
            let amount_cents =
                parse_cents(&amount).context("Invalid amount format. Use '50.00' or '50'")?;
            let split = split_request(among, split, percent)?.unwrap_or(SplitRequest::Equal(vec![]));
            let expense_date = date.as_deref().map(parse_date).transpose()?;

            let details = service
                .record_expense(
                    &trip,
                    NewExpense {
                        description,
                        amount_cents,
                        payer: paid_by,
                        split,
                        expense_date,
                    },
                )
                .await?;

            println!(
                "Recorded expense: {} {} paid by {} ({})",
                details.expense.description,
                format_cents(details.expense.amount_cents),
                details.payer_name,
                details.expense.id
            );
            print_splits(&details);
        }

        ExpenseCommands::List { trip, splits } => {
            let expenses = service.list_expenses(&trip).await?;
            if expenses.is_empty() {
                println!("No expenses found.");
            } else {
                println!(
                    "{:<12} {:>10} {:<15} {:<30} ID",
                    "DATE", "AMOUNT", "PAID BY", "DESCRIPTION"
                );
                println!("{}", "-".repeat(106));
                for details in &expenses {
                    let expense = &details.expense;
                    let date = expense.expense_date.unwrap_or(expense.created_at);
                    println!(
                        "{:<12} {:>10} {:<15} {:<30} {}",
                        date.format("%Y-%m-%d"),
                        format_cents(expense.amount_cents),
                        truncate(&details.payer_name, 15),
                        truncate(&expense.description, 30),
                        expense.id
                    );
                    if splits {
                        print_splits(details);
                    }
                }
            }
        }

        ExpenseCommands::Edit {
            id,
            trip,
            description,
            amount,
            paid_by,
            among,
            equal,
            split,
            percent,
            date,
        } => {
            let expense_id = parse_id(&id, "expense")?;
            let amount_cents = amount
                .map(|a| parse_cents(&a))
                .transpose()
                .context("Invalid amount format. Use '50.00' or '50'")?;
            let split = match split_request(among, split, percent)? {
                None if equal => Some(SplitRequest::Equal(vec![])),
                other => other,
            };
            let expense_date = date.as_deref().map(parse_date).transpose()?;

            let details = service
                .update_expense(
                    &trip,
                    expense_id,
                    ExpenseUpdate {
                        description,
                        amount_cents,
                        payer: paid_by,
                        split,
                        expense_date,
                    },
                )
                .await?;

            println!(
                "Updated expense: {} {} paid by {}",
                details.expense.description,
                format_cents(details.expense.amount_cents),
                details.payer_name
            );
            print_splits(&details);
        }

        ExpenseCommands::Delete { id, trip } => {
            let expense_id = parse_id(&id, "expense")?;
            let expense = service.delete_expense(&trip, expense_id).await?;
            println!(
                "Deleted expense: {} {}",
                expense.description,
                format_cents(expense.amount_cents)
            );
        }
    }
    Ok(())
}

async fn run_payment_command(service: &TripService, cmd: PaymentCommands) -> Result<()> {
    match cmd {
        PaymentCommands::Add {
            amount,
            trip,
            from,
            to,
        } => {
            let amount_cents =
                parse_cents(&amount).context("Invalid amount format. Use '50.00' or '50'")?;
            let details = service.record_payment(&trip, &from, &to, amount_cents).await?;
            println!(
                "Recorded payment: {} {} -> {} ({})",
                format_cents(details.payment.amount_cents),
                details.from_name,
                details.to_name,
                details.payment.id
            );
        }

        PaymentCommands::List { trip } => {
            let payments = service.list_payments(&trip).await?;
            if payments.is_empty() {
                println!("No payments found.");
            } else {
                print_payments(&payments);
            }
        }

        PaymentCommands::Edit { id, amount, trip } => {
            let payment_id = parse_id(&id, "payment")?;
            let amount_cents =
                parse_cents(&amount).context("Invalid amount format. Use '50.00' or '50'")?;
            let details = service
                .update_payment(&trip, payment_id, amount_cents)
                .await?;
            println!(
                "Updated payment: {} {} -> {}",
                format_cents(details.payment.amount_cents),
                details.from_name,
                details.to_name
            );
        }

        PaymentCommands::Delete { id, trip } => {
            let payment_id = parse_id(&id, "payment")?;
            let payment = service.delete_payment(&trip, payment_id).await?;
            println!(
                "Deleted payment: {} ({})",
                format_cents(payment.amount_cents),
                payment.id
            );
        }
    }
    Ok(())
}

async fn run_settle_command(
    service: &TripService,
    trip: &str,
    format: &str,
    record: bool,
) -> Result<()> {
    if record {
        let payments = service.settle_up(trip).await?;
        if payments.is_empty() {
            println!("Everyone is settled up.");
        } else {
            println!("Recorded {} payments:", payments.len());
            print_payments(&payments);
        }
        return Ok(());
    }

    let debts = service.simplified_debts(trip).await?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&debts)?),
        _ => print_debts(&debts),
    }
    Ok(())
}

async fn run_export_command(
    service: &TripService,
    export_type: &str,
    trip: &str,
    output: Option<&str>,
) -> Result<()> {
    use crate::io::Exporter;
    use std::fs::File;
    use std::io::{Write, stdout};

    let exporter = Exporter::new(service);

    let writer: Box<dyn Write> = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path))?;
            Box::new(file)
        }
        None => Box::new(stdout()),
    };

    match export_type {
        "expenses" => {
            let count = exporter.export_expenses_csv(trip, writer).await?;
            if output.is_some() {
                eprintln!("Exported {} expenses", count);
            }
        }
        "payments" => {
            let count = exporter.export_payments_csv(trip, writer).await?;
            if output.is_some() {
                eprintln!("Exported {} payments", count);
            }
        }
        "balances" => {
            let count = exporter.export_balances_csv(trip, writer).await?;
            if output.is_some() {
                eprintln!("Exported {} balances", count);
            }
        }
        "debts" => {
            let count = exporter.export_debts_csv(trip, writer).await?;
            if output.is_some() {
                eprintln!("Exported {} debts", count);
            }
        }
        "full" => {
            let export = exporter.export_full_json(trip, writer).await?;
            if output.is_some() {
                eprintln!(
                    "Exported trip {}: {} participants, {} expenses, {} payments",
                    export.trip.name,
                    export.participants.len(),
                    export.expenses.len(),
                    export.payments.len()
                );
            }
        }
        _ => {
            anyhow::bail!(
                "Invalid export type '{}'. Valid types: full, expenses, payments, balances, debts",
                export_type
            );
        }
    }

    Ok(())
}

async fn run_check_command(service: &TripService, trip: &str) -> Result<()> {
    println!("Checking trip {}...\n", trip);

    let report = service.check_integrity(trip).await?;

    println!("Participants: {}", report.participant_count);
    println!("Expenses:     {}", report.expense_count);
    println!("Payments:     {}", report.payment_count);
    let balanced = report.total_net == report.split_drift;
    println!(
        "Net total:    {}  {}",
        format_cents(report.total_net),
        if balanced { "OK" } else { "UNBALANCED!" }
    );
    if report.split_drift != 0 {
        println!("Split drift:  {}", format_cents(report.split_drift));
    }
    println!();

    if report.is_healthy() {
        println!("Trip data is consistent.");
    } else {
        println!("Issues found:");
        for issue in &report.issues {
            println!("  - {}", issue);
        }
        anyhow::bail!("Trip integrity check failed");
    }

    Ok(())
}

fn print_balances(balances: &[Balance]) {
    if balances.is_empty() {
        println!("No participants found.");
        return;
    }

    println!(
        "{:<20} {:>12} {:>12} {:>12}",
        "PARTICIPANT", "PAID", "OWES", "NET"
    );
    println!("{}", "-".repeat(59));
    for balance in balances {
        println!(
            "{:<20} {:>12} {:>12} {:>12}",
            truncate(&balance.participant_name, 20),
            format_cents(balance.paid),
            format_cents(balance.owes),
            format_cents(balance.net)
        );
    }
    println!("{}", "-".repeat(59));
    println!("{:<20} {:>38}", "TOTAL", format_cents(total_net(balances)));
}

fn print_debts(debts: &[SimplifiedDebt]) {
    if debts.is_empty() {
        println!("Everyone is settled up.");
        return;
    }

    println!("{:<20} {:<20} {:>12}", "FROM", "TO", "AMOUNT");
    println!("{}", "-".repeat(54));
    for debt in debts {
        println!(
            "{:<20} {:<20} {:>12}",
            truncate(&debt.from_participant_name, 20),
            truncate(&debt.to_participant_name, 20),
            format_cents(debt.amount)
        );
    }
}

fn print_payments(payments: &[PaymentDetails]) {
    println!(
        "{:<12} {:>10} {:<15} {:<15} ID",
        "DATE", "AMOUNT", "FROM", "TO"
    );
    println!("{}", "-".repeat(91));
    for details in payments {
        println!(
            "{:<12} {:>10} {:<15} {:<15} {}",
            details.payment.created_at.format("%Y-%m-%d"),
            format_cents(details.payment.amount_cents),
            truncate(&details.from_name, 15),
            truncate(&details.to_name, 15),
            details.payment.id
        );
    }
}

fn print_splits(details: &ExpenseDetails) {
    for split in &details.splits {
        println!(
            "    {:<20} {:>10}",
            truncate(&split.participant_name, 20),
            format_cents(split.amount_cents)
        );
    }
}

/// Turn the mutually exclusive split flags into a request. `None` when no
/// split flag was given.
fn split_request(
    among: Vec<String>,
    split: Vec<String>,
    percent: Vec<String>,
) -> Result<Option<SplitRequest>> {
    if !split.is_empty() {
        let shares = split
            .iter()
            .map(|arg| {
                let (name, value) = parse_assignment(arg)?;
                let cents = parse_cents(value)
                    .with_context(|| format!("Invalid amount in --split '{}'", arg))?;
                Ok((name, cents))
            })
            .collect::<Result<Vec<_>>>()?;
        return Ok(Some(SplitRequest::Exact(shares)));
    }

    if !percent.is_empty() {
        let shares = percent
            .iter()
            .map(|arg| {
                let (name, value) = parse_assignment(arg)?;
                let bp = parse_percent(value)
                    .with_context(|| format!("Invalid percentage in --percent '{}'", arg))?;
                Ok((name, bp))
            })
            .collect::<Result<Vec<_>>>()?;
        return Ok(Some(SplitRequest::Percentage(shares)));
    }

    if !among.is_empty() {
        return Ok(Some(SplitRequest::Equal(among)));
    }

    Ok(None)
}

fn parse_assignment(arg: &str) -> Result<(String, &str)> {
    match arg.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => Ok((name.trim().to_string(), value.trim())),
        _ => anyhow::bail!("Expected NAME=VALUE, got '{}'", arg),
    }
}

fn parse_id(id: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(id).with_context(|| format!("Invalid {} ID format (expected UUID)", what))
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{}...", kept)
    }
}

fn parse_date(date_str: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    use chrono::NaiveDate;

    let naive_date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .with_context(|| format!("Invalid date format '{}'. Use YYYY-MM-DD", date_str))?;

    let naive_datetime = naive_date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow::anyhow!("Invalid date"))?;

    Ok(chrono::DateTime::from_naive_utc_and_offset(
        naive_datetime,
        chrono::Utc,
    ))
}
