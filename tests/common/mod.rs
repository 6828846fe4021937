// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use tempfile::TempDir;
use tripsplit::application::{NewExpense, SplitRequest, TripService};
use tripsplit::domain::{Balance, Cents};

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(TripService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = TripService::init(db_path.to_str().unwrap()).await?;
    Ok((service, temp_dir))
}

/// Helper to parse a date string into DateTime<Utc>
pub fn parse_date(date_str: &str) -> DateTime<Utc> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc()
}

/// Net balances in participant order.
pub fn nets(balances: &[Balance]) -> Vec<Cents> {
    balances.iter().map(|b| b.net).collect()
}

/// Test fixture: a trip with Alice, Bob and Charlie
pub struct Crew;

impl Crew {
    pub const TRIP: &'static str = "Lisbon";

    /// Create the trip and its three participants
    pub async fn create(service: &TripService) -> Result<()> {
        service.create_trip(Self::TRIP).await?;
        for name in ["Alice", "Bob", "Charlie"] {
            service.add_participant(Self::TRIP, name).await?;
        }
        Ok(())
    }

    /// Record an expense split equally among everyone
    pub async fn shared_expense(
        service: &TripService,
        description: &str,
        payer: &str,
        amount_cents: Cents,
    ) -> Result<()> {
        service
            .record_expense(
                Self::TRIP,
                NewExpense {
                    description: description.to_string(),
                    amount_cents,
                    payer: payer.to_string(),
                    split: SplitRequest::Equal(vec![]),
                    expense_date: None,
                },
            )
            .await?;
        Ok(())
    }

    /// Scenario: Alice pays 75.00 for dinner, split three ways
    pub async fn dinner(service: &TripService) -> Result<()> {
        Self::shared_expense(service, "Dinner", "Alice", 7500).await
    }
}
