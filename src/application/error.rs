use thiserror::Error;

use crate::domain::SplitError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Trip not found: {0}")]
    TripNotFound(String),

    #[error("Trip already exists: {0}")]
    TripAlreadyExists(String),

    #[error("Participant not found in trip: {0}")]
    ParticipantNotFound(String),

    #[error("Participant already exists in trip: {0}")]
    ParticipantAlreadyExists(String),

    #[error("Expense not found: {0}")]
    ExpenseNotFound(String),

    #[error("Payment not found: {0}")]
    PaymentNotFound(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid split: {0}")]
    InvalidSplit(#[from] SplitError),

    #[error("Cannot record a payment from {0} to themselves")]
    SelfPayment(String),

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}
