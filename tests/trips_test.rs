mod common;

use anyhow::Result;
use common::{Crew, test_service};
use tripsplit::application::AppError;
use tripsplit::domain::Trip;
use tripsplit::storage::{Repository, is_unique_violation};

#[tokio::test]
async fn test_create_and_list_trips() -> Result<()> {
    let (service, _temp) = test_service().await?;

    service.create_trip("Lisbon").await?;
    service.create_trip("  Porto  ").await?;

    let trips = service.list_trips().await?;
    let mut names: Vec<&str> = trips.iter().map(|t| t.name.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["Lisbon", "Porto"]);

    // names are trimmed on the way in and on lookup
    assert_eq!(service.get_trip(" Porto").await?.name, "Porto");

    Ok(())
}

#[tokio::test]
async fn test_trip_names_are_unique_and_required() -> Result<()> {
    let (service, _temp) = test_service().await?;
    service.create_trip("Lisbon").await?;

    let result = service.create_trip("Lisbon").await;
    assert!(matches!(result, Err(AppError::TripAlreadyExists(_))));

    let result = service.create_trip("   ").await;
    assert!(matches!(result, Err(AppError::InvalidInput(_))));

    let result = service.get_trip("Nowhere").await;
    assert!(matches!(result, Err(AppError::TripNotFound(_))));

    Ok(())
}

#[tokio::test]
async fn test_rename_trip() -> Result<()> {
    let (service, _temp) = test_service().await?;
    service.create_trip("Lisbon").await?;
    service.create_trip("Porto").await?;

    let renamed = service.rename_trip("Lisbon", "Lisbon 2024").await?;
    assert_eq!(renamed.name, "Lisbon 2024");
    assert!(service.get_trip("Lisbon").await.is_err());
    assert!(service.get_trip("Lisbon 2024").await.is_ok());

    let result = service.rename_trip("Lisbon 2024", "Porto").await;
    assert!(matches!(result, Err(AppError::TripAlreadyExists(_))));

    Ok(())
}

#[tokio::test]
async fn test_delete_trip_removes_everything() -> Result<()> {
    let (service, _temp) = test_service().await?;
    Crew::create(&service).await?;
    Crew::dinner(&service).await?;
    service
        .record_payment(Crew::TRIP, "Bob", "Alice", 1000)
        .await?;

    service.delete_trip(Crew::TRIP).await?;
    assert!(service.list_trips().await?.is_empty());

    // a new trip with the same name starts empty
    Crew::create(&service).await?;
    assert!(service.list_expenses(Crew::TRIP).await?.is_empty());
    assert!(service.list_payments(Crew::TRIP).await?.is_empty());
    assert_eq!(service.list_participants(Crew::TRIP).await?.len(), 3);

    Ok(())
}

#[tokio::test]
async fn test_participants_keep_join_order() -> Result<()> {
    let (service, _temp) = test_service().await?;
    service.create_trip("Lisbon").await?;
    for name in ["Zoe", "alice", "Bob"] {
        service.add_participant("Lisbon", name).await?;
    }

    let names: Vec<String> = service
        .list_participants("Lisbon")
        .await?
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert_eq!(names, vec!["Zoe", "alice", "Bob"]);

    Ok(())
}

#[tokio::test]
async fn test_participant_names_unique_per_trip() -> Result<()> {
    let (service, _temp) = test_service().await?;
    service.create_trip("Lisbon").await?;
    service.create_trip("Porto").await?;

    service.add_participant("Lisbon", "Alice").await?;
    let result = service.add_participant("Lisbon", " Alice ").await;
    assert!(matches!(result, Err(AppError::ParticipantAlreadyExists(_))));

    // same name in another trip is fine
    service.add_participant("Porto", "Alice").await?;

    let result = service.add_participant("Lisbon", "").await;
    assert!(matches!(result, Err(AppError::InvalidInput(_))));

    Ok(())
}

#[tokio::test]
async fn test_remove_participant() -> Result<()> {
    let (service, _temp) = test_service().await?;
    Crew::create(&service).await?;

    let removed = service.remove_participant(Crew::TRIP, "Bob").await?;
    assert_eq!(removed.participant.name, "Bob");
    assert!(!removed.is_referenced());

    let names: Vec<String> = service
        .list_participants(Crew::TRIP)
        .await?
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert_eq!(names, vec!["Alice", "Charlie"]);

    let result = service.remove_participant(Crew::TRIP, "Bob").await;
    assert!(matches!(result, Err(AppError::ParticipantNotFound(_))));

    Ok(())
}

#[tokio::test]
async fn test_concurrent_creates_report_conflict() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let (first, second) = tokio::join!(service.create_trip("Oslo"), service.create_trip("Oslo"));
    let results = [first, second];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        results
            .iter()
            .any(|r| matches!(r, Err(AppError::TripAlreadyExists(name)) if name == "Oslo"))
    );

    let (first, second) = tokio::join!(
        service.add_participant("Oslo", "Alice"),
        service.add_participant("Oslo", "Alice")
    );
    let results = [first, second];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        results
            .iter()
            .any(|r| matches!(r, Err(AppError::ParticipantAlreadyExists(_))))
    );

    Ok(())
}

#[tokio::test]
async fn test_duplicate_insert_is_a_unique_violation() -> Result<()> {
    let temp = tempfile::TempDir::new()?;
    let url = format!("sqlite:{}?mode=rwc", temp.path().join("test.db").display());
    let repo = Repository::init(&url).await?;

    repo.save_trip(&Trip::new("Oslo")).await?;
    let err = repo
        .save_trip(&Trip::new("Oslo"))
        .await
        .expect_err("names are unique");
    assert!(is_unique_violation(&err));

    Ok(())
}
