mod common;

use anyhow::Result;
use common::{Trip, test_service};
use divvy::domain::Balance;
use divvy::io::{Exporter, GroupExport};
use uuid::Uuid;

#[tokio::test]
async fn test_export_balances_csv() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let trip = Trip::create(&service).await?;

    trip.expense(&service, &trip.alice, 3000, trip.everyone())
        .await?;

    let mut buffer = Vec::new();
    let count = Exporter::new(&service)
        .export_balances_csv(trip.group.id, &mut buffer)
        .await?;
    assert_eq!(count, 3);

    let csv = String::from_utf8(buffer)?;
    let lines: Vec<_> = csv.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].starts_with("user_id,name,email,total_paid"));
    assert!(lines[1].contains("Alice,alice@example.com,30.00,10.00,0.00,0.00,20.00"));
    assert!(lines[2].ends_with("-10.00"));

    Ok(())
}

#[tokio::test]
async fn test_export_balances_json() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let trip = Trip::create(&service).await?;

    trip.expense(&service, &trip.bob, 900, trip.everyone())
        .await?;

    let mut buffer = Vec::new();
    let exported = Exporter::new(&service)
        .export_balances_json(trip.group.id, &mut buffer)
        .await?;

    let parsed: Vec<Balance> = serde_json::from_slice(&buffer)?;
    assert_eq!(parsed, exported);
    assert_eq!(parsed[1].user_name, "Bob");
    assert_eq!(parsed[1].net_balance, 600);

    Ok(())
}

#[tokio::test]
async fn test_export_expenses_csv_one_row_per_share() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let trip = Trip::create(&service).await?;

    trip.expense(&service, &trip.alice, 3000, trip.everyone())
        .await?;
    trip.expense(&service, &trip.carol, 1000, vec![trip.bob.id, trip.carol.id])
        .await?;

    let mut buffer = Vec::new();
    let count = Exporter::new(&service)
        .export_expenses_csv(trip.group.id, &mut buffer)
        .await?;
    assert_eq!(count, 5);

    let csv = String::from_utf8(buffer)?;
    assert_eq!(csv.lines().count(), 6);
    assert!(csv.contains("carol@example.com,10.00,bob@example.com,5.00"));

    Ok(())
}

#[tokio::test]
async fn test_export_full_json() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let trip = Trip::create(&service).await?;

    trip.expense(&service, &trip.alice, 3000, trip.everyone())
        .await?;
    service
        .record_settlement(trip.group.id, trip.bob.id, trip.alice.id, 1000)
        .await?;

    let mut buffer = Vec::new();
    let export = Exporter::new(&service)
        .export_full_json(trip.group.id, &mut buffer)
        .await?;

    assert_eq!(export.members.len(), 3);
    assert_eq!(export.expenses.len(), 1);
    assert_eq!(export.shares.len(), 3);
    assert_eq!(export.settlements.len(), 1);
    assert_eq!(export.balances, service.get_group_balances(trip.group.id).await?);

    let parsed: GroupExport = serde_json::from_slice(&buffer)?;
    assert_eq!(parsed.group.id, trip.group.id);
    assert_eq!(parsed.balances, export.balances);

    Ok(())
}

#[tokio::test]
async fn test_export_full_json_unknown_group() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let mut buffer = Vec::new();
    let result = Exporter::new(&service)
        .export_full_json(Uuid::new_v4(), &mut buffer)
        .await;
    assert!(result.is_err());
    assert!(buffer.is_empty());

    Ok(())
}
