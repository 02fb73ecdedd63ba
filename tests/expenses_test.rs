mod common;

use std::collections::HashMap;

use anyhow::Result;
use common::{Trip, test_service};
use divvy::application::{AppError, NewExpense};
use divvy::domain::SplitError;
use uuid::Uuid;

#[tokio::test]
async fn test_equal_split_between_three() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let trip = Trip::create(&service).await?;

    let details = trip
        .expense(&service, &trip.alice, 3000, trip.everyone())
        .await?;

    assert_eq!(details.expense.amount_cents, 3000);
    assert_eq!(details.paid_by.id, trip.alice.id);
    assert_eq!(details.shares.len(), 3);
    assert!(details.shares.iter().all(|p| p.share.share_cents == 1000));
    assert_eq!(details.shares_total(), 3000);

    Ok(())
}

#[tokio::test]
async fn test_equal_split_drops_rounding_residual() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let trip = Trip::create(&service).await?;

    // 10.00 / 3 = 3.333.. rounds to 3.33 each, one cent is not assigned
    let details = trip
        .expense(&service, &trip.bob, 1000, trip.everyone())
        .await?;

    assert!(details.shares.iter().all(|p| p.share.share_cents == 333));
    assert_eq!(details.shares_total(), 999);

    // The stored expense keeps the full amount
    let stored = service.get_expense_by_id(details.expense.id).await?;
    assert_eq!(stored.expense.amount_cents, 1000);
    assert_eq!(stored.shares_total(), 999);

    Ok(())
}

#[tokio::test]
async fn test_custom_split() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let trip = Trip::create(&service).await?;

    let details = trip
        .custom_expense(
            &service,
            &trip.alice,
            5000,
            &[(trip.alice.id, 1000), (trip.bob.id, 1500), (trip.carol.id, 2500)],
        )
        .await?;

    let shares: HashMap<Uuid, i64> = details
        .shares
        .iter()
        .map(|p| (p.user.id, p.share.share_cents))
        .collect();
    assert_eq!(shares[&trip.alice.id], 1000);
    assert_eq!(shares[&trip.bob.id], 1500);
    assert_eq!(shares[&trip.carol.id], 2500);

    Ok(())
}

#[tokio::test]
async fn test_custom_split_within_one_cent_is_accepted() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let trip = Trip::create(&service).await?;

    let details = trip
        .custom_expense(
            &service,
            &trip.alice,
            1000,
            &[(trip.alice.id, 333), (trip.bob.id, 333), (trip.carol.id, 333)],
        )
        .await?;
    assert_eq!(details.shares_total(), 999);

    Ok(())
}

#[tokio::test]
async fn test_custom_split_mismatch_stores_nothing() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let trip = Trip::create(&service).await?;

    let result = trip
        .custom_expense(
            &service,
            &trip.alice,
            5000,
            &[(trip.alice.id, 1000), (trip.bob.id, 1000)],
        )
        .await;

    let err = result.unwrap_err();
    let err = err.downcast_ref::<AppError>().unwrap();
    assert!(matches!(err, AppError::Split(_)));
    assert!(err.is_validation());
    assert!(err.to_string().starts_with("Shares do not sum to amount"));

    // The expense row written before the split failed was rolled back
    assert!(service.get_expenses_by_group(trip.group.id).await?.is_empty());
    let balances = service.get_group_balances(trip.group.id).await?;
    assert!(balances.iter().all(|b| b.net_balance == 0 && b.total_paid == 0));

    Ok(())
}

#[tokio::test]
async fn test_custom_split_missing_participant_owes_nothing() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let trip = Trip::create(&service).await?;

    let details = service
        .create_expense(NewExpense {
            group_id: trip.group.id,
            paid_by: trip.alice.id,
            amount_cents: 2000,
            description: "Taxi".into(),
            participants: trip.everyone(),
            custom_shares: Some(HashMap::from([(trip.bob.id, 2000)])),
        })
        .await?;

    let carol = details
        .shares
        .iter()
        .find(|p| p.user.id == trip.carol.id)
        .unwrap();
    assert_eq!(carol.share.share_cents, 0);
    assert_eq!(details.shares.len(), 3);

    Ok(())
}

#[tokio::test]
async fn test_duplicate_participants_collapse() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let trip = Trip::create(&service).await?;

    let details = trip
        .expense(
            &service,
            &trip.alice,
            1000,
            vec![trip.alice.id, trip.bob.id, trip.bob.id],
        )
        .await?;

    assert_eq!(details.shares.len(), 2);
    assert!(details.shares.iter().all(|p| p.share.share_cents == 500));

    Ok(())
}

#[tokio::test]
async fn test_rejects_non_positive_amount() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let trip = Trip::create(&service).await?;

    for amount in [0, -500] {
        let err = trip
            .expense(&service, &trip.alice, amount, trip.everyone())
            .await
            .unwrap_err();
        let err = err.downcast_ref::<AppError>().unwrap();
        assert!(matches!(err, AppError::InvalidAmount(_)));
    }

    Ok(())
}

#[tokio::test]
async fn test_validation_order() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let trip = Trip::create(&service).await?;
    let outsider = service
        .create_user("Olga".into(), "olga@example.com".into(), None)
        .await?;
    let missing = Uuid::new_v4();

    let request = |group_id, paid_by, participants: Vec<Uuid>| NewExpense {
        group_id,
        paid_by,
        amount_cents: 1200,
        description: "Lunch".into(),
        participants,
        custom_shares: None,
    };

    // Unknown group wins over everything else
    let err = service
        .create_expense(request(missing, missing, vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::GroupNotFound(id) if id == missing));

    // Unknown payer wins over an empty participant list
    let err = service
        .create_expense(request(trip.group.id, missing, vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::UserNotFound(id) if id == missing));

    // Empty participants wins over a non-member payer
    let err = service
        .create_expense(request(trip.group.id, outsider.id, vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NoParticipants));

    // Non-member payer wins over a non-member participant
    let err = service
        .create_expense(request(trip.group.id, outsider.id, vec![outsider.id]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::PayerNotMember(id) if id == outsider.id));

    // The offending participant is named
    let err = service
        .create_expense(request(
            trip.group.id,
            trip.alice.id,
            vec![trip.bob.id, outsider.id],
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ParticipantNotMember(id) if id == outsider.id));
    assert!(err.to_string().contains(&outsider.id.to_string()));

    assert!(service.get_expenses_by_group(trip.group.id).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_list_expenses_newest_first() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let trip = Trip::create(&service).await?;

    let first = trip
        .expense(&service, &trip.alice, 1000, trip.everyone())
        .await?;
    let second = trip
        .expense(&service, &trip.bob, 2000, trip.everyone())
        .await?;

    let expenses = service.get_expenses_by_group(trip.group.id).await?;
    assert_eq!(expenses.len(), 2);
    assert_eq!(expenses[0].expense.id, second.expense.id);
    assert_eq!(expenses[1].expense.id, first.expense.id);
    assert_eq!(expenses[0].paid_by.name, "Bob");

    Ok(())
}

#[tokio::test]
async fn test_expense_participants() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let trip = Trip::create(&service).await?;

    let details = trip
        .expense(&service, &trip.carol, 900, vec![trip.bob.id, trip.carol.id])
        .await?;

    let participants = service.get_expense_participants(details.expense.id).await?;
    assert_eq!(participants.len(), 2);
    assert!(participants.iter().all(|p| p.share.share_cents == 450));

    // Unknown expenses simply have nobody taking part
    let none = service.get_expense_participants(Uuid::new_v4()).await?;
    assert!(none.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_delete_expense_removes_shares() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let trip = Trip::create(&service).await?;

    let details = trip
        .expense(&service, &trip.alice, 3000, trip.everyone())
        .await?;
    service.delete_expense(details.expense.id).await?;

    let err = service
        .get_expense_by_id(details.expense.id)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(
        service
            .get_expense_participants(details.expense.id)
            .await?
            .is_empty()
    );

    // Deleting again reports the missing expense
    let err = service.delete_expense(details.expense.id).await.unwrap_err();
    assert!(matches!(err, AppError::ExpenseNotFound(_)));

    Ok(())
}

#[tokio::test]
async fn test_description_is_validated() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let trip = Trip::create(&service).await?;

    let err = service
        .create_expense(NewExpense {
            group_id: trip.group.id,
            paid_by: trip.alice.id,
            amount_cents: 1000,
            description: "x".repeat(201),
            participants: trip.everyone(),
            custom_shares: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_expenses_all_succeed() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let trip = Trip::create(&service).await?;

    let mut handles = Vec::new();
    for i in 0..8 {
        let service = service.clone();
        let request = NewExpense {
            group_id: trip.group.id,
            paid_by: trip.alice.id,
            amount_cents: 300 * (i + 1),
            description: format!("Round {}", i + 1),
            participants: trip.everyone(),
            custom_shares: None,
        };
        handles.push(tokio::spawn(async move {
            service.create_expense(request).await
        }));
    }

    for handle in handles {
        let details = handle.await??;
        assert_eq!(details.shares.len(), 3);
    }

    let expenses = service.get_expenses_by_group(trip.group.id).await?;
    assert_eq!(expenses.len(), 8);
    assert!(expenses.iter().all(|e| e.shares.len() == 3));

    // 3.00 + 6.00 + ... + 24.00 = 108.00, a third of it each
    let balances = service.get_group_balances(trip.group.id).await?;
    assert_eq!(common::net_of(&balances, &trip.alice), 7200);
    assert_eq!(common::net_of(&balances, &trip.bob), -3600);

    Ok(())
}

#[tokio::test]
async fn test_largest_amount_splits_without_overflow() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let trip = Trip::create(&service).await?;

    let details = trip
        .expense(&service, &trip.alice, i64::MAX, vec![trip.alice.id, trip.bob.id])
        .await?;

    assert_eq!(details.shares.len(), 2);
    assert!(
        details
            .shares
            .iter()
            .all(|p| p.share.share_cents == i64::MAX / 2 + 1)
    );

    Ok(())
}

#[tokio::test]
async fn test_custom_shares_overflowing_total_store_nothing() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let trip = Trip::create(&service).await?;

    let err = trip
        .custom_expense(
            &service,
            &trip.alice,
            1,
            &[(trip.alice.id, i64::MAX), (trip.bob.id, i64::MAX), (trip.carol.id, 2)],
        )
        .await
        .unwrap_err();
    let err = err.downcast_ref::<AppError>().unwrap();
    assert!(matches!(err, AppError::Split(SplitError::AmountTooLarge)));
    assert!(err.is_validation());

    assert!(service.get_expenses_by_group(trip.group.id).await?.is_empty());

    Ok(())
}
