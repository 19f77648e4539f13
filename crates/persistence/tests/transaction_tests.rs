//! Transaction coordination integration tests.

mod common;

use tessera_persistence::core::{ConnectionProvider, RecordStore, StoreContext, TransactionOptions};
use tessera_persistence::error::{ResourceError, StorageError, TransactionError};
use tessera_persistence::types::Filter;

use common::*;

// ============================================================================
// Commit and Rollback Tests
// ============================================================================

#[tokio::test]
async fn test_commit_on_success() {
    let backend = create_backend();
    let store = create_base_store(&backend);
    let ctx = StoreContext::new();

    let created = store
        .coordinator()
        .run_in_transaction(&ctx, |tx| {
            let store = &store;
            async move {
                assert!(store.coordinator().is_in_transaction(&tx));
                let a = store.create(&tx, Widget::new("a", "red")).await?;
                let b = store.create(&tx, Widget::new("b", "red")).await?;
                Ok(vec![a, b])
            }
        })
        .await
        .unwrap();

    assert!(!store.coordinator().is_in_transaction(&ctx));
    assert_eq!(store.list(&ctx, &Filter::new(), &[]).await.unwrap(), created);
}

#[tokio::test]
async fn test_rollback_returns_original_error() {
    let backend = create_backend();
    let store = create_base_store(&backend);
    let ctx = StoreContext::new();

    let err = store
        .coordinator()
        .run_in_transaction(&ctx, |tx| {
            let store = &store;
            async move {
                store.create(&tx, Widget::new("a", "red")).await?;
                Err::<(), _>(StorageError::from(ResourceError::not_found("widgets", "boom")))
            }
        })
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert!(err.to_string().contains("boom"));
    assert_eq!(store.count(&ctx, &Filter::new()).await.unwrap(), 0);
}

// ============================================================================
// Nesting Tests
// ============================================================================

#[tokio::test]
async fn test_nested_call_joins_outer_transaction() {
    let backend = create_backend();
    let store = create_base_store(&backend);
    let ctx = StoreContext::new();

    let err = store
        .coordinator()
        .run_in_transaction(&ctx, |outer| {
            let store = &store;
            async move {
                let outer_id = outer.transaction().map(|h| h.id());

                let inner_id = store
                    .coordinator()
                    .run_in_transaction(&outer, |inner| async move {
                        store.create(&inner, Widget::new("nested", "red")).await?;
                        Ok(inner.transaction().map(|h| h.id()))
                    })
                    .await?;
                assert_eq!(inner_id, outer_id);

                // The nested call did not commit: the outer one is still open.
                assert!(outer.in_transaction());
                assert_eq!(store.count(&outer, &Filter::new()).await?, 1);

                Err::<(), _>(StorageError::from(ResourceError::not_found("widgets", 0)))
            }
        })
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(store.count(&ctx, &Filter::new()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_nested_error_rolls_back_everything() {
    let backend = create_backend();
    let store = create_base_store(&backend);
    let ctx = StoreContext::new();

    let result: Result<(), _> = store
        .coordinator()
        .run_in_transaction(&ctx, |outer| {
            let store = &store;
            async move {
                store.create(&outer, Widget::new("outer", "red")).await?;
                store
                    .coordinator()
                    .run_in_transaction(&outer, |inner| async move {
                        store.create(&inner, Widget::new("inner", "red")).await?;
                        store.get(&inner, 1000).await?;
                        Ok(())
                    })
                    .await
            }
        })
        .await;

    assert!(result.unwrap_err().is_not_found());
    assert_eq!(store.count(&ctx, &Filter::new()).await.unwrap(), 0);
}

// ============================================================================
// Handle Tests
// ============================================================================

#[tokio::test]
async fn test_ended_transaction_is_rejected() {
    let backend = create_backend();
    let store = create_base_store(&backend);

    let handle = backend.begin(&TransactionOptions::new()).unwrap();
    let tx = StoreContext::new().with_transaction(handle.clone());
    store.create(&tx, Widget::new("kept", "red")).await.unwrap();
    handle.commit().unwrap();

    assert!(!tx.in_transaction());
    let err = store.count(&tx, &Filter::new()).await.unwrap_err();
    assert!(matches!(
        err,
        StorageError::Transaction(TransactionError::InvalidTransaction)
    ));

    let err = store
        .coordinator()
        .run_in_transaction(&tx, |_| async { Ok(()) })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StorageError::Transaction(TransactionError::InvalidTransaction)
    ));
    assert!(matches!(
        handle.commit().unwrap_err(),
        StorageError::Transaction(TransactionError::InvalidTransaction)
    ));

    drop(tx);
    drop(handle);
    assert_eq!(store.count(&StoreContext::new(), &Filter::new()).await.unwrap(), 1);
}

#[tokio::test]
async fn test_abandoned_handle_rolls_back() {
    let backend = create_backend();
    let store = create_base_store(&backend);

    {
        let handle = backend.begin(&TransactionOptions::new()).unwrap();
        let tx = StoreContext::new().with_transaction(handle);
        store.create(&tx, Widget::new("lost", "red")).await.unwrap();
    }

    assert_eq!(store.count(&StoreContext::new(), &Filter::new()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_context_metadata_survives_transaction() {
    let backend = create_backend();
    let store = create_base_store(&backend);
    let ctx = StoreContext::new()
        .with_correlation_id("req-1")
        .with_user_id("alice");

    let (correlation, user) = store
        .coordinator()
        .run_in_transaction(&ctx, |tx| async move {
            Ok((
                tx.correlation_id().map(str::to_string),
                tx.user_id().map(str::to_string),
            ))
        })
        .await
        .unwrap();

    assert_eq!(correlation.as_deref(), Some("req-1"));
    assert_eq!(user.as_deref(), Some("alice"));
}
