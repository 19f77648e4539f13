//! Soft delete integration tests, alone and composed with other decorators.

mod common;

use serde_json::{Map, Value};

use tessera_persistence::backends::sqlite::SqliteHistoryStore;
use tessera_persistence::core::{HistoryStore, RecordStore, SearchStore, StoreContext};
use tessera_persistence::decorators::SoftDeleteStore;
use tessera_persistence::types::{Filter, SortRule};

use common::*;

fn create_store(backend: &tessera_persistence::SqliteBackend) -> SoftDeleteStore<IndexedStore> {
    SoftDeleteStore::new(create_indexed_store(backend))
}

#[tokio::test]
async fn test_soft_deleted_record_is_hidden_but_kept() {
    let backend = create_backend();
    let store = create_store(&backend);
    let ctx = StoreContext::new();

    let x = store.create(&ctx, Widget::new("x", "red")).await.unwrap();
    let y = store.create(&ctx, Widget::new("y", "red")).await.unwrap();

    assert_eq!(store.delete(&ctx, &[x.id]).await.unwrap(), 1);

    assert_eq!(store.list(&ctx, &Filter::new(), &[]).await.unwrap(), vec![y.clone()]);
    assert!(store.get(&ctx, x.id).await.unwrap_err().is_not_found());
    assert!(
        store
            .first(&ctx, &Filter::new().eq("name", "x"), &[])
            .await
            .unwrap_err()
            .is_not_found()
    );

    let raw = store.inner().get(&ctx, x.id).await.unwrap();
    assert!(raw.is_delete);
    assert_eq!(raw.name, "x");
}

#[tokio::test]
async fn test_raw_predicates_skip_deleted() {
    let backend = create_backend();
    let store = create_store(&backend);
    let ctx = StoreContext::new();

    let mut widgets = Vec::new();
    for name in ["apple", "apricot", "banana", "avocado"] {
        widgets.push(store.create(&ctx, Widget::new(name, "green")).await.unwrap());
    }
    store.delete(&ctx, &[widgets[1].id]).await.unwrap();

    let starts_with_a = || Filter::new().matching("json_extract(data, '$.name') LIKE ?", ["a%"]);
    let by_name = [SortRule::asc("name")];

    let listed = store.list(&ctx, &starts_with_a(), &by_name).await.unwrap();
    let names: Vec<_> = listed.iter().map(|w| w.name.as_str()).collect();
    assert_eq!(names, vec!["apple", "avocado"]);

    assert_eq!(store.count(&ctx, &starts_with_a()).await.unwrap(), 2);
    assert_eq!(
        store.first(&ctx, &starts_with_a(), &[SortRule::desc("name")]).await.unwrap().name,
        "avocado"
    );

    let page = store
        .list_page(&ctx, &starts_with_a(), 2, 1, &by_name)
        .await
        .unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.items[0].name, "avocado");

    // Only the live match is flagged; the already-deleted one is not recounted.
    assert_eq!(
        store
            .delete_where(&ctx, &starts_with_a().matching("id <> ?", [widgets[0].id]))
            .await
            .unwrap(),
        1
    );
    assert_eq!(store.count(&ctx, &starts_with_a()).await.unwrap(), 1);
    assert_eq!(store.inner().count(&ctx, &starts_with_a()).await.unwrap(), 3);
}

#[tokio::test]
async fn test_paging_and_grouping_skip_deleted() {
    let backend = create_backend();
    let store = create_store(&backend);
    let ctx = StoreContext::new();

    let mut widgets = Vec::new();
    for (name, color) in [("a", "red"), ("b", "red"), ("c", "blue"), ("d", "blue")] {
        widgets.push(store.create(&ctx, Widget::new(name, color)).await.unwrap());
    }
    store
        .delete_where(&ctx, &Filter::new().eq("name", "b"))
        .await
        .unwrap();

    let page = store
        .list_page(&ctx, &Filter::new(), 1, 2, &[SortRule::asc("name")])
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    let names: Vec<_> = page.items.iter().map(|w| w.name.as_str()).collect();
    assert_eq!(names, vec!["a", "c"]);

    let groups = store
        .count_by_group(&ctx, &Filter::new(), "color")
        .await
        .unwrap();
    assert_eq!(groups["red"], 1);
    assert_eq!(groups["blue"], 2);
}

#[tokio::test]
async fn test_record_without_flag_counts_as_active() {
    let backend = create_backend();
    let store = create_store(&backend);
    let ctx = StoreContext::new();

    let widget = store.create(&ctx, Widget::new("legacy", "red")).await.unwrap();

    // Null out the flag in the stored document.
    let mut changes = Map::new();
    changes.insert("is_delete".to_string(), Value::Null);
    store
        .inner()
        .update_where(&ctx, &Filter::new().eq("id", widget.id), &changes)
        .await
        .unwrap();

    assert_eq!(store.count(&ctx, &Filter::new()).await.unwrap(), 1);
    assert_eq!(store.delete(&ctx, &[widget.id]).await.unwrap(), 1);
    assert_eq!(store.count(&ctx, &Filter::new()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_search_skips_deleted() {
    let backend = create_backend();
    let store = create_store(&backend);
    let ctx = StoreContext::new();

    let a = store.create(&ctx, Widget::new("a", "red")).await.unwrap();
    let b = store.create(&ctx, Widget::new("b", "red")).await.unwrap();
    store.set_labels(&ctx, a.id, &["gear"]).await.unwrap();
    store.set_labels(&ctx, b.id, &["gear"]).await.unwrap();

    store.delete(&ctx, &[a.id]).await.unwrap();

    let hits = store.search(&ctx, "gear", &Filter::new(), &[]).await.unwrap();
    assert_eq!(hits, vec![b.clone()]);
    assert_eq!(store.search_count(&ctx, "gear", &Filter::new()).await.unwrap(), 1);

    let page = store
        .search_by_page(&ctx, "gear", &Filter::new(), 1, 10, &[])
        .await
        .unwrap();
    assert_eq!(page.total, 1);

    // Labels of deleted records are kept.
    assert_eq!(store.labels(&ctx, a.id).await.unwrap(), vec!["gear"]);
}

#[tokio::test]
async fn test_full_stack_shares_one_transaction() {
    let backend = create_backend();
    let store = SoftDeleteStore::new(
        SqliteHistoryStore::<Widget, Revision, _>::new(create_indexed_store(&backend)).unwrap(),
    );
    let ctx = StoreContext::new();

    let widget = store
        .coordinator()
        .run_in_transaction(&ctx, |tx| {
            let store = &store;
            async move {
                let widget = store.create(&tx, Widget::new("gear", "red")).await?;
                store.set_labels(&tx, widget.id, &["gear", "cog"]).await?;
                store
                    .add_history(&tx, widget.id, "alice", Revision::new("created"))
                    .await?;
                Ok(widget)
            }
        })
        .await
        .unwrap();

    assert_eq!(store.search(&ctx, "cog", &Filter::new(), &[]).await.unwrap(), vec![widget.clone()]);
    assert_eq!(store.latest(&ctx, widget.id).await.unwrap().data, Revision::new("created"));

    store.delete(&ctx, &[widget.id]).await.unwrap();
    assert!(store.search(&ctx, "cog", &Filter::new(), &[]).await.unwrap().is_empty());
    // History outlives the soft delete.
    assert_eq!(store.list_history(&ctx, widget.id, 0, 10).await.unwrap().total, 1);
}
