//! Keyword search integration tests.

mod common;

use serde_json::json;

use tessera_persistence::core::{RecordStore, SearchStore, StoreContext};
use tessera_persistence::types::{Filter, SortRule};

use common::*;

async fn create_widgets(store: &IndexedStore, ctx: &StoreContext, names: &[&str]) -> Vec<Widget> {
    let mut created = Vec::new();
    for name in names {
        created.push(store.create(ctx, Widget::new(name, "grey")).await.unwrap());
    }
    created
}

fn ids(widgets: &[Widget]) -> Vec<i64> {
    widgets.iter().map(|w| w.id).collect()
}

// ============================================================================
// Label Tests
// ============================================================================

#[tokio::test]
async fn test_relabel_red_blue() {
    let backend = create_backend();
    let store = create_indexed_store(&backend);
    let ctx = StoreContext::new();

    // Labels may be attached to ids that have no record yet.
    store.set_labels(&ctx, 7, &["red", "blue"]).await.unwrap();
    assert_eq!(store.labels(&ctx, 7).await.unwrap(), vec!["red", "blue"]);

    let widgets = create_widgets(&store, &ctx, &["a", "b", "c", "d", "e", "f", "g"]).await;
    let seven = widgets.iter().find(|w| w.id == 7).unwrap().clone();

    let hits = store.search(&ctx, "red", &Filter::new(), &[]).await.unwrap();
    assert_eq!(hits, vec![seven.clone()]);

    store.set_labels(&ctx, 7, &["blue"]).await.unwrap();
    assert!(store.search(&ctx, "red", &Filter::new(), &[]).await.unwrap().is_empty());
    assert_eq!(
        store.search(&ctx, "blue", &Filter::new(), &[]).await.unwrap(),
        vec![seven]
    );
}

#[tokio::test]
async fn test_empty_labels_clear_index() {
    let backend = create_backend();
    let store = create_indexed_store(&backend);
    let ctx = StoreContext::new();

    let widgets = create_widgets(&store, &ctx, &["a"]).await;
    store.set_labels(&ctx, widgets[0].id, &["red", ""]).await.unwrap();
    assert_eq!(store.labels(&ctx, widgets[0].id).await.unwrap(), vec!["red"]);

    store.set_labels(&ctx, widgets[0].id, &[]).await.unwrap();
    assert!(store.labels(&ctx, widgets[0].id).await.unwrap().is_empty());
    assert_eq!(store.search_count(&ctx, "red", &Filter::new()).await.unwrap(), 0);
}

// ============================================================================
// Search Tests
// ============================================================================

#[tokio::test]
async fn test_keyword_matches_substring() {
    let backend = create_backend();
    let store = create_indexed_store(&backend);
    let ctx = StoreContext::new();

    let widgets = create_widgets(&store, &ctx, &["a", "b", "c"]).await;
    store.set_labels(&ctx, widgets[0].id, &["crimson red"]).await.unwrap();
    store.set_labels(&ctx, widgets[1].id, &["reddish", "red"]).await.unwrap();
    store.set_labels(&ctx, widgets[2].id, &["blue"]).await.unwrap();

    let hits = store
        .search(&ctx, "red", &Filter::new(), &[SortRule::asc("id")])
        .await
        .unwrap();
    assert_eq!(ids(&hits), ids(&widgets[0..2]));
    assert_eq!(store.search_count(&ctx, "red", &Filter::new()).await.unwrap(), 2);
}

#[tokio::test]
async fn test_no_match_returns_nothing() {
    let backend = create_backend();
    let store = create_indexed_store(&backend);
    let ctx = StoreContext::new();

    create_widgets(&store, &ctx, &["a", "b"]).await;

    assert!(store.search(&ctx, "green", &Filter::new(), &[]).await.unwrap().is_empty());
    assert_eq!(store.search_count(&ctx, "green", &Filter::new()).await.unwrap(), 0);

    let page = store
        .search_by_page(&ctx, "green", &Filter::new(), 1, 10, &[])
        .await
        .unwrap();
    assert!(page.is_empty());
    assert_eq!(page.total, 0);
}

#[tokio::test]
async fn test_empty_keyword_matches_all() {
    let backend = create_backend();
    let store = create_indexed_store(&backend);
    let ctx = StoreContext::new();

    create_widgets(&store, &ctx, &["a", "b", "c"]).await;
    assert_eq!(store.search_count(&ctx, "", &Filter::new()).await.unwrap(), 3);
}

#[tokio::test]
async fn test_search_combines_with_filter() {
    let backend = create_backend();
    let store = create_indexed_store(&backend);
    let ctx = StoreContext::new();

    let a = store.create(&ctx, Widget::new("a", "red")).await.unwrap();
    let b = store.create(&ctx, Widget::new("b", "blue")).await.unwrap();
    store.set_labels(&ctx, a.id, &["gear"]).await.unwrap();
    store.set_labels(&ctx, b.id, &["gear"]).await.unwrap();

    let hits = store
        .search(&ctx, "gear", &Filter::new().eq("color", "blue"), &[])
        .await
        .unwrap();
    assert_eq!(hits, vec![b.clone()]);

    // A caller id constraint is intersected with the keyword matches.
    let hits = store
        .search(&ctx, "gear", &Filter::new().any("id", [a.id, 99]), &[])
        .await
        .unwrap();
    assert_eq!(hits, vec![a.clone()]);

    let hits = store
        .search(&ctx, "gear", &Filter::new().eq("id", 99), &[])
        .await
        .unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn test_string_id_constraint_matches_like_list() {
    let backend = create_backend();
    let store = create_indexed_store(&backend);
    let ctx = StoreContext::new();

    let widgets = create_widgets(&store, &ctx, &["a", "b"]).await;
    for widget in &widgets {
        store.set_labels(&ctx, widget.id, &["gear"]).await.unwrap();
    }
    let target = widgets[1].clone();
    let filter = Filter::new().eq("id", target.id.to_string());

    let listed = store.list(&ctx, &filter, &[]).await.unwrap();
    assert_eq!(listed, vec![target.clone()]);
    assert_eq!(store.search(&ctx, "gear", &filter, &[]).await.unwrap(), listed);
    assert_eq!(store.search(&ctx, "", &filter, &[]).await.unwrap(), listed);
    assert_eq!(store.search_count(&ctx, "gear", &filter).await.unwrap(), 1);

    let mixed = Filter::new().any("id", [json!(widgets[0].id.to_string()), json!("x")]);
    assert_eq!(
        ids(&store.search(&ctx, "gear", &mixed, &[]).await.unwrap()),
        vec![widgets[0].id]
    );
}

#[tokio::test]
async fn test_search_by_page_defaults_to_name_order() {
    let backend = create_backend();
    let store = create_indexed_store(&backend);
    let ctx = StoreContext::new();

    let widgets = create_widgets(&store, &ctx, &["delta", "alpha", "echo", "charlie", "bravo"]).await;
    for widget in &widgets {
        store.set_labels(&ctx, widget.id, &["tool"]).await.unwrap();
    }

    let first = store
        .search_by_page(&ctx, "tool", &Filter::new(), 1, 2, &[])
        .await
        .unwrap();
    let names: Vec<_> = first.items.iter().map(|w| w.name.as_str()).collect();
    assert_eq!(names, vec!["alpha", "bravo"]);
    assert_eq!(first.total, 5);

    let last = store
        .search_by_page(&ctx, "tool", &Filter::new(), 3, 2, &[])
        .await
        .unwrap();
    let names: Vec<_> = last.items.iter().map(|w| w.name.as_str()).collect();
    assert_eq!(names, vec!["echo"]);

    let reversed = store
        .search_by_page(&ctx, "tool", &Filter::new(), 1, 2, &[SortRule::desc("name")])
        .await
        .unwrap();
    let names: Vec<_> = reversed.items.iter().map(|w| w.name.as_str()).collect();
    assert_eq!(names, vec!["echo", "delta"]);
}

#[tokio::test]
async fn test_labels_and_record_in_one_transaction() {
    let backend = create_backend();
    let store = create_indexed_store(&backend);
    let ctx = StoreContext::new();

    let result: Result<(), _> = store
        .coordinator()
        .run_in_transaction(&ctx, |tx| {
            let store = &store;
            async move {
                let widget = store.create(&tx, Widget::new("gear", "red")).await?;
                store.set_labels(&tx, widget.id, &["gear"]).await?;
                store.get(&tx, widget.id + 1).await?;
                Ok(())
            }
        })
        .await;

    assert!(result.is_err());
    assert_eq!(store.search_count(&ctx, "gear", &Filter::new()).await.unwrap(), 0);
    assert!(store.labels(&ctx, 1).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_index_entries_are_replaced() {
    let backend = create_backend();
    let store = create_indexed_store(&backend);
    let ctx = StoreContext::new();

    store.set_labels(&ctx, 4, &["a", "b"]).await.unwrap();
    let before = store.index_entries(&ctx, 4).unwrap();
    assert_eq!(before.len(), 2);
    assert!(before.iter().all(|e| e.target == 4));

    store.set_labels(&ctx, 4, &["c"]).await.unwrap();
    let after = store.index_entries(&ctx, 4).unwrap();
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].label, "c");
    assert!(after[0].id > before[1].id);
}
