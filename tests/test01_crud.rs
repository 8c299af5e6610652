#![cfg(feature = "sqlite")]

mod common;

use common::{Item, sqlite_db};
use futures_util::TryStreamExt;
use sql_async_orm::prelude::*;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn item_lifecycle() -> Result<(), Box<dyn std::error::Error>> {
    let db = sqlite_db("item_lifecycle");
    let items = Item::using(&db);
    assert!(items.create_table(true).await?);

    items.create(Item::with_id(1, "test")).await?;
    items.create(Item::with_id(2, "test")).await?;

    assert_eq!(items.select().count().await?, 2);
    assert_eq!(items.select().filter(col("id").gt(0)).await?.len(), 2);

    let grouped = items
        .select()
        .columns([col("data")])
        .group_by([col("data")])
        .tuples();
    assert_eq!(grouped.count().await?, 1);
    assert_eq!(grouped.await?, vec![vec![RowValues::Text("test".into())]]);

    let mut newest = items.select().order_by([col("id").desc()]);
    let mut latest = newest.first().await?.expect("two rows were inserted");
    assert_eq!(latest.id, Some(2));
    assert!(!latest.is_dirty());

    latest.data = "aaa".into();
    assert_eq!(latest.dirty_fields(), vec!["data"]);
    assert_eq!(items.save(&mut latest).await?, 1);
    assert!(!latest.is_dirty());

    let refetched = items.get_by_id(2).await?;
    assert_eq!(refetched.data, "aaa");

    assert_eq!(items.delete_instance(&refetched).await?, 1);
    let err = items.get_by_id(2).await.unwrap_err();
    assert!(err.is_not_found(), "unexpected error: {err}");
    assert!(items.get_or_none(col("id").eq(2)).await?.is_none());
    assert_eq!(items.select().count().await?, 1);

    db.close().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn generated_keys_and_clean_saves() -> Result<(), Box<dyn std::error::Error>> {
    let db = sqlite_db("generated_keys");
    let items = Item::using(&db);
    items.create_table(true).await?;

    let mut created = items.create(Item::new("first")).await?;
    assert_eq!(created.id, Some(1));
    assert_eq!(created.pk().and_then(|pk| pk.as_int()), Some(1));

    // Nothing changed since the insert: no statement is sent.
    assert_eq!(items.save(&mut created).await?, 0);

    let mut loaded = items.get(col("data").eq("first")).await?;
    assert_eq!(items.save(&mut loaded).await?, 0);

    loaded.data = "renamed".into();
    let saved = loaded
        .save_with(SaveOptions::default().using(&db))
        .await?;
    assert_eq!(saved, 1);
    assert_eq!(items.get_by_id(1).await?.data, "renamed");

    let second = items.create(Item::new("second")).await?;
    assert_eq!(second.id, Some(2));
    Ok(())
}

#[tokio::test]
async fn select_handles_cache_results() -> Result<(), Box<dyn std::error::Error>> {
    let db = sqlite_db("select_cache");
    let items = Item::using(&db);
    items.create_table(true).await?;
    for data in ["a", "b", "c"] {
        items.create(Item::new(data)).await?;
    }

    let mut query = items.select().order_by([col("id").asc()]);
    assert!(matches!(query.iter(), Err(OrmError::NotExecuted)));
    assert_eq!(query.len().await?, 3);
    assert!(query.is_executed());
    assert_eq!(query.get_index(1).await?.map(|item| item.data), Some("b".to_owned()));
    assert!(query.get_index(7).await?.is_none());
    let ids: Vec<Option<i64>> = query.iter()?.map(|item| item.id).collect();
    assert_eq!(ids, vec![Some(1), Some(2), Some(3)]);

    let peeked = query.peek(2).await?;
    assert_eq!(peeked.len(), 2);

    let first_two = items.select().order_by([col("id").asc()]).first_n(2).await?;
    assert_eq!(first_two.iter().map(|i| i.data.as_str()).collect::<Vec<_>>(), ["a", "b"]);

    // A clone starts without the cached rows.
    let copy = query.clone();
    assert!(!copy.is_executed());
    assert_eq!(copy.await?.len(), 3);

    let page = items.select().order_by([col("id").asc()]).paginate(2, 2).await?;
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].data, "c");
    Ok(())
}

#[tokio::test]
async fn probes_and_raw_queries() -> Result<(), Box<dyn std::error::Error>> {
    let db = sqlite_db("probes");
    let items = Item::using(&db);
    items.create_table(true).await?;
    items
        .insert_many(vec![
            vec![("data", "x".into())],
            vec![("data", "y".into())],
            vec![("data", "y".into())],
        ])
        .await?;

    assert!(items.select().filter(col("data").eq("y")).exists().await?);
    assert!(!items.select().filter(col("data").eq("z")).exists().await?);

    let limited = items.select().limit(1);
    assert_eq!(limited.count().await?, 1);
    assert_eq!(limited.count_with(true).await?, 3);

    let max = db.raw("SELECT MAX(id) FROM item", vec![]).scalar().await?;
    assert_eq!(max, Some(RowValues::Int(3)));

    let ys = items
        .raw("SELECT id, data FROM item WHERE data = ? ORDER BY id", vec!["y".into()])
        .await?;
    assert_eq!(ys.iter().map(|i| i.id).collect::<Vec<_>>(), vec![Some(2), Some(3)]);

    // Refining a raw query wraps it as a subquery.
    let narrowed = db
        .raw("SELECT id, data FROM item WHERE data = ?", vec!["y".into()])
        .filter(col("id").gt(2))
        .count()
        .await?;
    assert_eq!(narrowed, 1);

    let rows = db.raw("SELECT id, data FROM item ORDER BY id", vec![]).await?;
    assert_eq!(rows[0].get("data"), Some(&RowValues::Text("x".into())));
    assert_eq!(rows[0].try_get::<i64>("id")?, 1);

    let err = db
        .raw("SELECT * FROM item WHERE id = ? AND data = ?", vec![1.into()])
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::Configuration(_)), "unexpected error: {err}");
    Ok(())
}

#[tokio::test]
async fn rows_stream_in_order() -> Result<(), Box<dyn std::error::Error>> {
    let db = sqlite_db("stream");
    let items = Item::using(&db);
    items.create_table(true).await?;
    for data in ["one", "two", "three"] {
        items.create(Item::new(data)).await?;
    }

    let streamed: Vec<Item> = items
        .select()
        .order_by([col("id").asc()])
        .into_stream()
        .try_collect()
        .await?;
    let data: Vec<&str> = streamed.iter().map(|i| i.data.as_str()).collect();
    assert_eq!(data, ["one", "two", "three"]);
    assert!(streamed.iter().all(|i| !i.is_dirty()));
    Ok(())
}

#[tokio::test]
async fn updates_and_deletes_report_rowcounts() -> Result<(), Box<dyn std::error::Error>> {
    let db = sqlite_db("mutations");
    let items = Item::using(&db);
    items.create_table(true).await?;
    for data in ["a", "a", "b"] {
        items.create(Item::new(data)).await?;
    }

    let updated = items
        .update(vec![("data", val("c"))])
        .filter(col("data").eq("a"))
        .await?;
    assert_eq!(updated, 2);

    // Rows are only available with RETURNING.
    let mut plain = items.update(vec![("data", val("d"))]).filter(col("id").eq(3));
    assert!(matches!(plain.rows().await, Err(OrmError::UnsupportedOperation(_))));

    let mut returning = items
        .update(vec![("data", val("e"))])
        .filter(col("id").eq(3))
        .returning(["id", "data"]);
    let rows = returning.rows().await?.rows()?.to_vec();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("data"), Some(&RowValues::Text("e".into())));
    assert_eq!(returning.execute().await?, 1);

    let deleted = items.delete().filter(col("data").eq("c")).await?;
    assert_eq!(deleted, 2);
    assert_eq!(items.select().count().await?, 1);
    Ok(())
}

#[tokio::test]
async fn executed_handles_refuse_rebinding() -> Result<(), Box<dyn std::error::Error>> {
    let db = sqlite_db("rebinding");
    let other = sqlite_db("rebinding_other");
    let items = Item::using(&db);
    items.create_table(true).await?;
    Item::using(&other).create_table(true).await?;
    items.create(Item::new("only here")).await?;

    // Before execution a handle can move to another database.
    let moved = items.select().bind(&other)?;
    assert_eq!(moved.count().await?, 0);

    let mut executed = items.select();
    executed.execute().await?;
    assert!(matches!(executed.bind(&other), Err(OrmError::AlreadyExecuted(_))));

    let err = Item::select().await.unwrap_err();
    assert!(matches!(err, OrmError::Configuration(_)), "unexpected error: {err}");
    Ok(())
}
