use content_models::content_model;
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use sqlxrecord::{codes, DbPool, Record, RecordModel, SqlxRecordError};
use std::sync::Arc;

const SCHEMA: &[&str] = &[
    "CREATE TABLE contents (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL UNIQUE,
        summary TEXT,
        body TEXT,
        publish_date TEXT,
        is_published BOOLEAN NOT NULL DEFAULT 0,
        contract_terms TEXT,
        internal_notes TEXT
    )",
    "CREATE TABLE contract_signatures (
        username TEXT NOT NULL,
        content_id INTEGER NOT NULL REFERENCES contents (id),
        PRIMARY KEY (username, content_id)
    )",
];

/// 单连接的内存数据库，连接关闭前数据一直存在
async fn setup() -> (DbPool, RecordModel) {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    for ddl in SCHEMA {
        sqlx::query(ddl).execute(&pool).await.unwrap();
    }
    let db = DbPool::from_sqlite_pool(Arc::new(pool));
    let model = content_model(Arc::new(db.clone())).unwrap();
    (db, model)
}

fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected object"),
    }
}

fn demo() -> Record {
    record(json!({
        "body": {"blocks": [{"type": "paragraph", "text": "hello"}]},
        "contractSigned": [{"username": "alice"}],
        "contractTerms": "net 30",
        "isPublished": false,
        "publishDate": "2024-05-01T10:00:00Z",
        "summary": "first post",
        "title": "Demo"
    }))
}

#[tokio::test]
async fn test_create_list_get_delete() {
    let (db, contents) = setup().await;

    let created = contents.create(&demo()).await.unwrap();
    assert_eq!(created["id"], json!(1));
    assert_eq!(created["title"], json!("Demo"));
    assert_eq!(created["isPublished"], json!(false));
    assert_eq!(created["publishDate"], json!("2024-05-01T10:00:00Z"));
    assert_eq!(created["body"]["blocks"][0]["text"], json!("hello"));
    assert!(!created.contains_key("contractTerms"));
    assert!(!created.contains_key("contractSigned"));

    let signatures = contents.associations(1).await.unwrap();
    assert_eq!(
        signatures,
        vec![record(json!({"contentId": 1, "username": "alice"}))]
    );

    let found = contents
        .list(Some(&record(json!({"title": "dem"}))))
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["id"], json!(1));

    let none = contents
        .list(Some(&record(json!({"title": "zzz"}))))
        .await
        .unwrap();
    assert!(none.is_empty());

    contents.delete(1, "alice").await.unwrap();
    assert!(contents.associations(1).await.unwrap().is_empty());
    let err = contents.delete(1, "alice").await.unwrap_err();
    assert!(err.is_not_found());

    // 只删除关联行，内容本身保留
    assert_eq!(contents.get(1).await.unwrap()["title"], json!("Demo"));

    db.close().await;
}

#[tokio::test]
async fn test_failed_association_leaves_no_rows() {
    let (_db, contents) = setup().await;

    let err = contents
        .create(&record(json!({
            "contractSigned": [{"username": "bob"}, {"user": "carol"}],
            "title": "Broken"
        })))
        .await
        .unwrap_err();
    assert_eq!(err.code(), codes::MULTI_CREATE_FAILED);

    assert!(contents.list(None).await.unwrap().is_empty());
    assert_eq!(contents.count(None).await.unwrap(), 0);

    // 事务回滚后自增序号可能已被消耗，用标题定位
    contents
        .create(&record(json!({"title": "Fine"})))
        .await
        .unwrap();
    let rows = contents.list(None).await.unwrap();
    assert_eq!(rows.len(), 1);
    let id = rows[0]["id"].as_i64().unwrap();
    assert!(contents.associations(id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_duplicate_title_is_request_failed() {
    let (_db, contents) = setup().await;
    contents.create(&demo()).await.unwrap();

    let err = contents.create(&demo()).await.unwrap_err();
    assert!(err.is_request_failed());
    assert_eq!(contents.count(None).await.unwrap(), 1);

    contents
        .create(&record(json!({"title": "Other"})))
        .await
        .unwrap();
    let other = contents
        .list(Some(&record(json!({"title": "Other"}))))
        .await
        .unwrap();
    let id = other[0]["id"].as_i64().unwrap();
    let err = contents
        .update(id, &record(json!({"title": "Demo"})))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SqlxRecordError::RequestFailed {
            code: codes::UPDATE_FAILED
        }
    ));
}

#[tokio::test]
async fn test_update_is_partial() {
    let (_db, contents) = setup().await;
    contents.create(&demo()).await.unwrap();

    let before = contents.get(1).await.unwrap();
    let after = contents
        .update(1, &record(json!({"title": "Demo v2"})))
        .await
        .unwrap();

    assert_eq!(after["title"], json!("Demo v2"));
    for key in ["summary", "body", "publishDate", "isPublished"] {
        assert_eq!(before[key], after[key], "{key} changed");
    }

    let err = contents
        .update(99, &record(json!({"title": "x"})))
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let err = contents
        .update(1, &record(json!({"id": 5})))
        .await
        .unwrap_err();
    assert!(matches!(err, SqlxRecordError::InvalidField(_)));
}

#[tokio::test]
async fn test_private_fields() {
    let (_db, contents) = setup().await;
    contents.create(&demo()).await.unwrap();

    let general = contents.get(1).await.unwrap();
    assert!(!general.contains_key("contractTerms"));
    assert!(!general.contains_key("internalNotes"));

    let privileged = contents.get_privileged(1).await.unwrap();
    assert_eq!(privileged["contractTerms"], json!("net 30"));
    assert_eq!(privileged["internalNotes"], Value::Null);
    assert_eq!(privileged["title"], general["title"]);

    let err = contents
        .list(Some(&record(json!({"contractTerms": "net 30"}))))
        .await
        .unwrap_err();
    assert!(matches!(err, SqlxRecordError::InvalidField(_)));

    assert!(contents.get_privileged(2).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_list_order_and_pages() {
    let (_db, contents) = setup().await;
    for (title, date) in [
        ("Older", "2024-01-01"),
        ("Newest", "2024-03-01 08:30:00"),
        ("Middle", "2024-02-01T00:00:00Z"),
    ] {
        contents
            .create(&record(json!({"isPublished": true, "publishDate": date, "title": title})))
            .await
            .unwrap();
    }

    let all = contents.list(None).await.unwrap();
    assert_eq!(all, contents.list(Some(&Record::new())).await.unwrap());
    let titles: Vec<_> = all.iter().map(|r| r["title"].clone()).collect();
    assert_eq!(titles, vec![json!("Newest"), json!("Middle"), json!("Older")]);
    assert_eq!(all[0]["publishDate"], json!("2024-03-01T08:30:00Z"));

    let published = contents
        .list(Some(&record(json!({"isPublished": true}))))
        .await
        .unwrap();
    assert_eq!(published.len(), 3);

    let page = contents.paginate(None, 2, 2).await.unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.pages, 2);
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0]["title"], json!("Older"));
}
