use super::*;
use crate::builder::SqlFactory;
use crate::connection::StubConnection;
use crate::row;

fn expected(log: &[&str]) -> Vec<String> {
    log.iter().map(|s| s.to_string()).collect()
}

// ==================== Result shaping ====================

#[tokio::test]
async fn select_all_returns_rows_in_order() {
    let con = StubConnection::new();
    con.push_result_set(vec![
        row! { "id" => 1, "name" => "A" },
        row! { "id" => 2, "name" => "B" },
    ]);
    let db = DbAdapter::new(&con);

    let rows = db.select_all("select *", &[]).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("name"), Some(&SqlValue::Text("A".into())));
    assert_eq!(rows[1].get("id"), Some(&SqlValue::Int(2)));
    assert_eq!(con.log(), expected(&["select *"]));

    // Empty search
    let rows = db.select_all("select *", &[]).await.unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn select_row_takes_first_or_empty() {
    let con = StubConnection::new();
    con.push_result_set(vec![
        row! { "id" => 1, "name" => "A" },
        row! { "id" => 2, "name" => "B" },
    ]);
    let db = DbAdapter::new(&con);

    let first = db.select_row("select *", &[]).await.unwrap();
    assert_eq!(first, row! { "id" => 1, "name" => "A" });

    // Empty search
    let empty = db.select_row("select *", &[]).await.unwrap();
    assert!(empty.is_empty());
}

#[tokio::test]
async fn select_column_takes_first_value_of_each_row() {
    let con = StubConnection::new();
    con.push_result_set(vec![
        row! { "id" => 1, "name" => "A" },
        row! { "id" => 2, "name" => "B" },
    ]);
    let db = DbAdapter::new(&con);

    let column = db.select_column("select *", &[]).await.unwrap();
    assert_eq!(column, vec![SqlValue::Int(1), SqlValue::Int(2)]);

    let column = db.select_column("select *", &[]).await.unwrap();
    assert!(column.is_empty());
}

#[tokio::test]
async fn select_value_sentinel_is_distinct_from_null() {
    let con = StubConnection::new();
    con.push_result_set(vec![
        row! { "id" => "a", "name" => "A" },
        row! { "id" => 2, "name" => "B" },
    ]);
    con.push_result_set(vec![row! { "v" => SqlValue::Null }]);
    let db = DbAdapter::new(&con);

    assert_eq!(
        db.select_value("select *", &[]).await.unwrap(),
        Some(SqlValue::Text("a".into()))
    );
    // A stored NULL is found...
    assert_eq!(
        db.select_value("select *", &[]).await.unwrap(),
        Some(SqlValue::Null)
    );
    // ...while an empty result set is not.
    assert_eq!(db.select_value("select *", &[]).await.unwrap(), None);
}

#[tokio::test]
async fn select_key_value_builds_map_from_two_columns() {
    let con = StubConnection::new();
    con.push_result_set(vec![
        row! { "id" => 1, "name" => "A" },
        row! { "id" => 2, "name" => "B" },
    ]);
    let db = DbAdapter::new(&con);

    let map = db.select_key_value("select *", &[]).await.unwrap();
    assert_eq!(map.len(), 2);
    assert_eq!(map.get("1"), Some(&SqlValue::Text("A".into())));
    assert_eq!(map.get("2"), Some(&SqlValue::Text("B".into())));
}

#[tokio::test]
async fn select_key_value_rejects_other_column_counts() {
    let con = StubConnection::new();
    con.push_result_set(vec![row! { "id" => 1, "name" => "A", "extra" => 3 }]);
    let db = DbAdapter::new(&con);

    let error = db.select_key_value("select *", &[]).await.unwrap_err();
    assert!(error.is_builder());
    assert!(error.to_string().contains("got 3"));
}

#[tokio::test]
async fn execute_returns_affected_count() {
    let con = StubConnection::new();
    let db = DbAdapter::new(&con);
    assert_eq!(db.execute("delete from t", &[]).await.unwrap(), 1);
    assert_eq!(con.log(), expected(&["delete from t"]));
}

// ==================== Transactions ====================

#[tokio::test]
async fn transaction_commits_on_ok() {
    let con = StubConnection::new();
    let db = DbAdapter::new(&con);

    db.transaction(async || {
        db.execute("select *", &[]).await?;
        Ok(())
    })
    .await
    .unwrap();

    assert_eq!(con.log(), expected(&["begin", "select *", "commit"]));
    assert_eq!(db.transaction_depth(), 0);
}

#[tokio::test]
async fn transaction_rolls_back_and_propagates_error() {
    let con = StubConnection::new();
    let db = DbAdapter::new(&con);

    let result: DbResult<()> = db
        .transaction(async || {
            db.execute("select *", &[]).await?;
            Err(DbError::Other("sql error".into()))
        })
        .await;

    assert_eq!(result.unwrap_err().to_string(), "sql error");
    assert_eq!(con.log(), expected(&["begin", "select *", "rollback"]));
    assert_eq!(db.transaction_depth(), 0);
}

#[tokio::test]
async fn nested_transactions_use_positional_savepoints() {
    let con = StubConnection::new();
    let db = DbAdapter::new(&con);

    assert_eq!(db.begin_transaction().await.unwrap(), 1);
    assert_eq!(db.begin_transaction().await.unwrap(), 2); // sp1
    assert_eq!(db.begin_transaction().await.unwrap(), 3); // sp2
    assert_eq!(db.commit().await.unwrap(), 2); // sp2
    assert_eq!(db.rollback(false).await.unwrap(), 1); // sp1
    assert_eq!(db.rollback(false).await.unwrap(), 0);

    assert_eq!(
        con.log(),
        expected(&[
            "begin",
            "SAVEPOINT sp1",
            "SAVEPOINT sp2",
            "RELEASE SAVEPOINT sp2",
            "ROLLBACK TO SAVEPOINT sp1",
            "rollback",
        ])
    );
}

#[tokio::test]
async fn forced_rollback_discards_all_nesting() {
    let con = StubConnection::new();
    let db = DbAdapter::new(&con);

    db.begin_transaction().await.unwrap();
    db.begin_transaction().await.unwrap();
    db.begin_transaction().await.unwrap();
    assert_eq!(db.rollback(true).await.unwrap(), 0);

    assert_eq!(
        con.log(),
        expected(&["begin", "SAVEPOINT sp1", "SAVEPOINT sp2", "rollback"])
    );
    assert_eq!(db.transaction_depth(), 0);
}

#[tokio::test]
async fn commit_without_transaction_fails() {
    let con = StubConnection::new();
    let db = DbAdapter::new(&con);

    let error = db.commit().await.unwrap_err();
    assert!(error.is_transaction());
    assert!(error.to_string().contains("depth 0"));
    assert!(con.log().is_empty());
}

#[tokio::test]
async fn rollback_without_transaction_fails() {
    let con = StubConnection::new();
    let db = DbAdapter::new(&con);

    let error = db.rollback(false).await.unwrap_err();
    assert!(error.is_transaction());
    assert!(con.log().is_empty());
}

#[tokio::test]
async fn nested_transaction_helper_releases_savepoint() {
    let con = StubConnection::new();
    let db = DbAdapter::new(&con);

    db.transaction(async || {
        db.transaction(async || db.execute("select *", &[]).await.map(|_| ()))
            .await?;
        Ok(())
    })
    .await
    .unwrap();

    assert_eq!(
        con.log(),
        expected(&[
            "begin",
            "SAVEPOINT sp1",
            "select *",
            "RELEASE SAVEPOINT sp1",
            "commit",
        ])
    );
}

// ==================== Chunked pagination ====================

#[tokio::test]
async fn chunk_pages_through_the_result() {
    let con = StubConnection::new();
    con.push_result_set(vec![row! { "count" => 2 }]);
    let rows1 = vec![row! { "id" => 1, "name" => "A" }];
    let rows2 = vec![row! { "id" => 2, "name" => "B" }];
    con.push_result_set(rows1.clone());
    con.push_result_set(rows2.clone());
    let db = DbAdapter::new(&con);

    let mut query = SqlFactory::standard().make();
    query.from("table");

    let mut pages = Vec::new();
    db.chunk(1, &query, |rows| {
        pages.push(rows);
        Ok(())
    })
    .await
    .unwrap();

    assert_eq!(pages, vec![rows1, rows2]);
    assert_eq!(
        con.log(),
        expected(&[
            "SELECT count(*)\nFROM table",
            "SELECT *\nFROM table\nLIMIT 1",
            "SELECT *\nFROM table\nLIMIT 1 OFFSET 1",
        ])
    );
}

#[tokio::test]
async fn chunk_with_no_rows_never_invokes_handler() {
    let con = StubConnection::new();
    con.push_result_set(vec![row! { "count" => 0 }]);
    let db = DbAdapter::new(&con);

    let mut query = SqlFactory::standard().make();
    query.from("table");

    let mut calls = 0;
    db.chunk(10, &query, |_| {
        calls += 1;
        Ok(())
    })
    .await
    .unwrap();

    assert_eq!(calls, 0);
    assert_eq!(con.log(), expected(&["SELECT count(*)\nFROM table"]));
}

#[tokio::test]
async fn chunk_exact_multiple_stops_after_last_page() {
    let con = StubConnection::new();
    con.push_result_set(vec![row! { "count" => 2 }]);
    con.push_result_set(vec![row! { "id" => 1 }, row! { "id" => 2 }]);
    let db = DbAdapter::new(&con);

    let mut query = SqlFactory::standard().make();
    query.from("table");

    let mut calls = 0;
    db.chunk(2, &query, |rows| {
        calls += 1;
        assert_eq!(rows.len(), 2);
        Ok(())
    })
    .await
    .unwrap();

    assert_eq!(calls, 1);
    assert_eq!(
        con.log(),
        expected(&["SELECT count(*)\nFROM table", "SELECT *\nFROM table\nLIMIT 2"])
    );
}

#[tokio::test]
async fn chunk_handler_error_aborts_iteration() {
    let con = StubConnection::new();
    con.push_result_set(vec![row! { "count" => 3 }]);
    con.push_result_set(vec![row! { "id" => 1 }]);
    con.push_result_set(vec![row! { "id" => 2 }]);
    con.push_result_set(vec![row! { "id" => 3 }]);
    let db = DbAdapter::new(&con);

    let mut query = SqlFactory::standard().make();
    query.from("table");

    let error = db
        .chunk(1, &query, |_| Err(DbError::Other("stop".into())))
        .await
        .unwrap_err();

    assert_eq!(error.to_string(), "stop");
    assert_eq!(
        con.log(),
        expected(&["SELECT count(*)\nFROM table", "SELECT *\nFROM table\nLIMIT 1"])
    );
}

#[tokio::test]
async fn chunk_rejects_zero_page_size() {
    let con = StubConnection::new();
    let db = DbAdapter::new(&con);

    let mut query = SqlFactory::standard().make();
    query.from("table");

    let error = db.chunk(0, &query, |_| Ok(())).await.unwrap_err();
    assert!(error.is_builder());
    assert!(con.log().is_empty());
}
