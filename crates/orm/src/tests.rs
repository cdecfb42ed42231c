//! Crate-level tests for trident-orm
//!
//! SQL text is asserted per dialect; anything that executes runs against a
//! `RecordingPool`, so statement counts and binding order are observable.

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::backends::{DatabaseValue, Engine, ExecResult, Record};
use crate::database::{BatchStatement, Database};
use crate::error::ModelError;
use crate::model::{ModelCollection, ModelRecord, ModelSchema};
use crate::query::{QueryBuilder, QueryOperator};
use crate::sql::SqlDialect;
use crate::testing::RecordingPool;

static CITY: Lazy<ModelSchema> = Lazy::new(|| {
    ModelSchema::new("main", "cities")
        .with_columns(["id", "name"])
        .with_relation("users", |city| city.has_many(&USER, "city_id"))
});

static USER: Lazy<ModelSchema> = Lazy::new(|| {
    ModelSchema::new("main", "users")
        .with_columns([
            "id",
            "first_name",
            "last_name",
            "email",
            "city_id",
            "title_id",
            "phone",
            "active",
            "created_at",
            "updated_at",
            "deleted_at",
        ])
        .with_relation("city", |user| user.belongs_to(&CITY, "city_id"))
});

fn row(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {}", other),
    }
}

async fn setup(engine: Engine) -> (Database, Arc<RecordingPool>) {
    let db = Database::new(Vec::new()).unwrap();
    let pool = RecordingPool::attach(&db, "main", engine).await.unwrap();
    (db, pool)
}

#[test]
fn test_compiling_twice_is_identical() {
    let q = QueryBuilder::new(SqlDialect::MsSql)
        .table("users")
        .where_eq("email", "a@b.com")
        .or()
        .open_bracket()
        .where_gt("age", 18)
        .where_in("title_id", vec![1, 2, 3], true)
        .close_bracket()
        .weighted_where("first_name", QueryOperator::Like, "an%", 2.0, 0.0, true);

    let first = q.generate_select().unwrap();
    let second = q.generate_select().unwrap();
    assert_eq!(first.sql, second.sql);
    assert_eq!(first.param_count(), second.param_count());
    assert_eq!(first.names, second.names);
}

#[test]
fn test_nested_parameter_counts_add_up_without_collisions() {
    let in_sub = QueryBuilder::new(SqlDialect::MsSql)
        .table("titles")
        .cols(["id"])
        .where_eq("kind", "staff")
        .where_gt("grade", 2);
    let join_sub = QueryBuilder::new(SqlDialect::MsSql)
        .table("cities")
        .where_eq("country", "NO");
    let q = QueryBuilder::new(SqlDialect::MsSql)
        .table("users")
        .join_sub(join_sub, "c", "c.id", "users.city_id")
        .where_eq("active", 1)
        .where_in_sub("title_id", in_sub)
        .where_eq("deleted", 0);

    let stmt = q.generate_select().unwrap();
    assert_eq!(stmt.param_count(), 1 + 1 + 2 + 1);
    assert_eq!(
        stmt.sql,
        "SELECT * FROM users INNER JOIN (SELECT * FROM cities WHERE country = @param1) AS c ON c.id = users.city_id \
         WHERE active = @param2 AND title_id IN (SELECT id FROM titles WHERE kind = @param3 AND grade > @param4) \
         AND deleted = @param5"
    );
    assert_eq!(stmt.names, vec!["param1", "param2", "param3", "param4", "param5"]);
    assert_eq!(
        stmt.params,
        vec![
            DatabaseValue::String("NO".into()),
            DatabaseValue::Int32(1),
            DatabaseValue::String("staff".into()),
            DatabaseValue::Int32(2),
            DatabaseValue::Int32(0),
        ]
    );
}

#[test]
fn test_order_column_is_quoted_in_every_dialect() {
    let cases = [
        (SqlDialect::MySql, "`order`"),
        (SqlDialect::MsSql, "[order]"),
        (SqlDialect::Postgres, "\"order\""),
    ];
    for (dialect, quoted) in cases {
        let stmt = QueryBuilder::new(dialect)
            .table("lines")
            .cols(["id", "order"])
            .where_eq("order", 3)
            .order_by("lines.order")
            .generate_select()
            .unwrap();
        assert_eq!(stmt.sql.matches(quoted).count(), 3, "{}", stmt.sql);
        assert!(!stmt.sql.contains(" order,") && !stmt.sql.contains(" order "), "{}", stmt.sql);
    }
}

#[test]
fn test_many_weighted_conditions_share_one_ranking_column() {
    let stmt = QueryBuilder::new(SqlDialect::Postgres)
        .table("people")
        .weighted_where("first_name", QueryOperator::Equal, "ann", 5.0, 0.0, true)
        .weighted_where("last_name", QueryOperator::Equal, "lee", 3.0, 0.0, true)
        .weighted_where("city", QueryOperator::Equal, "Oslo", 1.0, 0.0, true)
        .order_by("id")
        .generate_select()
        .unwrap();

    assert_eq!(stmt.sql.matches("AS __weight").count(), 1);
    assert_eq!(stmt.sql.matches("__weight DESC").count(), 1);
    assert_eq!(stmt.sql.matches(" + ").count(), 2);
    assert!(stmt.sql.ends_with("ORDER BY __weight DESC, id ASC"));
}

#[test]
fn test_single_value_where_in_per_dialect() {
    let cases = [
        (SqlDialect::MySql, "title_id IN (?)"),
        (SqlDialect::MsSql, "title_id IN (@param1)"),
        (SqlDialect::Postgres, "title_id IN ($1)"),
    ];
    for (dialect, expected) in cases {
        let stmt = QueryBuilder::new(dialect)
            .table("users")
            .where_in("title_id", vec![1], true)
            .generate_select()
            .unwrap();
        assert!(stmt.sql.ends_with(expected), "{}", stmt.sql);
        assert_eq!(stmt.params, vec![DatabaseValue::Int32(1)]);
    }
}

#[tokio::test]
async fn test_find_resolves_seeded_row() {
    let (db, pool) = setup(Engine::MySql).await;
    pool.push_rows(vec![row(json!({"id": 1, "email": "a@b.com", "first_name": "Ann"}))]);

    let user = ModelRecord::find(&db, &USER, 1).await.unwrap();
    assert_eq!(user.get_column("id"), &json!(1));
    assert_eq!(user.get_column("email"), &json!("a@b.com"));
    assert!(!user.is_new());

    let stmt = pool.last_statement().unwrap();
    assert_eq!(stmt.sql, "SELECT * FROM users WHERE id = ?");
    assert_eq!(stmt.params, vec![DatabaseValue::Int64(1)]);
}

#[tokio::test]
async fn test_find_without_row_is_not_found() {
    let (db, _pool) = setup(Engine::MySql).await;
    let err = ModelRecord::find(&db, &USER, 999999).await.unwrap_err();
    assert_eq!(err, ModelError::NotFound("users(999999)".to_string()));
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_save_new_then_existing() {
    let (db, pool) = setup(Engine::Postgres).await;
    pool.push_exec(ExecResult {
        rows_affected: 1,
        rows_changed: 1,
        insert_id: Some(json!(42)),
    });

    let mut user = ModelRecord::new(db.clone(), &USER);
    user.update_column("email", "new@b.com").update_column("nickname", "ignored");
    assert!(user.save().await.unwrap());
    assert!(!user.is_new());
    assert!(!user.is_dirty());
    assert_eq!(user.primary_key_value(), &json!(42));

    let insert = pool.last_statement().unwrap();
    assert_eq!(insert.sql, "INSERT INTO users (email) VALUES ($1) RETURNING id");

    user.update_column("email", "changed@b.com");
    assert!(user.save().await.unwrap());
    let update = pool.last_statement().unwrap();
    assert_eq!(update.sql, "UPDATE users SET email = $1 WHERE id = $2");
    assert_eq!(
        update.params,
        vec![DatabaseValue::String("changed@b.com".into()), DatabaseValue::Int64(42)]
    );
    assert_eq!(user.get_column("email"), &json!("changed@b.com"));
}

#[tokio::test]
async fn test_save_writes_null_inline() {
    let (db, pool) = setup(Engine::Postgres).await;
    let mut user = ModelRecord::new(db, &USER);
    user.load_data(row(json!({"id": 7, "email": "a@b.com", "city_id": 3})));

    user.update_column("city_id", Value::Null).update_column("email", "b@c.com");
    assert!(user.save().await.unwrap());

    let update = pool.last_statement().unwrap();
    assert_eq!(update.sql, "UPDATE users SET city_id = NULL, email = $1 WHERE id = $2");
    assert_eq!(
        update.params,
        vec![DatabaseValue::String("b@c.com".into()), DatabaseValue::Int64(7)]
    );
    assert_eq!(user.get_column("city_id"), &Value::Null);
}

#[tokio::test]
async fn test_save_without_changes_sends_nothing() {
    let (db, pool) = setup(Engine::MySql).await;
    let mut user = ModelRecord::new(db, &USER);
    assert!(!user.save().await.unwrap());
    assert_eq!(pool.statement_count(), 0);
}

#[tokio::test]
async fn test_delete_of_new_record_is_usage_error() {
    let (db, pool) = setup(Engine::MySql).await;
    let user = ModelRecord::new(db, &USER);
    assert!(matches!(user.delete().await, Err(ModelError::Usage(_))));
    assert_eq!(pool.statement_count(), 0);
}

#[tokio::test]
async fn test_visible_columns_limit_serialization() {
    let (db, _pool) = setup(Engine::MySql).await;
    let mut user = ModelRecord::new(db.clone(), &USER);
    user.load_data(row(json!({"id": 7, "first_name": "Ann", "email": "a@b.com", "city_id": 3})));
    assert_eq!(user.to_json().as_object().unwrap().len(), 11);

    user.set_visible(["id", "first_name"]);
    assert_eq!(user.to_json(), json!({"id": 7, "first_name": "Ann"}));
}

#[tokio::test]
async fn test_eager_load_on_fifty_models_issues_one_statement() {
    let (db, pool) = setup(Engine::Postgres).await;
    let users: Vec<Record> = (1..=50)
        .map(|id| row(json!({"id": id, "first_name": format!("user{}", id), "city_id": id % 5 + 1})))
        .collect();
    pool.push_rows(users);
    let mut collection = db
        .query("main")
        .unwrap()
        .table("users")
        .fetch_models(&USER)
        .await
        .unwrap();
    assert_eq!(collection.len(), 50);

    let cities: Vec<Record> = (1..=50)
        .map(|id| row(json!({"id": id % 5 + 1, "name": "c", "__table_users__key": id})))
        .collect();
    pool.push_rows(cities);

    let before = pool.statement_count();
    collection.eager_load("city").await.unwrap();
    assert_eq!(pool.statement_count(), before + 1);

    let stmt = pool.last_statement().unwrap();
    assert!(stmt.sql.starts_with(
        "SELECT cities.*, __parent.id AS __table_users__key FROM cities \
         INNER JOIN users AS __parent ON __parent.city_id = cities.id WHERE __parent.id IN ($1, $2"
    ));
    assert_eq!(stmt.param_count(), 50);

    for user in collection.iter() {
        let city = user.loaded("city").and_then(|l| l.as_one()).unwrap();
        assert_eq!(city.primary_key_value(), user.get_column("city_id"));
    }

    // Already loaded: nothing more to fetch
    collection.eager_load("city").await.unwrap();
    assert_eq!(pool.statement_count(), before + 1);
}

#[tokio::test]
async fn test_nested_eager_load_city_users() {
    let (db, pool) = setup(Engine::MySql).await;
    let mut users: ModelCollection = vec![(1, 10), (2, 20), (3, 10)]
        .into_iter()
        .map(|(id, city)| {
            let mut user = ModelRecord::new(db.clone(), &USER);
            user.load_data(row(json!({"id": id, "city_id": city})));
            user
        })
        .collect();

    pool.push_rows(vec![
        row(json!({"id": 10, "name": "Oslo", "__table_users__key": 1})),
        row(json!({"id": 20, "name": "Bergen", "__table_users__key": 2})),
        row(json!({"id": 10, "name": "Oslo", "__table_users__key": 3})),
    ]);
    pool.push_rows(vec![
        row(json!({"id": 1, "city_id": 10, "__table_cities__key": 10})),
        row(json!({"id": 3, "city_id": 10, "__table_cities__key": 10})),
        row(json!({"id": 2, "city_id": 20, "__table_cities__key": 20})),
        row(json!({"id": 4, "city_id": 20, "__table_cities__key": 20})),
    ]);

    users.eager_load("city.users").await.unwrap();
    assert_eq!(pool.statement_count(), 2);
    assert_eq!(
        pool.last_statement().unwrap().sql,
        "SELECT users.*, users.city_id AS __table_cities__key FROM users WHERE users.city_id IN (?, ?)"
    );

    for user in users.iter() {
        let city = user.loaded("city").and_then(|l| l.as_one()).unwrap();
        let residents = city.loaded("users").and_then(|l| l.as_many()).unwrap();
        assert_eq!(residents.len(), 2);
        for resident in residents {
            assert_eq!(resident.get_column("city_id"), city.primary_key_value());
        }
    }

    let json = users.first().unwrap().to_json();
    assert_eq!(json["city"]["name"], json!("Oslo"));
    assert_eq!(json["city"]["users"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_unknown_relation_is_reported() {
    let (db, _pool) = setup(Engine::MySql).await;
    let mut user = ModelRecord::new(db, &USER);
    user.load_data(row(json!({"id": 1})));
    assert!(matches!(user.relation("titles"), Err(ModelError::Relationship(_))));
}

#[tokio::test]
async fn test_stream_pauses_cursor_while_callback_runs() {
    let (db, pool) = setup(Engine::MySql).await;
    pool.push_rows((1..=5).map(|id| row(json!({"id": id}))).collect());

    let observed = Arc::new(Mutex::new(Vec::new()));
    let delivered = db
        .query("main")
        .unwrap()
        .table("users")
        .stream(2, |batch| {
            let pool = pool.clone();
            let observed = observed.clone();
            async move {
                let before = pool.rows_pulled();
                tokio::task::yield_now().await;
                tokio::time::sleep(Duration::from_millis(5)).await;
                observed.lock().push((batch.len(), before, pool.rows_pulled()));
                Ok(true)
            }
        })
        .await
        .unwrap();

    assert_eq!(delivered, 5);
    assert_eq!(*observed.lock(), vec![(2, 2, 2), (2, 4, 4), (1, 5, 5)]);
}

#[tokio::test]
async fn test_stream_stops_when_callback_declines() {
    let (db, pool) = setup(Engine::MySql).await;
    pool.push_rows((1..=5).map(|id| row(json!({"id": id}))).collect());

    let delivered = db
        .query("main")
        .unwrap()
        .table("users")
        .stream(2, |_batch| async { Ok(false) })
        .await
        .unwrap();

    assert_eq!(delivered, 2);
    assert_eq!(pool.rows_pulled(), 2);
}

#[tokio::test]
async fn test_paginate_counts_then_pages() {
    let (db, pool) = setup(Engine::Postgres).await;
    pool.push_rows(vec![row(json!({"total": 23}))]);

    let mut q = db.query("main").unwrap().table("users").where_eq("active", true);
    let page = q.paginate(10, 3).await.unwrap();
    assert_eq!(page.total_rows, 23);
    assert_eq!(page.total_pages, 3);

    assert_eq!(
        pool.last_statement().unwrap().sql,
        "SELECT COUNT(*) AS total FROM (SELECT * FROM users WHERE active = $1) AS count_sql"
    );
    assert_eq!(
        q.generate_select().unwrap().sql,
        "SELECT * FROM users WHERE active = $1 LIMIT 10 OFFSET 20"
    );
}

#[tokio::test]
async fn test_run_all_collects_every_outcome() {
    let (db, pool) = setup(Engine::MySql).await;
    let broken = RecordingPool::attach(&db, "broken", Engine::MySql).await.unwrap();
    pool.push_rows(vec![row(json!({"id": 1}))]);
    broken.push_error(ModelError::statement("table missing", ""));

    let results = db
        .run_all(vec![
            BatchStatement::Fetch(db.query("main").unwrap().table("users")),
            BatchStatement::Delete(db.query("broken").unwrap().table("ghosts").where_eq("id", 1)),
        ])
        .await;

    assert_eq!(results.len(), 2);
    assert!(results[0].success);
    assert_eq!(results[0].rows.as_ref().map(Vec::len), Some(1));
    assert!(!results[1].success);
    assert_eq!(
        results[1].error,
        Some(ModelError::statement("table missing", "DELETE FROM ghosts WHERE id = ?"))
    );
}

#[tokio::test]
async fn test_try_run_all_fails_fast() {
    let (db, _pool) = setup(Engine::MySql).await;
    let broken = RecordingPool::attach(&db, "broken", Engine::MySql).await.unwrap();
    broken.push_error(ModelError::Connection("refused".into()));

    let outcome = db
        .try_run_all(vec![
            BatchStatement::Fetch(db.query("main").unwrap().table("users")),
            BatchStatement::Fetch(db.query("broken").unwrap().table("users")),
        ])
        .await;
    assert_eq!(outcome.unwrap_err(), ModelError::Connection("refused".into()));
}

#[tokio::test]
async fn test_unknown_data_source_is_configuration_error() {
    let (db, _pool) = setup(Engine::MySql).await;
    assert!(matches!(db.query("reporting"), Err(ModelError::Configuration(_))));
}
