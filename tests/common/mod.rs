#![allow(dead_code)]

use std::time::{SystemTime, UNIX_EPOCH};

use nested_set::{HasBoundaries, NestedSet, NodeRecord};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, DbErr, EntityTrait,
    QueryOrder, Statement, Value,
};

pub mod node {
    use nested_set::NestedSetModelDerive as NestedSetModel;
    use sea_orm::entity::prelude::*;
    use serde::Serialize;

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, DeriveEntityModel, NestedSetModel)]
    #[sea_orm(table_name = "nodes")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        pub parent_id: Option<i32>,
        pub name: String,
        pub lft: i32,
        pub rgt: i32,
        pub depth: i32,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod page {
    use nested_set::NestedSetModelDerive as NestedSetModel;
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, NestedSetModel)]
    #[sea_orm(table_name = "pages")]
    #[nested_set(
        left_field = "nest_left",
        right_field = "nest_right",
        depth_field = "nest_depth",
        tombstone_field = "deleted_at",
        tombstone_mark = "crate::common::deleted_now"
    )]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        pub parent_id: Option<i32>,
        pub title: String,
        pub site: String,
        pub nest_left: i32,
        pub nest_right: i32,
        pub nest_depth: i32,
        pub deleted_at: Option<i64>,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

/// Tombstone value for soft-deleted pages.
pub fn deleted_now() -> Value {
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(1);
    Value::BigInt(Some(seconds))
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Fresh in-memory SQLite database with the `nodes` and `pages` tables.
///
/// The pool holds a single connection, otherwise every connection would see
/// its own empty database.
pub async fn sqlite() -> Result<DatabaseConnection, DbErr> {
    init_tracing();

    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let db = Database::connect(options).await?;

    for sql in [
        r#"
        CREATE TABLE nodes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            parent_id INTEGER NULL,
            name TEXT NOT NULL,
            lft INTEGER NOT NULL,
            rgt INTEGER NOT NULL,
            depth INTEGER NOT NULL
        );
        "#,
        r#"
        CREATE TABLE pages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            parent_id INTEGER NULL,
            title TEXT NOT NULL,
            site TEXT NOT NULL,
            nest_left INTEGER NOT NULL,
            nest_right INTEGER NOT NULL,
            nest_depth INTEGER NOT NULL,
            deleted_at BIGINT NULL
        );
        "#,
    ] {
        db.execute(Statement::from_string(DbBackend::Sqlite, sql))
            .await?;
    }

    Ok(db)
}

pub fn pending_node(name: &str, parent: Option<i32>) -> node::ActiveModel {
    use sea_orm::ActiveValue::Set;

    node::ActiveModel {
        name: Set(name.to_owned()),
        parent_id: Set(parent),
        ..Default::default()
    }
}

pub fn pending_page(title: &str, site: &str, parent: Option<i32>) -> page::ActiveModel {
    use sea_orm::ActiveValue::Set;

    page::ActiveModel {
        title: Set(title.to_owned()),
        site: Set(site.to_owned()),
        parent_id: Set(parent),
        ..Default::default()
    }
}

/// `(name, left, right, depth)` for every node, in id order.
pub async fn snapshot<C>(db: &C) -> Result<Vec<(String, i32, i32, i32)>, DbErr>
where
    C: ConnectionTrait,
{
    let rows = node::Entity::find()
        .order_by_asc(node::Column::Id)
        .all(db)
        .await?;
    Ok(rows
        .into_iter()
        .map(|row| (row.name, row.lft, row.rgt, row.depth))
        .collect())
}

pub fn expect(name: &str, left: i32, right: i32, depth: i32) -> (String, i32, i32, i32) {
    (name.to_owned(), left, right, depth)
}

/// Checks the structural invariants over every row visible to `tree`.
pub async fn assert_invariants<M, C>(tree: &NestedSet<M>, db: &C) -> Result<(), DbErr>
where
    M: nested_set::NestedSetModel + std::fmt::Debug,
    C: ConnectionTrait,
{
    let rows = tree.query().all(db).await?;

    for row in &rows {
        assert!(row.left() < row.right(), "{row:?} has left >= right");
        assert_eq!(
            (row.right() - row.left()) % 2,
            1,
            "{row:?} spans an even number of values"
        );

        let descendants = rows
            .iter()
            .filter(|other| other.is_descendant_of(row))
            .count() as i32;
        assert_eq!(row.descendant_count(), descendants, "{row:?} descendant count");

        let ancestors = rows
            .iter()
            .filter(|other| other.is_ancestor_of(row))
            .count() as i32;
        assert_eq!(row.depth(), ancestors, "{row:?} depth");

        for other in &rows {
            if other.id() == row.id() {
                continue;
            }
            let nested = other.is_descendant_of(row) || row.is_descendant_of(other);
            let disjoint = other.right() < row.left() || row.right() < other.left();
            assert!(nested || disjoint, "{row:?} partially overlaps {other:?}");
        }
    }

    Ok(())
}

/// Scenario A: root `A` with children `B` and `C`, inserted in that order.
pub async fn seed_abc<C>(
    tree: &NestedSet<node::Model>,
    db: &C,
) -> Result<(node::Model, node::Model, node::Model), Box<dyn std::error::Error>>
where
    C: ConnectionTrait + sea_orm::TransactionTrait,
{
    let a = tree.insert(db, pending_node("A", None)).await?;
    let b = tree.insert(db, pending_node("B", Some(a.id()))).await?;
    let c = tree.insert(db, pending_node("C", Some(a.id()))).await?;
    Ok((a, b, c))
}
