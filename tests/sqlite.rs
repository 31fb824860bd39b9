mod common;

use std::error::Error;

use common::{assert_invariants, expect, node, pending_node, seed_abc, snapshot, sqlite};
use nested_set::{
    HasBoundaries, HasParentRef, InvalidMove, MoveOutcome, NestedSet, NestedSetError, Position,
};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, DbBackend, EntityTrait,
    MockDatabase, PaginatorTrait, QueryFilter,
};

type TestResult = Result<(), Box<dyn Error>>;

fn names(rows: Vec<node::Model>) -> Vec<String> {
    rows.into_iter().map(|row| row.name).collect()
}

async fn fresh(
    tree: &NestedSet<node::Model>,
    db: &DatabaseConnection,
    id: i32,
) -> Result<node::Model, Box<dyn Error>> {
    Ok(tree.find(db, &id).await?.ok_or("node vanished")?)
}

/// A(B(E), C, D)
async fn seed_wide(
    tree: &NestedSet<node::Model>,
    db: &DatabaseConnection,
) -> Result<Vec<node::Model>, Box<dyn Error>> {
    let (a, b, c) = seed_abc(tree, db).await?;
    let d = tree.insert(db, pending_node("D", Some(a.id))).await?;
    let e = tree.insert(db, pending_node("E", Some(b.id))).await?;
    Ok(vec![a, b, c, d, e])
}

#[tokio::test]
async fn inserting_children_appends_them_in_order() -> TestResult {
    let db = sqlite().await?;
    let tree = NestedSet::<node::Model>::new();

    let (a, b, c) = seed_abc(&tree, &db).await?;

    assert_eq!(
        snapshot(&db).await?,
        vec![expect("A", 1, 6, 0), expect("B", 2, 3, 1), expect("C", 4, 5, 1)]
    );
    assert_eq!(a.parent_id, None);
    assert_eq!(b.parent_id, Some(a.id));
    assert_eq!(c.parent_id, Some(a.id));
    assert_eq!((c.lft, c.rgt, c.depth), (4, 5, 1));
    assert_invariants(&tree, &db).await?;
    Ok(())
}

#[tokio::test]
async fn make_child_of_nests_under_sibling() -> TestResult {
    let db = sqlite().await?;
    let tree = NestedSet::<node::Model>::new();
    let (_, b, c) = seed_abc(&tree, &db).await?;

    let outcome = tree.make_child_of(&db, &c, &b).await?;

    assert_eq!(outcome, MoveOutcome::Moved);
    assert_eq!(
        snapshot(&db).await?,
        vec![expect("A", 1, 6, 0), expect("B", 2, 5, 1), expect("C", 3, 4, 2)]
    );
    assert_eq!(fresh(&tree, &db, c.id).await?.parent_id, Some(b.id));
    assert_invariants(&tree, &db).await?;
    Ok(())
}

#[tokio::test]
async fn deleting_a_node_cascades_and_closes_the_gap() -> TestResult {
    let db = sqlite().await?;
    let tree = NestedSet::<node::Model>::new();
    let (_, b, c) = seed_abc(&tree, &db).await?;
    tree.make_child_of(&db, &c, &b).await?;

    let removed = tree.delete(&db, &b).await?;

    assert_eq!(removed, 2);
    assert_eq!(snapshot(&db).await?, vec![expect("A", 1, 2, 0)]);
    Ok(())
}

#[tokio::test]
async fn deleting_shrinks_max_right_by_the_subtree_span() -> TestResult {
    let db = sqlite().await?;
    let tree = NestedSet::<node::Model>::new();
    let nodes = seed_wide(&tree, &db).await?;
    let b = fresh(&tree, &db, nodes[1].id).await?;

    let before = fresh(&tree, &db, nodes[0].id).await?.rgt;
    let removed = tree.delete(&db, &b).await?;
    let after = fresh(&tree, &db, nodes[0].id).await?.rgt;

    assert_eq!(removed, b.descendant_count() as u64 + 1);
    assert_eq!(before - after, b.interval().span());
    assert_eq!(node::Entity::find().count(&db).await?, 3);
    assert_invariants(&tree, &db).await?;
    Ok(())
}

#[tokio::test]
async fn moving_away_and_back_restores_boundaries() -> TestResult {
    let db = sqlite().await?;
    let tree = NestedSet::<node::Model>::new();
    let nodes = seed_wide(&tree, &db).await?;
    let (b, c, d, e) = (&nodes[1], &nodes[2], &nodes[3], &nodes[4]);
    let original = snapshot(&db).await?;
    assert_eq!(
        original,
        vec![
            expect("A", 1, 10, 0),
            expect("B", 2, 5, 1),
            expect("C", 6, 7, 1),
            expect("D", 8, 9, 1),
            expect("E", 3, 4, 2),
        ]
    );

    tree.make_child_of(&db, e, d).await?;
    assert_invariants(&tree, &db).await?;
    assert_ne!(snapshot(&db).await?, original);
    tree.make_child_of(&db, e, b).await?;
    assert_eq!(snapshot(&db).await?, original);

    tree.move_after(&db, b, d).await?;
    assert_eq!(
        snapshot(&db).await?,
        vec![
            expect("A", 1, 10, 0),
            expect("B", 6, 9, 1),
            expect("C", 2, 3, 1),
            expect("D", 4, 5, 1),
            expect("E", 7, 8, 2),
        ]
    );
    tree.move_before(&db, b, c).await?;
    assert_eq!(snapshot(&db).await?, original);
    Ok(())
}

#[tokio::test]
async fn make_child_of_places_the_node_last() -> TestResult {
    let db = sqlite().await?;
    let tree = NestedSet::<node::Model>::new();
    let (a, b, _) = seed_abc(&tree, &db).await?;

    assert_eq!(tree.make_child_of(&db, &b, &a).await?, MoveOutcome::Moved);
    assert_eq!(
        snapshot(&db).await?,
        vec![expect("A", 1, 6, 0), expect("B", 4, 5, 1), expect("C", 2, 3, 1)]
    );
    Ok(())
}

#[tokio::test]
async fn moves_to_the_current_position_are_skipped() -> TestResult {
    let db = sqlite().await?;
    let tree = NestedSet::<node::Model>::new();
    let (a, b, c) = seed_abc(&tree, &db).await?;
    let before = snapshot(&db).await?;

    assert_eq!(tree.move_before(&db, &b, &c).await?, MoveOutcome::Unchanged);
    assert_eq!(tree.move_after(&db, &c, &b).await?, MoveOutcome::Unchanged);
    assert_eq!(tree.make_child_of(&db, &c, &a).await?, MoveOutcome::Unchanged);
    assert_eq!(tree.make_root(&db, &a).await?, MoveOutcome::Unchanged);

    assert_eq!(snapshot(&db).await?, before);
    Ok(())
}

#[tokio::test]
async fn move_left_and_right_swap_adjacent_siblings() -> TestResult {
    let db = sqlite().await?;
    let tree = NestedSet::<node::Model>::new();
    let (_, b, _) = seed_abc(&tree, &db).await?;
    let original = snapshot(&db).await?;

    assert_eq!(tree.move_right(&db, &b).await?, MoveOutcome::Moved);
    assert_eq!(
        snapshot(&db).await?,
        vec![expect("A", 1, 6, 0), expect("B", 4, 5, 1), expect("C", 2, 3, 1)]
    );

    assert_eq!(tree.move_left(&db, &b).await?, MoveOutcome::Moved);
    assert_eq!(snapshot(&db).await?, original);
    Ok(())
}

#[tokio::test]
async fn make_root_detaches_after_the_current_root() -> TestResult {
    let db = sqlite().await?;
    let tree = NestedSet::<node::Model>::new();
    let (a, b, _) = seed_abc(&tree, &db).await?;

    assert_eq!(tree.make_root(&db, &b).await?, MoveOutcome::Moved);

    assert_eq!(
        snapshot(&db).await?,
        vec![expect("A", 1, 4, 0), expect("B", 5, 6, 0), expect("C", 2, 3, 1)]
    );
    assert!(fresh(&tree, &db, b.id).await?.is_root());
    assert_eq!(names(tree.roots().all(&db).await?), vec!["A", "B"]);
    assert_eq!(names(tree.children_of(&a.id).all(&db).await?), vec!["C"]);
    assert_invariants(&tree, &db).await?;
    Ok(())
}

#[tokio::test]
async fn invalid_moves_are_rejected_without_changes() -> TestResult {
    let db = sqlite().await?;
    let tree = NestedSet::<node::Model>::new();
    let (a, b, c) = seed_abc(&tree, &db).await?;
    let before = snapshot(&db).await?;

    let to_self = tree.make_child_of(&db, &b, &b).await;
    assert!(matches!(
        to_self,
        Err(NestedSetError::InvalidMove(InvalidMove::ToSelf))
    ));

    let into_subtree = tree.make_child_of(&db, &a, &b).await;
    assert!(matches!(
        into_subtree,
        Err(NestedSetError::InvalidMove(InvalidMove::IntoOwnSubtree))
    ));

    let ghost = node::Model {
        id: 999,
        parent_id: None,
        name: "ghost".to_owned(),
        lft: 40,
        rgt: 41,
        depth: 0,
    };
    let unsaved = tree.make_child_of(&db, &ghost, &a).await;
    assert!(matches!(
        unsaved,
        Err(NestedSetError::InvalidMove(InvalidMove::NotPersisted))
    ));

    assert_eq!(snapshot(&db).await?, before);
    assert!(matches!(
        tree.move_left(&db, &b).await,
        Err(NestedSetError::NoFurtherSibling(Position::Left))
    ));
    assert!(matches!(
        tree.move_right(&db, &c).await,
        Err(NestedSetError::NoFurtherSibling(Position::Right))
    ));
    assert!(matches!(
        tree.move_to_id(&db, &c, &999, Position::Child).await,
        Err(NestedSetError::UnresolvedTarget)
    ));
    assert!(matches!(
        tree.move_to_id(&db, &c, &999, Position::Left).await,
        Err(NestedSetError::NoFurtherSibling(Position::Left))
    ));
    assert!(matches!(
        "above".parse::<Position>(),
        Err(InvalidMove::UnknownPosition(token)) if token == "above"
    ));

    assert_eq!(snapshot(&db).await?, before);
    Ok(())
}

#[tokio::test]
async fn moving_a_subtree_rewrites_depths() -> TestResult {
    let db = sqlite().await?;
    let tree = NestedSet::<node::Model>::new();
    let nodes = seed_wide(&tree, &db).await?;
    let (b, d) = (&nodes[1], &nodes[3]);

    tree.make_child_of(&db, b, d).await?;

    assert_eq!(
        snapshot(&db).await?,
        vec![
            expect("A", 1, 10, 0),
            expect("B", 5, 8, 2),
            expect("C", 2, 3, 1),
            expect("D", 4, 9, 1),
            expect("E", 6, 7, 3),
        ]
    );

    tree.make_root(&db, d).await?;
    assert_eq!(
        snapshot(&db).await?,
        vec![
            expect("A", 1, 4, 0),
            expect("B", 6, 9, 1),
            expect("C", 2, 3, 1),
            expect("D", 5, 10, 0),
            expect("E", 7, 8, 2),
        ]
    );
    assert_invariants(&tree, &db).await?;
    Ok(())
}

#[tokio::test]
async fn range_queries_follow_the_boundaries() -> TestResult {
    let db = sqlite().await?;
    let tree = NestedSet::<node::Model>::new();
    let nodes = seed_wide(&tree, &db).await?;
    let a = fresh(&tree, &db, nodes[0].id).await?;
    let b = fresh(&tree, &db, nodes[1].id).await?;
    let c = fresh(&tree, &db, nodes[2].id).await?;
    let e = fresh(&tree, &db, nodes[4].id).await?;

    assert_eq!(names(tree.query().all(&db).await?), vec!["A", "B", "E", "C", "D"]);
    assert_eq!(names(tree.roots().all(&db).await?), vec!["A"]);
    assert_eq!(names(tree.children_of(&a.id).all(&db).await?), vec!["B", "C", "D"]);
    assert_eq!(names(tree.parent_of(&e.id).all(&db).await?), vec!["B"]);
    assert!(tree.parent_of(&a.id).one(&db).await?.is_none());
    assert_eq!(names(tree.ancestors_of(&e).all(&db).await?), vec!["A", "B"]);
    assert_eq!(
        names(tree.descendants_of(&a).all(&db).await?),
        vec!["B", "E", "C", "D"]
    );
    assert_eq!(names(tree.siblings_of(&c).all(&db).await?), vec!["B", "D"]);
    assert_eq!(names(tree.leaves().all(&db).await?), vec!["E", "C", "D"]);

    assert_eq!(tree.root_of(&db, &e).await?.map(|root| root.name), Some("A".into()));
    assert!(tree.root_of(&db, &a).await?.is_none());
    assert_eq!(tree.left_sibling(&db, &c).await?.map(|n| n.name), Some("B".into()));
    assert_eq!(tree.right_sibling(&db, &c).await?.map(|n| n.name), Some("D".into()));
    assert!(tree.left_sibling(&db, &b).await?.is_none());

    assert!(a.is_ancestor_of(&e));
    assert!(e.is_descendant_of(&a));
    assert!(!c.is_descendant_of(&b));
    assert_eq!(a.descendant_count(), 4);

    let forest = tree.all_nested(&db).await?;
    assert_eq!(forest.len(), 1);
    assert_eq!(forest[0].node.name, "A");
    assert_eq!(forest[0].descendant_count(), 4);
    assert_eq!(forest[0].children[0].children[0].node.name, "E");
    Ok(())
}

#[tokio::test]
async fn reset_tree_nesting_repairs_corrupted_boundaries() -> TestResult {
    let db = sqlite().await?;
    let tree = NestedSet::<node::Model>::new();
    let (a, _, c) = seed_abc(&tree, &db).await?;
    let healthy = snapshot(&db).await?;

    node::Entity::update_many()
        .col_expr(node::Column::Rgt, Expr::value(99))
        .filter(node::Column::Id.eq(a.id))
        .exec(&db)
        .await?;
    node::Entity::update_many()
        .col_expr(node::Column::Depth, Expr::value(5))
        .filter(node::Column::Id.eq(c.id))
        .exec(&db)
        .await?;

    let report = tree.reset_tree_nesting(&db).await?;
    assert_eq!((report.nodes, report.updated, report.unreachable), (3, 2, 0));
    assert_eq!(snapshot(&db).await?, healthy);

    let again = tree.reset_tree_nesting(&db).await?;
    assert_eq!(again.updated, 0);
    assert_eq!(snapshot(&db).await?, healthy);
    Ok(())
}

#[tokio::test]
async fn reset_tree_nesting_rebuilds_from_parent_references() -> TestResult {
    let db = sqlite().await?;
    let tree = NestedSet::<node::Model>::new();
    let (_, b, c) = seed_abc(&tree, &db).await?;

    // Re-parent behind the engine's back.
    node::Entity::update_many()
        .col_expr(node::Column::ParentId, Expr::value(b.id))
        .filter(node::Column::Id.eq(c.id))
        .exec(&db)
        .await?;

    tree.reset_tree_nesting(&db).await?;

    assert_eq!(
        snapshot(&db).await?,
        vec![expect("A", 1, 6, 0), expect("B", 2, 5, 1), expect("C", 3, 4, 2)]
    );
    assert_invariants(&tree, &db).await?;
    Ok(())
}

#[tokio::test]
async fn orphans_are_promoted_and_then_renested() -> TestResult {
    let db = sqlite().await?;
    let tree = NestedSet::<node::Model>::new();
    seed_abc(&tree, &db).await?;

    let orphan = node::ActiveModel {
        parent_id: Set(Some(999)),
        name: Set("orphan".to_owned()),
        lft: Set(200),
        rgt: Set(201),
        depth: Set(3),
        ..Default::default()
    }
    .insert(&db)
    .await?;

    let report = tree.reset_tree_nesting(&db).await?;
    assert_eq!((report.nodes, report.unreachable), (4, 1));

    assert_eq!(tree.reset_tree_orphans(&db).await?, 1);
    let promoted = fresh(&tree, &db, orphan.id).await?;
    assert_eq!(promoted.parent_id, None);
    assert_eq!((promoted.lft, promoted.rgt, promoted.depth), (200, 201, 3));
    assert_eq!(tree.reset_tree_orphans(&db).await?, 0);

    let report = tree.reset_tree_nesting(&db).await?;
    assert_eq!((report.updated, report.unreachable), (1, 0));
    assert_eq!(
        snapshot(&db).await?,
        vec![
            expect("A", 1, 6, 0),
            expect("B", 2, 3, 1),
            expect("C", 4, 5, 1),
            expect("orphan", 7, 8, 0),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn insert_ignores_caller_supplied_boundaries() -> TestResult {
    let db = sqlite().await?;
    let tree = NestedSet::<node::Model>::new();
    let (a, _, _) = seed_abc(&tree, &db).await?;

    let mut pending = pending_node("D", Some(a.id));
    pending.lft = Set(500);
    pending.rgt = Set(400);
    pending.depth = Set(9);
    let d = tree.insert(&db, pending).await?;

    assert_eq!((d.lft, d.rgt, d.depth), (6, 7, 1));
    assert_invariants(&tree, &db).await?;
    Ok(())
}

#[tokio::test]
async fn insert_under_missing_parent_rolls_back() -> TestResult {
    let db = sqlite().await?;
    let tree = NestedSet::<node::Model>::new();
    seed_abc(&tree, &db).await?;
    let before = snapshot(&db).await?;

    let result = tree.insert(&db, pending_node("D", Some(999))).await;

    assert!(matches!(result, Err(NestedSetError::UnresolvedTarget)));
    assert_eq!(snapshot(&db).await?, before);
    Ok(())
}

#[tokio::test]
async fn mysql_connections_are_rejected() -> TestResult {
    let db = MockDatabase::new(DbBackend::MySql).into_connection();
    let tree = NestedSet::<node::Model>::new();

    assert!(matches!(
        tree.insert(&db, pending_node("A", None)).await,
        Err(NestedSetError::UnsupportedBackend)
    ));
    assert!(matches!(
        tree.reset_tree_nesting(&db).await,
        Err(NestedSetError::UnsupportedBackend)
    ));
    assert!(db.into_transaction_log().is_empty());
    Ok(())
}
