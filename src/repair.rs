use std::collections::{HashMap, HashSet};

use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseTransaction, EntityTrait, QueryFilter, TransactionTrait,
};
use tracing::{debug, info, instrument, warn};

use crate::error::NestedSetError;
use crate::repository::NestedSet;
use crate::traits::NestedSetModel;

/// Outcome of [`NestedSet::reset_tree_nesting`].
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct NestingReport {
    /// Live rows considered.
    pub nodes: usize,
    /// Rows whose `left`, `right` or `depth` were rewritten.
    pub updated: usize,
    /// Rows not reachable from any root through parent references.
    pub unreachable: usize,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct Placement {
    left: i32,
    right: i32,
    depth: i32,
}

enum Visit {
    Enter(usize, i32),
    Leave(usize),
}

impl<M> NestedSet<M>
where
    M: NestedSetModel,
{
    /// Rebuild `left`, `right` and `depth` from parent references alone.
    ///
    /// Roots and siblings keep their current relative order. Running it twice
    /// without parent changes in between writes nothing the second time.
    #[instrument(level = "debug", skip_all, fields(entity = %self.config().entity_name()))]
    pub async fn reset_tree_nesting<C>(&self, conn: &C) -> Result<NestingReport, NestedSetError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let guard = self.begin(conn).await?;
        let result = self.reset_tree_nesting_on(guard.connection()).await;
        guard.finish(result).await
    }

    async fn reset_tree_nesting_on(
        &self,
        txn: &DatabaseTransaction,
    ) -> Result<NestingReport, NestedSetError> {
        let rows = self.query().all(txn).await?;
        let placements = plan_nesting(&rows);

        let mut report = NestingReport {
            nodes: rows.len(),
            ..NestingReport::default()
        };

        for (row, placement) in rows.iter().zip(placements) {
            let Some(placement) = placement else {
                warn!(node = ?row.id(), "node is unreachable from any root, left untouched");
                report.unreachable += 1;
                continue;
            };

            let current = Placement {
                left: row.left(),
                right: row.right(),
                depth: row.depth(),
            };
            if current == placement {
                continue;
            }

            M::Entity::update_many()
                .col_expr(M::left_column(), Expr::value(placement.left))
                .col_expr(M::right_column(), Expr::value(placement.right))
                .col_expr(M::depth_column(), Expr::value(placement.depth))
                .filter(M::id_column().eq(M::id_to_value(&row.id())))
                .exec(txn)
                .await?;
            report.updated += 1;
        }

        info!(
            nodes = report.nodes,
            updated = report.updated,
            unreachable = report.unreachable,
            "tree nesting reset"
        );
        Ok(report)
    }

    /// Promote every node whose parent reference points at a missing row to a
    /// root. Boundaries are left as they are. Returns the number of promoted
    /// rows.
    #[instrument(level = "debug", skip_all, fields(entity = %self.config().entity_name()))]
    pub async fn reset_tree_orphans<C>(&self, conn: &C) -> Result<u64, NestedSetError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let guard = self.begin(conn).await?;
        let result = self.reset_tree_orphans_on(guard.connection()).await;
        guard.finish(result).await
    }

    async fn reset_tree_orphans_on(&self, txn: &DatabaseTransaction) -> Result<u64, NestedSetError> {
        // Tombstoned rows still count as existing parents.
        let rows = M::Entity::find().all(txn).await?;
        let ids: HashSet<M::Id> = rows.iter().map(|row| row.id()).collect();

        let orphans: Vec<_> = rows
            .iter()
            .filter(|row| matches!(row.parent_id(), Some(parent) if !ids.contains(&parent)))
            .map(|row| M::id_to_value(&row.id()))
            .collect();

        if orphans.is_empty() {
            debug!("no orphans found");
            return Ok(0);
        }

        let promoted = M::Entity::update_many()
            .col_expr(M::parent_column(), Expr::value(M::parent_to_value(None)))
            .filter(M::id_column().is_in(orphans))
            .exec(txn)
            .await?
            .rows_affected;

        warn!(promoted, "orphaned nodes promoted to roots");
        Ok(promoted)
    }
}

/// Depth-first numbering over parent references, one running counter for the
/// whole forest. `rows` must be ordered by their current `left`.
fn plan_nesting<M>(rows: &[M]) -> Vec<Option<Placement>>
where
    M: NestedSetModel,
{
    let mut children: HashMap<M::Id, Vec<usize>> = HashMap::new();
    let mut roots = Vec::new();

    for (index, row) in rows.iter().enumerate() {
        match row.parent_id() {
            Some(parent) => children.entry(parent).or_default().push(index),
            None => roots.push(index),
        }
    }

    let mut placements: Vec<Option<Placement>> = vec![None; rows.len()];
    let mut stack: Vec<Visit> = roots
        .iter()
        .rev()
        .map(|&index| Visit::Enter(index, 0))
        .collect();
    let mut counter = 1;

    while let Some(visit) = stack.pop() {
        match visit {
            Visit::Enter(index, depth) => {
                placements[index] = Some(Placement {
                    left: counter,
                    right: counter,
                    depth,
                });
                counter += 1;

                stack.push(Visit::Leave(index));
                if let Some(kids) = children.get(&rows[index].id()) {
                    stack.extend(kids.iter().rev().map(|&kid| Visit::Enter(kid, depth + 1)));
                }
            }
            Visit::Leave(index) => {
                if let Some(placement) = placements[index].as_mut() {
                    placement.right = counter;
                }
                counter += 1;
            }
        }
    }

    placements
}
