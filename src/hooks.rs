//! Fixed lifecycle stages and ordered hook lists.
//!
//! The owning record layer dispatches [`LifecycleEvent`]s through a
//! [`HookRegistry`]; the tree engine registers [`TreeHook`] (and
//! [`SoftTreeHook`] for tombstoned models) at the stages it cares about.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, DbErr, EntityTrait,
    QueryFilter, TransactionTrait,
};
use tracing::{debug, instrument};

use crate::config::AdvisoryLockStrategy;
use crate::error::NestedSetError;
use crate::lock::LockedTransaction;
use crate::repository::NestedSet;
use crate::traits::{HasTombstone, NestedSetModel, NodeRecord};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum LifecycleStage {
    BeforeCreate,
    BeforeSave,
    AfterSave,
    BeforeDelete,
    BeforeRestore,
    AfterRestore,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DeleteMode {
    Hard,
    Soft,
}

/// Payload handed to hooks; each variant belongs to exactly one stage.
pub enum LifecycleEvent<'a, M>
where
    M: NodeRecord,
{
    /// Runs before both inserts and updates; `stored` is `None` for inserts.
    Saving {
        stored: Option<&'a M>,
        pending: &'a mut M::ActiveModel,
    },
    Creating(&'a mut M::ActiveModel),
    Saved {
        previous: Option<&'a M>,
        current: &'a M,
    },
    Deleting {
        node: &'a M,
        mode: DeleteMode,
    },
    Restoring(&'a M),
    Restored(&'a M),
}

impl<M> LifecycleEvent<'_, M>
where
    M: NodeRecord,
{
    pub fn stage(&self) -> LifecycleStage {
        match self {
            LifecycleEvent::Saving { .. } => LifecycleStage::BeforeSave,
            LifecycleEvent::Creating(_) => LifecycleStage::BeforeCreate,
            LifecycleEvent::Saved { .. } => LifecycleStage::AfterSave,
            LifecycleEvent::Deleting { .. } => LifecycleStage::BeforeDelete,
            LifecycleEvent::Restoring(_) => LifecycleStage::BeforeRestore,
            LifecycleEvent::Restored(_) => LifecycleStage::AfterRestore,
        }
    }
}

#[async_trait]
pub trait LifecycleHook<M>: Send + Sync
where
    M: NodeRecord,
{
    async fn handle(
        &self,
        txn: &DatabaseTransaction,
        event: &mut LifecycleEvent<'_, M>,
    ) -> Result<(), NestedSetError>;
}

/// Ordered hook lists per stage, plus the record operations dispatching them.
pub struct HookRegistry<M>
where
    M: NodeRecord,
{
    stages: HashMap<LifecycleStage, Vec<Arc<dyn LifecycleHook<M>>>>,
}

impl<M> Default for HookRegistry<M>
where
    M: NodeRecord,
{
    fn default() -> Self {
        Self {
            stages: HashMap::new(),
        }
    }
}

impl<M> HookRegistry<M>
where
    M: NodeRecord,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `hook` to the list for `stage`.
    pub fn register(&mut self, stage: LifecycleStage, hook: Arc<dyn LifecycleHook<M>>) {
        self.stages.entry(stage).or_default().push(hook);
    }

    pub fn hooks(&self, stage: LifecycleStage) -> &[Arc<dyn LifecycleHook<M>>] {
        self.stages.get(&stage).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Run the hooks registered for the event's stage, in registration order.
    /// The first failure stops the dispatch.
    pub async fn dispatch(
        &self,
        txn: &DatabaseTransaction,
        event: &mut LifecycleEvent<'_, M>,
    ) -> Result<(), NestedSetError> {
        let stage = event.stage();
        for hook in self.hooks(stage) {
            hook.handle(txn, event).await?;
        }
        Ok(())
    }

    /// Insert a record: `BeforeSave`, `BeforeCreate`, insert, `AfterSave`.
    #[instrument(level = "debug", skip_all)]
    pub async fn insert<C>(&self, conn: &C, active: M::ActiveModel) -> Result<M, NestedSetError>
    where
        C: TransactionTrait,
    {
        let guard = LockedTransaction::acquire(&AdvisoryLockStrategy::Disabled, conn).await?;
        let result = self.insert_on(guard.connection(), active).await;
        guard.finish(result).await
    }

    async fn insert_on(
        &self,
        txn: &DatabaseTransaction,
        mut active: M::ActiveModel,
    ) -> Result<M, NestedSetError> {
        self.dispatch(
            txn,
            &mut LifecycleEvent::Saving {
                stored: None,
                pending: &mut active,
            },
        )
        .await?;
        self.dispatch(txn, &mut LifecycleEvent::Creating(&mut active))
            .await?;

        let created = active.insert(txn).await?;
        self.dispatch(
            txn,
            &mut LifecycleEvent::Saved {
                previous: None,
                current: &created,
            },
        )
        .await?;

        reload(txn, &created.id()).await
    }

    /// Update a stored record: `BeforeSave`, update, `AfterSave`.
    #[instrument(level = "debug", skip_all)]
    pub async fn update<C>(&self, conn: &C, active: M::ActiveModel) -> Result<M, NestedSetError>
    where
        C: TransactionTrait,
    {
        let guard = LockedTransaction::acquire(&AdvisoryLockStrategy::Disabled, conn).await?;
        let result = self.update_on(guard.connection(), active).await;
        guard.finish(result).await
    }

    async fn update_on(
        &self,
        txn: &DatabaseTransaction,
        mut active: M::ActiveModel,
    ) -> Result<M, NestedSetError> {
        let id = M::active_id(&active).ok_or_else(|| {
            DbErr::RecordNotFound("cannot update a record without a primary key".to_owned())
        })?;
        let stored = reload(txn, &id).await?;

        self.dispatch(
            txn,
            &mut LifecycleEvent::Saving {
                stored: Some(&stored),
                pending: &mut active,
            },
        )
        .await?;

        let updated = active.update(txn).await?;
        self.dispatch(
            txn,
            &mut LifecycleEvent::Saved {
                previous: Some(&stored),
                current: &updated,
            },
        )
        .await?;

        reload(txn, &id).await
    }

    /// Hard-delete a record after its `BeforeDelete` hooks ran.
    #[instrument(level = "debug", skip_all)]
    pub async fn delete<C>(&self, conn: &C, node: &M) -> Result<(), NestedSetError>
    where
        C: TransactionTrait,
    {
        let guard = LockedTransaction::acquire(&AdvisoryLockStrategy::Disabled, conn).await?;
        let result = self.delete_on(guard.connection(), node).await;
        guard.finish(result).await
    }

    async fn delete_on(&self, txn: &DatabaseTransaction, node: &M) -> Result<(), NestedSetError> {
        self.dispatch(
            txn,
            &mut LifecycleEvent::Deleting {
                node,
                mode: DeleteMode::Hard,
            },
        )
        .await?;

        M::Entity::delete_many()
            .filter(M::id_column().eq(M::id_to_value(&node.id())))
            .exec(txn)
            .await?;
        Ok(())
    }
}

impl<M> HookRegistry<M>
where
    M: NestedSetModel + HasTombstone,
{
    /// Tombstone a record after its soft `BeforeDelete` hooks ran.
    #[instrument(level = "debug", skip_all)]
    pub async fn soft_delete<C>(
        &self,
        conn: &C,
        tree: &NestedSet<M>,
        node: &M,
    ) -> Result<(), NestedSetError>
    where
        C: TransactionTrait,
    {
        let guard = LockedTransaction::acquire(&AdvisoryLockStrategy::Disabled, conn).await?;
        let result = self.soft_delete_on(guard.connection(), tree, node).await;
        guard.finish(result).await
    }

    async fn soft_delete_on(
        &self,
        txn: &DatabaseTransaction,
        tree: &NestedSet<M>,
        node: &M,
    ) -> Result<(), NestedSetError> {
        self.dispatch(
            txn,
            &mut LifecycleEvent::Deleting {
                node,
                mode: DeleteMode::Soft,
            },
        )
        .await?;
        tree.tombstone_row(txn, &node.id()).await?;
        Ok(())
    }

    /// Clear a record's tombstone between its `BeforeRestore` and
    /// `AfterRestore` hooks.
    #[instrument(level = "debug", skip_all)]
    pub async fn restore<C>(
        &self,
        conn: &C,
        tree: &NestedSet<M>,
        node: &M,
    ) -> Result<M, NestedSetError>
    where
        C: TransactionTrait,
    {
        let guard = LockedTransaction::acquire(&AdvisoryLockStrategy::Disabled, conn).await?;
        let result = self.restore_on(guard.connection(), tree, node).await;
        guard.finish(result).await
    }

    async fn restore_on(
        &self,
        txn: &DatabaseTransaction,
        tree: &NestedSet<M>,
        node: &M,
    ) -> Result<M, NestedSetError> {
        self.dispatch(txn, &mut LifecycleEvent::Restoring(node))
            .await?;
        tree.clear_tombstone(txn, &node.id()).await?;

        let restored = reload(txn, &node.id()).await?;
        self.dispatch(txn, &mut LifecycleEvent::Restored(&restored))
            .await?;
        Ok(restored)
    }
}

async fn reload<M, C>(conn: &C, id: &M::Id) -> Result<M, NestedSetError>
where
    M: NodeRecord,
    C: ConnectionTrait,
{
    let model = M::Entity::find()
        .filter(M::id_column().eq(M::id_to_value(id)))
        .one(conn)
        .await?;
    model.ok_or_else(|| DbErr::RecordNotFound(format!("{id:?}")).into())
}

/// Tree maintenance for record saves and hard deletes.
pub struct TreeHook<M>
where
    M: NestedSetModel,
{
    tree: NestedSet<M>,
}

impl<M> TreeHook<M>
where
    M: NestedSetModel,
{
    pub fn new(tree: NestedSet<M>) -> Self {
        Self { tree }
    }
}

#[async_trait]
impl<M> LifecycleHook<M> for TreeHook<M>
where
    M: NestedSetModel,
{
    async fn handle(
        &self,
        txn: &DatabaseTransaction,
        event: &mut LifecycleEvent<'_, M>,
    ) -> Result<(), NestedSetError> {
        match event {
            // Boundaries are engine-managed; a save never writes them.
            LifecycleEvent::Saving { pending, .. } => {
                M::clear_boundaries(pending);
                Ok(())
            }
            LifecycleEvent::Creating(pending) => {
                self.tree.place_as_new_leaf(txn, pending).await?;
                Ok(())
            }
            LifecycleEvent::Saved { previous, current } => {
                let parent_changed = match *previous {
                    Some(previous) => previous.parent_id() != current.parent_id(),
                    None => current.parent_id().is_some(),
                };
                if parent_changed {
                    debug!(node = ?current.id(), parent = ?current.parent_id(), "parent changed");
                    self.tree.move_to_new_parent(txn, *current).await?;
                }
                Ok(())
            }
            LifecycleEvent::Deleting {
                node,
                mode: DeleteMode::Hard,
            } => {
                self.tree.delete_descendants(txn, *node).await?;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Tree maintenance for soft deletes and restores.
pub struct SoftTreeHook<M>
where
    M: NestedSetModel + HasTombstone,
{
    tree: NestedSet<M>,
}

impl<M> SoftTreeHook<M>
where
    M: NestedSetModel + HasTombstone,
{
    pub fn new(tree: NestedSet<M>) -> Self {
        Self { tree }
    }
}

#[async_trait]
impl<M> LifecycleHook<M> for SoftTreeHook<M>
where
    M: NestedSetModel + HasTombstone,
{
    async fn handle(
        &self,
        txn: &DatabaseTransaction,
        event: &mut LifecycleEvent<'_, M>,
    ) -> Result<(), NestedSetError> {
        match event {
            LifecycleEvent::Deleting {
                node,
                mode: DeleteMode::Soft,
            } => {
                self.tree.soft_delete_descendants(txn, *node).await?;
            }
            LifecycleEvent::Restoring(node) => {
                self.tree.shift_siblings_for_restore(txn, *node).await?;
            }
            LifecycleEvent::Restored(node) => {
                self.tree.restore_descendants(txn, *node).await?;
            }
            _ => {}
        }
        Ok(())
    }
}

impl<M> NestedSet<M>
where
    M: NestedSetModel,
{
    /// Register [`TreeHook`] at `BeforeSave`, `BeforeCreate`, `AfterSave` and
    /// `BeforeDelete`.
    pub fn register_hooks(&self, registry: &mut HookRegistry<M>) {
        let hook: Arc<dyn LifecycleHook<M>> = Arc::new(TreeHook::new(self.clone()));
        for stage in [
            LifecycleStage::BeforeSave,
            LifecycleStage::BeforeCreate,
            LifecycleStage::AfterSave,
            LifecycleStage::BeforeDelete,
        ] {
            registry.register(stage, Arc::clone(&hook));
        }
    }
}

impl<M> NestedSet<M>
where
    M: NestedSetModel + HasTombstone,
{
    /// [`register_hooks`](Self::register_hooks) plus [`SoftTreeHook`] at
    /// `BeforeDelete`, `BeforeRestore` and `AfterRestore`.
    pub fn register_soft_delete_hooks(&self, registry: &mut HookRegistry<M>) {
        self.register_hooks(registry);

        let hook: Arc<dyn LifecycleHook<M>> = Arc::new(SoftTreeHook::new(self.clone()));
        for stage in [
            LifecycleStage::BeforeDelete,
            LifecycleStage::BeforeRestore,
            LifecycleStage::AfterRestore,
        ] {
            registry.register(stage, Arc::clone(&hook));
        }
    }
}
