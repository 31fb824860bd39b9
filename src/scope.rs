use sea_orm::Condition;

/// Extra constraint applied when resolving move targets and sibling or root
/// lookups for a node, e.g. restricting them to the node's own site.
pub trait TargetScope<M>: Send + Sync {
    fn constrain(&self, node: &M) -> Condition;
}

impl<M, F> TargetScope<M> for F
where
    F: Fn(&M) -> Condition + Send + Sync,
{
    fn constrain(&self, node: &M) -> Condition {
        self(node)
    }
}
