use crc32fast::Hasher;

/// Static configuration describing how a SeaORM model is maintained as a
/// nested set.
///
/// A configuration is built once per record type and handed to
/// [`NestedSet`](crate::NestedSet) explicitly; nothing is cached globally.
#[derive(Clone, Debug)]
pub struct NestedSetConfig {
    entity_name: String,
    advisory_lock_strategy: AdvisoryLockStrategy,
}

impl NestedSetConfig {
    /// Create a new configuration for the logical entity name.
    pub fn new(entity_name: impl Into<String>) -> Self {
        Self {
            entity_name: entity_name.into(),
            advisory_lock_strategy: AdvisoryLockStrategy::Disabled,
        }
    }

    /// Merge options produced by [`NestedSetOptions`].
    pub(crate) fn apply_options(mut self, options: NestedSetOptions) -> Self {
        if let Some(entity_name) = options.entity_name {
            self.entity_name = entity_name;
        }
        if let Some(strategy) = options.advisory_lock_strategy {
            self.advisory_lock_strategy = strategy;
        }
        self
    }

    /// Enable a namespaced advisory lock keyed on the entity name.
    pub fn with_namespaced_lock(mut self) -> Self {
        self.advisory_lock_strategy = AdvisoryLockStrategy::namespaced(&self.entity_name);
        self
    }

    /// Logical entity name, used for logging and lock derivation.
    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    /// Advisory lock strategy (PostgreSQL only).
    pub fn advisory_lock_strategy(&self) -> &AdvisoryLockStrategy {
        &self.advisory_lock_strategy
    }
}

/// Builder-style overrides applied on top of a model's default configuration.
#[derive(Clone, Debug, Default)]
pub struct NestedSetOptions {
    entity_name: Option<String>,
    advisory_lock_strategy: Option<AdvisoryLockStrategy>,
}

impl NestedSetOptions {
    pub fn entity_name(mut self, value: impl Into<String>) -> Self {
        self.entity_name = Some(value.into());
        self
    }

    pub fn advisory_lock_strategy(mut self, strategy: AdvisoryLockStrategy) -> Self {
        self.advisory_lock_strategy = Some(strategy);
        self
    }

    pub fn apply(self, base: NestedSetConfig) -> NestedSetConfig {
        base.apply_options(self)
    }
}

/// Key used for PostgreSQL advisory locks.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct AdvisoryLockKey(String);

impl AdvisoryLockKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    fn derived_from(entity: &str) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(entity.as_bytes());
        let crc = hasher.finalize();
        Self(format!("nested-set::{entity}::{crc:x}"))
    }
}

/// Configuration describing how to serialize structural mutations.
///
/// The engine relies on the store's transaction isolation. Concurrent moves
/// or cascades over overlapping subtrees are only safe when a lock is taken,
/// which is what `Namespaced` does on PostgreSQL. Other backends ignore it.
#[derive(Clone, Debug, Eq, PartialEq, Default)]
pub enum AdvisoryLockStrategy {
    #[default]
    Disabled,
    Namespaced(AdvisoryLockKey),
}

impl AdvisoryLockStrategy {
    /// Namespaced strategy with a key derived from the entity name.
    pub fn namespaced(entity: &str) -> Self {
        Self::Namespaced(AdvisoryLockKey::derived_from(entity))
    }

    pub fn key(&self) -> Option<&AdvisoryLockKey> {
        match self {
            AdvisoryLockStrategy::Disabled => None,
            AdvisoryLockStrategy::Namespaced(key) => Some(key),
        }
    }
}
