use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use crate::config::TableConfig;
use crate::error::{trap, ExternalPointerError};
use crate::table::ExternalPointerTable;

/// Identifies the addressing root of one execution context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct RootAddress(usize);

impl RootAddress {
    pub const fn new(raw: usize) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for RootAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

#[derive(Debug)]
pub struct ExecutionContext {
    root: RootAddress,
    external_pointer_table: ExternalPointerTable,
}

impl ExecutionContext {
    pub fn new(root: RootAddress, config: TableConfig) -> Self {
        Self {
            root,
            external_pointer_table: ExternalPointerTable::new(config),
        }
    }

    pub fn root(&self) -> RootAddress {
        self.root
    }

    pub fn external_pointer_table(&self) -> &ExternalPointerTable {
        &self.external_pointer_table
    }

    /// The handle sandboxed reads resolve this context through.
    pub fn cage_root(&self) -> CageRoot<'_, Self> {
        CageRoot::new(self, self.root)
    }
}

/// Maps an addressing root back to the context that owns it.
pub trait ContextResolver {
    /// Runs `f` against the context owning `root`. An unknown root is a
    /// sandbox violation and traps.
    ///
    /// Implementations may hold a lock while `f` runs. `f` must not register
    /// or unregister contexts on the same resolver.
    fn with_context<R>(&self, root: RootAddress, f: impl FnOnce(&ExecutionContext) -> R) -> R;
}

impl ContextResolver for ExecutionContext {
    fn with_context<R>(&self, root: RootAddress, f: impl FnOnce(&ExecutionContext) -> R) -> R {
        if root != self.root {
            trap(ExternalPointerError::UnknownRoot(root));
        }
        f(self)
    }
}

/// A root paired with the resolver that understands it.
#[derive(Debug)]
pub struct CageRoot<'r, R> {
    resolver: &'r R,
    root: RootAddress,
}

impl<R> Clone for CageRoot<'_, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for CageRoot<'_, R> {}

impl<'r, R: ContextResolver> CageRoot<'r, R> {
    pub fn new(resolver: &'r R, root: RootAddress) -> Self {
        Self { resolver, root }
    }

    pub fn root(&self) -> RootAddress {
        self.root
    }

    pub fn with_context<T>(&self, f: impl FnOnce(&ExecutionContext) -> T) -> T {
        self.resolver.with_context(self.root, f)
    }
}

/// Owns a set of contexts keyed by root.
///
/// Dropping a context through [`ContextRegistry::unregister`] drops its
/// table; indices issued by it become meaningless. Lookups hold the read lock
/// for the duration of the caller's closure, so calling `register` or
/// `unregister` from inside [`ContextResolver::with_context`] deadlocks.
#[derive(Debug, Default)]
pub struct ContextRegistry {
    contexts: RwLock<BTreeMap<RootAddress, ExecutionContext>>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, ctx: ExecutionContext) -> Result<RootAddress, ExternalPointerError> {
        let root = ctx.root();
        let mut contexts = self.contexts.write().unwrap_or_else(PoisonError::into_inner);
        if contexts.contains_key(&root) {
            return Err(ExternalPointerError::DuplicateRoot(root));
        }
        contexts.insert(root, ctx);
        tracing::debug!(%root, contexts = contexts.len(), "registered execution context");
        Ok(root)
    }

    pub fn unregister(&self, root: RootAddress) -> Option<ExecutionContext> {
        let mut contexts = self.contexts.write().unwrap_or_else(PoisonError::into_inner);
        let ctx = contexts.remove(&root);
        if ctx.is_some() {
            tracing::debug!(%root, contexts = contexts.len(), "unregistered execution context");
        }
        ctx
    }

    pub fn len(&self) -> usize {
        self.contexts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn cage_root(&self, root: RootAddress) -> CageRoot<'_, Self> {
        CageRoot::new(self, root)
    }
}

impl ContextResolver for ContextRegistry {
    fn with_context<R>(&self, root: RootAddress, f: impl FnOnce(&ExecutionContext) -> R) -> R {
        let contexts = self.contexts.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(ctx) = contexts.get(&root) {
            return f(ctx);
        }
        drop(contexts);
        trap(ExternalPointerError::UnknownRoot(root))
    }
}
