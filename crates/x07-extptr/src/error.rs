use crate::context::RootAddress;

/// Conditions that prove sandboxed memory can no longer be trusted.
///
/// None of these are recoverable for the owning context. The trapping
/// accessors route them through [`trap`]; the `try_*` accessors hand them back
/// so embedders and fuzzers can observe them without unwinding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExternalPointerError {
    #[error("external pointer index {index} out of range (capacity {capacity})")]
    OutOfRange { index: u32, capacity: u32 },

    #[error("external pointer index {index} is not allocated")]
    NotAllocated { index: u32 },

    #[error("external pointer table exhausted ({max_entries} entries)")]
    TableExhausted { max_entries: u32 },

    #[error("no execution context owns root {0}")]
    UnknownRoot(RootAddress),

    #[error("an execution context is already registered for root {0}")]
    DuplicateRoot(RootAddress),
}

impl ExternalPointerError {
    /// Stable identifier for logs.
    pub fn code(&self) -> &'static str {
        match self {
            ExternalPointerError::OutOfRange { .. } => "out_of_range",
            ExternalPointerError::NotAllocated { .. } => "not_allocated",
            ExternalPointerError::TableExhausted { .. } => "table_exhausted",
            ExternalPointerError::UnknownRoot(_) => "unknown_root",
            ExternalPointerError::DuplicateRoot(_) => "duplicate_root",
        }
    }
}

/// Aborts the current operation on a sandbox violation.
///
/// The panic unwinds out of the owning context's operation; callers must
/// treat that context as dead.
#[cold]
#[inline(never)]
pub fn trap(err: ExternalPointerError) -> ! {
    tracing::error!(code = err.code(), "sandbox violation: {err}");
    panic!("sandbox violation: {err}");
}
