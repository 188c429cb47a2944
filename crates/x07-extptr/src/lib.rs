//! Sandboxed external pointers.
//!
//! Heap objects that live inside the sandbox refer to memory outside it
//! (native buffers, OS handles, foreign function targets) through external
//! pointer fields. With the `sandbox` feature those fields hold an index into
//! the owning context's [`ExternalPointerTable`] and never a raw address;
//! without it they hold the tag-encoded address directly.
//!
//! Build-time axes (cargo features):
//! - `sandbox`: index-indirected fields (default).
//! - `compress-pointers`: 4-byte tagged values; external pointer fields are
//!   accessed unaligned.
//! - `shared-cage`: one compression root for all contexts. Rejected together
//!   with `sandbox`, since a field's index is only meaningful per context.

#[cfg(all(feature = "sandbox", feature = "shared-cage"))]
compile_error!(
    "feature `sandbox` requires a per-context pointer compression cage; disable `shared-cage`"
);

pub mod config;
pub mod context;
pub mod error;
pub mod field;
pub mod memory;
pub mod mode;
pub mod table;
pub mod tag;

pub use config::TableConfig;
pub use context::{CageRoot, ContextRegistry, ContextResolver, ExecutionContext, RootAddress};
pub use error::{trap, ExternalPointerError};
pub use field::{
    decode_external_pointer, free_external_pointer_field, init_external_pointer_field,
    init_external_pointer_field_empty, read_external_pointer_field, write_external_pointer_field,
};
pub use memory::{Address, ExternalPointer, ExternalPointerSlot};
pub use mode::{configured_mode, AddressingMode, ConfiguredMode, Direct, ModeKind, Sandboxed};
pub use table::{ExternalPointerIndex, ExternalPointerTable, TableStats};
pub use tag::ExternalPointerTag;
