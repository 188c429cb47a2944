//! External pointer field operations for the configured addressing mode.
//!
//! A read with the wrong tag returns a wrong address that is still confined to
//! what the context's table holds.

use crate::context::{CageRoot, ContextResolver, ExecutionContext};
use crate::memory::{Address, ExternalPointer, ExternalPointerSlot};
use crate::mode::{AddressingMode, ConfiguredMode};
use crate::tag::ExternalPointerTag;

#[inline]
pub fn init_external_pointer_field_empty(
    field: &mut ExternalPointerSlot<'_>,
    ctx: &ExecutionContext,
) {
    ConfiguredMode::init_empty(field, ctx)
}

#[inline]
pub fn init_external_pointer_field(
    field: &mut ExternalPointerSlot<'_>,
    ctx: &ExecutionContext,
    value: Address,
    tag: ExternalPointerTag,
) {
    ConfiguredMode::init(field, ctx, value, tag)
}

#[inline]
pub fn write_external_pointer_field(
    field: &mut ExternalPointerSlot<'_>,
    ctx: &ExecutionContext,
    value: Address,
    tag: ExternalPointerTag,
) {
    ConfiguredMode::write(field, ctx, value, tag)
}

#[inline]
pub fn read_external_pointer_field<R: ContextResolver>(
    field: &ExternalPointerSlot<'_>,
    cage: CageRoot<'_, R>,
    tag: ExternalPointerTag,
) -> Address {
    ConfiguredMode::read(field, cage, tag)
}

#[inline]
pub fn decode_external_pointer<R: ContextResolver>(
    cage: CageRoot<'_, R>,
    encoded: ExternalPointer,
    tag: ExternalPointerTag,
) -> Address {
    ConfiguredMode::decode(cage, encoded, tag)
}

/// Releases whatever `field` is bound to. A field holding the null word is
/// left alone.
#[inline]
pub fn free_external_pointer_field(field: &mut ExternalPointerSlot<'_>, ctx: &ExecutionContext) {
    ConfiguredMode::release(field, ctx)
}
