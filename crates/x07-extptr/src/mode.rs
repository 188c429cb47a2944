use crate::context::{CageRoot, ContextResolver, ExecutionContext};
use crate::error::{trap, ExternalPointerError};
use crate::memory::{Address, ExternalPointer, ExternalPointerSlot};
use crate::table::ExternalPointerIndex;
use crate::tag::{decode, encode, ExternalPointerTag};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModeKind {
    Sandboxed,
    Direct,
}

impl ModeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ModeKind::Sandboxed => "sandboxed",
            ModeKind::Direct => "direct",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "sandboxed" => Some(ModeKind::Sandboxed),
            "direct" => Some(ModeKind::Direct),
            _ => None,
        }
    }

    /// True if heap fields never hold an off-sandbox address.
    pub fn confines_addresses(self) -> bool {
        matches!(self, ModeKind::Sandboxed)
    }
}

impl std::fmt::Display for ModeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Sandboxed {}
    impl Sealed for super::Direct {}
}

pub trait AddressingMode: sealed::Sealed {
    const KIND: ModeKind;

    /// Prepares `field` for a payload supplied later.
    fn init_empty(field: &mut ExternalPointerSlot<'_>, ctx: &ExecutionContext);

    fn init(
        field: &mut ExternalPointerSlot<'_>,
        ctx: &ExecutionContext,
        value: Address,
        tag: ExternalPointerTag,
    );

    /// Replaces the payload without changing what `field` is bound to.
    fn write(
        field: &mut ExternalPointerSlot<'_>,
        ctx: &ExecutionContext,
        value: Address,
        tag: ExternalPointerTag,
    );

    /// Turns a raw field word into an address.
    fn decode<R: ContextResolver>(
        cage: CageRoot<'_, R>,
        encoded: ExternalPointer,
        tag: ExternalPointerTag,
    ) -> Address;

    fn read<R: ContextResolver>(
        field: &ExternalPointerSlot<'_>,
        cage: CageRoot<'_, R>,
        tag: ExternalPointerTag,
    ) -> Address {
        Self::decode(cage, field.load(), tag)
    }

    /// Ends the field's binding and leaves it holding the null word.
    fn release(field: &mut ExternalPointerSlot<'_>, ctx: &ExecutionContext);
}

/// Fields hold a table index; the encoded address lives in the context's
/// table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Sandboxed;

impl AddressingMode for Sandboxed {
    const KIND: ModeKind = ModeKind::Sandboxed;

    fn init_empty(field: &mut ExternalPointerSlot<'_>, ctx: &ExecutionContext) {
        let index = ctx.external_pointer_table().allocate();
        field.store_unaligned(index.to_field_word());
    }

    fn init(
        field: &mut ExternalPointerSlot<'_>,
        ctx: &ExecutionContext,
        value: Address,
        tag: ExternalPointerTag,
    ) {
        let table = ctx.external_pointer_table();
        let index = table.allocate();
        table.set(index, encode(value, tag));
        field.store_unaligned(index.to_field_word());
    }

    fn write(
        field: &mut ExternalPointerSlot<'_>,
        ctx: &ExecutionContext,
        value: Address,
        tag: ExternalPointerTag,
    ) {
        let index = ExternalPointerIndex::from_field_word(field.load_unaligned());
        if index.is_null() {
            // Slot 0 is shared by every released field.
            trap(ExternalPointerError::NotAllocated { index: index.raw() });
        }
        ctx.external_pointer_table().set(index, encode(value, tag));
    }

    fn decode<R: ContextResolver>(
        cage: CageRoot<'_, R>,
        encoded: ExternalPointer,
        tag: ExternalPointerTag,
    ) -> Address {
        let index = ExternalPointerIndex::from_field_word(encoded);
        let entry = cage.with_context(|ctx| ctx.external_pointer_table().get(index));
        decode(entry, tag)
    }

    fn read<R: ContextResolver>(
        field: &ExternalPointerSlot<'_>,
        cage: CageRoot<'_, R>,
        tag: ExternalPointerTag,
    ) -> Address {
        Self::decode(cage, field.load_unaligned(), tag)
    }

    fn release(field: &mut ExternalPointerSlot<'_>, ctx: &ExecutionContext) {
        let index = ExternalPointerIndex::from_field_word(field.load_unaligned());
        if index.is_null() {
            return;
        }
        ctx.external_pointer_table().free(index);
        field.store_unaligned(ExternalPointerIndex::NULL.to_field_word());
    }
}

/// Fields hold the encoded address itself.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Direct;

impl AddressingMode for Direct {
    const KIND: ModeKind = ModeKind::Direct;

    fn init_empty(_field: &mut ExternalPointerSlot<'_>, _ctx: &ExecutionContext) {}

    fn init(
        field: &mut ExternalPointerSlot<'_>,
        _ctx: &ExecutionContext,
        value: Address,
        tag: ExternalPointerTag,
    ) {
        field.store(encode(value, tag));
    }

    fn write(
        field: &mut ExternalPointerSlot<'_>,
        _ctx: &ExecutionContext,
        value: Address,
        tag: ExternalPointerTag,
    ) {
        field.store(encode(value, tag));
    }

    fn decode<R: ContextResolver>(
        _cage: CageRoot<'_, R>,
        encoded: ExternalPointer,
        tag: ExternalPointerTag,
    ) -> Address {
        decode(encoded, tag)
    }

    fn release(field: &mut ExternalPointerSlot<'_>, _ctx: &ExecutionContext) {
        field.store(0);
    }
}

#[cfg(feature = "sandbox")]
pub type ConfiguredMode = Sandboxed;
#[cfg(not(feature = "sandbox"))]
pub type ConfiguredMode = Direct;

pub const fn configured_mode() -> ModeKind {
    <ConfiguredMode as AddressingMode>::KIND
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_names_parse_back() {
        for m in [ModeKind::Sandboxed, ModeKind::Direct] {
            assert_eq!(ModeKind::parse(m.as_str()), Some(m));
        }
        assert_eq!(ModeKind::parse("shared"), None);
    }

    #[test]
    fn configured_mode_follows_the_sandbox_feature() {
        assert_eq!(configured_mode().confines_addresses(), cfg!(feature = "sandbox"));
    }
}
