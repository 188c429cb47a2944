use x07_extptr::{
    configured_mode, free_external_pointer_field, init_external_pointer_field,
    init_external_pointer_field_empty, read_external_pointer_field, write_external_pointer_field,
    AddressingMode, ContextRegistry, ContextResolver, ExecutionContext, ExternalPointerIndex,
    ExternalPointerSlot, ExternalPointerTag, ModeKind, RootAddress, Sandboxed, TableConfig,
};

#[repr(C, align(8))]
struct Object([u8; 24]);

impl Object {
    fn new() -> Self {
        Object([0; 24])
    }

    fn field(&mut self) -> ExternalPointerSlot<'_> {
        ExternalPointerSlot::in_bytes(&mut self.0, 8).expect("field in bounds")
    }
}

fn config() -> TableConfig {
    TableConfig {
        entries_per_segment: 16,
        max_entries: 256,
    }
}

#[test]
fn configured_field_operations_round_trip() {
    let reg = ContextRegistry::new();
    let root = reg
        .register(ExecutionContext::new(RootAddress::new(0xa000), config()))
        .unwrap();
    let tag = ExternalPointerTag::NativeBufferData;

    let mut obj = Object::new();
    reg.with_context(root, |ctx| {
        let mut field = obj.field();
        init_external_pointer_field_empty(&mut field, ctx);
        write_external_pointer_field(&mut field, ctx, 0xc0ffee, tag);
    });
    assert_eq!(
        read_external_pointer_field(&obj.field(), reg.cage_root(root), tag),
        0xc0ffee
    );

    reg.with_context(root, |ctx| {
        write_external_pointer_field(&mut obj.field(), ctx, 0xdecaf, tag);
    });
    assert_eq!(
        read_external_pointer_field(&obj.field(), reg.cage_root(root), tag),
        0xdecaf
    );

    let live = reg.with_context(root, |ctx| ctx.external_pointer_table().live_entries());
    match configured_mode() {
        ModeKind::Sandboxed => assert_eq!(live, 1),
        ModeKind::Direct => assert_eq!(live, 0),
    }

    reg.with_context(root, |ctx| free_external_pointer_field(&mut obj.field(), ctx));
    let live = reg.with_context(root, |ctx| ctx.external_pointer_table().live_entries());
    assert_eq!(live, 0);
}

#[test]
fn sandboxed_heaps_never_hold_the_address() {
    let ctx = ExecutionContext::new(RootAddress::new(0xb000), config());
    let secret = 0x5eed_f00d;
    let mut objects: Vec<Object> = (0..40).map(|_| Object::new()).collect();
    for (n, obj) in objects.iter_mut().enumerate() {
        Sandboxed::init(&mut obj.field(), &ctx, secret + n, ExternalPointerTag::OsHandle);
    }

    let capacity = ctx.external_pointer_table().capacity() as usize;
    for (n, obj) in objects.iter_mut().enumerate() {
        let word = obj.field().load_unaligned();
        assert!(word < capacity, "field holds {word:#x}, not an index");
        assert_ne!(word, secret + n);
        assert_eq!(
            Sandboxed::read(&obj.field(), ctx.cage_root(), ExternalPointerTag::OsHandle),
            secret + n
        );
    }
}

#[test]
fn indices_only_mean_something_in_their_own_context() {
    let reg = ContextRegistry::new();
    let a = reg
        .register(ExecutionContext::new(RootAddress::new(0x1000), config()))
        .unwrap();
    let b = reg
        .register(ExecutionContext::new(RootAddress::new(0x2000), config()))
        .unwrap();
    let tag = ExternalPointerTag::ForeignAddress;

    let mut in_a = Object::new();
    let mut in_b = Object::new();
    reg.with_context(a, |ctx| Sandboxed::init(&mut in_a.field(), ctx, 0xaaaa0, tag));
    reg.with_context(b, |ctx| Sandboxed::init(&mut in_b.field(), ctx, 0xbbbb0, tag));

    // Both fields hold index 1, each resolved through its own table.
    assert_eq!(in_a.field().load_unaligned(), 1);
    assert_eq!(in_b.field().load_unaligned(), 1);
    assert_eq!(Sandboxed::read(&in_a.field(), reg.cage_root(a), tag), 0xaaaa0);
    assert_eq!(Sandboxed::read(&in_b.field(), reg.cage_root(b), tag), 0xbbbb0);

    // Reading a field against the wrong context stays inside that context.
    assert_eq!(Sandboxed::read(&in_a.field(), reg.cage_root(b), tag), 0xbbbb0);
}

#[test]
#[should_panic(expected = "sandbox violation")]
fn corrupted_index_cannot_escape_the_table() {
    let ctx = ExecutionContext::new(RootAddress::new(0xc000), config());
    let mut obj = Object::new();
    Sandboxed::init(&mut obj.field(), &ctx, 0x1234, ExternalPointerTag::NativeBuffer);

    // Simulate an attacker rewriting the field to point past the table.
    let past_end = ExternalPointerIndex::from_raw(ctx.external_pointer_table().capacity() + 100);
    obj.field().store_unaligned(past_end.to_field_word());
    let _ = Sandboxed::read(&obj.field(), ctx.cage_root(), ExternalPointerTag::NativeBuffer);
}

#[test]
#[should_panic(expected = "no execution context owns root")]
fn reading_through_an_unregistered_root_traps() {
    let reg = ContextRegistry::new();
    let a = reg
        .register(ExecutionContext::new(RootAddress::new(0x1000), config()))
        .unwrap();
    let mut obj = Object::new();
    reg.with_context(a, |ctx| {
        Sandboxed::init(&mut obj.field(), ctx, 0x10, ExternalPointerTag::FunctionTarget)
    });
    drop(reg.unregister(a));
    let _ = Sandboxed::read(&obj.field(), reg.cage_root(a), ExternalPointerTag::FunctionTarget);
}

#[test]
fn stats_report_serializes_with_schema_version() {
    let ctx = ExecutionContext::new(RootAddress::new(0xd000), config());
    let mut objects: Vec<Object> = (0..20).map(|_| Object::new()).collect();
    for obj in objects.iter_mut() {
        Sandboxed::init_empty(&mut obj.field(), &ctx);
    }
    Sandboxed::release(&mut objects[0].field(), &ctx);

    let stats = ctx.external_pointer_table().stats();
    let v = serde_json::to_value(&stats).unwrap();
    assert_eq!(v["schema_version"], "x07.extptr.table_stats@0.1.0");
    assert_eq!(v["capacity"], 32);
    assert_eq!(v["live_entries"], 19);
    assert_eq!(v["free_entries"], 12);
    assert_eq!(v["segments"], 2);
}
