use std::marker::PhantomData;
use std::ptr::NonNull;

/// A native (off-sandbox) address.
pub type Address = usize;

/// The raw word stored in a field or table entry.
pub type ExternalPointer = usize;

pub const SYSTEM_POINTER_SIZE: usize = std::mem::size_of::<usize>();
pub const EXTERNAL_POINTER_SIZE: usize = std::mem::size_of::<ExternalPointer>();

#[cfg(feature = "compress-pointers")]
pub const TAGGED_SIZE: usize = 4;
#[cfg(not(feature = "compress-pointers"))]
pub const TAGGED_SIZE: usize = SYSTEM_POINTER_SIZE;

/// Heap objects are only `TAGGED_SIZE`-aligned, so wider fields may straddle.
pub const EXTERNAL_POINTER_UNALIGNED: bool = EXTERNAL_POINTER_SIZE > TAGGED_SIZE;

const _: () = assert!(EXTERNAL_POINTER_SIZE == SYSTEM_POINTER_SIZE);

/// A mutable view of one external pointer field inside a heap object.
pub struct ExternalPointerSlot<'heap> {
    ptr: NonNull<u8>,
    _heap: PhantomData<&'heap mut [u8]>,
}

// SAFETY: the slot is an exclusive view of its bytes, like `&mut [u8]`.
unsafe impl Send for ExternalPointerSlot<'_> {}

impl<'heap> ExternalPointerSlot<'heap> {
    /// Views `EXTERNAL_POINTER_SIZE` bytes at `offset` in `bytes`.
    pub fn in_bytes(bytes: &'heap mut [u8], offset: usize) -> Option<Self> {
        let end = offset.checked_add(EXTERNAL_POINTER_SIZE)?;
        let field = bytes.get_mut(offset..end)?;
        Some(Self {
            ptr: NonNull::from(field).cast(),
            _heap: PhantomData,
        })
    }

    /// Views the field at a raw heap address.
    ///
    /// # Safety
    ///
    /// `address` must be valid for reads and writes of
    /// `EXTERNAL_POINTER_SIZE` bytes for `'heap`, and no other live reference
    /// may access those bytes during that time.
    pub unsafe fn from_address(address: Address) -> Option<Self> {
        Some(Self {
            ptr: NonNull::new(address as *mut u8)?,
            _heap: PhantomData,
        })
    }

    pub fn address(&self) -> Address {
        self.ptr.as_ptr() as Address
    }

    pub fn is_aligned(&self) -> bool {
        self.address() % std::mem::align_of::<ExternalPointer>() == 0
    }

    /// Panics if the field is not naturally aligned.
    pub fn load_aligned(&self) -> ExternalPointer {
        assert!(self.is_aligned(), "misaligned field at {:#x}", self.address());
        // SAFETY: in-bounds by construction, alignment checked above.
        unsafe { self.ptr.cast::<ExternalPointer>().as_ptr().read() }
    }

    pub fn load_unaligned(&self) -> ExternalPointer {
        // SAFETY: in-bounds by construction.
        unsafe { self.ptr.cast::<ExternalPointer>().as_ptr().read_unaligned() }
    }

    /// Panics if the field is not naturally aligned.
    pub fn store_aligned(&mut self, value: ExternalPointer) {
        assert!(self.is_aligned(), "misaligned field at {:#x}", self.address());
        // SAFETY: in-bounds by construction, alignment checked above.
        unsafe { self.ptr.cast::<ExternalPointer>().as_ptr().write(value) }
    }

    pub fn store_unaligned(&mut self, value: ExternalPointer) {
        // SAFETY: in-bounds by construction.
        unsafe {
            self.ptr
                .cast::<ExternalPointer>()
                .as_ptr()
                .write_unaligned(value)
        }
    }

    /// Loads with the primitive the heap layout calls for. Misaligned fields
    /// always take the unaligned path.
    pub fn load(&self) -> ExternalPointer {
        if EXTERNAL_POINTER_UNALIGNED || !self.is_aligned() {
            self.load_unaligned()
        } else {
            self.load_aligned()
        }
    }

    pub fn store(&mut self, value: ExternalPointer) {
        if EXTERNAL_POINTER_UNALIGNED || !self.is_aligned() {
            self.store_unaligned(value)
        } else {
            self.store_aligned(value)
        }
    }
}

impl std::fmt::Debug for ExternalPointerSlot<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalPointerSlot")
            .field("address", &format_args!("{:#x}", self.address()))
            .finish()
    }
}
