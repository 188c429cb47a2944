//! Tags are mixed into stored words with XOR; nothing detects a mismatch.

use crate::memory::{Address, ExternalPointer};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum ExternalPointerTag {
    #[default]
    Null = 0x00,
    ForeignAddress = 0x01,
    NativeBuffer = 0x02,
    NativeBufferData = 0x03,
    OsHandle = 0x04,
    FunctionTarget = 0x05,
    EmbedderData = 0x06,
    MicrotaskQueue = 0x07,
}

impl ExternalPointerTag {
    pub const ALL: [ExternalPointerTag; 8] = [
        ExternalPointerTag::Null,
        ExternalPointerTag::ForeignAddress,
        ExternalPointerTag::NativeBuffer,
        ExternalPointerTag::NativeBufferData,
        ExternalPointerTag::OsHandle,
        ExternalPointerTag::FunctionTarget,
        ExternalPointerTag::EmbedderData,
        ExternalPointerTag::MicrotaskQueue,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ExternalPointerTag::Null => "null",
            ExternalPointerTag::ForeignAddress => "foreign-address",
            ExternalPointerTag::NativeBuffer => "native-buffer",
            ExternalPointerTag::NativeBufferData => "native-buffer-data",
            ExternalPointerTag::OsHandle => "os-handle",
            ExternalPointerTag::FunctionTarget => "function-target",
            ExternalPointerTag::EmbedderData => "embedder-data",
            ExternalPointerTag::MicrotaskQueue => "microtask-queue",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "null" => Some(ExternalPointerTag::Null),
            "foreign-address" => Some(ExternalPointerTag::ForeignAddress),
            "native-buffer" => Some(ExternalPointerTag::NativeBuffer),
            "native-buffer-data" => Some(ExternalPointerTag::NativeBufferData),
            "os-handle" => Some(ExternalPointerTag::OsHandle),
            "function-target" => Some(ExternalPointerTag::FunctionTarget),
            "embedder-data" => Some(ExternalPointerTag::EmbedderData),
            "microtask-queue" => Some(ExternalPointerTag::MicrotaskQueue),
            _ => None,
        }
    }

    /// The word XOR-ed into stored addresses.
    pub const fn mask(self) -> ExternalPointer {
        self as u8 as ExternalPointer
    }
}

impl std::fmt::Display for ExternalPointerTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[inline]
pub const fn encode(address: Address, tag: ExternalPointerTag) -> ExternalPointer {
    address ^ tag.mask()
}

#[inline]
pub const fn decode(entry: ExternalPointer, tag: ExternalPointerTag) -> Address {
    entry ^ tag.mask()
}
