//! Sort configuration: key/payload type tags, sort direction and the
//! keys-only/pairs mode. A [`SortConfig`] is fixed when an engine is created
//! and turned into a block of `const` declarations that gets prepended to the
//! raw WGSL source, specializing the compute kernels at pipeline creation.

/// Key interpretation inside the kernels. The digit binning itself always
/// operates on unsigned words; signed and float keys are mapped onto an
/// order-preserving unsigned representation before digits are extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    U32,
    I32,
    F32,
    U64,
}

impl KeyType {
    pub fn bits(&self) -> u32 {
        match self {
            KeyType::U32 | KeyType::I32 | KeyType::F32 => 32,
            KeyType::U64 => 64,
        }
    }

    /// Number of 32 bit words a single key occupies in the sort buffer.
    pub fn words(&self) -> u32 {
        self.bits() / 32
    }

    pub fn size(&self) -> u64 {
        self.words() as u64 * 4
    }

    fn code(&self) -> u32 {
        match self {
            KeyType::U32 => 0,
            KeyType::I32 => 1,
            KeyType::F32 => 2,
            KeyType::U64 => 3,
        }
    }
}

/// Payload interpretation. Payloads are opaque 4 byte records as far as the
/// scatter is concerned, the tag only exists so a mismatching caller is caught
/// at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadType {
    U32,
    I32,
    F32,
}

impl PayloadType {
    fn code(&self) -> u32 {
        match self {
            PayloadType::U32 => 0,
            PayloadType::I32 => 1,
            PayloadType::F32 => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Keys-only or pairs mode. Pairs mode carries the payload type tag so the
/// whole mode decision is a single value fixed at engine construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortMode {
    KeysOnly,
    Pairs(PayloadType),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortConfig {
    pub key_type: KeyType,
    pub order: SortOrder,
    pub mode: SortMode,
}

impl SortConfig {
    pub fn keys(key_type: KeyType, order: SortOrder) -> Self {
        Self {
            key_type,
            order,
            mode: SortMode::KeysOnly,
        }
    }

    pub fn pairs(key_type: KeyType, payload_type: PayloadType, order: SortOrder) -> Self {
        Self {
            key_type,
            order,
            mode: SortMode::Pairs(payload_type),
        }
    }

    /// Number of 8 bit digit passes needed to cover the key width:
    /// 4 for 32 bit keys, 8 for 64 bit keys.
    pub fn passes(&self) -> u32 {
        self.key_type.bits().div_ceil(8)
    }

    pub fn is_pairs(&self) -> bool {
        matches!(self.mode, SortMode::Pairs(_))
    }

    pub fn ascending(&self) -> bool {
        self.order == SortOrder::Ascending
    }

    /// The specialization preamble prepended to the raw WGSL source. The
    /// kernels branch on these constants; re-deriving the preamble from the
    /// same config always yields the same text.
    pub fn shader_defs(&self) -> String {
        let payload_type = match self.mode {
            SortMode::Pairs(p) => p.code(),
            SortMode::KeysOnly => 0,
        };
        format!(
            "const key_type: u32 = {:}u;\n\
            const key_words: u32 = {:}u;\n\
            const radix_passes: u32 = {:}u;\n\
            const payload_type: u32 = {:}u;\n\
            const sort_pairs: bool = {:};\n\
            const should_ascend: bool = {:};\n",
            self.key_type.code(),
            self.key_type.words(),
            self.passes(),
            payload_type,
            self.is_pairs(),
            self.ascending(),
        )
    }
}
