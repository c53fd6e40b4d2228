//! Scalar data types for the tessera IR.
//!
//! Index arithmetic is carried in plain signed integer types; the bit width of
//! an index expression matters when a primitive implementation is spliced into
//! a program, so [`DType::bits`] and [`DType::with_bits`] are the main entry
//! points used by the rest of the workspace.


/// Scalar data types (base numeric types).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(strum::EnumCount, strum::EnumIter, strum::VariantArray, strum::FromRepr)]
pub enum ScalarDType {
    Bool = 0,

    Int8 = 1,
    UInt8 = 2,
    Int16 = 3,
    UInt16 = 4,
    Int32 = 5,
    UInt32 = 6,
    Int64 = 7,
    UInt64 = 8,

    Float16 = 9,
    BFloat16 = 10,
    Float32 = 11,
    Float64 = 12,

    /// Opaque handle (buffer data pointers).
    Handle = 13,
}

impl ScalarDType {
    pub const fn bits(&self) -> u32 {
        match self {
            Self::Bool => 1,
            Self::Int8 | Self::UInt8 => 8,
            Self::Int16 | Self::UInt16 | Self::Float16 | Self::BFloat16 => 16,
            Self::Int32 | Self::UInt32 | Self::Float32 => 32,
            Self::Int64 | Self::UInt64 | Self::Float64 | Self::Handle => 64,
        }
    }

    pub const fn is_bool(&self) -> bool {
        matches!(self, Self::Bool)
    }

    pub const fn is_signed(&self) -> bool {
        matches!(self, Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64)
    }

    pub const fn is_unsigned(&self) -> bool {
        matches!(self, Self::UInt8 | Self::UInt16 | Self::UInt32 | Self::UInt64)
    }

    pub const fn is_int(&self) -> bool {
        self.is_signed() || self.is_unsigned()
    }

    pub const fn is_float(&self) -> bool {
        matches!(self, Self::Float16 | Self::BFloat16 | Self::Float32 | Self::Float64)
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::UInt8 => "uint8",
            Self::UInt16 => "uint16",
            Self::UInt32 => "uint32",
            Self::UInt64 => "uint64",
            Self::Float16 => "float16",
            Self::BFloat16 => "bfloat16",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Handle => "handle",
        }
    }
}

/// Data type of an expression or a buffer element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// Scalar type (single value).
    Scalar(ScalarDType),

    /// Vector type (SIMD lanes).
    Vector { scalar: ScalarDType, lanes: u16 },
}

impl From<ScalarDType> for DType {
    fn from(scalar: ScalarDType) -> Self {
        Self::Scalar(scalar)
    }
}

impl DType {
    /// Create a vector type from this dtype.
    pub fn vec(&self, lanes: u16) -> Self {
        if lanes == 1 {
            return *self;
        }
        Self::Vector { scalar: self.base(), lanes }
    }

    pub fn scalar(&self) -> Option<ScalarDType> {
        match self {
            Self::Scalar(s) => Some(*s),
            Self::Vector { .. } => None,
        }
    }

    /// Get the base scalar type (works for both scalars and vectors).
    pub fn base(&self) -> ScalarDType {
        match self {
            Self::Scalar(s) => *s,
            Self::Vector { scalar, .. } => *scalar,
        }
    }

    pub fn lanes(&self) -> u16 {
        match self {
            Self::Scalar(_) => 1,
            Self::Vector { lanes, .. } => *lanes,
        }
    }

    /// Bit width of a single lane.
    pub fn bits(&self) -> u32 {
        self.base().bits()
    }

    pub fn is_bool(&self) -> bool {
        self.base().is_bool()
    }

    pub fn is_int(&self) -> bool {
        self.base().is_int()
    }

    pub fn is_float(&self) -> bool {
        self.base().is_float()
    }

    pub fn is_handle(&self) -> bool {
        matches!(self.base(), ScalarDType::Handle)
    }

    /// Same family (signed/unsigned integer, float) with a different width.
    ///
    /// Returns `None` when the family has no member of the requested width.
    pub fn with_bits(&self, bits: u32) -> Option<Self> {
        use ScalarDType::*;
        let base = self.base();
        let scalar = match (base.is_signed(), base.is_unsigned(), base.is_float(), bits) {
            (true, _, _, 8) => Int8,
            (true, _, _, 16) => Int16,
            (true, _, _, 32) => Int32,
            (true, _, _, 64) => Int64,
            (_, true, _, 8) => UInt8,
            (_, true, _, 16) => UInt16,
            (_, true, _, 32) => UInt32,
            (_, true, _, 64) => UInt64,
            (_, _, true, 16) => Float16,
            (_, _, true, 32) => Float32,
            (_, _, true, 64) => Float64,
            _ => return None,
        };
        Some(Self::Scalar(scalar).vec(self.lanes()))
    }

    /// Signed integer type of the given width.
    pub fn int(bits: u32) -> Option<Self> {
        Self::Int32.with_bits(bits)
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scalar(s) => f.write_str(s.name()),
            Self::Vector { scalar, lanes } => write!(f, "{}x{}", scalar.name(), lanes),
        }
    }
}

#[allow(non_upper_case_globals)]
impl DType {
    pub const Bool: Self = Self::Scalar(ScalarDType::Bool);
    pub const Int8: Self = Self::Scalar(ScalarDType::Int8);
    pub const Int16: Self = Self::Scalar(ScalarDType::Int16);
    pub const Int32: Self = Self::Scalar(ScalarDType::Int32);
    pub const Int64: Self = Self::Scalar(ScalarDType::Int64);
    pub const UInt8: Self = Self::Scalar(ScalarDType::UInt8);
    pub const UInt16: Self = Self::Scalar(ScalarDType::UInt16);
    pub const UInt32: Self = Self::Scalar(ScalarDType::UInt32);
    pub const UInt64: Self = Self::Scalar(ScalarDType::UInt64);
    pub const Float16: Self = Self::Scalar(ScalarDType::Float16);
    pub const BFloat16: Self = Self::Scalar(ScalarDType::BFloat16);
    pub const Float32: Self = Self::Scalar(ScalarDType::Float32);
    pub const Float64: Self = Self::Scalar(ScalarDType::Float64);
    pub const Handle: Self = Self::Scalar(ScalarDType::Handle);
}
