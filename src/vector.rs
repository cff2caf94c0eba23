use core::fmt;

/// Raw encoding of "no interrupt", used where a vector has to live in an integer slot.
pub const NO_VECTOR: i32 = -1;

/// Number of interrupt vectors of the architecture.
pub const NR_VECTORS: usize = 256;

/// An interrupt vector number.
///
/// The absence of an interrupt is expressed as `Option<Vector>::None` everywhere in
/// the public API; [`NO_VECTOR`] only appears in the atomic mailbox encoding.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Vector(u8);

impl Vector {
    /// Create a vector from its number.
    pub const fn new(vector: u8) -> Self {
        Self(vector)
    }

    /// The vector number.
    pub const fn as_u8(self) -> u8 {
        self.0
    }

    /// Decode a raw integer slot, treating [`NO_VECTOR`] and anything outside
    /// `0..NR_VECTORS` as no interrupt.
    pub fn from_raw(raw: i32) -> Option<Self> {
        u8::try_from(raw).ok().map(Self)
    }

    /// Encode an optional vector into a raw integer slot.
    pub fn to_raw(vector: Option<Self>) -> i32 {
        match vector {
            Some(v) => v.0 as i32,
            None => NO_VECTOR,
        }
    }
}

impl From<u8> for Vector {
    fn from(vector: u8) -> Self {
        Self(vector)
    }
}

impl From<Vector> for usize {
    fn from(vector: Vector) -> Self {
        vector.0 as usize
    }
}

impl fmt::Debug for Vector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vector({:#04x})", self.0)
    }
}

impl fmt::Display for Vector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}
