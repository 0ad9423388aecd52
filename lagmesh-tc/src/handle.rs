//! TC handle types.
//!
//! TC handles are 32-bit values split into major:minor (16:16 bits). Qdiscs are named by their
//! major alone (minor must be 0) while classes, including the bands of a `prio` qdisc, are named
//! by `major:minor`. The `tc` utility parses both halves as hexadecimal, so that is how they are
//! rendered here.

use std::fmt;

/// A qdisc handle, i.e. the major number of `major:0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(pub u16);

impl Handle {
    /// The major number.
    #[inline]
    pub const fn major(self) -> u16 {
        self.0
    }

    /// The 32-bit kernel representation, `major << 16`.
    #[inline]
    pub const fn as_u32(self) -> u32 {
        (self.0 as u32) << 16
    }

    /// The class `self:minor`. For a `prio` qdisc, band `k` (1-based) is minor `k`.
    #[inline]
    pub const fn class(self, minor: u16) -> ClassId {
        ClassId { major: self.0, minor }
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}:", self.0)
    }
}

/// A class identifier, `major:minor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClassId {
    /// Handle of the qdisc owning this class.
    pub major: u16,
    /// Class number within that qdisc.
    pub minor: u16,
}

impl ClassId {
    /// The qdisc owning this class.
    #[inline]
    pub const fn qdisc(self) -> Handle {
        Handle(self.major)
    }

    /// The 32-bit kernel representation.
    #[inline]
    pub const fn as_u32(self) -> u32 {
        ((self.major as u32) << 16) | self.minor as u32
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}:{:x}", self.major, self.minor)
    }
}

/// Where a qdisc attaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Parent {
    /// The interface's egress root.
    Root,
    /// A class of an existing classful qdisc.
    Class(ClassId),
}

impl fmt::Display for Parent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => f.write_str("root"),
            Self::Class(class) => write!(f, "parent {class}"),
        }
    }
}
