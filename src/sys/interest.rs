use std::ops;

/// Readiness interest bits, used when (re-)registering a descriptor with a
/// [`crate::sys::Selector`].
///
/// Unlike the teacher crate's `Interests` (a `NonZeroU8` that can never be
/// empty), corio needs an empty value: a descriptor with no pending
/// operations in any direction is deregistered rather than kept armed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct Interest(u8);

impl Interest {
    const READABLE: u8 = 0b001;
    const WRITABLE: u8 = 0b010;

    pub const EMPTY: Interest = Interest(0);
    pub const READABLE_: Interest = Interest(Self::READABLE);
    pub const WRITABLE_: Interest = Interest(Self::WRITABLE);

    pub fn readable() -> Interest {
        Interest(Self::READABLE)
    }

    pub fn writable() -> Interest {
        Interest(Self::WRITABLE)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn is_readable(self) -> bool {
        self.0 & Self::READABLE != 0
    }

    pub fn is_writable(self) -> bool {
        self.0 & Self::WRITABLE != 0
    }
}

impl ops::BitOr for Interest {
    type Output = Interest;
    fn bitor(self, rhs: Interest) -> Interest {
        Interest(self.0 | rhs.0)
    }
}

impl ops::BitOrAssign for Interest {
    fn bitor_assign(&mut self, rhs: Interest) {
        self.0 |= rhs.0;
    }
}
