/// An opaque identity.
///
/// `Token` is reused for two unrelated purposes, mirroring the teacher
/// crate's own `Token`: identifying a descriptor's reactor registration, and
/// (here) identifying a pending timer entry so it can be cancelled without
/// holding a reference to its heap position.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(pub usize);

impl Token {
    #[inline]
    pub fn as_usize(self) -> usize {
        self.0
    }
}

impl From<usize> for Token {
    fn from(val: usize) -> Token {
        Token(val)
    }
}
