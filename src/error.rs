use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use thiserror::Error;

/// Accumulated session status flags.
///
/// Operations that process many packets or chunks do not abort on the
/// first failure: recoverable errors are folded into one `ErrorSet`
/// with bitwise OR and processing continues with the remaining input.
/// The empty set means success and is never carried inside an `Err`.
#[derive(Clone, Copy, PartialEq, Eq, Default, Error)]
#[error("{}", describe(.0))]
pub struct ErrorSet(u32);

impl ErrorSet {
    pub const OK: ErrorSet = ErrorSet(0);

    pub const BAD_ALLOC: ErrorSet = ErrorSet(1 << 0);
    /// Reserved for the wrapping cipher layer.
    pub const INVALID_CIPHER: ErrorSet = ErrorSet(1 << 1);
    /// Reserved for the wrapping cipher layer.
    pub const INVALID_KEY: ErrorSet = ErrorSet(1 << 2);
    pub const INVALID_PEER: ErrorSet = ErrorSet(1 << 3);
    pub const INVALID_MODE: ErrorSet = ErrorSet(1 << 4);
    pub const INVALID_MESSAGE: ErrorSet = ErrorSet(1 << 5);
    pub const INVALID_ID: ErrorSet = ErrorSet(1 << 6);
    pub const INVALID_TIME_ELAPSED: ErrorSet = ErrorSet(1 << 7);
    pub const INVALID_MESSAGE_SIZE: ErrorSet = ErrorSet(1 << 8);
    pub const INVALID_PACKET_SIZE: ErrorSet = ErrorSet(1 << 9);
    pub const INVALID_MESSAGE_INDEX: ErrorSet = ErrorSet(1 << 10);
    pub const INVALID_MESSAGE_TIME: ErrorSet = ErrorSet(1 << 11);
    pub const INVALID_MESSAGE_ACTOR: ErrorSet = ErrorSet(1 << 12);
    pub const NO_FREE_SLOTS: ErrorSet = ErrorSet(1 << 13);
    /// Bit 14 is reserved.
    pub const UNKNOWN_SERVICE_ID: ErrorSet = ErrorSet(1 << 15);
    pub const INVALID_OUT_INDEX: ErrorSet = ErrorSet(1 << 16);
    pub const TIME_OVERFLOW: ErrorSet = ErrorSet(1 << 17);
    pub const INVALID_SLOT_STATE: ErrorSet = ErrorSet(1 << 18);
    /// Reserved sentinel.
    pub const NOT_IMPLEMENTED: ErrorSet = ErrorSet(1 << 31);

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn contains(self, other: ErrorSet) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn insert(&mut self, other: ErrorSet) {
        self.0 |= other.0;
    }

    /// Converts the accumulated set into a `Result`: the empty set is
    /// `Ok(())`, anything else is returned as the error value.
    #[inline]
    pub fn into_result(self) -> Result<(), ErrorSet> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl BitOr for ErrorSet {
    type Output = ErrorSet;

    #[inline]
    fn bitor(self, rhs: ErrorSet) -> ErrorSet {
        ErrorSet(self.0 | rhs.0)
    }
}

impl BitOrAssign for ErrorSet {
    #[inline]
    fn bitor_assign(&mut self, rhs: ErrorSet) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for ErrorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ErrorSet({})", describe(&self.0))
    }
}

const FLAG_NAMES: [(u32, &str); 19] = [
    (1 << 0, "BAD_ALLOC"),
    (1 << 1, "INVALID_CIPHER"),
    (1 << 2, "INVALID_KEY"),
    (1 << 3, "INVALID_PEER"),
    (1 << 4, "INVALID_MODE"),
    (1 << 5, "INVALID_MESSAGE"),
    (1 << 6, "INVALID_ID"),
    (1 << 7, "INVALID_TIME_ELAPSED"),
    (1 << 8, "INVALID_MESSAGE_SIZE"),
    (1 << 9, "INVALID_PACKET_SIZE"),
    (1 << 10, "INVALID_MESSAGE_INDEX"),
    (1 << 11, "INVALID_MESSAGE_TIME"),
    (1 << 12, "INVALID_MESSAGE_ACTOR"),
    (1 << 13, "NO_FREE_SLOTS"),
    (1 << 15, "UNKNOWN_SERVICE_ID"),
    (1 << 16, "INVALID_OUT_INDEX"),
    (1 << 17, "TIME_OVERFLOW"),
    (1 << 18, "INVALID_SLOT_STATE"),
    (1 << 31, "NOT_IMPLEMENTED"),
];

fn describe(bits: &u32) -> String {
    if *bits == 0 {
        return "OK".to_owned();
    }
    let mut names = Vec::new();
    let mut rest = *bits;
    for (bit, name) in FLAG_NAMES {
        if rest & bit != 0 {
            names.push(name.to_owned());
            rest &= !bit;
        }
    }
    if rest != 0 {
        names.push(format!("{rest:#x}"));
    }
    names.join(" | ")
}
