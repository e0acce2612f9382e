//! The fixed error enumeration that crosses every kernel/user boundary:
//! syscall return codes and IPC reply `retval` words both draw from this set.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorStatus {
    Ok = 0,
    /// Use when no dedicated error fits and a new one cannot be added.
    Generic = -1,
    NoSuchEntry = -2,
    Io = -3,
    InvalidArgument = -4,
    OutOfMemory = -5,
    Busy = -6,
    TryAgain = -7,
    /// A table (phone, handle, session) is at capacity.
    LimitReached = -8,
    /// The peer closed its end of an IPC connection.
    Hangup = -9,
    /// A blocking call was interrupted by cancellation.
    Interrupted = -10,
    /// A deadline elapsed before the operation completed.
    TimedOut = -11,
    PermissionDenied = -12,
    NotSupported = -13,
    AlreadyExists = -14,
    NoSpace = -15,
}

impl ErrorStatus {
    /// Lowest (most negative) value any [`ErrorStatus`] variant can take;
    /// used by [`ErrorStatus::try_from_raw`] to bounds-check an unknown code.
    const MIN: i32 = Self::NoSpace as i32;

    pub const fn as_str(&self) -> &'static str {
        use ErrorStatus::*;
        match self {
            Ok => "EOK",
            Generic => "Generic Error",
            NoSuchEntry => "No such entry",
            Io => "I/O error",
            InvalidArgument => "Invalid argument",
            OutOfMemory => "Out of memory",
            Busy => "Resource busy",
            TryAgain => "Try again",
            LimitReached => "Table limit reached",
            Hangup => "Connection hung up",
            Interrupted => "Interrupted",
            TimedOut => "Timed out",
            PermissionDenied => "Permission denied",
            NotSupported => "Operation not supported",
            AlreadyExists => "Already exists",
            NoSpace => "No space left",
        }
    }

    /// Recovers an [`ErrorStatus`] from a raw syscall/IPC return code.
    ///
    /// Returns `None` for a code outside the enumeration's range; callers that
    /// only need "was this an error" should just test `raw < 0`.
    pub fn try_from_raw(raw: i32) -> Option<Self> {
        use ErrorStatus::*;
        Some(match raw {
            0 => Ok,
            -1 => Generic,
            -2 => NoSuchEntry,
            -3 => Io,
            -4 => InvalidArgument,
            -5 => OutOfMemory,
            -6 => Busy,
            -7 => TryAgain,
            -8 => LimitReached,
            -9 => Hangup,
            -10 => Interrupted,
            -11 => TimedOut,
            -12 => PermissionDenied,
            -13 => NotSupported,
            -14 => AlreadyExists,
            -15 => NoSpace,
            x if x < Self::MIN || x > 0 => return None,
            _ => return None,
        })
    }

    #[inline(always)]
    pub const fn is_ok(&self) -> bool {
        matches!(self, ErrorStatus::Ok)
    }
}

impl fmt::Display for ErrorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ErrorStatus> for i32 {
    #[inline(always)]
    fn from(value: ErrorStatus) -> Self {
        value as i32
    }
}
