//! The teacher's `logln!`/`debug!`/`warn!`/`error!`/`info!` macro family,
//! kept in spirit: timestamped, colored by level, with a `debug!(Module,
//! "...")` form that tags the emitting subsystem. Backed by a ring buffer
//! plus a pluggable sink, since the concrete UART/console device is a
//! driver (out of scope) the arch layer installs at boot.

use core::{fmt::Write, panic::PanicInfo, sync::atomic::AtomicBool};

use alloc::string::String;

use crate::utils::locks::RwLock;

/// Tags an emitting subsystem in a `debug!`/`warn!`/`error!` call site.
pub enum Module {
    Scheduler,
    Ipc,
    Memory,
    As,
    Fibril,
    Session,
    Boot,
}

impl core::fmt::Display for Module {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Module::Scheduler => "scheduler",
            Module::Ipc => "ipc",
            Module::Memory => "memory",
            Module::As => "as",
            Module::Fibril => "fibril",
            Module::Session => "session",
            Module::Boot => "boot",
        };
        f.write_str(name)
    }
}

/// Something that can receive formatted log lines; the arch layer installs
/// a concrete UART sink at boot via [`set_sink`]. Before that (and in
/// tests), lines only land in the in-memory ring buffer.
pub trait LogSink: Send + Sync {
    fn write_line(&self, line: &str);
}

struct NullSink;
impl LogSink for NullSink {
    fn write_line(&self, _line: &str) {}
}

static SINK: RwLock<&'static dyn LogSink> = RwLock::new(&NullSink);
/// Ring buffer every log line is appended to regardless of whether a sink
/// is installed, so a post-mortem dump can recover history the UART
/// missed.
pub static LOG_BUFFER: RwLock<String> = RwLock::new(String::new());

pub const RING_BUFFER_CAP: usize = 64 * 1024;

pub fn set_sink(sink: &'static dyn LogSink) {
    *SINK.write() = sink;
}

pub(crate) fn log_time_from_ms(ms: u64) -> (u32, u8, u8, u16) {
    let into_seconds = || (ms / 1000, ms % 1000);
    let into_minutes = || {
        let (seconds, ms) = into_seconds();
        (seconds / 60, seconds % 60, ms)
    };
    let into_hours = || {
        let (minutes, seconds, ms) = into_minutes();
        (minutes / 60, minutes % 60, seconds, ms)
    };

    match ms {
        ..1000 => (0, 0, 0, ms as u16),
        1000..60000 => {
            let (seconds, ms) = into_seconds();
            (0, 0, seconds as u8, ms as u16)
        }
        x if x <= 1000 * 60 * 60 && x >= 1000 * 60 => {
            let (minutes, seconds, ms) = into_minutes();
            (0, minutes as u8, seconds as u8, ms as u16)
        }
        _ => {
            let (hours, minutes, seconds, ms) = into_hours();
            (hours as u32, minutes as u8, seconds as u8, ms as u16)
        }
    }
}

#[doc(hidden)]
pub fn _emit(args: core::fmt::Arguments) {
    let now = crate::arch::monotonic_ms();
    let (hours, minutes, seconds, ms) = log_time_from_ms(now);

    let mut buf = LOG_BUFFER.write();
    if buf.len() > RING_BUFFER_CAP {
        buf.clear();
    }
    let _ = write!(buf, "[{hours:02}:{minutes:02}:{seconds:02}.{ms:03}] {args}\n");

    let mut line = String::new();
    let _ = write!(
        line,
        "[{hours:02}:{minutes:02}:{seconds:02}.{ms:03}] {args}"
    );
    SINK.read().write_line(&line);
}

#[macro_export]
macro_rules! logln {
    ($($arg:tt)*) => {{
        $crate::logging::_emit(format_args!($($arg)*));
    }};
}

pub const MIN_LOG_TYPE_NAME_WIDTH: usize = 5;

#[macro_export]
macro_rules! logln_ext {
    ($name: literal, $name_color: literal, as $kind: expr, $($arg:tt)*) => {
        $crate::logln!("[  \x1B[{name_color}m{name:<width$}\x1B[0m  ]\x1b[90m {kind}:\x1B[0m {}", format_args!($($arg)*), name_color = $name_color, name = $name, kind = $kind, width = $crate::logging::MIN_LOG_TYPE_NAME_WIDTH)
    };

    ($name: literal, $name_color: literal, $($arg:tt)*) => {
        $crate::logln!("[  \x1B[{name_color}m{name:<width$}\x1B[0m  ]\x1b[90m:\x1B[0m {}", format_args!($($arg)*), name_color = $name_color, name = $name, width = $crate::logging::MIN_LOG_TYPE_NAME_WIDTH)
    };
}

/// Runtime debug info. Takes an optional `$mod` (a [`Module`] value) tag
/// followed by format arguments.
#[macro_export]
macro_rules! debug {
    ($module: expr, $($arg:tt)*) => {{
        $crate::logln_ext!("debug", 91, as $module, $($arg)*)
    }};
    ($($arg:tt)*) => {{
        $crate::logln_ext!("debug", 91, $($arg)*)
    }};
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => ($crate::logln_ext!("info", 92, $($arg)*));
}

#[macro_export]
macro_rules! warn {
    ($module: expr, $($arg:tt)*) => {{
        $crate::logln_ext!("warn", 93, as $module, $($arg)*)
    }};
    ($($arg:tt)*) => ($crate::logln_ext!("warn", 93, $($arg)*));
}

#[macro_export]
macro_rules! error {
    ($module: expr, $($arg:tt)*) => {{
        $crate::logln_ext!("error", 91, as $module, $($arg)*)
    }};
    ($($arg:tt)*) => ($crate::logln_ext!("error", 91, $($arg)*));
}

pub static QUIET_PANIC: AtomicBool = AtomicBool::new(false);

/// Called from the `#[panic_handler]`: a `Bug`-class invariant violation
/// (spec.md §7) is never translated into a return code, it dumps what it
/// can and halts.
pub fn panic_dump(info: &PanicInfo) {
    if QUIET_PANIC.load(core::sync::atomic::Ordering::Relaxed) {
        return;
    }
    logln!("\x1B[38;2;255;0;0mkernel panic: {}\x1B[0m", info);
}
