//! Leveled, category-aware logging.
//!
//! Filtering runs on two axes. The global maximum level gates the
//! `log_error!`..`log_trace!` macros. Named debug categories gate
//! `log_cat!` independently of the level: enabling a category (for
//! example `coinstake`) is the explicit opt-in for that subsystem's
//! chatter, so category messages are written whenever their category is
//! on. Output goes to stderr as text lines or JSON objects.

use std::collections::HashSet;
use std::fmt;
use std::io::{self, Write as _};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{OnceLock, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::json;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum Level {
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

const LEVEL_NAMES: [(&str, Level); 6] = [
    ("error", Level::Error),
    ("warn", Level::Warn),
    ("warning", Level::Warn),
    ("info", Level::Info),
    ("debug", Level::Debug),
    ("trace", Level::Trace),
];

impl Level {
    pub fn label(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        LEVEL_NAMES
            .iter()
            .find(|(name, _)| raw.eq_ignore_ascii_case(name))
            .map(|(_, level)| *level)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Output {
    Text,
    Json,
}

static MAX_LEVEL: AtomicU8 = AtomicU8::new(Level::Info as u8);
static JSON_OUTPUT: AtomicBool = AtomicBool::new(false);
static TIMESTAMPS: AtomicBool = AtomicBool::new(true);
static CATEGORIES: OnceLock<RwLock<CategoryFilter>> = OnceLock::new();

#[derive(Default)]
struct CategoryFilter {
    all: bool,
    names: HashSet<String>,
}

pub fn init(level: Level, output: Output, timestamps: bool) {
    MAX_LEVEL.store(level as u8, Ordering::Relaxed);
    JSON_OUTPUT.store(output == Output::Json, Ordering::Relaxed);
    TIMESTAMPS.store(timestamps, Ordering::Relaxed);
}

pub fn enabled(level: Level) -> bool {
    level as u8 <= MAX_LEVEL.load(Ordering::Relaxed)
}

/// Replace the enabled category set. The name `"all"` (or `"1"`) turns
/// every category on; an empty list turns them all off.
pub fn set_categories<I, S>(names: I)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let filter = CATEGORIES.get_or_init(RwLock::default);
    let Ok(mut filter) = filter.write() else {
        return;
    };
    filter.all = false;
    filter.names.clear();
    for name in names {
        match name.as_ref() {
            "all" | "1" => filter.all = true,
            name => {
                filter.names.insert(name.to_string());
            }
        }
    }
}

pub fn category_enabled(name: &str) -> bool {
    let Some(filter) = CATEGORIES.get() else {
        return false;
    };
    match filter.read() {
        Ok(filter) => filter.all || filter.names.contains(name),
        Err(_) => false,
    }
}

/// Call-site metadata for one message. Built by the macros, consumed by
/// [`write`].
pub struct Record<'a> {
    pub level: Level,
    pub category: Option<&'a str>,
    pub target: &'static str,
    pub file: &'static str,
    pub line: u32,
}

pub fn write(record: &Record<'_>, args: fmt::Arguments<'_>) {
    let unix_seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let mut err = io::stderr().lock();
    if JSON_OUTPUT.load(Ordering::Relaxed) {
        let mut line = json!({
            "time": unix_seconds,
            "level": record.level.label(),
            "target": record.target,
            "src": format!("{}:{}", record.file, record.line),
            "message": args.to_string(),
        });
        if let Some(category) = record.category {
            line["category"] = json!(category);
        }
        let _ = writeln!(err, "{line}");
    } else {
        if TIMESTAMPS.load(Ordering::Relaxed) {
            let _ = write!(err, "{} ", UtcStamp(unix_seconds));
        }
        let _ = write!(err, "[{}] {}", record.level.label(), record.target);
        if let Some(category) = record.category {
            let _ = write!(err, " <{category}>");
        }
        let _ = writeln!(err, ": {args}");
    }
}

#[macro_export]
macro_rules! log_record {
    ($level:expr, $category:expr, $($arg:tt)*) => {{
        let record = $crate::Record {
            level: $level,
            category: $category,
            target: module_path!(),
            file: file!(),
            line: line!(),
        };
        $crate::write(&record, format_args!($($arg)*));
    }};
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {{
        if $crate::enabled($crate::Level::Error) {
            $crate::log_record!($crate::Level::Error, None, $($arg)*);
        }
    }};
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {{
        if $crate::enabled($crate::Level::Warn) {
            $crate::log_record!($crate::Level::Warn, None, $($arg)*);
        }
    }};
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {{
        if $crate::enabled($crate::Level::Info) {
            $crate::log_record!($crate::Level::Info, None, $($arg)*);
        }
    }};
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {{
        if $crate::enabled($crate::Level::Debug) {
            $crate::log_record!($crate::Level::Debug, None, $($arg)*);
        }
    }};
}

#[macro_export]
macro_rules! log_trace {
    ($($arg:tt)*) => {{
        if $crate::enabled($crate::Level::Trace) {
            $crate::log_record!($crate::Level::Trace, None, $($arg)*);
        }
    }};
}

/// Message gated on a named category instead of the level: if the
/// category is on, the message is written.
#[macro_export]
macro_rules! log_cat {
    ($category:expr, $($arg:tt)*) => {{
        if $crate::category_enabled($category) {
            $crate::log_record!($crate::Level::Debug, Some($category), $($arg)*);
        }
    }};
}

struct UtcStamp(u64);

impl fmt::Display for UtcStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (year, month, day, hour, minute, second) = split_utc(self.0);
        write!(
            f,
            "{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}Z"
        )
    }
}

fn is_leap_year(year: u64) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

fn split_utc(unix_seconds: u64) -> (u64, u32, u64, u64, u64, u64) {
    const MONTH_DAYS: [u64; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

    let seconds_of_day = unix_seconds % 86_400;
    let hour = seconds_of_day / 3_600;
    let minute = (seconds_of_day % 3_600) / 60;
    let second = seconds_of_day % 60;

    let mut days = unix_seconds / 86_400;
    let mut year = 1970u64;
    loop {
        let year_len = if is_leap_year(year) { 366 } else { 365 };
        if days < year_len {
            break;
        }
        days -= year_len;
        year += 1;
    }
    let mut month = 0usize;
    loop {
        let mut month_len = MONTH_DAYS[month];
        if month == 1 && is_leap_year(year) {
            month_len += 1;
        }
        if days < month_len {
            break;
        }
        days -= month_len;
        month += 1;
    }
    (year, month as u32 + 1, days + 1, hour, minute, second)
}
