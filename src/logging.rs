use std::{
    fs::OpenOptions,
    io::Write,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, AtomicU8, Ordering},
        mpsc::{self, Sender},
        OnceLock,
    },
    thread,
};

use chrono;

use crate::paths::sentinel_root_dir;

/* =========================
   GLOBAL STATE
   ========================= */

static DEBUG: AtomicBool = AtomicBool::new(false);
static LEVEL_RANK: AtomicU8 = AtomicU8::new(2); // warn
static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();
static LOG_TX: OnceLock<Sender<String>> = OnceLock::new();

fn rank(level: &str) -> u8 {
    match level {
        "ERROR" | "error" => 3,
        "WARN" | "warn" => 2,
        "INFO" | "info" => 1,
        _ => 0,
    }
}

/* =========================
   PUBLIC API
   ========================= */

pub fn init(debug: bool, level: &str) {
    if LOG_TX.get().is_some() {
        panic!("logging::init() called more than once");
    }

    DEBUG.store(debug, Ordering::Relaxed);
    LEVEL_RANK.store(rank(level), Ordering::Relaxed);

    let path = log_path().clone();
    let (tx, rx) = mpsc::channel::<String>();
    LOG_TX.set(tx).expect("LOG_TX already set");

    thread::spawn(move || {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .expect("Failed to open log file");

        while let Ok(line) = rx.recv() {
            let _ = writeln!(file, "{line}");
            let _ = file.flush();
        }
    });
}

pub fn set_debug(debug: bool) {
    DEBUG.store(debug, Ordering::Relaxed);
}

pub fn set_level(level: &str) {
    LEVEL_RANK.store(rank(level), Ordering::Relaxed);
}

#[inline]
pub fn should_log(level: &str) -> bool {
    if DEBUG.load(Ordering::Relaxed) {
        return true;
    }
    rank(level) >= LEVEL_RANK.load(Ordering::Relaxed)
}

/* =========================
   INTERNAL
   ========================= */

#[inline]
pub fn enqueue(level: &str, msg: String) {
    if let Some(tx) = LOG_TX.get() {
        let ts = timestamp();
        let _ = tx.send(format!("{ts} [{level}] {msg}"));
    }
}

fn timestamp() -> String {
    let now = chrono::Local::now();
    now.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

/* =========================
   MACROS
   ========================= */

#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {{
        if $crate::logging::should_log("INFO") {
            $crate::logging::enqueue(
                "INFO",
                format!($($arg)*)
            );
        }
    }};
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {{
        $crate::logging::enqueue(
            "WARN",
            format!($($arg)*)
        );
    }};
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {{
        $crate::logging::enqueue(
            "ERROR",
            format!($($arg)*)
        );
    }};
}

/* =========================
   PATH
   ========================= */

fn log_path() -> &'static PathBuf {
    LOG_PATH.get_or_init(|| sentinel_root_dir().join("sentinel.rotator.log"))
}
