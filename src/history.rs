use std::{
    collections::HashSet,
    fs::{self, OpenOptions},
    io::Write,
    path::PathBuf,
};

/// Durable record of source identifiers already delivered to the destination.
/// Newline-delimited, append-only; identifiers never leave the file. The set
/// semantics on load make duplicate lines harmless, and `append` filters them
/// out before writing so the file stays duplicate-free under normal
/// operation.
pub struct HistoryLedger {
    path: PathBuf,
}

impl HistoryLedger {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Missing or unreadable ledger means an empty history; the rotator must
    /// keep working on a fresh install.
    pub fn load(&self) -> HashSet<String> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
            Err(_) => HashSet::new(),
        }
    }

    /// Appends identifiers not yet present, creating the file and its parent
    /// directories on first use. Returns how many were actually written.
    /// Only called with identifiers of successfully committed assets.
    pub fn append(&self, ids: &[String]) -> std::io::Result<usize> {
        let known = self.load();

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let mut written = 0usize;
        let mut batch = HashSet::<&str>::new();
        for id in ids {
            let id = id.trim();
            if id.is_empty() || known.contains(id) || !batch.insert(id) {
                continue;
            }
            writeln!(file, "{id}")?;
            written += 1;
        }

        Ok(written)
    }
}
