use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use crate::{error::RotateError, info, transform::AcceptedAsset, warn};

/// An asset that reached the destination directory this cycle.
#[derive(Debug, Clone)]
pub struct CommittedAsset {
    pub source_id: String,
    pub final_path: PathBuf,
}

/// Converges the destination directory to exactly the accepted set.
///
/// Ordering is write-then-prune: every accepted file is moved in first (each
/// replacing any same-named file), and only afterwards is anything deleted.
/// A crash between the two steps leaves stale extras, never a gap; the next
/// successful cycle restores the invariant. Callers must not invoke this with
/// an empty accepted set: an empty result never clears existing wallpapers.
pub fn commit(accepted: &[AcceptedAsset], destination: &Path) -> Vec<CommittedAsset> {
    if let Err(e) = fs::create_dir_all(destination) {
        warn!(
            "[ROTATOR][RECONCILE] Cannot create destination {}: {e}",
            destination.display()
        );
        return Vec::new();
    }

    let mut committed = Vec::<CommittedAsset>::new();
    for asset in accepted {
        let Some(name) = asset.transformed_path.file_name() else {
            continue;
        };
        let final_path = destination.join(name);

        match move_file(&asset.transformed_path, &final_path) {
            Ok(()) => {
                committed.push(CommittedAsset {
                    source_id: asset.source_id.clone(),
                    final_path,
                });
            }
            Err(reason) => {
                warn!(
                    "[ROTATOR][RECONCILE] {}",
                    RotateError::ReconcileFailed {
                        path: final_path.clone(),
                        reason,
                    }
                );
            }
        }
    }

    if committed.is_empty() {
        // Every move failed; pruning against an empty keep-set would wipe the
        // previous delivery.
        warn!("[ROTATOR][RECONCILE] No asset reached the destination; skipping prune");
        return committed;
    }

    let desired: HashSet<PathBuf> = committed.iter().map(|c| c.final_path.clone()).collect();
    let current = list_files(destination);
    for stale in plan_deletions(&current, &desired) {
        match fs::remove_file(&stale) {
            Ok(()) => info!("[ROTATOR][RECONCILE] Pruned {}", stale.display()),
            Err(e) => warn!(
                "[ROTATOR][RECONCILE] Failed to prune {}: {e}",
                stale.display()
            ),
        }
    }

    committed
}

/// Pure diff of what must go: `current - desired`. Order-independent and safe
/// to re-run; sorted only so logs are stable.
pub fn plan_deletions(current: &HashSet<PathBuf>, desired: &HashSet<PathBuf>) -> Vec<PathBuf> {
    let mut doomed: Vec<PathBuf> = current.difference(desired).cloned().collect();
    doomed.sort();
    doomed
}

fn list_files(dir: &Path) -> HashSet<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return HashSet::new();
    };

    entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect()
}

fn move_file(src: &Path, dst: &Path) -> Result<(), String> {
    if fs::rename(src, dst).is_ok() {
        return Ok(());
    }

    // Scratch and destination can sit on different volumes; fall back to
    // copy + delete.
    fs::copy(src, dst).map_err(|e| format!("copy failed: {e}"))?;
    let _ = fs::remove_file(src);
    Ok(())
}
