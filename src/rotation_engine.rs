use std::{
    collections::HashSet,
    path::PathBuf,
    sync::mpsc::{self, Receiver, Sender},
};

use crate::{
    compositor,
    data_loaders::config::RotatorConfig,
    error,
    error::RotateError,
    gallery_connector::{Candidate, RemoteGallery},
    history::HistoryLedger,
    info,
    platform::{MonitorGeometry, MonitorTopology, WallpaperTarget},
    reconcile::{self, CommittedAsset},
    transform::{self, TransformOptions},
    warn,
};

/* =========================
   DISCOVERY
   ========================= */

/// How the candidate set was obtained. The fallback path trades strict
/// novelty for availability and must stay distinguishable downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    Novel,
    FallbackPossibleDuplicate,
}

impl DiscoveryOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Novel => "novel",
            Self::FallbackPossibleDuplicate => "fallback-possible-duplicate",
        }
    }
}

#[derive(Debug)]
pub struct Discovery {
    pub candidates: Vec<Candidate>,
    pub outcome: DiscoveryOutcome,
}

/// Bounded search for up to `count` candidates not present in `exclude`.
///
/// The gallery offers no catalog and no query-by-identifier, only the
/// randomized current listing and a shuffle action, so the search is:
/// read, filter, accumulate, shuffle, repeat. Transport failures consume the
/// attempt they occurred in. An empty result is a normal outcome; when the
/// exclusion-aware search comes up empty, one unfiltered listing read keeps
/// the rotation alive at the cost of possible repeats.
pub fn discover(
    gallery: &dyn RemoteGallery,
    count: usize,
    exclude: &HashSet<String>,
    max_attempts: u32,
) -> Discovery {
    let mut collected = Vec::<Candidate>::new();
    let mut seen = HashSet::<String>::new();

    if count == 0 {
        return Discovery {
            candidates: collected,
            outcome: DiscoveryOutcome::Novel,
        };
    }

    for attempt in 1..=max_attempts {
        match gallery.read_listing() {
            Ok(listing) => {
                for candidate in listing {
                    if collected.len() >= count {
                        break;
                    }
                    if exclude.contains(&candidate.source_id) {
                        continue;
                    }
                    if !seen.insert(candidate.source_id.clone()) {
                        continue;
                    }
                    collected.push(candidate);
                }
            }
            Err(e) => {
                warn!(
                    "[ROTATOR][DISCOVER] Attempt {}/{}: {}",
                    attempt,
                    max_attempts,
                    RotateError::SourceUnavailable(e)
                );
            }
        }

        if collected.len() >= count {
            break;
        }

        if attempt < max_attempts {
            if let Err(e) = gallery.shuffle() {
                warn!(
                    "[ROTATOR][DISCOVER] Shuffle failed on attempt {}/{}: {}",
                    attempt, max_attempts, e
                );
            }
        }
    }

    if !collected.is_empty() {
        return Discovery {
            candidates: collected,
            outcome: DiscoveryOutcome::Novel,
        };
    }

    // Availability fallback: one unfiltered read, duplicates possible.
    warn!("[ROTATOR][DISCOVER][FALLBACK] Exclusion-aware search exhausted; taking one unfiltered listing");
    match gallery.read_listing() {
        Ok(listing) => {
            for candidate in listing {
                if collected.len() >= count {
                    break;
                }
                if !seen.insert(candidate.source_id.clone()) {
                    continue;
                }
                collected.push(candidate);
            }
        }
        Err(e) => {
            warn!(
                "[ROTATOR][DISCOVER][FALLBACK] {}",
                RotateError::SourceUnavailable(e)
            );
        }
    }

    Discovery {
        candidates: collected,
        outcome: DiscoveryOutcome::FallbackPossibleDuplicate,
    }
}

/* =========================
   CYCLE
   ========================= */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    Discovering,
    Transforming,
    Reconciling,
    RecordingHistory,
    Applying,
    Done,
    Failed,
}

/// What one cycle did, for the scheduler's log line and for tests.
#[derive(Debug)]
pub struct CycleReport {
    pub phase: CyclePhase,
    pub outcome: Option<DiscoveryOutcome>,
    pub discovered: usize,
    pub accepted: usize,
    pub committed: usize,
    /// At least one asset reached the destination this cycle.
    pub updated: bool,
    pub applied: bool,
}

impl CycleReport {
    fn new() -> Self {
        Self {
            phase: CyclePhase::Idle,
            outcome: None,
            discovered: 0,
            accepted: 0,
            committed: 0,
            updated: false,
            applied: false,
        }
    }
}

/// Mutable run flags, owned by the scheduler and passed into every cycle.
/// Nothing else holds a reference.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub stitch_enabled: bool,
    pub cycles_run: u64,
}

impl RunContext {
    pub fn from_config(config: &RotatorConfig) -> Self {
        Self {
            stitch_enabled: config.settings.rotation.stitch,
            cycles_run: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub transform: TransformOptions,
    pub max_shuffle_attempts: u32,
    pub images_per_cycle: usize,
    pub stitched_filename: String,
}

impl EngineOptions {
    pub fn from_config(config: &RotatorConfig) -> Self {
        Self {
            transform: TransformOptions {
                aspect_w: config.settings.transform.aspect_w,
                aspect_h: config.settings.transform.aspect_h,
                brightness_threshold: config.settings.transform.brightness_threshold,
                workers: config.settings.transform.workers,
            },
            max_shuffle_attempts: config.settings.gallery.max_shuffle_attempts,
            images_per_cycle: config.settings.rotation.images_per_cycle,
            stitched_filename: config.settings.rotation.stitched_filename.clone(),
        }
    }
}

pub struct RotationEngine {
    gallery: Box<dyn RemoteGallery>,
    wallpaper: Box<dyn WallpaperTarget>,
    topology: Box<dyn MonitorTopology>,
    ledger: HistoryLedger,
    destination: PathBuf,
    options: EngineOptions,
}

impl RotationEngine {
    pub fn new(
        gallery: Box<dyn RemoteGallery>,
        wallpaper: Box<dyn WallpaperTarget>,
        topology: Box<dyn MonitorTopology>,
        ledger: HistoryLedger,
        destination: PathBuf,
        options: EngineOptions,
    ) -> Self {
        Self {
            gallery,
            wallpaper,
            topology,
            ledger,
            destination,
            options,
        }
    }

    /// One full acquisition-and-reconciliation pass. Every per-candidate and
    /// per-file failure is recovered inside the stage that produced it; the
    /// report carries how far the cycle got and what it changed.
    pub fn run_cycle(&self, ctx: &mut RunContext) -> CycleReport {
        ctx.cycles_run += 1;
        let mut report = CycleReport::new();

        report.phase = CyclePhase::Discovering;
        let monitors = self.topology.monitors();
        if monitors.is_empty() {
            warn!("[ROTATOR][CYCLE] No monitors detected; assuming one unknown-size target");
        }

        let count = self.desired_count(&monitors);
        let exclude = self.ledger.load();
        info!(
            "[ROTATOR][DISCOVER] Looking for {} candidate(s), {} identifier(s) excluded",
            count,
            exclude.len()
        );

        let discovery = discover(
            self.gallery.as_ref(),
            count,
            &exclude,
            self.options.max_shuffle_attempts,
        );
        report.outcome = Some(discovery.outcome);
        report.discovered = discovery.candidates.len();
        info!(
            "[ROTATOR][DISCOVER] {} candidate(s) via {} path",
            report.discovered,
            discovery.outcome.as_str()
        );

        if discovery.candidates.is_empty() {
            // Source exhaustion or connectivity failure; the destination
            // stays exactly as the last successful cycle left it.
            report.phase = CyclePhase::Done;
            return report;
        }

        report.phase = CyclePhase::Transforming;
        let scratch = match tempfile::tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                error!("[ROTATOR][TRANSFORM] Cannot create scratch dir: {e}");
                report.phase = CyclePhase::Failed;
                return report;
            }
        };

        let accepted = transform::run(
            self.gallery.as_ref(),
            &discovery.candidates,
            scratch.path(),
            &self.options.transform,
        );
        report.accepted = accepted.len();
        if accepted.is_empty() {
            info!("[ROTATOR][TRANSFORM] No candidate survived; destination left untouched");
            report.phase = CyclePhase::Done;
            return report;
        }

        report.phase = CyclePhase::Reconciling;
        let committed = reconcile::commit(&accepted, &self.destination);
        report.committed = committed.len();
        if committed.is_empty() {
            report.phase = CyclePhase::Done;
            return report;
        }
        report.updated = true;
        info!(
            "[ROTATOR][RECONCILE] Destination converged to {} asset(s)",
            report.committed
        );

        // Strictly after commit: a crash earlier in the cycle must never mark
        // an identifier as seen without its file existing in the destination.
        report.phase = CyclePhase::RecordingHistory;
        let ids: Vec<String> = committed.iter().map(|c| c.source_id.clone()).collect();
        match self.ledger.append(&ids) {
            Ok(n) => info!("[ROTATOR][HISTORY] Recorded {n} new identifier(s)"),
            Err(e) => error!("[ROTATOR][HISTORY] Failed to record delivered identifiers: {e}"),
        }

        report.phase = CyclePhase::Applying;
        report.applied = self.apply_step(ctx, &committed, &monitors);

        report.phase = CyclePhase::Done;
        report
    }

    fn desired_count(&self, monitors: &[MonitorGeometry]) -> usize {
        if self.options.images_per_cycle > 0 {
            self.options.images_per_cycle
        } else {
            monitors.len().max(1)
        }
    }

    fn apply_step(
        &self,
        ctx: &RunContext,
        committed: &[CommittedAsset],
        monitors: &[MonitorGeometry],
    ) -> bool {
        let result = if ctx.stitch_enabled && !monitors.is_empty() {
            self.apply_stitched(committed, monitors)
        } else {
            self.apply_single(committed)
        };

        match result {
            Ok(applied_path) => {
                info!("[ROTATOR][APPLY] Wallpaper set from {}", applied_path.display());
                true
            }
            Err(e) => {
                warn!("[ROTATOR][APPLY] {}", RotateError::ApplyFailed(e));
                false
            }
        }
    }

    fn apply_stitched(
        &self,
        committed: &[CommittedAsset],
        monitors: &[MonitorGeometry],
    ) -> Result<PathBuf, String> {
        if committed.len() < monitors.len() {
            return Err(format!(
                "stitch needs one image per monitor ({} committed, {} monitor(s))",
                committed.len(),
                monitors.len()
            ));
        }

        let images: Vec<PathBuf> = committed
            .iter()
            .take(monitors.len())
            .map(|c| c.final_path.clone())
            .collect();
        let output = self.destination.join(&self.options.stitched_filename);

        compositor::stitch(&images, monitors, &output)?;
        self.wallpaper.apply(&output)?;
        Ok(output)
    }

    fn apply_single(&self, committed: &[CommittedAsset]) -> Result<PathBuf, String> {
        let first = committed
            .first()
            .ok_or_else(|| "no committed asset to apply".to_string())?;
        self.wallpaper.apply(&first.final_path)?;
        Ok(first.final_path.clone())
    }
}

/* =========================
   COMMAND SURFACE
   ========================= */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotatorCommand {
    RunNow,
    Stop,
    ToggleStitch,
}

/// Handed to the tray/UI layer. Each method is a direct call into the core;
/// the core has no knowledge of how commands are triggered. Commands arriving
/// while a cycle is in flight are queued by the channel and observed at the
/// scheduler's next tick, never run concurrently.
#[derive(Clone)]
pub struct RotatorHandle {
    tx: Sender<RotatorCommand>,
}

impl RotatorHandle {
    pub fn run_cycle_now(&self) {
        let _ = self.tx.send(RotatorCommand::RunNow);
    }

    pub fn stop_scheduler(&self) {
        let _ = self.tx.send(RotatorCommand::Stop);
    }

    pub fn toggle_stitch_mode(&self) {
        let _ = self.tx.send(RotatorCommand::ToggleStitch);
    }
}

pub fn command_channel() -> (RotatorHandle, Receiver<RotatorCommand>) {
    let (tx, rx) = mpsc::channel();
    (RotatorHandle { tx }, rx)
}

/* =========================
   TESTS
   ========================= */

#[cfg(test)]
mod tests {
    use std::{
        collections::{HashMap, VecDeque},
        fs,
        io::Cursor,
        path::{Path, PathBuf},
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc, Mutex,
        },
    };

    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

    use super::*;
    use crate::error::GalleryError;

    struct FakeGallery {
        current: Mutex<Vec<Candidate>>,
        upcoming: Mutex<VecDeque<Vec<Candidate>>>,
        bytes: Mutex<HashMap<String, Vec<u8>>>,
        listing_reads: AtomicUsize,
        shuffles: AtomicUsize,
        listing_failures: AtomicUsize,
    }

    impl FakeGallery {
        fn new(pages: Vec<Vec<Candidate>>) -> Arc<Self> {
            let mut queue = VecDeque::from(pages);
            let current = queue.pop_front().unwrap_or_default();
            Arc::new(Self {
                current: Mutex::new(current),
                upcoming: Mutex::new(queue),
                bytes: Mutex::new(HashMap::new()),
                listing_reads: AtomicUsize::new(0),
                shuffles: AtomicUsize::new(0),
                listing_failures: AtomicUsize::new(0),
            })
        }

        fn with_bytes(self: Arc<Self>, entries: &[(&str, Vec<u8>)]) -> Arc<Self> {
            {
                let mut bytes = self.bytes.lock().unwrap();
                for (id, b) in entries {
                    bytes.insert(id.to_string(), b.clone());
                }
            }
            self
        }

        fn fail_next_listings(&self, n: usize) {
            self.listing_failures.store(n, Ordering::SeqCst);
        }
    }

    impl RemoteGallery for Arc<FakeGallery> {
        fn read_listing(&self) -> Result<Vec<Candidate>, GalleryError> {
            self.listing_reads.fetch_add(1, Ordering::SeqCst);
            let failures = self.listing_failures.load(Ordering::SeqCst);
            if failures > 0 {
                self.listing_failures.store(failures - 1, Ordering::SeqCst);
                return Err(GalleryError::Transport {
                    url: "https://g.test/gallery".to_string(),
                    reason: "connection refused".to_string(),
                });
            }
            Ok(self.current.lock().unwrap().clone())
        }

        fn shuffle(&self) -> Result<(), GalleryError> {
            self.shuffles.fetch_add(1, Ordering::SeqCst);
            if let Some(next) = self.upcoming.lock().unwrap().pop_front() {
                *self.current.lock().unwrap() = next;
            }
            Ok(())
        }

        fn fetch(&self, source_id: &str) -> Result<Vec<u8>, GalleryError> {
            self.bytes
                .lock()
                .unwrap()
                .get(source_id)
                .cloned()
                .ok_or_else(|| GalleryError::Status {
                    status: 404,
                    url: source_id.to_string(),
                })
        }
    }

    struct FakeWallpaper {
        applied: Arc<Mutex<Vec<PathBuf>>>,
    }

    impl WallpaperTarget for FakeWallpaper {
        fn apply(&self, image_path: &Path) -> Result<(), String> {
            self.applied.lock().unwrap().push(image_path.to_path_buf());
            Ok(())
        }
    }

    struct FakeMonitors {
        layout: Vec<MonitorGeometry>,
    }

    impl MonitorTopology for FakeMonitors {
        fn monitors(&self) -> Vec<MonitorGeometry> {
            self.layout.clone()
        }
    }

    fn candidate(id: &str) -> Candidate {
        Candidate::new(id)
    }

    fn dark_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([40, 40, 40]));
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .expect("encode png");
        buf
    }

    fn monitor(x: i32, y: i32, width: u32, height: u32) -> MonitorGeometry {
        MonitorGeometry {
            x,
            y,
            width,
            height,
        }
    }

    fn engine_options() -> EngineOptions {
        EngineOptions {
            transform: TransformOptions {
                aspect_w: 16,
                aspect_h: 9,
                brightness_threshold: 200.0,
                workers: 1,
            },
            max_shuffle_attempts: 3,
            images_per_cycle: 0,
            stitched_filename: "span.jpg".to_string(),
        }
    }

    struct Harness {
        engine: RotationEngine,
        applied: Arc<Mutex<Vec<PathBuf>>>,
        dest: tempfile::TempDir,
        _state: tempfile::TempDir,
        ledger_path: PathBuf,
    }

    fn harness(
        gallery: Arc<FakeGallery>,
        monitors: Vec<MonitorGeometry>,
        options: EngineOptions,
    ) -> Harness {
        let dest = tempfile::tempdir().expect("dest");
        let state = tempfile::tempdir().expect("state");
        let ledger_path = state.path().join("history.txt");
        let applied = Arc::new(Mutex::new(Vec::new()));

        let engine = RotationEngine::new(
            Box::new(gallery),
            Box::new(FakeWallpaper {
                applied: Arc::clone(&applied),
            }),
            Box::new(FakeMonitors { layout: monitors }),
            HistoryLedger::new(ledger_path.clone()),
            dest.path().to_path_buf(),
            options,
        );

        Harness {
            engine,
            applied,
            dest,
            _state: state,
            ledger_path,
        }
    }

    fn dest_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .expect("read dest")
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    /* ---- discovery ---- */

    #[test]
    fn discover_skips_history_and_returns_the_rest() {
        // History has {A, B}; the listing after one shuffle is [A, C, D].
        let gallery = FakeGallery::new(vec![
            vec![],
            vec![candidate("A"), candidate("C"), candidate("D")],
        ]);
        let exclude: HashSet<String> = ["A".to_string(), "B".to_string()].into();

        let discovery = discover(&gallery, 2, &exclude, 3);
        assert_eq!(discovery.outcome, DiscoveryOutcome::Novel);
        assert_eq!(
            discovery
                .candidates
                .iter()
                .map(|c| c.source_id.as_str())
                .collect::<Vec<_>>(),
            vec!["C", "D"]
        );
        assert_eq!(gallery.shuffles.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn discover_never_exceeds_count() {
        let gallery = FakeGallery::new(vec![vec![
            candidate("a"),
            candidate("b"),
            candidate("c"),
            candidate("d"),
            candidate("e"),
        ]]);

        let discovery = discover(&gallery, 2, &HashSet::new(), 3);
        assert_eq!(discovery.candidates.len(), 2);
        assert_eq!(gallery.shuffles.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn discover_novel_result_respects_the_exclusion_set() {
        let gallery = FakeGallery::new(vec![vec![
            candidate("a"),
            candidate("b"),
            candidate("c"),
        ]]);
        let exclude: HashSet<String> = ["b".to_string()].into();

        let discovery = discover(&gallery, 5, &exclude, 2);
        assert_eq!(discovery.outcome, DiscoveryOutcome::Novel);
        assert!(discovery
            .candidates
            .iter()
            .all(|c| !exclude.contains(&c.source_id)));
    }

    #[test]
    fn discover_terminates_within_the_attempt_budget() {
        // Everything the gallery offers is already in history.
        let gallery = FakeGallery::new(vec![vec![candidate("seen")]]);
        let exclude: HashSet<String> = ["seen".to_string()].into();

        let discovery = discover(&gallery, 4, &exclude, 5);
        assert!(gallery.shuffles.load(Ordering::SeqCst) <= 5);
        // exclusion-aware reads plus the single unfiltered fallback read
        assert_eq!(gallery.listing_reads.load(Ordering::SeqCst), 6);
        assert_eq!(discovery.outcome, DiscoveryOutcome::FallbackPossibleDuplicate);
        assert_eq!(discovery.candidates.len(), 1);
        assert_eq!(discovery.candidates[0].source_id, "seen");
    }

    #[test]
    fn discover_counts_transport_failures_against_the_budget() {
        let gallery = FakeGallery::new(vec![vec![]]);
        gallery.fail_next_listings(100);

        let discovery = discover(&gallery, 1, &HashSet::new(), 3);
        assert!(discovery.candidates.is_empty());
        assert_eq!(discovery.outcome, DiscoveryOutcome::FallbackPossibleDuplicate);
        // three budgeted attempts plus the fallback read, no more
        assert_eq!(gallery.listing_reads.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn discover_dedupes_across_overlapping_shuffles() {
        let gallery = FakeGallery::new(vec![
            vec![candidate("a")],
            vec![candidate("a"), candidate("b")],
        ]);

        let discovery = discover(&gallery, 2, &HashSet::new(), 3);
        assert_eq!(
            discovery
                .candidates
                .iter()
                .map(|c| c.source_id.as_str())
                .collect::<Vec<_>>(),
            vec!["a", "b"]
        );
    }

    /* ---- full cycles ---- */

    #[test]
    fn cycle_converges_destination_ledger_and_wallpaper() {
        let gallery = FakeGallery::new(vec![vec![
            candidate("https://g.test/alpha.png"),
            candidate("https://g.test/beta.png"),
        ]])
        .with_bytes(&[
            ("https://g.test/alpha.png", dark_png(64, 36)),
            ("https://g.test/beta.png", dark_png(64, 36)),
        ]);

        let h = harness(
            gallery,
            vec![monitor(0, 0, 64, 36), monitor(64, 0, 64, 36)],
            engine_options(),
        );
        fs::write(h.dest.path().join("old1.jpg"), b"stale").expect("seed old");

        let mut ctx = RunContext {
            stitch_enabled: false,
            cycles_run: 0,
        };
        let report = h.engine.run_cycle(&mut ctx);

        assert_eq!(report.phase, CyclePhase::Done);
        assert_eq!(report.outcome, Some(DiscoveryOutcome::Novel));
        assert_eq!(report.committed, 2);
        assert!(report.updated);
        assert!(report.applied);

        // exact convergence: the stale file is gone, only the new set remains
        assert_eq!(dest_names(h.dest.path()), vec!["alpha.png", "beta.png"]);

        let ledger = HistoryLedger::new(h.ledger_path.clone()).load();
        assert!(ledger.contains("https://g.test/alpha.png"));
        assert!(ledger.contains("https://g.test/beta.png"));

        // single mode applies the first committed asset
        let applied = h.applied.lock().unwrap();
        assert_eq!(applied.len(), 1);
        assert!(applied[0].ends_with("alpha.png"));
        assert_eq!(ctx.cycles_run, 1);
    }

    #[test]
    fn cycle_with_empty_discovery_leaves_destination_untouched() {
        let gallery = FakeGallery::new(vec![vec![]]);
        let h = harness(gallery, vec![monitor(0, 0, 64, 36)], engine_options());
        fs::write(h.dest.path().join("old1.jpg"), b"keep me").expect("seed old");

        let mut ctx = RunContext {
            stitch_enabled: false,
            cycles_run: 0,
        };
        let report = h.engine.run_cycle(&mut ctx);

        assert_eq!(report.phase, CyclePhase::Done);
        assert!(!report.updated);
        assert!(!report.applied);
        assert_eq!(dest_names(h.dest.path()), vec!["old1.jpg"]);
        assert_eq!(
            fs::read(h.dest.path().join("old1.jpg")).expect("read"),
            b"keep me"
        );
        assert!(h.applied.lock().unwrap().is_empty());
    }

    #[test]
    fn cycle_does_not_record_history_for_dropped_candidates() {
        let gallery = FakeGallery::new(vec![vec![
            candidate("https://g.test/alpha.png"),
            candidate("https://g.test/broken.png"),
        ]])
        .with_bytes(&[("https://g.test/alpha.png", dark_png(64, 36))]);

        let mut options = engine_options();
        options.images_per_cycle = 2;
        let h = harness(gallery, vec![monitor(0, 0, 64, 36)], options);

        let mut ctx = RunContext {
            stitch_enabled: false,
            cycles_run: 0,
        };
        let report = h.engine.run_cycle(&mut ctx);

        assert_eq!(report.discovered, 2);
        assert_eq!(report.committed, 1);

        let ledger = HistoryLedger::new(h.ledger_path.clone()).load();
        assert!(ledger.contains("https://g.test/alpha.png"));
        assert!(!ledger.contains("https://g.test/broken.png"));
    }

    #[test]
    fn second_cycle_skips_already_delivered_sources() {
        let gallery = FakeGallery::new(vec![vec![
            candidate("https://g.test/alpha.png"),
            candidate("https://g.test/beta.png"),
        ]])
        .with_bytes(&[
            ("https://g.test/alpha.png", dark_png(64, 36)),
            ("https://g.test/beta.png", dark_png(64, 36)),
        ]);

        let mut options = engine_options();
        options.images_per_cycle = 1;
        let h = harness(gallery, vec![monitor(0, 0, 64, 36)], options);

        let mut ctx = RunContext {
            stitch_enabled: false,
            cycles_run: 0,
        };
        let first = h.engine.run_cycle(&mut ctx);
        assert_eq!(first.committed, 1);
        assert_eq!(dest_names(h.dest.path()), vec!["alpha.png"]);

        let second = h.engine.run_cycle(&mut ctx);
        assert_eq!(second.outcome, Some(DiscoveryOutcome::Novel));
        assert_eq!(second.committed, 1);
        // beta replaced alpha as the one delivered asset
        assert_eq!(dest_names(h.dest.path()), vec!["beta.png"]);
    }

    #[test]
    fn stitch_mode_applies_a_spanning_canvas() {
        let gallery = FakeGallery::new(vec![vec![
            candidate("https://g.test/alpha.png"),
            candidate("https://g.test/beta.png"),
        ]])
        .with_bytes(&[
            ("https://g.test/alpha.png", dark_png(64, 36)),
            ("https://g.test/beta.png", dark_png(64, 36)),
        ]);

        let h = harness(
            gallery,
            vec![monitor(0, 0, 64, 36), monitor(64, 0, 64, 36)],
            engine_options(),
        );

        let mut ctx = RunContext {
            stitch_enabled: true,
            cycles_run: 0,
        };
        let report = h.engine.run_cycle(&mut ctx);

        assert!(report.updated);
        assert!(report.applied);

        let applied = h.applied.lock().unwrap();
        assert_eq!(applied.len(), 1);
        assert!(applied[0].ends_with("span.jpg"));

        let canvas = image::open(h.dest.path().join("span.jpg")).expect("open canvas");
        use image::GenericImageView;
        assert_eq!(canvas.dimensions(), (128, 36));
    }

    #[test]
    fn stitch_with_too_few_assets_fails_apply_but_still_converges() {
        // Two monitors, but the gallery only has one usable candidate.
        let gallery = FakeGallery::new(vec![vec![candidate("https://g.test/alpha.png")]])
            .with_bytes(&[("https://g.test/alpha.png", dark_png(64, 36))]);

        let h = harness(
            gallery,
            vec![monitor(0, 0, 64, 36), monitor(64, 0, 64, 36)],
            engine_options(),
        );

        let mut ctx = RunContext {
            stitch_enabled: true,
            cycles_run: 0,
        };
        let report = h.engine.run_cycle(&mut ctx);

        assert!(report.updated);
        assert!(!report.applied);
        // the destination still converged to the one accepted asset
        assert_eq!(dest_names(h.dest.path()), vec!["alpha.png"]);
        // and the previous wallpaper was never replaced
        assert!(h.applied.lock().unwrap().is_empty());
    }

    #[test]
    fn zero_monitors_assumes_a_single_unknown_target() {
        let gallery = FakeGallery::new(vec![vec![candidate("https://g.test/alpha.png")]])
            .with_bytes(&[("https://g.test/alpha.png", dark_png(64, 36))]);

        // stitch requested, but with no layout the cycle falls back to single
        let h = harness(gallery, vec![], engine_options());
        let mut ctx = RunContext {
            stitch_enabled: true,
            cycles_run: 0,
        };
        let report = h.engine.run_cycle(&mut ctx);

        assert_eq!(report.committed, 1);
        assert!(report.applied);
        let applied = h.applied.lock().unwrap();
        assert!(applied[0].ends_with("alpha.png"));
    }

    /* ---- command surface ---- */

    #[test]
    fn handle_delivers_commands_in_order() {
        let (handle, rx) = command_channel();
        handle.run_cycle_now();
        handle.toggle_stitch_mode();
        handle.stop_scheduler();

        assert_eq!(rx.try_recv(), Ok(RotatorCommand::RunNow));
        assert_eq!(rx.try_recv(), Ok(RotatorCommand::ToggleStitch));
        assert_eq!(rx.try_recv(), Ok(RotatorCommand::Stop));
        assert!(rx.try_recv().is_err());
    }
}
