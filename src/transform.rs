use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        mpsc,
    },
    thread,
};

use image::{DynamicImage, GenericImageView};

use crate::{
    error::RotateError,
    gallery_connector::{Candidate, RemoteGallery},
    info,
    utility::filename_for_source,
    warn,
};

/// Source ratios within this distance of the target are left uncropped.
pub const RATIO_EPSILON: f64 = 0.01;

// Average luma is computed over a downsampled copy; photographic sources are
// large and per-pixel exactness does not change the accept/reject outcome.
const LUMA_SAMPLE_EDGE: u32 = 64;

/// A downloaded, not-yet-validated file. Lives in the cycle's scratch
/// directory and disappears with it.
#[derive(Debug, Clone)]
pub struct StagedAsset {
    pub source_id: String,
    pub scratch_path: PathBuf,
}

/// Survived crop and brightness checks; ownership passes to the reconciler.
#[derive(Debug, Clone)]
pub struct AcceptedAsset {
    pub source_id: String,
    pub transformed_path: PathBuf,
}

#[derive(Debug, Clone, Copy)]
pub struct TransformOptions {
    pub aspect_w: u32,
    pub aspect_h: u32,
    pub brightness_threshold: f32,
    pub workers: usize,
}

/// Runs fetch -> crop -> brightness for every candidate and returns the
/// survivors in discovery order. Candidates are independent; a bounded worker
/// pool processes them concurrently and this function joins all workers
/// before returning, so reconciliation never observes an in-flight transform.
pub fn run(
    gallery: &dyn RemoteGallery,
    candidates: &[Candidate],
    scratch: &Path,
    options: &TransformOptions,
) -> Vec<AcceptedAsset> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let workers = options.workers.clamp(1, candidates.len());
    if workers == 1 {
        return candidates
            .iter()
            .enumerate()
            .filter_map(|(idx, c)| transform_one(gallery, idx, c, scratch, options))
            .collect();
    }

    let next = AtomicUsize::new(0);
    let (tx, rx) = mpsc::channel::<(usize, AcceptedAsset)>();

    thread::scope(|scope| {
        for _ in 0..workers {
            let tx = tx.clone();
            let next = &next;
            scope.spawn(move || loop {
                let idx = next.fetch_add(1, Ordering::Relaxed);
                let Some(candidate) = candidates.get(idx) else {
                    break;
                };
                if let Some(accepted) = transform_one(gallery, idx, candidate, scratch, options) {
                    let _ = tx.send((idx, accepted));
                }
            });
        }
        drop(tx);
    });

    let mut indexed: Vec<(usize, AcceptedAsset)> = rx.iter().collect();
    indexed.sort_by_key(|(idx, _)| *idx);
    indexed.into_iter().map(|(_, accepted)| accepted).collect()
}

fn transform_one(
    gallery: &dyn RemoteGallery,
    idx: usize,
    candidate: &Candidate,
    scratch: &Path,
    options: &TransformOptions,
) -> Option<AcceptedAsset> {
    let staged = match fetch_candidate(gallery, idx, candidate, scratch) {
        Ok(staged) => staged,
        Err(e) => {
            warn!("[ROTATOR][TRANSFORM] {e}");
            return None;
        }
    };

    match transform_staged(&staged, scratch, options) {
        Ok(accepted) => accepted,
        Err(e) => {
            warn!("[ROTATOR][TRANSFORM] {e}");
            let _ = fs::remove_file(&staged.scratch_path);
            None
        }
    }
}

/// Downloads the candidate's bytes into the scratch directory. Failure drops
/// the candidate for this cycle; there is no intra-cycle retry.
fn fetch_candidate(
    gallery: &dyn RemoteGallery,
    idx: usize,
    candidate: &Candidate,
    scratch: &Path,
) -> Result<StagedAsset, RotateError> {
    let bytes = gallery
        .fetch(&candidate.source_id)
        .map_err(|e| RotateError::FetchFailed {
            source_id: candidate.source_id.clone(),
            reason: e.to_string(),
        })?;

    let raw_dir = scratch.join("raw");
    fs::create_dir_all(&raw_dir).map_err(|e| RotateError::FetchFailed {
        source_id: candidate.source_id.clone(),
        reason: format!("cannot create scratch dir: {e}"),
    })?;

    let scratch_path = raw_dir.join(format!("{idx:03}-{}", filename_for_source(&candidate.source_id)));
    fs::write(&scratch_path, &bytes).map_err(|e| RotateError::FetchFailed {
        source_id: candidate.source_id.clone(),
        reason: format!("cannot stage download: {e}"),
    })?;

    Ok(StagedAsset {
        source_id: candidate.source_id.clone(),
        scratch_path,
    })
}

/// Crop-to-aspect plus the brightness gate. `Ok(None)` is the intended filter
/// outcome (too bright), not an error.
fn transform_staged(
    staged: &StagedAsset,
    scratch: &Path,
    options: &TransformOptions,
) -> Result<Option<AcceptedAsset>, RotateError> {
    let img = image::open(&staged.scratch_path).map_err(|e| RotateError::TransformRejected {
        source_id: staged.source_id.clone(),
        reason: format!("decode failed: {e}"),
    })?;

    let (src_w, src_h) = img.dimensions();
    let cropped = match crop_window(src_w, src_h, options.aspect_w, options.aspect_h) {
        Some((x, y, w, h)) => img.crop_imm(x, y, w, h),
        None => img,
    };

    let luma = average_luma(&cropped);
    if luma >= options.brightness_threshold {
        // Intended filter outcome, not an error: glare-inducing wallpapers
        // are silently dropped.
        info!(
            "[ROTATOR][TRANSFORM] Rejected '{}': average luma {:.1} >= {:.1}",
            staged.source_id, luma, options.brightness_threshold
        );
        let _ = fs::remove_file(&staged.scratch_path);
        return Ok(None);
    }

    let out_dir = scratch.join("out");
    fs::create_dir_all(&out_dir).map_err(|e| RotateError::TransformRejected {
        source_id: staged.source_id.clone(),
        reason: format!("cannot create output dir: {e}"),
    })?;

    let transformed_path = out_dir.join(filename_for_source(&staged.source_id));
    cropped
        .save(&transformed_path)
        .map_err(|e| RotateError::TransformRejected {
            source_id: staged.source_id.clone(),
            reason: format!("encode failed: {e}"),
        })?;

    let _ = fs::remove_file(&staged.scratch_path);

    Ok(Some(AcceptedAsset {
        source_id: staged.source_id.clone(),
        transformed_path,
    }))
}

/// Largest centered window of the target aspect ratio that fits the source.
/// Returns `None` when the source is already within epsilon of the target.
/// Rounding always goes down so the window never exceeds the source bounds,
/// and the result is deterministic for a given input.
pub fn crop_window(
    src_w: u32,
    src_h: u32,
    aspect_w: u32,
    aspect_h: u32,
) -> Option<(u32, u32, u32, u32)> {
    if src_w == 0 || src_h == 0 || aspect_w == 0 || aspect_h == 0 {
        return None;
    }

    let src_ratio = f64::from(src_w) / f64::from(src_h);
    let target_ratio = f64::from(aspect_w) / f64::from(aspect_h);
    if (src_ratio - target_ratio).abs() <= RATIO_EPSILON {
        return None;
    }

    if src_ratio > target_ratio {
        // Wider than the target: full height, narrower centered window.
        let crop_w = ((u64::from(src_h) * u64::from(aspect_w)) / u64::from(aspect_h)) as u32;
        let crop_w = crop_w.clamp(1, src_w);
        let x = (src_w - crop_w) / 2;
        Some((x, 0, crop_w, src_h))
    } else {
        let crop_h = ((u64::from(src_w) * u64::from(aspect_h)) / u64::from(aspect_w)) as u32;
        let crop_h = crop_h.clamp(1, src_h);
        let y = (src_h - crop_h) / 2;
        Some((0, y, src_w, crop_h))
    }
}

/// Average perceptual luma on the 0-255 scale, integer Rec.601 weights
/// (299/587/114 per mille) over a downsampled copy.
pub fn average_luma(img: &DynamicImage) -> f32 {
    let sample = if u64::from(img.width()) * u64::from(img.height())
        > u64::from(LUMA_SAMPLE_EDGE) * u64::from(LUMA_SAMPLE_EDGE)
    {
        img.thumbnail(LUMA_SAMPLE_EDGE, LUMA_SAMPLE_EDGE)
    } else {
        img.clone()
    };

    let rgb = sample.to_rgb8();
    let pixels = u64::from(rgb.width()) * u64::from(rgb.height());
    if pixels == 0 {
        return 0.0;
    }

    let mut acc: u64 = 0;
    for p in rgb.pixels() {
        acc += 299 * u64::from(p[0]) + 587 * u64::from(p[1]) + 114 * u64::from(p[2]);
    }

    (acc as f64 / (pixels as f64 * 1000.0)) as f32
}
