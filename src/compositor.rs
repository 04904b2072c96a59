use std::path::{Path, PathBuf};

use image::{imageops, imageops::FilterType, RgbImage};

use crate::{info, platform::MonitorGeometry};

/// Composes one canvas spanning the bounding box of all monitor geometries,
/// one committed image per monitor in sequence order. Every image is fitted
/// to its monitor with a centered cover-crop before placement.
///
/// Fewer images than monitors is an error, never a partial canvas; the
/// caller reports the apply step failed and the previous wallpaper stays
/// active.
pub fn stitch(
    images: &[PathBuf],
    monitors: &[MonitorGeometry],
    output: &Path,
) -> Result<(), String> {
    if monitors.is_empty() {
        return Err("no monitor geometry to stitch against".to_string());
    }
    if images.len() < monitors.len() {
        return Err(format!(
            "stitch needs one image per monitor: {} image(s) for {} monitor(s)",
            images.len(),
            monitors.len()
        ));
    }
    if monitors.iter().any(|m| m.width == 0 || m.height == 0) {
        return Err("monitor with zero extent in layout".to_string());
    }

    let (origin_x, origin_y, canvas_w, canvas_h) =
        bounding_box(monitors).ok_or_else(|| "empty monitor layout".to_string())?;

    let mut canvas = RgbImage::new(canvas_w, canvas_h);
    for (monitor, path) in monitors.iter().zip(images) {
        let img = image::open(path)
            .map_err(|e| format!("failed to open {}: {e}", path.display()))?;
        let fitted = img
            .resize_to_fill(monitor.width, monitor.height, FilterType::Lanczos3)
            .to_rgb8();

        let off_x = i64::from(monitor.x - origin_x);
        let off_y = i64::from(monitor.y - origin_y);
        imageops::overlay(&mut canvas, &fitted, off_x, off_y);
    }

    canvas
        .save(output)
        .map_err(|e| format!("failed to write {}: {e}", output.display()))?;

    info!(
        "[ROTATOR][STITCH] Composed {}x{} canvas from {} image(s) into {}",
        canvas_w,
        canvas_h,
        monitors.len(),
        output.display()
    );
    Ok(())
}

/// Bounding box of all monitor rects: origin plus canvas dimensions.
pub fn bounding_box(monitors: &[MonitorGeometry]) -> Option<(i32, i32, u32, u32)> {
    let min_x = monitors.iter().map(|m| m.x).min()?;
    let min_y = monitors.iter().map(|m| m.y).min()?;
    let max_x = monitors.iter().map(|m| m.x + m.width as i32).max()?;
    let max_y = monitors.iter().map(|m| m.y + m.height as i32).max()?;

    Some((
        min_x,
        min_y,
        (max_x - min_x).max(0) as u32,
        (max_y - min_y).max(0) as u32,
    ))
}
