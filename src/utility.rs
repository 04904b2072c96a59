#[cfg(windows)]
pub fn to_wstring(s: &str) -> Vec<u16> {
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;

    OsStr::new(s)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect()
}

const FALLBACK_FILENAME: &str = "wallpaper.jpg";

/// Derives a destination filename from a source identifier (usually the image
/// URL): last path segment, query/fragment stripped, unsafe characters
/// replaced, and the extension pinned to a format the transform step can
/// encode again.
pub fn filename_for_source(source_id: &str) -> String {
    let trimmed = source_id
        .split(['?', '#'])
        .next()
        .unwrap_or(source_id)
        .trim_end_matches('/');

    let segment = trimmed.rsplit('/').next().unwrap_or(trimmed);

    let mut name: String = segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    name = name.trim_matches('.').to_string();
    if name.is_empty() {
        return FALLBACK_FILENAME.to_string();
    }

    let lower = name.to_ascii_lowercase();
    let known_ext = lower.ends_with(".jpg") || lower.ends_with(".jpeg") || lower.ends_with(".png");
    if !known_ext {
        match name.rfind('.') {
            Some(dot) => name.truncate(dot),
            None => {}
        }
        name.push_str(".jpg");
    }

    name
}

/// Parses a "W:H" aspect ratio string (e.g. "21:9").
pub fn parse_aspect_ratio(value: &str) -> Option<(u32, u32)> {
    let (w, h) = value.split_once(':')?;
    let w: u32 = w.trim().parse().ok()?;
    let h: u32 = h.trim().parse().ok()?;
    if w == 0 || h == 0 {
        return None;
    }
    Some((w, h))
}
