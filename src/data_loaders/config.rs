use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde_yaml::{Mapping, Value};

use super::yaml::load_yaml;
use crate::utility::parse_aspect_ratio;

#[derive(Debug, Clone)]
pub struct RotatorConfig {
    pub debug: bool,
    pub log_level: String,
    pub settings: RotatorSettings,
}

impl Default for RotatorConfig {
    fn default() -> Self {
        Self {
            debug: false,
            log_level: "warn".to_string(),
            settings: RotatorSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RotatorSettings {
    pub gallery: GallerySettings,
    pub transform: TransformSettings,
    pub rotation: RotationSettings,
    pub runtime: RuntimeSettings,
}

#[derive(Debug, Clone)]
pub struct GallerySettings {
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub max_shuffle_attempts: u32,
}

#[derive(Debug, Clone)]
pub struct TransformSettings {
    pub aspect_w: u32,
    pub aspect_h: u32,
    pub brightness_threshold: f32,
    pub workers: usize,
}

#[derive(Debug, Clone)]
pub struct RotationSettings {
    pub destination_dir: Option<PathBuf>,
    pub poll_interval_secs: u64,
    pub images_per_cycle: usize,
    pub stitch: bool,
    pub stitched_filename: String,
}

#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub tick_sleep_ms: u64,
}

impl Default for GallerySettings {
    fn default() -> Self {
        Self {
            base_url: "https://ultrawidewallpapers.net".to_string(),
            request_timeout_secs: 15,
            max_shuffle_attempts: 6,
        }
    }
}

impl Default for TransformSettings {
    fn default() -> Self {
        Self {
            aspect_w: 21,
            aspect_h: 9,
            brightness_threshold: 200.0,
            workers: 2,
        }
    }
}

impl Default for RotationSettings {
    fn default() -> Self {
        Self {
            destination_dir: None,
            poll_interval_secs: 1800,
            images_per_cycle: 0, // 0 -> one per detected monitor
            stitch: false,
            stitched_filename: "stitched.jpg".to_string(),
        }
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self { tick_sleep_ms: 250 }
    }
}

impl RotatorConfig {
    pub fn load(path: &Path) -> Option<Self> {
        let value = load_yaml(path)?;
        Self::from_yaml(&value)
    }

    pub fn from_yaml(root: &Value) -> Option<Self> {
        let map = root.as_mapping()?;

        let mut config = Self::default();
        config.debug = bool_any(map, &["debug", "debug_mode"]).unwrap_or(config.debug);
        config.log_level = str_any(map, &["log_level", "logging"])
            .unwrap_or("warn")
            .to_lowercase();
        config.settings = parse_settings(map);

        Some(config)
    }

    pub fn destination_dir(&self) -> PathBuf {
        self.settings
            .rotation
            .destination_dir
            .clone()
            .unwrap_or_else(crate::paths::default_destination_dir)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.gallery.request_timeout_secs.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.settings.rotation.poll_interval_secs.max(30))
    }
}

fn parse_settings(root: &Mapping) -> RotatorSettings {
    let mut settings = RotatorSettings::default();

    let settings_map = mapping_at(root, "settings");
    let gallery_map = settings_map.and_then(|v| mapping_at(v, "gallery"));
    let transform_map = settings_map.and_then(|v| mapping_at(v, "transform"));
    let rotation_map = settings_map.and_then(|v| mapping_at(v, "rotation"));
    let runtime_map = settings_map.and_then(|v| mapping_at(v, "runtime"));

    if let Some(gallery) = gallery_map {
        if let Some(url) = str_any(gallery, &["base_url", "gallery_url", "url"]) {
            let url = url.trim().trim_end_matches('/');
            if !url.is_empty() {
                settings.gallery.base_url = url.to_string();
            }
        }
        settings.gallery.request_timeout_secs = u64_any(
            gallery,
            &["request_timeout_secs", "timeout_secs"],
        )
            .unwrap_or(settings.gallery.request_timeout_secs)
            .max(1);
        settings.gallery.max_shuffle_attempts = u64_any(
            gallery,
            &["max_shuffle_attempts", "max_attempts", "shuffle_attempts"],
        )
            .map(|v| v as u32)
            .unwrap_or(settings.gallery.max_shuffle_attempts)
            .max(1);
    }

    if let Some(transform) = transform_map {
        if let Some(ratio) = str_any(transform, &["aspect_ratio", "target_aspect"]) {
            if let Some((w, h)) = parse_aspect_ratio(ratio) {
                settings.transform.aspect_w = w;
                settings.transform.aspect_h = h;
            }
        }
        settings.transform.brightness_threshold = f32_any(
            transform,
            &["brightness_threshold", "max_brightness", "luma_threshold"],
        )
            .unwrap_or(settings.transform.brightness_threshold)
            .clamp(0.0, 255.0);
        settings.transform.workers = u64_any(transform, &["workers", "worker_threads"])
            .map(|v| v as usize)
            .unwrap_or(settings.transform.workers)
            .clamp(1, 8);
    }

    if let Some(rotation) = rotation_map {
        if let Some(dir) = str_any(rotation, &["destination_dir", "wallpaper_dir", "dest_dir"]) {
            let dir = dir.trim();
            if !dir.is_empty() {
                settings.rotation.destination_dir = Some(PathBuf::from(dir));
            }
        }
        settings.rotation.poll_interval_secs = u64_any(
            rotation,
            &["poll_interval_secs", "interval_secs", "poll_interval"],
        )
            .unwrap_or(settings.rotation.poll_interval_secs)
            .max(30);
        settings.rotation.images_per_cycle = u64_any(
            rotation,
            &["images_per_cycle", "count_per_cycle"],
        )
            .map(|v| v as usize)
            .unwrap_or(settings.rotation.images_per_cycle)
            .min(16);
        settings.rotation.stitch = bool_any(rotation, &["stitch", "stitch_monitors", "span"])
            .unwrap_or(settings.rotation.stitch);
        if let Some(name) = str_any(rotation, &["stitched_filename", "stitched_output"]) {
            let name = name.trim();
            if !name.is_empty() {
                settings.rotation.stitched_filename = name.to_string();
            }
        }
    }

    if let Some(runtime) = runtime_map {
        settings.runtime.tick_sleep_ms = u64_at(runtime, "tick_sleep_ms")
            .unwrap_or(settings.runtime.tick_sleep_ms)
            .max(50);
    }

    settings
}

fn bool_at(map: &Mapping, key: &str) -> Option<bool> {
    map.get(Value::String(key.to_string()))?.as_bool()
}

fn bool_any(map: &Mapping, keys: &[&str]) -> Option<bool> {
    keys.iter().find_map(|k| bool_at(map, k))
}

fn str_at<'a>(map: &'a Mapping, key: &str) -> Option<&'a str> {
    map.get(Value::String(key.to_string()))?.as_str()
}

fn str_any<'a>(map: &'a Mapping, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| str_at(map, k))
}

fn mapping_at<'a>(map: &'a Mapping, key: &str) -> Option<&'a Mapping> {
    map.get(Value::String(key.to_string()))?.as_mapping()
}

fn u64_at(map: &Mapping, key: &str) -> Option<u64> {
    map.get(Value::String(key.to_string()))?
        .as_i64()
        .and_then(|v| if v >= 0 { Some(v as u64) } else { None })
}

fn u64_any(map: &Mapping, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|k| u64_at(map, k))
}

fn f32_at(map: &Mapping, key: &str) -> Option<f32> {
    map.get(Value::String(key.to_string()))?
        .as_f64()
        .map(|v| v as f32)
}

fn f32_any(map: &Mapping, keys: &[&str]) -> Option<f32> {
    keys.iter().find_map(|k| f32_at(map, k))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> RotatorConfig {
        let value: Value = serde_yaml::from_str(yaml).expect("yaml");
        RotatorConfig::from_yaml(&value).expect("config")
    }

    #[test]
    fn defaults_apply_when_sections_are_missing() {
        let config = parse("debug: true\n");
        assert!(config.debug);
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.settings.gallery.max_shuffle_attempts, 6);
        assert_eq!(config.settings.transform.brightness_threshold, 200.0);
        assert_eq!(config.settings.rotation.poll_interval_secs, 1800);
        assert!(config.settings.rotation.destination_dir.is_none());
    }

    #[test]
    fn nested_settings_override_defaults() {
        let config = parse(
            r#"
log_level: info
settings:
  gallery:
    base_url: "https://gallery.test/"
    request_timeout_secs: 5
    max_shuffle_attempts: 3
  transform:
    aspect_ratio: "16:9"
    brightness_threshold: 180
    workers: 4
  rotation:
    destination_dir: "/tmp/walls"
    poll_interval_secs: 600
    images_per_cycle: 2
    stitch: true
    stitched_filename: "span.jpg"
  runtime:
    tick_sleep_ms: 100
"#,
        );

        assert_eq!(config.log_level, "info");
        assert_eq!(config.settings.gallery.base_url, "https://gallery.test");
        assert_eq!(config.settings.gallery.request_timeout_secs, 5);
        assert_eq!(config.settings.gallery.max_shuffle_attempts, 3);
        assert_eq!(
            (config.settings.transform.aspect_w, config.settings.transform.aspect_h),
            (16, 9)
        );
        assert_eq!(config.settings.transform.brightness_threshold, 180.0);
        assert_eq!(config.settings.transform.workers, 4);
        assert_eq!(
            config.settings.rotation.destination_dir,
            Some(PathBuf::from("/tmp/walls"))
        );
        assert_eq!(config.settings.rotation.poll_interval_secs, 600);
        assert_eq!(config.settings.rotation.images_per_cycle, 2);
        assert!(config.settings.rotation.stitch);
        assert_eq!(config.settings.rotation.stitched_filename, "span.jpg");
        assert_eq!(config.settings.runtime.tick_sleep_ms, 100);
    }

    #[test]
    fn bounds_are_enforced() {
        let config = parse(
            r#"
settings:
  gallery:
    request_timeout_secs: 0
    max_shuffle_attempts: 0
  rotation:
    poll_interval_secs: 1
  runtime:
    tick_sleep_ms: 1
"#,
        );

        assert_eq!(config.settings.gallery.request_timeout_secs, 1);
        assert_eq!(config.settings.gallery.max_shuffle_attempts, 1);
        assert_eq!(config.settings.rotation.poll_interval_secs, 30);
        assert_eq!(config.settings.runtime.tick_sleep_ms, 50);
    }

    #[test]
    fn invalid_aspect_ratio_keeps_default() {
        let config = parse(
            r#"
settings:
  transform:
    aspect_ratio: "wide"
"#,
        );
        assert_eq!(
            (config.settings.transform.aspect_w, config.settings.transform.aspect_h),
            (21, 9)
        );
    }
}
