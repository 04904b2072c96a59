use std::path::Path;

/// One detected display. Order within the sequence drives stitch layout only;
/// acquisition does not depend on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorGeometry {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Sets the system background. One implementation per target platform; the
/// core pipeline never touches platform primitives directly.
pub trait WallpaperTarget: Send + Sync {
    fn apply(&self, image_path: &Path) -> Result<(), String>;
}

/// Current monitor layout. An empty result is a detection failure, which the
/// pipeline treats as one unknown-size target.
pub trait MonitorTopology: Send + Sync {
    fn monitors(&self) -> Vec<MonitorGeometry>;
}

pub fn wallpaper_target() -> Box<dyn WallpaperTarget> {
    #[cfg(windows)]
    {
        Box::new(windows_impl::DesktopWallpaper)
    }
    #[cfg(not(windows))]
    {
        Box::new(unix_impl::ShellWallpaper)
    }
}

pub fn monitor_topology() -> Box<dyn MonitorTopology> {
    #[cfg(windows)]
    {
        Box::new(windows_impl::DisplayMonitors)
    }
    #[cfg(not(windows))]
    {
        Box::new(unix_impl::HyprlandMonitors)
    }
}

#[cfg(windows)]
mod windows_impl {
    use std::{fs, mem, path::Path};

    use windows::{
        core::BOOL,
        Win32::{
            Foundation::{LPARAM, RECT},
            Graphics::Gdi::{
                EnumDisplayMonitors, GetMonitorInfoW, HDC, HMONITOR, MONITORINFOEXW,
            },
            UI::WindowsAndMessaging::{
                SystemParametersInfoW, SPIF_SENDWININICHANGE, SPIF_UPDATEINIFILE,
                SPI_SETDESKWALLPAPER,
            },
        },
    };

    use super::{MonitorGeometry, MonitorTopology, WallpaperTarget};
    use crate::utility::to_wstring;

    pub struct DesktopWallpaper;

    impl WallpaperTarget for DesktopWallpaper {
        fn apply(&self, image_path: &Path) -> Result<(), String> {
            // SPI_SETDESKWALLPAPER wants an absolute path.
            let absolute = fs::canonicalize(image_path).unwrap_or_else(|_| image_path.to_path_buf());
            let mut wide = to_wstring(&absolute.to_string_lossy());

            unsafe {
                SystemParametersInfoW(
                    SPI_SETDESKWALLPAPER,
                    0,
                    Some(wide.as_mut_ptr().cast()),
                    SPIF_UPDATEINIFILE | SPIF_SENDWININICHANGE,
                )
                .map_err(|e| format!("SystemParametersInfoW failed: {e:?}"))
            }
        }
    }

    pub struct DisplayMonitors;

    impl MonitorTopology for DisplayMonitors {
        fn monitors(&self) -> Vec<MonitorGeometry> {
            unsafe extern "system" fn enum_monitor_proc(
                monitor: HMONITOR,
                _hdc: HDC,
                _rect: *mut RECT,
                lparam: LPARAM,
            ) -> BOOL {
                let vec = &mut *(lparam.0 as *mut Vec<MonitorGeometry>);

                let mut info: MONITORINFOEXW = mem::zeroed();
                info.monitorInfo.cbSize = mem::size_of::<MONITORINFOEXW>() as u32;

                if GetMonitorInfoW(monitor, &mut info as *mut MONITORINFOEXW as *mut _).as_bool() {
                    let rect = info.monitorInfo.rcMonitor;
                    vec.push(MonitorGeometry {
                        x: rect.left,
                        y: rect.top,
                        width: (rect.right - rect.left).max(0) as u32,
                        height: (rect.bottom - rect.top).max(0) as u32,
                    });
                }

                BOOL(1)
            }

            let mut monitors = Vec::<MonitorGeometry>::new();
            unsafe {
                let _ = EnumDisplayMonitors(
                    None,
                    None,
                    Some(enum_monitor_proc),
                    LPARAM((&mut monitors as *mut Vec<MonitorGeometry>) as isize),
                );
            }

            monitors
        }
    }
}

#[cfg(not(windows))]
mod unix_impl {
    use std::{path::Path, process::Command};

    use serde::Deserialize;

    use super::{MonitorGeometry, MonitorTopology, WallpaperTarget};
    use crate::warn;

    #[derive(Debug, Deserialize)]
    struct HyprMonitor {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    }

    pub struct HyprlandMonitors;

    impl MonitorTopology for HyprlandMonitors {
        fn monitors(&self) -> Vec<MonitorGeometry> {
            let Ok(output) = Command::new("hyprctl").args(["monitors", "-j"]).output() else {
                return Vec::new();
            };
            if !output.status.success() {
                return Vec::new();
            }

            let Ok(parsed) = serde_json::from_slice::<Vec<HyprMonitor>>(&output.stdout) else {
                warn!("[ROTATOR][PLATFORM] Unparsable hyprctl monitor payload");
                return Vec::new();
            };

            parsed
                .into_iter()
                .map(|m| MonitorGeometry {
                    x: m.x,
                    y: m.y,
                    width: m.width,
                    height: m.height,
                })
                .collect()
        }
    }

    pub struct ShellWallpaper;

    impl WallpaperTarget for ShellWallpaper {
        fn apply(&self, image_path: &Path) -> Result<(), String> {
            let path = image_path.to_string_lossy().into_owned();

            // swww covers Wayland compositors, feh the X11 session.
            let backends: [(&str, Vec<&str>); 2] = [
                ("swww", vec!["img", path.as_str()]),
                ("feh", vec!["--bg-fill", path.as_str()]),
            ];

            for (bin, args) in &backends {
                match Command::new(bin).args(args).status() {
                    Ok(status) if status.success() => return Ok(()),
                    Ok(status) => warn!(
                        "[ROTATOR][PLATFORM] {bin} exited with {status} for {}",
                        image_path.display()
                    ),
                    Err(_) => {} // backend not installed; try the next one
                }
            }

            Err(format!(
                "no wallpaper backend accepted {} (tried swww, feh)",
                image_path.display()
            ))
        }
    }
}
