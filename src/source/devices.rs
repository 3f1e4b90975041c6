//! Device enumeration - lists attached volumes for presentation only.
//!
//! Exactly one enumerator is compiled per target platform and handed out by
//! [`platform_enumerator`]; recovery logic never branches on the platform.

use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// An attached device or volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    /// Path to open (e.g. /dev/sda, C:\, /Volumes/USB)
    pub path: String,
    /// Short display name
    pub name: String,
    /// Size in bytes when known
    pub size: Option<u64>,
    /// Removable media flag when known
    pub removable: Option<bool>,
}

impl DeviceInfo {
    pub fn size_human(&self) -> String {
        match self.size {
            Some(size) => humansize::format_size(size, humansize::BINARY),
            None => "-".to_string(),
        }
    }
}

/// Capability interface for listing local devices
pub trait DeviceEnumerator: Send + Sync {
    fn list(&self) -> io::Result<Vec<DeviceInfo>>;
}

/// Block devices from /sys/block
#[cfg(target_os = "linux")]
#[derive(Debug, Default)]
pub struct SysBlockEnumerator;

#[cfg(target_os = "linux")]
impl DeviceEnumerator for SysBlockEnumerator {
    fn list(&self) -> io::Result<Vec<DeviceInfo>> {
        let mut devices = Vec::new();
        for entry in std::fs::read_dir("/sys/block")?.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with("loop") || name.starts_with("ram") {
                continue;
            }
            let sys = entry.path();
            let size = read_sys_u64(&sys.join("size")).map(|sectors| sectors * 512);
            if size == Some(0) {
                continue;
            }
            let removable = read_sys_u64(&sys.join("removable")).map(|v| v == 1);
            devices.push(DeviceInfo {
                path: format!("/dev/{}", name),
                name,
                size,
                removable,
            });
        }
        devices.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(devices)
    }
}

#[cfg(target_os = "linux")]
fn read_sys_u64(path: &Path) -> Option<u64> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Logical drive letters A: through Z:
#[cfg(target_os = "windows")]
#[derive(Debug, Default)]
pub struct DriveLetterEnumerator;

#[cfg(target_os = "windows")]
impl DeviceEnumerator for DriveLetterEnumerator {
    fn list(&self) -> io::Result<Vec<DeviceInfo>> {
        let mut devices = Vec::new();
        for letter in b'A'..=b'Z' {
            let drive = format!("{}:\\", letter as char);
            if Path::new(&drive).exists() {
                devices.push(DeviceInfo {
                    name: format!("{}:", letter as char),
                    path: drive,
                    size: None,
                    removable: None,
                });
            }
        }
        Ok(devices)
    }
}

/// Mounted volumes under a mount directory (/Volumes on macOS)
#[cfg(not(any(target_os = "linux", target_os = "windows")))]
#[derive(Debug)]
pub struct MountDirEnumerator {
    root: std::path::PathBuf,
}

#[cfg(not(any(target_os = "linux", target_os = "windows")))]
impl Default for MountDirEnumerator {
    fn default() -> Self {
        Self {
            root: std::path::PathBuf::from("/Volumes"),
        }
    }
}

#[cfg(not(any(target_os = "linux", target_os = "windows")))]
impl DeviceEnumerator for MountDirEnumerator {
    fn list(&self) -> io::Result<Vec<DeviceInfo>> {
        let mut devices: Vec<DeviceInfo> = std::fs::read_dir(&self.root)?
            .flatten()
            .map(|entry| DeviceInfo {
                path: entry.path().to_string_lossy().to_string(),
                name: entry.file_name().to_string_lossy().to_string(),
                size: None,
                removable: None,
            })
            .collect();
        devices.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(devices)
    }
}

/// The enumerator for the platform this binary was built for
pub fn platform_enumerator() -> Box<dyn DeviceEnumerator> {
    #[cfg(target_os = "linux")]
    return Box::new(SysBlockEnumerator);

    #[cfg(target_os = "windows")]
    return Box::new(DriveLetterEnumerator);

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    return Box::new(MountDirEnumerator::default());
}

/// This user's trash folder on this platform, for the trash quick scan
pub fn platform_trash_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    return {
        let drive = std::env::var("SystemDrive").unwrap_or_else(|_| "C:".to_string());
        Some(PathBuf::from(format!("{}\\$Recycle.Bin", drive)))
    };

    #[cfg(target_os = "macos")]
    return dirs::home_dir().map(|home| home.join(".Trash"));

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    return dirs::data_dir().map(|data| data.join("Trash").join("files"));
}

/// Fixed-width table for terminal display
pub fn format_device_table(devices: &[DeviceInfo]) -> String {
    let mut out = String::new();
    out.push_str(&format!("{:<12} {:>10} {:<9} {}\n", "NAME", "SIZE", "REMOVABLE", "PATH"));
    out.push_str(&"-".repeat(48));
    out.push('\n');
    for device in devices {
        let removable = match device.removable {
            Some(true) => "yes",
            Some(false) => "no",
            None => "-",
        };
        out.push_str(&format!(
            "{:<12} {:>10} {:<9} {}\n",
            device.name,
            device.size_human(),
            removable,
            device.path
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_formatting() {
        let devices = vec![DeviceInfo {
            path: "/dev/sdb".to_string(),
            name: "sdb".to_string(),
            size: Some(1024 * 1024),
            removable: Some(true),
        }];
        let table = format_device_table(&devices);
        assert!(table.contains("/dev/sdb"));
        assert!(table.contains("1 MiB"));
        assert!(table.contains("yes"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_trash_dir_follows_freedesktop_layout() {
        if let Some(dir) = platform_trash_dir() {
            assert!(dir.ends_with("Trash/files"));
        }
    }

    #[test]
    fn test_platform_enumerator_does_not_panic() {
        // Sandboxes may lack /sys/block; only the call contract matters here
        let _ = platform_enumerator().list();
    }
}
