use log::{debug, info};
use std::path::{Path, PathBuf};

pub const DEFAULT_VENDOR_ID: u16 = 0x0665;
pub const DEFAULT_PRODUCT_ID: u16 = 0x5161;

const SYSFS_HIDRAW: &str = "/sys/class/hidraw";
const DEV: &str = "/dev";

/// Finds the `/dev/hidrawN` node whose USB ids match.
pub fn find_device(vendor_id: u16, product_id: u16) -> Option<PathBuf> {
    find_device_in(Path::new(SYSFS_HIDRAW), Path::new(DEV), vendor_id, product_id)
}

/// As [`find_device`], against an arbitrary sysfs class dir and dev dir.
pub fn find_device_in(
    sysfs: &Path,
    dev: &Path,
    vendor_id: u16,
    product_id: u16,
) -> Option<PathBuf> {
    let mut names: Vec<String> = std::fs::read_dir(sysfs)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("hidraw"))
        .collect();
    names.sort();

    for name in names {
        let uevent = sysfs.join(&name).join("device").join("uevent");
        let Ok(content) = std::fs::read_to_string(&uevent) else {
            debug!("no uevent for {}", name);
            continue;
        };

        if let Some((vid, pid)) = parse_hid_id(&content) {
            debug!("{}: {:04x}:{:04x}", name, vid, pid);
            if vid == vendor_id && pid == product_id {
                let path = dev.join(&name);
                info!("found inverter {:04x}:{:04x} at {}", vid, pid, path.display());
                return Some(path);
            }
        }
    }

    None
}

// HID_ID=0003:00000665:00005161 -> (0x0665, 0x5161)
fn parse_hid_id(uevent: &str) -> Option<(u16, u16)> {
    let value = uevent
        .lines()
        .find_map(|line| line.strip_prefix("HID_ID="))?;

    let mut parts = value.trim().split(':');
    let _bus = parts.next()?;
    let vid = u32::from_str_radix(parts.next()?, 16).ok()?;
    let pid = u32::from_str_radix(parts.next()?, 16).ok()?;

    Some((u16::try_from(vid).ok()?, u16::try_from(pid).ok()?))
}
