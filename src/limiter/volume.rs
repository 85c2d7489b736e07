//! Physical volume resolution.
//!
//! A path's volume is the longest mount point that prefixes it. Mount points
//! come from `sysinfo`. When no mount point matches, Unix falls back to the
//! file's `st_dev` and Windows to the drive/UNC prefix; anything else maps to
//! [`VolumeId::Unknown`], which shares a single limiter.

use std::path::{Path, PathBuf};

use serde::Serialize;

/// Identity of the volume a file lives on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum VolumeId {
    /// A mount point or drive root.
    Mount(PathBuf),
    /// A raw device number (Unix `st_dev`).
    Device(u64),
    /// Detection failed.
    Unknown,
}

impl std::fmt::Display for VolumeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mount(path) => write!(f, "{}", path.display()),
            Self::Device(dev) => write!(f, "dev:{dev}"),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

/// Known mount points, longest first.
#[derive(Debug, Clone, Default)]
pub struct VolumeMap {
    mounts: Vec<PathBuf>,
}

impl VolumeMap {
    /// Read the mount table from the operating system.
    #[must_use]
    pub fn detect() -> Self {
        let disks = sysinfo::Disks::new_with_refreshed_list();
        let mounts = disks
            .list()
            .iter()
            .map(|disk| disk.mount_point().to_path_buf())
            .collect::<Vec<_>>();
        log::debug!("Detected {} mount points", mounts.len());
        Self::from_mount_points(mounts)
    }

    /// Build a map from an explicit list of mount points.
    #[must_use]
    pub fn from_mount_points<I, P>(mounts: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut mounts: Vec<PathBuf> = mounts.into_iter().map(Into::into).collect();
        mounts.sort_by(|a, b| {
            b.components()
                .count()
                .cmp(&a.components().count())
                .then_with(|| a.cmp(b))
        });
        mounts.dedup();
        Self { mounts }
    }

    /// Number of known mount points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mounts.len()
    }

    /// Whether no mount points are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }

    /// Resolve the volume for `path`.
    #[must_use]
    pub fn resolve(&self, path: &Path) -> VolumeId {
        // `Path::starts_with` compares whole components, so `/mnt/a` never
        // claims `/mnt/ab`.
        if let Some(mount) = self.mounts.iter().find(|m| path.starts_with(m)) {
            return VolumeId::Mount(mount.clone());
        }
        fallback(path)
    }
}

#[cfg(unix)]
fn fallback(path: &Path) -> VolumeId {
    use std::os::unix::fs::MetadataExt;
    std::fs::metadata(path).map_or(VolumeId::Unknown, |meta| VolumeId::Device(meta.dev()))
}

#[cfg(windows)]
fn fallback(path: &Path) -> VolumeId {
    use std::path::Component;
    match path.components().next() {
        Some(Component::Prefix(prefix)) => {
            let mut root = PathBuf::from(prefix.as_os_str());
            root.push("\\");
            VolumeId::Mount(root)
        }
        _ => VolumeId::Unknown,
    }
}

#[cfg(not(any(unix, windows)))]
fn fallback(_path: &Path) -> VolumeId {
    VolumeId::Unknown
}
