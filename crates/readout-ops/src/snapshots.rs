//! Optional on-disk copies of sampled frames for debugging OCR.

use std::{
    fs,
    path::{Path, PathBuf},
};

use image::GrayImage;
use readout_types::{sample::Frame, Result};
use tracing::{debug, info};

use crate::ops_error;

/// Directory receiving `<t>.png` (decoded frame) and `<t>_pre.png`
/// (preprocessed frame) files.
#[derive(Debug, Clone)]
pub struct SnapshotDir {
    dir: PathBuf,
}

impl SnapshotDir {
    /// Create the directory and clear snapshots left by an earlier run.
    /// Files that do not look like snapshots are left alone.
    pub fn prepare(path: impl AsRef<Path>) -> Result<Self> {
        let dir = path.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|err| {
            ops_error(format!("failed to create snapshot dir {:?}: {err}", dir))
        })?;

        let entries = fs::read_dir(&dir)
            .map_err(|err| ops_error(format!("failed to list snapshot dir {:?}: {err}", dir)))?;
        let mut removed = 0usize;
        for entry in entries.flatten() {
            let path = entry.path();
            if is_snapshot_name(&path) && fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        info!("Snapshot directory ready at {:?} ({} stale removed)", dir, removed);
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn save_frame(&self, frame: &Frame) -> Result<PathBuf> {
        let path = self.dir.join(format!("{}.png", frame.timestamp));
        frame
            .image
            .save(&path)
            .map_err(|err| ops_error(format!("failed to save {:?}: {err}", path)))?;
        debug!("Saved snapshot {:?}", path);
        Ok(path)
    }

    pub fn save_preprocessed(&self, timestamp: u64, image: &GrayImage) -> Result<PathBuf> {
        let path = self.dir.join(format!("{timestamp}_pre.png"));
        image
            .save(&path)
            .map_err(|err| ops_error(format!("failed to save {:?}: {err}", path)))?;
        Ok(path)
    }
}

fn is_snapshot_name(path: &Path) -> bool {
    if path.extension().and_then(|ext| ext.to_str()) != Some("png") {
        return false;
    }
    let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
        return false;
    };
    let stem = stem.strip_suffix("_pre").unwrap_or(stem);
    !stem.is_empty() && stem.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn recognizes_snapshot_names() {
        assert!(is_snapshot_name(Path::new("/tmp/12.png")));
        assert!(is_snapshot_name(Path::new("/tmp/12_pre.png")));
        assert!(!is_snapshot_name(Path::new("/tmp/notes.png")));
        assert!(!is_snapshot_name(Path::new("/tmp/12.jpg")));
        assert!(!is_snapshot_name(Path::new("/tmp/_pre.png")));
    }

    #[test]
    fn prepare_clears_only_stale_snapshots() {
        let dir = std::env::temp_dir().join("readout-snapshot-test");
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).expect("create dir");
        fs::write(dir.join("4.png"), b"stale").expect("stale snapshot");
        fs::write(dir.join("keep.txt"), b"keep").expect("unrelated file");

        let snapshots = SnapshotDir::prepare(&dir).expect("prepare");
        assert!(!dir.join("4.png").exists());
        assert!(dir.join("keep.txt").exists());

        let frame = Frame::new(6, 180, RgbImage::from_pixel(3, 2, Rgb([1, 2, 3])));
        let saved = snapshots.save_frame(&frame).expect("save frame");
        assert_eq!(saved, dir.join("6.png"));
        let pre = snapshots
            .save_preprocessed(6, &GrayImage::new(3, 2))
            .expect("save preprocessed");
        assert!(pre.exists());

        fs::remove_dir_all(&dir).expect("cleanup");
    }
}
