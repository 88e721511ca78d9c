//! trace 命令
//!
//! 离线运行循线器：单张 JPEG 或目录下所有 `.jpg`。

use anyhow::{Context, Result, bail};
use clap::Args;
use racelink_control::{LineTracker, TrackOutcome, decode_jpeg};
use racelink_protocol::TorqueCommand;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// 离线循线参数
#[derive(Args, Debug)]
pub struct TraceCommand {
    /// 单张图像
    #[arg(long, conflicts_with = "batch", required_unless_present = "batch")]
    pub image: Option<PathBuf>,

    /// 图像目录（处理其中所有 .jpg / .jpeg）
    #[arg(long)]
    pub batch: Option<PathBuf>,

    /// 荷电状态
    #[arg(long, default_value_t = 1.0)]
    pub soc: f64,
}

impl TraceCommand {
    pub fn execute(&self) -> Result<()> {
        let tracker = LineTracker::default();

        if let Some(image) = &self.image {
            trace_file(&tracker, image, self.soc)?;
            return Ok(());
        }

        let Some(dir) = &self.batch else {
            bail!("either --image or --batch is required");
        };
        let files = jpeg_files(dir)?;
        if files.is_empty() {
            warn!("No JPEG files in {}", dir.display());
            return Ok(());
        }

        let mut failed = 0usize;
        for file in &files {
            if let Err(e) = trace_file(&tracker, file, self.soc) {
                warn!("{}: {:#}", file.display(), e);
                failed += 1;
            }
        }
        info!("Traced {} images ({} failed)", files.len(), failed);
        Ok(())
    }
}

fn trace_file(tracker: &LineTracker, path: &Path, soc: f64) -> Result<TorqueCommand> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let image = decode_jpeg(&bytes).with_context(|| format!("Failed to decode {}", path.display()))?;
    let (command, outcome) = tracker.track_detailed(soc, &image);

    let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    match outcome {
        TrackOutcome::LowCharge => info!("{}: low charge, stop", name),
        TrackOutcome::LineLost { pixel_count } => {
            info!("{}: line lost ({} pixels)", name, pixel_count)
        },
        TrackOutcome::Tracking {
            fit,
            deviation,
            heading,
        } => info!(
            "{}: xc={:.1} theta={:.1}deg dev={:.3} heading={:.3}",
            name,
            fit.centroid_x,
            fit.angle.to_degrees(),
            deviation,
            heading
        ),
    }
    info!("{}: L={:.3} R={:.3}", name, command.left(), command.right());
    Ok(command)
}

/// 目录下的 JPEG 文件（按文件名排序）
fn jpeg_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("Failed to read directory {}", dir.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_jpeg = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"));
        if path.is_file() && is_jpeg {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jpeg_files_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.jpg", "a.JPG", "c.jpeg", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.jpg")).unwrap();

        let files = jpeg_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.JPG", "b.jpg", "c.jpeg"]);
    }

    #[test]
    fn test_trace_file_rejects_non_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"not an image").unwrap();
        assert!(trace_file(&LineTracker::default(), &path, 1.0).is_err());
    }

    #[test]
    fn test_batch_on_missing_directory_fails() {
        let command = TraceCommand {
            image: None,
            batch: Some(PathBuf::from("/nonexistent/racelink-frames")),
            soc: 1.0,
        };
        assert!(command.execute().is_err());
    }
}
