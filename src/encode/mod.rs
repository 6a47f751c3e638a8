//! Frame sinks: where rendered frames go.
//!
//! File-backed sinks write into a hidden sibling of the requested path and only rename it into
//! place once every frame has been written, so a failed run never leaves a truncated animation.

use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::foundation::core::{Rgba8, flatten_to_opaque_rgba8};
use crate::foundation::error::{TrainmapError, TrainmapResult};
use crate::render::FrameRGBA;

pub mod ffmpeg;
pub mod gif;
pub mod sink;

pub use ffmpeg::{FfmpegSink, is_ffmpeg_on_path};
pub use gif::GifSink;
pub use sink::{FrameSink, InMemorySink, SinkConfig};

pub fn ensure_parent_dir(path: &Path) -> TrainmapResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// `dir/.name.partial`, next to `out` so the final rename stays on one filesystem.
pub(crate) fn partial_path(out: &Path) -> PathBuf {
    let name = out
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    out.with_file_name(format!(".{name}.partial"))
}

pub(crate) fn check_overwrite(out: &Path, overwrite: bool) -> TrainmapResult<()> {
    if !overwrite && out.exists() {
        return Err(TrainmapError::export(format!(
            "output file '{}' already exists",
            out.display()
        )));
    }
    Ok(())
}

/// Move a finished temporary file onto the requested output path.
pub(crate) fn commit_partial(partial: &Path, out: &Path, overwrite: bool) -> TrainmapResult<()> {
    check_overwrite(out, overwrite)?;
    std::fs::rename(partial, out).map_err(|e| {
        TrainmapError::export(format!(
            "failed to move '{}' to '{}': {e}",
            partial.display(),
            out.display()
        ))
    })
}

pub(crate) fn discard_partial(partial: &Path) {
    match std::fs::remove_file(partial) {
        Ok(()) => tracing::debug!(path = %partial.display(), "removed partial output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %partial.display(), error = %e, "could not remove partial output"),
    }
}

pub(crate) fn check_frame_size(cfg: &SinkConfig, frame: &FrameRGBA) -> TrainmapResult<()> {
    if frame.width != cfg.width || frame.height != cfg.height {
        return Err(TrainmapError::export(format!(
            "frame size mismatch: got {}x{}, expected {}x{}",
            frame.width, frame.height, cfg.width, cfg.height
        )));
    }
    if frame.data.len() != (cfg.width as usize) * (cfg.height as usize) * 4 {
        return Err(TrainmapError::export(
            "frame.data size mismatch with width*height*4",
        ));
    }
    Ok(())
}

/// Write one frame as an opaque PNG, composited over `background`.
pub fn save_png(path: &Path, frame: &FrameRGBA, background: Rgba8) -> TrainmapResult<()> {
    let mut opaque = vec![0u8; frame.data.len()];
    flatten_to_opaque_rgba8(
        &mut opaque,
        &frame.data,
        frame.premultiplied,
        background.to_array(),
    )?;
    ensure_parent_dir(path)?;
    image::save_buffer_with_format(
        path,
        &opaque,
        frame.width,
        frame.height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .map_err(|e| TrainmapError::export(format!("write png '{}': {e}", path.display())))
}
