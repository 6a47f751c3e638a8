use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use crate::encode::sink::{FrameSink, SinkConfig};
use crate::encode::{
    check_frame_size, check_overwrite, commit_partial, discard_partial, ensure_parent_dir,
    partial_path,
};
use crate::foundation::core::{FrameIndex, flatten_to_opaque_rgba8};
use crate::foundation::error::{TrainmapError, TrainmapResult};
use crate::render::FrameRGBA;

pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

struct Running {
    cfg: SinkConfig,
    child: Child,
    stdin: Option<ChildStdin>,
    scratch: Vec<u8>,
}

/// H.264 MP4 through the system `ffmpeg` binary, fed raw RGBA on stdin.
pub struct FfmpegSink {
    out_path: PathBuf,
    partial: PathBuf,
    overwrite: bool,
    running: Option<Running>,
}

impl FfmpegSink {
    pub fn new(out_path: impl Into<PathBuf>) -> Self {
        let out_path = out_path.into();
        Self {
            partial: partial_path(&out_path),
            out_path,
            overwrite: true,
            running: None,
        }
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn out_path(&self) -> &Path {
        &self.out_path
    }

    fn kill(&mut self) {
        if let Some(mut run) = self.running.take() {
            drop(run.stdin.take());
            let _ = run.child.kill();
            let _ = run.child.wait();
        }
    }
}

impl FrameSink for FfmpegSink {
    #[tracing::instrument(skip(self, cfg), fields(out = %self.out_path.display()))]
    fn begin(&mut self, cfg: &SinkConfig) -> TrainmapResult<()> {
        cfg.validate()?;
        if !cfg.width.is_multiple_of(2) || !cfg.height.is_multiple_of(2) {
            // yuv420p needs even dimensions.
            return Err(TrainmapError::invalid_argument(
                "mp4 width/height must be even",
            ));
        }
        check_overwrite(&self.out_path, self.overwrite)?;
        ensure_parent_dir(&self.out_path)?;

        if !is_ffmpeg_on_path() {
            return Err(TrainmapError::export(
                "ffmpeg is required for MP4 encoding, but was not found on PATH",
            ));
        }

        let (num, den) = cfg.interval.fps_rational();
        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .args([
                "-y",
                "-loglevel",
                "error",
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgba",
                "-s",
                &format!("{}x{}", cfg.width, cfg.height),
                "-framerate",
                &format!("{num}/{den}"),
                "-i",
                "pipe:0",
                "-an",
                "-c:v",
                "libx264",
                "-pix_fmt",
                "yuv420p",
                "-movflags",
                "+faststart",
                "-f",
                "mp4",
            ])
            .arg(&self.partial);

        let mut child = cmd.spawn().map_err(|e| {
            TrainmapError::export(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;
        let Some(stdin) = child.stdin.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(TrainmapError::export("failed to open ffmpeg stdin"));
        };

        self.running = Some(Running {
            cfg: *cfg,
            child,
            stdin: Some(stdin),
            scratch: vec![0u8; (cfg.width as usize) * (cfg.height as usize) * 4],
        });
        Ok(())
    }

    fn push_frame(&mut self, index: FrameIndex, frame: &FrameRGBA) -> TrainmapResult<()> {
        let Some(run) = self.running.as_mut() else {
            return Err(TrainmapError::export("ffmpeg sink is not started"));
        };
        check_frame_size(&run.cfg, frame)?;
        flatten_to_opaque_rgba8(
            &mut run.scratch,
            &frame.data,
            frame.premultiplied,
            run.cfg.background.to_array(),
        )?;
        let Some(stdin) = run.stdin.as_mut() else {
            return Err(TrainmapError::export("ffmpeg stdin is already closed"));
        };
        stdin.write_all(&run.scratch).map_err(|e| {
            TrainmapError::export(format!(
                "failed to write frame {} to ffmpeg stdin: {e}",
                index.0
            ))
        })?;
        tracing::debug!(frame = index.0, "mp4 frame written");
        Ok(())
    }

    fn end(&mut self) -> TrainmapResult<()> {
        let Some(mut run) = self.running.take() else {
            return Err(TrainmapError::export("ffmpeg sink is not started"));
        };
        drop(run.stdin.take());

        let output = run.child.wait_with_output().map_err(|e| {
            TrainmapError::export(format!("failed to wait for ffmpeg to finish: {e}"))
        });
        let output = match output {
            Ok(o) => o,
            Err(e) => {
                discard_partial(&self.partial);
                return Err(e);
            }
        };
        if !output.status.success() {
            discard_partial(&self.partial);
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TrainmapError::export(format!(
                "ffmpeg exited with status {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        if let Err(e) = commit_partial(&self.partial, &self.out_path, self.overwrite) {
            discard_partial(&self.partial);
            return Err(e);
        }
        tracing::info!(out = %self.out_path.display(), "mp4 written");
        Ok(())
    }

    fn abort(&mut self) {
        self.kill();
        discard_partial(&self.partial);
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        if self.running.is_some() {
            self.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::core::{FrameInterval, Rgba8};

    fn cfg(w: u32, h: u32) -> SinkConfig {
        SinkConfig {
            width: w,
            height: h,
            interval: FrameInterval::from_millis(100).unwrap(),
            background: Rgba8::opaque(0, 0, 0),
        }
    }

    #[test]
    fn odd_dimensions_are_rejected_before_spawning() {
        let mut sink = FfmpegSink::new("target/ffmpeg_sink/odd.mp4");
        assert!(matches!(
            sink.begin(&cfg(11, 10)),
            Err(TrainmapError::InvalidArgument(_))
        ));
    }

    #[test]
    fn push_before_begin_fails() {
        let mut sink = FfmpegSink::new("target/ffmpeg_sink/none.mp4");
        let frame = FrameRGBA {
            width: 2,
            height: 2,
            data: vec![0; 16],
            premultiplied: true,
        };
        assert!(sink.push_frame(FrameIndex(0), &frame).is_err());
    }

    #[test]
    fn encodes_when_ffmpeg_is_available() {
        if !is_ffmpeg_on_path() {
            return;
        }
        let out = PathBuf::from("target").join("ffmpeg_sink").join("tiny.mp4");
        let _ = std::fs::remove_file(&out);
        let mut sink = FfmpegSink::new(&out);
        sink.begin(&cfg(16, 16)).unwrap();
        let frame = FrameRGBA {
            width: 16,
            height: 16,
            data: [255u8, 0, 0, 255].repeat(256),
            premultiplied: true,
        };
        for i in 0..3 {
            sink.push_frame(FrameIndex(i), &frame).unwrap();
        }
        sink.end().unwrap();
        assert!(std::fs::metadata(&out).unwrap().len() > 0);
        assert!(!partial_path(&out).exists());
    }
}
