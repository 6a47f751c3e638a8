use crate::foundation::core::{FrameIndex, FrameInterval, Rgba8};
use crate::foundation::error::{TrainmapError, TrainmapResult};
use crate::render::FrameRGBA;

/// Stream parameters, fixed for the whole export.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SinkConfig {
    pub width: u32,
    pub height: u32,
    pub interval: FrameInterval,
    /// Colour transparent pixels are flattened onto for formats without alpha.
    pub background: Rgba8,
}

impl SinkConfig {
    pub fn validate(&self) -> TrainmapResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(TrainmapError::invalid_argument(
                "sink width/height must be non-zero",
            ));
        }
        Ok(())
    }
}

/// Receives rendered frames in order.
///
/// Call sequence is `begin`, then `push_frame` once per frame, then `end`. If anything fails in
/// between the exporter calls `abort` instead of `end`, and the sink must not leave output behind.
pub trait FrameSink {
    fn begin(&mut self, cfg: &SinkConfig) -> TrainmapResult<()>;

    fn push_frame(&mut self, index: FrameIndex, frame: &FrameRGBA) -> TrainmapResult<()>;

    /// Finalize the output. Only after this returns `Ok` does the output exist.
    fn end(&mut self) -> TrainmapResult<()>;

    fn abort(&mut self) {}
}

impl<T: FrameSink + ?Sized> FrameSink for &mut T {
    fn begin(&mut self, cfg: &SinkConfig) -> TrainmapResult<()> {
        (**self).begin(cfg)
    }

    fn push_frame(&mut self, index: FrameIndex, frame: &FrameRGBA) -> TrainmapResult<()> {
        (**self).push_frame(index, frame)
    }

    fn end(&mut self) -> TrainmapResult<()> {
        (**self).end()
    }

    fn abort(&mut self) {
        (**self).abort()
    }
}

/// Keeps every frame in memory. Used by tests and by callers that post-process frames.
#[derive(Debug, Default)]
pub struct InMemorySink {
    config: Option<SinkConfig>,
    frames: Vec<(FrameIndex, FrameRGBA)>,
    finished: bool,
    aborted: bool,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(&self) -> Option<&SinkConfig> {
        self.config.as_ref()
    }

    pub fn frames(&self) -> &[(FrameIndex, FrameRGBA)] {
        &self.frames
    }

    pub fn into_frames(self) -> Vec<(FrameIndex, FrameRGBA)> {
        self.frames
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn was_aborted(&self) -> bool {
        self.aborted
    }
}

impl FrameSink for InMemorySink {
    fn begin(&mut self, cfg: &SinkConfig) -> TrainmapResult<()> {
        cfg.validate()?;
        self.config = Some(*cfg);
        self.frames.clear();
        self.finished = false;
        self.aborted = false;
        Ok(())
    }

    fn push_frame(&mut self, index: FrameIndex, frame: &FrameRGBA) -> TrainmapResult<()> {
        let cfg = self
            .config
            .as_ref()
            .ok_or_else(|| TrainmapError::export("push_frame called before begin"))?;
        super::check_frame_size(cfg, frame)?;
        self.frames.push((index, frame.clone()));
        Ok(())
    }

    fn end(&mut self) -> TrainmapResult<()> {
        if self.config.is_none() {
            return Err(TrainmapError::export("end called before begin"));
        }
        self.finished = true;
        Ok(())
    }

    fn abort(&mut self) {
        self.frames.clear();
        self.aborted = true;
    }
}
