use std::cell::RefCell;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use image::codecs::gif::{GifEncoder, Repeat};

use crate::encode::sink::{FrameSink, SinkConfig};
use crate::encode::{
    check_frame_size, check_overwrite, commit_partial, discard_partial, ensure_parent_dir,
    partial_path,
};
use crate::foundation::core::{FrameIndex, flatten_to_opaque_rgba8};
use crate::foundation::error::{TrainmapError, TrainmapResult};
use crate::render::FrameRGBA;

/// Default quantizer speed; 1 is best quality, 30 fastest.
pub const DEFAULT_GIF_SPEED: i32 = 10;

type WriteError = Rc<RefCell<Option<io::Error>>>;

/// Writer that remembers its first I/O error.
///
/// The GIF trailer and the final buffer flush happen on drop, where errors are
/// otherwise lost.
struct CheckedWriter<W> {
    inner: W,
    error: WriteError,
}

impl<W: Write> CheckedWriter<W> {
    fn new(inner: W) -> (Self, WriteError) {
        let error = Rc::new(RefCell::new(None));
        (
            Self {
                inner,
                error: Rc::clone(&error),
            },
            error,
        )
    }

    fn record<T>(&self, res: io::Result<T>) -> io::Result<T> {
        if let Err(e) = &res
            && e.kind() != io::ErrorKind::Interrupted
        {
            let mut slot = self.error.borrow_mut();
            if slot.is_none() {
                *slot = Some(io::Error::new(e.kind(), e.to_string()));
            }
        }
        res
    }
}

impl<W: Write> Write for CheckedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let res = self.inner.write(buf);
        self.record(res)
    }

    fn flush(&mut self) -> io::Result<()> {
        let res = self.inner.flush();
        self.record(res)
    }
}

type GifWriter<W> = GifEncoder<BufWriter<CheckedWriter<W>>>;

fn gif_writer<W: Write>(inner: W, speed: i32) -> (GifWriter<W>, WriteError) {
    let (checked, error) = CheckedWriter::new(inner);
    (GifEncoder::new_with_speed(BufWriter::new(checked), speed), error)
}

/// Drops the encoder, which writes the trailer and flushes, then reports the
/// first write error seen along the way.
fn finish_gif<W: Write>(encoder: GifWriter<W>, error: &WriteError) -> io::Result<()> {
    drop(encoder);
    match error.borrow_mut().take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

struct Active {
    cfg: SinkConfig,
    encoder: GifWriter<File>,
    write_error: WriteError,
    file: File,
    delay: image::Delay,
    scratch: Vec<u8>,
}

/// Animated GIF writer. Every frame gets the configured interval as its delay.
///
/// Plays once unless [`GifSink::with_loop`] is enabled.
pub struct GifSink {
    out_path: PathBuf,
    partial: PathBuf,
    overwrite: bool,
    speed: i32,
    loop_forever: bool,
    active: Option<Active>,
}

impl GifSink {
    pub fn new(out_path: impl Into<PathBuf>) -> Self {
        let out_path = out_path.into();
        Self {
            partial: partial_path(&out_path),
            out_path,
            overwrite: true,
            speed: DEFAULT_GIF_SPEED,
            loop_forever: false,
            active: None,
        }
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_speed(mut self, speed: i32) -> Self {
        self.speed = speed.clamp(1, 30);
        self
    }

    pub fn with_loop(mut self, loop_forever: bool) -> Self {
        self.loop_forever = loop_forever;
        self
    }

    pub fn out_path(&self) -> &Path {
        &self.out_path
    }

    fn fail(&mut self, msg: String) -> TrainmapError {
        self.abort();
        TrainmapError::export(msg)
    }
}

impl FrameSink for GifSink {
    #[tracing::instrument(skip(self, cfg), fields(out = %self.out_path.display()))]
    fn begin(&mut self, cfg: &SinkConfig) -> TrainmapResult<()> {
        cfg.validate()?;
        if cfg.width > u32::from(u16::MAX) || cfg.height > u32::from(u16::MAX) {
            return Err(TrainmapError::invalid_argument(
                "gif dimensions must fit in u16",
            ));
        }
        check_overwrite(&self.out_path, self.overwrite)?;
        ensure_parent_dir(&self.out_path)?;

        let file = File::create(&self.partial).map_err(|e| {
            TrainmapError::export(format!(
                "failed to create '{}': {e}",
                self.partial.display()
            ))
        })?;
        let handle = file
            .try_clone()
            .map_err(|e| self.fail(format!("failed to clone gif file handle: {e}")))?;
        let (mut encoder, write_error) = gif_writer(file, self.speed);
        if self.loop_forever {
            encoder
                .set_repeat(Repeat::Infinite)
                .map_err(|e| self.fail(format!("failed to set gif repeat: {e}")))?;
        }

        self.active = Some(Active {
            cfg: *cfg,
            encoder,
            write_error,
            file: handle,
            delay: image::Delay::from_numer_denom_ms(cfg.interval.as_millis(), 1),
            scratch: vec![0u8; (cfg.width as usize) * (cfg.height as usize) * 4],
        });
        Ok(())
    }

    fn push_frame(&mut self, index: FrameIndex, frame: &FrameRGBA) -> TrainmapResult<()> {
        let Some(active) = self.active.as_mut() else {
            return Err(TrainmapError::export("gif sink is not started"));
        };
        check_frame_size(&active.cfg, frame)?;
        flatten_to_opaque_rgba8(
            &mut active.scratch,
            &frame.data,
            frame.premultiplied,
            active.cfg.background.to_array(),
        )?;

        let buf = image::RgbaImage::from_raw(
            active.cfg.width,
            active.cfg.height,
            active.scratch.clone(),
        )
        .ok_or_else(|| TrainmapError::export("frame buffer does not match gif dimensions"))?;
        let delay = active.delay;
        if let Err(e) = active
            .encoder
            .encode_frame(image::Frame::from_parts(buf, 0, 0, delay))
        {
            return Err(self.fail(format!("failed to encode gif frame {}: {e}", index.0)));
        }
        tracing::debug!(frame = index.0, "gif frame written");
        Ok(())
    }

    fn end(&mut self) -> TrainmapResult<()> {
        let Some(active) = self.active.take() else {
            return Err(TrainmapError::export("gif sink is not started"));
        };
        let Active {
            encoder,
            write_error,
            file,
            ..
        } = active;
        if let Err(e) = finish_gif(encoder, &write_error).and_then(|()| file.sync_all()) {
            discard_partial(&self.partial);
            return Err(TrainmapError::export(format!(
                "failed to finish '{}': {e}",
                self.partial.display()
            )));
        }
        if let Err(e) = commit_partial(&self.partial, &self.out_path, self.overwrite) {
            discard_partial(&self.partial);
            return Err(e);
        }
        tracing::info!(out = %self.out_path.display(), "gif written");
        Ok(())
    }

    fn abort(&mut self) {
        drop(self.active.take());
        discard_partial(&self.partial);
    }
}

impl Drop for GifSink {
    fn drop(&mut self) {
        if self.active.is_some() {
            self.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::core::{FrameInterval, Rgba8};
    use image::AnimationDecoder as _;

    fn cfg(w: u32, h: u32, ms: u32) -> SinkConfig {
        SinkConfig {
            width: w,
            height: h,
            interval: FrameInterval::from_millis(ms).unwrap(),
            background: Rgba8::opaque(255, 255, 255),
        }
    }

    fn solid(w: u32, h: u32, px: [u8; 4]) -> FrameRGBA {
        FrameRGBA {
            width: w,
            height: h,
            data: px.repeat((w * h) as usize),
            premultiplied: true,
        }
    }

    fn fresh(name: &str) -> PathBuf {
        let dir = PathBuf::from("target").join("gif_sink");
        std::fs::create_dir_all(&dir).unwrap();
        let out = dir.join(name);
        let _ = std::fs::remove_file(&out);
        out
    }

    #[test]
    fn writes_frames_with_interval_delay() {
        let out = fresh("three.gif");
        let mut sink = GifSink::new(&out);
        sink.begin(&cfg(4, 4, 250)).unwrap();
        for i in 0..3 {
            sink.push_frame(FrameIndex(i), &solid(4, 4, [255, 0, 0, 255]))
                .unwrap();
        }
        sink.end().unwrap();
        assert!(!partial_path(&out).exists());

        let file = std::io::BufReader::new(File::open(&out).unwrap());
        let decoder = image::codecs::gif::GifDecoder::new(file).unwrap();
        let frames = decoder.into_frames().collect_frames().unwrap();
        assert_eq!(frames.len(), 3);
        for f in &frames {
            assert_eq!(f.delay().numer_denom_ms(), (250, 1));
            let px = f.buffer().get_pixel(1, 1).0;
            assert!(px[0] > 200 && px[1] < 50 && px[2] < 50, "{px:?}");
        }
    }

    #[test]
    fn abort_leaves_nothing_behind() {
        let out = fresh("aborted.gif");
        let mut sink = GifSink::new(&out);
        sink.begin(&cfg(4, 4, 100)).unwrap();
        sink.push_frame(FrameIndex(0), &solid(4, 4, [0, 0, 0, 255]))
            .unwrap();
        assert!(partial_path(&out).exists());
        sink.abort();
        assert!(!partial_path(&out).exists());
        assert!(!out.exists());
    }

    #[test]
    fn dropping_an_unfinished_sink_cleans_up() {
        let out = fresh("dropped.gif");
        {
            let mut sink = GifSink::new(&out);
            sink.begin(&cfg(4, 4, 100)).unwrap();
        }
        assert!(!partial_path(&out).exists());
        assert!(!out.exists());
    }

    /// Accepts `budget` bytes, then fails every write.
    struct ShortWriter {
        budget: usize,
    }

    impl Write for ShortWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::Error::new(io::ErrorKind::StorageFull, "no space left"));
            }
            let n = buf.len().min(self.budget);
            self.budget -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn finishing_reports_a_write_failure_hidden_in_the_trailer() {
        let (mut encoder, error) = gif_writer(ShortWriter { budget: 16 }, 30);
        // Small frames stay in the BufWriter, so the failure only shows on drop.
        for _ in 0..3 {
            let buf = image::RgbaImage::from_pixel(4, 4, image::Rgba([9, 9, 9, 255]));
            encoder
                .encode_frame(image::Frame::from_parts(
                    buf,
                    0,
                    0,
                    image::Delay::from_numer_denom_ms(100, 1),
                ))
                .unwrap();
        }
        let err = finish_gif(encoder, &error).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::StorageFull);
    }

    #[test]
    fn finishing_a_healthy_writer_is_ok() {
        let (encoder, error) = gif_writer(Vec::new(), 30);
        assert!(finish_gif(encoder, &error).is_ok());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn end_fails_and_keeps_the_target_when_the_disk_is_full() {
        let out = fresh("full_disk.gif");
        std::fs::write(&out, b"previous").unwrap();
        let mut sink = GifSink::new(&out);
        sink.begin(&cfg(4, 4, 100)).unwrap();
        {
            let full = std::fs::OpenOptions::new()
                .write(true)
                .open("/dev/full")
                .unwrap();
            let (encoder, write_error) = gif_writer(full, sink.speed);
            let active = sink.active.as_mut().unwrap();
            active.encoder = encoder;
            active.write_error = write_error;
        }
        for i in 0..3 {
            sink.push_frame(FrameIndex(i), &solid(4, 4, [0, 128, 0, 255]))
                .unwrap();
        }
        assert!(matches!(sink.end(), Err(TrainmapError::Export(_))));
        assert!(!partial_path(&out).exists());
        assert_eq!(std::fs::read(&out).unwrap(), b"previous");
    }

    #[test]
    fn refuses_to_clobber_when_overwrite_is_off() {
        let out = fresh("existing.gif");
        std::fs::write(&out, b"previous").unwrap();
        let mut sink = GifSink::new(&out).with_overwrite(false);
        assert!(matches!(
            sink.begin(&cfg(4, 4, 100)),
            Err(TrainmapError::Export(_))
        ));
        assert_eq!(std::fs::read(&out).unwrap(), b"previous");
    }
}
