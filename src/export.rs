use crate::encode::{FrameSink, SinkConfig};
use crate::foundation::core::{Canvas, FrameIndex, FrameInterval, Rgba8};
use crate::foundation::error::{TrainmapError, TrainmapResult};
use crate::render::FrameRGBA;

/// Render `frame_count` frames in order and hand each one to `sink`.
///
/// Frames are produced strictly one after another: frame `i + 1` is not requested until frame `i`
/// has been accepted by the sink. The first error from either side aborts the sink, so no
/// partial output survives, and is returned unchanged.
#[tracing::instrument(skip_all, fields(frames = frame_count, interval_ms = interval.as_millis()))]
pub fn export_frames<F>(
    frame_count: u64,
    interval: FrameInterval,
    canvas: Canvas,
    background: Rgba8,
    mut render: F,
    sink: &mut dyn FrameSink,
) -> TrainmapResult<()>
where
    F: FnMut(FrameIndex) -> TrainmapResult<FrameRGBA>,
{
    if frame_count == 0 {
        return Err(TrainmapError::invalid_argument(
            "frame count must be at least 1",
        ));
    }
    canvas.validate()?;

    let cfg = SinkConfig {
        width: canvas.width,
        height: canvas.height,
        interval,
        background,
    };
    sink.begin(&cfg)?;

    let result = (|| {
        for i in 0..frame_count {
            let index = FrameIndex(i);
            let frame = render(index)?;
            sink.push_frame(index, &frame)?;
            tracing::debug!(frame = i, "frame exported");
        }
        sink.end()
    })();

    match result {
        Ok(()) => {
            tracing::info!(frames = frame_count, "export finished");
            Ok(())
        }
        Err(e) => {
            tracing::warn!(error = %e, "export aborted");
            sink.abort();
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::encode::InMemorySink;

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn canvas() -> Canvas {
        Canvas {
            width: 2,
            height: 2,
        }
    }

    fn blank(_: FrameIndex) -> TrainmapResult<FrameRGBA> {
        Ok(FrameRGBA {
            width: 2,
            height: 2,
            data: vec![0; 16],
            premultiplied: true,
        })
    }

    fn interval() -> FrameInterval {
        FrameInterval::from_millis(100).unwrap()
    }

    #[test]
    fn renders_each_frame_once_in_order() {
        let mut seen = Vec::new();
        let mut sink = InMemorySink::new();
        export_frames(
            5,
            interval(),
            canvas(),
            Rgba8::opaque(255, 255, 255),
            |i| {
                seen.push(i.0);
                blank(i)
            },
            &mut sink,
        )
        .unwrap();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
        assert_eq!(sink.frames().len(), 5);
        assert!(sink.is_finished());
        assert_eq!(sink.config().unwrap().interval, interval());
    }

    #[test]
    fn export_span_carries_only_frame_count_and_interval() {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            let mut sink = InMemorySink::new();
            export_frames(
                2,
                interval(),
                canvas(),
                Rgba8::opaque(1, 2, 3),
                blank,
                &mut sink,
            )
        })
        .unwrap();

        let text = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(text.contains("export_frames{frames=2 interval_ms=100}"), "{text}");
        for arg in ["frame_count=", "interval=", "canvas=", "background="] {
            assert!(!text.contains(arg), "{arg} leaked into the span: {text}");
        }
    }

    #[test]
    fn zero_frames_is_invalid() {
        let mut sink = InMemorySink::new();
        let err = export_frames(
            0,
            interval(),
            canvas(),
            Rgba8::opaque(0, 0, 0),
            blank,
            &mut sink,
        )
        .unwrap_err();
        assert!(matches!(err, TrainmapError::InvalidArgument(_)));
        assert!(sink.config().is_none());
    }

    #[test]
    fn failing_frame_stops_the_run_and_aborts_the_sink() {
        let mut calls = 0;
        let mut sink = InMemorySink::new();
        let err = export_frames(
            10,
            interval(),
            canvas(),
            Rgba8::opaque(0, 0, 0),
            |i| {
                calls += 1;
                if i.0 == 3 {
                    Err(TrainmapError::render("tile missing"))
                } else {
                    blank(i)
                }
            },
            &mut sink,
        )
        .unwrap_err();
        assert!(matches!(err, TrainmapError::Render(_)));
        assert_eq!(calls, 4);
        assert!(sink.was_aborted());
        assert!(!sink.is_finished());
        assert!(sink.frames().is_empty());
    }
}
