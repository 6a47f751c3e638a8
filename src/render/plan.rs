use crate::assets::PreparedImage;
use crate::basemap::TileId;
use crate::foundation::core::{BezPath, Canvas, FrameIndex, Point, Rect, Rgba8};
use crate::foundation::error::{TrainmapError, TrainmapResult};

/// Paint layers, bottom to top.
///
/// A [`FramePlan`] only accepts ops in non-decreasing layer order, so the basemap can never end
/// up above the marker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Layer {
    Basemap,
    Route,
    Marker,
    Labels,
    Title,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HAlign {
    Left,
    #[default]
    Center,
    Right,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VAlign {
    Top,
    #[default]
    Center,
    Bottom,
}

/// Which side of the anchor a text block sits on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TextAnchor {
    /// `Right` puts the text's right edge on the anchor.
    pub h: HAlign,
    /// `Bottom` puts the text's bottom edge on the anchor.
    pub v: VAlign,
}

#[derive(Clone, Debug)]
pub enum DrawOp {
    /// Fill the whole canvas.
    Background { color: Rgba8 },
    /// Basemap image stretched over `dest` (pixel space).
    Tile {
        id: TileId,
        image: PreparedImage,
        dest: Rect,
    },
    /// Route polyline in pixel space.
    RouteLine {
        path: BezPath,
        color: Rgba8,
        width_px: f64,
    },
    /// Train marker image centred on `center`.
    Marker {
        image: PreparedImage,
        center: Point,
        size: (f64, f64),
    },
    Text {
        layer: Layer,
        text: String,
        position: Point,
        anchor: TextAnchor,
        size_px: f32,
        color: Rgba8,
    },
}

impl DrawOp {
    pub fn layer(&self) -> Layer {
        match self {
            DrawOp::Background { .. } | DrawOp::Tile { .. } => Layer::Basemap,
            DrawOp::RouteLine { .. } => Layer::Route,
            DrawOp::Marker { .. } => Layer::Marker,
            DrawOp::Text { layer, .. } => *layer,
        }
    }
}

/// Everything needed to paint one frame, already in pixel space and in paint order.
#[derive(Clone, Debug)]
pub struct FramePlan {
    pub frame: FrameIndex,
    pub canvas: Canvas,
    ops: Vec<DrawOp>,
}

impl FramePlan {
    pub fn new(frame: FrameIndex, canvas: Canvas) -> Self {
        Self {
            frame,
            canvas,
            ops: Vec::new(),
        }
    }

    /// Append an op; fails if it belongs below a layer that was already drawn.
    pub fn push(&mut self, op: DrawOp) -> TrainmapResult<()> {
        if let Some(last) = self.ops.last()
            && op.layer() < last.layer()
        {
            return Err(TrainmapError::render(format!(
                "{:?} op submitted after {:?}; layers must be painted bottom to top",
                op.layer(),
                last.layer()
            )));
        }
        self.ops.push(op);
        Ok(())
    }

    pub fn ops(&self) -> &[DrawOp] {
        &self.ops
    }

    /// Distinct layers in paint order.
    pub fn layers(&self) -> Vec<Layer> {
        let mut out: Vec<Layer> = self.ops.iter().map(DrawOp::layer).collect();
        out.dedup();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> FramePlan {
        FramePlan::new(
            FrameIndex(0),
            Canvas {
                width: 10,
                height: 10,
            },
        )
    }

    fn marker() -> DrawOp {
        DrawOp::Marker {
            image: PreparedImage::solid(1, 1, Rgba8::opaque(255, 0, 0)),
            center: Point::new(5.0, 5.0),
            size: (1.0, 1.0),
        }
    }

    #[test]
    fn layer_order_is_bottom_to_top() {
        assert!(Layer::Basemap < Layer::Route);
        assert!(Layer::Route < Layer::Marker);
        assert!(Layer::Marker < Layer::Labels);
        assert!(Layer::Labels < Layer::Title);
    }

    #[test]
    fn basemap_after_marker_is_rejected() {
        let mut p = plan();
        p.push(marker()).unwrap();
        let err = p
            .push(DrawOp::Background {
                color: Rgba8::opaque(0, 0, 0),
            })
            .unwrap_err();
        assert!(matches!(err, TrainmapError::Render(_)));
        assert_eq!(p.ops().len(), 1);
    }

    #[test]
    fn same_layer_ops_may_repeat() {
        let mut p = plan();
        p.push(DrawOp::Background {
            color: Rgba8::opaque(0, 0, 0),
        })
        .unwrap();
        p.push(DrawOp::Background {
            color: Rgba8::opaque(1, 1, 1),
        })
        .unwrap();
        p.push(marker()).unwrap();
        assert_eq!(p.layers(), vec![Layer::Basemap, Layer::Marker]);
    }

    #[test]
    fn anchor_parses_lowercase_names() {
        let a: TextAnchor = serde_json::from_str(r#"{"h":"right","v":"bottom"}"#).unwrap();
        assert_eq!(
            a,
            TextAnchor {
                h: HAlign::Right,
                v: VAlign::Bottom
            }
        );
    }
}
