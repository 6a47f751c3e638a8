use std::collections::HashMap;
use std::sync::Arc;

use crate::assets::PreparedImage;
use crate::foundation::core::{Affine, BezPath, Canvas, Point, Rgba8};
use crate::foundation::error::{TrainmapError, TrainmapResult};
use crate::render::FrameRGBA;
use crate::render::plan::{DrawOp, FramePlan, HAlign, TextAnchor, VAlign};
use crate::render::text::{TextBrushRgba8, TextLayoutEngine};

/// The one mutable drawing surface of a render run.
///
/// Frames borrow it through [`DrawingSurface::begin_frame`]; the returned [`FrameScope`] clears
/// the surface on entry and resets the raster context when it is dropped, whether or not the
/// frame finished.
pub struct DrawingSurface {
    canvas: Canvas,
    width: u16,
    height: u16,
    ctx: vello_cpu::RenderContext,
    pixmap: vello_cpu::Pixmap,
    text: Option<TextLayoutEngine>,
    // Keyed by the address of the shared pixel buffer; entries hold that buffer alive.
    image_cache: HashMap<usize, (Arc<Vec<u8>>, vello_cpu::Image)>,
}

impl DrawingSurface {
    pub fn new(canvas: Canvas) -> TrainmapResult<Self> {
        canvas.validate()?;
        let width: u16 = canvas
            .width
            .try_into()
            .map_err(|_| TrainmapError::invalid_argument("surface width exceeds u16"))?;
        let height: u16 = canvas
            .height
            .try_into()
            .map_err(|_| TrainmapError::invalid_argument("surface height exceeds u16"))?;
        Ok(Self {
            canvas,
            width,
            height,
            ctx: vello_cpu::RenderContext::new(width, height),
            pixmap: vello_cpu::Pixmap::new(width, height),
            text: None,
            image_cache: HashMap::new(),
        })
    }

    /// Attach a font; without one, text ops are skipped.
    pub(crate) fn with_text(mut self, text: Option<TextLayoutEngine>) -> Self {
        self.text = text;
        self
    }

    pub fn canvas(&self) -> Canvas {
        self.canvas
    }

    pub fn has_text(&self) -> bool {
        self.text.is_some()
    }

    /// Acquire the surface for one frame.
    pub fn begin_frame(&mut self) -> FrameScope<'_> {
        self.ctx.reset();
        clear_pixmap(&mut self.pixmap, [0, 0, 0, 0]);
        FrameScope { surface: self }
    }

    /// Paint `plan` in a fresh frame scope and read the pixels back.
    pub fn render(&mut self, plan: &FramePlan) -> TrainmapResult<FrameRGBA> {
        let mut scope = self.begin_frame();
        scope.paint(plan)?;
        Ok(scope.finish())
    }

    fn image_paint_for(&mut self, image: &PreparedImage) -> TrainmapResult<vello_cpu::Image> {
        let key = Arc::as_ptr(&image.rgba8_premul) as usize;
        if let Some((_, paint)) = self.image_cache.get(&key) {
            return Ok(paint.clone());
        }
        let pixmap = pixmap_from_premul_bytes(&image.rgba8_premul, image.width, image.height)?;
        let paint = vello_cpu::Image {
            image: vello_cpu::ImageSource::Pixmap(Arc::new(pixmap)),
            sampler: vello_cpu::peniko::ImageSampler::default(),
        };
        self.image_cache
            .insert(key, (image.rgba8_premul.clone(), paint.clone()));
        Ok(paint)
    }
}

/// Exclusive, per-frame access to a [`DrawingSurface`].
pub struct FrameScope<'a> {
    surface: &'a mut DrawingSurface,
}

impl FrameScope<'_> {
    /// Execute every op of `plan`, in order.
    pub fn paint(&mut self, plan: &FramePlan) -> TrainmapResult<()> {
        if plan.canvas != self.surface.canvas {
            return Err(TrainmapError::render(format!(
                "plan canvas {}x{} does not match surface {}x{}",
                plan.canvas.width,
                plan.canvas.height,
                self.surface.canvas.width,
                self.surface.canvas.height
            )));
        }
        for op in plan.ops() {
            self.draw(op)?;
        }
        Ok(())
    }

    /// Rasterize what was painted and hand back the pixels.
    pub fn finish(self) -> FrameRGBA {
        let s = &mut *self.surface;
        s.ctx.flush();
        s.ctx.render_to_pixmap(&mut s.pixmap);
        FrameRGBA {
            width: s.canvas.width,
            height: s.canvas.height,
            data: s.pixmap.data_as_u8_slice().to_vec(),
            premultiplied: true,
        }
    }

    fn draw(&mut self, op: &DrawOp) -> TrainmapResult<()> {
        let (w, h) = (
            f64::from(self.surface.width),
            f64::from(self.surface.height),
        );
        self.surface
            .ctx
            .set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);

        match op {
            DrawOp::Background { color } => {
                let ctx = &mut self.surface.ctx;
                ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
                ctx.set_paint(color_to_cpu(*color));
                ctx.fill_rect(&vello_cpu::kurbo::Rect::new(0.0, 0.0, w, h));
                Ok(())
            }
            DrawOp::Tile { image, dest, .. } => {
                let paint = self.surface.image_paint_for(image)?;
                let tr = Affine::translate((dest.x0, dest.y0))
                    * Affine::scale_non_uniform(
                        dest.width() / f64::from(image.width),
                        dest.height() / f64::from(image.height),
                    );
                let ctx = &mut self.surface.ctx;
                ctx.set_transform(affine_to_cpu(tr));
                ctx.set_paint(paint);
                ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
                    0.0,
                    0.0,
                    f64::from(image.width),
                    f64::from(image.height),
                ));
                Ok(())
            }
            DrawOp::RouteLine {
                path,
                color,
                width_px,
            } => {
                let style = kurbo::Stroke::new(*width_px)
                    .with_caps(kurbo::Cap::Round)
                    .with_join(kurbo::Join::Round);
                let outline = kurbo::stroke(path.iter(), &style, &kurbo::StrokeOpts::default(), 0.1);
                let ctx = &mut self.surface.ctx;
                ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
                ctx.set_paint(color_to_cpu(*color));
                ctx.fill_path(&bezpath_to_cpu(&outline));
                Ok(())
            }
            DrawOp::Marker {
                image,
                center,
                size,
            } => {
                let paint = self.surface.image_paint_for(image)?;
                let (mw, mh) = *size;
                let tr = Affine::translate((center.x - mw / 2.0, center.y - mh / 2.0))
                    * Affine::scale_non_uniform(
                        mw / f64::from(image.width),
                        mh / f64::from(image.height),
                    );
                let ctx = &mut self.surface.ctx;
                ctx.set_transform(affine_to_cpu(tr));
                ctx.set_paint(paint);
                ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
                    0.0,
                    0.0,
                    f64::from(image.width),
                    f64::from(image.height),
                ));
                Ok(())
            }
            DrawOp::Text {
                text,
                position,
                anchor,
                size_px,
                color,
                ..
            } => {
                let Some(engine) = self.surface.text.as_mut() else {
                    return Ok(());
                };
                let layout = engine.layout_plain(text, *size_px, TextBrushRgba8::from(*color))?;
                let origin = anchored_origin(
                    *position,
                    *anchor,
                    f64::from(layout.width()),
                    f64::from(layout.height()),
                );
                let font = engine.font().clone();

                let ctx = &mut self.surface.ctx;
                ctx.set_transform(affine_to_cpu(Affine::translate((origin.x, origin.y))));
                for line in layout.lines() {
                    for item in line.items() {
                        let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                            continue;
                        };
                        let brush = run.style().brush;
                        ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
                            brush.r, brush.g, brush.b, brush.a,
                        ));
                        let glyphs = run.glyphs().map(|g| vello_cpu::Glyph {
                            id: g.id,
                            x: g.x,
                            y: g.y,
                        });
                        ctx.glyph_run(&font)
                            .font_size(run.run().font_size())
                            .fill_glyphs(glyphs);
                    }
                }
                Ok(())
            }
        }
    }
}

impl Drop for FrameScope<'_> {
    fn drop(&mut self) {
        self.surface.ctx.reset();
    }
}

/// Top-left corner of a `w`×`h` block placed against `position` per `anchor`.
pub(crate) fn anchored_origin(position: Point, anchor: TextAnchor, w: f64, h: f64) -> Point {
    let x = match anchor.h {
        HAlign::Left => position.x,
        HAlign::Center => position.x - w / 2.0,
        HAlign::Right => position.x - w,
    };
    let y = match anchor.v {
        VAlign::Top => position.y,
        VAlign::Center => position.y - h / 2.0,
        VAlign::Bottom => position.y - h,
    };
    Point::new(x, y)
}

fn color_to_cpu(c: Rgba8) -> vello_cpu::peniko::Color {
    vello_cpu::peniko::Color::from_rgba8(c.r, c.g, c.b, c.a)
}

fn clear_pixmap(pixmap: &mut vello_cpu::Pixmap, rgba: [u8; 4]) {
    let data = pixmap.data_as_u8_slice_mut();
    for px in data.chunks_exact_mut(4) {
        px.copy_from_slice(&rgba);
    }
}

fn affine_to_cpu(a: Affine) -> vello_cpu::kurbo::Affine {
    vello_cpu::kurbo::Affine::new(a.as_coeffs())
}

fn point_to_cpu(p: Point) -> vello_cpu::kurbo::Point {
    vello_cpu::kurbo::Point::new(p.x, p.y)
}

fn bezpath_to_cpu(path: &BezPath) -> vello_cpu::kurbo::BezPath {
    use kurbo::PathEl;

    let mut out = vello_cpu::kurbo::BezPath::new();
    for &el in path.elements() {
        match el {
            PathEl::MoveTo(p) => out.move_to(point_to_cpu(p)),
            PathEl::LineTo(p) => out.line_to(point_to_cpu(p)),
            PathEl::QuadTo(p1, p2) => out.quad_to(point_to_cpu(p1), point_to_cpu(p2)),
            PathEl::CurveTo(p1, p2, p3) => {
                out.curve_to(point_to_cpu(p1), point_to_cpu(p2), point_to_cpu(p3));
            }
            PathEl::ClosePath => out.close_path(),
        }
    }
    out
}

fn pixmap_from_premul_bytes(
    bytes: &[u8],
    width: u32,
    height: u32,
) -> TrainmapResult<vello_cpu::Pixmap> {
    let w: u16 = width
        .try_into()
        .map_err(|_| TrainmapError::render("image width exceeds u16"))?;
    let h: u16 = height
        .try_into()
        .map_err(|_| TrainmapError::render("image height exceeds u16"))?;
    if bytes.len()
        != (width as usize)
            .saturating_mul(height as usize)
            .saturating_mul(4)
    {
        return Err(TrainmapError::render("image byte length mismatch"));
    }

    let mut may_have_opacities = false;
    let mut pixels = Vec::with_capacity(width as usize * height as usize);
    for px in bytes.chunks_exact(4) {
        may_have_opacities |= px[3] != 255;
        pixels.push(vello_cpu::peniko::color::PremulRgba8::from_u8_array([
            px[0], px[1], px[2], px[3],
        ]));
    }
    Ok(vello_cpu::Pixmap::from_parts_with_opacity(
        pixels,
        w,
        h,
        may_have_opacities,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basemap::TileId;
    use crate::foundation::core::{FrameIndex, Rect};

    fn canvas() -> Canvas {
        Canvas {
            width: 32,
            height: 24,
        }
    }

    fn px(frame: &FrameRGBA, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * frame.width + x) * 4) as usize;
        [
            frame.data[i],
            frame.data[i + 1],
            frame.data[i + 2],
            frame.data[i + 3],
        ]
    }

    fn assert_px_close(actual: [u8; 4], expected: [u8; 4]) {
        for (a, e) in actual.iter().zip(expected.iter()) {
            assert!(a.abs_diff(*e) <= 1, "got {actual:?}, expected {expected:?}");
        }
    }

    fn base_plan() -> FramePlan {
        let mut plan = FramePlan::new(FrameIndex(0), canvas());
        plan.push(DrawOp::Background {
            color: Rgba8::opaque(250, 250, 248),
        })
        .unwrap();
        plan
    }

    #[test]
    fn background_fills_whole_frame() {
        let mut surface = DrawingSurface::new(canvas()).unwrap();
        let frame = surface.render(&base_plan()).unwrap();
        assert_eq!(frame.width, 32);
        assert_eq!(frame.height, 24);
        assert_eq!(frame.data.len(), 32 * 24 * 4);
        assert!(frame.premultiplied);
        assert_px_close(px(&frame, 0, 0), [250, 250, 248, 255]);
        assert_px_close(px(&frame, 31, 23), [250, 250, 248, 255]);
    }

    #[test]
    fn marker_stays_visible_over_opaque_tile() {
        let mut plan = base_plan();
        plan.push(DrawOp::Tile {
            id: TileId { z: 0, x: 0, y: 0 },
            image: PreparedImage::solid(4, 4, Rgba8::opaque(0, 0, 255)),
            dest: Rect::new(0.0, 0.0, 32.0, 24.0),
        })
        .unwrap();
        plan.push(DrawOp::Marker {
            image: PreparedImage::solid(2, 1, Rgba8::opaque(255, 0, 0)),
            center: Point::new(16.0, 12.0),
            size: (10.0, 6.0),
        })
        .unwrap();

        let mut surface = DrawingSurface::new(canvas()).unwrap();
        let frame = surface.render(&plan).unwrap();
        assert_px_close(px(&frame, 16, 12), [255, 0, 0, 255]);
        assert_px_close(px(&frame, 2, 2), [0, 0, 255, 255]);
    }

    #[test]
    fn route_line_paints_along_its_path() {
        let mut plan = base_plan();
        let mut path = BezPath::new();
        path.move_to((2.0, 12.0));
        path.line_to((30.0, 12.0));
        plan.push(DrawOp::RouteLine {
            path,
            color: Rgba8::opaque(128, 128, 128),
            width_px: 4.0,
        })
        .unwrap();

        let mut surface = DrawingSurface::new(canvas()).unwrap();
        let frame = surface.render(&plan).unwrap();
        assert_px_close(px(&frame, 16, 12), [128, 128, 128, 255]);
        assert_px_close(px(&frame, 16, 2), [250, 250, 248, 255]);
    }

    #[test]
    fn text_without_font_is_skipped() {
        let mut plan = base_plan();
        plan.push(DrawOp::Text {
            layer: crate::render::plan::Layer::Labels,
            text: "Guangzhou".to_string(),
            position: Point::new(16.0, 12.0),
            anchor: TextAnchor::default(),
            size_px: 12.0,
            color: Rgba8::opaque(0, 0, 0),
        })
        .unwrap();
        let mut surface = DrawingSurface::new(canvas()).unwrap();
        assert!(!surface.has_text());
        let frame = surface.render(&plan).unwrap();
        assert_px_close(px(&frame, 16, 12), [250, 250, 248, 255]);
    }

    #[test]
    fn frames_do_not_leak_into_each_other() {
        let mut surface = DrawingSurface::new(canvas()).unwrap();
        let mut first = base_plan();
        first
            .push(DrawOp::Marker {
                image: PreparedImage::solid(1, 1, Rgba8::opaque(255, 0, 0)),
                center: Point::new(5.0, 5.0),
                size: (4.0, 4.0),
            })
            .unwrap();
        let _ = surface.render(&first).unwrap();

        // An abandoned scope must not leave its ops behind either.
        {
            let mut scope = surface.begin_frame();
            scope.paint(&first).unwrap();
        }

        let empty = FramePlan::new(FrameIndex(1), canvas());
        let frame = surface.render(&empty).unwrap();
        assert!(frame.data.iter().all(|&b| b == 0));
    }

    #[test]
    fn plan_for_other_canvas_is_rejected() {
        let mut surface = DrawingSurface::new(canvas()).unwrap();
        let plan = FramePlan::new(
            FrameIndex(0),
            Canvas {
                width: 8,
                height: 8,
            },
        );
        assert!(matches!(
            surface.render(&plan),
            Err(TrainmapError::Render(_))
        ));
    }

    #[test]
    fn anchors_place_block_relative_to_point() {
        let p = Point::new(100.0, 50.0);
        let right_bottom = TextAnchor {
            h: HAlign::Right,
            v: VAlign::Bottom,
        };
        assert_eq!(
            anchored_origin(p, right_bottom, 40.0, 10.0),
            Point::new(60.0, 40.0)
        );
        let left_top = TextAnchor {
            h: HAlign::Left,
            v: VAlign::Top,
        };
        assert_eq!(anchored_origin(p, left_top, 40.0, 10.0), p);
    }
}
