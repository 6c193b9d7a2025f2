//! Vello scene surface.

use inkroom_core::{CompositeMode, LineCap, LineJoin, StrokeSurface, ToolSnapshot};
use kurbo::{Affine, Cap, Circle, Join, Line, Point, Rect, Stroke};
use peniko::{BlendMode, Color, Compose, Fill, Mix};
use vello::Scene;

/// A board surface that records strokes into a [`vello::Scene`].
///
/// Non-default compositing is applied per segment through a layer clipped to
/// the surface bounds, matching a 2D canvas that strokes each segment with
/// its own composite operation.
pub struct VelloSurface {
    scene: Scene,
    width: f64,
    height: f64,
    stroke: Stroke,
    color: Color,
    composite: CompositeMode,
    cap: LineCap,
    segments: usize,
}

impl VelloSurface {
    pub fn new(width: f64, height: f64) -> Self {
        let pen = ToolSnapshot::default();
        Self {
            scene: Scene::new(),
            width,
            height,
            stroke: stroke_for(&pen),
            color: color_for(&pen),
            composite: pen.composite,
            cap: pen.cap,
            segments: 0,
        }
    }

    /// The scene built since the last reset.
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Take the scene, leaving an empty one in its place.
    pub fn take_scene(&mut self) -> Scene {
        std::mem::take(&mut self.scene)
    }

    pub fn size(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    /// Segments painted since the last reset.
    pub fn segment_count(&self) -> usize {
        self.segments
    }

    fn bounds(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width, self.height)
    }

    fn paint(&mut self, from: Point, to: Point) {
        if from == to {
            // A zero-length stroke shows only its caps.
            let half = self.stroke.width / 2.0;
            match self.cap {
                LineCap::Round => self.scene.fill(
                    Fill::NonZero,
                    Affine::IDENTITY,
                    self.color,
                    None,
                    &Circle::new(to, half),
                ),
                LineCap::Square => self.scene.fill(
                    Fill::NonZero,
                    Affine::IDENTITY,
                    self.color,
                    None,
                    &Rect::from_center_size(to, (self.stroke.width, self.stroke.width)),
                ),
                LineCap::Butt => {}
            }
        } else {
            self.scene.stroke(
                &self.stroke,
                Affine::IDENTITY,
                self.color,
                None,
                &Line::new(from, to),
            );
        }
    }
}

impl StrokeSurface for VelloSurface {
    fn apply_tool(&mut self, tool: &ToolSnapshot) {
        self.stroke = stroke_for(tool);
        self.color = color_for(tool);
        self.composite = tool.composite;
        self.cap = tool.cap;
    }

    fn stroke_segment(&mut self, from: Point, to: Point) {
        match blend_for(self.composite) {
            Some(blend) => {
                let clip = self.bounds();
                self.scene.push_layer(blend, 1.0, Affine::IDENTITY, &clip);
                self.paint(from, to);
                self.scene.pop_layer();
            }
            None => self.paint(from, to),
        }
        self.segments += 1;
    }

    fn reset(&mut self, width: f64, height: f64) {
        log::debug!("Resetting vello surface to {}x{}", width, height);
        self.scene.reset();
        self.width = width;
        self.height = height;
        self.segments = 0;
    }
}

fn stroke_for(tool: &ToolSnapshot) -> Stroke {
    let join = match tool.join {
        LineJoin::Round => Join::Round,
        LineJoin::Bevel => Join::Bevel,
        LineJoin::Miter => Join::Miter,
    };
    let cap = match tool.cap {
        LineCap::Round => Cap::Round,
        LineCap::Butt => Cap::Butt,
        LineCap::Square => Cap::Square,
    };
    Stroke::new(tool.width).with_join(join).with_caps(cap)
}

fn color_for(tool: &ToolSnapshot) -> Color {
    let color: Color = tool.color.into();
    color.multiply_alpha(tool.opacity.clamp(0.0, 1.0) as f32)
}

/// Layer blend for a composite mode; `None` paints directly.
fn blend_for(mode: CompositeMode) -> Option<BlendMode> {
    match mode {
        CompositeMode::SourceOver => None,
        CompositeMode::DestinationOut => Some(BlendMode::new(Mix::Normal, Compose::DestOut)),
        CompositeMode::Multiply => Some(BlendMode::new(Mix::Multiply, Compose::SrcOver)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkroom_core::{Board, BoardId, ToolKind};
    use kurbo::Size;

    #[test]
    fn test_blend_modes() {
        assert!(blend_for(CompositeMode::SourceOver).is_none());
        assert_eq!(
            blend_for(CompositeMode::DestinationOut),
            Some(BlendMode::new(Mix::Normal, Compose::DestOut))
        );
        assert_eq!(
            blend_for(CompositeMode::Multiply).map(|b| b.mix),
            Some(Mix::Multiply)
        );
    }

    #[test]
    fn test_stroke_attributes() {
        let stroke = stroke_for(&ToolKind::Highlighter.defaults());
        assert_eq!(stroke.width, 50.0);
        assert_eq!(stroke.join, Join::Round);
        assert_eq!(stroke.start_cap, Cap::Round);
    }

    #[test]
    fn test_opacity_applied() {
        let faded = ToolSnapshot {
            opacity: 0.5,
            ..ToolKind::Pen.defaults()
        };
        assert!((color_for(&faded).components[3] - 0.5).abs() < 1e-3);
        let highlighter = ToolKind::Highlighter.defaults();
        assert!((color_for(&highlighter).components[3] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_board_renders_into_scene() {
        let mut board = Board::new(
            BoardId(1),
            "Board 1",
            Size::new(640.0, 480.0),
            VelloSurface::new(640.0, 480.0),
        );
        board.show();
        let eraser = ToolKind::Eraser.defaults();
        board.add_point(10.0, 10.0, false, ToolKind::Pen.defaults()).unwrap();
        board.add_point(20.0, 10.0, true, ToolKind::Pen.defaults()).unwrap();
        board.add_point(15.0, 10.0, false, eraser).unwrap();

        assert_eq!(board.render(), 3);
        assert_eq!(board.surface().segment_count(), 3);

        board.add_point(630.0, 10.0, true, ToolKind::Pen.defaults()).unwrap();
        board.render();
        assert_eq!(board.surface().size(), (960.0, 720.0));
        assert_eq!(board.surface().segment_count(), 4);
    }
}
