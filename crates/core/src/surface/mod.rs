//! The 2D raster drawing capability the visualizations render into.

mod pixel;

use serde::{Deserialize, Serialize};

use crate::{Result, VisualiserError};

pub use pixel::PixelSurface;

/// 8-bit RGBA colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const BLACK: Rgba = Rgba::rgb(0, 0, 0);
    pub const TRANSPARENT: Rgba = Rgba::new(0, 0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    /// Builds an opaque colour from hue in degrees and saturation/lightness
    /// in `[0, 1]`.
    pub fn from_hsl(hue: f32, saturation: f32, lightness: f32) -> Self {
        let h = hue.rem_euclid(360.0) / 60.0;
        let s = saturation.clamp(0.0, 1.0);
        let l = lightness.clamp(0.0, 1.0);

        let chroma = (1.0 - (2.0 * l - 1.0).abs()) * s;
        let x = chroma * (1.0 - (h % 2.0 - 1.0).abs());
        let (r, g, b) = match h as u32 {
            0 => (chroma, x, 0.0),
            1 => (x, chroma, 0.0),
            2 => (0.0, chroma, x),
            3 => (0.0, x, chroma),
            4 => (x, 0.0, chroma),
            _ => (chroma, 0.0, x),
        };
        let m = l - chroma / 2.0;
        let channel = |v: f32| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;

        Self::rgb(channel(r), channel(g), channel(b))
    }

    /// Same colour with its alpha replaced by `opacity` in `[0, 1]`.
    pub fn with_opacity(self, opacity: f32) -> Self {
        Self {
            a: (opacity.clamp(0.0, 1.0) * 255.0).round() as u8,
            ..self
        }
    }

    fn lerp(self, other: Rgba, t: f32) -> Rgba {
        let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;
        Rgba::new(
            mix(self.r, other.r),
            mix(self.g, other.g),
            mix(self.b, other.b),
            mix(self.a, other.a),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Linear colour ramp between two points. Stops are `(offset, colour)` pairs
/// with offsets in `[0, 1]`, sorted ascending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearGradient {
    pub start: Point,
    pub end: Point,
    pub stops: Vec<(f32, Rgba)>,
}

impl LinearGradient {
    pub fn new(start: Point, end: Point) -> Self {
        Self {
            start,
            end,
            stops: Vec::new(),
        }
    }

    pub fn with_stop(mut self, offset: f32, color: Rgba) -> Self {
        self.stops.push((offset.clamp(0.0, 1.0), color));
        self.stops
            .sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        self
    }

    /// Colour at `point`, projected onto the gradient axis.
    pub fn color_at(&self, point: Point) -> Rgba {
        let (Some(first), Some(last)) = (self.stops.first(), self.stops.last()) else {
            return Rgba::TRANSPARENT;
        };

        let dx = self.end.x - self.start.x;
        let dy = self.end.y - self.start.y;
        let length_sq = dx * dx + dy * dy;
        let t = if length_sq <= f32::EPSILON {
            0.0
        } else {
            (((point.x - self.start.x) * dx + (point.y - self.start.y) * dy) / length_sq)
                .clamp(0.0, 1.0)
        };

        if t <= first.0 {
            return first.1;
        }
        for pair in self.stops.windows(2) {
            let (lo, hi) = (pair[0], pair[1]);
            if t <= hi.0 {
                let span = hi.0 - lo.0;
                let local = if span <= f32::EPSILON { 1.0 } else { (t - lo.0) / span };
                return lo.1.lerp(hi.1, local);
            }
        }
        last.1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Paint {
    Solid(Rgba),
    LinearGradient(LinearGradient),
}

impl Paint {
    pub fn color_at(&self, point: Point) -> Rgba {
        match self {
            Paint::Solid(color) => *color,
            Paint::LinearGradient(gradient) => gradient.color_at(point),
        }
    }
}

impl From<Rgba> for Paint {
    fn from(color: Rgba) -> Self {
        Paint::Solid(color)
    }
}

/// Raster target with pixel dimensions and a handful of fill/stroke
/// primitives. Every primitive rejects non-finite geometry with a draw
/// error.
///
/// Primitives land in a pending frame. Readers only ever observe the last
/// frame passed to [`Surface::commit_frame`].
pub trait Surface {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// Resizes the backing store. Existing content is discarded.
    fn set_size(&mut self, width: u32, height: u32);

    fn clear(&mut self, color: Rgba) -> Result<()>;

    fn fill_rect(&mut self, rect: Rect, paint: &Paint) -> Result<()>;

    fn fill_circle(&mut self, center: Point, radius: f32, paint: &Paint) -> Result<()>;

    fn stroke_line(&mut self, from: Point, to: Point, width: f32, paint: &Paint) -> Result<()>;

    fn stroke_polyline(&mut self, points: &[Point], width: f32, paint: &Paint) -> Result<()> {
        for pair in points.windows(2) {
            self.stroke_line(pair[0], pair[1], width, paint)?;
        }
        Ok(())
    }

    fn begin_frame(&mut self) {}

    /// Publishes the pending frame.
    fn commit_frame(&mut self) {}

    /// Drops the pending frame; the last committed one stays visible.
    fn discard_frame(&mut self) {}
}

pub(crate) fn ensure_finite(values: &[f32]) -> Result<()> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(VisualiserError::draw("non-finite geometry"))
    }
}

/// Primitive recorded by [`RecordingSurface`].
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Clear(Rgba),
    FillRect { rect: Rect, paint: Paint },
    FillCircle { center: Point, radius: f32, paint: Paint },
    StrokeLine { from: Point, to: Point, width: f32, paint: Paint },
    StrokePolyline { points: Vec<Point>, width: f32, paint: Paint },
}

/// Headless surface that records the primitives of the last committed
/// frame.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    width: u32,
    height: u32,
    pending: Vec<DrawCommand>,
    commands: Vec<DrawCommand>,
    frames: u64,
}

impl RecordingSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    /// Number of committed frames.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn circles(&self) -> usize {
        self.count(|c| matches!(c, DrawCommand::FillCircle { .. }))
    }

    pub fn rects(&self) -> usize {
        self.count(|c| matches!(c, DrawCommand::FillRect { .. }))
    }

    pub fn count(&self, predicate: impl Fn(&DrawCommand) -> bool) -> usize {
        self.commands.iter().filter(|c| predicate(c)).count()
    }
}

impl Surface for RecordingSurface {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn set_size(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.pending.clear();
        self.commands.clear();
    }

    fn clear(&mut self, color: Rgba) -> Result<()> {
        self.pending.clear();
        self.pending.push(DrawCommand::Clear(color));
        Ok(())
    }

    fn fill_rect(&mut self, rect: Rect, paint: &Paint) -> Result<()> {
        ensure_finite(&[rect.x, rect.y, rect.width, rect.height])?;
        self.pending.push(DrawCommand::FillRect {
            rect,
            paint: paint.clone(),
        });
        Ok(())
    }

    fn fill_circle(&mut self, center: Point, radius: f32, paint: &Paint) -> Result<()> {
        ensure_finite(&[center.x, center.y, radius])?;
        self.pending.push(DrawCommand::FillCircle {
            center,
            radius,
            paint: paint.clone(),
        });
        Ok(())
    }

    fn stroke_line(&mut self, from: Point, to: Point, width: f32, paint: &Paint) -> Result<()> {
        ensure_finite(&[from.x, from.y, to.x, to.y, width])?;
        self.pending.push(DrawCommand::StrokeLine {
            from,
            to,
            width,
            paint: paint.clone(),
        });
        Ok(())
    }

    fn stroke_polyline(&mut self, points: &[Point], width: f32, paint: &Paint) -> Result<()> {
        ensure_finite(&[width])?;
        for point in points {
            ensure_finite(&[point.x, point.y])?;
        }
        self.pending.push(DrawCommand::StrokePolyline {
            points: points.to_vec(),
            width,
            paint: paint.clone(),
        });
        Ok(())
    }

    fn begin_frame(&mut self) {
        self.pending.clear();
    }

    fn commit_frame(&mut self) {
        self.commands = std::mem::take(&mut self.pending);
        self.frames += 1;
    }

    fn discard_frame(&mut self) {
        self.pending.clear();
    }
}
