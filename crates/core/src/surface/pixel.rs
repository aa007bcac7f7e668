use image::RgbaImage;

use super::{ensure_finite, Paint, Point, Rect, Rgba, Surface};
use crate::Result;

/// Software rasteriser backed by two RGBA images. Primitives draw into the
/// back image; [`PixelSurface::image`] returns the last committed frame, so
/// it can be handed to an exporter at any time.
#[derive(Debug, Clone)]
pub struct PixelSurface {
    front: RgbaImage,
    back: RgbaImage,
}

impl PixelSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            front: RgbaImage::new(width, height),
            back: RgbaImage::new(width, height),
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.front
    }

    /// Committed colour at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        if x >= self.front.width() || y >= self.front.height() {
            return None;
        }
        let [r, g, b, a] = self.front.get_pixel(x, y).0;
        Some(Rgba::new(r, g, b, a))
    }

    /// Visits every pixel whose centre lies in the clipped box
    /// `[min_x, max_x) x [min_y, max_y)` and passes `covers` the centre.
    fn shade<F>(&mut self, min_x: f32, min_y: f32, max_x: f32, max_y: f32, paint: &Paint, covers: F)
    where
        F: Fn(Point) -> bool,
    {
        let (width, height) = self.back.dimensions();
        let x0 = min_x.floor().max(0.0) as u32;
        let y0 = min_y.floor().max(0.0) as u32;
        let x1 = (max_x.ceil().max(0.0) as u32).min(width);
        let y1 = (max_y.ceil().max(0.0) as u32).min(height);

        for y in y0..y1 {
            for x in x0..x1 {
                let centre = Point::new(x as f32 + 0.5, y as f32 + 0.5);
                if covers(centre) {
                    blend(self.back.get_pixel_mut(x, y), paint.color_at(centre));
                }
            }
        }
    }
}

impl Surface for PixelSurface {
    fn width(&self) -> u32 {
        self.back.width()
    }

    fn height(&self) -> u32 {
        self.back.height()
    }

    fn set_size(&mut self, width: u32, height: u32) {
        if self.back.dimensions() != (width, height) {
            self.front = RgbaImage::new(width, height);
            self.back = RgbaImage::new(width, height);
        }
    }

    fn clear(&mut self, color: Rgba) -> Result<()> {
        let fill = image::Rgba([color.r, color.g, color.b, color.a]);
        for pixel in self.back.pixels_mut() {
            *pixel = fill;
        }
        Ok(())
    }

    fn fill_rect(&mut self, rect: Rect, paint: &Paint) -> Result<()> {
        ensure_finite(&[rect.x, rect.y, rect.width, rect.height])?;
        let (left, right) = ordered(rect.x, rect.x + rect.width);
        let (top, bottom) = ordered(rect.y, rect.y + rect.height);
        self.shade(left, top, right, bottom, paint, |p| {
            p.x >= left && p.x < right && p.y >= top && p.y < bottom
        });
        Ok(())
    }

    fn fill_circle(&mut self, center: Point, radius: f32, paint: &Paint) -> Result<()> {
        ensure_finite(&[center.x, center.y, radius])?;
        let radius = radius.abs();
        let radius_sq = radius * radius;
        self.shade(
            center.x - radius,
            center.y - radius,
            center.x + radius,
            center.y + radius,
            paint,
            |p| (p.x - center.x).powi(2) + (p.y - center.y).powi(2) <= radius_sq,
        );
        Ok(())
    }

    fn stroke_line(&mut self, from: Point, to: Point, width: f32, paint: &Paint) -> Result<()> {
        ensure_finite(&[from.x, from.y, to.x, to.y, width])?;
        let half = (width.abs() / 2.0).max(0.5);
        let (left, right) = ordered(from.x, to.x);
        let (top, bottom) = ordered(from.y, to.y);
        self.shade(
            left - half,
            top - half,
            right + half,
            bottom + half,
            paint,
            |p| segment_distance(p, from, to) <= half,
        );
        Ok(())
    }

    fn commit_frame(&mut self) {
        self.front.clone_from(&self.back);
    }

    fn discard_frame(&mut self) {
        self.back.clone_from(&self.front);
    }
}

fn ordered(a: f32, b: f32) -> (f32, f32) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn segment_distance(p: Point, a: Point, b: Point) -> f32 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let length_sq = dx * dx + dy * dy;
    if length_sq <= f32::EPSILON {
        return p.distance(a);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / length_sq).clamp(0.0, 1.0);
    p.distance(Point::new(a.x + t * dx, a.y + t * dy))
}

/// Source-over compositing.
fn blend(dst: &mut image::Rgba<u8>, src: Rgba) {
    if src.a == 255 {
        dst.0 = [src.r, src.g, src.b, 255];
        return;
    }
    if src.a == 0 {
        return;
    }

    let sa = src.a as f32 / 255.0;
    let da = dst.0[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    let channel = |s: u8, d: u8| {
        let value = (s as f32 * sa + d as f32 * da * (1.0 - sa)) / out_a;
        value.round().clamp(0.0, 255.0) as u8
    };

    dst.0 = [
        channel(src.r, dst.0[0]),
        channel(src.g, dst.0[1]),
        channel(src.b, dst.0[2]),
        (out_a * 255.0).round() as u8,
    ];
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::LinearGradient;

    #[test]
    fn fills_are_clipped_to_the_surface() {
        let mut surface = PixelSurface::new(8, 8);
        surface.clear(Rgba::BLACK).unwrap();
        surface
            .fill_rect(Rect::new(-4.0, 6.0, 20.0, 10.0), &Rgba::rgb(255, 0, 0).into())
            .unwrap();
        surface.commit_frame();

        assert_eq!(surface.pixel(0, 7), Some(Rgba::rgb(255, 0, 0)));
        assert_eq!(surface.pixel(7, 6), Some(Rgba::rgb(255, 0, 0)));
        assert_eq!(surface.pixel(3, 5), Some(Rgba::BLACK));
    }

    #[test]
    fn circles_cover_their_centre_only() {
        let mut surface = PixelSurface::new(20, 20);
        surface.clear(Rgba::BLACK).unwrap();
        surface
            .fill_circle(Point::new(10.0, 10.0), 3.0, &Rgba::rgb(0, 255, 0).into())
            .unwrap();
        surface.commit_frame();

        assert_eq!(surface.pixel(10, 10), Some(Rgba::rgb(0, 255, 0)));
        assert_eq!(surface.pixel(1, 1), Some(Rgba::BLACK));
    }

    #[test]
    fn translucent_strokes_blend_over_background() {
        let mut surface = PixelSurface::new(10, 10);
        surface.clear(Rgba::BLACK).unwrap();
        let paint = Paint::Solid(Rgba::rgb(200, 200, 200).with_opacity(0.5));
        surface
            .stroke_line(Point::new(0.0, 5.0), Point::new(10.0, 5.0), 2.0, &paint)
            .unwrap();
        surface.commit_frame();

        let pixel = surface.pixel(5, 5).unwrap();
        assert_eq!(pixel.a, 255);
        assert!((99..=101).contains(&pixel.r));
    }

    #[test]
    fn gradient_paint_varies_across_a_rect() {
        let mut surface = PixelSurface::new(100, 1);
        let gradient = LinearGradient::new(Point::new(0.0, 0.0), Point::new(100.0, 0.0))
            .with_stop(0.0, Rgba::rgb(0, 0, 0))
            .with_stop(1.0, Rgba::rgb(255, 0, 0));
        surface
            .fill_rect(Rect::new(0.0, 0.0, 100.0, 1.0), &Paint::LinearGradient(gradient))
            .unwrap();
        surface.commit_frame();

        let left = surface.pixel(0, 0).unwrap();
        let right = surface.pixel(99, 0).unwrap();
        assert!(left.r < 10);
        assert!(right.r > 245);
    }

    #[test]
    fn uncommitted_drawing_is_invisible_and_discardable() {
        let mut surface = PixelSurface::new(4, 4);
        surface.clear(Rgba::rgb(9, 9, 9)).unwrap();
        surface.commit_frame();

        surface.clear(Rgba::rgb(255, 255, 255)).unwrap();
        assert_eq!(surface.pixel(1, 1), Some(Rgba::rgb(9, 9, 9)));

        surface.discard_frame();
        surface
            .fill_rect(Rect::new(0.0, 0.0, 1.0, 1.0), &Rgba::rgb(255, 0, 0).into())
            .unwrap();
        surface.commit_frame();
        assert_eq!(surface.pixel(1, 1), Some(Rgba::rgb(9, 9, 9)));
        assert_eq!(surface.pixel(0, 0), Some(Rgba::rgb(255, 0, 0)));
    }

    #[test]
    fn resize_discards_content() {
        let mut surface = PixelSurface::new(4, 4);
        surface.clear(Rgba::rgb(1, 2, 3)).unwrap();
        surface.commit_frame();
        surface.set_size(6, 2);

        assert_eq!((surface.width(), surface.height()), (6, 2));
        assert_eq!(surface.pixel(0, 0), Some(Rgba::TRANSPARENT));
    }
}
