use super::{sealed, Visualize, BACKGROUND};
use crate::{
    surface::LinearGradient, Paint, Point, PropertyDescriptor, PropertyStore, Result, Rgba,
    SignalAnalyzer, Surface,
};

const TRACE_START: Rgba = Rgba::rgb(76, 201, 240);
const TRACE_END: Rgba = Rgba::rgb(247, 37, 133);

/// Connected time-domain trace across the surface width.
#[derive(Debug, Clone)]
pub struct WaveformVisualization {
    properties: PropertyStore,
    width: u32,
    height: u32,
}

impl WaveformVisualization {
    pub fn new(width: u32, height: u32) -> Self {
        let properties = PropertyStore::new()
            .declare(PropertyDescriptor::new("lineWidth", 2.0, 1.0, 10.0, 0.5))
            .declare(PropertyDescriptor::new("amplitude", 1.0, 0.1, 3.0, 0.1));

        Self {
            properties,
            width,
            height,
        }
    }

    /// Maps waveform samples to surface coordinates. The amplitude gain is
    /// applied here only; `samples` are never modified.
    pub fn trace(&self, samples: &[f32]) -> Vec<Point> {
        if samples.is_empty() {
            return Vec::new();
        }

        let width = self.width as f32;
        let height = self.height as f32;
        let midline = height / 2.0;
        let amplitude = self.properties.get("amplitude").unwrap_or(1.0);
        let slice = width / samples.len() as f32;

        samples
            .iter()
            .enumerate()
            .map(|(i, sample)| {
                Point::new(
                    i as f32 * slice,
                    midline + (sample - 0.5) * amplitude * height,
                )
            })
            .collect()
    }

    fn paint(&self) -> Paint {
        Paint::LinearGradient(
            LinearGradient::new(Point::new(0.0, 0.0), Point::new(self.width as f32, 0.0))
                .with_stop(0.0, TRACE_START)
                .with_stop(1.0, TRACE_END),
        )
    }
}

impl sealed::Sealed for WaveformVisualization {}

impl Visualize for WaveformVisualization {
    fn name(&self) -> &'static str {
        "Waveform"
    }

    fn update(&mut self, _analyzer: &SignalAnalyzer) {}

    fn draw(&self, analyzer: &SignalAnalyzer, surface: &mut dyn Surface) -> Result<()> {
        surface.clear(BACKGROUND)?;

        let points = self.trace(analyzer.waveform());
        if points.len() < 2 {
            return Ok(());
        }

        let line_width = self.properties.get("lineWidth").unwrap_or(2.0);
        surface.stroke_polyline(&points, line_width, &self.paint())
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    fn properties(&self) -> &PropertyStore {
        &self.properties
    }

    fn set_property(&mut self, key: &str, value: f32) -> bool {
        self.properties.set(key, value)
    }
}
