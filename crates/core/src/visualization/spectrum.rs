use super::{sealed, Visualize, BACKGROUND};
use crate::{PropertyDescriptor, PropertyStore, Rect, Result, Rgba, SignalAnalyzer, Surface};

/// Compresses the magnitude range so quiet bins stay visible.
const GAMMA: f32 = 0.7;

/// Vertical bars, one per frequency bin or per bucket of bins when the
/// surface is too narrow.
#[derive(Debug, Clone)]
pub struct SpectrumVisualization {
    properties: PropertyStore,
    width: u32,
    height: u32,
    bar_count: usize,
}

impl SpectrumVisualization {
    pub fn new(width: u32, height: u32) -> Self {
        let properties = PropertyStore::new()
            .declare(PropertyDescriptor::new("barWidth", 4.0, 1.0, 32.0, 1.0))
            .declare(PropertyDescriptor::new("barSpacing", 1.0, 0.0, 16.0, 1.0));

        let mut spectrum = Self {
            properties,
            width,
            height,
            bar_count: 0,
        };
        spectrum.layout();
        spectrum
    }

    /// Number of bars that fit the current width.
    pub fn bar_count(&self) -> usize {
        self.bar_count
    }

    fn bar_width(&self) -> f32 {
        self.properties.get("barWidth").unwrap_or(4.0)
    }

    fn stride(&self) -> f32 {
        self.bar_width() + self.properties.get("barSpacing").unwrap_or(1.0)
    }

    fn layout(&mut self) {
        let stride = self.stride().max(1.0);
        self.bar_count = (self.width as f32 / stride).floor() as usize;
    }
}

impl sealed::Sealed for SpectrumVisualization {}

impl Visualize for SpectrumVisualization {
    fn name(&self) -> &'static str {
        "Spectrum"
    }

    fn update(&mut self, _analyzer: &SignalAnalyzer) {}

    fn draw(&self, analyzer: &SignalAnalyzer, surface: &mut dyn Surface) -> Result<()> {
        surface.clear(BACKGROUND)?;

        let bins = analyzer.frequency();
        let bars = self.bar_count.min(bins.len());
        if bars == 0 {
            return Ok(());
        }

        let height = self.height as f32;
        let bar_width = self.bar_width();
        let stride = self.stride();

        for bar in 0..bars {
            let start = bar * bins.len() / bars;
            let end = ((bar + 1) * bins.len() / bars).max(start + 1);
            let bucket = &bins[start..end];
            let magnitude = bucket.iter().sum::<f32>() / bucket.len() as f32;

            let bar_height = magnitude.clamp(0.0, 1.0).powf(GAMMA) * height;
            if bar_height <= 0.0 {
                continue;
            }

            let color = Rgba::from_hsl(bar as f32 / bars as f32 * 360.0, 1.0, 0.5);
            surface.fill_rect(
                Rect::new(bar as f32 * stride, height - bar_height, bar_width, bar_height),
                &color.into(),
            )?;
        }

        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.layout();
    }

    fn properties(&self) -> &PropertyStore {
        &self.properties
    }

    fn set_property(&mut self, key: &str, value: f32) -> bool {
        let applied = self.properties.set(key, value);
        if applied {
            self.layout();
        }
        applied
    }
}
