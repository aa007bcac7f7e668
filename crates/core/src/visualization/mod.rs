//! The closed set of visualization strategies and their shared contract.

mod particles;
mod spectrum;
mod waveform;

use crate::{PropertyDescriptor, PropertyStore, Result, Rgba, SignalAnalyzer, Surface};

pub use particles::{Particle, ParticleVisualization};
pub use spectrum::SpectrumVisualization;
pub use waveform::WaveformVisualization;

/// Colour every variant clears the surface with.
pub const BACKGROUND: Rgba = Rgba::rgb(10, 10, 26);

mod sealed {
    pub trait Sealed {}
}

/// Shared contract of the visualization variants. Only the types in this
/// module implement it.
///
/// `update` runs once per tick before `draw` and is the only place variant
/// state changes; `draw` reads that state together with the analyzer
/// buffers.
pub trait Visualize: sealed::Sealed {
    fn name(&self) -> &'static str;

    fn update(&mut self, analyzer: &SignalAnalyzer);

    fn draw(&self, analyzer: &SignalAnalyzer, surface: &mut dyn Surface) -> Result<()>;

    /// Adjusts layout-dependent state to new surface dimensions.
    fn resize(&mut self, width: u32, height: u32);

    fn properties(&self) -> &PropertyStore;

    /// Applies a property change. Unknown keys and rejected values return
    /// `false` and change nothing.
    fn set_property(&mut self, key: &str, value: f32) -> bool;
}

/// One of the available visualization strategies.
#[derive(Debug)]
pub enum Visualization {
    Spectrum(SpectrumVisualization),
    Waveform(WaveformVisualization),
    Particles(ParticleVisualization),
}

impl Visualization {
    pub fn spectrum(width: u32, height: u32) -> Self {
        Self::Spectrum(SpectrumVisualization::new(width, height))
    }

    pub fn waveform(width: u32, height: u32) -> Self {
        Self::Waveform(WaveformVisualization::new(width, height))
    }

    pub fn particles(width: u32, height: u32) -> Self {
        Self::Particles(ParticleVisualization::new(width, height))
    }

    pub fn descriptors(&self) -> Vec<PropertyDescriptor> {
        self.properties().descriptors().to_vec()
    }

    fn inner(&self) -> &dyn Visualize {
        match self {
            Self::Spectrum(v) => v,
            Self::Waveform(v) => v,
            Self::Particles(v) => v,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Visualize {
        match self {
            Self::Spectrum(v) => v,
            Self::Waveform(v) => v,
            Self::Particles(v) => v,
        }
    }
}

impl sealed::Sealed for Visualization {}

impl Visualize for Visualization {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn update(&mut self, analyzer: &SignalAnalyzer) {
        self.inner_mut().update(analyzer)
    }

    fn draw(&self, analyzer: &SignalAnalyzer, surface: &mut dyn Surface) -> Result<()> {
        self.inner().draw(analyzer, surface)
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.inner_mut().resize(width, height)
    }

    fn properties(&self) -> &PropertyStore {
        self.inner().properties()
    }

    fn set_property(&mut self, key: &str, value: f32) -> bool {
        self.inner_mut().set_property(key, value)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::f32::consts::PI;

    use crate::{AnalyzerConfig, SampleTap, SignalAnalyzer, TapSource};

    /// Analyzer that has processed one window of `samples`.
    pub fn analyzer_with(samples: &[f32]) -> SignalAnalyzer {
        let mut analyzer =
            SignalAnalyzer::new(AnalyzerConfig::new(samples.len(), 0.0, -100.0, 0.0)).unwrap();
        let tap = SampleTap::new(samples.len());
        analyzer.attach(Box::new(TapSource::new(tap.clone(), 8_000)));
        tap.push(samples);
        assert!(analyzer.tick());
        analyzer
    }

    pub fn tone(bin: usize, window: usize, amplitude: f32) -> Vec<f32> {
        (0..window)
            .map(|i| amplitude * (2.0 * PI * bin as f32 * i as f32 / window as f32).sin())
            .collect()
    }
}
