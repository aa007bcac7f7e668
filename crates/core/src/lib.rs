//! Core library for the audio visualiser.
//!
//! A [`SignalAnalyzer`] turns a bound audio stream into normalised frequency
//! and waveform buffers each tick. A [`VisualizationEngine`] owns the
//! analyzer, keeps a registry of [`Visualization`] variants and drives the
//! active one against a [`Surface`] on every frame delivered by a
//! [`FrameScheduler`].

pub mod analysis;
pub mod audio;
pub mod config;
pub mod decode;
pub mod engine;
pub mod error;
pub mod properties;
pub mod surface;
pub mod timeline;
pub mod visualization;

pub use analysis::{to_byte_scale, SignalAnalyzer};
#[cfg(feature = "capture")]
pub use audio::CaptureSource;
pub use audio::{
    AudioSource, AudioSourceHandle, DecodedAudio, PlaybackSource, SampleTap, TapSource,
};
pub use config::{AnalyzerConfig, AppConfig, EngineConfig, SurfaceConfig};
pub use decode::{decode_bytes, decode_file, decode_file_async, Pending};
pub use engine::{FrameOutcome, FrameStats, LoopState, VisualizationEngine};
pub use error::{Result, VisualiserError};
pub use properties::{PropertyDescriptor, PropertyStore};
pub use surface::{Paint, PixelSurface, Point, Rect, RecordingSurface, Rgba, Surface};
pub use timeline::{FrameHandle, FrameScheduler, ManualScheduler, PacedScheduler};
pub use visualization::{Visualization, Visualize};
