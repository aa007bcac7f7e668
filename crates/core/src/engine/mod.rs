//! The render loop: variant registry, surface dimensions and the
//! analyzer → update → draw tick.

use std::fmt;

use crate::{
    FrameHandle, FrameScheduler, PropertyDescriptor, Result, SignalAnalyzer, Surface,
    Visualization, VisualiserError, Visualize,
};

/// Lifecycle of the render loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Stopped,
    Running,
}

/// What happened when a frame callback was delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The frame was drawn and committed to the surface.
    Rendered,
    /// Drawing failed; the previous frame stays on the surface.
    Skipped,
    /// The callback was stale or the loop is stopped; nothing ran.
    Ignored,
}

/// Counters over the engine's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub rendered: u64,
    pub skipped: u64,
}

struct RegisteredVariant {
    name: String,
    visualization: Visualization,
}

/// Owns the analyzer, the variant registry and the single render loop.
///
/// The surface and scheduler are injected. The host delivers each frame
/// callback through [`VisualizationEngine::on_frame`]; while running the
/// engine keeps exactly one frame request outstanding.
pub struct VisualizationEngine<S, C> {
    surface: S,
    scheduler: C,
    analyzer: SignalAnalyzer,
    variants: Vec<RegisteredVariant>,
    active: Option<usize>,
    width: u32,
    height: u32,
    state: LoopState,
    pending: Option<FrameHandle>,
    stats: FrameStats,
}

impl<S, C> VisualizationEngine<S, C>
where
    S: Surface,
    C: FrameScheduler,
{
    /// Creates a stopped engine with an empty registry, sized after the
    /// surface.
    pub fn new(surface: S, scheduler: C, analyzer: SignalAnalyzer) -> Self {
        let (width, height) = (surface.width(), surface.height());
        Self {
            surface,
            scheduler,
            analyzer,
            variants: Vec::new(),
            active: None,
            width,
            height,
            state: LoopState::Stopped,
            pending: None,
            stats: FrameStats::default(),
        }
    }

    /// Creates an engine with `spectrum`, `waveform` and `particles`
    /// registered and `spectrum` selected.
    pub fn with_default_variants(surface: S, scheduler: C, analyzer: SignalAnalyzer) -> Self {
        let mut engine = Self::new(surface, scheduler, analyzer);
        let defaults: [(&str, fn(u32, u32) -> Visualization); 3] = [
            ("spectrum", Visualization::spectrum),
            ("waveform", Visualization::waveform),
            ("particles", Visualization::particles),
        ];
        for (name, factory) in defaults {
            if let Err(err) = engine.register_variant(name, factory) {
                tracing::warn!(%err, "default variant not registered");
            }
        }
        engine.select("spectrum");
        engine
    }

    /// Adds a variant built by `factory` at the current surface size.
    /// Registering an existing name fails with a configuration error.
    pub fn register_variant<F>(&mut self, name: impl Into<String>, factory: F) -> Result<()>
    where
        F: FnOnce(u32, u32) -> Visualization,
    {
        let name = name.into();
        if self.variant_index(&name).is_some() {
            return Err(VisualiserError::config(format!(
                "visualization `{name}` is already registered"
            )));
        }

        let mut visualization = factory(self.width, self.height);
        visualization.resize(self.width, self.height);
        tracing::debug!(name, kind = visualization.name(), "visualization registered");
        self.variants.push(RegisteredVariant {
            name,
            visualization,
        });
        Ok(())
    }

    /// Makes `name` the active variant. Returns `false`, changing nothing,
    /// when no such variant exists.
    ///
    /// While running, the loop is stopped around the swap so no frame sees
    /// a half-switched engine.
    pub fn select(&mut self, name: &str) -> bool {
        let Some(index) = self.variant_index(name) else {
            tracing::warn!(name, "unknown visualization");
            return false;
        };
        if self.active == Some(index) {
            return true;
        }

        let was_running = self.is_running();
        if was_running {
            self.stop();
        }

        self.active = Some(index);
        self.variants[index]
            .visualization
            .resize(self.width, self.height);
        tracing::info!(name, "visualization selected");

        if was_running {
            self.start();
        }
        true
    }

    /// [`select`](Self::select) reporting an unknown name as
    /// [`VisualiserError::NotFound`].
    pub fn try_select(&mut self, name: &str) -> Result<()> {
        if self.select(name) {
            Ok(())
        } else {
            Err(VisualiserError::NotFound(name.to_string()))
        }
    }

    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        self.state = LoopState::Running;
        self.pending = Some(self.scheduler.request_frame());
        tracing::info!("render loop started");
    }

    /// Stops the loop and cancels the outstanding frame request.
    pub fn stop(&mut self) {
        if let Some(handle) = self.pending.take() {
            self.scheduler.cancel_frame(handle);
        }
        if self.state == LoopState::Running {
            self.state = LoopState::Stopped;
            tracing::info!("render loop stopped");
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == LoopState::Running
    }

    /// Frame callback from the host scheduler. Runs one tick when `handle`
    /// is the outstanding request and the loop is running, then requests
    /// the next frame.
    pub fn on_frame(&mut self, handle: FrameHandle) -> FrameOutcome {
        if !self.is_running() || self.pending != Some(handle) {
            return FrameOutcome::Ignored;
        }
        self.pending = None;

        let outcome = self.tick();

        if self.is_running() {
            self.pending = Some(self.scheduler.request_frame());
        }
        outcome
    }

    /// Updates the surface size and propagates it to every registered
    /// variant.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.surface.set_size(width, height);
        for variant in &mut self.variants {
            variant.visualization.resize(width, height);
        }
        tracing::debug!(width, height, "surface resized");
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Property descriptors of the active variant.
    pub fn current_properties(&self) -> Vec<PropertyDescriptor> {
        self.active_visualization()
            .map(Visualization::descriptors)
            .unwrap_or_default()
    }

    /// Forwards to the active variant. Unknown keys are ignored; the return
    /// value tells whether the change was applied.
    pub fn set_property(&mut self, key: &str, value: f32) -> bool {
        let Some(index) = self.active else {
            return false;
        };
        let applied = self.variants[index].visualization.set_property(key, value);
        if !applied {
            tracing::debug!(key, value, "property change ignored");
        }
        applied
    }

    pub fn active_name(&self) -> Option<&str> {
        self.active.map(|index| self.variants[index].name.as_str())
    }

    pub fn active_visualization(&self) -> Option<&Visualization> {
        self.active.map(|index| &self.variants[index].visualization)
    }

    pub fn variant(&self, name: &str) -> Option<&Visualization> {
        self.variant_index(name)
            .map(|index| &self.variants[index].visualization)
    }

    pub fn variant_names(&self) -> impl Iterator<Item = &str> {
        self.variants.iter().map(|v| v.name.as_str())
    }

    pub fn analyzer(&self) -> &SignalAnalyzer {
        &self.analyzer
    }

    pub fn analyzer_mut(&mut self) -> &mut SignalAnalyzer {
        &mut self.analyzer
    }

    /// The surface holding the most recently completed frame.
    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn scheduler(&self) -> &C {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut C {
        &mut self.scheduler
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Stops the loop and releases the audio source.
    pub fn shutdown(&mut self) {
        self.stop();
        self.analyzer.release();
    }

    fn variant_index(&self, name: &str) -> Option<usize> {
        self.variants.iter().position(|v| v.name == name)
    }

    /// Analyzer step, then update, then draw. A failing draw is logged and
    /// its partial frame discarded.
    fn tick(&mut self) -> FrameOutcome {
        self.analyzer.tick();

        let Some(index) = self.active else {
            return FrameOutcome::Skipped;
        };
        let visualization = &mut self.variants[index].visualization;
        visualization.update(&self.analyzer);

        self.surface.begin_frame();
        match visualization.draw(&self.analyzer, &mut self.surface) {
            Ok(()) => {
                self.surface.commit_frame();
                self.stats.rendered += 1;
                FrameOutcome::Rendered
            }
            Err(err) => {
                self.surface.discard_frame();
                self.stats.skipped += 1;
                tracing::warn!(%err, variant = visualization.name(), "frame skipped");
                FrameOutcome::Skipped
            }
        }
    }
}

impl<S, C> Drop for VisualizationEngine<S, C> {
    fn drop(&mut self) {
        self.analyzer.release();
    }
}

impl<S, C> fmt::Debug for VisualizationEngine<S, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisualizationEngine")
            .field("state", &self.state)
            .field("active", &self.active.map(|i| &self.variants[i].name))
            .field("variants", &self.variants.len())
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        AnalyzerConfig, ManualScheduler, Paint, Point, Rect, RecordingSurface, Rgba, SampleTap,
        TapSource,
    };

    type TestEngine = VisualizationEngine<RecordingSurface, ManualScheduler>;

    fn engine() -> TestEngine {
        let analyzer = SignalAnalyzer::new(AnalyzerConfig::new(256, 0.5, -100.0, -30.0)).unwrap();
        VisualizationEngine::with_default_variants(
            RecordingSurface::new(400, 200),
            ManualScheduler::new(),
            analyzer,
        )
    }

    fn fire<S: Surface>(engine: &mut VisualizationEngine<S, ManualScheduler>) -> FrameOutcome {
        let handle = engine
            .scheduler_mut()
            .take_pending()
            .expect("a frame should be pending");
        engine.on_frame(handle)
    }

    fn spectrum_bars(engine: &TestEngine, name: &str) -> usize {
        match engine.variant(name) {
            Some(Visualization::Spectrum(spectrum)) => spectrum.bar_count(),
            _ => panic!("`{name}` is not a spectrum"),
        }
    }

    /// Surface whose primitives fail for a configurable number of frames.
    struct FlakySurface {
        inner: RecordingSurface,
        failing_frames: u32,
    }

    impl Surface for FlakySurface {
        fn width(&self) -> u32 {
            self.inner.width()
        }

        fn height(&self) -> u32 {
            self.inner.height()
        }

        fn set_size(&mut self, width: u32, height: u32) {
            self.inner.set_size(width, height)
        }

        fn clear(&mut self, color: Rgba) -> Result<()> {
            if self.failing_frames > 0 {
                return Err(VisualiserError::draw("surface lost"));
            }
            self.inner.clear(color)
        }

        fn fill_rect(&mut self, rect: Rect, paint: &Paint) -> Result<()> {
            self.inner.fill_rect(rect, paint)
        }

        fn fill_circle(&mut self, center: Point, radius: f32, paint: &Paint) -> Result<()> {
            self.inner.fill_circle(center, radius, paint)
        }

        fn stroke_line(&mut self, from: Point, to: Point, width: f32, paint: &Paint) -> Result<()> {
            self.inner.stroke_line(from, to, width, paint)
        }

        fn begin_frame(&mut self) {
            self.inner.begin_frame()
        }

        fn commit_frame(&mut self) {
            self.inner.commit_frame()
        }

        fn discard_frame(&mut self) {
            self.failing_frames = self.failing_frames.saturating_sub(1);
            self.inner.discard_frame()
        }
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let mut engine = engine();
        assert_eq!(engine.state(), LoopState::Stopped);

        engine.start();
        let pending = engine.scheduler().pending();
        engine.start();
        assert_eq!(engine.scheduler().pending(), pending);
        assert!(engine.is_running());

        engine.stop();
        engine.stop();
        assert_eq!(engine.state(), LoopState::Stopped);
        assert_eq!(engine.scheduler().pending(), None);
        assert_eq!(engine.scheduler().cancelled(), 1);
    }

    #[test]
    fn running_loop_keeps_one_frame_outstanding() {
        let mut engine = engine();
        engine.start();

        for _ in 0..5 {
            assert_eq!(fire(&mut engine), FrameOutcome::Rendered);
            assert!(engine.scheduler().pending().is_some());
        }
        assert_eq!(engine.stats().rendered, 5);
        assert_eq!(engine.surface().frames(), 5);
    }

    #[test]
    fn stale_or_stopped_callbacks_are_ignored() {
        let mut engine = engine();
        engine.start();
        let handle = engine.scheduler_mut().take_pending().unwrap();
        engine.stop();

        assert_eq!(engine.on_frame(handle), FrameOutcome::Ignored);
        assert_eq!(engine.stats(), FrameStats::default());
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut engine = engine();
        let err = engine
            .register_variant("spectrum", Visualization::waveform)
            .unwrap_err();
        assert!(matches!(err, VisualiserError::Config(_)));
        assert!(matches!(
            engine.variant("spectrum"),
            Some(Visualization::Spectrum(_))
        ));
    }

    #[test]
    fn selecting_unknown_variant_changes_nothing() {
        let mut engine = engine();
        assert!(engine.set_property("barWidth", 6.0));
        let before = engine.current_properties();

        assert!(!engine.select("kaleidoscope"));
        assert!(matches!(
            engine.try_select("kaleidoscope"),
            Err(VisualiserError::NotFound(_))
        ));
        assert_eq!(engine.active_name(), Some("spectrum"));
        assert_eq!(engine.current_properties(), before);
    }

    #[test]
    fn resize_reaches_inactive_variants() {
        let mut engine = engine();
        engine.select("waveform");
        engine.resize(1000, 300);

        assert_eq!(spectrum_bars(&engine, "spectrum"), 200);
        assert!(engine.select("spectrum"));
        assert_eq!(spectrum_bars(&engine, "spectrum"), 200);
        assert_eq!(engine.surface().width(), 1000);
    }

    #[test]
    fn swapping_while_running_keeps_a_single_variant_ticking() {
        let mut engine = engine();
        engine.start();

        for name in ["spectrum", "particles", "spectrum", "waveform", "particles"] {
            assert!(engine.select(name));
            assert!(engine.is_running());
            assert_eq!(engine.active_name(), Some(name));
            assert_eq!(fire(&mut engine), FrameOutcome::Rendered);
        }

        assert_eq!(engine.stats().rendered, 5);
        assert!(engine.scheduler().pending().is_some());
    }

    #[test]
    fn inactive_variants_do_not_tick() {
        let mut engine = engine();
        let positions = |engine: &TestEngine| match engine.variant("particles") {
            Some(Visualization::Particles(field)) => field
                .particles()
                .iter()
                .map(|p| p.position)
                .collect::<Vec<_>>(),
            _ => panic!("`particles` is not a particle field"),
        };

        engine.start();
        assert!(engine.select("particles"));
        let before = positions(&engine);
        fire(&mut engine);
        let moved = positions(&engine);
        assert_ne!(before, moved);

        assert!(engine.select("spectrum"));
        for _ in 0..5 {
            assert_eq!(fire(&mut engine), FrameOutcome::Rendered);
        }
        assert_eq!(positions(&engine), moved);
    }

    #[test]
    fn particle_count_applies_on_next_frame() {
        let mut engine = engine();
        assert!(engine.select("particles"));
        assert!(engine.set_property("particleCount", 17.0));

        engine.start();
        fire(&mut engine);

        assert_eq!(engine.surface().circles(), 17);
    }

    #[test]
    fn property_round_trip_and_unknown_keys() {
        let mut engine = engine();
        engine.select("waveform");

        assert!(engine.set_property("lineWidth", 3.5));
        let value = engine
            .current_properties()
            .into_iter()
            .find(|d| d.key == "lineWidth")
            .map(|d| d.value);
        assert_eq!(value, Some(3.5));

        let before = engine.current_properties();
        assert!(!engine.set_property("barWidth", 3.0));
        assert_eq!(engine.current_properties(), before);
    }

    #[test]
    fn failed_draw_skips_one_frame_and_loop_continues() {
        let analyzer = SignalAnalyzer::new(AnalyzerConfig::default()).unwrap();
        let surface = FlakySurface {
            inner: RecordingSurface::new(200, 100),
            failing_frames: 1,
        };
        let mut engine =
            VisualizationEngine::with_default_variants(surface, ManualScheduler::new(), analyzer);
        engine.start();

        assert_eq!(fire(&mut engine), FrameOutcome::Skipped);
        assert!(engine.is_running());
        assert_eq!(fire(&mut engine), FrameOutcome::Rendered);
        assert_eq!(
            engine.stats(),
            FrameStats {
                rendered: 1,
                skipped: 1
            }
        );
    }

    #[test]
    fn ticks_drive_the_analyzer() {
        let mut engine = engine();
        let tap = SampleTap::new(1024);
        engine
            .analyzer_mut()
            .attach(Box::new(TapSource::new(tap.clone(), 8_000)));
        engine.start();

        tap.push(&[0.0; 256]);
        fire(&mut engine);
        assert_eq!(engine.analyzer().ticks(), 1);

        fire(&mut engine);
        assert_eq!(engine.analyzer().ticks(), 1);

        engine.shutdown();
        assert!(!engine.analyzer().is_attached());
        assert!(!engine.is_running());
    }
}
