use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};

use crate::{AnalyzerConfig, AudioSourceHandle, Result};

/// Floor applied before converting magnitudes to decibels.
const MIN_MAGNITUDE: f32 = 1e-12;

/// Turns the bound audio stream into per-tick frequency and waveform
/// buffers.
///
/// Both buffers are normalised to `[0, 1]`. The frequency buffer maps the
/// configured decibel range onto that interval; the waveform buffer centres
/// silence at `0.5`. Use [`to_byte_scale`] when a consumer expects the
/// `0..=255` convention.
pub struct SignalAnalyzer {
    config: AnalyzerConfig,
    source: Option<AudioSourceHandle>,
    window: Vec<f32>,
    smoothed: Vec<f32>,
    frequency: Vec<f32>,
    waveform: Vec<f32>,
    ticks: u64,
    fft_planner: RealFftPlanner<f32>,
    fft: FftResources,
}

impl SignalAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Result<Self> {
        config.validate()?;
        let mut fft_planner = RealFftPlanner::new();
        let fft = FftResources::plan(&mut fft_planner, config.window_size);
        let window_size = config.window_size;
        let bins = config.bin_count();

        Ok(Self {
            config,
            source: None,
            window: vec![0.0; window_size],
            smoothed: vec![0.0; bins],
            frequency: vec![0.0; bins],
            waveform: vec![0.5; window_size],
            ticks: 0,
            fft_planner,
            fft,
        })
    }

    /// Replaces the configuration and reallocates every buffer. On error the
    /// previous configuration and buffers stay in place.
    pub fn configure(&mut self, config: AnalyzerConfig) -> Result<()> {
        config.validate()?;

        if config.window_size != self.fft.size {
            self.fft = FftResources::plan(&mut self.fft_planner, config.window_size);
        }
        self.window = vec![0.0; config.window_size];
        self.smoothed = vec![0.0; config.bin_count()];
        self.frequency = vec![0.0; config.bin_count()];
        self.waveform = vec![0.5; config.window_size];
        self.ticks = 0;

        tracing::debug!(
            window_size = config.window_size,
            smoothing = config.smoothing,
            min_level_db = config.min_level_db,
            max_level_db = config.max_level_db,
            "analyzer configured"
        );
        self.config = config;
        Ok(())
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Binds `source`, releasing any previously bound source first.
    pub fn attach(&mut self, source: AudioSourceHandle) {
        self.release();
        tracing::info!(sample_rate = source.sample_rate(), "audio source attached");
        self.source = Some(source);
    }

    /// Disconnects and frees the bound source, if any.
    pub fn release(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.release();
            tracing::info!("audio source released");
        }
    }

    pub fn is_attached(&self) -> bool {
        self.source.is_some()
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.source.as_ref().map(|s| s.sample_rate())
    }

    /// Advances the analysis by one step. Returns `false`, keeping the last
    /// buffers, when no source is bound or it produced nothing new.
    pub fn tick(&mut self) -> bool {
        let Some(source) = self.source.as_mut() else {
            return false;
        };
        if source.read_latest(&mut self.window) == 0 {
            return false;
        }

        if let Err(err) = self.update_spectrum() {
            tracing::warn!(%err, "spectrum update failed");
            return false;
        }

        for (slot, sample) in self.waveform.iter_mut().zip(&self.window) {
            *slot = (0.5 + 0.5 * sample).clamp(0.0, 1.0);
        }

        self.ticks += 1;
        true
    }

    /// Normalised magnitudes, one per bin, `window_size / 2` long.
    pub fn frequency(&self) -> &[f32] {
        &self.frequency
    }

    /// Normalised time-domain samples, `window_size` long.
    pub fn waveform(&self) -> &[f32] {
        &self.waveform
    }

    /// Mean of the frequency buffer in `[0, 1]`; 0 before the first tick.
    pub fn loudness(&self) -> f32 {
        if self.ticks == 0 || self.frequency.is_empty() {
            return 0.0;
        }
        let sum: f32 = self.frequency.iter().sum();
        (sum / self.frequency.len() as f32).clamp(0.0, 1.0)
    }

    /// Number of ticks that refreshed the buffers since the last
    /// configuration.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Centre frequency of `bin` in Hz for the bound source.
    pub fn bin_frequency(&self, bin: usize) -> Option<f32> {
        self.sample_rate()
            .map(|rate| bin as f32 * rate as f32 / self.config.window_size as f32)
    }

    fn update_spectrum(&mut self) -> Result<()> {
        let len = self.fft.size;
        for (index, (slot, sample)) in self.fft.input.iter_mut().zip(&self.window).enumerate() {
            *slot = *sample * hann_value(index, len);
        }

        self.fft
            .plan
            .process_with_scratch(&mut self.fft.input, &mut self.fft.spectrum, &mut self.fft.scratch)
            .map_err(|e| crate::VisualiserError::msg(e.to_string()))?;

        let scale = 1.0 / len as f32;
        let smoothing = self.config.smoothing;
        let floor = self.config.min_level_db;
        let range = self.config.max_level_db - self.config.min_level_db;

        for ((smoothed, normalised), bin) in self
            .smoothed
            .iter_mut()
            .zip(self.frequency.iter_mut())
            .zip(&self.fft.spectrum)
        {
            let magnitude = bin.norm() * scale;
            *smoothed = smoothing * *smoothed + (1.0 - smoothing) * magnitude;
            let db = 20.0 * smoothed.max(MIN_MAGNITUDE).log10();
            *normalised = ((db - floor) / range).clamp(0.0, 1.0);
        }

        Ok(())
    }
}

impl Drop for SignalAnalyzer {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for SignalAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalAnalyzer")
            .field("config", &self.config)
            .field("attached", &self.source.is_some())
            .field("ticks", &self.ticks)
            .field("fft", &self.fft)
            .finish()
    }
}

/// Converts a normalised buffer to the `0..=255` byte convention.
pub fn to_byte_scale(values: &[f32]) -> Vec<u8> {
    values
        .iter()
        .map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
        .collect()
}

struct FftResources {
    size: usize,
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
}

impl FftResources {
    fn plan(planner: &mut RealFftPlanner<f32>, size: usize) -> Self {
        let plan = planner.plan_fft_forward(size);
        Self {
            size,
            scratch: plan.make_scratch_vec(),
            spectrum: plan.make_output_vec(),
            input: plan.make_input_vec(),
            plan,
        }
    }
}

impl fmt::Debug for FftResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FftResources")
            .field("size", &self.size)
            .finish()
    }
}

fn hann_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    0.5 - 0.5 * ((2.0 * PI * index as f32) / (len as f32 - 1.0)).cos()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::{
        config::{MAX_WINDOW_SIZE, MIN_WINDOW_SIZE},
        AudioSource, SampleTap, TapSource, VisualiserError,
    };

    fn build_analyzer(window_size: usize, smoothing: f32) -> SignalAnalyzer {
        SignalAnalyzer::new(AnalyzerConfig::new(window_size, smoothing, -100.0, 0.0)).unwrap()
    }

    fn sine(bin: usize, window: usize) -> Vec<f32> {
        (0..window)
            .map(|i| (2.0 * PI * bin as f32 * i as f32 / window as f32).sin())
            .collect()
    }

    struct FlaggedSource {
        released: Arc<AtomicBool>,
    }

    impl AudioSource for FlaggedSource {
        fn sample_rate(&self) -> u32 {
            44_100
        }

        fn read_latest(&mut self, _window: &mut [f32]) -> usize {
            0
        }

        fn release(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn frequency_buffer_is_half_the_window() {
        let mut analyzer = build_analyzer(1024, 0.5);
        let mut size = MIN_WINDOW_SIZE;
        while size <= MAX_WINDOW_SIZE {
            analyzer
                .configure(AnalyzerConfig::new(size, 0.8, -100.0, -30.0))
                .unwrap();
            assert_eq!(analyzer.frequency().len(), size / 2);
            assert_eq!(analyzer.waveform().len(), size);
            size *= 2;
        }
    }

    #[test]
    fn rejected_configuration_keeps_previous_state() {
        let mut analyzer = build_analyzer(512, 0.3);
        let err = analyzer
            .configure(AnalyzerConfig::new(1000, 0.3, -100.0, -30.0))
            .unwrap_err();

        assert!(matches!(err, VisualiserError::Config(_)));
        assert_eq!(analyzer.config().window_size, 512);
        assert_eq!(analyzer.frequency().len(), 256);

        assert!(analyzer
            .configure(AnalyzerConfig::new(512, 1.0, -100.0, -30.0))
            .is_err());
        assert_eq!(analyzer.config().smoothing, 0.3);
    }

    #[test]
    fn loudness_is_zero_before_first_tick() {
        let mut analyzer = build_analyzer(256, 0.0);
        assert_eq!(analyzer.loudness(), 0.0);
        assert!(!analyzer.tick());
        assert_eq!(analyzer.loudness(), 0.0);
    }

    #[test]
    fn silent_source_stays_quiet() {
        let mut analyzer =
            SignalAnalyzer::new(AnalyzerConfig::new(2048, 0.8, -100.0, -30.0)).unwrap();
        let tap = SampleTap::new(4096);
        analyzer.attach(Box::new(TapSource::new(tap.clone(), 48_000)));

        for _ in 0..10 {
            tap.push(&[0.0; 512]);
            assert!(analyzer.tick());
        }

        assert!(analyzer.loudness() < 1e-3);
        assert!(analyzer.waveform().iter().all(|v| (v - 0.5).abs() < 1e-6));
    }

    #[test]
    fn sine_peaks_in_its_bin() {
        let mut analyzer = build_analyzer(1024, 0.0);
        let tap = SampleTap::new(2048);
        analyzer.attach(Box::new(TapSource::new(tap.clone(), 8_192)));

        tap.push(&sine(16, 1024));
        assert!(analyzer.tick());

        let peak = analyzer
            .frequency()
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(index, _)| index)
            .unwrap();
        assert_eq!(peak, 16);
        assert_eq!(analyzer.bin_frequency(peak), Some(128.0));

        let loudness = analyzer.loudness();
        assert!(loudness > 0.0 && loudness <= 1.0);
    }

    #[test]
    fn smoothing_blends_consecutive_ticks() {
        let mut analyzer = build_analyzer(1024, 0.5);
        let tap = SampleTap::new(2048);
        analyzer.attach(Box::new(TapSource::new(tap.clone(), 8_192)));
        let tone = sine(16, 1024);

        tap.push(&tone);
        analyzer.tick();
        let first = analyzer.frequency()[16];

        tap.push(&tone);
        analyzer.tick();
        let second = analyzer.frequency()[16];

        assert!(first > 0.0);
        assert!(second > first);
    }

    #[test]
    fn stale_source_keeps_previous_buffers() {
        let mut analyzer = build_analyzer(256, 0.0);
        let tap = SampleTap::new(512);
        analyzer.attach(Box::new(TapSource::new(tap.clone(), 8_000)));

        tap.push(&sine(8, 256));
        assert!(analyzer.tick());
        let frequency = analyzer.frequency().to_vec();
        let waveform = analyzer.waveform().to_vec();

        assert!(!analyzer.tick());
        assert_eq!(analyzer.frequency(), frequency.as_slice());
        assert_eq!(analyzer.waveform(), waveform.as_slice());
        assert_eq!(analyzer.ticks(), 1);
    }

    #[test]
    fn attaching_releases_the_previous_source() {
        let mut analyzer = build_analyzer(256, 0.0);
        let first = Arc::new(AtomicBool::new(false));
        let second = Arc::new(AtomicBool::new(false));

        analyzer.attach(Box::new(FlaggedSource {
            released: first.clone(),
        }));
        analyzer.attach(Box::new(FlaggedSource {
            released: second.clone(),
        }));
        assert!(first.load(Ordering::SeqCst));
        assert!(!second.load(Ordering::SeqCst));

        analyzer.release();
        analyzer.release();
        assert!(second.load(Ordering::SeqCst));
        assert!(!analyzer.is_attached());
    }

    #[test]
    fn byte_scale_conversion() {
        assert_eq!(to_byte_scale(&[0.0, 0.5, 1.0, 2.0]), vec![0, 128, 255, 255]);
    }
}
