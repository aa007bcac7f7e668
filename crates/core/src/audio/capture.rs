use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use super::{AudioSource, SampleTap, TapSource};
use crate::{Result, VisualiserError};

/// Roughly one second of audio at common device rates.
const TAP_CAPACITY: usize = 48_000;

/// Microphone capture on the default input device, downmixed to mono.
pub struct CaptureSource {
    inner: TapSource,
    stream: Option<cpal::Stream>,
}

impl CaptureSource {
    /// Opens the default input device and starts streaming into a tap.
    pub fn open_default() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| VisualiserError::Capture("no input device available".into()))?;

        let supported = device
            .default_input_config()
            .map_err(|e| VisualiserError::Capture(e.to_string()))?;
        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();
        let channels = config.channels.max(1) as usize;
        let sample_rate = config.sample_rate.0;

        let tap = SampleTap::new(TAP_CAPACITY);
        let writer = tap.clone();
        let on_error = |err: cpal::StreamError| tracing::warn!(%err, "capture stream error");

        let stream = match sample_format {
            cpal::SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    writer.push(&downmix(data.iter().copied(), channels));
                },
                on_error,
                None,
            ),
            cpal::SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let samples = data.iter().map(|s| *s as f32 / i16::MAX as f32);
                    writer.push(&downmix(samples, channels));
                },
                on_error,
                None,
            ),
            other => {
                return Err(VisualiserError::Capture(format!(
                    "unsupported input sample format {other:?}"
                )))
            }
        }
        .map_err(|e| VisualiserError::Capture(e.to_string()))?;

        stream
            .play()
            .map_err(|e| VisualiserError::Capture(e.to_string()))?;

        tracing::info!(
            device = device.name().unwrap_or_else(|_| "unknown".into()),
            sample_rate,
            channels,
            "microphone capture started"
        );

        Ok(Self {
            inner: TapSource::new(tap, sample_rate),
            stream: Some(stream),
        })
    }
}

impl AudioSource for CaptureSource {
    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn read_latest(&mut self, window: &mut [f32]) -> usize {
        self.inner.read_latest(window)
    }

    fn release(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.pause();
            drop(stream);
            tracing::info!("microphone capture stopped");
        }
        self.inner.release();
    }
}

fn downmix(samples: impl Iterator<Item = f32>, channels: usize) -> Vec<f32> {
    let interleaved: Vec<f32> = samples.collect();
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}
