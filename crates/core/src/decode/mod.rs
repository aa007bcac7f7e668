//! Turns encoded audio into mono samples, either inline or on a worker
//! thread whose result the render loop polls.

use std::{
    io::Cursor,
    path::{Path, PathBuf},
    sync::mpsc::{self, Receiver, TryRecvError},
    task::Poll,
    thread,
};

use symphonia::core::{
    audio::SampleBuffer,
    codecs::{DecoderOptions, CODEC_TYPE_NULL},
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};

use crate::{DecodedAudio, Result, VisualiserError};

/// Decodes an in-memory audio blob. `extension` is an optional format hint
/// such as `"wav"` or `"mp3"`.
pub fn decode_bytes(bytes: &[u8], extension: Option<&str>) -> Result<DecodedAudio> {
    if bytes.is_empty() {
        return Err(VisualiserError::decode("input is empty"));
    }

    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| VisualiserError::decode(format!("unrecognised format: {e}")))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| VisualiserError::decode("no audio track found"))?;

    let track_id = track.id;
    let channels = track.codec_params.channels.map_or(1, |c| c.count()).max(1);
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| VisualiserError::decode("unknown sample rate"))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| VisualiserError::decode(e.to_string()))?;

    let mut samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(VisualiserError::decode(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(VisualiserError::decode(e.to_string())),
        };

        let spec = *decoded.spec();
        let mut buffer = SampleBuffer::<f32>::new(decoded.frames() as u64, spec);
        buffer.copy_interleaved_ref(decoded);

        if channels == 1 {
            samples.extend_from_slice(buffer.samples());
        } else {
            samples.extend(
                buffer
                    .samples()
                    .chunks(channels)
                    .map(|frame| frame.iter().sum::<f32>() / channels as f32),
            );
        }
    }

    if samples.is_empty() {
        return Err(VisualiserError::decode("stream contains no samples"));
    }

    tracing::info!(
        samples = samples.len(),
        sample_rate,
        seconds = samples.len() as f32 / sample_rate as f32,
        "decoded audio"
    );

    Ok(DecodedAudio {
        samples,
        sample_rate,
    })
}

pub fn decode_file(path: &Path) -> Result<DecodedAudio> {
    let bytes = std::fs::read(path)?;
    let extension = path.extension().and_then(|e| e.to_str());
    decode_bytes(&bytes, extension)
}

/// Decodes `path` on a worker thread.
pub fn decode_file_async(path: PathBuf) -> Pending<DecodedAudio> {
    Pending::spawn(move || decode_file(&path))
}

/// Result of work that finishes off the render thread. The owner calls
/// [`Pending::poll`] once per tick until it yields `Poll::Ready`.
#[derive(Debug)]
pub struct Pending<T> {
    receiver: Option<Receiver<Result<T>>>,
}

impl<T: Send + 'static> Pending<T> {
    pub fn spawn<F>(job: F) -> Self
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel();
        thread::spawn(move || {
            let _ = sender.send(job());
        });
        Self {
            receiver: Some(receiver),
        }
    }

    /// Never blocks. Yields `Poll::Ready` exactly once; later polls report an
    /// error.
    pub fn poll(&mut self) -> Poll<Result<T>> {
        let Some(receiver) = &self.receiver else {
            return Poll::Ready(Err(VisualiserError::msg("pending result already taken")));
        };

        match receiver.try_recv() {
            Ok(result) => {
                self.receiver = None;
                Poll::Ready(result)
            }
            Err(TryRecvError::Empty) => Poll::Pending,
            Err(TryRecvError::Disconnected) => {
                self.receiver = None;
                Poll::Ready(Err(VisualiserError::msg(
                    "worker exited without producing a result",
                )))
            }
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.receiver.is_none()
    }

    /// Blocks until the result is available.
    pub fn wait(mut self) -> Result<T> {
        match self.receiver.take() {
            Some(receiver) => receiver.recv().map_err(|_| {
                VisualiserError::msg("worker exited without producing a result")
            })?,
            None => Err(VisualiserError::msg("pending result already taken")),
        }
    }
}
