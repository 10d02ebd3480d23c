use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use hound::{SampleFormat, WavReader};
use ringbuf::{
    traits::{Consumer, Producer, Split},
    HeapProd, HeapRb,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use tracing::{debug, info, warn};

use super::device::{PlaybackDevice, PlaybackError};
use crate::announce::Clip;

/// Seconds of audio the output ring buffer can queue
const QUEUE_SECS: usize = 10;

/// Output format negotiated with the sound card
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OutputFormat {
    sample_rate: u32,
    channels: u16,
}

/// Plays WAV clips from a directory on the default output device
///
/// Clips are named after their track index (`0007.wav`, `0205.wav`). Each is
/// decoded on first use, converted to the output format, and cached. The
/// cpal stream lives on its own thread; this handle only pushes samples into
/// the ring buffer that feeds it.
pub struct ClipDevice {
    clips_dir: PathBuf,
    format: OutputFormat,
    producer: HeapProd<f32>,
    healthy: Arc<AtomicBool>,
    cache: HashMap<Clip, Arc<[f32]>>,
    /// Dropping this ends the stream thread
    _shutdown: mpsc::Sender<()>,
}

impl ClipDevice {
    /// Opens the default output device and starts a silent stream
    ///
    /// # Errors
    /// Returns error if the clips directory is missing, no output device is
    /// available, or the stream cannot be built
    pub fn open(clips_dir: &Path) -> Result<Self> {
        if !clips_dir.is_dir() {
            return Err(anyhow!(
                "clips directory not found: {}",
                clips_dir.display()
            ));
        }

        info!(dir = %clips_dir.display(), "initializing clip playback");

        let (ready_tx, ready_rx) = mpsc::channel::<Result<(OutputFormat, HeapProd<f32>), String>>();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let healthy = Arc::new(AtomicBool::new(true));
        let healthy_stream = Arc::clone(&healthy);

        thread::Builder::new()
            .name("clip-output".to_owned())
            .spawn(move || run_output_stream(&ready_tx, &shutdown_rx, &healthy_stream))
            .context("failed to spawn output thread")?;

        let (format, producer) = ready_rx
            .recv()
            .context("output thread exited during startup")?
            .map_err(|e| anyhow!(e))?;

        info!(
            sample_rate = format.sample_rate,
            channels = format.channels,
            "clip playback ready"
        );

        Ok(Self {
            clips_dir: clips_dir.to_path_buf(),
            format,
            producer,
            healthy,
            cache: HashMap::new(),
            _shutdown: shutdown_tx,
        })
    }

    fn load(&mut self, clip: Clip) -> Result<Arc<[f32]>, PlaybackError> {
        if let Some(samples) = self.cache.get(&clip) {
            return Ok(Arc::clone(samples));
        }

        let path = self.clips_dir.join(clip.file_name());
        if !path.is_file() {
            return Err(PlaybackError::clip_not_found(clip));
        }

        let samples: Arc<[f32]> = decode_clip(&path, self.format)
            .map_err(|e| {
                warn!(path = %path.display(), error = %e, "failed to decode clip");
                PlaybackError::clip_not_found(clip)
            })?
            .into();

        debug!(clip = %clip, samples = samples.len(), "clip cached");
        self.cache.insert(clip, Arc::clone(&samples));
        Ok(samples)
    }
}

impl PlaybackDevice for ClipDevice {
    fn is_ready(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    fn play(&mut self, clip: Clip) -> Result<(), PlaybackError> {
        if !self.is_ready() {
            return Err(PlaybackError::DeviceUnavailable(
                "output stream failed".to_owned(),
            ));
        }

        let samples = self.load(clip)?;
        let pushed = self.producer.push_slice(&samples);
        if pushed < samples.len() {
            warn!(
                clip = %clip,
                dropped = samples.len() - pushed,
                "output queue full, clip truncated"
            );
        }
        Ok(())
    }
}

/// Owns the cpal stream for the lifetime of the device handle
fn run_output_stream(
    ready_tx: &mpsc::Sender<Result<(OutputFormat, HeapProd<f32>), String>>,
    shutdown_rx: &mpsc::Receiver<()>,
    healthy: &Arc<AtomicBool>,
) {
    match build_output_stream(healthy) {
        Ok((stream, format, producer)) => {
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(format!("failed to start output stream: {e}")));
                return;
            }
            if ready_tx.send(Ok((format, producer))).is_err() {
                return;
            }
            // Blocks until the device handle is dropped
            let _ = shutdown_rx.recv();
            debug!("output thread stopping");
        }
        Err(e) => {
            let _ = ready_tx.send(Err(format!("{e:#}")));
        }
    }
}

fn build_output_stream(
    healthy: &Arc<AtomicBool>,
) -> Result<(cpal::Stream, OutputFormat, HeapProd<f32>)> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .context("no output device available")?;

    let device_name = device.name().unwrap_or_else(|_| "unknown".to_owned());
    info!("using output device: {}", device_name);

    let default_config = device
        .default_output_config()
        .context("failed to get default output config")?;
    let f32_ranges = if default_config.sample_format() == cpal::SampleFormat::F32 {
        Vec::new()
    } else {
        device
            .supported_output_configs()
            .context("failed to query output configs")?
            .collect()
    };
    let supported_config = select_f32_config(default_config, f32_ranges)?;

    let format = OutputFormat {
        sample_rate: supported_config.sample_rate().0,
        channels: supported_config.channels(),
    };

    let capacity = (format.sample_rate as usize) * (format.channels as usize) * QUEUE_SECS;
    let (producer, mut consumer) = HeapRb::<f32>::new(capacity).split();

    let healthy_err = Arc::clone(healthy);
    let stream_config = supported_config.into();
    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let filled = consumer.pop_slice(data);
                // Silence once the queue runs dry
                data[filled..].fill(0.0);
            },
            move |err| {
                warn!("output stream error: {}", err);
                healthy_err.store(false, Ordering::Relaxed);
            },
            None,
        )
        .context("failed to build output stream")?;

    Ok((stream, format, producer))
}

/// Picks an f32 output config, preferring the device default
///
/// Falls back to an f32 range at the default rate and channel count, then to
/// any f32 range at its highest rate.
fn select_f32_config(
    default: cpal::SupportedStreamConfig,
    ranges: Vec<cpal::SupportedStreamConfigRange>,
) -> Result<cpal::SupportedStreamConfig> {
    if default.sample_format() == cpal::SampleFormat::F32 {
        return Ok(default);
    }

    let rate = default.sample_rate();
    let mut f32_ranges: Vec<_> = ranges
        .into_iter()
        .filter(|range| range.sample_format() == cpal::SampleFormat::F32)
        .collect();

    if let Some(index) = f32_ranges.iter().position(|range| {
        range.channels() == default.channels()
            && range.min_sample_rate() <= rate
            && rate <= range.max_sample_rate()
    }) {
        debug!(
            "default output config is {:?}, using f32 at the same rate",
            default.sample_format()
        );
        return Ok(f32_ranges.swap_remove(index).with_sample_rate(rate));
    }

    f32_ranges
        .into_iter()
        .next()
        .map(cpal::SupportedStreamConfigRange::with_max_sample_rate)
        .ok_or_else(|| {
            anyhow!(
                "output device does not support f32 samples (default format is {:?})",
                default.sample_format()
            )
        })
}

/// Reads a WAV clip and converts it to interleaved samples in `format`
fn decode_clip(path: &Path, format: OutputFormat) -> Result<Vec<f32>> {
    let mut reader = WavReader::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .context("failed to read float samples")?,
        SampleFormat::Int => {
            let scale = int_scale(spec.bits_per_sample);
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| int_to_f32(v, scale)))
                .collect::<Result<_, _>>()
                .context("failed to read integer samples")?
        }
    };

    let mono = downmix(&samples, spec.channels);
    let resampled = resample_linear(&mono, spec.sample_rate, format.sample_rate);
    Ok(upmix(&resampled, format.channels))
}

fn int_scale(bits_per_sample: u16) -> f64 {
    let bits = i32::from(bits_per_sample.clamp(1, 32)) - 1;
    2.0_f64.powi(bits)
}

// f64 → f32: samples are stored as f32, precision sufficient
#[allow(clippy::cast_possible_truncation)]
fn int_to_f32(value: i32, scale: f64) -> f32 {
    (f64::from(value) / scale) as f32
}

/// Averages interleaved frames down to one channel
fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }

    let channels_f64 = f64::from(channels);
    samples
        .chunks(channels as usize)
        .map(|frame| {
            let sum_f64: f64 = frame.iter().map(|&s| f64::from(s)).sum();
            #[allow(clippy::cast_possible_truncation)]
            {
                (sum_f64 / channels_f64) as f32
            }
        })
        .collect()
}

/// Repeats each mono sample across `channels`
fn upmix(mono: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return mono.to_vec();
    }
    mono.iter()
        .flat_map(|&s| std::iter::repeat(s).take(channels as usize))
        .collect()
}

/// Linear interpolation resampling of a mono signal
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || from_rate == 0 || to_rate == 0 || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = f64::from(from_rate) / f64::from(to_rate);
    let output_len = ((samples.len() as f64) / ratio).ceil() as usize;
    let last = samples.len() - 1;

    (0..output_len)
        .map(|i| {
            let src = (i as f64) * ratio;
            let floor = (src.floor() as usize).min(last);
            let ceil = (floor + 1).min(last);
            let fract = src - src.floor();

            let s1 = f64::from(samples[floor]);
            let s2 = f64::from(samples[ceil]);
            s1.mul_add(1.0 - fract, s2 * fract) as f32
        })
        .collect()
}
