//! Cross-platform capture and playback, wired to a pipeline peer.
//!
//! `AudioIO` never owns a [`StreamingPipeline`]: it holds an `Arc` to one
//! and only ever calls `process_input`/`get_output` on it, exactly as any
//! other caller could. Capture and playback are two independent `cpal`
//! streams rather than one duplex stream, so either direction can run (or
//! fail to open) without the other.
//!
//! Unlike a hand-tuned DSP callback, the capture and playback closures here
//! do allocate (each `process_input`/`get_output` call copies through a
//! `Vec`), because the pipeline's ring buffers are mutex-guarded rather
//! than lock-free. The buffers' own contract — briefly contending for a
//! mutex from any thread — already accepts that tradeoff; avoiding the
//! allocation too would mean reintroducing a lock-free ring just for this
//! one call site.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleRate;
use rvc_core::{linear_resample, StreamingPipeline};

use crate::error::DeviceError;

/// Picks a supported config whose sample rate matches `working_rate`
/// exactly, falling back to the device's default config (and letting the
/// caller resample) when nothing matches.
fn negotiate_config(
    working_rate: u32,
    supported: impl Iterator<Item = cpal::SupportedStreamConfigRange>,
    default: cpal::SupportedStreamConfig,
) -> cpal::SupportedStreamConfig {
    let target = SampleRate(working_rate);
    for range in supported {
        if range.min_sample_rate() <= target && target <= range.max_sample_rate() {
            return range.with_sample_rate(target);
        }
    }
    default
}

/// Owns the live `cpal` streams for one capture/playback pair.
pub struct AudioIO {
    pipeline: Arc<StreamingPipeline>,
    capture_stream: Option<cpal::Stream>,
    playback_stream: Option<cpal::Stream>,
    underrun_count: Arc<AtomicU64>,
}

impl AudioIO {
    pub fn new(pipeline: Arc<StreamingPipeline>) -> Self {
        Self {
            pipeline,
            capture_stream: None,
            playback_stream: None,
            underrun_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Opens the default input device and starts pushing captured audio
    /// into the pipeline. Input is downmixed to mono before being handed
    /// to `process_input`.
    pub fn start_capture(&mut self) -> Result<(), DeviceError> {
        let working_rate = self.pipeline.config().sample_rate;
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(DeviceError::NoDefaultInput)?;
        let default_config = device
            .default_input_config()
            .map_err(|e| DeviceError::UnsupportedConfig(e.to_string()))?;
        let supported = device
            .supported_input_configs()
            .map_err(|e| DeviceError::UnsupportedConfig(e.to_string()))?;
        let config = negotiate_config(working_rate, supported, default_config);
        let channels = config.channels() as usize;
        let device_rate = config.sample_rate().0;
        let stream_config: cpal::StreamConfig = config.into();

        let pipeline = Arc::clone(&self.pipeline);
        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let mono = downmix_to_mono(data, channels);
                    let at_working_rate = if device_rate == working_rate {
                        mono
                    } else {
                        linear_resample(&mono, device_rate, working_rate)
                    };
                    if let Err(err) = pipeline.process_input(&at_working_rate) {
                        tracing::warn!(error = %err, "dropping invalid capture samples");
                    }
                },
                |err| tracing::error!(error = %err, "capture stream error"),
                None,
            )
            .map_err(|e| DeviceError::StreamBuildFailed(e.to_string()))?;

        stream.play().map_err(|e| DeviceError::StreamPlayFailed(e.to_string()))?;
        self.capture_stream = Some(stream);
        Ok(())
    }

    /// Opens the default output device and starts pulling converted audio
    /// from the pipeline, upmixing mono to the device's channel count. The
    /// stream starts immediately; the callback itself emits a handful of
    /// silent blocks first so the pipeline has a moment to produce output
    /// before anything real is pulled from it.
    pub fn start_playback(&mut self) -> Result<(), DeviceError> {
        let working_rate = self.pipeline.config().sample_rate;
        let chunk_size = self.pipeline.config().chunk_size;
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(DeviceError::NoDefaultOutput)?;
        let default_config = device
            .default_output_config()
            .map_err(|e| DeviceError::UnsupportedConfig(e.to_string()))?;
        let supported = device
            .supported_output_configs()
            .map_err(|e| DeviceError::UnsupportedConfig(e.to_string()))?;
        let config = negotiate_config(working_rate, supported, default_config);
        let channels = config.channels() as usize;
        let device_rate = config.sample_rate().0;
        let stream_config: cpal::StreamConfig = config.into();

        let pipeline = Arc::clone(&self.pipeline);
        let underrun_count = Arc::clone(&self.underrun_count);
        // Sentinel: the first callback observes the device's actual block
        // size and turns this into `ceil(chunk_size / device_block) + 1`.
        let pre_roll_remaining = Arc::new(AtomicU64::new(u64::MAX));
        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let device_frames = data.len() / channels.max(1);

                    let mut remaining = pre_roll_remaining.load(Ordering::Relaxed);
                    if remaining == u64::MAX {
                        let device_block = device_frames.max(1) as u64;
                        let cs = chunk_size as u64;
                        remaining = (cs + device_block - 1) / device_block + 1;
                    }
                    if remaining > 0 {
                        data.fill(0.0);
                        pre_roll_remaining.store(remaining - 1, Ordering::Relaxed);
                        return;
                    }
                    pre_roll_remaining.store(0, Ordering::Relaxed);

                    // Ask the pipeline for however many working-rate samples
                    // map onto the device's frame count, so resampling
                    // doesn't leave the callback short.
                    let working_frames = if device_rate == working_rate {
                        device_frames
                    } else {
                        ((device_frames as f64) * (working_rate as f64) / (device_rate as f64)).ceil() as usize
                    };
                    let at_working_rate = pipeline.get_output(working_frames);
                    let mono = if device_rate == working_rate {
                        at_working_rate
                    } else {
                        linear_resample(&at_working_rate, working_rate, device_rate)
                    };
                    if mono.len() < device_frames {
                        underrun_count.fetch_add(1, Ordering::Relaxed);
                    }
                    upmix_from_mono(&mono, device_frames, channels, data);
                },
                |err| tracing::error!(error = %err, "playback stream error"),
                None,
            )
            .map_err(|e| DeviceError::StreamBuildFailed(e.to_string()))?;

        stream.play().map_err(|e| DeviceError::StreamPlayFailed(e.to_string()))?;
        self.playback_stream = Some(stream);
        Ok(())
    }

    /// Tears down both streams. Safe to call even if one or both were
    /// never started.
    pub fn stop(&mut self) {
        self.capture_stream = None;
        self.playback_stream = None;
    }

    pub fn underrun_count(&self) -> u64 {
        self.underrun_count.load(Ordering::Relaxed)
    }
}

fn downmix_to_mono(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

fn upmix_from_mono(mono: &[f32], frames: usize, channels: usize, out: &mut [f32]) {
    for frame_idx in 0..frames {
        let sample = mono.get(frame_idx).copied().unwrap_or(0.0);
        for ch in 0..channels {
            let idx = frame_idx * channels + ch;
            if idx < out.len() {
                out[idx] = sample;
            }
        }
    }
}
