//! Backend that shells out to an external batch voice-converter, round
//! tripping audio through WAV scratch files. Grounds to the same
//! shell-out-and-parse-output pattern used for external tool invocation
//! elsewhere in this workspace, adapted here to a WAV-in/WAV-out contract
//! instead of line-oriented stdout.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use rvc_core::{linear_resample, BackendConvertError, BackendInitError, ConversionBackend, Metrics};
use tempfile::TempDir;

/// How to invoke the external converter. `executable` and `extra_args` are
/// passed through verbatim; `--model`, `--input`, and `--output` are
/// appended by [`BatchAdapter`] itself.
#[derive(Debug, Clone)]
pub struct BatchAdapterConfig {
    pub executable: PathBuf,
    pub extra_args: Vec<String>,
    pub sample_rate: u32,
}

impl BatchAdapterConfig {
    pub fn new(executable: impl Into<PathBuf>, sample_rate: u32) -> Self {
        Self {
            executable: executable.into(),
            extra_args: Vec::new(),
            sample_rate,
        }
    }
}

/// Converts audio by round-tripping it through an external process via WAV
/// scratch files. Higher latency than [`crate::streaming::StreamingBackend`]
/// but useful for wrapping converters that only speak file-batch I/O.
pub struct BatchAdapter {
    config: BatchAdapterConfig,
    model_id: String,
    scratch_dir: Option<TempDir>,
    metrics: Arc<Metrics>,
}

impl BatchAdapter {
    pub fn new(config: BatchAdapterConfig, model_id: impl Into<String>) -> Self {
        Self {
            config,
            model_id: model_id.into(),
            scratch_dir: None,
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Exposes this adapter's own metrics (distinct from the pipeline's),
    /// since a backend is constructed before the pipeline that will own it.
    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }
}

impl ConversionBackend for BatchAdapter {
    fn initialize(&mut self) -> Result<(), BackendInitError> {
        let dir = tempfile::Builder::new()
            .prefix("rvc-batch-")
            .tempdir()
            .map_err(|e| BackendInitError::ScratchUnavailable(e.to_string()))?;

        Command::new(&self.config.executable)
            .arg("--version")
            .output()
            .map_err(|e| {
                BackendInitError::ExternalProcessUnavailable(format!(
                    "{}: {e}",
                    self.config.executable.display()
                ))
            })?;

        self.scratch_dir = Some(dir);
        Ok(())
    }

    fn convert_chunk(&mut self, chunk: &[f32], _context: &[f32]) -> Result<Vec<f32>, BackendConvertError> {
        let dir = self
            .scratch_dir
            .as_ref()
            .ok_or_else(|| BackendConvertError::fatal("initialize() was never called"))?;

        let input_path = dir.path().join("input.wav");
        let output_path = dir.path().join("output.wav");

        // Deliberately ignores context: this backend has no per-call state
        // to carry it in, so every chunk round-trips on its own. The audible
        // seams at chunk boundaries that result are expected here.
        write_wav(&input_path, chunk, self.config.sample_rate)
            .map_err(|e| BackendConvertError::fatal(format!("failed to write scratch wav: {e}")))?;

        let status = Command::new(&self.config.executable)
            .args(&self.config.extra_args)
            .arg("--model")
            .arg(&self.model_id)
            .arg("--input")
            .arg(&input_path)
            .arg("--output")
            .arg(&output_path)
            .status();

        match status {
            Ok(status) if status.success() => {}
            Ok(status) => {
                return Err(BackendConvertError::fatal(format!(
                    "external converter exited with {status}"
                )))
            }
            Err(e) => {
                return Err(BackendConvertError::fatal(format!(
                    "failed to spawn external converter: {e}"
                )))
            }
        }

        let (samples, output_rate) = read_wav(&output_path)
            .map_err(|e| BackendConvertError::fatal(format!("failed to read scratch wav: {e}")))?;

        if samples.is_empty() {
            return Err(BackendConvertError::fatal("external converter produced empty audio"));
        }

        // The external converter isn't obligated to honor the sample rate we
        // wrote at; resample back to the working rate if it didn't.
        let samples = if output_rate == self.config.sample_rate {
            samples
        } else {
            linear_resample(&samples, output_rate, self.config.sample_rate)
        };

        if samples.len() != chunk.len() {
            self.metrics.record_length_discrepancy();
        }

        let mut out = samples;
        out.resize(chunk.len(), 0.0);
        Ok(out)
    }

    fn cleanup(&mut self) {
        // Dropping the TempDir removes the scratch directory and its files.
        self.scratch_dir = None;
    }
}

fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for &s in samples {
        writer.write_sample(s)?;
    }
    writer.finalize()
}

fn read_wav(path: &Path) -> Result<(Vec<f32>, u32), hound::Error> {
    let mut reader = WavReader::open(path)?;
    let sample_rate = reader.spec().sample_rate;
    let samples = reader.samples::<f32>().collect::<Result<Vec<f32>, _>>()?;
    Ok((samples, sample_rate))
}
