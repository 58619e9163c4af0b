//! PCM source: mono 16-bit PCM obtained from an external decoder
//!
//! The decoder is a port ([`PcmDecoder`]) so tests can feed synthetic
//! audio. [`FfmpegDecoder`] is the real implementation and shells out to
//! ffmpeg/ffprobe, observing the caller's [`CancelToken`] while it waits.

use crate::cancel::CancelToken;
use crate::config::DecoderConfig;
use crate::error::{AnalysisError, Result};
use crate::format::{sanitize_extension, validate_input_path, AudioFormat};
use crossbeam_channel::RecvTimeoutError;
use std::ffi::OsString;
use std::io::{Read, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::debug;

/// How often a waiting subprocess call re-checks the cancel token
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Full-scale magnitude of a signed 16-bit sample
pub(crate) const I16_FULL_SCALE: f64 = 32768.0;

/// Decoded mono audio, normalized to -1.0..1.0
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSamples {
    pub samples: Vec<f64>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioSamples {
    /// Wrap already-normalized mono samples
    pub fn new(samples: Vec<f64>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            channels: 1,
        }
    }

    /// Convert raw signed 16-bit little-endian mono PCM; a trailing odd byte is dropped
    pub fn from_s16le(bytes: &[u8], sample_rate: u32) -> Self {
        let samples = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f64 / I16_FULL_SCALE)
            .collect();
        Self::new(samples, sample_rate)
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Decoding capability: raw PCM and container duration for a file on disk
pub trait PcmDecoder: Send + Sync {
    /// Decode `path` to mono signed 16-bit little-endian PCM at `sample_rate`
    fn decode_pcm(&self, path: &Path, sample_rate: u32, cancel: &CancelToken) -> Result<Vec<u8>>;

    /// Container-reported duration of `path` in seconds
    fn probe_duration(&self, path: &Path, cancel: &CancelToken) -> Result<f64>;
}

/// Decoder backed by the ffmpeg and ffprobe executables
#[derive(Debug, Clone, Default)]
pub struct FfmpegDecoder {
    config: DecoderConfig,
}

impl FfmpegDecoder {
    /// Create a decoder using the given executable paths
    pub fn new(config: DecoderConfig) -> Self {
        Self { config }
    }

    /// Create a decoder configured from `FFMPEG_PATH` / `FFPROBE_PATH`
    pub fn from_env() -> Self {
        Self::new(DecoderConfig::from_env())
    }

    /// Executable paths in use
    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }
}

impl PcmDecoder for FfmpegDecoder {
    fn decode_pcm(&self, path: &Path, sample_rate: u32, cancel: &CancelToken) -> Result<Vec<u8>> {
        let mut args: Vec<OsString> = vec!["-v".into(), "error".into(), "-nostdin".into(), "-i".into()];
        args.push(path.as_os_str().to_owned());
        args.extend(
            [
                "-ac",
                "1",
                "-ar",
                &sample_rate.to_string(),
                "-f",
                "s16le",
                "-acodec",
                "pcm_s16le",
                "-",
            ]
            .iter()
            .map(OsString::from),
        );

        let output = run_tool(&self.config.ffmpeg_path, &args, cancel)?;
        debug!(
            path = %path.display(),
            sample_rate,
            bytes = output.len(),
            "Decoded PCM"
        );
        Ok(output)
    }

    fn probe_duration(&self, path: &Path, cancel: &CancelToken) -> Result<f64> {
        let mut args: Vec<OsString> = [
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ]
        .iter()
        .map(OsString::from)
        .collect();
        args.push(path.as_os_str().to_owned());

        let output = run_tool(&self.config.ffprobe_path, &args, cancel)?;
        let text = String::from_utf8_lossy(&output);
        let duration: f64 = text.trim().parse().map_err(|_| {
            AnalysisError::invalid_file(path, format!("unparseable duration {:?}", text.trim()))
        })?;
        if !duration.is_finite() || duration <= 0.0 {
            return Err(AnalysisError::invalid_file(
                path,
                format!("non-positive duration {}", duration),
            ));
        }
        Ok(duration)
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// Run an executable to completion, returning its stdout
///
/// Both pipes are drained on helper threads so a chatty child cannot block.
/// The child is killed and reaped if `cancel` fires first.
fn run_tool(program: &str, args: &[OsString], cancel: &CancelToken) -> Result<Vec<u8>> {
    cancel.check()?;

    debug!(program, ?args, "Spawning decoder");
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| AnalysisError::Decode {
            tool: program.to_string(),
            status: "failed to spawn".to_string(),
            stderr: e.to_string(),
        })?;

    let (tx, rx) = crossbeam_channel::bounded::<(Stream, Vec<u8>)>(2);
    if let Some(pipe) = child.stdout.take() {
        drain(pipe, Stream::Stdout, tx.clone());
    }
    if let Some(pipe) = child.stderr.take() {
        drain(pipe, Stream::Stderr, tx.clone());
    }
    drop(tx);

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    loop {
        if cancel.is_cancelled() {
            let _ = child.kill();
            let _ = child.wait();
            debug!(program, "Decoder cancelled");
            return Err(AnalysisError::Cancelled);
        }
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok((Stream::Stdout, bytes)) => stdout = bytes,
            Ok((Stream::Stderr, bytes)) => stderr = bytes,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let status = child.wait()?;
    if !status.success() {
        return Err(AnalysisError::Decode {
            tool: program.to_string(),
            status: status.to_string(),
            stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
        });
    }
    Ok(stdout)
}

fn drain<R>(mut pipe: R, stream: Stream, tx: crossbeam_channel::Sender<(Stream, Vec<u8>)>)
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        let _ = tx.send((stream, buf));
    });
}

/// Decode a file on disk into normalized mono samples
pub fn decode_samples(
    decoder: &dyn PcmDecoder,
    path: &Path,
    sample_rate: u32,
    cancel: &CancelToken,
) -> Result<AudioSamples> {
    cancel.check()?;
    validate_input_path(path)?;

    let pcm = decoder.decode_pcm(path, sample_rate, cancel)?;
    if pcm.len() < 2 {
        return Err(AnalysisError::invalid_file(path, "decoder produced no audio"));
    }
    Ok(AudioSamples::from_s16le(&pcm, sample_rate))
}

/// Write `data` to a temporary file named with the format's extension
///
/// The file is removed when the returned handle is dropped.
pub fn stage_bytes(data: &[u8], format: AudioFormat) -> Result<NamedTempFile> {
    let suffix = sanitize_extension(&format!(".{}", format.extension()));
    let mut file = tempfile::Builder::new()
        .prefix("sift-audio-")
        .suffix(&suffix)
        .tempfile()?;
    file.write_all(data)?;
    file.flush()?;
    Ok(file)
}

/// Decode an in-memory buffer through a scoped temporary file
pub fn decode_bytes(
    decoder: &dyn PcmDecoder,
    data: &[u8],
    format: AudioFormat,
    sample_rate: u32,
    cancel: &CancelToken,
) -> Result<AudioSamples> {
    cancel.check()?;
    if data.is_empty() {
        return Err(AnalysisError::EmptyInput);
    }

    let staged = stage_bytes(data, format)?;
    decode_samples(decoder, staged.path(), sample_rate, cancel)
}
