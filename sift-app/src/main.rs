//! Sift - command-line track analyzer
//!
//! Runs tempo analysis or waveform extraction on one file and prints the
//! result as JSON on stdout. Logs go to stderr.

mod cli;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use sift_analysis::{
    map_to_camelot, validate_binary_path, AnalyzerConfig, Analyzer, CamelotKey, CancelToken,
    DecoderConfig, FfmpegDecoder, KeyMode, PcmDecoder, TempoEstimator, WaveformConfig,
    WaveformGenerator,
};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let decoder: Arc<dyn PcmDecoder> = Arc::new(FfmpegDecoder::new(decoder_config(&cli)));
    let cancel = CancelToken::with_timeout(Duration::from_secs(cli.timeout_secs));

    let output = match &cli.command {
        Command::Analyze {
            input,
            key,
            mode,
            sample_rate,
            sequential,
        } => {
            let config = AnalyzerConfig {
                sample_rate: *sample_rate,
                ..AnalyzerConfig::default()
            };
            let estimator = if *sequential {
                TempoEstimator::sequential()
            } else {
                TempoEstimator::new()
            };
            let analyzer = Analyzer::new(decoder, config).with_estimator(estimator);

            let mut result = analyzer
                .analyze_path(input, &cancel)
                .with_context(|| format!("analysis of {} failed", input.display()))?;
            if let Some(key) = key {
                result = result.with_key(key, parse_mode(mode)?);
            }
            to_json(&result, cli.pretty)?
        }
        Command::Waveform {
            input,
            peaks_per_second,
        } => {
            let config = WaveformConfig {
                peaks_per_second: *peaks_per_second,
                ..WaveformConfig::default()
            };
            let data = WaveformGenerator::new(decoder, config)
                .generate(input, &cancel)
                .with_context(|| format!("waveform of {} failed", input.display()))?;
            to_json(&data, cli.pretty)?
        }
        Command::Camelot { key, mode } => {
            let mode = parse_mode(mode)?;
            let code = map_to_camelot(key, mode.as_str());
            let Some(camelot) = CamelotKey::parse(&code) else {
                bail!("unknown key {:?}", key);
            };
            let compatible: Vec<String> = camelot
                .compatible_keys()
                .iter()
                .map(CamelotKey::display)
                .collect();
            let value = serde_json::json!({
                "key": key,
                "mode": mode,
                "camelot": code,
                "compatible": compatible,
            });
            to_json(&value, cli.pretty)?
        }
    };

    println!("{}", output);
    info!(remaining = ?cancel.remaining(), "Done");
    Ok(())
}

/// Environment first, then command-line overrides, each validated
fn decoder_config(cli: &Cli) -> DecoderConfig {
    let mut config = DecoderConfig::from_env();
    if let Some(path) = &cli.ffmpeg {
        config.ffmpeg_path = validate_binary_path(path, &config.ffmpeg_path);
    }
    if let Some(path) = &cli.ffprobe {
        config.ffprobe_path = validate_binary_path(path, &config.ffprobe_path);
    }
    config
}

fn parse_mode(mode: &str) -> anyhow::Result<KeyMode> {
    mode.parse::<KeyMode>().map_err(anyhow::Error::from)
}

fn to_json<T: serde::Serialize>(value: &T, pretty: bool) -> anyhow::Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(json)
}
