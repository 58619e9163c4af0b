use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "sift", version, about = "Tempo, waveform and Camelot features for audio tracks")]
pub struct Cli {
    /// ffmpeg executable (overrides FFMPEG_PATH)
    #[arg(long, global = true)]
    pub ffmpeg: Option<String>,

    /// ffprobe executable (overrides FFPROBE_PATH)
    #[arg(long, global = true)]
    pub ffprobe: Option<String>,

    /// Abort decoding and analysis after this many seconds
    #[arg(long, global = true, default_value_t = 25)]
    pub timeout_secs: u64,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Estimate the tempo of a track
    Analyze {
        /// Input audio file (MP3, FLAC, WAV, AAC, OGG, M4A)
        input: PathBuf,

        /// Known musical key, e.g. "A", "F#", "Bbm"
        #[arg(long)]
        key: Option<String>,

        /// Mode of --key ("major" or "minor")
        #[arg(long, default_value = "major")]
        mode: String,

        /// Decode sample rate for tempo analysis
        #[arg(long, default_value_t = 22050)]
        sample_rate: u32,

        /// Analyze segments one after another instead of in parallel
        #[arg(long)]
        sequential: bool,
    },

    /// Extract waveform peaks for display
    Waveform {
        /// Input audio file
        input: PathBuf,

        /// Peaks per second of audio
        #[arg(long, default_value_t = 100)]
        peaks_per_second: u32,
    },

    /// Print the Camelot code of a key and its compatible codes
    Camelot {
        /// Key name, e.g. "C", "Am", "G#m"
        key: String,

        /// Key mode ("major" or "minor")
        #[arg(long, default_value = "major")]
        mode: String,
    },
}
