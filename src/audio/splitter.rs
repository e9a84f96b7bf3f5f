//! Cutting long episodes into upload-sized pieces with ffmpeg.

use crate::error::{PodsiftError, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

/// One piece of an episode, in seconds from the start of the file.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Segment {
    index: usize,
    start: f64,
    length: f64,
}

impl Segment {
    fn file_name(&self) -> String {
        format!("segment_{:04}.mp3", self.index)
    }
}

/// How ffmpeg should write a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    /// Reuse the source stream as is.
    Copy,
    /// Decode and re-encode as MP3.
    Mp3,
}

/// Cut `source` into pieces of at most `chunk_seconds`, written under
/// `output_dir`. Returns each piece with its start offset in seconds.
///
/// A file that already fits in one chunk is returned unchanged.
#[instrument(skip_all, fields(source = %source.display()))]
pub async fn split_audio(
    source: &Path,
    output_dir: &Path,
    chunk_seconds: u32,
) -> Result<Vec<(PathBuf, f64)>> {
    let duration = probe_duration(source).await?;
    let segments = plan_segments(duration, chunk_seconds.max(1) as f64);
    if segments.len() <= 1 {
        debug!("{:.1}s of audio fits in one chunk", duration);
        return Ok(vec![(source.to_path_buf(), 0.0)]);
    }

    std::fs::create_dir_all(output_dir)?;
    let mut pieces = Vec::with_capacity(segments.len());
    for segment in &segments {
        let dest = output_dir.join(segment.file_name());
        cut_segment(source, &dest, segment).await?;
        pieces.push((dest, segment.start));
    }

    info!("Split {:.1}s of audio into {} pieces", duration, pieces.len());
    Ok(pieces)
}

fn plan_segments(duration: f64, chunk_len: f64) -> Vec<Segment> {
    if !duration.is_finite() || duration <= 0.0 {
        return Vec::new();
    }
    let count = (duration / chunk_len).ceil() as usize;
    (0..count)
        .map(|index| {
            let start = index as f64 * chunk_len;
            Segment {
                index,
                start,
                length: chunk_len.min(duration - start),
            }
        })
        .collect()
}

async fn cut_segment(source: &Path, dest: &Path, segment: &Segment) -> Result<()> {
    let copied = run_tool("ffmpeg", segment_args(source, dest, segment, Encoding::Copy)).await?;
    if copied.status.success() && dest.exists() {
        return Ok(());
    }

    warn!(
        "Could not copy segment {} without re-encoding, encoding as MP3",
        segment.index
    );
    let encoded = run_tool("ffmpeg", segment_args(source, dest, segment, Encoding::Mp3)).await?;
    if encoded.status.success() {
        Ok(())
    } else {
        Err(PodsiftError::Transcription(format!(
            "ffmpeg could not cut segment {}: {}",
            segment.index,
            String::from_utf8_lossy(&encoded.stderr).trim()
        )))
    }
}

fn segment_args(source: &Path, dest: &Path, segment: &Segment, encoding: Encoding) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-ss".into(),
        format!("{:.3}", segment.start).into(),
        "-t".into(),
        format!("{:.3}", segment.length).into(),
        "-i".into(),
        source.into(),
    ];
    match encoding {
        Encoding::Copy => args.extend(["-c:a".into(), "copy".into()]),
        Encoding::Mp3 => args.extend([
            "-c:a".into(),
            "libmp3lame".into(),
            "-q:a".into(),
            "2".into(),
        ]),
    }
    args.extend(["-vn".into(), "-y".into(), dest.into()]);
    args
}

async fn probe_duration(path: &Path) -> Result<f64> {
    let args: Vec<OsString> = vec![
        "-v".into(),
        "error".into(),
        "-show_entries".into(),
        "format=duration".into(),
        "-of".into(),
        "default=noprint_wrappers=1:nokey=1".into(),
        path.into(),
    ];
    let output = run_tool("ffprobe", args).await?;

    // ffprobe exits non-zero when it cannot read the media at all.
    if !output.status.success() {
        return Err(PodsiftError::Transcription(format!(
            "ffprobe could not read {}",
            path.display()
        )));
    }
    parse_duration(&String::from_utf8_lossy(&output.stdout))
}

fn parse_duration(stdout: &str) -> Result<f64> {
    stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .and_then(|line| line.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .ok_or_else(|| {
            PodsiftError::Transcription(format!("Unusable duration from ffprobe: {:?}", stdout.trim()))
        })
}

/// Run an external tool to completion, capturing its output.
///
/// A missing binary is a setup problem and reported as `ToolNotFound`.
async fn run_tool(tool: &str, args: Vec<OsString>) -> Result<Output> {
    debug!("Running {} {:?}", tool, args);
    Command::new(tool)
        .args(&args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PodsiftError::ToolNotFound(tool.to_string()),
            _ => PodsiftError::ToolFailed(format!("{}: {}", tool, e)),
        })
}
