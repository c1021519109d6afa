use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::Settings;
use crate::fetch::{FetchError, Fetcher};
use crate::parser::Cue;

const THUMB_SUFFIX: &str = "_thumb";
const STDERR_TAIL: usize = 400;

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("video download failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{step}: could not run {program}: {source}")]
    Spawn {
        step: &'static str,
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{step}: ffmpeg exited with {status}: {stderr}")]
    Tool {
        step: &'static str,
        status: ExitStatus,
        stderr: String,
    },
    #[error("{step}: ffmpeg wrote no output to {}", .path.display())]
    MissingOutput { step: &'static str, path: PathBuf },
}

/// Timestamps (seconds) picked from the caption track.
#[derive(Debug, Clone, PartialEq)]
pub struct FramePlan {
    pub position: f64,
    pub aim: f64,
    pub result: f64,
    pub clip_start: f64,
}

impl FramePlan {
    /// Position and aim sit two-thirds into the first and second cue; the
    /// result frame is `result_offset` after the last cue ends. Needs 2+ cues.
    pub fn from_cues(cues: &[Cue], result_offset: f64, clip_lead: f64) -> Option<Self> {
        let [first, second, ..] = cues else {
            return None;
        };
        let last = cues.last()?;
        let two_thirds = |c: &Cue| c.start + (c.end - c.start) * 2.0 / 3.0;
        let result = last.end + result_offset;
        Some(FramePlan {
            position: two_thirds(first),
            aim: two_thirds(second),
            result,
            clip_start: (result - clip_lead).max(0.0),
        })
    }
}

#[derive(Debug)]
pub enum MediaOutcome {
    Extracted(MediaFiles),
    InsufficientCues(usize),
}

#[derive(Debug)]
pub struct MediaFiles {
    pub stills: Vec<PathBuf>,
    pub thumbs: Vec<PathBuf>,
    pub clip: PathBuf,
    pub clip_thumb: PathBuf,
}

/// Scratch file for the downloaded video. Random name, created exclusively,
/// removed when the handle is dropped.
fn temp_video() -> std::io::Result<NamedTempFile> {
    tempfile::Builder::new()
        .prefix("nade-")
        .suffix(".mp4")
        .tempfile()
}

/// `dir/name_thumb.ext` next to `dir/name.ext`.
pub fn thumb_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match input.extension() {
        Some(ext) => format!("{}{}.{}", stem, THUMB_SUFFIX, ext.to_string_lossy()),
        None => format!("{}{}", stem, THUMB_SUFFIX),
    };
    input.with_file_name(name)
}

pub struct MediaExtractor {
    ffmpeg: String,
    thumb_width: u32,
    result_offset: f64,
    clip_lead: f64,
    clip_duration: f64,
}

impl MediaExtractor {
    pub fn new(settings: &Settings) -> Self {
        MediaExtractor {
            ffmpeg: settings.ffmpeg.clone(),
            thumb_width: settings.thumb_width,
            result_offset: settings.result_offset_secs,
            clip_lead: settings.clip_lead_secs,
            clip_duration: settings.clip_duration_secs,
        }
    }

    /// Download the video once and cut position/aim/result stills, their
    /// thumbnails, and the result clip into `out_dir`.
    ///
    /// Fewer than two cues is reported as `InsufficientCues` before anything
    /// is downloaded or written.
    pub async fn extract_lineup_frames(
        &self,
        fetcher: &Fetcher,
        video_url: &str,
        cues: &[Cue],
        out_dir: &Path,
    ) -> Result<MediaOutcome, MediaError> {
        let Some(plan) = FramePlan::from_cues(cues, self.result_offset, self.clip_lead) else {
            return Ok(MediaOutcome::InsufficientCues(cues.len()));
        };

        tokio::fs::create_dir_all(out_dir).await?;
        let video = temp_video()?;

        info!("  Downloading video...");
        fetcher.download_file(video_url, video.path()).await?;

        let files = self.extract_from_video(video.path(), cues, &plan, out_dir).await?;
        Ok(MediaOutcome::Extracted(files))
    }

    /// Run the frame plan against a local video file.
    pub async fn extract_from_video(
        &self,
        video: &Path,
        cues: &[Cue],
        plan: &FramePlan,
        out_dir: &Path,
    ) -> Result<MediaFiles, MediaError> {
        let caption = |i: usize| cues.get(i).map(|c| c.text.as_str()).unwrap_or("");
        let shots = [
            ("position.jpg", plan.position, caption(0)),
            ("aim.jpg", plan.aim, caption(1)),
            ("result.jpg", plan.result, "after last cue"),
        ];

        let mut stills = Vec::with_capacity(shots.len());
        let mut thumbs = Vec::with_capacity(shots.len());
        for (name, ts, label) in shots {
            debug!("  {} at {:.2}s ({})", name, ts, label);
            let still = out_dir.join(name);
            self.extract_frame(video, ts, &still).await?;
            thumbs.push(self.generate_thumbnail(&still).await?);
            stills.push(still);
        }

        debug!(
            "  Result clip from {:.2}s ({:.1}s)",
            plan.clip_start, self.clip_duration
        );
        let (clip, clip_thumb) = self
            .extract_result_clip(video, plan.clip_start, out_dir)
            .await?;

        Ok(MediaFiles {
            stills,
            thumbs,
            clip,
            clip_thumb,
        })
    }

    /// Single frame at `timestamp` seconds.
    pub async fn extract_frame(
        &self,
        video: &Path,
        timestamp: f64,
        output: &Path,
    ) -> Result<(), MediaError> {
        let mut cmd = self.command();
        cmd.arg("-ss")
            .arg(format!("{:.3}", timestamp))
            .arg("-i")
            .arg(video)
            .args(["-frames:v", "1", "-q:v", "2"])
            .arg(output);
        self.run("extract frame", cmd, output).await
    }

    /// Downscaled copy of an image at `thumb_width`, aspect preserved.
    pub async fn generate_thumbnail(&self, input: &Path) -> Result<PathBuf, MediaError> {
        let output = thumb_path(input);
        let mut cmd = self.command();
        cmd.arg("-i")
            .arg(input)
            .arg("-vf")
            .arg(format!("scale={}:-1", self.thumb_width))
            .args(["-q:v", "4"])
            .arg(&output);
        self.run("thumbnail", cmd, &output).await?;
        Ok(output)
    }

    /// `result.mp4` at source resolution and `result_thumb.mp4` at `thumb_width`.
    pub async fn extract_result_clip(
        &self,
        video: &Path,
        start: f64,
        out_dir: &Path,
    ) -> Result<(PathBuf, PathBuf), MediaError> {
        let start = start.max(0.0);
        let full = out_dir.join("result.mp4");
        let thumb = thumb_path(&full);

        let mut cmd = self.clip_command(video, start);
        cmd.args(["-c:v", "libx264", "-preset", "fast", "-crf", "23"])
            .args(["-an", "-movflags", "+faststart"])
            .arg(&full);
        self.run("result clip", cmd, &full).await?;

        let mut cmd = self.clip_command(video, start);
        cmd.arg("-vf")
            .arg(format!("scale={}:-2", self.thumb_width))
            .args(["-c:v", "libx264", "-preset", "fast", "-crf", "28"])
            .args(["-an", "-movflags", "+faststart"])
            .arg(&thumb);
        self.run("result clip thumbnail", cmd, &thumb).await?;

        Ok((full, thumb))
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-y", "-hide_banner", "-loglevel", "error"])
            .stdin(Stdio::null());
        cmd
    }

    fn clip_command(&self, video: &Path, start: f64) -> Command {
        let mut cmd = self.command();
        cmd.arg("-ss")
            .arg(format!("{:.3}", start))
            .arg("-i")
            .arg(video)
            .arg("-t")
            .arg(format!("{:.3}", self.clip_duration));
        cmd
    }

    async fn run(
        &self,
        step: &'static str,
        mut cmd: Command,
        output: &Path,
    ) -> Result<(), MediaError> {
        let out = cmd.output().await.map_err(|source| MediaError::Spawn {
            step,
            program: self.ffmpeg.clone(),
            source,
        })?;
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            let stderr = stderr.trim();
            let tail_start = stderr
                .char_indices()
                .rev()
                .nth(STDERR_TAIL)
                .map(|(i, _)| i)
                .unwrap_or(0);
            return Err(MediaError::Tool {
                step,
                status: out.status,
                stderr: stderr[tail_start..].to_string(),
            });
        }
        if !output.exists() {
            return Err(MediaError::MissingOutput {
                step,
                path: output.to_path_buf(),
            });
        }
        Ok(())
    }
}

// ── Tests ──
