use std::{ffi::OsStr, fmt::Debug, path::Path, process::Command};

use miette::{miette, Context, IntoDiagnostic};

use crate::{
    error::{Error, Result},
    types::{Bitrate, Timecode},
};

use super::command::{
    assert_success_command, run_command, run_with_retry, Capture, FFMPEG, FFPROBE,
    FFXXX_DEFAULT_ARGS,
};

/// Retry budget for local transforms, much smaller than the fetch one.
const TRANSFORM_RETRIES: u32 = 2;

/// Which stream type a probe should look for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
}

impl StreamKind {
    fn selector(self) -> &'static str {
        match self {
            StreamKind::Video => "v",
            StreamKind::Audio => "a",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StreamKind::Video => "video",
            StreamKind::Audio => "audio",
        }
    }
}

/// How a burn-in request ended up being satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BurnOutcome {
    /// Subtitles rasterized onto the frames.
    Rendered,
    /// The subtitle filter was unavailable; a selectable soft-subtitle
    /// track was muxed in instead.
    SoftMuxed,
}

/// Interface for trimming, probing, and re-encoding fetched media.
pub trait StreamTransformer: Sync + Debug {
    /// Cut `[start, start+duration)` out of `input` into `output`.
    ///
    /// Seeks before the input for fast coarse positioning, then re-encodes
    /// for the explicit duration. Stream copy is not an option here: a seek
    /// landing off a keyframe copies a frozen-looking lead-in.
    ///
    /// With `with_audio` unset the output carries no audio stream at all
    /// instead of a broken one.
    fn trim_video(
        &self,
        input: &Path,
        output: &Path,
        start: &Timecode,
        duration_seconds: f64,
        with_audio: bool,
    ) -> Result<()>;

    /// Same cut for an audio file, re-encoded to mp3 at `bitrate`.
    fn trim_audio(
        &self,
        input: &Path,
        output: &Path,
        start: &Timecode,
        duration_seconds: f64,
        bitrate: Bitrate,
    ) -> Result<()>;

    /// Re-encode the audio track of an existing (already trimmed) video
    /// file to mp3, dropping the video stream.
    fn extract_audio(&self, video: &Path, output: &Path, bitrate: Bitrate) -> Result<()>;

    /// True if probing finds at least one stream of the given kind.
    fn has_stream(&self, input: &Path, kind: StreamKind) -> Result<bool>;

    /// Composite `subtitles` into `video` at `output`.
    ///
    /// Falls back to muxing a soft-subtitle track when the rasterizing
    /// filter is not compiled in; any other primary failure gets one more
    /// primary attempt before giving up.
    fn burn_subtitles(&self, video: &Path, subtitles: &Path, output: &Path)
        -> Result<BurnOutcome>;
}

/// Interface for the [ffmpeg](https://ffmpeg.org) program family
#[derive(Debug)]
pub struct Ffmpeg;

impl Ffmpeg {
    /// Verify that the `ffmpeg` and `ffprobe` binaries are reachable
    pub fn new() -> Result<Self> {
        assert_success_command(FFMPEG, |cmd| cmd.arg("-version"))?;
        assert_success_command(FFPROBE, |cmd| cmd.arg("-version"))?;

        Ok(Self)
    }

    fn filter_args<'a>(
        cmd: &'a mut Command,
        video: &Path,
        filter: &str,
        output: &Path,
    ) -> &'a mut Command {
        cmd.args(FFXXX_DEFAULT_ARGS)
            .arg("-y")
            .args([OsStr::new("-i"), video.as_os_str()])
            .args(["-vf", filter])
            .args(["-c:a", "copy"])
            .args(["-preset", "fast"])
            .arg(output)
    }

    fn soft_mux_args<'a>(
        cmd: &'a mut Command,
        video: &Path,
        subtitles: &Path,
        output: &Path,
    ) -> &'a mut Command {
        cmd.args(FFXXX_DEFAULT_ARGS)
            .arg("-y")
            .args([OsStr::new("-i"), video.as_os_str()])
            .args([OsStr::new("-i"), subtitles.as_os_str()])
            .args(["-c:v", "libx264"])
            .args(["-c:a", "copy"])
            .args(["-c:s", "mov_text"])
            .args(["-metadata:s:s:0", "language=eng"])
            .args(["-disposition:s:0", "default"])
            .args(["-preset", "fast"])
            .arg(output)
    }
}

impl StreamTransformer for Ffmpeg {
    fn trim_video(
        &self,
        input: &Path,
        output: &Path,
        start: &Timecode,
        duration_seconds: f64,
        with_audio: bool,
    ) -> Result<()> {
        let duration = duration_seconds.to_string();

        run_with_retry(
            FFMPEG,
            |cmd| {
                let cmd = cmd
                    .args(FFXXX_DEFAULT_ARGS)
                    .arg("-y")
                    .args(["-ss", start.as_str()])
                    .args([OsStr::new("-i"), input.as_os_str()])
                    .args(["-t", &duration])
                    .args(["-c:v", "libx264"])
                    .args(["-preset", "fast"])
                    .args(["-crf", "23"]);

                let cmd = if with_audio {
                    cmd.args(["-c:a", "aac"]).args(["-b:a", "128k"])
                } else {
                    cmd.arg("-an")
                };

                cmd.arg(output)
            },
            Capture::empty(),
            TRANSFORM_RETRIES,
        )?;

        Ok(())
    }

    fn trim_audio(
        &self,
        input: &Path,
        output: &Path,
        start: &Timecode,
        duration_seconds: f64,
        bitrate: Bitrate,
    ) -> Result<()> {
        let duration = duration_seconds.to_string();
        let bitrate = bitrate.to_string();

        run_with_retry(
            FFMPEG,
            |cmd| {
                cmd.args(FFXXX_DEFAULT_ARGS)
                    .arg("-y")
                    .args(["-ss", start.as_str()])
                    .args([OsStr::new("-i"), input.as_os_str()])
                    .args(["-t", &duration])
                    .args(["-acodec", "libmp3lame"])
                    .args(["-ar", "44100"])
                    .args(["-ab", &bitrate])
                    .arg(output)
            },
            Capture::empty(),
            TRANSFORM_RETRIES,
        )?;

        Ok(())
    }

    fn extract_audio(&self, video: &Path, output: &Path, bitrate: Bitrate) -> Result<()> {
        let bitrate = bitrate.to_string();

        run_with_retry(
            FFMPEG,
            |cmd| {
                cmd.args(FFXXX_DEFAULT_ARGS)
                    .arg("-y")
                    .args([OsStr::new("-i"), video.as_os_str()])
                    .arg("-vn")
                    .args(["-acodec", "libmp3lame"])
                    .args(["-ar", "44100"])
                    .args(["-ab", &bitrate])
                    .arg(output)
            },
            Capture::empty(),
            TRANSFORM_RETRIES,
        )?;

        Ok(())
    }

    fn has_stream(&self, input: &Path, kind: StreamKind) -> Result<bool> {
        let res = run_command(
            FFPROBE,
            |cmd| {
                cmd.args(FFXXX_DEFAULT_ARGS)
                    .args(["-select_streams", kind.selector()])
                    .args(["-show_entries", "stream=codec_type"])
                    .args(["-of", "json"])
                    .arg(input)
            },
            Capture::STDOUT,
        )?;

        if !res.status.success() {
            return Err(Error::CommandFailed {
                program: FFPROBE.to_owned(),
                stderr: String::from_utf8_lossy(&res.stderr).into_owned(),
            });
        }

        let stdout = String::from_utf8_lossy(&res.stdout);
        let json = serde_json::from_str::<serde_json::Value>(&stdout)
            .into_diagnostic()
            .wrap_err("Could not parse probe output")?;
        let streams = json
            .get("streams")
            .and_then(|streams| streams.as_array())
            .ok_or_else(|| miette!("Probe output has no 'streams' array"))?;

        Ok(!streams.is_empty())
    }

    fn burn_subtitles(
        &self,
        video: &Path,
        subtitles: &Path,
        output: &Path,
    ) -> Result<BurnOutcome> {
        // The filter expression treats ':' and '\' as syntax
        let escaped = subtitles
            .to_string_lossy()
            .replace('\\', "/")
            .replace(':', "\\:");
        let filter = format!(
            "subtitles={escaped}:force_style='FontSize=20,\
            PrimaryColour=&H00FFFFFF,OutlineColour=&H00000000,Outline=1,Shadow=1'"
        );

        let render = || {
            run_with_retry(
                FFMPEG,
                |cmd| Self::filter_args(cmd, video, &filter, output),
                Capture::empty(),
                1,
            )
        };

        match render() {
            Ok(_) => Ok(BurnOutcome::Rendered),
            Err(Error::CommandFailed { ref stderr, .. }) if stderr.contains("No such filter") => {
                run_with_retry(
                    FFMPEG,
                    |cmd| Self::soft_mux_args(cmd, video, subtitles, output),
                    Capture::empty(),
                    TRANSFORM_RETRIES,
                )?;
                Ok(BurnOutcome::SoftMuxed)
            }
            Err(_) => {
                // Failed for some other reason; worth one more attempt
                render()?;
                Ok(BurnOutcome::Rendered)
            }
        }
    }
}
