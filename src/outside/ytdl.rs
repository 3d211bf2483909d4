use std::{ffi::OsStr, path::Path, process::Command};

use crate::{
    error::{Error, Result},
    types::Bitrate,
};

use super::command::{assert_success_command, run_with_retry, Capture, YT_DL, YT_DLP};

/// Per-invocation knobs shared by every fetch call.
///
/// Proxy and credentials travel in the argument list of each invocation
/// rather than in the process environment, so concurrent jobs with
/// different proxies cannot interfere with each other.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchOptions<'a> {
    pub proxy: Option<&'a str>,
    /// Netscape-format cookie file.
    pub cookies: Option<&'a Path>,
    pub max_retries: u32,
}

/// Interface for fetching streams and subtitle tracks from the source.
///
/// Implementations always fetch the full media; trimming to the requested
/// span happens locally afterwards.
pub trait StreamDownloader: Sync {
    /// Fetch the source's video as a single merged file.
    ///
    /// `dest` is an output template; the tool picks the container it
    /// actually writes, so callers must look the real file up by prefix.
    fn download_video(
        &self,
        dest: &Path,
        url: &str,
        quality: &str,
        opts: &FetchOptions,
    ) -> Result<()>;

    /// Fetch the source's best audio, extracted to mp3.
    fn download_audio(
        &self,
        dest: &Path,
        url: &str,
        bitrate: Bitrate,
        opts: &FetchOptions,
    ) -> Result<()>;

    /// Fetch auto-generated subtitle tracks for the comma-separated
    /// language list into `scratch`, without downloading any media.
    /// Tracks land at `<scratch>/subs.<lang>.vtt`.
    fn download_subtitles(
        &self,
        scratch: &Path,
        url: &str,
        langs: &str,
        opts: &FetchOptions,
    ) -> Result<()>;
}

/// Interface for the [yt-dlp](https://github.com/yt-dlp/yt-dlp) program
pub struct Ytdl {
    program: &'static str,
}

impl Ytdl {
    /// Verify that the `yt-dlp` or `youtube-dl` binaries are reachable
    pub fn new() -> Result<Self> {
        if assert_success_command(YT_DLP, |cmd| cmd.arg("--version")).is_ok() {
            Ok(Self { program: YT_DLP })
        } else if assert_success_command(YT_DL, |cmd| cmd.arg("--version")).is_ok() {
            Ok(Self { program: YT_DL })
        } else {
            Err(Error::MissingBinary(YT_DLP.to_owned()))
        }
    }

    fn base_args<'a>(cmd: &'a mut Command, opts: &FetchOptions) -> &'a mut Command {
        let cmd = cmd.arg("-q").arg("--no-playlist");
        if let Some(proxy) = opts.proxy {
            cmd.args(["--proxy", proxy]);
        }
        if let Some(cookies) = opts.cookies {
            cmd.args([OsStr::new("--cookies"), cookies.as_os_str()]);
        }
        cmd
    }

    /// Refine a final failure whose stderr says the stream is unavailable.
    /// Retrying already happened by then; this only fixes the reported cause.
    fn check_availability(err: Error) -> Error {
        match err {
            Error::CommandFailed { ref stderr, .. }
                if stderr.lines().any(|line| {
                    line.starts_with("ERROR:") && line.to_lowercase().contains("unavailable")
                }) =>
            {
                Error::UnavailableStream
            }
            err => err,
        }
    }
}

impl StreamDownloader for Ytdl {
    fn download_video(
        &self,
        dest: &Path,
        url: &str,
        quality: &str,
        opts: &FetchOptions,
    ) -> Result<()> {
        run_with_retry(
            self.program,
            |cmd| {
                Self::base_args(cmd, opts)
                    .args(["-f", quality])
                    .args(["--merge-output-format", "mp4"])
                    .args([OsStr::new("-o"), dest.as_os_str()])
                    .arg("--")
                    .arg(url)
            },
            Capture::empty(),
            opts.max_retries,
        )
        .map_err(Self::check_availability)?;

        Ok(())
    }

    fn download_audio(
        &self,
        dest: &Path,
        url: &str,
        bitrate: Bitrate,
        opts: &FetchOptions,
    ) -> Result<()> {
        run_with_retry(
            self.program,
            |cmd| {
                Self::base_args(cmd, opts)
                    .args(["-f", "bestaudio/best"])
                    .arg("--extract-audio")
                    .args(["--audio-format", "mp3"])
                    .args(["--audio-quality", &bitrate.to_string()])
                    .args([OsStr::new("-o"), dest.as_os_str()])
                    .arg("--")
                    .arg(url)
            },
            Capture::empty(),
            opts.max_retries,
        )
        .map_err(Self::check_availability)?;

        Ok(())
    }

    fn download_subtitles(
        &self,
        scratch: &Path,
        url: &str,
        langs: &str,
        opts: &FetchOptions,
    ) -> Result<()> {
        let template = scratch.join("subs");

        run_with_retry(
            self.program,
            |cmd| {
                Self::base_args(cmd, opts)
                    .arg("--write-auto-sub")
                    .args(["--sub-lang", langs])
                    .arg("--skip-download")
                    .args([OsStr::new("-o"), template.as_os_str()])
                    .arg("--")
                    .arg(url)
            },
            Capture::empty(),
            opts.max_retries,
        )
        .map_err(Self::check_availability)?;

        Ok(())
    }
}
