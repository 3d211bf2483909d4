use std::{
    io,
    process::{Command, Output, Stdio},
    thread,
    time::Duration,
};

use bitflags::bitflags;
use miette::miette;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

pub const YT_DL: &str = "youtube-dl";
pub const YT_DLP: &str = "yt-dlp";
pub const FFMPEG: &str = "ffmpeg";
pub const FFPROBE: &str = "ffprobe";
pub const FFXXX_DEFAULT_ARGS: [&str; 3] = ["-hide_banner", "-loglevel", "error"];

bitflags! {
    #[derive(Debug, Clone, Copy)]
    pub struct Capture: u8 {
        const STDIN = 0b0000001;
        const STDOUT = 0b0000010;
        const STDERR = 0b0000100;
    }
}

/// Run a command once, returning its raw output handle.
///
/// IO handles will be captured only if the caller required it or if the log
/// level is Debug. In that last case, `stdout` and `stderr` will be logged.
///
/// The function returns an error only if the command failed to execute;
/// a missing binary is reported as [`Error::MissingBinary`]. A non-0 exit
/// status is not an error at this level.
pub fn run_command<F: FnOnce(&mut Command) -> &mut Command>(
    program: &str,
    f: F,
    capture: Capture,
) -> Result<Output> {
    let is_debug = tracing::enabled!(tracing::Level::DEBUG);
    let get_io = |capture| {
        if capture {
            Stdio::piped()
        } else {
            Stdio::null()
        }
    };

    let mut cmd = Command::new(program);
    let cmd = f(&mut cmd)
        .stdin(get_io(capture.contains(Capture::STDIN)))
        .stdout(get_io(is_debug || capture.contains(Capture::STDOUT)))
        .stderr(get_io(is_debug || capture.contains(Capture::STDERR)));

    debug!("Executing command: {cmd:?}");
    let res = cmd.output().map_err(|err| match err.kind() {
        io::ErrorKind::NotFound => Error::MissingBinary(program.to_owned()),
        _ => Error::Report(miette!("Could not execute '{program}': {err}")),
    })?;

    if is_debug {
        debug!("status: {}", res.status);
        debug!("stdout: {} bytes long", res.stdout.len());
        trace!("stdout: {:?}", String::from_utf8_lossy(&res.stdout));
        debug!("stderr: {} bytes long", res.stderr.len());
        trace!("stderr: {:?}", String::from_utf8_lossy(&res.stderr));
    }

    Ok(res)
}

/// Run the command once and verify that it has returned a success status code.
pub fn assert_success_command<F: FnOnce(&mut Command) -> &mut Command>(
    program: &str,
    f: F,
) -> Result<()> {
    let res = run_command(program, f, Capture::empty())?;
    if res.status.success() {
        Ok(())
    } else {
        Err(Error::Report(miette!(
            "Command did run but was not successful"
        )))
    }
}

/// Run a command until it succeeds or the retry budget is spent.
///
/// `max_retries` is the total number of attempts. Attempts are separated by
/// an exponentially growing pause (`2^attempt` seconds). A missing binary
/// aborts immediately: retrying cannot install it.
///
/// Stderr is always captured so the final failure can name its cause.
pub fn run_with_retry<F>(
    program: &str,
    f: F,
    capture: Capture,
    max_retries: u32,
) -> Result<Output>
where
    F: Fn(&mut Command) -> &mut Command,
{
    let attempts = max_retries.max(1);
    let mut last_stderr = String::new();

    for attempt in 0..attempts {
        let res = run_command(program, &f, capture | Capture::STDERR)?;
        if res.status.success() {
            return Ok(res);
        }

        last_stderr = String::from_utf8_lossy(&res.stderr).into_owned();
        warn!(
            "{program} failed (attempt {}/{attempts}): {}",
            attempt + 1,
            last_stderr.trim()
        );

        if attempt + 1 < attempts {
            let wait = Duration::from_secs(2u64.saturating_pow(attempt));
            debug!("Waiting {}s before retrying {program}", wait.as_secs());
            thread::sleep(wait);
        }
    }

    Err(Error::CommandFailed {
        program: program.to_owned(),
        stderr: last_stderr,
    })
}
