use std::path::{Path, PathBuf};

use crossbeam_channel::Sender;
use miette::miette;
use tracing::{debug, info, warn};

use crate::{
    config::JobConfig,
    error::{Error, Result},
    io::{artifact_exists, check_free_space, find_with_prefix, ScratchFiles},
    outside::{StreamDownloader, StreamKind, StreamTransformer},
    progress::ProgressEvent,
    types::{ContentKind, TimeSpan},
};

/// Produce the trimmed video artifact for one span, or report why not.
///
/// The whole media is fetched and trimmed locally; asking the source for a
/// server-side clipped range is unreliable through a proxy.
pub fn fetch_video(
    downloader: &dyn StreamDownloader,
    transformer: &dyn StreamTransformer,
    config: &JobConfig,
    video_dir: &Path,
    span: &TimeSpan,
    progress: &Sender<ProgressEvent>,
) -> Result<PathBuf> {
    let output = video_dir.join(ContentKind::Video.artifact_name(span));
    if artifact_exists(&output) {
        let _ = progress.send(ProgressEvent::info(format!(
            "Video segment already exists, skipping fetch: {}",
            output.display()
        )));
        return Ok(output);
    }

    check_free_space(video_dir)?;
    let _ = progress.send(ProgressEvent::info(format!("Video fetch started ({span})")));

    let temp_stem = format!("temp_segment_{}", span.slug());
    let template = video_dir.join(format!("{temp_stem}.%(ext)s"));
    let _cleanup = ScratchFiles::new(video_dir, &temp_stem, &output);

    downloader.download_video(
        &template,
        &config.url,
        &config.video_quality,
        &config.fetch_options(),
    )?;

    let fetched = find_with_prefix(video_dir, &temp_stem)
        .ok_or_else(|| Error::Report(miette!("Fetch reported success but produced no file")))?;
    debug!("Fetched raw video to {}", fetched.display());

    // Make sure the fetch really produced video before spending a transcode on it
    if !transformer.has_stream(&fetched, StreamKind::Video)? {
        return Err(Error::MissingStream("video"));
    }

    let with_audio = transformer.has_stream(&fetched, StreamKind::Audio)?;
    if !with_audio {
        debug!("Fetched file has no audio track, trimming video only");
    }

    info!(
        "Trimming video segment {span} ({:.2}s)",
        span.duration_seconds()
    );
    transformer.trim_video(
        &fetched,
        &output,
        span.start(),
        span.duration_seconds(),
        with_audio,
    )?;

    let _ = progress.send(ProgressEvent::info(format!(
        "Video segment ready: {}",
        output.display()
    )));
    Ok(output)
}

/// Produce the trimmed audio artifact for one span.
///
/// When a trimmed video artifact is already on disk its audio track is
/// re-encoded directly: that saves a network round trip, and
/// near-simultaneous video+audio fetches against the same source trip its
/// rate limiting. A failed extraction falls through to the direct fetch.
pub fn fetch_audio(
    downloader: &dyn StreamDownloader,
    transformer: &dyn StreamTransformer,
    config: &JobConfig,
    video_dir: &Path,
    span: &TimeSpan,
    trimmed_video: Option<&Path>,
    progress: &Sender<ProgressEvent>,
) -> Result<PathBuf> {
    let output = video_dir.join(ContentKind::Audio.artifact_name(span));
    if artifact_exists(&output) {
        let _ = progress.send(ProgressEvent::info(format!(
            "Audio segment already exists, skipping fetch: {}",
            output.display()
        )));
        return Ok(output);
    }

    check_free_space(video_dir)?;

    if let Some(video) = trimmed_video.filter(|video| artifact_exists(video)) {
        let _ = progress.send(ProgressEvent::info(format!(
            "Extracting audio from {}",
            video.display()
        )));
        match transformer.extract_audio(video, &output, config.audio_bitrate) {
            Ok(()) => {
                let _ = progress.send(ProgressEvent::info(format!(
                    "Audio segment ready: {}",
                    output.display()
                )));
                return Ok(output);
            }
            Err(err) => {
                let report = miette::Report::from(err);
                warn!("Audio extraction from video failed: {report}");
                let _ = progress.send(ProgressEvent::warn(
                    "Audio extraction from video failed, falling back to direct fetch".to_owned(),
                ));
            }
        }
    }

    let _ = progress.send(ProgressEvent::info(format!("Audio fetch started ({span})")));

    let temp_stem = format!("temp_audio_{}", span.slug());
    let template = video_dir.join(format!("{temp_stem}.%(ext)s"));
    let _cleanup = ScratchFiles::new(video_dir, &temp_stem, &output);

    downloader.download_audio(
        &template,
        &config.url,
        config.audio_bitrate,
        &config.fetch_options(),
    )?;

    let fetched = find_with_prefix(video_dir, &temp_stem)
        .ok_or_else(|| Error::Report(miette!("Fetch reported success but produced no file")))?;
    debug!("Fetched raw audio to {}", fetched.display());

    info!(
        "Trimming audio segment {span} ({:.2}s)",
        span.duration_seconds()
    );
    transformer.trim_audio(
        &fetched,
        &output,
        span.start(),
        span.duration_seconds(),
        config.audio_bitrate,
    )?;

    let _ = progress.send(ProgressEvent::info(format!(
        "Audio segment ready: {}",
        output.display()
    )));
    Ok(output)
}
