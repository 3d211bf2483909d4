use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    thread,
};

use crossbeam_channel::Sender;
use tracing::{debug, info};

use crate::{
    config::JobConfig,
    error::{Error, Result},
    io::ensure_video_dir,
    outside::{StreamDownloader, StreamTransformer},
    progress::{ProgressEvent, ProgressHub, ProgressSink},
    types::{ContentKind, SourceId, TimeSpan},
};

use super::{segment, subtitle};

/// Artifacts one job produced, keyed by content kind.
///
/// Entries exist only for artifacts that exist on disk. "Requested but
/// failed" shows up in the progress stream, not here — by the time a
/// caller reads this map, the log sink already carries the reasons.
#[derive(Debug, Default)]
pub struct JobResult {
    artifacts: BTreeMap<ContentKind, PathBuf>,
}

impl JobResult {
    pub fn get(&self, kind: &ContentKind) -> Option<&Path> {
        self.artifacts.get(kind).map(PathBuf::as_path)
    }

    pub fn contains(&self, kind: &ContentKind) -> bool {
        self.artifacts.contains_key(kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ContentKind, &Path)> {
        self.artifacts
            .iter()
            .map(|(kind, path)| (kind, path.as_path()))
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn into_map(self) -> BTreeMap<ContentKind, PathBuf> {
        self.artifacts
    }
}

/// The per-job coordinator over the two external-tool seams.
pub struct Pipeline<'a> {
    downloader: &'a dyn StreamDownloader,
    transformer: &'a dyn StreamTransformer,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        downloader: &'a dyn StreamDownloader,
        transformer: &'a dyn StreamTransformer,
    ) -> Self {
        Self {
            downloader,
            transformer,
        }
    }

    /// Run one job to completion.
    ///
    /// Stage A fetches video and subtitles in parallel; audio waits for
    /// Stage B — never alongside the video fetch, which the source
    /// rate-limits — and may be extracted from Stage A's video instead of
    /// fetched. Stage C burns subtitles in when both inputs exist.
    ///
    /// Returns `Err` only when the job cannot start at all (no source
    /// identifier, unparseable time bounds). Every per-content failure
    /// degrades to a missing entry in the result map plus a sink message.
    pub fn process_job(&self, config: &JobConfig, sink: &dyn ProgressSink) -> Result<JobResult> {
        let source_id =
            SourceId::from_url(&config.url).ok_or_else(|| Error::NoSourceId(config.url.clone()))?;
        let span = TimeSpan::new(&config.start_time, &config.end_time)?;
        let video_dir = ensure_video_dir(&config.output_dir, &source_id)?;

        info!("Processing {source_id} ({span})");

        let hub = ProgressHub::new();
        let progress = hub.sender();
        let video_dir = &video_dir;
        let span = &span;

        let mut result = JobResult::default();

        thread::scope(|scope| {
            // Single owner of the sink; stops once every sender is dropped
            let pump = scope.spawn(move || hub.pump(sink));

            // Stage A: video and subtitles, concurrently
            let video_task = config.download_video.then(|| {
                let progress = progress.clone();
                scope.spawn(move || {
                    segment::fetch_video(
                        self.downloader,
                        self.transformer,
                        config,
                        video_dir,
                        span,
                        &progress,
                    )
                })
            });
            let subtitle_task = config.download_subtitles.then(|| {
                let progress = progress.clone();
                scope.spawn(move || {
                    subtitle::fetch_subtitles(self.downloader, config, video_dir, span, &progress)
                })
            });

            let video_path = video_task
                .and_then(|task| absorb_spawned(task.join(), "Video fetch", &progress));
            let subtitles = subtitle_task
                .and_then(|task| absorb_spawned(task.join(), "Subtitle fetch", &progress))
                .unwrap_or_default();

            // Stage B: audio, strictly after Stage A
            let audio_path = if config.download_audio {
                let fetched = segment::fetch_audio(
                    self.downloader,
                    self.transformer,
                    config,
                    video_dir,
                    span,
                    video_path.as_deref(),
                    &progress,
                );
                absorb(fetched, "Audio fetch", &progress)
            } else {
                None
            };

            // Stage C: burn-in, when both inputs came through
            let burned_path = if config.burn_subtitles {
                match (&video_path, subtitles.first()) {
                    (Some(video), Some((_, subtitle))) => {
                        let burned = subtitle::burn_in(
                            self.transformer,
                            video,
                            subtitle,
                            video_dir,
                            span,
                            &progress,
                        );
                        absorb(burned, "Subtitle burn-in", &progress)
                    }
                    _ => {
                        debug!("Skipping burn-in: missing video or subtitle artifact");
                        None
                    }
                }
            } else {
                None
            };

            if let Some(path) = video_path {
                result.artifacts.insert(ContentKind::Video, path);
            }
            for (lang, path) in subtitles {
                result.artifacts.insert(ContentKind::Subtitles(lang), path);
            }
            if let Some(path) = audio_path {
                result.artifacts.insert(ContentKind::Audio, path);
            }
            if let Some(path) = burned_path {
                result
                    .artifacts
                    .insert(ContentKind::VideoWithSubtitles, path);
            }

            drop(progress);
            let errors = pump.join().unwrap_or(0);
            info!(
                "Job for {source_id} finished: {} artifacts, {errors} failures",
                result.len()
            );
        });

        Ok(result)
    }
}

/// Convert a per-content failure into an absence marker plus a sink
/// message. Failures never cross this boundary as errors.
fn absorb<T>(result: Result<T>, what: &str, progress: &Sender<ProgressEvent>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            let report = miette::Report::from(err);
            let _ = progress.send(ProgressEvent::error(format!("{what} failed: {report}")));
            None
        }
    }
}

/// Same, but also absorbs a panicking worker so one content type cannot
/// take its siblings down.
fn absorb_spawned<T>(
    joined: thread::Result<Result<T>>,
    what: &str,
    progress: &Sender<ProgressEvent>,
) -> Option<T> {
    match joined {
        Ok(result) => absorb(result, what, progress),
        Err(_) => {
            let _ = progress.send(ProgressEvent::error(format!("{what} worker panicked")));
            None
        }
    }
}
