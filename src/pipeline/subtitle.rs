use std::{
    fs,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use crossbeam_channel::Sender;
use miette::{miette, Context, IntoDiagnostic};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::{
    config::JobConfig,
    error::{Error, Result},
    io::artifact_exists,
    outside::{BurnOutcome, StreamDownloader, StreamTransformer},
    progress::ProgressEvent,
    types::{vtt_timestamp, ContentKind, TimeSpan},
};

/// `HH:MM:SS.mmm --> HH:MM:SS.mmm`, with optional cue settings trailing.
static CUE_LINE: OnceLock<Regex> = OnceLock::new();

fn cue_line() -> &'static Regex {
    CUE_LINE.get_or_init(|| {
        Regex::new(r"^(\d{2}:\d{2}:\d{2}\.\d{3})\s*-->\s*(\d{2}:\d{2}:\d{2}\.\d{3})(.*)$").unwrap()
    })
}

/// What one realignment pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RealignStats {
    pub total_cues: usize,
    pub kept_cues: usize,
}

/// Fetch subtitle tracks for every requested language and realign them to
/// the trimmed timeline.
///
/// Languages whose track the source does not carry are skipped, not
/// failed: a multi-language job may partially succeed. Returns the
/// (language, path) pairs that were produced, in request order.
pub fn fetch_subtitles(
    downloader: &dyn StreamDownloader,
    config: &JobConfig,
    video_dir: &Path,
    span: &TimeSpan,
    progress: &Sender<ProgressEvent>,
) -> Result<Vec<(String, PathBuf)>> {
    let langs = dedup_langs(&config.subtitle_langs);
    if langs.is_empty() {
        return Ok(Vec::new());
    }

    let targets: Vec<(String, PathBuf)> = langs
        .iter()
        .map(|lang| {
            let name = ContentKind::Subtitles(lang.clone()).artifact_name(span);
            (lang.clone(), video_dir.join(name))
        })
        .collect();

    if targets.iter().all(|(_, path)| artifact_exists(path)) {
        let _ = progress.send(ProgressEvent::info(
            "All subtitle files already exist, skipping fetch".to_owned(),
        ));
        return Ok(targets);
    }

    let _ = progress.send(ProgressEvent::info(format!(
        "Subtitle fetch started ({})",
        langs.join(",")
    )));

    // Dropping the handle removes the scratch directory on every exit path
    let scratch = tempfile::Builder::new()
        .prefix("temp_subs")
        .tempdir_in(video_dir)
        .into_diagnostic()
        .wrap_err("Could not create subtitle scratch directory")?;

    downloader.download_subtitles(
        scratch.path(),
        &config.url,
        &langs.join(","),
        &config.fetch_options(),
    )?;

    let mut produced = Vec::new();
    for (lang, target) in targets {
        let fetched = scratch.path().join(format!("subs.{lang}.vtt"));
        if !fetched.exists() {
            let _ = progress.send(ProgressEvent::warn(format!(
                "No {lang} subtitle track found, skipping"
            )));
            continue;
        }

        if fs::rename(&fetched, &target).is_err() {
            debug!("Moving subtitle file failed, falling back to copying");
            fs::copy(&fetched, &target)
                .into_diagnostic()
                .wrap_err("Could not move subtitle file out of scratch")?;
        }

        // A file that cannot be realigned is still usable as-is
        match realign_subtitle_file(&target, span) {
            Ok(stats) => {
                info!(
                    "Realigned {lang} subtitles: kept {}/{} cues",
                    stats.kept_cues, stats.total_cues
                );
                let _ = progress.send(ProgressEvent::info(format!(
                    "{lang} subtitles ready: {}",
                    target.display()
                )));
            }
            Err(err) => {
                let report = miette::Report::from(err);
                warn!("Could not realign {lang} subtitles: {report}");
                let _ = progress.send(ProgressEvent::warn(format!(
                    "{lang} subtitle timestamps left unaligned: {report}"
                )));
            }
        }

        produced.push((lang, target));
    }

    if produced.is_empty() {
        let _ = progress.send(ProgressEvent::warn(
            "No usable subtitle track found".to_owned(),
        ));
    }

    Ok(produced)
}

/// Rewrite a subtitle file in place so its timestamps line up with the
/// trimmed video.
pub fn realign_subtitle_file(path: &Path, span: &TimeSpan) -> Result<RealignStats> {
    let content = fs::read_to_string(path)
        .into_diagnostic()
        .wrap_err("Could not read subtitle file")?;

    let (rewritten, stats) = realign(&content, span.start().seconds(), span.end().seconds());

    fs::write(path, rewritten)
        .into_diagnostic()
        .wrap_err("Could not write realigned subtitle file")?;

    Ok(stats)
}

/// The realignment itself.
///
/// The header region is preserved verbatim. A cue survives iff its
/// interval overlaps `[start_offset, end_offset]`; kept cues are shifted
/// by `-start_offset` with negative results clamped to zero, so a cue
/// straddling the window start is truncated rather than given a negative
/// timestamp. Caption lines of dropped cues are dropped with them, and
/// cue settings after the arrow are carried through untouched.
fn realign(content: &str, start_offset: f64, end_offset: f64) -> (String, RealignStats) {
    let mut out = String::new();
    let mut emitted = 0usize;
    let mut skip_block = false;
    let mut in_header = true;
    let mut total_cues = 0;
    let mut kept_cues = 0;

    let mut push = |out: &mut String, line: &str| {
        out.push_str(line);
        out.push('\n');
    };

    for line in content.lines() {
        if in_header {
            let is_header_line = line.trim().is_empty()
                || line.starts_with("WEBVTT")
                || line.starts_with("Kind:")
                || line.starts_with("Language:");
            if is_header_line {
                push(&mut out, line);
                emitted += 1;
                if line.trim().is_empty() && emitted > 1 {
                    in_header = false;
                }
                continue;
            }
        }

        if let Some(cap) = cue_line().captures(line) {
            total_cues += 1;
            let cue_start = vtt_to_seconds(&cap[1]);
            let cue_end = vtt_to_seconds(&cap[2]);

            if cue_end < start_offset || cue_start > end_offset {
                skip_block = true;
                continue;
            }

            kept_cues += 1;
            let shifted_start = (cue_start - start_offset).max(0.0);
            let shifted_end = (cue_end - start_offset).max(0.0);
            push(
                &mut out,
                &format!(
                    "{} --> {}{}",
                    vtt_timestamp(shifted_start),
                    vtt_timestamp(shifted_end),
                    &cap[3]
                ),
            );
            skip_block = false;
        } else if !skip_block {
            push(&mut out, line);
        }
    }

    (
        out,
        RealignStats {
            total_cues,
            kept_cues,
        },
    )
}

fn vtt_to_seconds(timestamp: &str) -> f64 {
    let mut seconds = 0.0;
    for part in timestamp.split(':') {
        seconds = 60.0 * seconds + part.parse::<f64>().unwrap_or(0.0);
    }
    seconds
}

/// Composite a realigned subtitle file into the trimmed video.
///
/// Failure here is non-fatal to the job: the plain trimmed video stays a
/// valid artifact either way.
pub fn burn_in(
    transformer: &dyn StreamTransformer,
    video: &Path,
    subtitle: &Path,
    video_dir: &Path,
    span: &TimeSpan,
    progress: &Sender<ProgressEvent>,
) -> Result<PathBuf> {
    let output = video_dir.join(ContentKind::VideoWithSubtitles.artifact_name(span));
    if artifact_exists(&output) {
        let _ = progress.send(ProgressEvent::info(format!(
            "Subtitled video already exists, skipping burn-in: {}",
            output.display()
        )));
        return Ok(output);
    }

    let _ = progress.send(ProgressEvent::info(format!(
        "Burning subtitles into {}",
        video.display()
    )));

    match transformer.burn_subtitles(video, subtitle, &output)? {
        BurnOutcome::Rendered => {
            let _ = progress.send(ProgressEvent::info(format!(
                "Subtitled video ready: {}",
                output.display()
            )));
        }
        BurnOutcome::SoftMuxed => {
            let _ = progress.send(ProgressEvent::warn(
                "Subtitle filter unavailable; muxed a selectable subtitle track instead"
                    .to_owned(),
            ));
        }
    }

    if !artifact_exists(&output) {
        return Err(Error::Report(miette!("Burn-in produced no output file")));
    }

    Ok(output)
}

fn dedup_langs(langs: &[String]) -> Vec<String> {
    let mut seen = Vec::new();
    for lang in langs {
        let lang = lang.trim();
        if !lang.is_empty() && !seen.iter().any(|kept| kept == lang) {
            seen.push(lang.to_owned());
        }
    }
    seen
}
