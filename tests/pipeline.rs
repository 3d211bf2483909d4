use std::{
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use tempfile::TempDir;
use tubesnip::config::JobConfig;
use tubesnip::error::Result;
use tubesnip::outside::{
    BurnOutcome, FetchOptions, StreamDownloader, StreamKind, StreamTransformer,
};
use tubesnip::pipeline::{fetch_audio, Pipeline};
use tubesnip::progress::{ProgressHub, ProgressLevel, ProgressSink};
use tubesnip::types::{Bitrate, ContentKind, TimeSpan, Timecode};

const SAMPLE_VTT: &str = "\
WEBVTT
Kind: captions
Language: en

00:00:12.000 --> 00:00:15.000
inside the window

00:01:00.000 --> 00:01:05.000
past the window
";

/// Downloader double: writes placeholder files where yt-dlp would and
/// records which fetches actually happened.
#[derive(Default)]
struct FakeDownloader {
    calls: Mutex<Vec<&'static str>>,
    missing_langs: Vec<String>,
    panic_on_subtitles: bool,
}

impl FakeDownloader {
    fn count(&self, name: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| **call == name)
            .count()
    }

    fn reset(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn resolve_template(dest: &Path, ext: &str) -> PathBuf {
        PathBuf::from(dest.to_string_lossy().replace(".%(ext)s", ext))
    }
}

impl StreamDownloader for FakeDownloader {
    fn download_video(
        &self,
        dest: &Path,
        _url: &str,
        _quality: &str,
        _opts: &FetchOptions,
    ) -> Result<()> {
        self.calls.lock().unwrap().push("download_video");
        fs::write(Self::resolve_template(dest, ".mp4"), b"raw merged video").unwrap();
        Ok(())
    }

    fn download_audio(
        &self,
        dest: &Path,
        _url: &str,
        _bitrate: Bitrate,
        _opts: &FetchOptions,
    ) -> Result<()> {
        self.calls.lock().unwrap().push("download_audio");
        fs::write(Self::resolve_template(dest, ".mp3"), b"raw audio").unwrap();
        Ok(())
    }

    fn download_subtitles(
        &self,
        scratch: &Path,
        _url: &str,
        langs: &str,
        _opts: &FetchOptions,
    ) -> Result<()> {
        self.calls.lock().unwrap().push("download_subtitles");
        if self.panic_on_subtitles {
            panic!("subtitle fetch blew up");
        }
        for lang in langs.split(',') {
            if self.missing_langs.iter().any(|missing| missing == lang) {
                continue;
            }
            fs::write(scratch.join(format!("subs.{lang}.vtt")), SAMPLE_VTT).unwrap();
        }
        Ok(())
    }
}

/// Transformer double: every transform writes a non-empty output file.
#[derive(Debug, Default)]
struct FakeTransformer {
    calls: Mutex<Vec<&'static str>>,
    fail_extract: bool,
    filter_unavailable: bool,
}

impl FakeTransformer {
    fn count(&self, name: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| **call == name)
            .count()
    }

    fn reset(&self) {
        self.calls.lock().unwrap().clear();
    }
}

impl StreamTransformer for FakeTransformer {
    fn trim_video(
        &self,
        _input: &Path,
        output: &Path,
        _start: &Timecode,
        _duration_seconds: f64,
        _with_audio: bool,
    ) -> Result<()> {
        self.calls.lock().unwrap().push("trim_video");
        fs::write(output, b"trimmed video").unwrap();
        Ok(())
    }

    fn trim_audio(
        &self,
        _input: &Path,
        output: &Path,
        _start: &Timecode,
        _duration_seconds: f64,
        _bitrate: Bitrate,
    ) -> Result<()> {
        self.calls.lock().unwrap().push("trim_audio");
        fs::write(output, b"trimmed audio").unwrap();
        Ok(())
    }

    fn extract_audio(&self, _video: &Path, output: &Path, _bitrate: Bitrate) -> Result<()> {
        self.calls.lock().unwrap().push("extract_audio");
        if self.fail_extract {
            return Err(tubesnip::Error::CommandFailed {
                program: "ffmpeg".to_owned(),
                stderr: "no audio track to extract".to_owned(),
            });
        }
        fs::write(output, b"extracted audio").unwrap();
        Ok(())
    }

    fn has_stream(&self, _input: &Path, _kind: StreamKind) -> Result<bool> {
        self.calls.lock().unwrap().push("has_stream");
        Ok(true)
    }

    fn burn_subtitles(
        &self,
        _video: &Path,
        _subtitles: &Path,
        output: &Path,
    ) -> Result<BurnOutcome> {
        self.calls.lock().unwrap().push("burn_subtitles");
        fs::write(output, b"subtitled video").unwrap();
        if self.filter_unavailable {
            Ok(BurnOutcome::SoftMuxed)
        } else {
            Ok(BurnOutcome::Rendered)
        }
    }
}

#[derive(Default)]
struct CollectingSink(Mutex<Vec<(ProgressLevel, String)>>);

impl ProgressSink for CollectingSink {
    fn report(&self, level: ProgressLevel, message: &str) {
        self.0.lock().unwrap().push((level, message.to_owned()));
    }
}

impl CollectingSink {
    fn messages_at(&self, level: ProgressLevel) -> Vec<String> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, message)| message.clone())
            .collect()
    }
}

fn job_config(root: &TempDir) -> JobConfig {
    JobConfig {
        url: "https://youtube.com/watch?v=ABC123".to_owned(),
        start_time: "0:10".to_owned(),
        end_time: "0:30".to_owned(),
        output_dir: root.path().to_path_buf(),
        subtitle_langs: vec!["en".to_owned()],
        ..JobConfig::default()
    }
}

fn assert_non_empty(path: &Path) {
    assert!(
        path.metadata().map(|meta| meta.len() > 0).unwrap_or(false),
        "expected non-empty file at {}",
        path.display()
    );
}

#[test]
fn full_job_produces_all_four_artifacts() {
    let root = TempDir::new().unwrap();
    let downloader = FakeDownloader::default();
    let transformer = FakeTransformer::default();
    let sink = CollectingSink::default();

    let config = job_config(&root);
    let result = Pipeline::new(&downloader, &transformer)
        .process_job(&config, &sink)
        .unwrap();

    let video_dir = root.path().join("ABC123");
    for kind in [
        ContentKind::Video,
        ContentKind::Audio,
        ContentKind::Subtitles("en".to_owned()),
        ContentKind::VideoWithSubtitles,
    ] {
        let path = result.get(&kind).unwrap_or_else(|| panic!("missing {kind}"));
        assert!(path.starts_with(&video_dir));
        assert_non_empty(path);
    }

    // audio came out of the trimmed video, not a second fetch
    assert_eq!(transformer.count("extract_audio"), 1);
    assert_eq!(downloader.count("download_audio"), 0);

    // the raw fetched media did not outlive the job
    let leftovers: Vec<_> = fs::read_dir(&video_dir)
        .unwrap()
        .flatten()
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("temp_"))
        .collect();
    assert!(leftovers.is_empty(), "scratch files left behind: {leftovers:?}");
}

#[test]
fn second_run_reuses_artifacts_without_any_invocation() {
    let root = TempDir::new().unwrap();
    let downloader = FakeDownloader::default();
    let transformer = FakeTransformer::default();
    let sink = CollectingSink::default();

    let config = job_config(&root);
    let pipeline = Pipeline::new(&downloader, &transformer);
    let first = pipeline.process_job(&config, &sink).unwrap();

    downloader.reset();
    transformer.reset();

    let second = pipeline.process_job(&config, &sink).unwrap();

    assert!(downloader.calls.lock().unwrap().is_empty());
    assert!(transformer.calls.lock().unwrap().is_empty());
    for (kind, path) in first.iter() {
        assert_eq!(second.get(kind), Some(path));
    }
}

#[test]
fn unrecognized_url_is_terminal_for_the_whole_job() {
    let root = TempDir::new().unwrap();
    let downloader = FakeDownloader::default();
    let transformer = FakeTransformer::default();
    let sink = CollectingSink::default();

    let config = JobConfig {
        url: "https://example.org/some/page".to_owned(),
        ..job_config(&root)
    };

    let err = Pipeline::new(&downloader, &transformer)
        .process_job(&config, &sink)
        .unwrap_err();
    assert!(matches!(err, tubesnip::Error::NoSourceId(_)));
    assert!(downloader.calls.lock().unwrap().is_empty());
}

#[test]
fn panicking_subtitle_fetch_leaves_the_video_result_intact() {
    let root = TempDir::new().unwrap();
    let downloader = FakeDownloader {
        panic_on_subtitles: true,
        ..FakeDownloader::default()
    };
    let transformer = FakeTransformer::default();
    let sink = CollectingSink::default();

    let config = JobConfig {
        download_audio: false,
        burn_subtitles: false,
        ..job_config(&root)
    };

    let result = Pipeline::new(&downloader, &transformer)
        .process_job(&config, &sink)
        .unwrap();

    assert!(result.contains(&ContentKind::Video));
    assert!(!result.contains(&ContentKind::Subtitles("en".to_owned())));

    let errors = sink.messages_at(ProgressLevel::Error);
    assert!(
        errors.iter().any(|message| message.contains("Subtitle fetch")),
        "expected a subtitle failure message, got {errors:?}"
    );
}

#[test]
fn audio_direct_fetch_happens_exactly_once_without_a_video_artifact() {
    let root = TempDir::new().unwrap();
    let downloader = FakeDownloader::default();
    let transformer = FakeTransformer::default();
    let sink = CollectingSink::default();

    let config = JobConfig {
        download_video: false,
        download_subtitles: false,
        burn_subtitles: false,
        ..job_config(&root)
    };

    let result = Pipeline::new(&downloader, &transformer)
        .process_job(&config, &sink)
        .unwrap();

    assert!(result.contains(&ContentKind::Audio));
    assert_eq!(downloader.count("download_audio"), 1);
    assert_eq!(transformer.count("extract_audio"), 0);
}

#[test]
fn failed_extraction_falls_through_to_direct_fetch_once() {
    let root = TempDir::new().unwrap();
    let downloader = FakeDownloader::default();
    let transformer = FakeTransformer {
        fail_extract: true,
        ..FakeTransformer::default()
    };

    let config = job_config(&root);
    let span = TimeSpan::new(&config.start_time, &config.end_time).unwrap();
    let video_dir = root.path().join("ABC123");
    fs::create_dir_all(&video_dir).unwrap();
    let video = video_dir.join(ContentKind::Video.artifact_name(&span));
    fs::write(&video, b"trimmed video").unwrap();

    let hub = ProgressHub::new();
    let progress = hub.sender();
    let audio = fetch_audio(
        &downloader,
        &transformer,
        &config,
        &video_dir,
        &span,
        Some(&video),
        &progress,
    )
    .unwrap();

    assert_non_empty(&audio);
    assert_eq!(transformer.count("extract_audio"), 1);
    assert_eq!(downloader.count("download_audio"), 1);
}

#[test]
fn missing_language_partially_succeeds() {
    let root = TempDir::new().unwrap();
    let downloader = FakeDownloader {
        missing_langs: vec!["zh".to_owned()],
        ..FakeDownloader::default()
    };
    let transformer = FakeTransformer::default();
    let sink = CollectingSink::default();

    let config = JobConfig {
        subtitle_langs: vec!["zh".to_owned(), "en".to_owned()],
        download_video: false,
        download_audio: false,
        burn_subtitles: false,
        ..job_config(&root)
    };

    let result = Pipeline::new(&downloader, &transformer)
        .process_job(&config, &sink)
        .unwrap();

    assert!(result.contains(&ContentKind::Subtitles("en".to_owned())));
    assert!(!result.contains(&ContentKind::Subtitles("zh".to_owned())));

    let warnings = sink.messages_at(ProgressLevel::Warn);
    assert!(warnings.iter().any(|message| message.contains("zh")));
}

#[test]
fn soft_mux_fallback_still_counts_as_a_burned_artifact() {
    let root = TempDir::new().unwrap();
    let downloader = FakeDownloader::default();
    let transformer = FakeTransformer {
        filter_unavailable: true,
        ..FakeTransformer::default()
    };
    let sink = CollectingSink::default();

    let config = JobConfig {
        download_audio: false,
        ..job_config(&root)
    };

    let result = Pipeline::new(&downloader, &transformer)
        .process_job(&config, &sink)
        .unwrap();

    assert!(result.contains(&ContentKind::VideoWithSubtitles));
    let warnings = sink.messages_at(ProgressLevel::Warn);
    assert!(warnings
        .iter()
        .any(|message| message.contains("selectable subtitle track")));
}

#[test]
fn realigned_subtitles_match_the_trimmed_timeline() {
    let root = TempDir::new().unwrap();
    let downloader = FakeDownloader::default();
    let transformer = FakeTransformer::default();
    let sink = CollectingSink::default();

    let config = JobConfig {
        download_video: false,
        download_audio: false,
        burn_subtitles: false,
        ..job_config(&root)
    };

    let result = Pipeline::new(&downloader, &transformer)
        .process_job(&config, &sink)
        .unwrap();

    let path = result
        .get(&ContentKind::Subtitles("en".to_owned()))
        .unwrap();
    let content = fs::read_to_string(path).unwrap();

    // cue at [12,15) shifted into the [10,30) window by -10
    assert!(content.contains("00:00:02.000 --> 00:00:05.000"));
    assert!(content.contains("inside the window"));
    // cue past the window dropped with its caption
    assert!(!content.contains("past the window"));
}
