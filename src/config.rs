use std::path::{Path, PathBuf};

use config::{Config, File};
use miette::{Context, IntoDiagnostic, Result};
use serde::Deserialize;

use crate::{outside::FetchOptions, types::Bitrate};

/// Format selector handed to the fetch tool for video.
/// Capped at 480p: taller fetches through a proxy fail far more often.
pub const DEFAULT_VIDEO_QUALITY: &str = "bestvideo[height<=480]+bestaudio/best[height<=480]";

/// Everything one job needs to know, immutable once accepted.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Source URL the identifier is extracted from.
    pub url: String,
    /// Segment start, as `HH:MM:SS`, `MM:SS`, or bare seconds.
    pub start_time: String,
    /// Segment end, same forms. Not validated against `start_time`.
    pub end_time: String,
    /// Root under which per-source artifact directories are created.
    pub output_dir: PathBuf,
    pub proxy: Option<String>,
    /// Ordered language codes; duplicates are dropped downstream.
    pub subtitle_langs: Vec<String>,
    pub download_video: bool,
    pub download_audio: bool,
    pub download_subtitles: bool,
    pub burn_subtitles: bool,
    pub video_quality: String,
    pub audio_bitrate: Bitrate,
    /// Total attempts per external fetch invocation.
    pub max_retries: u32,
    /// Netscape-format cookie file for age- or login-gated sources.
    pub cookies_file: Option<PathBuf>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            start_time: String::new(),
            end_time: String::new(),
            output_dir: PathBuf::from("downloads"),
            proxy: None,
            subtitle_langs: vec!["zh".to_owned(), "en".to_owned()],
            download_video: true,
            download_audio: true,
            download_subtitles: true,
            burn_subtitles: true,
            video_quality: DEFAULT_VIDEO_QUALITY.to_owned(),
            audio_bitrate: Bitrate::default(),
            max_retries: 3,
            cookies_file: None,
        }
    }
}

impl JobConfig {
    /// Load a TOML or JSON config file, merging its values over the defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let cfg = Config::builder()
            .add_source(File::from(path))
            .build()
            .into_diagnostic()
            .wrap_err("Could not read config file")?;

        cfg.try_deserialize()
            .into_diagnostic()
            .wrap_err("Config file did not match the expected shape")
    }

    /// The per-invocation knobs every fetch call shares.
    pub fn fetch_options(&self) -> FetchOptions<'_> {
        FetchOptions {
            proxy: self.proxy.as_deref(),
            cookies: self.cookies_file.as_deref(),
            max_retries: self.max_retries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_request_model() {
        let config = JobConfig::default();
        assert_eq!(config.subtitle_langs, ["zh", "en"]);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.video_quality, DEFAULT_VIDEO_QUALITY);
        assert_eq!(config.audio_bitrate.to_string(), "192K");
        assert!(config.burn_subtitles);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.toml");
        std::fs::write(
            &path,
            "url = \"https://youtu.be/abc\"\nmax_retries = 5\nsubtitle_langs = [\"en\"]\n",
        )
        .unwrap();

        let config = JobConfig::from_file(&path).unwrap();
        assert_eq!(config.url, "https://youtu.be/abc");
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.subtitle_langs, ["en"]);
        // untouched fields keep their defaults
        assert!(config.download_video);
        assert_eq!(config.video_quality, DEFAULT_VIDEO_QUALITY);
    }
}
