//! Fetch, trim, and subtitle time-bounded segments of web videos.
//!
//! The pipeline wraps two external tools — a fetch tool (`yt-dlp`) and a
//! media-processing tool family (`ffmpeg`/`ffprobe`) — behind an
//! idempotent, retry-tolerant orchestrator. Given a source URL and a time
//! range it fetches the full media, trims it locally to the exact span,
//! realigns subtitle timestamps to the trimmed timeline, and optionally
//! burns subtitles into the video.
//!
//! The crate is a library: the surrounding task/API layer constructs a
//! [`JobConfig`], injects a [`progress::ProgressSink`] for milestone
//! messages, and calls [`Pipeline::process_job`]. Artifacts land under
//! `<output root>/<source id>/` with names derived from the requested
//! span, and a job re-run against existing artifacts performs no work.

pub mod config;
pub mod error;
pub mod io;
pub mod logging;
pub mod outside;
pub mod pipeline;
pub mod progress;
pub mod store;
pub mod types;

pub use config::JobConfig;
pub use error::{Error, Result};
pub use outside::{Ffmpeg, StreamDownloader, StreamTransformer, Ytdl};
pub use pipeline::{JobResult, Pipeline};
