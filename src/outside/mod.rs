mod command;
mod ffmpeg;
mod ytdl;

pub use command::{
    assert_success_command, run_command, run_with_retry, Capture, FFMPEG, FFPROBE,
    FFXXX_DEFAULT_ARGS, YT_DL, YT_DLP,
};
pub use ffmpeg::{BurnOutcome, Ffmpeg, StreamKind, StreamTransformer};
pub use ytdl::{FetchOptions, StreamDownloader, Ytdl};
