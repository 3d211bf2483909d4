mod bitrate;
mod content;
mod source_id;
mod timecode;

pub use bitrate::Bitrate;
pub use content::ContentKind;
pub use source_id::SourceId;
pub use timecode::{vtt_timestamp, TimeSpan, Timecode};
