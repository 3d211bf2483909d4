use std::fmt::Display;

use super::TimeSpan;

/// The artifact classes one job can produce.
///
/// Together with a [`TimeSpan`] a kind maps to exactly one filename inside
/// the source's video directory. That mapping is the idempotency boundary:
/// a non-empty file at the derived path means the work is already done.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ContentKind {
    Video,
    Audio,
    /// One subtitle track, tagged with its language code.
    Subtitles(String),
    VideoWithSubtitles,
}

impl ContentKind {
    /// Deterministic artifact filename for this kind over the given span.
    ///
    /// Derived purely from (kind, span), so concurrent siblings of one job
    /// can never collide on a path.
    pub fn artifact_name(&self, span: &TimeSpan) -> String {
        let slug = span.slug();
        match self {
            ContentKind::Video => format!("segment_{slug}.mp4"),
            ContentKind::Audio => format!("audio_{slug}.mp3"),
            ContentKind::Subtitles(lang) => format!("subtitles_{slug}.{lang}.vtt"),
            ContentKind::VideoWithSubtitles => format!("segment_{slug}_with_subs.mp4"),
        }
    }
}

impl Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentKind::Video => f.write_str("video"),
            ContentKind::Audio => f.write_str("audio"),
            ContentKind::Subtitles(lang) => write!(f, "subtitles({lang})"),
            ContentKind::VideoWithSubtitles => f.write_str("video_with_subtitles"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_names_are_filesystem_safe() {
        let span = TimeSpan::new("0:10", "0:30").unwrap();
        assert_eq!(
            ContentKind::Video.artifact_name(&span),
            "segment_00_00_10-00_00_30.mp4"
        );
        assert_eq!(
            ContentKind::Audio.artifact_name(&span),
            "audio_00_00_10-00_00_30.mp3"
        );
        assert_eq!(
            ContentKind::Subtitles("en".into()).artifact_name(&span),
            "subtitles_00_00_10-00_00_30.en.vtt"
        );
        assert_eq!(
            ContentKind::VideoWithSubtitles.artifact_name(&span),
            "segment_00_00_10-00_00_30_with_subs.mp4"
        );
        for kind in [ContentKind::Video, ContentKind::Subtitles("en".into())] {
            assert!(!kind.artifact_name(&span).contains(':'));
        }
    }
}
