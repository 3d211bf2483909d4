use std::{fmt::Display, sync::OnceLock};

use regex::Regex;

/// An optional scheme and `www.` prefix
macro_rules! url_prefix {
    () => {
        r"(?:https?://)?(?:www\.)?"
    };
}
/// The identifier token itself
macro_rules! id_token {
    () => {
        r"([\w-]+)"
    };
}

/// The four supported URL shapes, tried in order. First match wins.
const WATCH: &str = concat!(url_prefix!(), r"youtube\.com/watch\?v=", id_token!());
const SHORT_LINK: &str = concat!(url_prefix!(), r"youtu\.be/", id_token!());
const EMBED: &str = concat!(url_prefix!(), r"youtube\.com/embed/", id_token!());
const SHORTS: &str = concat!(url_prefix!(), r"youtube\.com/shorts/", id_token!());

static URL_PATTERNS: OnceLock<[Regex; 4]> = OnceLock::new();

fn url_patterns() -> &'static [Regex] {
    URL_PATTERNS.get_or_init(|| {
        [
            Regex::new(WATCH).unwrap(),
            Regex::new(SHORT_LINK).unwrap(),
            Regex::new(EMBED).unwrap(),
            Regex::new(SHORTS).unwrap(),
        ]
    })
}

/// Opaque token identifying the remote media resource.
///
/// Doubles as the artifact directory name under the output root, so a URL
/// it cannot be extracted from leaves the job with nowhere to put files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceId(String);

impl SourceId {
    pub fn from_url(url: &str) -> Option<Self> {
        url_patterns()
            .iter()
            .find_map(|re| re.captures(url))
            .map(|cap| Self(cap[1].to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
