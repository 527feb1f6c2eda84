use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;
use url::Url;

lazy_static! {
    static ref URL_SCHEME_REGEX: Regex = Regex::new(r"^(?:https?://)?").unwrap();
    static ref VIDEO_ID_REGEX: Regex = Regex::new(r"^[a-zA-Z0-9_-]{11}$").unwrap();
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MediaError {
    #[error("Media reference does not point to a playable video")]
    Unresolvable,
}

/// Extracts the YouTube video id from any of the common URL forms.
///
/// Supported: `youtube.com/watch?v=`, `youtube.com/v/`, `youtube.com/embed/`,
/// `youtube.com/shorts/`, `youtu.be/` and `youtu.be/shorts/`.
pub fn extract_video_id(media_ref: &str) -> Result<String, MediaError> {
    let query = URL_SCHEME_REGEX.replace(media_ref.trim(), "https://");
    let url = Url::parse(&query).map_err(|_| MediaError::Unresolvable)?;

    let host = url.host_str().ok_or(MediaError::Unresolvable)?;
    let mut segments = url.path_segments().into_iter().flatten();

    let candidate = if host == "youtube.com" || host.ends_with(".youtube.com") {
        match segments.next() {
            Some("watch") => url
                .query_pairs()
                .find(|(k, _)| k == "v")
                .map(|(_, v)| v.into_owned()),
            Some("v" | "embed" | "shorts") => segments.next().map(str::to_string),
            _ => None,
        }
    } else if host == "youtu.be" {
        match segments.next() {
            Some("shorts") => segments.next().map(str::to_string),
            other => other.map(str::to_string),
        }
    } else {
        None
    };

    candidate
        .filter(|id| VIDEO_ID_REGEX.is_match(id))
        .ok_or(MediaError::Unresolvable)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_video_id_extraction() {
        let cases = [
            "https://www.youtube.com/watch?v=JwRWf3ho4B8&list=PL23A657E4BD523733&index=45",
            "www.youtube.com/watch?v=JwRWf3ho4B8&feature=youtu.be",
            "https://music.youtube.com/watch?v=JwRWf3ho4B8",
            "https://youtube.com/v/JwRWf3ho4B8",
            "https://www.youtube.com/embed/JwRWf3ho4B8",
            "https://youtube.com/shorts/JwRWf3ho4B8",
            "youtu.be/JwRWf3ho4B8",
            "https://youtu.be/shorts/JwRWf3ho4B8",
        ];

        for case in cases {
            assert_eq!(extract_video_id(case).as_deref(), Ok("JwRWf3ho4B8"), "{case}");
        }
    }

    #[test]
    fn test_unresolvable_references() {
        assert!(extract_video_id("https://www.youtube.com/").is_err());
        assert!(extract_video_id("https://www.youtube.com/@Ayrun").is_err());
        assert!(extract_video_id("youtube.com/watch?v=short").is_err());
        assert!(extract_video_id("https://vimeo.com/123456789").is_err());
        assert!(extract_video_id("https://notyoutube.com/watch?v=JwRWf3ho4B8").is_err());
        assert!(extract_video_id("https://youtube.com.evil.net/watch?v=JwRWf3ho4B8").is_err());
        assert!(extract_video_id("not a url at all").is_err());
    }
}
