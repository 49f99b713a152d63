//! Paste payload classification.

/// What the platform clipboard handed us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipboardPayload {
    /// A file such as a screenshot, with its MIME type.
    Image { bytes: Vec<u8>, mime: String },
    Text(String),
}

const IMAGE_EXTENSIONS: [&str; 8] = ["png", "jpg", "jpeg", "gif", "webp", "svg", "bmp", "avif"];

/// Returns the trimmed URL if `text` is an `http(s)` link to an image file.
/// Query strings and fragments are ignored when checking the extension.
pub fn image_url(text: &str) -> Option<&str> {
    let url = text.trim();
    let lower = url.to_ascii_lowercase();
    let rest = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"))?;
    if rest.contains(char::is_whitespace) {
        return None;
    }
    let path = rest.split(['?', '#']).next().unwrap_or_default();
    let (host, path) = path.split_once('/')?;
    if host.is_empty() {
        return None;
    }
    let (_, ext) = path.rsplit_once('.')?;
    IMAGE_EXTENSIONS.contains(&ext).then_some(url)
}

/// File extension used when storing an uploaded image of this MIME type.
pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    match mime.trim().to_ascii_lowercase().as_str() {
        "image/png" => Some("png"),
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/svg+xml" => Some("svg"),
        "image/bmp" => Some("bmp"),
        "image/avif" => Some("avif"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_urls() {
        assert_eq!(image_url("https://cdn.example.com/a/b.png"), Some("https://cdn.example.com/a/b.png"));
        assert_eq!(image_url("  http://x.io/pic.JPEG \n"), Some("http://x.io/pic.JPEG"));
        assert!(image_url("https://x.io/pic.webp?w=200#top").is_some());
    }

    #[test]
    fn test_non_image_urls() {
        assert_eq!(image_url("https://example.com/page.html"), None);
        assert_eq!(image_url("https://example.com/"), None);
        assert_eq!(image_url("ftp://example.com/a.png"), None);
        assert_eq!(image_url("just some text.png"), None);
        assert_eq!(image_url("https://example.com/a.png b"), None);
        assert_eq!(image_url("https:///a.png"), None);
        // Extension hidden in the query does not count.
        assert_eq!(image_url("https://example.com/view?file=a.png"), None);
    }

    #[test]
    fn test_mime_extensions() {
        assert_eq!(extension_for_mime("image/png"), Some("png"));
        assert_eq!(extension_for_mime("IMAGE/JPEG"), Some("jpg"));
        assert_eq!(extension_for_mime("application/pdf"), None);
    }
}
