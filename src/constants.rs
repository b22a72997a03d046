//! Shared constants used across the application.

/// User agent string used for page requests.
///
/// A realistic desktop browser user agent; the community page serves a
/// stripped-down document to unknown clients.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Default site root used to build candidate URLs.
pub const DEFAULT_BASE_URL: &str = "https://www.youtube.com";

/// Permalinks are always built against the public site, never the configured base.
pub const POST_PERMALINK_PREFIX: &str = "https://www.youtube.com/post/";

/// Avatar used when neither the configuration nor the page offers one.
pub const DEFAULT_AVATAR_URL: &str = "https://yt3.ggpht.com/ytc/default_profile.jpg";

/// Maximum number of characters of post content carried in a notification.
pub const NOTIFICATION_CONTENT_LIMIT: usize = 1950;
