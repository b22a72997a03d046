//! Candidate page URLs for a channel handle.

/// Ordered URL variants that may serve a channel's community posts.
///
/// The order is a fixed priority: handle-path community page, handle-path
/// posts page, legacy custom-URL community page, channel-id community page.
#[must_use]
pub fn candidate_urls(base_url: &str, handle: &str) -> Vec<String> {
    let base = base_url.trim_end_matches('/');
    let handle = clean_handle(handle);
    let bare = handle.trim_start_matches('@');

    vec![
        format!("{base}/{handle}/community"),
        format!("{base}/{handle}/posts"),
        format!("{base}/c/{bare}/community"),
        format!("{base}/channel/{bare}/community"),
    ]
}

/// The channel's main page, used by the degraded fallback.
#[must_use]
pub fn main_page_url(base_url: &str, handle: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), clean_handle(handle))
}

fn clean_handle(handle: &str) -> &str {
    handle.trim().trim_matches('/')
}
