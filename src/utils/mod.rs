use url::Url;

/// Checks that `s` is an absolute URL with a host.
pub fn is_url(s: &str) -> bool {
    Url::parse(s).is_ok_and(|u| !u.scheme().is_empty() && u.host_str().is_some())
}

pub fn extract_urls(content: &str) -> Vec<String> {
    content
        .split_whitespace()
        .map(|word| word.trim_start_matches('<').trim_end_matches('>'))
        .filter(|word| word.starts_with("http://") || word.starts_with("https://"))
        .map(|word| word.to_string())
        .collect()
}

/// Appends the post link to `text` unless it already mentions it.
pub fn add_link_if_needed(text: &str, link: &str) -> String {
    let text = text.trim();
    if text.contains(link) {
        return text.to_string();
    }
    if text.is_empty() {
        return link.to_string();
    }
    format!("{text}\n\n{link}")
}

/// Preview URLs in listings come HTML-escaped.
pub fn unescape_html(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}

/// Cuts `s` to at most `max` characters, marking the cut with an ellipsis.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}
