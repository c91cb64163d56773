use super::types::Variant;
use regex::Regex;
use std::sync::LazyLock;

static NUMBER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("static regex is valid"));

/// First run of decimal digits in the variant's source URL.
pub fn quality_of(variant: &Variant) -> Option<u64> {
    NUMBER_REGEX
        .find(&variant.source_url)
        .and_then(|m| m.as_str().parse().ok())
}

/// Sorts video variants best first. Variants without a quality go last;
/// ties keep their manifest order.
pub fn rank_videos(videos: &mut [Variant]) {
    videos.sort_by_key(|v| std::cmp::Reverse(quality_of(v).unwrap_or(0)));
}
