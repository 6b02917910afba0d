//! Parsing of the render CLI's textual output.

use std::sync::LazyLock;

use regex::Regex;

/// `+ S3  https://s3.<region>.amazonaws.com/<bucket>/<key>`
static RESULT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\+\s*S3\s+(https?://\S+)").expect("valid result line pattern")
});

/// Any bare S3 object URL, used when the marker line is absent.
static S3_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://(?:s3[.-][A-Za-z0-9.-]*|[A-Za-z0-9.-]+\.s3[.-][A-Za-z0-9.-]*)amazonaws\.com/\S+")
        .expect("valid s3 url pattern")
});

static COST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)estimated\s+cost:?\s*\$\s*([0-9]*\.?[0-9]+)").expect("valid cost pattern")
});

static PERCENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([0-9]{1,3}(?:\.[0-9]+)?)\s*%").expect("valid percent pattern")
});

/// Location of the rendered artifact.
pub fn parse_result_url(output: &str) -> Option<String> {
    RESULT_LINE
        .captures(output)
        .and_then(|caps| caps.get(1))
        .or_else(|| S3_URL.find(output))
        .map(|m| strip_trailing_punctuation(m.as_str()).to_string())
}

/// Estimated render cost in USD.
pub fn parse_cost(output: &str) -> Option<f64> {
    COST.captures_iter(output)
        .last()
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|cost| cost.is_finite())
}

/// Last percentage on a progress line, floored and clamped to 100.
pub fn parse_progress(line: &str) -> Option<u8> {
    PERCENT
        .captures_iter(line)
        .last()
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map(|pct| pct.clamp(0.0, 100.0).floor() as u8)
}

fn strip_trailing_punctuation(url: &str) -> &str {
    url.trim_end_matches(['.', ',', ')', '"', '\''])
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Rendering frames 100%
Encoded video 100%
+ S3  https://s3.us-east-1.amazonaws.com/bucket/key
Estimated cost $0.0123
";

    #[test]
    fn test_parses_result_and_cost() {
        assert_eq!(
            parse_result_url(SAMPLE).as_deref(),
            Some("https://s3.us-east-1.amazonaws.com/bucket/key")
        );
        assert_eq!(parse_cost(SAMPLE), Some(0.0123));
    }

    #[test]
    fn test_falls_back_to_bare_url() {
        let out = "Done! Output at https://renders.s3.eu-west-1.amazonaws.com/out/video.mp4.";
        assert_eq!(
            parse_result_url(out).as_deref(),
            Some("https://renders.s3.eu-west-1.amazonaws.com/out/video.mp4")
        );
    }

    #[test]
    fn test_missing_values() {
        assert_eq!(parse_result_url("Render failed"), None);
        assert_eq!(parse_cost("no cost reported"), None);
        assert_eq!(parse_cost("Estimated cost: $ 1.5"), Some(1.5));
    }

    #[test]
    fn test_progress_lines() {
        assert_eq!(parse_progress("Rendering frames 42%"), Some(42));
        assert_eq!(parse_progress("Chunks 3/10 (30.7%) encoded 12%"), Some(12));
        assert_eq!(parse_progress("150%"), Some(100));
        assert_eq!(parse_progress("Getting composition"), None);
    }
}
