//! Mapping of render failures to user-facing messages.

use std::fmt;

const MAX_RAW_STDERR: usize = 500;
const MAX_DETAIL: usize = 300;

/// Broad cause of a failed render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    AccessDenied,
    InvalidCredentials,
    RateLimited,
    NotFound,
    Billing,
    Timeout,
    Unknown,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::AccessDenied => "access_denied",
            FailureCategory::InvalidCredentials => "invalid_credentials",
            FailureCategory::RateLimited => "rate_limited",
            FailureCategory::NotFound => "not_found",
            FailureCategory::Billing => "billing",
            FailureCategory::Timeout => "timeout",
            FailureCategory::Unknown => "unknown",
        }
    }

    /// Transient failures are worth retrying later.
    pub fn is_transient(&self) -> bool {
        matches!(self, FailureCategory::RateLimited | FailureCategory::Timeout)
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure with its category and the message stored on the job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedFailure {
    pub category: FailureCategory,
    pub message: String,
}

impl ClassifiedFailure {
    pub fn new(category: FailureCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }

    pub fn timeout(secs: u64) -> Self {
        Self::new(
            FailureCategory::Timeout,
            format!(
                "Render timed out after {} seconds. Please try again in a few minutes.",
                secs
            ),
        )
    }

    /// Unclassified failure with a caller-supplied reason.
    pub fn unknown(reason: impl fmt::Display) -> Self {
        Self::new(FailureCategory::Unknown, format!("Render failed: {}", reason))
    }
}

struct Rule {
    category: FailureCategory,
    markers: &'static [&'static str],
    /// Only matched against stderr
    stderr_only: bool,
}

const RULES: &[Rule] = &[
    Rule {
        category: FailureCategory::AccessDenied,
        markers: &["AccessDenied"],
        stderr_only: false,
    },
    Rule {
        category: FailureCategory::InvalidCredentials,
        markers: &[
            "InvalidClientTokenId",
            "UnrecognizedClientException",
            "SignatureDoesNotMatch",
            "security token included in the request is invalid",
        ],
        stderr_only: false,
    },
    Rule {
        category: FailureCategory::RateLimited,
        markers: &[
            "TooManyRequestsException",
            "Rate Exceeded",
            "ThrottlingException",
            "ConcurrentInvocationLimitExceeded",
        ],
        stderr_only: false,
    },
    Rule {
        category: FailureCategory::NotFound,
        markers: &["ResourceNotFoundException", "Function not found", "NoSuchBucket"],
        stderr_only: false,
    },
    Rule {
        category: FailureCategory::Billing,
        markers: &["OptInRequired", "SubscriptionRequiredException"],
        stderr_only: false,
    },
    Rule {
        category: FailureCategory::Billing,
        markers: &["billing", "payment"],
        stderr_only: true,
    },
];

/// Classify a failed render from its captured output.
///
/// Rules are checked in order against stderr, then stdout. Without a match
/// the first part of stderr is surfaced as-is.
pub fn classify_failure(stderr: &str, stdout: &str) -> ClassifiedFailure {
    for rule in RULES {
        let sources = [stderr, stdout];
        let sources = if rule.stderr_only { &sources[..1] } else { &sources[..] };
        for &text in sources {
            if let Some(detail) = find_marker(text, rule.markers) {
                return ClassifiedFailure::new(rule.category, message_for(rule.category, &detail));
            }
        }
    }

    let raw = stderr.trim();
    if raw.is_empty() {
        ClassifiedFailure::new(FailureCategory::Unknown, "Render failed with an unknown error")
    } else {
        ClassifiedFailure::unknown(truncate(raw, MAX_RAW_STDERR))
    }
}

fn message_for(category: FailureCategory, detail: &str) -> String {
    match category {
        FailureCategory::AccessDenied => format!("AWS Access Denied: {}", detail),
        FailureCategory::InvalidCredentials => format!("Invalid AWS credentials: {}", detail),
        FailureCategory::RateLimited => {
            "AWS rate limit exceeded. Please try again in a few minutes.".to_string()
        }
        FailureCategory::NotFound => format!("Render function or bucket not found: {}", detail),
        FailureCategory::Billing => format!("AWS billing issue: {}", detail),
        FailureCategory::Timeout | FailureCategory::Unknown => format!("Render failed: {}", detail),
    }
}

/// Case-insensitive marker search; returns the detail of the first hit.
///
/// The detail is the text after the first `:` following the marker on the
/// same line, or the whole line when there is none.
fn find_marker(text: &str, markers: &[&str]) -> Option<String> {
    for line in text.lines() {
        let lowered = line.to_ascii_lowercase();
        for marker in markers {
            let Some(start) = lowered.find(&marker.to_ascii_lowercase()) else {
                continue;
            };
            let after = &line[start + marker.len()..];
            let detail = after
                .split_once(':')
                .map(|(_, rest)| rest.trim())
                .filter(|rest| !rest.is_empty())
                .unwrap_or_else(|| line.trim());
            return Some(truncate(detail, MAX_DETAIL));
        }
    }
    None
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
