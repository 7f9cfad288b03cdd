//! Default thresholds for pattern eligibility, scoring and pruning.

/// Confirming observations a pattern needs before it can become active.
pub const MIN_OCCURRENCES: u32 = 3;

/// Accuracy a pattern needs before it can become active.
pub const MIN_ACCURACY: f64 = 0.7;

/// Confidence at or above which a caller may apply a suggestion without
/// asking the user.
pub const AUTO_APPLY_THRESHOLD: f64 = 0.9;

/// Significant description tokens kept per correction.
pub const MAX_KEYWORDS: usize = 5;

/// Minimum length, in characters, of a significant token.
pub const MIN_KEYWORD_LEN: usize = 3;

/// Optimistic read-modify-write attempts before giving up on a pattern.
pub const MAX_UPSERT_ATTEMPTS: u32 = 5;

/// Length of each of the two windows compared by the improvement trend.
pub const TREND_WINDOW_DAYS: u32 = 30;

/// Longest trend window accepted by configuration: one hundred years.
pub const MAX_TREND_WINDOW_DAYS: u32 = 36_500;

/// Accuracy floor used by scheduled prune sweeps.
pub const PRUNE_MIN_ACCURACY: f64 = 0.5;

/// Ceiling on the occurrence boost applied to accuracy.
pub const MAX_OCCURRENCE_BOOST: f64 = 1.1;

/// Per-`ln(occurrences)` slope of the occurrence boost.
pub const OCCURRENCE_BOOST_SLOPE: f64 = 0.05;

/// Correction-rate deltas smaller than this count as a stable trend.
pub const TREND_STABLE_BAND: f64 = 0.01;

/// Tokens that carry no classification signal.
pub const STOP_WORDS: &[&str] = &[
  "and", "are", "but", "for", "from", "had", "has", "have", "her", "his",
  "its", "not", "our", "per", "the", "their", "this", "that", "via", "was",
  "were", "will", "with", "you", "your", "all", "any", "can", "into", "out",
  "off", "one", "two", "inc", "ltd", "llc", "order", "payment", "purchase",
];
