use std::fmt;

#[derive(Debug)]
pub enum EngineError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (bad coverage target, overlapping bands, etc.).
    ConfigValidation(String),
    /// Bad input shape or range on an operation. Caller's fault, recoverable.
    Validation(String),
    /// Attribute number outside the fixed 1..=7 checklist.
    UnknownAttribute { number: u8 },
    /// No rows survived population filtering. Carries the keywords that were
    /// applied so the caller can adjust config instead of guessing.
    EmptyPopulation {
        keywords: Vec<String>,
        rows_seen: usize,
        rows_dropped: usize,
    },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::Validation(msg) => write!(f, "validation error: {msg}"),
            Self::UnknownAttribute { number } => {
                write!(f, "attribute number {number} outside checklist range 1-7")
            }
            Self::EmptyPopulation { keywords, rows_seen, rows_dropped } => {
                write!(
                    f,
                    "no rows survived population filtering ({rows_seen} seen, {rows_dropped} dropped); \
                     filter keywords: [{}]",
                    keywords.join(", ")
                )
            }
        }
    }
}

impl std::error::Error for EngineError {}
