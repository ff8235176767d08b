//! Non-fatal conditions raised while reading or writing.
//!
//! A diagnostic never aborts an operation. Each one is logged through
//! `tracing` at the point it is raised and also returned to the caller in the
//! operation's result (`Recording::diagnostics`, `WriteReport::diagnostics`),
//! so callers without a subscriber installed still see them.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// A header value did not fit its fixed-width field and was cut.
    FieldTruncated {
        field: &'static str,
        width: usize,
        value: String,
    },
    /// Some names of a name-list selector are not channel labels.
    ChannelsNotFound(Vec<String>),
    /// Offset correction was requested for an integer output type and was disabled.
    OffsetIgnoredForIntegerOutput,
    /// The data (or declared digital range) of a channel does not fit the sample word.
    OverflowRisk {
        channel: String,
        digital_low: f64,
        digital_high: f64,
    },
    /// Too many samples of the first record would be clamped on write.
    ClippingRisk { fraction: f64, threshold: f64 },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::FieldTruncated { field, width, value } => {
                write!(f, "field '{}' truncated to {} bytes: {:?}", field, width, value)
            }
            Diagnostic::ChannelsNotFound(names) => {
                write!(f, "channels not found: {}", names.join(", "))
            }
            Diagnostic::OffsetIgnoredForIntegerOutput => {
                write!(f, "offset correction is not applied to integer output")
            }
            Diagnostic::OverflowRisk {
                channel,
                digital_low,
                digital_high,
            } => write!(
                f,
                "channel '{}' spans digital values {}..{} which will overflow the sample word",
                channel, digital_low, digital_high
            ),
            Diagnostic::ClippingRisk { fraction, threshold } => write!(
                f,
                "{:.1}% of the first record's samples will be clipped (threshold {:.1}%)",
                fraction * 100.0,
                threshold * 100.0
            ),
        }
    }
}

/// Logs a diagnostic and appends it to `sink`.
pub(crate) fn raise(sink: &mut Vec<Diagnostic>, diagnostic: Diagnostic) {
    tracing::warn!("{}", diagnostic);
    sink.push(diagnostic);
}
