//! Channel and time selection.
//!
//! Selector expressions are resolved once, against a [`Header`], into a
//! [`Selection`]: an ascending, duplicate-free list of 1-based indices. Every
//! downstream step (narrowing, decoding, encoding) consumes that single
//! representation.
//!
//! Channel indices range over the signal channels only; the BDF status channel
//! is never part of a channel selection and is requested separately.

use std::fmt;
use std::ops::RangeInclusive;

use regex::Regex;

use crate::diagnostics::{raise, Diagnostic};
use crate::error::{BdfError, Result};
use crate::header::Header;

/// Which channels to read.
#[derive(Debug, Clone)]
pub enum ChannelSelector {
    All,
    None,
    /// 1-based channel index.
    Index(usize),
    /// 1-based inclusive index range.
    Range(RangeInclusive<usize>),
    /// Channel labels; unknown labels are reported and skipped.
    Names(Vec<String>),
    /// Regular expression matched against every label.
    Pattern(Regex),
}

impl ChannelSelector {
    /// Builds a [`ChannelSelector::Pattern`] from a regular expression.
    pub fn pattern(expr: &str) -> Result<Self> {
        Ok(ChannelSelector::Pattern(Regex::new(expr)?))
    }

    pub fn names<S: AsRef<str>>(names: &[S]) -> Self {
        ChannelSelector::Names(names.iter().map(|s| s.as_ref().to_string()).collect())
    }
}

impl Default for ChannelSelector {
    fn default() -> Self {
        ChannelSelector::All
    }
}

impl fmt::Display for ChannelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelSelector::All => write!(f, "channels:all"),
            ChannelSelector::None => write!(f, "channels:none"),
            ChannelSelector::Index(i) => write!(f, "channel {}", i),
            ChannelSelector::Range(r) => write!(f, "channels {}..={}", r.start(), r.end()),
            ChannelSelector::Names(names) => write!(f, "channels {:?}", names),
            ChannelSelector::Pattern(re) => write!(f, "channel pattern /{}/", re.as_str()),
        }
    }
}

/// Which records to read.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TimeSelector {
    #[default]
    All,
    /// 1-based record index.
    Record(usize),
    /// 1-based inclusive record range.
    Records(RangeInclusive<usize>),
    /// Interval in seconds from the start of the recording.
    Seconds(f64, f64),
}

impl fmt::Display for TimeSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeSelector::All => write!(f, "records:all"),
            TimeSelector::Record(i) => write!(f, "record {}", i),
            TimeSelector::Records(r) => write!(f, "records {}..={}", r.start(), r.end()),
            TimeSelector::Seconds(a, b) => write!(f, "time {}s..{}s", a, b),
        }
    }
}

/// Resolved, immutable index set (1-based, ascending, unique).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Selection {
    indices: Vec<usize>,
}

impl Selection {
    /// Every index in `1..=count`.
    pub fn all(count: usize) -> Self {
        Selection {
            indices: (1..=count).collect(),
        }
    }

    pub fn empty() -> Self {
        Selection::default()
    }

    /// Normalizes arbitrary 1-based indices into a selection.
    pub fn from_indices(mut indices: Vec<usize>) -> Self {
        indices.sort_unstable();
        indices.dedup();
        Selection { indices }
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Zero-based positions, in ascending order.
    pub fn zero_based(&self) -> impl Iterator<Item = usize> + '_ {
        self.indices.iter().map(|&i| i - 1)
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn first(&self) -> Option<usize> {
        self.indices.first().copied()
    }

    pub fn last(&self) -> Option<usize> {
        self.indices.last().copied()
    }
}

fn check_index(expr: &dyn fmt::Display, index: usize, limit: usize) -> Result<()> {
    if index < 1 || index > limit {
        return Err(BdfError::SelectionOutOfRange {
            expr: expr.to_string(),
            limit,
        });
    }
    Ok(())
}

fn check_range(expr: &dyn fmt::Display, range: &RangeInclusive<usize>, limit: usize) -> Result<Selection> {
    check_index(expr, *range.start(), limit)?;
    check_index(expr, *range.end(), limit)?;
    if range.start() > range.end() {
        return Err(BdfError::SelectionEmpty {
            expr: expr.to_string(),
        });
    }
    Ok(Selection {
        indices: range.clone().collect(),
    })
}

/// Resolves a channel selector against the signal channels of `header`.
///
/// Returns the selection together with any diagnostics (absent names).
pub fn select_channels(
    selector: &ChannelSelector,
    header: &Header,
) -> Result<(Selection, Vec<Diagnostic>)> {
    let count = header.signal_channel_count();
    let labels = &header.labels[..count];
    let mut diagnostics = Vec::new();

    let selection = match selector {
        ChannelSelector::None => Selection::empty(),
        ChannelSelector::All => Selection::all(count),
        ChannelSelector::Index(i) => {
            check_index(selector, *i, count)?;
            Selection { indices: vec![*i] }
        }
        ChannelSelector::Range(range) => check_range(selector, range, count)?,
        ChannelSelector::Names(names) => {
            let mut present = Vec::new();
            let mut absent = Vec::new();
            for name in names {
                match labels.iter().position(|l| l == name) {
                    Some(pos) => present.push(pos + 1),
                    None => absent.push(name.clone()),
                }
            }
            if !absent.is_empty() {
                raise(&mut diagnostics, Diagnostic::ChannelsNotFound(absent));
            }
            Selection::from_indices(present)
        }
        ChannelSelector::Pattern(re) => {
            let matched = labels
                .iter()
                .enumerate()
                .filter(|(_, label)| re.is_match(label))
                .map(|(i, _)| i + 1)
                .collect();
            Selection { indices: matched }
        }
    };

    if selection.is_empty() && !matches!(selector, ChannelSelector::None) {
        return Err(BdfError::SelectionEmpty {
            expr: selector.to_string(),
        });
    }
    Ok((selection, diagnostics))
}

/// Resolves a time selector to a range of whole records.
///
/// An interval in seconds maps to records
/// `max(1, floor(start / duration)) ..= ceil(end / duration)`, so the result
/// always covers the requested interval but is not the tightest cover: the
/// leading record may hold none of it. With one-second records,
/// `Seconds(1.0, 3.0)` yields records `1..=3` although record 1 spans
/// `[0, 1)`.
pub fn select_records(selector: &TimeSelector, header: &Header) -> Result<Selection> {
    let count = header.n_data_records;
    let selection = match selector {
        TimeSelector::All => Selection::all(count),
        TimeSelector::Record(i) => {
            check_index(selector, *i, count)?;
            Selection { indices: vec![*i] }
        }
        TimeSelector::Records(range) => check_range(selector, range, count)?,
        TimeSelector::Seconds(start, end) => {
            let (start, end) = (*start, *end);
            let total = header.total_duration();
            let out_of_range = || BdfError::SelectionOutOfRange {
                expr: selector.to_string(),
                limit: count,
            };
            if !start.is_finite() || !end.is_finite() || start < 0.0 || end > total || start > end {
                return Err(out_of_range());
            }
            let duration = header.record_duration;
            let first = ((start / duration).floor() as usize).max(1);
            let last = ((end / duration).ceil() as usize).max(first).min(count);
            if first > last {
                return Err(out_of_range());
            }
            Selection {
                indices: (first..=last).collect(),
            }
        }
    };

    if selection.is_empty() {
        return Err(BdfError::SelectionEmpty {
            expr: selector.to_string(),
        });
    }
    Ok(selection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::HeaderBuilder;
    use crate::types::Format;

    fn eeg_header() -> Header {
        HeaderBuilder::new(Format::Bdf, &["Fp1", "Fp2", "C3", "Cz"])
            .n_data_records(20)
            .record_duration(1.0)
            .build()
            .unwrap()
    }

    #[test]
    fn test_pattern_keeps_header_order() {
        let header = eeg_header();
        let selector = ChannelSelector::pattern("^F").unwrap();
        let (selection, diags) = select_channels(&selector, &header).unwrap();
        assert_eq!(selection.indices(), &[1, 2]);
        assert!(diags.is_empty());
    }

    #[test]
    fn test_pattern_without_match_is_empty_error() {
        let header = eeg_header();
        let selector = ChannelSelector::pattern("^O").unwrap();
        match select_channels(&selector, &header) {
            Err(BdfError::SelectionEmpty { expr }) => assert!(expr.contains("^O")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_names_are_normalized_to_header_order() {
        let header = eeg_header();
        let selector = ChannelSelector::names(&["Cz", "Fp1", "Cz", "T7"]);
        let (selection, diags) = select_channels(&selector, &header).unwrap();
        assert_eq!(selection.indices(), &[1, 4]);
        assert_eq!(diags, vec![Diagnostic::ChannelsNotFound(vec!["T7".to_string()])]);

        let missing = ChannelSelector::names(&["T7", "T8"]);
        assert!(matches!(
            select_channels(&missing, &header),
            Err(BdfError::SelectionEmpty { .. })
        ));
    }

    #[test]
    fn test_index_bounds() {
        let header = eeg_header();
        assert!(matches!(
            select_channels(&ChannelSelector::Index(99), &header),
            Err(BdfError::SelectionOutOfRange { limit: 4, .. })
        ));
        assert!(matches!(
            select_channels(&ChannelSelector::Index(0), &header),
            Err(BdfError::SelectionOutOfRange { .. })
        ));
        let (sel, _) = select_channels(&ChannelSelector::Range(2..=3), &header).unwrap();
        assert_eq!(sel.indices(), &[2, 3]);
        assert!(select_channels(&ChannelSelector::Range(3..=5), &header).is_err());
    }

    #[test]
    fn test_symbolic_selectors() {
        let header = eeg_header();
        let (all, _) = select_channels(&ChannelSelector::All, &header).unwrap();
        assert_eq!(all.indices(), &[1, 2, 3, 4]);
        let (none, _) = select_channels(&ChannelSelector::None, &header).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_seconds_to_records() {
        let header = eeg_header();
        let sel = select_records(&TimeSelector::Seconds(2.5, 15.9), &header).unwrap();
        assert_eq!(sel.first(), Some(2));
        assert_eq!(sel.last(), Some(16));
        assert_eq!(sel.len(), 15);

        let whole = select_records(&TimeSelector::Seconds(0.0, 20.0), &header).unwrap();
        assert_eq!(whole, Selection::all(20));

        // 起始记录按 floor 取，区间外的前一条记录也会被包含
        let aligned = select_records(&TimeSelector::Seconds(1.0, 3.0), &header).unwrap();
        assert_eq!(aligned.indices(), &[1, 2, 3]);
    }

    #[test]
    fn test_seconds_out_of_range() {
        let header = eeg_header();
        for (a, b) in [(-1.0, 2.0), (5.0, 20.5), (6.0, 5.0), (f64::NAN, 1.0)] {
            assert!(matches!(
                select_records(&TimeSelector::Seconds(a, b), &header),
                Err(BdfError::SelectionOutOfRange { .. })
            ));
        }
    }

    #[test]
    fn test_record_ranges() {
        let header = eeg_header();
        let sel = select_records(&TimeSelector::Records(3..=5), &header).unwrap();
        assert_eq!(sel.indices(), &[3, 4, 5]);
        assert_eq!(sel.zero_based().collect::<Vec<_>>(), vec![2, 3, 4]);
        assert!(select_records(&TimeSelector::Record(21), &header).is_err());
    }
}
