//! Per-channel linear transform between digital and physical values.
//!
//! `physical = digital * scale + offset`, with
//! `scale = (phys_max - phys_min) / (dig_max - dig_min)` and
//! `offset = phys_min - dig_min * scale` when offset correction is on.

use crate::diagnostics::{raise, Diagnostic};
use crate::header::Header;
use crate::types::Precision;

/// Kind of output a transform is resolved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Float,
    Integer,
}

impl From<Precision> for OutputKind {
    fn from(precision: Precision) -> Self {
        if precision.is_integer() {
            OutputKind::Integer
        } else {
            OutputKind::Float
        }
    }
}

/// Scale and offset of every channel of a header.
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    pub scale: Vec<f64>,
    pub offset: Vec<f64>,
}

impl Transform {
    /// `scale = 1`, `offset = 0` for `n` channels: digital values pass through.
    pub fn identity(n: usize) -> Self {
        Transform {
            scale: vec![1.0; n],
            offset: vec![0.0; n],
        }
    }

    #[inline]
    pub fn to_physical(&self, channel: usize, digital: i32) -> f64 {
        digital as f64 * self.scale[channel] + self.offset[channel]
    }

    /// Unrounded digital value of a physical sample.
    #[inline]
    pub fn to_digital(&self, channel: usize, physical: f64) -> f64 {
        (physical - self.offset[channel]) / self.scale[channel]
    }
}

#[derive(Debug, Clone)]
pub struct Resolved {
    pub transform: Transform,
    /// Whether offset correction is actually applied.
    pub add_offset: bool,
    pub diagnostics: Vec<Diagnostic>,
}

/// Derives the transform of every channel in `header`.
///
/// Integer output always resolves to the identity transform; asking for an
/// offset with integer output raises a diagnostic and disables the offset.
pub fn resolve(header: &Header, add_offset: bool, kind: OutputKind) -> Resolved {
    let n = header.n_channels;
    let mut diagnostics = Vec::new();

    if kind == OutputKind::Integer {
        if add_offset {
            raise(&mut diagnostics, Diagnostic::OffsetIgnoredForIntegerOutput);
        }
        return Resolved {
            transform: Transform::identity(n),
            add_offset: false,
            diagnostics,
        };
    }

    let scale: Vec<f64> = (0..n)
        .map(|ch| {
            (header.phys_max[ch] - header.phys_min[ch])
                / (header.dig_max[ch] as f64 - header.dig_min[ch] as f64)
        })
        .collect();
    let offset = if add_offset {
        (0..n)
            .map(|ch| header.phys_min[ch] - header.dig_min[ch] as f64 * scale[ch])
            .collect()
    } else {
        vec![0.0; n]
    };

    Resolved {
        transform: Transform { scale, offset },
        add_offset,
        diagnostics,
    }
}
