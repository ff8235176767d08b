//! # BDF/EDF Library for Rust
//!
//! A pure Rust library for reading and writing BioSemi BDF (24-bit) and
//! EDF (16-bit) biosignal files, with parallel record decoding and encoding.
//!
//! ## Quick Start
//!
//! ### Reading a BDF file
//!
//! ```rust
//! use bdfplus::{BdfReader, ChannelSelector, ReadOptions, Result, TimeSelector};
//! # use std::fs;
//!
//! fn main() -> Result<()> {
//!     # bdfplus::doctest_utils::create_simple_test_file("quick_start.bdf")?;
//!     let reader = BdfReader::open("quick_start.bdf")?;
//!     println!("Channels: {:?}", reader.header().labels);
//!
//!     // Frontal channels, first two seconds, physical units
//!     let opts = ReadOptions::default()
//!         .channels(ChannelSelector::pattern("^Fp")?)
//!         .time(TimeSelector::Seconds(0.0, 2.0));
//!     let recording = reader.read::<f64>(&opts)?;
//!
//!     assert_eq!(recording.data.n_rows(), 2);
//!     for warning in &recording.diagnostics {
//!         println!("warning: {}", warning);
//!     }
//!     # fs::remove_file("quick_start.bdf").ok();
//!     Ok(())
//! }
//! ```
//!
//! ### Writing an EDF file
//!
//! ```rust
//! use bdfplus::{BdfWriter, Format, HeaderBuilder, IoStrategy, Matrix, Result, WriteOptions};
//! # use std::fs;
//!
//! fn main() -> Result<()> {
//!     let header = HeaderBuilder::new(Format::Edf, &["EEG C3", "Resp"])
//!         .subject_id("P001")
//!         .n_data_records(10)
//!         .samples_per_record(vec![256, 32])
//!         .units(vec!["uV".to_string(), "mV".to_string()])
//!         .physical_range(vec![-200.0, -5.0], vec![200.0, 5.0])
//!         .digital_range(vec![-32768, -32768], vec![32767, 32767])
//!         .build()?;
//!
//!     let eeg: Vec<f64> = (0..2560)
//!         .map(|i| 50.0 * (2.0 * std::f64::consts::PI * 10.0 * i as f64 / 256.0).sin())
//!         .collect();
//!     let resp = vec![1.0; 320];
//!
//!     let opts = WriteOptions::default().strategy(IoStrategy::Mapped);
//!     let report = BdfWriter::create("quick_start.edf")?
//!         .write(&header, &Matrix::from_rows(vec![eeg, resp]), None, &opts)?;
//!     assert!(report.diagnostics.is_empty());
//!     # fs::remove_file("quick_start.edf").ok();
//!     Ok(())
//! }
//! ```
//!
//! ## Physical vs Digital Values
//!
//! Samples are stored as little-endian two's-complement words. The physical
//! value of a digital sample is `digital * scale + offset`, where
//!
//! ```text
//! scale  = (phys_max - phys_min) / (dig_max - dig_min)
//! offset = phys_min - dig_min * scale
//! ```
//!
//! Integer output (`i32`/`i64`) always returns the raw digital values.
//!
//! ```rust
//! use bdfplus::{resolve, Format, HeaderBuilder, OutputKind};
//!
//! let header = HeaderBuilder::new(Format::Bdf, &["Fp1"])
//!     .physical_range(vec![-100.0], vec![100.0])
//!     .digital_range(vec![-1000], vec![1000])
//!     .build()
//!     .unwrap();
//! let transform = resolve(&header, true, OutputKind::Float).transform;
//! assert!((transform.to_physical(0, 500) - 50.0).abs() < 1e-9);
//! ```

pub mod diagnostics;
pub mod error;
pub mod header;
pub mod reader;
pub mod scale;
pub mod selector;
pub mod types;
pub mod utils;
pub mod writer;

#[doc(hidden)]
pub mod doctest_utils; // For internal doctest support

// Re-export main types for convenience
pub use diagnostics::Diagnostic;
pub use error::{BdfError, Result};
pub use header::{decode_header, encode_header, EncodedHeader, Header, HeaderBuilder, STATUS_LABEL};
pub use reader::{decode, decode_mapped, BdfReader, DynRecording, ReadOptions, Recording};
pub use scale::{resolve, OutputKind, Resolved, Transform};
pub use selector::{select_channels, select_records, ChannelSelector, Selection, TimeSelector};
pub use types::{Format, IoStrategy, Matrix, Precision, Sample, SampleData, StatusChannel};
pub use writer::{encode, BdfWriter, WriteOptions, WriteReport};

// Important constants
pub const HEADER_BLOCK_SIZE: usize = 256;
pub const MAX_CHANNELS: usize = 4096;
/// Default clipped-sample fraction above which writes raise a diagnostic.
pub const DEFAULT_CLIPPING_THRESHOLD: f64 = 0.05;
/// Default size of one buffered write, in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 4 << 20;

/// Library version
///
/// Returns the current version of the bdfplus library.
///
/// # Examples
///
/// ```rust
/// let version = bdfplus::version();
/// assert!(!version.is_empty());
/// assert!(version.contains('.'));
/// ```
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
