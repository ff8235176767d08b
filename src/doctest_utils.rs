// Internal utilities for documentation tests
// This file contains helper functions to generate test files for doctests

use crate::{BdfWriter, Format, HeaderBuilder, Matrix, Result, StatusChannel, WriteOptions};
use std::path::Path;

/// Creates a small BDF file for documentation examples
///
/// Channels `Fp1`, `Fp2` and `Status`, 4 records of 1 s at 256 Hz. `Fp1`
/// carries a 10 Hz sine, `Fp2` its negation; the status channel marks the
/// start of every record with trigger code 1.
pub fn create_simple_test_file<P: AsRef<Path>>(path: P) -> Result<()> {
    const RATE: usize = 256;
    const RECORDS: usize = 4;

    let header = HeaderBuilder::new(Format::Bdf, &["Fp1", "Fp2", "Status"])
        .subject_id("DOC001")
        .recording_id("Doctest recording")
        .n_data_records(RECORDS)
        .uniform_samples_per_record(RATE)
        .units(vec!["uV".to_string(), "uV".to_string(), "Boolean".to_string()])
        .physical_range(
            vec![-262_144.0, -262_144.0, -8_388_608.0],
            vec![262_143.0, 262_143.0, 8_388_607.0],
        )
        .build()?;

    let fp1: Vec<f64> = (0..RATE * RECORDS)
        .map(|i| {
            let t = i as f64 / RATE as f64;
            50.0 * (2.0 * std::f64::consts::PI * 10.0 * t).sin()
        })
        .collect();
    let fp2 = fp1.iter().map(|v| -v).collect();

    let mut status = StatusChannel::zeroed(RATE * RECORDS);
    for record in 0..RECORDS {
        status.low[record * RATE] = 1;
    }

    BdfWriter::create(path)?.write(
        &header,
        &Matrix::from_rows(vec![fp1, fp2]),
        Some(&status),
        &WriteOptions::default(),
    )?;
    Ok(())
}
