use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use memmap2::MmapMut;
use rayon::prelude::*;

use crate::diagnostics::{raise, Diagnostic};
use crate::error::{BdfError, Result};
use crate::header::{encode_header, Header};
use crate::reader::{default_concurrency, worker_pool};
use crate::scale::{resolve, OutputKind, Transform};
use crate::types::{Format, IoStrategy, Matrix, Sample, StatusChannel};
use crate::{DEFAULT_CHUNK_SIZE, DEFAULT_CLIPPING_THRESHOLD};

/// Options controlling a write.
#[derive(Debug, Clone)]
pub struct WriteOptions {
    /// Physical values carry an offset (`raw = (x - offset) / scale`).
    pub add_offset: bool,
    pub strategy: IoStrategy,
    /// Number of packing workers.
    pub concurrency: usize,
    /// Target size in bytes of one buffered write (sequential strategy).
    pub chunk_size_hint: usize,
    /// Fraction of clipped samples in the first record above which a
    /// `ClippingRisk` diagnostic is raised; `None` skips the estimate.
    pub clipping_threshold: Option<f64>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        WriteOptions {
            add_offset: true,
            strategy: IoStrategy::Sequential,
            concurrency: default_concurrency(),
            chunk_size_hint: DEFAULT_CHUNK_SIZE,
            clipping_threshold: Some(DEFAULT_CLIPPING_THRESHOLD),
        }
    }
}

impl WriteOptions {
    pub fn add_offset(mut self, add_offset: bool) -> Self {
        self.add_offset = add_offset;
        self
    }

    pub fn strategy(mut self, strategy: IoStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn concurrency(mut self, workers: usize) -> Self {
        self.concurrency = workers;
        self
    }

    pub fn chunk_size_hint(mut self, bytes: usize) -> Self {
        self.chunk_size_hint = bytes;
        self
    }

    pub fn clipping_threshold(mut self, threshold: Option<f64>) -> Self {
        self.clipping_threshold = threshold;
        self
    }
}

/// Outcome of a successful write.
#[derive(Debug, Clone, Default)]
pub struct WriteReport {
    pub diagnostics: Vec<Diagnostic>,
    pub records_written: usize,
    pub bytes_written: u64,
}

#[derive(Debug, Clone, Copy)]
struct ChannelPack {
    byte_offset: usize,
    samples: usize,
    scale: f64,
    offset: f64,
}

struct EncodePlan {
    format: Format,
    record_len: usize,
    channels: Vec<ChannelPack>,
    /// Byte offset and samples-per-record of the status channel.
    status: Option<(usize, usize)>,
}

impl EncodePlan {
    fn new(header: &Header, transform: &Transform) -> Self {
        let offsets = header.channel_byte_offsets();
        let channels = (0..header.signal_channel_count())
            .map(|ch| ChannelPack {
                byte_offset: offsets[ch],
                samples: header.samples_per_record[ch],
                scale: transform.scale[ch],
                offset: transform.offset[ch],
            })
            .collect();
        EncodePlan {
            format: header.format,
            record_len: header.record_len_bytes(),
            channels,
            status: header
                .status_channel()
                .map(|ch| (offsets[ch], header.samples_per_record[ch])),
        }
    }

    fn pack_record<T: Sample>(
        &self,
        data: &Matrix<T>,
        status: Option<&StatusChannel>,
        record: usize,
        out: &mut [u8],
    ) {
        let format = self.format;
        let word = format.word_size();
        let (lo, hi) = (format.word_min() as f64, format.word_max() as f64);

        for (row, ch) in data.rows().iter().zip(&self.channels) {
            let src = &row[record * ch.samples..(record + 1) * ch.samples];
            let dst = &mut out[ch.byte_offset..ch.byte_offset + ch.samples * word];
            for (value, raw) in src.iter().zip(dst.chunks_exact_mut(word)) {
                let digital = ((value.to_f64() - ch.offset) / ch.scale).clamp(lo, hi).round();
                format.encode_word(digital as i32, raw);
            }
        }

        if let Some((byte_offset, samples)) = self.status {
            let dst = &mut out[byte_offset..byte_offset + samples * 3];
            match status {
                Some(st) => {
                    let base = record * samples;
                    for (i, raw) in dst.chunks_exact_mut(3).enumerate() {
                        raw[0] = st.low[base + i];
                        raw[1] = st.high[base + i];
                        raw[2] = st.status[base + i];
                    }
                }
                None => dst.fill(0),
            }
        }
    }
}

/// Rejects data that does not match the header, before anything is written.
fn check_shape<T: Sample>(
    header: &Header,
    data: &Matrix<T>,
    status: Option<&StatusChannel>,
) -> Result<()> {
    header.validate()?;
    if header.n_channels == 0 {
        return Err(BdfError::InvalidSignalCount(0));
    }
    let signals = header.signal_channel_count();
    if data.n_rows() != signals {
        return Err(BdfError::DataShapeMismatch(format!(
            "{} rows for {} signal channels",
            data.n_rows(),
            signals
        )));
    }
    for (ch, row) in data.rows().iter().enumerate() {
        let expected = header.samples_per_record[ch] * header.n_data_records;
        if row.len() != expected {
            return Err(BdfError::DataShapeMismatch(format!(
                "channel '{}' has {} samples, expected {}",
                header.labels[ch],
                row.len(),
                expected
            )));
        }
    }
    if let Some(st) = status {
        let ch = header
            .status_channel()
            .ok_or(BdfError::MissingAuxiliaryChannel)?;
        let expected = header.samples_per_record[ch] * header.n_data_records;
        let lengths = [st.low.len(), st.high.len(), st.status.len()];
        if lengths.iter().any(|&len| len != expected) {
            return Err(BdfError::DataShapeMismatch(format!(
                "status channel has {:?} entries, expected {}",
                lengths, expected
            )));
        }
    }
    Ok(())
}

/// Raises `OverflowRisk` for every channel whose data or declared digital
/// range does not fit the sample word.
fn check_overflow<T: Sample>(
    header: &Header,
    data: &Matrix<T>,
    transform: &Transform,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let (lo, hi) = (header.format.word_min() as f64, header.format.word_max() as f64);
    for (ch, row) in data.rows().iter().enumerate() {
        let mut low = header.dig_min[ch] as f64;
        let mut high = header.dig_max[ch] as f64;
        for value in row {
            let digital = transform.to_digital(ch, value.to_f64());
            low = low.min(digital);
            high = high.max(digital);
        }
        if low < lo - 0.5 || high > hi + 0.5 {
            raise(
                diagnostics,
                Diagnostic::OverflowRisk {
                    channel: header.labels[ch].clone(),
                    digital_low: low,
                    digital_high: high,
                },
            );
        }
    }
}

/// Estimates clipping from the first record only.
///
/// This is a heuristic: later records are not inspected, which keeps the
/// check cheap on large recordings. A sample counts as clipped when its
/// rounded digital value falls outside the channel's digital range or the
/// sample word.
fn check_clipping<T: Sample>(
    header: &Header,
    data: &Matrix<T>,
    transform: &Transform,
    threshold: f64,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if header.n_data_records == 0 {
        return;
    }
    let format = header.format;
    let mut total = 0usize;
    let mut clipped = 0usize;
    for (ch, row) in data.rows().iter().enumerate() {
        let low = (header.dig_min[ch].max(format.word_min())) as f64;
        let high = (header.dig_max[ch].min(format.word_max())) as f64;
        for value in &row[..header.samples_per_record[ch]] {
            let digital = transform.to_digital(ch, value.to_f64()).round();
            total += 1;
            if !(low..=high).contains(&digital) {
                clipped += 1;
            }
        }
    }
    if total == 0 {
        return;
    }
    let fraction = clipped as f64 / total as f64;
    if fraction > threshold {
        raise(
            diagnostics,
            Diagnostic::ClippingRisk {
                fraction,
                threshold,
            },
        );
    }
}

struct Prepared {
    header_bytes: Vec<u8>,
    plan: EncodePlan,
    diagnostics: Vec<Diagnostic>,
}

/// Validation and pre-write diagnostics shared by both strategies.
fn prepare<T: Sample>(
    header: &Header,
    data: &Matrix<T>,
    status: Option<&StatusChannel>,
    opts: &WriteOptions,
) -> Result<Prepared> {
    check_shape(header, data, status)?;

    let resolved = resolve(header, opts.add_offset, OutputKind::from(T::PRECISION));
    let mut diagnostics = resolved.diagnostics;
    let transform = resolved.transform;

    check_overflow(header, data, &transform, &mut diagnostics);
    if let Some(threshold) = opts.clipping_threshold {
        check_clipping(header, data, &transform, threshold, &mut diagnostics);
    }

    let encoded = encode_header(header)?;
    diagnostics.extend(encoded.diagnostics);

    Ok(Prepared {
        header_bytes: encoded.bytes,
        plan: EncodePlan::new(header, &transform),
        diagnostics,
    })
}

/// Writes header and records to `sink` (sequential strategy).
///
/// Records are packed in parallel into a buffer holding as many whole
/// records as fit in `opts.chunk_size_hint` (at least one), and the buffer is
/// written in record order.
pub fn encode<T: Sample, W: Write>(
    sink: W,
    header: &Header,
    data: &Matrix<T>,
    status: Option<&StatusChannel>,
    opts: &WriteOptions,
) -> Result<WriteReport> {
    let prepared = prepare(header, data, status, opts)?;
    encode_prepared(sink, prepared, header, data, status, opts)
}

fn encode_prepared<T: Sample, W: Write>(
    mut sink: W,
    prepared: Prepared,
    header: &Header,
    data: &Matrix<T>,
    status: Option<&StatusChannel>,
    opts: &WriteOptions,
) -> Result<WriteReport> {
    let started = Instant::now();
    let plan = &prepared.plan;
    let record_len = plan.record_len;
    let n_records = header.n_data_records;

    sink.write_all(&prepared.header_bytes)?;

    let per_chunk = (opts.chunk_size_hint / record_len).clamp(1, n_records.max(1));
    let mut buffer = vec![0u8; per_chunk * record_len];
    let pool = worker_pool(opts.concurrency, "bdf-encode")?;

    let mut first = 0;
    while first < n_records {
        let count = per_chunk.min(n_records - first);
        let chunk = &mut buffer[..count * record_len];
        pool.install(|| {
            chunk
                .par_chunks_mut(record_len)
                .enumerate()
                .for_each(|(i, out)| plan.pack_record(data, status, first + i, out));
        });
        sink.write_all(chunk)?;
        first += count;
    }
    sink.flush()?;

    let bytes_written = (prepared.header_bytes.len() + n_records * record_len) as u64;
    tracing::debug!(
        records = n_records,
        bytes = bytes_written,
        records_per_write = per_chunk,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "encoded records"
    );
    Ok(WriteReport {
        diagnostics: prepared.diagnostics,
        records_written: n_records,
        bytes_written,
    })
}

/// BDF/EDF file writer
///
/// The writer takes a complete header and matrix and writes them in one go,
/// either through buffered sequential writes or through a writable memory
/// map packed by parallel workers.
///
/// # Examples
///
/// ```rust
/// use bdfplus::{BdfReader, BdfWriter, Format, HeaderBuilder, Matrix, ReadOptions, WriteOptions};
///
/// let header = HeaderBuilder::new(Format::Bdf, &["Fp1", "Fp2"])
///     .n_data_records(2)
///     .uniform_samples_per_record(4)
///     .physical_range(vec![-100.0; 2], vec![100.0; 2])
///     .digital_range(vec![-1000; 2], vec![1000; 2])
///     .build()?;
/// let data = Matrix::from_rows(vec![vec![1.5; 8], vec![-20.0; 8]]);
///
/// let report = BdfWriter::create("writer_doc.bdf")?.write(&header, &data, None, &WriteOptions::default())?;
/// assert_eq!(report.records_written, 2);
///
/// let back = BdfReader::open("writer_doc.bdf")?.read::<f64>(&ReadOptions::default())?;
/// assert!((back.data.row(1)[0] + 20.0).abs() <= 0.05);
///
/// # std::fs::remove_file("writer_doc.bdf").ok();
/// # Ok::<(), bdfplus::BdfError>(())
/// ```
#[derive(Debug)]
pub struct BdfWriter {
    path: PathBuf,
    file: File,
}

impl BdfWriter {
    /// Opens the file at `path` for writing, creating it if needed.
    ///
    /// An existing file keeps its contents until [`BdfWriter::write`] has
    /// validated its input; only then is it truncated and rewritten.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        Ok(BdfWriter { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the header, the signal matrix and, for BDF files with a status
    /// channel, the status bytes (zeros when `status` is `None`).
    ///
    /// The file is complete on disk when this returns: mapped writes are
    /// flushed and unmapped before returning.
    ///
    /// # Errors
    ///
    /// * `BdfError::DataShapeMismatch` - `data` does not match the header
    /// * `BdfError::ChannelCountMismatch` - per-channel metadata is inconsistent
    /// * `BdfError::Io` - the file could not be sized, mapped or written
    ///
    /// Validation errors leave the file as it was before the call. An `Io`
    /// error during writing leaves a partial file behind.
    pub fn write<T: Sample>(
        self,
        header: &Header,
        data: &Matrix<T>,
        status: Option<&StatusChannel>,
        opts: &WriteOptions,
    ) -> Result<WriteReport> {
        let prepared = prepare(header, data, status, opts)?;
        self.file.set_len(0)?;
        match opts.strategy {
            IoStrategy::Sequential => {
                encode_prepared(&self.file, prepared, header, data, status, opts)
            }
            IoStrategy::Mapped => self.write_mapped(prepared, header, data, status, opts),
        }
    }

    fn write_mapped<T: Sample>(
        &self,
        prepared: Prepared,
        header: &Header,
        data: &Matrix<T>,
        status: Option<&StatusChannel>,
        opts: &WriteOptions,
    ) -> Result<WriteReport> {
        let started = Instant::now();
        let plan = &prepared.plan;
        let header_len = prepared.header_bytes.len();
        let n_records = header.n_data_records;
        let total = header_len + n_records * plan.record_len;

        self.file.set_len(total as u64)?;
        let pool = worker_pool(opts.concurrency, "bdf-encode")?;
        {
            let mut mmap = unsafe { MmapMut::map_mut(&self.file) }?;
            mmap[..header_len].copy_from_slice(&prepared.header_bytes);
            let payload = &mut mmap[header_len..];
            pool.install(|| {
                payload
                    .par_chunks_mut(plan.record_len)
                    .enumerate()
                    .for_each(|(record, out)| plan.pack_record(data, status, record, out));
            });
            // 同步刷新后再解除映射，保证随后的读取能看到完整数据
            mmap.flush()?;
        }

        tracing::debug!(
            records = n_records,
            bytes = total,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "encoded records through memory map"
        );
        Ok(WriteReport {
            diagnostics: prepared.diagnostics,
            records_written: n_records,
            bytes_written: total as u64,
        })
    }
}
