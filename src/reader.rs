use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Instant;

use memmap2::Mmap;
use parking_lot::Mutex;
use rayon::prelude::*;

use crate::diagnostics::Diagnostic;
use crate::error::{BdfError, Result};
use crate::header::{decode_header, Header};
use crate::scale::{resolve, OutputKind, Transform};
use crate::selector::{select_channels, select_records, ChannelSelector, Selection, TimeSelector};
use crate::types::{Format, IoStrategy, Matrix, Precision, Sample, SampleData, StatusChannel};

/// Options controlling a read.
///
/// # Examples
///
/// ```rust
/// use bdfplus::{ChannelSelector, IoStrategy, ReadOptions, TimeSelector};
///
/// let opts = ReadOptions::default()
///     .channels(ChannelSelector::pattern("^F")?)
///     .time(TimeSelector::Seconds(2.5, 15.9))
///     .strategy(IoStrategy::Mapped)
///     .concurrency(4);
/// assert!(opts.add_offset);
/// # Ok::<(), bdfplus::BdfError>(())
/// ```
#[derive(Debug, Clone)]
pub struct ReadOptions {
    pub channels: ChannelSelector,
    pub time: TimeSelector,
    /// Apply the physical offset (float output only).
    pub add_offset: bool,
    pub strategy: IoStrategy,
    /// Number of decode workers; 1 decodes on a single thread.
    pub concurrency: usize,
    /// Decode the BDF status channel as well.
    pub read_status: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        ReadOptions {
            channels: ChannelSelector::All,
            time: TimeSelector::All,
            add_offset: true,
            strategy: IoStrategy::Sequential,
            concurrency: default_concurrency(),
            read_status: false,
        }
    }
}

impl ReadOptions {
    pub fn channels(mut self, channels: ChannelSelector) -> Self {
        self.channels = channels;
        self
    }

    pub fn time(mut self, time: TimeSelector) -> Self {
        self.time = time;
        self
    }

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

    pub fn read_status(mut self, read_status: bool) -> Self {
        self.read_status = read_status;
        self
    }
}

pub(crate) fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(8)
}

pub(crate) fn worker_pool(workers: usize, name: &'static str) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .thread_name(move |index| format!("{}-{}", name, index))
        .build()
        .map_err(|e| BdfError::ThreadPool(e.to_string()))
}

/// Result of a read.
#[derive(Debug, Clone)]
pub struct Recording<T> {
    /// Header narrowed to what was read.
    pub header: Header,
    /// One row per selected channel; records concatenated in selection order.
    pub data: Matrix<T>,
    pub status: Option<StatusChannel>,
    /// Selected signal channels (1-based).
    pub channels: Selection,
    /// Selected records (1-based).
    pub records: Selection,
    /// Transform applied to each row of `data`.
    pub transform: Transform,
    pub diagnostics: Vec<Diagnostic>,
}

/// [`Recording`] whose precision was chosen at runtime.
#[derive(Debug, Clone)]
pub struct DynRecording {
    pub header: Header,
    pub data: SampleData,
    pub status: Option<StatusChannel>,
    pub channels: Selection,
    pub records: Selection,
    pub transform: Transform,
    pub diagnostics: Vec<Diagnostic>,
}

impl<T: Sample> Recording<T> {
    fn into_dyn(self, wrap: fn(Matrix<T>) -> SampleData) -> DynRecording {
        DynRecording {
            header: self.header,
            data: wrap(self.data),
            status: self.status,
            channels: self.channels,
            records: self.records,
            transform: self.transform,
            diagnostics: self.diagnostics,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ChannelPlan {
    byte_offset: usize,
    samples: usize,
    scale: f64,
    offset: f64,
}

/// Everything a worker needs, computed before dispatch.
struct DecodePlan {
    format: Format,
    header_len: usize,
    record_len: usize,
    channels: Vec<ChannelPlan>,
    status: Option<ChannelPlan>,
    /// Zero-based file record of every output record.
    records: Vec<usize>,
}

struct Prepared {
    plan: DecodePlan,
    header: Header,
    channels: Selection,
    records: Selection,
    transform: Transform,
    diagnostics: Vec<Diagnostic>,
}

/// Resolves selections and the transform; runs before any payload I/O.
fn prepare(header: &Header, opts: &ReadOptions, kind: OutputKind) -> Result<Prepared> {
    let status_index = header.status_channel();
    if opts.read_status && status_index.is_none() {
        return Err(BdfError::MissingAuxiliaryChannel);
    }

    let (channels, mut diagnostics) = select_channels(&opts.channels, header)?;
    let records = select_records(&opts.time, header)?;
    let narrowed = header.narrow(&channels, &records)?;
    let resolved = resolve(&narrowed, opts.add_offset, kind);
    diagnostics.extend(resolved.diagnostics);
    let transform = resolved.transform;

    let offsets = header.channel_byte_offsets();
    let channel_plans = channels
        .zero_based()
        .enumerate()
        .map(|(row, ch)| ChannelPlan {
            byte_offset: offsets[ch],
            samples: header.samples_per_record[ch],
            scale: transform.scale[row],
            offset: transform.offset[row],
        })
        .collect();
    let status = status_index.filter(|_| opts.read_status).map(|ch| ChannelPlan {
        byte_offset: offsets[ch],
        samples: header.samples_per_record[ch],
        scale: 1.0,
        offset: 0.0,
    });

    Ok(Prepared {
        plan: DecodePlan {
            format: header.format,
            header_len: header.header_len_bytes(),
            record_len: header.record_len_bytes(),
            channels: channel_plans,
            status,
            records: records.zero_based().collect(),
        },
        header: narrowed,
        channels,
        records,
        transform,
        diagnostics,
    })
}

/// Checks that `total_len` bytes hold every record the header declares.
fn check_payload(header: &Header, total_len: u64) -> Result<()> {
    let needed = header.header_len_bytes() as u64
        + header.n_data_records as u64 * header.record_len_bytes() as u64;
    if total_len < needed {
        return Err(BdfError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!(
                "payload truncated: {} bytes, header declares {}",
                total_len, needed
            ),
        )));
    }
    Ok(())
}

/// Fills in the record count of a header written with `-1` records.
fn with_inferred_records(header: &Header, total_len: u64) -> Header {
    let mut header = header.clone();
    let payload = total_len.saturating_sub(header.header_len_bytes() as u64);
    header.n_data_records = (payload / header.record_len_bytes() as u64) as usize;
    header.record_count_unknown = false;
    tracing::debug!(records = header.n_data_records, "inferred record count from file size");
    header
}

/// Gives workers the bytes of one record.
trait RecordSource: Sync {
    fn fetch<'s>(&'s self, record: usize, scratch: &'s mut Vec<u8>) -> Result<&'s [u8]>;
}

/// Whole file as one region; workers slice it without locking.
struct MappedRecords<'m> {
    bytes: &'m [u8],
    header_len: usize,
    record_len: usize,
}

impl RecordSource for MappedRecords<'_> {
    fn fetch<'s>(&'s self, record: usize, _scratch: &'s mut Vec<u8>) -> Result<&'s [u8]> {
        let start = self.header_len + record * self.record_len;
        Ok(&self.bytes[start..start + self.record_len])
    }
}

/// Shared cursor; seek+read is one critical section.
///
/// The mutex is borrowed so that every read through one file handle locks
/// the same cursor, whichever call started it.
struct LockedRecords<'c, R> {
    cursor: &'c Mutex<R>,
    header_len: u64,
    record_len: usize,
}

impl<R: Read + Seek + Send> RecordSource for LockedRecords<'_, R> {
    fn fetch<'s>(&'s self, record: usize, scratch: &'s mut Vec<u8>) -> Result<&'s [u8]> {
        scratch.resize(self.record_len, 0);
        let position = self.header_len + record as u64 * self.record_len as u64;
        {
            let mut cursor = self.cursor.lock();
            cursor.seek(SeekFrom::Start(position))?;
            cursor.read_exact(scratch)?;
        }
        Ok(scratch.as_slice())
    }
}

struct StatusSlices<'d> {
    low: &'d mut [u8],
    high: &'d mut [u8],
    status: &'d mut [u8],
}

/// Destination of one record: disjoint slices of the output rows.
struct RecordJob<'d, T> {
    record: usize,
    rows: Vec<&'d mut [T]>,
    status: Option<StatusSlices<'d>>,
}

fn unpack_record<T: Sample>(bytes: &[u8], plan: &DecodePlan, job: RecordJob<'_, T>) {
    let format = plan.format;
    let word = format.word_size();
    for (dest, ch) in job.rows.into_iter().zip(&plan.channels) {
        let src = &bytes[ch.byte_offset..ch.byte_offset + ch.samples * word];
        for (value, raw) in dest.iter_mut().zip(src.chunks_exact(word)) {
            *value = T::from_digital(format.decode_word(raw), ch.scale, ch.offset);
        }
    }
    if let (Some(dest), Some(ch)) = (job.status, plan.status) {
        let src = &bytes[ch.byte_offset..ch.byte_offset + ch.samples * 3];
        for (i, raw) in src.chunks_exact(3).enumerate() {
            dest.low[i] = raw[0];
            dest.high[i] = raw[1];
            dest.status[i] = raw[2];
        }
    }
}

/// Decodes every planned record on a pool of `workers` threads.
///
/// Output slices are split per record before dispatch, so record `i` of the
/// plan always lands at the same place regardless of scheduling.
fn run_decode<T: Sample, S: RecordSource>(
    source: &S,
    plan: &DecodePlan,
    workers: usize,
) -> Result<(Matrix<T>, Option<StatusChannel>)> {
    let n_records = plan.records.len();
    let lengths: Vec<usize> = plan.channels.iter().map(|c| c.samples * n_records).collect();
    let mut data = Matrix::<T>::zeroed(&lengths);
    let mut status = plan
        .status
        .map(|c| StatusChannel::zeroed(c.samples * n_records));

    let mut jobs: Vec<RecordJob<'_, T>> = plan
        .records
        .iter()
        .map(|&record| RecordJob {
            record,
            rows: Vec::with_capacity(plan.channels.len()),
            status: None,
        })
        .collect();
    for (row, ch) in data.rows_mut().iter_mut().zip(&plan.channels) {
        for (job, chunk) in jobs.iter_mut().zip(row.chunks_mut(ch.samples)) {
            job.rows.push(chunk);
        }
    }
    if let (Some(st), Some(ch)) = (status.as_mut(), plan.status) {
        let lows = st.low.chunks_mut(ch.samples);
        let highs = st.high.chunks_mut(ch.samples);
        let flags = st.status.chunks_mut(ch.samples);
        for (((job, low), high), flag) in jobs.iter_mut().zip(lows).zip(highs).zip(flags) {
            job.status = Some(StatusSlices {
                low,
                high,
                status: flag,
            });
        }
    }

    let pool = worker_pool(workers, "bdf-decode")?;
    pool.install(|| {
        jobs.into_par_iter().try_for_each_init(
            || Vec::with_capacity(plan.record_len),
            |scratch, job| {
                let bytes = source.fetch(job.record, scratch)?;
                unpack_record(bytes, plan, job);
                Ok::<(), BdfError>(())
            },
        )
    })?;

    Ok((data, status))
}

fn finish<T: Sample, S: RecordSource>(
    source: &S,
    prepared: Prepared,
    workers: usize,
) -> Result<Recording<T>> {
    let started = Instant::now();
    let (data, status) = run_decode::<T, S>(source, &prepared.plan, workers)?;
    tracing::debug!(
        records = prepared.plan.records.len(),
        channels = prepared.plan.channels.len(),
        workers,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "decoded records"
    );
    Ok(Recording {
        header: prepared.header,
        data,
        status,
        channels: prepared.channels,
        records: prepared.records,
        transform: prepared.transform,
        diagnostics: prepared.diagnostics,
    })
}

/// Decodes records from a seekable byte source (sequential strategy).
///
/// `source` holds the whole file, header included; `header` is its decoded
/// header. Selections are resolved and validated before the source is touched.
pub fn decode<T: Sample, R: Read + Seek + Send>(
    mut source: R,
    header: &Header,
    opts: &ReadOptions,
) -> Result<Recording<T>> {
    let inferred;
    let header = if header.record_count_unknown {
        let total_len = source.seek(SeekFrom::End(0))?;
        inferred = with_inferred_records(header, total_len);
        &inferred
    } else {
        header
    };

    decode_locked(&Mutex::new(source), header, opts)
}

/// Sequential decode through a cursor that may be shared with other calls.
fn decode_locked<T: Sample, R: Read + Seek + Send>(
    cursor: &Mutex<R>,
    header: &Header,
    opts: &ReadOptions,
) -> Result<Recording<T>> {
    let prepared = prepare(header, opts, OutputKind::from(T::PRECISION))?;
    let total_len = cursor.lock().seek(SeekFrom::End(0))?;
    check_payload(header, total_len)?;

    let records = LockedRecords {
        cursor,
        header_len: prepared.plan.header_len as u64,
        record_len: prepared.plan.record_len,
    };
    finish(&records, prepared, opts.concurrency)
}

/// Decodes records from an in-memory image of the whole file (mapped strategy).
pub fn decode_mapped<T: Sample>(bytes: &[u8], header: &Header, opts: &ReadOptions) -> Result<Recording<T>> {
    let inferred;
    let header = if header.record_count_unknown {
        inferred = with_inferred_records(header, bytes.len() as u64);
        &inferred
    } else {
        header
    };

    let prepared = prepare(header, opts, OutputKind::from(T::PRECISION))?;
    check_payload(header, bytes.len() as u64)?;

    let records = MappedRecords {
        bytes,
        header_len: prepared.plan.header_len,
        record_len: prepared.plan.record_len,
    };
    finish(&records, prepared, opts.concurrency)
}

/// BDF/EDF file reader
///
/// Opening a file decodes and validates its header; samples are read on
/// demand with [`read`](Self::read), any number of times and with any
/// selection. A reader can be shared between threads: sequential reads lock
/// one cursor per file, so concurrent calls never interleave their seeks.
///
/// # Examples
///
/// ```rust
/// use bdfplus::{BdfReader, ChannelSelector, ReadOptions, TimeSelector};
///
/// # // Generate test file (hidden from docs)
/// # bdfplus::doctest_utils::create_simple_test_file("reader_doc.bdf")?;
/// #
/// let reader = BdfReader::open("reader_doc.bdf")?;
/// println!("{} channels, {} s", reader.header().n_channels, reader.header().total_duration());
///
/// let opts = ReadOptions::default()
///     .channels(ChannelSelector::names(&["Fp1"]))
///     .time(TimeSelector::Seconds(0.0, 2.0));
/// let recording = reader.read::<f64>(&opts)?;
/// assert_eq!(recording.data.n_rows(), 1);
/// assert_eq!(recording.header.labels[0], "Fp1");
///
/// # // Cleanup (hidden from docs)
/// # drop(reader);
/// # std::fs::remove_file("reader_doc.bdf").ok();
/// # Ok::<(), bdfplus::BdfError>(())
/// ```
#[derive(Debug)]
pub struct BdfReader {
    path: PathBuf,
    file: Mutex<File>,
    header: Header,
}

impl BdfReader {
    /// Opens a file and decodes its header.
    ///
    /// # Errors
    ///
    /// * `BdfError::FileNotFound` - the file can't be opened
    /// * `BdfError::UnsupportedFileType` - neither BDF nor EDF
    /// * `BdfError::MalformedHeaderField` - a header field failed to parse
    /// * `BdfError::ChannelCountMismatch` - per-channel metadata is inconsistent
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)
            .map_err(|e| BdfError::FileNotFound(format!("{}: {}", path.display(), e)))?;

        let mut header = decode_header(&mut BufReader::new(&file))?;
        if header.record_count_unknown {
            header = with_inferred_records(&header, file.metadata()?.len());
        }

        Ok(BdfReader {
            path,
            file: Mutex::new(file),
            header,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the selected channels and records as `T`.
    ///
    /// Integer types receive digital values unchanged; float types receive
    /// `digital * scale + offset`.
    pub fn read<T: Sample>(&self, opts: &ReadOptions) -> Result<Recording<T>> {
        match opts.strategy {
            IoStrategy::Sequential => decode_locked(&self.file, &self.header, opts),
            IoStrategy::Mapped => {
                // 映射只在本次调用内有效，任何返回路径都会释放
                let mmap = {
                    let file = self.file.lock();
                    unsafe { Mmap::map(&*file) }?
                };
                decode_mapped(&mmap, &self.header, opts)
            }
        }
    }

    /// Reads with the element type chosen at runtime.
    pub fn read_as(&self, precision: Precision, opts: &ReadOptions) -> Result<DynRecording> {
        Ok(match precision {
            Precision::Int32 => self.read::<i32>(opts)?.into_dyn(SampleData::Int32),
            Precision::Int64 => self.read::<i64>(opts)?.into_dyn(SampleData::Int64),
            Precision::Float32 => self.read::<f32>(opts)?.into_dyn(SampleData::Float32),
            Precision::Float64 => self.read::<f64>(opts)?.into_dyn(SampleData::Float64),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{encode_header, HeaderBuilder};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Builds a file image whose sample words count up from `base`.
    fn image(header: &Header, base: i32) -> Vec<u8> {
        let mut bytes = encode_header(header).unwrap().bytes;
        let word = header.format.word_size();
        let mut buf = [0u8; 3];
        let mut value = base;
        for _ in 0..header.n_data_records {
            for &spr in &header.samples_per_record {
                for _ in 0..spr {
                    header.format.encode_word(value, &mut buf);
                    bytes.extend_from_slice(&buf[..word]);
                    value += 1;
                }
            }
        }
        bytes
    }

    fn bdf_header() -> Header {
        HeaderBuilder::new(Format::Bdf, &["Fp1", "Fp2", "C3", "Cz"])
            .n_data_records(6)
            .uniform_samples_per_record(4)
            .physical_range(vec![-100.0; 4], vec![100.0; 4])
            .digital_range(vec![-1000; 4], vec![1000; 4])
            .build()
            .unwrap()
    }

    struct CountingSource {
        inner: Cursor<Vec<u8>>,
        ops: Arc<AtomicUsize>,
    }

    impl Read for CountingSource {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.ops.fetch_add(1, Ordering::SeqCst);
            self.inner.read(buf)
        }
    }

    impl Seek for CountingSource {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.ops.fetch_add(1, Ordering::SeqCst);
            self.inner.seek(pos)
        }
    }

    /// Source whose `fail_at`-th read fails, as a disk dropping out mid-read would.
    struct FailingSource {
        inner: Cursor<Vec<u8>>,
        reads: usize,
        fail_at: usize,
    }

    impl Read for FailingSource {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.reads += 1;
            if self.reads >= self.fail_at {
                return Err(io::Error::new(io::ErrorKind::Other, "disk gone"));
            }
            self.inner.read(buf)
        }
    }

    impl Seek for FailingSource {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    #[test]
    fn test_read_failure_aborts_decode() {
        let header = bdf_header();
        for workers in [1, 4] {
            let source = FailingSource {
                inner: Cursor::new(image(&header, 0)),
                reads: 0,
                fail_at: 5,
            };
            let opts = ReadOptions::default().concurrency(workers);
            match decode::<f64, _>(source, &header, &opts) {
                Err(BdfError::Io(e)) => {
                    assert_eq!(e.kind(), io::ErrorKind::Other);
                    assert_eq!(e.to_string(), "disk gone");
                }
                other => panic!("expected Io error with {} workers, got {:?}", workers, other.map(|r| r.records)),
            }
        }
    }

    #[test]
    fn test_decode_digital_layout() {
        let header = bdf_header();
        let bytes = image(&header, -50);
        let opts = ReadOptions::default().concurrency(2);
        let rec = decode::<i32, _>(Cursor::new(bytes), &header, &opts).unwrap();
        assert_eq!(rec.data.n_rows(), 4);
        // 第一条记录：通道 0 为 -50..-46，通道 1 从 -46 开始
        assert_eq!(&rec.data.row(0)[..4], &[-50, -49, -48, -47]);
        assert_eq!(&rec.data.row(1)[..4], &[-46, -45, -44, -43]);
        // 第二条记录紧接在每行后面
        assert_eq!(rec.data.get(0, 4), Some(-50 + 16));
        assert_eq!(rec.data.row(3).len(), 24);
    }

    #[test]
    fn test_decode_physical_values() {
        let header = bdf_header();
        let bytes = image(&header, 0);
        let rec = decode_mapped::<f64>(&bytes, &header, &ReadOptions::default()).unwrap();
        assert!((rec.data.row(0)[1] - 0.1).abs() < 1e-12);
        assert!((rec.data.row(1)[0] - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_selection_subsets_rows_and_records() {
        let header = bdf_header();
        let bytes = image(&header, 0);
        let opts = ReadOptions::default()
            .channels(ChannelSelector::Range(2..=3))
            .time(TimeSelector::Records(3..=4));
        let rec = decode::<i64, _>(Cursor::new(bytes), &header, &opts).unwrap();
        assert_eq!(rec.header.labels, vec!["Fp2", "C3"]);
        assert_eq!(rec.header.n_data_records, 2);
        // 记录 3 起始值 = 2 * 16，通道 2 偏移 4
        assert_eq!(rec.data.row(0)[0], 36);
        assert_eq!(rec.data.row(1)[4], 48 + 8);
    }

    #[test]
    fn test_out_of_range_channel_does_no_io() {
        let header = HeaderBuilder::new(Format::Bdf, &["X"; 17])
            .n_data_records(2)
            .build()
            .unwrap();
        let ops = Arc::new(AtomicUsize::new(0));
        let source = CountingSource {
            inner: Cursor::new(image(&header, 0)),
            ops: ops.clone(),
        };
        let opts = ReadOptions::default().channels(ChannelSelector::Index(99));
        let result = decode::<f32, _>(source, &header, &opts);
        assert!(matches!(
            result,
            Err(BdfError::SelectionOutOfRange { limit: 17, .. })
        ));
        assert_eq!(ops.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_status_channel_split() {
        let header = HeaderBuilder::new(Format::Bdf, &["Fp1", "Status"])
            .n_data_records(2)
            .uniform_samples_per_record(2)
            .build()
            .unwrap();
        let mut bytes = encode_header(&header).unwrap().bytes;
        for record in 0..2u8 {
            bytes.extend_from_slice(&[1, 0, 0, 2, 0, 0]);
            bytes.extend_from_slice(&[record, 0x10, 0xFE, record + 1, 0x20, 0xFF]);
        }
        let opts = ReadOptions::default().read_status(true);
        let rec = decode_mapped::<i32>(&bytes, &header, &opts).unwrap();
        assert_eq!(rec.data.n_rows(), 1);
        assert_eq!(rec.data.row(0), &[1, 2, 1, 2]);
        let status = rec.status.unwrap();
        assert_eq!(status.low, vec![0, 1, 1, 2]);
        assert_eq!(status.high, vec![0x10, 0x20, 0x10, 0x20]);
        assert_eq!(status.status, vec![0xFE, 0xFF, 0xFE, 0xFF]);
        assert_eq!(rec.header.labels, vec!["Fp1", "Status"]);
        // 整数输出请求偏移会给出诊断
        assert_eq!(rec.diagnostics, vec![Diagnostic::OffsetIgnoredForIntegerOutput]);
    }

    #[test]
    fn test_missing_status_channel() {
        let header = bdf_header();
        let bytes = image(&header, 0);
        let opts = ReadOptions::default().read_status(true);
        assert!(matches!(
            decode_mapped::<f64>(&bytes, &header, &opts),
            Err(BdfError::MissingAuxiliaryChannel)
        ));
    }

    #[test]
    fn test_truncated_payload() {
        let header = bdf_header();
        let mut bytes = image(&header, 0);
        bytes.truncate(bytes.len() - 5);
        assert!(matches!(
            decode_mapped::<f64>(&bytes, &header, &ReadOptions::default()),
            Err(BdfError::Io(_))
        ));
        assert!(matches!(
            decode::<f64, _>(Cursor::new(bytes), &header, &ReadOptions::default()),
            Err(BdfError::Io(_))
        ));
    }

    #[test]
    fn test_edf_heterogeneous_rates() {
        let header = HeaderBuilder::new(Format::Edf, &["EEG", "Resp"])
            .n_data_records(3)
            .samples_per_record(vec![5, 2])
            .build()
            .unwrap();
        let bytes = image(&header, 100);
        let rec = decode::<i32, _>(Cursor::new(bytes), &header, &ReadOptions::default()).unwrap();
        assert_eq!(rec.data.row(0), &[100, 101, 102, 103, 104, 107, 108, 109, 110, 111, 114, 115, 116, 117, 118]);
        assert_eq!(rec.data.row(1), &[105, 106, 112, 113, 119, 120]);
    }

    #[test]
    fn test_concurrency_invariance() {
        let header = HeaderBuilder::new(Format::Bdf, &["A", "B", "C"])
            .n_data_records(40)
            .samples_per_record(vec![16, 8, 4])
            .physical_range(vec![-3.3; 3], vec![7.1; 3])
            .build()
            .unwrap();
        let bytes = image(&header, -5000);
        let single = decode_mapped::<f32>(&bytes, &header, &ReadOptions::default().concurrency(1)).unwrap();
        for workers in [2, 8] {
            let opts = ReadOptions::default().concurrency(workers);
            let mapped = decode_mapped::<f32>(&bytes, &header, &opts).unwrap();
            let seq = decode::<f32, _>(Cursor::new(bytes.clone()), &header, &opts).unwrap();
            for (a, b) in single.data.rows().iter().zip(mapped.data.rows()) {
                assert!(a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits()));
            }
            assert_eq!(seq.data, single.data);
        }
    }

    #[test]
    fn test_unknown_record_count_is_inferred() {
        let header = bdf_header();
        let bytes = image(&header, 0);
        let mut unknown = header.clone();
        unknown.n_data_records = 0;
        unknown.record_count_unknown = true;
        let rec = decode_mapped::<i32>(&bytes, &unknown, &ReadOptions::default()).unwrap();
        assert_eq!(rec.header.n_data_records, 6);
        assert_eq!(rec.data.row(0).len(), 24);
    }
}
