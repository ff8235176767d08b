//! Header data model and its fixed-width ASCII codec.
//!
//! A header is a 256-byte general block followed by `n_channels` blocks of
//! 256 bytes. Inside the channel part every field is stored as a contiguous
//! run of `n_channels` fixed-width entries (all labels, then all transducers,
//! and so on), so field `k` of channel `i` starts at
//! `n_channels * (width_0 + .. + width_{k-1}) + i * width_k`.

use std::io::Read;

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};

use crate::diagnostics::Diagnostic;
use crate::error::{BdfError, Result};
use crate::selector::Selection;
use crate::types::Format;
use crate::utils::{field_text, format_number, parse_int_field, parse_real_field, put_field};
use crate::{HEADER_BLOCK_SIZE, MAX_CHANNELS};

// 通用头部字段宽度（字节）
const ID_CODE_WIDTH: usize = 7;
const SUBJECT_WIDTH: usize = 80;
const RECORDING_WIDTH: usize = 80;
const DATE_WIDTH: usize = 8;
const TIME_WIDTH: usize = 8;
const HEADER_BYTES_WIDTH: usize = 8;
const VERSION_WIDTH: usize = 44;
const RECORDS_WIDTH: usize = 8;
const DURATION_WIDTH: usize = 8;
const CHANNELS_WIDTH: usize = 4;

// 通道字段宽度：label, transducer, unit, physMin, physMax, digMin, digMax, prefilter, samples, reserved
const CHANNEL_FIELD_WIDTHS: [usize; 10] = [16, 80, 8, 8, 8, 8, 8, 80, 8, 32];

/// Label identifying the BDF status channel.
pub const STATUS_LABEL: &str = "Status";

/// Metadata of one recording.
///
/// The per-channel vectors are parallel: entry `i` of each describes channel
/// `i`, and every one of them has exactly `n_channels` entries. All
/// construction paths ([`decode_header`], [`HeaderBuilder::build`],
/// [`Header::narrow`]) check this with [`Header::validate`].
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub format: Format,
    pub id_code: String,
    pub subject_id: String,
    pub recording_id: String,
    pub start_date: NaiveDate,
    pub start_time: NaiveTime,
    /// The 44-byte version/reserved field ("24BIT" for BDF).
    pub version: String,
    pub n_data_records: usize,
    /// Seconds per record.
    pub record_duration: f64,
    pub n_channels: usize,

    pub labels: Vec<String>,
    pub transducers: Vec<String>,
    pub units: Vec<String>,
    pub phys_min: Vec<f64>,
    pub phys_max: Vec<f64>,
    pub dig_min: Vec<i32>,
    pub dig_max: Vec<i32>,
    pub prefilters: Vec<String>,
    pub samples_per_record: Vec<usize>,
    pub reserved: Vec<String>,

    /// The file declared `-1` records; the reader fills in the real count.
    pub(crate) record_count_unknown: bool,
}

impl Header {
    /// Checks the per-channel invariants.
    pub fn validate(&self) -> Result<()> {
        let n = self.n_channels;
        let lengths = [
            ("labels", self.labels.len()),
            ("transducers", self.transducers.len()),
            ("units", self.units.len()),
            ("phys_min", self.phys_min.len()),
            ("phys_max", self.phys_max.len()),
            ("dig_min", self.dig_min.len()),
            ("dig_max", self.dig_max.len()),
            ("prefilters", self.prefilters.len()),
            ("samples_per_record", self.samples_per_record.len()),
            ("reserved", self.reserved.len()),
        ];
        for (field, found) in lengths {
            if found != n {
                return Err(BdfError::ChannelCountMismatch {
                    field,
                    expected: n,
                    found,
                });
            }
        }

        for ch in 0..n {
            if self.phys_min[ch] == self.phys_max[ch] {
                return Err(BdfError::PhysicalMinEqualsMax(ch));
            }
            if self.dig_min[ch] == self.dig_max[ch] {
                return Err(BdfError::DigitalMinEqualsMax(ch));
            }
            if self.dig_min[ch] > self.dig_max[ch] {
                return Err(BdfError::malformed(
                    "dig_min",
                    format!("{} > {}", self.dig_min[ch], self.dig_max[ch]),
                ));
            }
            if self.samples_per_record[ch] == 0 {
                return Err(BdfError::malformed("samples_per_record", "0"));
            }
        }

        if !(self.record_duration > 0.0) || !self.record_duration.is_finite() {
            return Err(BdfError::malformed(
                "record_duration",
                self.record_duration.to_string(),
            ));
        }
        Ok(())
    }

    /// Size of the encoded header in bytes.
    pub fn header_len_bytes(&self) -> usize {
        HEADER_BLOCK_SIZE * (self.n_channels + 1)
    }

    /// Size of one data record in bytes.
    pub fn record_len_bytes(&self) -> usize {
        self.samples_per_record.iter().sum::<usize>() * self.format.word_size()
    }

    /// Byte offset of every channel inside a record.
    pub fn channel_byte_offsets(&self) -> Vec<usize> {
        let word = self.format.word_size();
        self.samples_per_record
            .iter()
            .scan(0usize, |acc, &spr| {
                let offset = *acc;
                *acc += spr * word;
                Some(offset)
            })
            .collect()
    }

    /// Length of the recording in seconds.
    pub fn total_duration(&self) -> f64 {
        self.n_data_records as f64 * self.record_duration
    }

    /// Zero-based index of the BDF status channel, if this header has one.
    pub fn status_channel(&self) -> Option<usize> {
        if self.format != Format::Bdf {
            return None;
        }
        let last = self.labels.len().checked_sub(1)?;
        self.labels[last]
            .eq_ignore_ascii_case(STATUS_LABEL)
            .then_some(last)
    }

    /// Number of channels carrying signal data (everything but the status channel).
    pub fn signal_channel_count(&self) -> usize {
        match self.status_channel() {
            Some(_) => self.n_channels - 1,
            None => self.n_channels,
        }
    }

    /// Zero-based index of the first channel labelled `label`.
    pub fn channel_index(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    /// Returns a new header describing only the selected channels and records.
    ///
    /// `channels` indexes signal channels (1-based); a status channel is kept
    /// as the last channel whatever the selection. `records` only changes the
    /// record count.
    pub fn narrow(&self, channels: &Selection, records: &Selection) -> Result<Header> {
        let signal_count = self.signal_channel_count();
        if let Some(last) = channels.last() {
            if last > signal_count {
                return Err(BdfError::SelectionOutOfRange {
                    expr: format!("channels {:?}", channels.indices()),
                    limit: signal_count,
                });
            }
        }
        if let Some(last) = records.last() {
            if last > self.n_data_records {
                return Err(BdfError::SelectionOutOfRange {
                    expr: format!("records {:?}", records.indices()),
                    limit: self.n_data_records,
                });
            }
        }

        let mut keep: Vec<usize> = channels.zero_based().collect();
        keep.extend(self.status_channel());

        fn pick<T: Clone>(values: &[T], keep: &[usize]) -> Vec<T> {
            keep.iter().map(|&i| values[i].clone()).collect()
        }

        let narrowed = Header {
            format: self.format,
            id_code: self.id_code.clone(),
            subject_id: self.subject_id.clone(),
            recording_id: self.recording_id.clone(),
            start_date: self.start_date,
            start_time: self.start_time,
            version: self.version.clone(),
            n_data_records: records.len(),
            record_duration: self.record_duration,
            n_channels: keep.len(),
            labels: pick(&self.labels, &keep),
            transducers: pick(&self.transducers, &keep),
            units: pick(&self.units, &keep),
            phys_min: pick(&self.phys_min, &keep),
            phys_max: pick(&self.phys_max, &keep),
            dig_min: pick(&self.dig_min, &keep),
            dig_max: pick(&self.dig_max, &keep),
            prefilters: pick(&self.prefilters, &keep),
            samples_per_record: pick(&self.samples_per_record, &keep),
            reserved: pick(&self.reserved, &keep),
            record_count_unknown: false,
        };
        narrowed.validate()?;
        Ok(narrowed)
    }
}

/// Builds a [`Header`] from labels, filling omitted fields with defaults.
///
/// Defaults: the format's id code and version string, empty text fields,
/// digital extrema equal to the sample word range, physical extrema equal to
/// the digital extrema, one sample per record, one-second records, start at
/// 01.01.85 00.00.00.
///
/// # Examples
///
/// ```rust
/// use bdfplus::{Format, HeaderBuilder};
///
/// let header = HeaderBuilder::new(Format::Bdf, &["Fp1", "Fp2"])
///     .subject_id("S01")
///     .n_data_records(60)
///     .uniform_samples_per_record(512)
///     .physical_range(vec![-262144.0; 2], vec![262143.0; 2])
///     .units(vec!["uV".to_string(); 2])
///     .build()?;
///
/// assert_eq!(header.n_channels, 2);
/// assert_eq!(header.id_code, "BIOSEMI");
/// assert_eq!(header.record_len_bytes(), 2 * 512 * 3);
/// # Ok::<(), bdfplus::BdfError>(())
/// ```
#[derive(Debug, Clone)]
pub struct HeaderBuilder {
    format: Format,
    id_code: Option<String>,
    subject_id: String,
    recording_id: String,
    start: Option<(NaiveDate, NaiveTime)>,
    version: Option<String>,
    n_data_records: usize,
    record_duration: f64,
    labels: Vec<String>,
    transducers: Option<Vec<String>>,
    units: Option<Vec<String>>,
    phys_range: Option<(Vec<f64>, Vec<f64>)>,
    dig_range: Option<(Vec<i32>, Vec<i32>)>,
    prefilters: Option<Vec<String>>,
    samples_per_record: Option<Vec<usize>>,
    reserved: Option<Vec<String>>,
}

impl HeaderBuilder {
    pub fn new<S: AsRef<str>>(format: Format, labels: &[S]) -> Self {
        HeaderBuilder {
            format,
            id_code: None,
            subject_id: String::new(),
            recording_id: String::new(),
            start: None,
            version: None,
            n_data_records: 0,
            record_duration: 1.0,
            labels: labels.iter().map(|s| s.as_ref().to_string()).collect(),
            transducers: None,
            units: None,
            phys_range: None,
            dig_range: None,
            prefilters: None,
            samples_per_record: None,
            reserved: None,
        }
    }

    pub fn id_code(mut self, id_code: impl Into<String>) -> Self {
        self.id_code = Some(id_code.into());
        self
    }

    pub fn subject_id(mut self, subject_id: impl Into<String>) -> Self {
        self.subject_id = subject_id.into();
        self
    }

    pub fn recording_id(mut self, recording_id: impl Into<String>) -> Self {
        self.recording_id = recording_id.into();
        self
    }

    pub fn start(mut self, date: NaiveDate, time: NaiveTime) -> Self {
        self.start = Some((date, time));
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn n_data_records(mut self, n: usize) -> Self {
        self.n_data_records = n;
        self
    }

    pub fn record_duration(mut self, seconds: f64) -> Self {
        self.record_duration = seconds;
        self
    }

    pub fn transducers(mut self, transducers: Vec<String>) -> Self {
        self.transducers = Some(transducers);
        self
    }

    pub fn units(mut self, units: Vec<String>) -> Self {
        self.units = Some(units);
        self
    }

    pub fn physical_range(mut self, min: Vec<f64>, max: Vec<f64>) -> Self {
        self.phys_range = Some((min, max));
        self
    }

    pub fn digital_range(mut self, min: Vec<i32>, max: Vec<i32>) -> Self {
        self.dig_range = Some((min, max));
        self
    }

    pub fn prefilters(mut self, prefilters: Vec<String>) -> Self {
        self.prefilters = Some(prefilters);
        self
    }

    pub fn samples_per_record(mut self, samples: Vec<usize>) -> Self {
        self.samples_per_record = Some(samples);
        self
    }

    /// Same samples-per-record for every channel.
    pub fn uniform_samples_per_record(mut self, samples: usize) -> Self {
        self.samples_per_record = Some(vec![samples; self.labels.len()]);
        self
    }

    pub fn reserved(mut self, reserved: Vec<String>) -> Self {
        self.reserved = Some(reserved);
        self
    }

    pub fn build(self) -> Result<Header> {
        let n = self.labels.len();
        if n > MAX_CHANNELS {
            return Err(BdfError::InvalidSignalCount(n as i64));
        }
        let format = self.format;
        let blank = || vec![String::new(); n];
        let (dig_min, dig_max) = self
            .dig_range
            .unwrap_or_else(|| (vec![format.word_min(); n], vec![format.word_max(); n]));
        let (phys_min, phys_max) = self.phys_range.unwrap_or_else(|| {
            (
                dig_min.iter().map(|&d| d as f64).collect(),
                dig_max.iter().map(|&d| d as f64).collect(),
            )
        });
        let (start_date, start_time) = self.start.unwrap_or_else(default_start);

        let header = Header {
            format,
            id_code: self
                .id_code
                .unwrap_or_else(|| format.default_id_code().to_string()),
            subject_id: self.subject_id,
            recording_id: self.recording_id,
            start_date,
            start_time,
            version: self
                .version
                .unwrap_or_else(|| format.default_version().to_string()),
            n_data_records: self.n_data_records,
            record_duration: self.record_duration,
            n_channels: n,
            labels: self.labels,
            transducers: self.transducers.unwrap_or_else(blank),
            units: self.units.unwrap_or_else(blank),
            phys_min,
            phys_max,
            dig_min,
            dig_max,
            prefilters: self.prefilters.unwrap_or_else(blank),
            samples_per_record: self.samples_per_record.unwrap_or_else(|| vec![1; n]),
            reserved: self.reserved.unwrap_or_else(blank),
            record_count_unknown: false,
        };
        header.validate()?;
        Ok(header)
    }
}

fn default_start() -> (NaiveDate, NaiveTime) {
    (
        NaiveDate::from_ymd_opt(1985, 1, 1).unwrap_or_default(),
        NaiveTime::from_hms_opt(0, 0, 0).unwrap_or_default(),
    )
}

/// Reads and parses a complete header (general block and channel blocks).
///
/// Leaves `reader` positioned at the first data record.
pub fn decode_header<R: Read>(reader: &mut R) -> Result<Header> {
    let mut main = [0u8; HEADER_BLOCK_SIZE];
    reader.read_exact(&mut main)?;

    let format = Format::from_id_byte(main[0]).ok_or_else(|| {
        BdfError::UnsupportedFileType(format!("unknown identification byte 0x{:02X}", main[0]))
    })?;

    let mut fields = FieldCursor { bytes: &main, pos: 1 };
    let mut take = |width: usize| fields.take(width);
    let id_code = field_text(take(ID_CODE_WIDTH));
    let subject_id = field_text(take(SUBJECT_WIDTH));
    let recording_id = field_text(take(RECORDING_WIDTH));
    let date_field = take(DATE_WIDTH);
    let time_field = take(TIME_WIDTH);
    let header_bytes = parse_int_field("header_bytes", take(HEADER_BYTES_WIDTH))?;
    let version = field_text(take(VERSION_WIDTH));
    let records = parse_int_field("n_data_records", take(RECORDS_WIDTH))?;
    let record_duration = parse_real_field("record_duration", take(DURATION_WIDTH))?;
    let n_channels = parse_int_field("n_channels", take(CHANNELS_WIDTH))?;

    let (start_date, start_time) = parse_start(date_field, time_field)?;

    if n_channels < 1 || n_channels > MAX_CHANNELS as i64 {
        return Err(BdfError::InvalidSignalCount(n_channels));
    }
    let n = n_channels as usize;
    if header_bytes != (HEADER_BLOCK_SIZE * (n + 1)) as i64 {
        return Err(BdfError::malformed("header_bytes", header_bytes.to_string()));
    }
    let (n_data_records, record_count_unknown) = match records {
        -1 => (0, true),
        r if r >= 0 => (r as usize, false),
        r => return Err(BdfError::malformed("n_data_records", r.to_string())),
    };

    // 读取通道头部
    let mut block = vec![0u8; n * HEADER_BLOCK_SIZE];
    reader.read_exact(&mut block)?;

    let entry = |k: usize, i: usize| channel_entry(&block, n, k, i);

    let mut header = Header {
        format,
        id_code,
        subject_id,
        recording_id,
        start_date,
        start_time,
        version,
        n_data_records,
        record_duration,
        n_channels: n,
        labels: Vec::with_capacity(n),
        transducers: Vec::with_capacity(n),
        units: Vec::with_capacity(n),
        phys_min: Vec::with_capacity(n),
        phys_max: Vec::with_capacity(n),
        dig_min: Vec::with_capacity(n),
        dig_max: Vec::with_capacity(n),
        prefilters: Vec::with_capacity(n),
        samples_per_record: Vec::with_capacity(n),
        reserved: Vec::with_capacity(n),
        record_count_unknown,
    };

    for i in 0..n {
        header.labels.push(field_text(entry(0, i)));
        header.transducers.push(field_text(entry(1, i)));
        header.units.push(field_text(entry(2, i)));
        header.phys_min.push(parse_real_field("phys_min", entry(3, i))?);
        header.phys_max.push(parse_real_field("phys_max", entry(4, i))?);
        header.dig_min.push(parse_i32_field("dig_min", entry(5, i))?);
        header.dig_max.push(parse_i32_field("dig_max", entry(6, i))?);
        header.prefilters.push(field_text(entry(7, i)));
        let spr = parse_int_field("samples_per_record", entry(8, i))?;
        if spr < 1 {
            return Err(BdfError::malformed("samples_per_record", spr.to_string()));
        }
        header.samples_per_record.push(spr as usize);
        header.reserved.push(field_text(entry(9, i)));
    }

    header.validate()?;
    tracing::debug!(
        format = ?header.format,
        channels = header.n_channels,
        records = header.n_data_records,
        "decoded header"
    );
    Ok(header)
}

struct FieldCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> FieldCursor<'a> {
    fn take(&mut self, width: usize) -> &'a [u8] {
        let field = &self.bytes[self.pos..self.pos + width];
        self.pos += width;
        field
    }
}

/// Field `k` of channel `i` in a block of `n` channel headers.
fn channel_entry(block: &[u8], n: usize, k: usize, i: usize) -> &[u8] {
    let preceding: usize = CHANNEL_FIELD_WIDTHS[..k].iter().sum();
    let width = CHANNEL_FIELD_WIDTHS[k];
    let start = preceding * n + i * width;
    &block[start..start + width]
}

fn parse_i32_field(field: &'static str, bytes: &[u8]) -> Result<i32> {
    let value = parse_int_field(field, bytes)?;
    i32::try_from(value).map_err(|_| BdfError::malformed(field, value.to_string()))
}

/// 解析日期 "dd.mm.yy" 和时间 "hh.mm.ss"
fn parse_start(date_field: &[u8], time_field: &[u8]) -> Result<(NaiveDate, NaiveTime)> {
    fn triple(field: &'static str, bytes: &[u8]) -> Result<[u32; 3]> {
        let text = field_text(bytes);
        let parts: Vec<&str> = text.split('.').collect();
        if parts.len() != 3 {
            return Err(BdfError::malformed(field, text));
        }
        let mut out = [0u32; 3];
        for (slot, part) in out.iter_mut().zip(&parts) {
            if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(BdfError::malformed(field, text.clone()));
            }
            *slot = part.parse().map_err(|_| BdfError::malformed(field, text.clone()))?;
        }
        Ok(out)
    }

    let [day, month, yy] = triple("start_date", date_field)?;
    let year = if yy > 84 { 1900 + yy } else { 2000 + yy };
    let date = NaiveDate::from_ymd_opt(year as i32, month, day)
        .ok_or_else(|| BdfError::malformed("start_date", field_text(date_field)))?;

    let [hour, minute, second] = triple("start_time", time_field)?;
    let time = NaiveTime::from_hms_opt(hour, minute, second)
        .ok_or_else(|| BdfError::malformed("start_time", field_text(time_field)))?;

    Ok((date, time))
}

/// Serialized header plus the diagnostics raised while fitting fields.
#[derive(Debug, Clone)]
pub struct EncodedHeader {
    pub bytes: Vec<u8>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Serializes a header. Over-long values are truncated with a diagnostic.
pub fn encode_header(header: &Header) -> Result<EncodedHeader> {
    header.validate()?;
    let n = header.n_channels;
    let mut out = Vec::with_capacity(header.header_len_bytes());
    let mut diagnostics = Vec::new();
    let d = &mut diagnostics;

    out.push(header.format.id_byte());
    put_field(&mut out, "id_code", ID_CODE_WIDTH, &header.id_code, d);
    put_field(&mut out, "subject_id", SUBJECT_WIDTH, &header.subject_id, d);
    put_field(&mut out, "recording_id", RECORDING_WIDTH, &header.recording_id, d);

    // 开始日期 (8字节) "dd.mm.yy"
    let date = format!(
        "{:02}.{:02}.{:02}",
        header.start_date.day(),
        header.start_date.month(),
        header.start_date.year().rem_euclid(100)
    );
    put_field(&mut out, "start_date", DATE_WIDTH, &date, d);

    // 开始时间 (8字节) "hh.mm.ss"
    let time = format!(
        "{:02}.{:02}.{:02}",
        header.start_time.hour(),
        header.start_time.minute(),
        header.start_time.second()
    );
    put_field(&mut out, "start_time", TIME_WIDTH, &time, d);

    let header_bytes = header.header_len_bytes().to_string();
    put_field(&mut out, "header_bytes", HEADER_BYTES_WIDTH, &header_bytes, d);
    put_field(&mut out, "version", VERSION_WIDTH, &header.version, d);
    let records = header.n_data_records.to_string();
    put_field(&mut out, "n_data_records", RECORDS_WIDTH, &records, d);
    let duration = format_number(header.record_duration);
    put_field(&mut out, "record_duration", DURATION_WIDTH, &duration, d);
    put_field(&mut out, "n_channels", CHANNELS_WIDTH, &n.to_string(), d);

    // 通道字段：每个字段连续存放 n 个条目
    let [w_label, w_transducer, w_unit, w_pmin, w_pmax, w_dmin, w_dmax, w_prefilter, w_spr, w_reserved] =
        CHANNEL_FIELD_WIDTHS;
    for label in &header.labels {
        put_field(&mut out, "label", w_label, label, d);
    }
    for transducer in &header.transducers {
        put_field(&mut out, "transducer", w_transducer, transducer, d);
    }
    for unit in &header.units {
        put_field(&mut out, "unit", w_unit, unit, d);
    }
    for &v in &header.phys_min {
        put_field(&mut out, "phys_min", w_pmin, &format_number(v), d);
    }
    for &v in &header.phys_max {
        put_field(&mut out, "phys_max", w_pmax, &format_number(v), d);
    }
    for v in &header.dig_min {
        put_field(&mut out, "dig_min", w_dmin, &v.to_string(), d);
    }
    for v in &header.dig_max {
        put_field(&mut out, "dig_max", w_dmax, &v.to_string(), d);
    }
    for prefilter in &header.prefilters {
        put_field(&mut out, "prefilter", w_prefilter, prefilter, d);
    }
    for spr in &header.samples_per_record {
        put_field(&mut out, "samples_per_record", w_spr, &spr.to_string(), d);
    }
    for reserved in &header.reserved {
        put_field(&mut out, "reserved", w_reserved, reserved, d);
    }

    debug_assert_eq!(out.len(), header.header_len_bytes());
    Ok(EncodedHeader {
        bytes: out,
        diagnostics,
    })
}
