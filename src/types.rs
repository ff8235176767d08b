/// On-disk record format.
///
/// `Bdf` is the BioSemi 24-bit layout, `Edf` its 16-bit predecessor. Both share
/// the same header field widths; they differ in the identification bytes, the
/// default version string and the sample word width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Bdf,
    Edf,
}

impl Format {
    /// Bytes per sample word.
    pub fn word_size(self) -> usize {
        match self {
            Format::Bdf => 3,
            Format::Edf => 2,
        }
    }

    /// Smallest representable digital value.
    pub fn word_min(self) -> i32 {
        match self {
            Format::Bdf => -(1 << 23),
            Format::Edf => i16::MIN as i32,
        }
    }

    /// Largest representable digital value.
    pub fn word_max(self) -> i32 {
        match self {
            Format::Bdf => (1 << 23) - 1,
            Format::Edf => i16::MAX as i32,
        }
    }

    /// First byte of the file.
    pub fn id_byte(self) -> u8 {
        match self {
            Format::Bdf => 0xFF,
            Format::Edf => b'0',
        }
    }

    pub fn from_id_byte(byte: u8) -> Option<Self> {
        match byte {
            0xFF => Some(Format::Bdf),
            b'0' => Some(Format::Edf),
            _ => None,
        }
    }

    /// Id code written after the id byte when the caller gives none.
    pub fn default_id_code(self) -> &'static str {
        match self {
            Format::Bdf => "BIOSEMI",
            Format::Edf => "",
        }
    }

    /// Version string (the 44-byte reserved field) used when the caller gives none.
    pub fn default_version(self) -> &'static str {
        match self {
            Format::Bdf => "24BIT",
            Format::Edf => "",
        }
    }

    /// Decodes one little-endian two's-complement sample word.
    ///
    /// `bytes` must hold at least [`word_size`](Self::word_size) bytes.
    #[inline]
    pub fn decode_word(self, bytes: &[u8]) -> i32 {
        match self {
            // 3 字节放到 32 位高位，再算术右移完成符号扩展
            Format::Bdf => {
                ((bytes[0] as u32) << 8 | (bytes[1] as u32) << 16 | (bytes[2] as u32) << 24) as i32
                    >> 8
            }
            Format::Edf => i16::from_le_bytes([bytes[0], bytes[1]]) as i32,
        }
    }

    /// Writes the low `word_size` bytes of `value`, least significant first.
    ///
    /// Higher bits of `value` are discarded.
    #[inline]
    pub fn encode_word(self, value: i32, out: &mut [u8]) {
        out[0] = value as u8;
        out[1] = (value >> 8) as u8;
        if self == Format::Bdf {
            out[2] = (value >> 16) as u8;
        }
    }
}

/// Numeric type of decoded samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Precision {
    Int32,
    Int64,
    Float32,
    Float64,
}

impl Precision {
    pub fn is_integer(self) -> bool {
        matches!(self, Precision::Int32 | Precision::Int64)
    }
}

/// How the payload is accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IoStrategy {
    /// One shared cursor; seek+read is serialized, unpacking is parallel.
    #[default]
    Sequential,
    /// The whole file is memory-mapped; workers address it without locking.
    Mapped,
}

/// Element type of a decoded or to-be-encoded matrix.
pub trait Sample: Copy + Default + Send + Sync + PartialEq + std::fmt::Debug + 'static {
    const PRECISION: Precision;

    /// Converts a digital value. Integer types ignore `scale` and `offset`.
    fn from_digital(raw: i32, scale: f64, offset: f64) -> Self;

    fn to_f64(self) -> f64;
}

impl Sample for i32 {
    const PRECISION: Precision = Precision::Int32;

    #[inline]
    fn from_digital(raw: i32, _scale: f64, _offset: f64) -> Self {
        raw
    }

    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }
}

impl Sample for i64 {
    const PRECISION: Precision = Precision::Int64;

    #[inline]
    fn from_digital(raw: i32, _scale: f64, _offset: f64) -> Self {
        raw as i64
    }

    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }
}

impl Sample for f32 {
    const PRECISION: Precision = Precision::Float32;

    #[inline]
    fn from_digital(raw: i32, scale: f64, offset: f64) -> Self {
        (raw as f64 * scale + offset) as f32
    }

    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }
}

impl Sample for f64 {
    const PRECISION: Precision = Precision::Float64;

    #[inline]
    fn from_digital(raw: i32, scale: f64, offset: f64) -> Self {
        raw as f64 * scale + offset
    }

    #[inline]
    fn to_f64(self) -> f64 {
        self
    }
}

/// Channel-major sample matrix: one row per channel, samples in time order.
///
/// Rows may differ in length when channels have different samples-per-record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Matrix<T> {
    rows: Vec<Vec<T>>,
}

impl<T: Sample> Matrix<T> {
    pub fn from_rows(rows: Vec<Vec<T>>) -> Self {
        Matrix { rows }
    }

    /// Matrix of `lengths.len()` rows filled with `T::default()`.
    pub fn zeroed(lengths: &[usize]) -> Self {
        Matrix {
            rows: lengths.iter().map(|&n| vec![T::default(); n]).collect(),
        }
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn row(&self, channel: usize) -> &[T] {
        &self.rows[channel]
    }

    pub fn rows(&self) -> &[Vec<T>] {
        &self.rows
    }

    pub(crate) fn rows_mut(&mut self) -> &mut [Vec<T>] {
        &mut self.rows
    }

    pub fn into_rows(self) -> Vec<Vec<T>> {
        self.rows
    }

    pub fn get(&self, channel: usize, sample: usize) -> Option<T> {
        self.rows.get(channel).and_then(|r| r.get(sample)).copied()
    }
}

/// Decoded BDF status channel: the three bytes of every status word kept apart.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StatusChannel {
    pub low: Vec<u8>,
    pub high: Vec<u8>,
    pub status: Vec<u8>,
}

impl StatusChannel {
    pub fn zeroed(len: usize) -> Self {
        StatusChannel {
            low: vec![0; len],
            high: vec![0; len],
            status: vec![0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.low.len()
    }

    pub fn is_empty(&self) -> bool {
        self.low.is_empty()
    }

    /// 16-bit trigger code (low and high bytes combined).
    pub fn trigger(&self, index: usize) -> u16 {
        self.low[index] as u16 | (self.high[index] as u16) << 8
    }
}

/// Matrix whose element type was chosen at runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleData {
    Int32(Matrix<i32>),
    Int64(Matrix<i64>),
    Float32(Matrix<f32>),
    Float64(Matrix<f64>),
}

impl SampleData {
    pub fn precision(&self) -> Precision {
        match self {
            SampleData::Int32(_) => Precision::Int32,
            SampleData::Int64(_) => Precision::Int64,
            SampleData::Float32(_) => Precision::Float32,
            SampleData::Float64(_) => Precision::Float64,
        }
    }

    pub fn n_rows(&self) -> usize {
        match self {
            SampleData::Int32(m) => m.n_rows(),
            SampleData::Int64(m) => m.n_rows(),
            SampleData::Float32(m) => m.n_rows(),
            SampleData::Float64(m) => m.n_rows(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_ranges() {
        assert_eq!(Format::Bdf.word_min(), -8_388_608);
        assert_eq!(Format::Bdf.word_max(), 8_388_607);
        assert_eq!(Format::Edf.word_min(), -32_768);
        assert_eq!(Format::Edf.word_max(), 32_767);
        assert_eq!(Format::from_id_byte(0xFF), Some(Format::Bdf));
        assert_eq!(Format::from_id_byte(b'0'), Some(Format::Edf));
        assert_eq!(Format::from_id_byte(b'X'), None);
    }

    #[test]
    fn test_decode_word_sign_extension() {
        assert_eq!(Format::Bdf.decode_word(&[0x01, 0x00, 0x00]), 1);
        assert_eq!(Format::Bdf.decode_word(&[0xFF, 0xFF, 0xFF]), -1);
        assert_eq!(Format::Bdf.decode_word(&[0xFF, 0xFF, 0x7F]), 8_388_607);
        assert_eq!(Format::Bdf.decode_word(&[0x00, 0x00, 0x80]), -8_388_608);
        assert_eq!(Format::Bdf.decode_word(&[0x34, 0x12, 0x00]), 0x1234);
        assert_eq!(Format::Edf.decode_word(&[0xFF, 0xFF]), -1);
        assert_eq!(Format::Edf.decode_word(&[0x00, 0x80]), -32_768);
    }

    #[test]
    fn test_encode_word() {
        let mut out = [0u8; 3];
        Format::Bdf.encode_word(-2, &mut out);
        assert_eq!(out, [0xFE, 0xFF, 0xFF]);
        Format::Bdf.encode_word(0x0123_4567, &mut out);
        // 高于 24 位的部分被丢弃
        assert_eq!(out, [0x67, 0x45, 0x23]);
        assert_eq!(Format::Bdf.decode_word(&out), 0x23_4567);

        let mut out = [0u8; 2];
        Format::Edf.encode_word(-300, &mut out);
        assert_eq!(Format::Edf.decode_word(&out), -300);
    }

    #[test]
    fn test_sample_conversion() {
        assert_eq!(<i32 as Sample>::from_digital(-5, 0.5, 10.0), -5);
        assert_eq!(<i64 as Sample>::from_digital(7, 0.5, 10.0), 7);
        assert_eq!(<f64 as Sample>::from_digital(-5, 0.5, 10.0), 7.5);
        assert_eq!(<f32 as Sample>::from_digital(4, 0.25, 0.0), 1.0);
    }

    #[test]
    fn test_status_trigger() {
        let status = StatusChannel {
            low: vec![0x34],
            high: vec![0x12],
            status: vec![0xFF],
        };
        assert_eq!(status.trigger(0), 0x1234);
        assert_eq!(status.len(), 1);
    }
}
