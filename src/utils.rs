use crate::diagnostics::{raise, Diagnostic};
use crate::error::{BdfError, Result};

/// 检查字符串是否为有效的整数（可选符号 + 十进制数字）
pub fn is_integer_number(s: &str) -> bool {
    let digits = s.strip_prefix(['+', '-']).unwrap_or(s);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// 检查字符串是否为有效的十进制数字（最多一个小数点，不接受指数、inf、nan）
pub fn is_number(s: &str) -> bool {
    let body = s.strip_prefix(['+', '-']).unwrap_or(s);
    let mut seen_dot = false;
    let mut seen_digit = false;
    for b in body.bytes() {
        match b {
            b'0'..=b'9' => seen_digit = true,
            b'.' if !seen_dot => seen_dot = true,
            _ => return false,
        }
    }
    seen_digit
}

/// Decodes a fixed-width header field as trimmed ASCII text.
pub fn field_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_string()
}

/// Strict base-10 integer parsing of a header field.
pub fn parse_int_field(field: &'static str, bytes: &[u8]) -> Result<i64> {
    let text = field_text(bytes);
    if !is_integer_number(&text) {
        return Err(BdfError::malformed(field, text));
    }
    text.parse::<i64>().map_err(|_| BdfError::malformed(field, text.clone()))
}

/// Strict base-10 real parsing of a header field.
pub fn parse_real_field(field: &'static str, bytes: &[u8]) -> Result<f64> {
    let text = field_text(bytes);
    if !is_number(&text) {
        return Err(BdfError::malformed(field, text));
    }
    text.parse::<f64>().map_err(|_| BdfError::malformed(field, text.clone()))
}

// 工具函数：将字符串转换为 7-bit ASCII，非 ASCII 替换为 '_'
pub fn to_ascii(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { '_' })
        .collect()
}

/// Appends `value` to `out` as a space-padded field of exactly `width` bytes.
///
/// Values wider than the field are cut and a `FieldTruncated` diagnostic is
/// raised; truncation is never an error.
pub fn put_field(
    out: &mut Vec<u8>,
    field: &'static str,
    width: usize,
    value: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let ascii = to_ascii(value);
    let bytes = ascii.as_bytes();
    if bytes.len() > width {
        raise(
            diagnostics,
            Diagnostic::FieldTruncated {
                field,
                width,
                value: ascii.clone(),
            },
        );
        out.extend_from_slice(&bytes[..width]);
    } else {
        out.extend_from_slice(bytes);
        out.resize(out.len() + width - bytes.len(), b' ');
    }
}

/// Shortest decimal rendering of a header number ("100", "-3.25", "0.1").
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}
