// Number <-> string conversions following the engine's canonical formats
// (integers in decimal, floats as "%.14g" with a trailing ".0" when integral).

use super::LuaValue;

/// Exact float -> integer conversion; `None` when the float has a fractional
/// part or is out of range.
pub fn float_to_integer(f: f64) -> Option<i64> {
    if f.fract() != 0.0 || !f.is_finite() {
        return None;
    }
    // 2^63 is exactly representable; anything >= it overflows i64
    if f >= -9_223_372_036_854_775_808.0 && f < 9_223_372_036_854_775_808.0 {
        Some(f as i64)
    } else {
        None
    }
}

/// Truncating float -> integer conversion used by the host marshaling layer.
pub fn truncate_to_integer(f: f64) -> Option<i64> {
    if f.is_nan() {
        return None;
    }
    float_to_integer(f.trunc())
}

pub fn format_integer(i: i64) -> String {
    let mut buf = itoa::Buffer::new();
    buf.format(i).to_owned()
}

/// Format a float like C's `%.14g`, then append ".0" when the result would
/// read back as an integer.
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        return if f.is_sign_negative() { "-nan".to_string() } else { "nan".to_string() };
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf".to_string() } else { "-inf".to_string() };
    }

    let mut s = format_g14(f);
    if s.bytes().all(|b| b == b'-' || b.is_ascii_digit()) {
        s.push_str(".0");
    }
    s
}

fn format_g14(f: f64) -> String {
    const PRECISION: i32 = 14;
    if f == 0.0 {
        return if f.is_sign_negative() { "-0".to_string() } else { "0".to_string() };
    }

    let sci = format!("{:.*e}", (PRECISION - 1) as usize, f);
    let (mantissa, exponent) = match sci.split_once('e') {
        Some(parts) => parts,
        None => return sci,
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if exponent < -4 || exponent >= PRECISION {
        let mantissa = trim_fraction_zeros(mantissa);
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, sign, exponent.abs())
    } else {
        let decimals = (PRECISION - 1 - exponent).max(0) as usize;
        trim_fraction_zeros(&format!("{:.*}", decimals, f)).to_string()
    }
}

fn trim_fraction_zeros(s: &str) -> &str {
    if !s.contains('.') {
        return s;
    }
    s.trim_end_matches('0').trim_end_matches('.')
}

/// Parse a numeric string the way the engine does for `tonumber` and
/// arithmetic coercion. Leading/trailing whitespace is allowed.
pub fn str_to_number(s: &str) -> Option<LuaValue> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let (negative, body) = match s.as_bytes()[0] {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };

    if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        // Hex integers wrap around on overflow
        let mut value: i64 = 0;
        for b in hex.bytes() {
            let digit = (b as char).to_digit(16)? as i64;
            value = value.wrapping_mul(16).wrapping_add(digit);
        }
        return Some(LuaValue::Integer(if negative { value.wrapping_neg() } else { value }));
    }

    // Reject things Rust accepts but the engine does not
    let valid = body
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'));
    if !valid || body.is_empty() || !body.as_bytes()[0].is_ascii_digit() && body.as_bytes()[0] != b'.' {
        return None;
    }

    if body.bytes().all(|b| b.is_ascii_digit()) {
        let text = if negative { format!("-{}", body) } else { body.to_string() };
        if let Ok(i) = text.parse::<i64>() {
            return Some(LuaValue::Integer(i));
        }
        // Decimal integer overflow falls back to a float
    }

    let f: f64 = body.parse().ok()?;
    Some(LuaValue::Float(if negative { -f } else { f }))
}

/// Coerce a value to a number for arithmetic (numbers and numeric strings).
pub fn to_numeric(value: &LuaValue) -> Option<LuaValue> {
    match value {
        LuaValue::Integer(_) | LuaValue::Float(_) => Some(value.clone()),
        LuaValue::String(s) => str_to_number(s),
        _ => None,
    }
}

/// String form of numbers and strings; `None` for every other type.
pub fn to_str_coerced(value: &LuaValue) -> Option<String> {
    match value {
        LuaValue::String(s) => Some(s.to_string()),
        LuaValue::Integer(i) => Some(format_integer(*i)),
        LuaValue::Float(f) => Some(format_float(*f)),
        _ => None,
    }
}
