//! Culture-invariant formatting for numbers and timestamps.
//!
//! Reports are meant to be read by humans and compared across hosts, so numbers are always rendered the same way
//! regardless of locale: integers as plain decimal digits, and floating-point values as the shortest string that
//! round-trips back to the same value. Floating-point values use fixed notation for "reasonable" magnitudes and switch
//! to scientific notation (`1.5E+20`, `1E-05`) outside of that range.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};

/// Decimal exponents strictly between these bounds are rendered in fixed notation.
const FIXED_NOTATION_MIN_EXPONENT: i32 = -5;
const FIXED_NOTATION_MAX_EXPONENT: i32 = 15;

/// Formats numeric values into a string buffer.
///
/// Holds onto the scratch buffers used by the underlying integer and floating-point formatters, so a single formatter
/// can be reused for an entire report without allocating per value.
pub(crate) struct InvariantFormatter {
    int_writer: itoa::Buffer,
    float_writer: ryu::Buffer,
    digits: String,
}

impl InvariantFormatter {
    pub fn new() -> Self {
        Self { int_writer: itoa::Buffer::new(), float_writer: ryu::Buffer::new(), digits: String::new() }
    }

    /// Appends a signed integer.
    pub fn push_i64(&mut self, buf: &mut String, value: i64) {
        buf.push_str(self.int_writer.format(value));
    }

    /// Appends an unsigned integer.
    pub fn push_u64(&mut self, buf: &mut String, value: u64) {
        buf.push_str(self.int_writer.format(value));
    }

    /// Appends a floating-point value.
    pub fn push_f64(&mut self, buf: &mut String, value: f64) {
        if value.is_nan() {
            buf.push_str("NaN");
            return;
        }

        if value.is_infinite() {
            buf.push_str(if value.is_sign_positive() { "Infinity" } else { "-Infinity" });
            return;
        }

        // `ryu` gives us the shortest round-trippable digits, but picks its own layout (`1.0`, `1e16`, `1.5e-7`), so
        // we pull the digits and the decimal exponent back out and lay them out ourselves.
        let raw = self.float_writer.format_finite(value);
        let (negative, raw) = match raw.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let (mantissa, exponent) = match raw.split_once('e') {
            Some((mantissa, exponent)) => (mantissa, exponent.parse::<i32>().unwrap_or(0)),
            None => (raw, 0),
        };
        let (integral, fractional) = mantissa.split_once('.').unwrap_or((mantissa, ""));

        self.digits.clear();
        self.digits.push_str(integral);
        self.digits.push_str(fractional);

        let leading_zeros = self.digits.len() - self.digits.trim_start_matches('0').len();
        self.digits.drain(..leading_zeros);

        // Position of the decimal point relative to the start of `digits`.
        #[allow(clippy::cast_possible_wrap)]
        let point = integral.len() as i32 - leading_zeros as i32 + exponent;
        let significant_len = self.digits.trim_end_matches('0').len();
        self.digits.truncate(significant_len);

        if negative {
            buf.push('-');
        }

        if self.digits.is_empty() {
            buf.push('0');
            return;
        }

        let scientific_exponent = point - 1;
        if FIXED_NOTATION_MIN_EXPONENT < scientific_exponent && scientific_exponent < FIXED_NOTATION_MAX_EXPONENT {
            push_fixed(buf, &self.digits, point);
        } else {
            push_scientific(buf, &self.digits, scientific_exponent);
        }
    }
}

fn push_fixed(buf: &mut String, digits: &str, point: i32) {
    if point <= 0 {
        buf.push_str("0.");
        for _ in point..0 {
            buf.push('0');
        }
        buf.push_str(digits);
        return;
    }

    #[allow(clippy::cast_sign_loss)]
    let point = point as usize;
    if point >= digits.len() {
        buf.push_str(digits);
        for _ in digits.len()..point {
            buf.push('0');
        }
    } else {
        buf.push_str(&digits[..point]);
        buf.push('.');
        buf.push_str(&digits[point..]);
    }
}

fn push_scientific(buf: &mut String, digits: &str, exponent: i32) {
    buf.push_str(&digits[..1]);
    if digits.len() > 1 {
        buf.push('.');
        buf.push_str(&digits[1..]);
    }

    buf.push('E');
    buf.push(if exponent < 0 { '-' } else { '+' });
    let _ = write!(buf, "{:02}", exponent.unsigned_abs());
}

/// Appends a UTC timestamp as `yyyy-MM-ddTHH:mm:ss.fffffffZ`.
///
/// Sub-second precision is truncated to 100-nanosecond ticks.
pub(crate) fn push_timestamp(buf: &mut String, timestamp: &DateTime<Utc>) {
    // Leap seconds are represented by chrono as a nanosecond value above one billion.
    let ticks = timestamp.timestamp_subsec_nanos().min(999_999_999) / 100;
    let _ = write!(buf, "{}.{:07}Z", timestamp.format("%Y-%m-%dT%H:%M:%S"), ticks);
}
