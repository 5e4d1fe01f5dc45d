//! General numeric formatting
//!
//! Output cells are written the way C's `%g` writes them: six significant
//! digits, fixed notation for exponents in `-4..6`, scientific notation with
//! a signed two-digit exponent otherwise, and no trailing zeros.

/// Significant digits used by [`format_general`]
pub const PRECISION: usize = 6;

/// Format a number like C's `%g`
pub fn format_general(x: f64) -> String {
    if x.is_nan() {
        return "nan".to_string();
    }
    if x.is_infinite() {
        return if x < 0.0 { "-inf" } else { "inf" }.to_string();
    }
    if x == 0.0 {
        return if x.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    // The exponent must be taken after rounding to PRECISION digits
    let sci = format!("{:.*e}", PRECISION - 1, x);
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };

    if exp < -4 || exp >= PRECISION as i32 {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", trim_zeros(mantissa), sign, exp.abs())
    } else {
        let decimals = (PRECISION as i32 - 1 - exp) as usize;
        trim_zeros(&format!("{:.*}", decimals, x)).to_string()
    }
}

fn trim_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}
