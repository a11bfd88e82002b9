use core::fmt;

/* Integer parsing */

pub fn dec_digit_to_u8(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        _ => None,
    }
}

/// Parses the leading decimal integer of `token` on a best-effort basis.
///
/// Leading ASCII whitespace and a single `+` or `-` are accepted, then digits are consumed
/// until the first non-digit. A token without any leading digit parses as `0`, and values
/// outside the `i32` range saturate. This never fails: malformed telemetry always decodes
/// to zero rather than an error, and changing that is a breaking change for consumers of
/// the CAN frames.
pub fn parse_int(token: &[u8]) -> i32 {
    let mut bytes = token.iter().copied().skip_while(u8::is_ascii_whitespace).peekable();

    let negative = match bytes.peek() {
        Some(b'-') => {
            bytes.next();
            true
        }
        Some(b'+') => {
            bytes.next();
            false
        }
        _ => false,
    };

    let mut magnitude = 0i64;

    for digit in bytes.map_while(dec_digit_to_u8) {
        magnitude = (magnitude * 10 + digit as i64).min(i32::MAX as i64 + 1);
    }

    let value = if negative { -magnitude } else { magnitude };

    value.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

/* Fixed point */

/// A sign-and-magnitude value with two decimal digits, e.g. `-2.50`.
///
/// Conversions always truncate toward zero, never round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Centi {
    pub negative: bool,
    pub whole: u32,
    /// Hundredths, always in `0..=99`
    pub frac: u8,
}

impl Centi {
    /// Scales a value given in thousandths (mV, mA) by 0.001.
    pub const fn from_milli(milli: i32) -> Self {
        let magnitude = milli.unsigned_abs();

        Self {
            negative: milli < 0,
            whole: magnitude / 1000,
            frac: ((magnitude % 1000) / 10) as u8,
        }
    }

    /// Scales a value given in hundredths (0.01 kWh) by 0.01.
    pub const fn from_centi(centi: i32) -> Self {
        let magnitude = centi.unsigned_abs();

        Self {
            negative: centi < 0,
            whole: magnitude / 100,
            frac: (magnitude % 100) as u8,
        }
    }

    /// `1` when negative, `0` otherwise (the on-wire sign flag)
    pub const fn sign_flag(&self) -> u8 {
        self.negative as u8
    }

    /// Low byte of the whole part. Whole parts above 255 wrap.
    pub const fn whole_byte(&self) -> u8 {
        self.whole as u8
    }
}

impl fmt::Display for Centi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            f.write_str("-")?;
        }

        write!(f, "{}.{:02}", self.whole, self.frac)
    }
}

/* Byte splitting */

/// The two bytes of the low 16 bits of an integer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WordBytes {
    pub msb: u8,
    pub lsb: u8,
}

impl WordBytes {
    pub const fn split(value: i32) -> Self {
        let [msb, lsb] = (value as u16).to_be_bytes();

        Self { msb, lsb }
    }

    pub const fn as_u16(&self) -> u16 {
        u16::from_be_bytes([self.msb, self.lsb])
    }
}
