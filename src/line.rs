use heapless::Vec;

use crate::MAX_LINE_LENGTH;

pub const FIELD_DELIMITER: u8 = b'\t';
pub const LINE_TERMINATOR: u8 = b'\n';
const CARRIAGE_RETURN: u8 = b'\r';

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LineError {
    #[error("Discarded a line longer than the {0:?} byte line buffer")]
    TooLong(usize),
}

/// Accumulates serial bytes into LF-terminated lines.
///
/// Partial lines survive between calls, so a record split across two reads is decoded once
/// its terminator arrives. A CR directly before the LF is not part of the line.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8, MAX_LINE_LENGTH>,
    /// A CR held back until the next byte shows whether it ends the line
    carriage_return: bool,
    complete: bool,
    overflowed: bool,
}

impl LineBuffer {
    pub const fn new() -> Self {
        Self {
            buf: Vec::new(),
            carriage_return: false,
            complete: false,
            overflowed: false,
        }
    }

    /// Feeds one byte, returning the finished line when `byte` terminates it.
    ///
    /// A line that does not fit in the buffer is dropped up to its terminator and reported
    /// once, when the terminator arrives.
    pub fn push(&mut self, byte: u8) -> Result<Option<&[u8]>, LineError> {
        if self.complete {
            self.buf.clear();
            self.complete = false;
        }

        if byte == LINE_TERMINATOR {
            self.carriage_return = false;

            if self.overflowed {
                self.overflowed = false;
                self.buf.clear();
                return Err(LineError::TooLong(MAX_LINE_LENGTH));
            }

            self.complete = true;

            return Ok(Some(&self.buf[..]));
        }

        if core::mem::take(&mut self.carriage_return) {
            self.store(CARRIAGE_RETURN);
        }

        if byte == CARRIAGE_RETURN {
            self.carriage_return = true;
        } else {
            self.store(byte);
        }

        Ok(None)
    }

    fn store(&mut self, byte: u8) {
        if !self.overflowed && self.buf.push(byte).is_err() {
            self.overflowed = true;
        }
    }

    /// Number of bytes waiting for a terminator
    pub fn pending(&self) -> usize {
        if self.complete || self.overflowed {
            0
        } else {
            self.buf.len() + usize::from(self.carriage_return)
        }
    }
}

/// Lazy sequence of `(key, value)` pairs over one line.
///
/// Each step finds the next tab to end the key, then the following tab (or the end of the
/// line) to end the value, and resumes right after that boundary. The iterator is `Clone`,
/// so a line can be walked again without re-reading it.
#[derive(Debug, Clone)]
pub struct Fields<'a> {
    line: &'a [u8],
    cursor: usize,
}

pub fn fields(line: &[u8]) -> Fields<'_> {
    Fields { line, cursor: 0 }
}

impl<'a> Iterator for Fields<'a> {
    type Item = (&'a [u8], &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let line = self.line;
        let rest = line.get(self.cursor..)?;

        let Some(key_end) = rest.iter().position(|b| *b == FIELD_DELIMITER) else {
            self.cursor = line.len();
            return None;
        };

        let key = &rest[..key_end];
        let after_key = &rest[key_end + 1..];

        let value = match after_key.iter().position(|b| *b == FIELD_DELIMITER) {
            Some(value_end) => {
                self.cursor += key_end + 1 + value_end + 1;
                &after_key[..value_end]
            }
            None => {
                self.cursor = line.len();
                after_key
            }
        };

        Some((key, value))
    }
}
