//! Line protocol codec for the color sensor
//!
//! Device → host traffic is ASCII text, one reading per line, each line
//! terminated by a carriage return:
//!
//! ```text
//! R 255 G 128 B 64\r
//! ```
//!
//! Host → device traffic is a single ASCII command byte (see [`Command`]).
//!
//! The codec has two halves: [`LineFramer`] turns an arbitrary chunked byte
//! stream into complete lines, and [`validate`]/[`parse`] check a line against
//! the reading grammar and extract its three values.

mod framer;

pub use framer::{LineFramer, MAX_LINE_LEN};

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

use super::SensorError;

/// Line terminator sent by the firmware
pub const LINE_TERMINATOR: u8 = b'\r';

/// `<label> <digits> <label> <digits> <label> <digits>`, nothing else.
static LINE_GRAMMAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\w) ([0-9]+) (\w) ([0-9]+) (\w) ([0-9]+)$")
        .expect("line grammar is a valid regex")
});

static DIGIT_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]+").expect("digit run is a valid regex"));

/// Commands understood by the sensor firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    /// Store the current reading as the black point
    CalibrateBlack,
    /// Store the current reading as the white point
    CalibrateWhite,
    /// Ask for the current reading
    RequestReading,
}

impl Command {
    /// Wire encoding of the command
    pub fn as_byte(self) -> u8 {
        match self {
            Self::CalibrateBlack => b'0',
            Self::CalibrateWhite => b'1',
            Self::RequestReading => b'2',
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CalibrateBlack => write!(f, "calibrate black"),
            Self::CalibrateWhite => write!(f, "calibrate white"),
            Self::RequestReading => write!(f, "request reading"),
        }
    }
}

/// A decoded RGB reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ColorReading {
    /// Red channel
    pub r: u32,
    /// Green channel
    pub g: u32,
    /// Blue channel
    pub b: u32,
}

impl ColorReading {
    /// Create a new reading
    pub fn new(r: u32, g: u32, b: u32) -> Self {
        Self { r, g, b }
    }

    /// Swatch colour as `#rrggbb`, each channel clamped to 0..=255
    pub fn to_hex(&self) -> String {
        let clamp = |v: u32| v.min(255);
        format!("#{:02x}{:02x}{:02x}", clamp(self.r), clamp(self.g), clamp(self.b))
    }
}

impl fmt::Display for ColorReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R {} G {} B {}", self.r, self.g, self.b)
    }
}

/// A line that matched the grammar, labels included.
///
/// Labels are kept for diagnostics only; they carry no meaning. Values are
/// the first three digit runs of the line, exactly as [`parse`] reads them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedLine {
    /// Label before the first value
    pub label1: char,
    /// Red channel
    pub value1: u32,
    /// Label before the second value
    pub label2: char,
    /// Green channel
    pub value2: u32,
    /// Label before the third value
    pub label3: char,
    /// Blue channel
    pub value3: u32,
}

impl ParsedLine {
    /// Match `line` against the grammar and capture all six fields
    pub fn from_line(line: &str) -> Result<Self, SensorError> {
        let malformed = || SensorError::MalformedLine(line.to_string());
        let caps = LINE_GRAMMAR.captures(line).ok_or_else(|| malformed())?;
        let label = |i: usize| caps[i].chars().next().ok_or_else(|| malformed());

        // A label may itself be a digit, so the captures are not the values
        let reading = parse(line)?;
        Ok(Self {
            label1: label(1)?,
            value1: reading.r,
            label2: label(3)?,
            value2: reading.g,
            label3: label(5)?,
            value3: reading.b,
        })
    }
}

impl From<ParsedLine> for ColorReading {
    fn from(line: ParsedLine) -> Self {
        Self::new(line.value1, line.value2, line.value3)
    }
}

/// Check a line (terminator already stripped) against the reading grammar
pub fn validate(line: &str) -> bool {
    LINE_GRAMMAR.is_match(line)
}

/// Extract a reading from a line.
///
/// Takes the first three maximal digit runs in left-to-right order as r, g, b,
/// without looking at the labels. Fails if there are fewer than three runs or
/// a run does not fit in a `u32`.
pub fn parse(line: &str) -> Result<ColorReading, SensorError> {
    let mut values = DIGIT_RUN
        .find_iter(line)
        .take(3)
        .map(|m| m.as_str().parse::<u32>());

    let mut next = || match values.next() {
        Some(Ok(v)) => Ok(v),
        _ => Err(SensorError::MalformedLine(line.to_string())),
    };

    let r = next()?;
    let g = next()?;
    let b = next()?;
    Ok(ColorReading::new(r, g, b))
}

/// Validate then parse
pub fn try_decode(line: &str) -> Result<ColorReading, SensorError> {
    if !validate(line) {
        return Err(SensorError::MalformedLine(line.to_string()));
    }
    parse(line)
}

/// [`try_decode`], with `None` for anything that is not a reading
pub fn decode(line: &str) -> Option<ColorReading> {
    try_decode(line).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_three_pairs() {
        assert!(validate("R 255 G 128 B 64"));
        assert!(validate("Q 10 Q 20 Q 30"));
        assert!(validate("r 0 g 0 b 0"));
    }

    #[test]
    fn test_validate_rejects_bad_lines() {
        assert!(!validate("R 1 G 2"));
        assert!(!validate("R 1 G 2 B 3 "));
        assert!(!validate("R 1 G 2 B 3 X"));
        assert!(!validate("R 1 G x B 3"));
        assert!(!validate("R  1 G 2 B 3"));
        assert!(!validate(" R 1 G 2 B 3"));
        assert!(!validate("garbage"));
        assert!(!validate(""));
    }

    #[test]
    fn test_parse_ignores_labels() {
        assert_eq!(parse("Q 10 Q 20 Q 30").unwrap(), ColorReading::new(10, 20, 30));
        assert_eq!(parse("R 10 G 20 B 30").unwrap(), ColorReading::new(10, 20, 30));
    }

    #[test]
    fn test_parse_takes_first_three_runs() {
        // parse works on unvalidated lines
        assert_eq!(parse("a1b22c333d4444").unwrap(), ColorReading::new(1, 22, 333));
    }

    #[test]
    fn test_digit_labels_decode_by_position() {
        let line = "1 2 3 4 5 6";
        assert!(validate(line));
        assert_eq!(try_decode(line).unwrap(), ColorReading::new(1, 2, 3));
        assert_eq!(decode(line), Some(ColorReading::new(1, 2, 3)));

        let parsed = ParsedLine::from_line(line).unwrap();
        assert_eq!((parsed.label1, parsed.label2, parsed.label3), ('1', '3', '5'));
        assert_eq!(ColorReading::from(parsed), ColorReading::new(1, 2, 3));
    }

    #[test]
    fn test_try_decode_rejects_invalid_grammar() {
        // parse alone would accept this
        assert!(parse("a1b22c333").is_ok());
        assert!(matches!(
            try_decode("a1b22c333"),
            Err(SensorError::MalformedLine(ref l)) if l == "a1b22c333"
        ));
    }

    #[test]
    fn test_parse_rejects_short_line() {
        assert!(matches!(parse("R 1 G 2"), Err(SensorError::MalformedLine(_))));
        assert!(matches!(parse(""), Err(SensorError::MalformedLine(_))));
    }

    #[test]
    fn test_parse_rejects_overflow() {
        assert!(parse("R 99999999999 G 1 B 1").is_err());
        assert!(decode("R 99999999999 G 1 B 1").is_none());
    }

    #[test]
    fn test_parsed_line_keeps_labels() {
        let line = ParsedLine::from_line("R 255 G 0 B 127").unwrap();
        assert_eq!((line.label1, line.label2, line.label3), ('R', 'G', 'B'));
        assert_eq!(ColorReading::from(line), ColorReading::new(255, 0, 127));
        assert!(ParsedLine::from_line("R 1 G 2").is_err());
    }

    #[test]
    fn test_command_bytes() {
        assert_eq!(Command::CalibrateBlack.as_byte(), b'0');
        assert_eq!(Command::CalibrateWhite.as_byte(), b'1');
        assert_eq!(Command::RequestReading.as_byte(), b'2');
    }

    #[test]
    fn test_reading_hex_clamps() {
        assert_eq!(ColorReading::new(255, 0, 127).to_hex(), "#ff007f");
        assert_eq!(ColorReading::new(300, 16, 1).to_hex(), "#ff1001");
        assert_eq!(ColorReading::new(1, 2, 3).to_string(), "R 1 G 2 B 3");
    }
}
