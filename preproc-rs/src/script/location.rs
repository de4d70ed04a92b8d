//! Source positions and located document lines.

use std::fmt;

/// A 1-based line/column position in the document being preprocessed.
///
/// `Location::default()` (line 0) marks a position that is not known yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    pub fn is_known(self) -> bool {
        self.line > 0
    }

    /// The position `chars` characters to the right on the same line.
    pub fn shifted(self, chars: usize) -> Self {
        Self { line: self.line, column: self.column + chars }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_known() {
            write!(f, "line {}, column {}", self.line, self.column)
        } else {
            f.write_str("unknown location")
        }
    }
}

/// One line of text together with where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedLine {
    pub text: String,
    pub location: Location,
}

impl LocatedLine {
    pub fn new(text: impl Into<String>, location: Location) -> Self {
        Self { text: text.into(), location }
    }

    /// Location of the character at byte offset `offset` within `text`.
    pub fn location_at(&self, offset: usize) -> Location {
        let chars = self.text.get(..offset).map_or(0, |s| s.chars().count());
        self.location.shifted(chars)
    }
}

impl fmt::Display for LocatedLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Split document text into located lines.  A trailing `\r` is dropped from
/// each line; a final newline does not produce an extra empty line.
pub fn split_lines(src: &str) -> Vec<LocatedLine> {
    src.lines()
        .enumerate()
        .map(|(i, text)| LocatedLine::new(text.strip_suffix('\r').unwrap_or(text), Location::new(i + 1, 1)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_numbers_lines_from_one() {
        let lines = split_lines("a\r\nb\n\nc\n");
        let texts: Vec<&str> = lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "", "c"]);
        assert_eq!(lines[3].location, Location::new(4, 1));
    }

    #[test]
    fn location_at_counts_chars() {
        let line = LocatedLine::new("é = 1", Location::new(3, 1));
        // 'é' is two bytes but one column.
        assert_eq!(line.location_at(3), Location::new(3, 3));
    }

    #[test]
    fn display() {
        assert_eq!(Location::new(2, 5).to_string(), "line 2, column 5");
        assert_eq!(Location::default().to_string(), "unknown location");
    }
}
