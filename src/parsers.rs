//! Tunehall // Parsers
//!
//! Parsers for the duration-string coercions accepted by the queue store and the API surface.

use regex::Regex;

/// Holds the parsers used to parse the different duration syntaxes tracks can arrive in.
pub struct TimeParser {
    /// Regex parser for the suffix syntax (`90s`, `3m`, `1h`).
    suffix_parser: Regex,

    /// Regex parser for the semicolon syntax (`4:31`, `1:02:03`).
    semicolon_parser: Regex,
}

impl TimeParser {
    /// Creates a new instance of the time parser.
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            suffix_parser: Regex::new(r"^((\d{1,6})[sS]?|(\d{1,6})[mM]|(\d{1,6})[hH])$")?,
            semicolon_parser: Regex::new(r"^(((\d{1,3}):([0-5]\d)|(\d{1,3})):([0-5]\d))$")?,
        })
    }

    /// Parses a time suffix returning the number of seconds.
    pub fn suffix_syntax(&self, data: &str) -> Option<u32> {
        let captures = self.suffix_parser.captures(data)?;

        if let Some(seconds) = captures.get(2) {
            // `00s`/`00` syntax.
            seconds.as_str().parse::<u32>().ok()
        } else if let Some(minutes) = captures.get(3) {
            // `00m` syntax.
            let minutes = minutes.as_str().parse::<u32>().ok()?;
            Some(minutes * 60)
        } else if let Some(hours) = captures.get(4) {
            // `00h` syntax.
            let hours = hours.as_str().parse::<u32>().ok()?;
            Some(hours * 60 * 60)
        } else {
            None
        }
    }

    /// Parses a time semicolon syntax returning the number of seconds.
    pub fn semicolon_syntax(&self, data: &str) -> Option<u32> {
        let captures = self.semicolon_parser.captures(data)?;

        let hours_minutes = match captures.get(3) {
            Some(x) => {
                // `00:00:00` syntax.
                let hours = x.as_str().parse::<u32>().ok()?;
                let minutes = captures.get(4)?.as_str().parse::<u32>().ok()?;

                (hours * 60 * 60) + (minutes * 60)
            }
            None => {
                // `00:00` syntax.
                let minutes = captures.get(5)?.as_str().parse::<u32>().ok()?;

                minutes * 60
            }
        };

        let seconds = captures.get(6)?.as_str().parse::<u32>().ok()?;

        Some(hours_minutes + seconds)
    }

    /// Coerces any recognized duration string into a whole number of seconds.
    ///
    /// Accepts trailing semicolons and surrounding whitespace, matching the loose
    /// strings that arrive from legacy queue snapshots (e.g. `"215;"`).
    pub fn coerce_seconds(&self, data: &str) -> Option<u32> {
        let trimmed = data.trim().trim_end_matches(';');
        if trimmed.is_empty() {
            return None;
        }
        self.semicolon_syntax(trimmed)
            .or_else(|| self.suffix_syntax(trimmed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_syntax_parses_each_unit() {
        let parser = TimeParser::new().unwrap();
        assert_eq!(parser.coerce_seconds("90s"), Some(90));
        assert_eq!(parser.coerce_seconds("3m"), Some(180));
        assert_eq!(parser.coerce_seconds("1h"), Some(3600));
        assert_eq!(parser.coerce_seconds("273"), Some(273));
    }

    #[test]
    fn semicolon_syntax_parses_minutes_and_hours() {
        let parser = TimeParser::new().unwrap();
        assert_eq!(parser.coerce_seconds("4:31"), Some(4 * 60 + 31));
        assert_eq!(parser.coerce_seconds("1:02:03"), Some(3600 + 120 + 3));
    }

    #[test]
    fn coerce_seconds_strips_trailing_semicolon() {
        let parser = TimeParser::new().unwrap();
        assert_eq!(parser.coerce_seconds("215;"), Some(215));
    }

    #[test]
    fn coerce_seconds_rejects_garbage() {
        let parser = TimeParser::new().unwrap();
        assert_eq!(parser.coerce_seconds("not-a-duration"), None);
    }
}
