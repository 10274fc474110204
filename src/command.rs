//! Command parser: `base -flag value -flag ...`.
//!
//! Tokenizes on whitespace. The first token is the base command; a token
//! starting with `-` opens a flag and the next non-flag token becomes its
//! value. Flags without a value map to the empty string. Unknown flags are
//! kept; validation belongs to the caller.

/// A parsed command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
    base: String,
    args: Vec<(String, String)>,
}

impl Command {
    /// Parse one line. Never fails; empty input yields an empty base.
    pub fn parse(line: &str) -> Self {
        let mut tokens = line.split_whitespace();
        let base = tokens.next().unwrap_or_default().to_owned();
        let mut args: Vec<(String, String)> = Vec::new();
        let mut open: Option<usize> = None;

        for token in tokens {
            if token.starts_with('-') {
                // A repeated flag keeps its first slot; its value is replaced.
                let idx = match args.iter().position(|(flag, _)| flag == token) {
                    Some(idx) => {
                        args[idx].1.clear();
                        idx
                    }
                    None => {
                        args.push((token.to_owned(), String::new()));
                        args.len() - 1
                    }
                };
                open = Some(idx);
            } else if let Some(idx) = open.take() {
                args[idx].1 = token.to_owned();
            }
            // Stray positional tokens after the base are ignored.
        }

        Self { base, args }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Whether `flag` appeared on the line.
    pub fn check(&self, flag: &str) -> bool {
        self.args.iter().any(|(f, _)| f == flag)
    }

    /// Value of `flag`, or `""` when absent or valueless.
    pub fn arg(&self, flag: &str) -> &str {
        self.args
            .iter()
            .find(|(f, _)| f == flag)
            .map_or("", |(_, v)| v.as_str())
    }

    /// Flags in order of first appearance.
    pub fn flags(&self) -> impl Iterator<Item = (&str, &str)> {
        self.args.iter().map(|(f, v)| (f.as_str(), v.as_str()))
    }
}
