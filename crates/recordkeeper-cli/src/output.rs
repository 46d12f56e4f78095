//! Terminal output for the CLI
//!
//! Every command prints through a [`Printer`]. In human mode messages are
//! prefixed with a status mark and detail lines are indented; in JSON mode
//! status messages become one-line objects, detail lines are dropped and
//! command results are pretty-printed documents on stdout.

use std::fmt;

/// Output format selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

impl OutputFormat {
    pub fn is_json(&self) -> bool {
        matches!(self, OutputFormat::Json)
    }

    pub fn printer(self) -> Printer {
        Printer { format: self }
    }
}

/// One message, before it is rendered for a format
#[derive(Debug, Clone, Copy)]
enum Line<'a> {
    Success(&'a str),
    Error { code: Option<&'a str>, message: &'a str },
    Warn(&'a str),
    Info(&'a str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

/// A rendered line and where it goes
#[derive(Debug, PartialEq, Eq)]
struct Rendered {
    stream: Stream,
    text: String,
}

impl fmt::Display for Rendered {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Printer {
    format: OutputFormat,
}

impl Printer {
    pub fn success(&self, message: &str) {
        self.emit(Line::Success(message));
    }

    pub fn error(&self, message: &str) {
        self.emit(Line::Error { code: None, message });
    }

    /// Reports a failed lifecycle operation with its machine-readable code
    pub fn failure(&self, code: &str, message: &str) {
        self.emit(Line::Error {
            code: Some(code),
            message,
        });
    }

    pub fn warn(&self, message: &str) {
        self.emit(Line::Warn(message));
    }

    pub fn info(&self, message: &str) {
        self.emit(Line::Info(message));
    }

    /// Prints a command result document; a no-op in human mode
    pub fn print_json(&self, value: &serde_json::Value) {
        if self.format.is_json() {
            println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
        }
    }

    fn emit(&self, line: Line<'_>) {
        match self.render(line) {
            Some(out) if out.stream == Stream::Stderr => eprintln!("{}", out),
            Some(out) => println!("{}", out),
            None => {}
        }
    }

    fn render(&self, line: Line<'_>) -> Option<Rendered> {
        let (stream, text) = match (self.format, line) {
            (OutputFormat::Human, Line::Success(message)) => {
                (Stream::Stdout, format!("\u{2713} {}", message))
            }
            (OutputFormat::Human, Line::Error { code: None, message }) => {
                (Stream::Stderr, format!("\u{2717} Error: {}", message))
            }
            (OutputFormat::Human, Line::Error { code: Some(code), message }) => {
                (Stream::Stderr, format!("\u{2717} Error [{}]: {}", code, message))
            }
            (OutputFormat::Human, Line::Warn(message)) => {
                (Stream::Stderr, format!("\u{26a0} Warning: {}", message))
            }
            (OutputFormat::Human, Line::Info(message)) => (Stream::Stdout, format!("  {}", message)),

            (OutputFormat::Json, Line::Success(message)) => (
                Stream::Stdout,
                serde_json::json!({ "success": true, "message": message }).to_string(),
            ),
            (OutputFormat::Json, Line::Error { code, message }) => {
                let mut value = serde_json::json!({ "success": false, "error": message });
                if let Some(code) = code {
                    value["code"] = code.into();
                }
                (Stream::Stderr, value.to_string())
            }
            (OutputFormat::Json, Line::Warn(message)) => (
                Stream::Stderr,
                serde_json::json!({ "level": "warning", "message": message }).to_string(),
            ),
            (OutputFormat::Json, Line::Info(_)) => return None,
        };
        Some(Rendered { stream, text })
    }
}
