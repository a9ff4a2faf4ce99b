//! PII masking for log output.
//!
//! Log text carrying `field=value;` pairs gets the values of the configured
//! fields replaced with a fixed redaction string before reaching the log
//! writer.

use std::io::{self, Write};
use std::sync::Arc;

use regex::Regex;
use tracing_subscriber::fmt::MakeWriter;

/// Fields treated as personally identifiable in log output.
pub const PII_FIELDS: [&str; 5] = ["name", "email", "phone", "ssn", "password"];

const REDACTION: &str = "***";
const SEPARATOR: char = ';';

/// Replaces the values of the configured fields in `field=value` log text.
#[derive(Debug, Clone)]
pub struct Redactor {
    re: Regex,
    replacement: String,
}

impl Redactor {
    pub fn new(fields: &[&str], redaction: &str, separator: char) -> Self {
        let alternation = fields
            .iter()
            .map(|f| regex::escape(f))
            .collect::<Vec<_>>()
            .join("|");
        let sep = regex::escape(&separator.to_string());
        // Field value runs until the separator (or end of line).
        let re = Regex::new(&format!("\\b({alternation})=[^{sep}]*")).unwrap();
        let replacement = format!("${{1}}={redaction}");
        Self { re, replacement }
    }

    pub fn redact(&self, message: &str) -> String {
        self.re
            .replace_all(message, self.replacement.as_str())
            .into_owned()
    }
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new(&PII_FIELDS, REDACTION, SEPARATOR)
    }
}

/// `MakeWriter` wrapper that masks PII before delegating to the inner writer.
pub struct RedactingWriter<M> {
    inner: M,
    redactor: Arc<Redactor>,
}

impl<M> RedactingWriter<M> {
    pub fn new(inner: M, redactor: Redactor) -> Self {
        Self {
            inner,
            redactor: Arc::new(redactor),
        }
    }
}

impl<'a, M> MakeWriter<'a> for RedactingWriter<M>
where
    M: MakeWriter<'a>,
{
    type Writer = RedactingIo<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingIo {
            inner: self.inner.make_writer(),
            redactor: self.redactor.clone(),
        }
    }
}

pub struct RedactingIo<W> {
    inner: W,
    redactor: Arc<Redactor>,
}

impl<W: Write> Write for RedactingIo<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let masked = self.redactor.redact(&String::from_utf8_lossy(buf));
        self.inner.write_all(masked.as_bytes())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
