//! Log redaction.
//!
//! Every formatted log line passes through a [`Redactor`] before it reaches
//! the output. A pattern with capture groups has only its groups replaced;
//! a pattern without groups has its whole match replaced.

use std::borrow::Cow;
use std::io;
use std::sync::Arc;

use regex::{NoExpand, Regex, RegexBuilder};
use tracing_subscriber::fmt::MakeWriter;

use crate::error::{Error, Result};

/// Compile a redaction pattern. Matching ignores case.
pub fn compile_pattern(pattern: &str) -> std::result::Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

#[derive(Debug, Clone)]
pub struct Redactor {
    patterns: Vec<Regex>,
    substitute: String,
}

impl Redactor {
    pub fn new(patterns: &[String], substitute: impl Into<String>) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                compile_pattern(p)
                    .map_err(|e| Error::Config(format!("invalid redaction pattern: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            patterns,
            substitute: substitute.into(),
        })
    }

    /// A redactor that leaves text untouched.
    pub fn disabled() -> Self {
        Self {
            patterns: Vec::new(),
            substitute: String::new(),
        }
    }

    pub fn redact<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let mut out = Cow::Borrowed(text);
        for pattern in &self.patterns {
            if !pattern.is_match(&out) {
                continue;
            }
            let replaced = if pattern.captures_len() > 1 {
                self.replace_groups(pattern, &out)
            } else {
                pattern
                    .replace_all(&out, NoExpand(&self.substitute))
                    .into_owned()
            };
            out = Cow::Owned(replaced);
        }
        out
    }

    fn replace_groups(&self, pattern: &Regex, text: &str) -> String {
        let mut result = String::with_capacity(text.len());
        let mut last = 0;
        for caps in pattern.captures_iter(text) {
            for group in caps.iter().skip(1).flatten() {
                // Nested or overlapping groups: the outer one already covered it.
                if group.start() < last {
                    continue;
                }
                result.push_str(&text[last..group.start()]);
                result.push_str(&self.substitute);
                last = group.end();
            }
        }
        result.push_str(&text[last..]);
        result
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// `MakeWriter` that redacts everything written through the inner writer.
#[derive(Clone)]
pub struct RedactingMakeWriter<M> {
    inner: M,
    redactor: Arc<Redactor>,
}

impl<M> RedactingMakeWriter<M> {
    pub fn new(inner: M, redactor: Redactor) -> Self {
        Self {
            inner,
            redactor: Arc::new(redactor),
        }
    }
}

impl<'a, M> MakeWriter<'a> for RedactingMakeWriter<M>
where
    M: MakeWriter<'a>,
{
    type Writer = RedactingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter {
            inner: self.inner.make_writer(),
            redactor: Arc::clone(&self.redactor),
        }
    }
}

pub struct RedactingWriter<W> {
    inner: W,
    redactor: Arc<Redactor>,
}

impl<W: io::Write> io::Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        let clean = self.redactor.redact(&text);
        self.inner.write_all(clean.as_bytes())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoggingConfig;

    fn defaults() -> Redactor {
        let config = LoggingConfig::default();
        Redactor::new(&config.redacted_patterns, config.redacted_substitute).unwrap()
    }

    #[test]
    fn replaces_only_capture_groups() {
        let r = defaults();
        assert_eq!(
            r.redact("GET /api?apikey=abc123&x=1"),
            "GET /api?apikey=<REDACTED>&x=1"
        );
        assert_eq!(
            r.redact("https://discord.com/api/webhooks/123/secret-token"),
            "https://discord.com/api/webhooks/<REDACTED>/<REDACTED>"
        );
    }

    #[test]
    fn matching_ignores_case() {
        let r = defaults();
        assert_eq!(
            r.redact("GET /api?APIKEY=secret123&x=1"),
            "GET /api?APIKEY=<REDACTED>&x=1"
        );
        assert_eq!(r.redact("x-plex-token: abc"), "x-plex-token: <REDACTED>");
        assert_eq!(r.redact("{'ApiKey': 'k9'}"), "{'ApiKey': '<REDACTED>'}");
    }

    #[test]
    fn whole_match_without_groups() {
        let r = Redactor::new(&["hunter2".to_string()], "***").unwrap();
        assert_eq!(r.redact("password is hunter2!"), "password is ***!");
    }

    #[test]
    fn untouched_text_is_borrowed() {
        let r = defaults();
        assert!(matches!(r.redact("nothing to see"), Cow::Borrowed(_)));
        assert!(matches!(Redactor::disabled().redact("apikey=x"), Cow::Borrowed(_)));
    }

    #[test]
    fn writer_redacts_output() {
        use std::io::Write;
        let mut writer = RedactingWriter {
            inner: Vec::new(),
            redactor: Arc::new(defaults()),
        };
        let line = b"Authorization: Bot abc.def-ghi\n";
        assert_eq!(writer.write(line).unwrap(), line.len());
        assert_eq!(
            String::from_utf8(writer.inner).unwrap(),
            "Authorization: Bot <REDACTED>\n"
        );
    }
}
