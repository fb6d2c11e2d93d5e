use crate::config::LoggingConfig;
use regex::Regex;
use std::io;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};

/// Rewrites every chunk through the redaction patterns before it reaches
/// stderr. Settings values (shop names, VAT numbers) end up in log fields.
struct RedactingWriter<W> {
    inner: W,
    patterns: Vec<(Regex, String)>,
}

impl<W: io::Write> io::Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let redacted = redact(&s, &self.patterns);
        self.inner.write_all(redacted.as_bytes())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter {
    patterns: Vec<(Regex, String)>,
}

impl<'a> fmt::MakeWriter<'a> for RedactingMakeWriter {
    type Writer = RedactingWriter<io::Stderr>;

    fn make_writer(&self) -> Self::Writer {
        RedactingWriter {
            inner: io::stderr(),
            patterns: self.patterns.clone(),
        }
    }
}

fn redact(s: &str, patterns: &[(Regex, String)]) -> String {
    let mut redacted = s.to_string();
    for (re, replacement) in patterns {
        redacted = re.replace_all(&redacted, replacement.as_str()).to_string();
    }
    redacted
}

/// Compile the configured patterns. Invalid ones are reported and skipped.
fn compile_patterns(config: &LoggingConfig) -> Vec<(Regex, String)> {
    if !config.redaction.enabled {
        return Vec::new();
    }
    config
        .redaction
        .patterns
        .iter()
        .filter_map(|p| match Regex::new(&p.regex) {
            Ok(re) => Some((re, p.placeholder.clone())),
            Err(e) => {
                eprintln!("warning: ignoring redaction pattern {}: {}", p.name, e);
                None
            }
        })
        .collect()
}

pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.levels.directive()));

    let show_file = config.format.show_file;
    let show_line = config.format.show_line;
    let make_writer = RedactingMakeWriter {
        patterns: compile_patterns(config),
    };

    // Use Layer::boxed() to unify the types of the branches
    let fmt_layer = match (config.json, config.format.show_time) {
        (true, _) => fmt::layer()
            .json()
            .with_writer(make_writer)
            .with_file(show_file)
            .with_line_number(show_line)
            .boxed(),
        (false, false) => fmt::layer()
            .with_writer(make_writer)
            .with_target(show_file)
            .with_file(show_file)
            .with_line_number(show_line)
            .without_time()
            .boxed(),
        (false, true) => fmt::layer()
            .with_writer(make_writer)
            .with_target(show_file)
            .with_file(show_file)
            .with_line_number(show_line)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}
