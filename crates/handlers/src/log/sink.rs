use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{field, info};

/// One access-log entry: ordered key/value pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<(String, String)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a field unless `key` is already present. Returns whether it was added.
    pub fn push(&mut self, key: impl Into<String>, value: impl fmt::Display) -> bool {
        let key = key.into();
        if self.get(&key).is_some() {
            return false;
        }
        self.fields.push((key, value.to_string()));
        true
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<'a> IntoIterator for &'a Record {
    type Item = (&'a str, &'a str);
    type IntoIter = Box<dyn Iterator<Item = (&'a str, &'a str)> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

/// Renders the record as a logfmt line, without the trailing newline.
impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{key}=")?;
            if value.is_empty() || value.contains([' ', '=', '"']) || value.contains(char::is_control) {
                write!(f, "{value:?}")?;
            } else {
                f.write_str(value)?;
            }
        }
        Ok(())
    }
}

/// Destination of access-log records.
#[cfg_attr(test, mockall::automock)]
pub trait LogSink: Send + Sync {
    fn record(&self, record: &Record) -> io::Result<()>;
}

impl<S: LogSink + ?Sized> LogSink for Arc<S> {
    fn record(&self, record: &Record) -> io::Result<()> {
        (**self).record(record)
    }
}

impl<S: LogSink + ?Sized> LogSink for &S {
    fn record(&self, record: &Record) -> io::Result<()> {
        (**self).record(record)
    }
}

/// Fields every access record starts with, see [`with_logger`](super::with_logger).
const BASE_FIELDS: [&str; 10] =
    ["method", "path", "time", "bytes", "status", "remote_addr", "host", "user_agent", "user", "request_id"];

/// Emits each record as one `info` event with target `micro_handlers::access`.
///
/// The base fields become event fields of the same name. Fields appended by handlers are
/// rendered together as logfmt into `extra`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn record(&self, record: &Record) -> io::Result<()> {
        let mut extra = Record::new();
        for (key, value) in record.iter().filter(|(key, _)| !BASE_FIELDS.contains(key)) {
            extra.push(key, value);
        }

        info!(
            target: "micro_handlers::access",
            method = record.get("method"),
            path = record.get("path"),
            time = record.get("time"),
            bytes = record.get("bytes"),
            status = record.get("status"),
            remote_addr = record.get("remote_addr"),
            host = record.get("host"),
            user_agent = record.get("user_agent"),
            user = record.get("user"),
            request_id = record.get("request_id"),
            extra = (!extra.is_empty()).then_some(field::display(&extra)),
            "access"
        );
        Ok(())
    }
}

/// Writes each record as one logfmt line.
#[derive(Debug)]
pub struct LogfmtSink<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> LogfmtSink<W> {
    pub fn new(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> LogSink for LogfmtSink<W> {
    fn record(&self, record: &Record) -> io::Result<()> {
        let line = format!("{record}\n");
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        out.write_all(line.as_bytes())?;
        out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> Record {
        let mut record = Record::new();
        record.push("method", "GET");
        record.push("path", "/a?b=c");
        record.push("status", 200);
        record
    }

    #[test]
    fn first_value_of_a_key_wins() {
        let mut record = record();
        assert!(!record.push("status", 500));
        assert_eq!(record.get("status"), Some("200"));
        assert_eq!(record.len(), 3);
        assert_eq!(record.keys().collect::<Vec<_>>(), ["method", "path", "status"]);
    }

    #[test]
    fn logfmt_quotes_when_needed() {
        let mut record = record();
        record.push("user_agent", "curl/8.0 (x86_64)");
        record.push("host", "");
        assert_eq!(
            record.to_string(),
            "method=GET path=/a?b=c status=200 user_agent=\"curl/8.0 (x86_64)\" host=\"\""
        );
    }

    #[test]
    fn logfmt_quotes_control_characters() {
        let mut record = Record::new();
        record.push("x", "line1\nfake=1");
        record.push("y", "a\rb");
        record.push("z", "tab\tbed");
        assert_eq!(record.to_string(), r#"x="line1\nfake=1" y="a\rb" z="tab\tbed""#);
        assert_eq!(record.to_string().lines().count(), 1);

        let mut record = Record::new();
        record.push("x", "line1\nfake");
        assert_eq!(record.to_string(), r#"x="line1\nfake""#);
    }

    #[test]
    fn logfmt_sink_writes_one_line_per_record() {
        let sink = LogfmtSink::new(Vec::new());
        sink.record(&record()).unwrap();
        sink.record(&record()).unwrap();

        let out = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(out.lines().count(), 2);
        assert!(out.ends_with("status=200\n"));
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn tracing_sink_emits_structured_fields() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt().with_ansi(false).with_writer(move || writer.clone()).finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let mut record = record();
        record.push("user_id", 42);
        TracingSink.record(&record).unwrap();

        let out = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(out.contains("micro_handlers::access"), "{out}");
        assert!(out.contains(r#"method="GET""#), "{out}");
        assert!(out.contains(r#"status="200""#), "{out}");
        assert!(out.contains("extra=user_id=42"), "{out}");
        assert!(!out.contains("request_id"), "{out}");
    }

    fn emit<S: LogSink>(sink: S) -> io::Result<()> {
        sink.record(&record())
    }

    #[test]
    fn shared_sinks_delegate() {
        let mut mock = MockLogSink::new();
        mock.expect_record().times(2).returning(|_| Ok(()));
        let sink = Arc::new(mock);

        emit(Arc::clone(&sink)).unwrap();
        emit(sink.as_ref()).unwrap();
    }
}
