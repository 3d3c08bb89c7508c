use std::io::{self, Write};

/// A writer that stops at its first error.
///
/// After a write fails, the error is kept and every later write or flush is
/// accepted and discarded. Callers write unconditionally and check
/// [`FailFastWriter::error`] or [`FailFastWriter::into_inner`] once at the
/// end.
#[derive(Debug)]
pub struct FailFastWriter<W> {
    inner: W,
    error: Option<io::Error>,
}

impl<W: Write> FailFastWriter<W> {
    pub const fn new(inner: W) -> Self {
        Self { inner, error: None }
    }

    /// The first error encountered, if any.
    pub const fn error(&self) -> Option<&io::Error> {
        self.error.as_ref()
    }

    /// Write a string, ignoring the outcome until [`Self::into_inner`].
    pub fn put(&mut self, s: &str) {
        let _ = self.write_all(s.as_bytes());
    }

    /// Write formatted output, ignoring the outcome until [`Self::into_inner`].
    pub fn put_fmt(&mut self, args: std::fmt::Arguments<'_>) {
        let _ = self.write_fmt(args);
    }

    /// Returns the wrapped writer, or the first error.
    ///
    /// # Errors
    ///
    /// Returns the first error any write or flush produced.
    pub fn into_inner(self) -> io::Result<W> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.inner),
        }
    }

    fn record(&mut self, result: io::Result<()>) {
        if let Err(err) = result {
            self.error = Some(err);
        }
    }
}

impl<W: Write> Write for FailFastWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.error.is_none() {
            let result = self.inner.write_all(buf);
            self.record(result);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.error.is_none() {
            let result = self.inner.flush();
            self.record(result);
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    /// Accepts `budget` bytes, then fails every write.
    struct Limited {
        written: Vec<u8>,
        budget: usize,
        attempts: usize,
    }

    impl Write for Limited {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.attempts += 1;
            if self.written.len() + buf.len() > self.budget {
                return Err(io::Error::new(io::ErrorKind::WriteZero, "full"));
            }
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_passes_writes_through() {
        let mut writer = FailFastWriter::new(Vec::new());
        writer.put("Hello, ");
        writer.put_fmt(format_args!("{}!", "world"));

        assert!(writer.error().is_none());
        assert_eq!(writer.into_inner().unwrap(), b"Hello, world!");
    }

    #[test]
    fn test_stops_after_first_error() {
        let mut writer = FailFastWriter::new(Limited {
            written: Vec::new(),
            budget: 4,
            attempts: 0,
        });

        writer.put("abc");
        writer.put("defg");
        writer.put("h");
        writer.flush().unwrap();

        assert_eq!(writer.error().unwrap().kind(), io::ErrorKind::WriteZero);
        assert_eq!(writer.inner.written, b"abc");
        assert_eq!(writer.inner.attempts, 2);
        assert!(writer.into_inner().is_err());
    }
}
