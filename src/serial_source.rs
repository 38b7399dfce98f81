//! Where the bytes come from.
//!
//! The ingestion channel never talks to `serial2` directly. It asks a
//! [`PortOpener`] for something it can [`Read`] from, which lets the same
//! read loop run against a real port, a recorded file, or a simulation.

use serial2::SerialPort;
use std::{
    fs::File,
    io::{self, BufRead, BufReader, Read},
    path::PathBuf,
    time::{Duration, Instant},
};

/// An open byte stream. Reads are expected to give up after the read timeout
/// handed to [`PortOpener::open()`] with [`io::ErrorKind::TimedOut`].
pub type ByteSource = Box<dyn Read + Send>;

/// `PortOpener`
///
/// Opens an endpoint for reading. Called once per session, on the session's
/// own thread, so an opener may block.
pub trait PortOpener: Send + Sync {
    /// Open `endpoint`. `read_timeout` bounds how long any single read on
    /// the returned source may wait for data.
    fn open(&self, endpoint: &str, baud_rate: u32, read_timeout: Duration)
        -> io::Result<ByteSource>;
}

/// Opens real serial devices.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialOpener;

impl PortOpener for SerialOpener {
    fn open(
        &self,
        endpoint: &str,
        baud_rate: u32,
        read_timeout: Duration,
    ) -> io::Result<ByteSource> {
        let mut port = SerialPort::open(endpoint, baud_rate)?;
        port.set_read_timeout(read_timeout)?;
        Ok(Box::new(port))
    }
}

/// Lists the serial devices the operating system knows about.
pub fn available_ports() -> io::Result<Vec<PathBuf>> {
    SerialPort::available_ports()
}

/// Plays back a text file of recorded time differences, treating the
/// endpoint as a file path. Lines are released one per `interval` to mimic
/// the microcontroller.
#[derive(Debug, Clone, Copy)]
pub struct ReplayOpener {
    interval: Duration,
}

impl ReplayOpener {
    /// Release one recorded line every `interval`.
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl PortOpener for ReplayOpener {
    fn open(
        &self,
        endpoint: &str,
        _baud_rate: u32,
        read_timeout: Duration,
    ) -> io::Result<ByteSource> {
        let file = File::open(endpoint)?;
        Ok(Box::new(PacedLines::new(
            BufReader::new(file),
            self.interval,
            read_timeout,
        )))
    }
}

/// Hands out the lines of `reader` at a fixed pace, then times out forever
/// once the reader runs dry, just as a quiet serial port would.
pub struct PacedLines<R> {
    reader: R,
    interval: Duration,
    read_timeout: Duration,
    next_due: Instant,
    pending: Vec<u8>,
    exhausted: bool,
}

impl<R: BufRead> PacedLines<R> {
    /// The first line is available immediately.
    pub fn new(reader: R, interval: Duration, read_timeout: Duration) -> Self {
        Self {
            reader,
            interval,
            read_timeout,
            next_due: Instant::now(),
            pending: Vec::new(),
            exhausted: false,
        }
    }

    fn refill(&mut self) -> io::Result<()> {
        let now = Instant::now();
        if self.exhausted {
            spin_sleep::sleep(self.read_timeout);
            return Err(io::ErrorKind::TimedOut.into());
        }
        if now < self.next_due {
            let wait = self.next_due - now;
            spin_sleep::sleep(wait.min(self.read_timeout));
            if wait > self.read_timeout {
                return Err(io::ErrorKind::TimedOut.into());
            }
        }

        if self.reader.read_until(b'\n', &mut self.pending)? == 0 {
            self.exhausted = true;
            return Err(io::ErrorKind::TimedOut.into());
        }
        if self.pending.last() != Some(&b'\n') {
            self.pending.push(b'\n');
        }
        self.next_due = Instant::now() + self.interval;
        Ok(())
    }
}

impl<R: BufRead> Read for PacedLines<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            self.refill()?;
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    fn read_all_lines<R: BufRead>(src: &mut PacedLines<R>) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = [0; 4];
        loop {
            match src.read(&mut buf) {
                Ok(n) => out.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::TimedOut && src.exhausted => return out,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {}
                Err(e) => panic!("unexpected error {e}"),
            }
        }
    }

    #[test]
    fn replays_every_line_and_terminates_the_last() {
        let mut src = PacedLines::new(
            Cursor::new(b"0.001\ngarbage\n-0.0005".to_vec()),
            Duration::ZERO,
            Duration::from_millis(1),
        );
        assert_eq!(read_all_lines(&mut src), b"0.001\ngarbage\n-0.0005\n");
    }

    #[test]
    fn lines_are_paced() {
        let mut src = PacedLines::new(
            Cursor::new(b"1\n2\n3\n".to_vec()),
            Duration::from_millis(20),
            Duration::from_millis(5),
        );
        let start = Instant::now();
        assert_eq!(read_all_lines(&mut src), b"1\n2\n3\n");
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn slow_lines_time_out_in_between() {
        let mut src = PacedLines::new(
            Cursor::new(b"1\n2\n".to_vec()),
            Duration::from_millis(50),
            Duration::from_millis(1),
        );
        let mut buf = [0; 8];
        assert_eq!(src.read(&mut buf).unwrap(), 2);
        let err = src.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn replay_opener_reads_files() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "0.25").unwrap();
        let opener = ReplayOpener::new(Duration::ZERO);
        let mut src = opener
            .open(
                file.path().to_str().unwrap(),
                115_200,
                Duration::from_millis(1),
            )
            .unwrap();
        let mut buf = [0; 16];
        let n = src.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"0.25\n");
    }

    #[test]
    fn replay_opener_reports_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.txt");
        let res = ReplayOpener::new(Duration::ZERO).open(
            missing.to_str().unwrap(),
            115_200,
            Duration::from_millis(1),
        );
        assert_eq!(res.err().map(|e| e.kind()), Some(io::ErrorKind::NotFound));
    }
}
