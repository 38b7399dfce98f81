//! Reassembles newline-terminated lines out of whatever chunks the serial
//! port happens to hand us.

use log::{debug, warn};
use std::time::{Duration, Instant};

/// Longest line we are willing to buffer before deciding it is noise.
pub const MAX_LINE_LEN: usize = 4096;

/// Collects bytes until a `\n` shows up.
///
/// Partial lines are thrown away when they grow past the length cap, or when
/// nothing finishes them within `stale_after` of their first byte. Otherwise a
/// device that babbles without newlines would grow the buffer forever, and a
/// half line left over from before a pause would be glued to the next one.
/// The rest of an overlong line is skipped up to its newline, or until it
/// goes stale, whichever comes first.
#[derive(Debug)]
pub struct LineAssembler {
    buf: Vec<u8>,
    max_len: usize,
    stale_after: Duration,
    started: Option<Instant>,
    discarding: bool,
}

impl LineAssembler {
    /// An assembler with the given length cap and staleness timeout.
    pub fn new(max_len: usize, stale_after: Duration) -> Self {
        Self {
            buf: Vec::new(),
            max_len,
            stale_after,
            started: None,
            discarding: false,
        }
    }

    /// Feed a chunk of bytes received at `now`, returning every line it
    /// completed, without their terminating `\n`.
    pub fn extend(&mut self, bytes: &[u8], now: Instant) -> Vec<Vec<u8>> {
        self.expire(now);

        let mut lines = Vec::new();
        for &c in bytes {
            if c == b'\n' {
                if self.discarding {
                    self.discarding = false;
                } else {
                    lines.push(std::mem::take(&mut self.buf));
                }
                self.buf.clear();
                self.started = None;
                continue;
            }

            if self.discarding {
                continue;
            }

            if self.buf.is_empty() {
                self.started = Some(now);
            }
            self.buf.push(c);

            if self.buf.len() > self.max_len {
                warn!(
                    "Discarding a line longer than {} bytes, is the baud rate right?",
                    self.max_len
                );
                // `started` stays put so the skipping can go stale too
                self.buf.clear();
                self.discarding = true;
            }
        }
        lines
    }

    /// Drop the partial line if it has been sitting around for too long.
    /// Returns whether anything was dropped.
    pub fn expire(&mut self, now: Instant) -> bool {
        match self.started {
            Some(started) if now.saturating_duration_since(started) > self.stale_after => {
                if self.discarding {
                    debug!(
                        "No newline after an overlong line for {:?}, resyncing",
                        self.stale_after
                    );
                } else {
                    warn!(
                        "Discarding {} bytes of an unterminated line after {:?}",
                        self.buf.len(),
                        self.stale_after
                    );
                }
                self.buf.clear();
                self.started = None;
                self.discarding = false;
                true
            }
            _ => false,
        }
    }

    /// Number of bytes waiting for a newline.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

impl Default for LineAssembler {
    fn default() -> Self {
        Self::new(MAX_LINE_LEN, Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(chunks: &[&str]) -> Vec<Vec<u8>> {
        let mut asm = LineAssembler::default();
        let now = Instant::now();
        chunks
            .iter()
            .flat_map(|chunk| asm.extend(chunk.as_bytes(), now))
            .collect()
    }

    #[test]
    fn splits_on_newlines() {
        assert_eq!(
            lines(&["0.001\ngarbage\n-0.0005\n"]),
            vec![b"0.001".to_vec(), b"garbage".to_vec(), b"-0.0005".to_vec()]
        );
    }

    #[test]
    fn joins_across_chunks() {
        assert_eq!(
            lines(&["0.0", "01\r", "\n-0.", "0005\n"]),
            vec![b"0.001\r".to_vec(), b"-0.0005".to_vec()]
        );
    }

    #[test]
    fn keeps_the_tail_for_later() {
        let mut asm = LineAssembler::default();
        let now = Instant::now();
        assert_eq!(asm.extend(b"1\n2", now), vec![b"1".to_vec()]);
        assert_eq!(asm.pending(), 1);
        assert_eq!(asm.extend(b"\n", now), vec![b"2".to_vec()]);
        assert_eq!(asm.pending(), 0);
    }

    #[test]
    fn overlong_lines_are_dropped_whole() {
        let mut asm = LineAssembler::new(8, Duration::from_secs(1));
        let now = Instant::now();
        assert!(asm.extend(b"0123456789abcdef", now).is_empty());
        // the tail of the overlong line must not come out as its own line
        assert_eq!(asm.extend(b"xyz\n0.5\n", now), vec![b"0.5".to_vec()]);
    }

    #[test]
    fn overlong_lines_go_stale_too() {
        let mut asm = LineAssembler::new(8, Duration::from_millis(100));
        let start = Instant::now();
        assert!(asm.extend(b"0123456789abcdef", start).is_empty());

        let later = start + Duration::from_secs(5);
        assert!(asm.expire(later));
        assert_eq!(asm.extend(b"0.5\n", later), vec![b"0.5".to_vec()]);
    }

    #[test]
    fn stale_partial_lines_expire() {
        let mut asm = LineAssembler::new(MAX_LINE_LEN, Duration::from_millis(100));
        let start = Instant::now();
        assert!(asm.extend(b"0.00", start).is_empty());

        assert!(!asm.expire(start + Duration::from_millis(50)));
        assert_eq!(asm.pending(), 4);

        let later = start + Duration::from_millis(500);
        assert_eq!(asm.extend(b"2\n", later), vec![b"2".to_vec()]);
    }
}
