//! Response framing.
//!
//! Bytes from the modem are split into lines (CR removed, LF kept), and lines
//! are accumulated until one of them is a final result.

use crate::{classify, Error, FinalResult};
use std::{collections::VecDeque, io, mem};

/// Line length bound, in bytes. A line, LF included and CR excluded, must be
/// shorter than this.
pub const MAX_LINE_LEN: usize = 4096;

pub(crate) const READ_CHUNK: usize = 4096;

/// Framing anomaly detected in the byte stream.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("modem line reached the {limit} byte limit")]
    /// A line did not end before [`MAX_LINE_LEN`].
    LineTooLong {
        /// The bound that was hit.
        limit: usize,
    },
}

/// One complete modem reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    text: String,
    result: FinalResult,
}

impl Response {
    /// Builds a response from already framed text.
    #[must_use]
    pub fn new(text: impl Into<String>, result: FinalResult) -> Self {
        Self {
            text: text.into(),
            result,
        }
    }

    /// All lines of the reply, final line included, LF terminated.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Outcome of the final line.
    #[must_use]
    pub fn result(&self) -> FinalResult {
        self.result
    }

    /// Information lines, without terminators and without the final line.
    pub fn information(&self) -> impl Iterator<Item = &str> {
        let mut lines: Vec<&str> = self.text.lines().collect();
        lines.pop();
        lines.into_iter()
    }

    /// Error code reported by `+CME ERROR:` or `+CMS ERROR:`.
    #[must_use]
    pub fn error_detail(&self) -> Option<&str> {
        let prefix = match self.result {
            FinalResult::CmeError => "+CME ERROR:",
            FinalResult::CmsError => "+CMS ERROR:",
            _ => return None,
        };
        self.text
            .lines()
            .rev()
            .find_map(|line| line.strip_prefix(prefix))
            .map(str::trim)
    }

    /// Converts every non-`OK` final result into [`Error::Rejected`].
    pub fn into_result(self) -> Result<Self, Error> {
        if self.result.is_success() {
            Ok(self)
        } else {
            Err(Error::Rejected {
                result: self.result,
                text: self.text,
            })
        }
    }
}

/// Incremental line splitter.
#[derive(Debug, Default)]
pub struct LineSplitter {
    buf: Vec<u8>,
    discarding: bool,
    ready: VecDeque<Result<String, FrameError>>,
}

impl LineSplitter {
    /// Creates a splitter with no buffered input.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes raw bytes. Complete lines become available from
    /// [`next_line`](Self::next_line).
    ///
    /// When a line (with its LF) would reach [`MAX_LINE_LEN`] a single
    /// [`FrameError::LineTooLong`] is queued and input is dropped up to and
    /// including the next LF.
    pub fn feed(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            if self.discarding {
                self.discarding = byte != b'\n';
                continue;
            }
            match byte {
                b'\r' => {}
                b'\n' => {
                    self.buf.push(b'\n');
                    let line = String::from_utf8_lossy(&self.buf).into_owned();
                    self.buf.clear();
                    self.ready.push_back(Ok(line));
                }
                // Room is kept for the LF.
                _ if self.buf.len() + 2 >= MAX_LINE_LEN => {
                    self.buf.clear();
                    self.discarding = true;
                    self.ready.push_back(Err(FrameError::LineTooLong {
                        limit: MAX_LINE_LEN,
                    }));
                }
                _ => self.buf.push(byte),
            }
        }
    }

    /// Pops the oldest complete line or framing error.
    pub fn next_line(&mut self) -> Option<Result<String, FrameError>> {
        self.ready.pop_front()
    }

    #[cfg(test)]
    fn has_partial(&self) -> bool {
        !self.buf.is_empty() || self.discarding
    }
}

/// Collects lines into a [`Response`].
#[derive(Debug, Default)]
pub struct Accumulator {
    text: String,
}

impl Accumulator {
    /// Creates an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a line and returns the response once the line is final.
    ///
    /// Empty lines carry nothing and are not stored.
    pub fn push(&mut self, line: &str) -> Option<Response> {
        if line.trim_end_matches(['\r', '\n']).is_empty() {
            return None;
        }
        self.text.push_str(line);
        let result = classify(line);
        result
            .is_final()
            .then(|| Response::new(mem::take(&mut self.text), result))
    }

    /// Drops a partially accumulated response.
    pub fn reset(&mut self) {
        self.text.clear();
    }

    /// Returns `true` if no line of a response is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Blocking response reader over any byte source.
///
/// Only for contexts where nothing else reads the same line, e.g. a one-shot
/// exchange before the [`Channel`](crate::Channel) is started.
#[derive(Debug)]
pub struct Framer<R> {
    reader: R,
    lines: LineSplitter,
    frame: Accumulator,
    /// Set after a framing error until the broken reply's final line passed.
    resyncing: bool,
}

impl<R: io::Read> Framer<R> {
    /// Frames replies read from `reader`.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            lines: LineSplitter::new(),
            frame: Accumulator::new(),
            resyncing: false,
        }
    }

    /// Reads until a final result line and returns the whole reply.
    ///
    /// End of stream and OS errors are reported as [`Error::Eof`] and
    /// [`Error::Io`], never as a modem `ERROR`. After an
    /// [`Error::Frame`] the rest of the broken reply is skipped, so the next
    /// call returns the reply after it.
    pub fn read_response(&mut self) -> Result<Response, Error> {
        let mut buf = [0; READ_CHUNK];
        loop {
            while let Some(line) = self.lines.next_line() {
                let line = match line {
                    Ok(line) => line,
                    Err(err) => {
                        self.frame.reset();
                        self.resyncing = true;
                        return Err(err.into());
                    }
                };
                if self.resyncing {
                    let result = classify(&line);
                    self.resyncing = !result.is_final() || result == FinalResult::Ring;
                    continue;
                }
                if let Some(response) = self.frame.push(&line) {
                    return Ok(response);
                }
            }
            match self.reader.read(&mut buf) {
                Ok(0) => return Err(Error::Eof),
                Ok(n) => self.lines.feed(&buf[..n]),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(Error::Io(err)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(splitter: &mut LineSplitter) -> Vec<Result<String, FrameError>> {
        std::iter::from_fn(|| splitter.next_line()).collect()
    }

    #[test]
    fn frames_information_and_final_line() {
        let mut framer = Framer::new(&b"+CSQ: 15,99\r\nOK\r\n"[..]);
        let response = framer.read_response().unwrap();
        assert_eq!(response.text(), "+CSQ: 15,99\nOK\n");
        assert_eq!(response.result(), FinalResult::Ok);
        assert_eq!(response.information().collect::<Vec<_>>(), ["+CSQ: 15,99"]);
    }

    #[test]
    fn consecutive_responses_keep_leftover_bytes() {
        let mut framer =
            Framer::new(&b"\r\nOK\r\n\r\n+CPAS: 0\r\n\r\nOK\r\nNO CARRIER\r\n"[..]);
        assert_eq!(framer.read_response().unwrap().text(), "OK\n");
        assert_eq!(framer.read_response().unwrap().text(), "+CPAS: 0\nOK\n");
        let hangup = framer.read_response().unwrap();
        assert_eq!(hangup.result(), FinalResult::NoCarrier);
        assert!(matches!(framer.read_response(), Err(Error::Eof)));
    }

    #[test]
    fn modem_error_is_a_response_not_a_failure() {
        let mut framer = Framer::new(&b"+CME ERROR: 10\r\n"[..]);
        let response = framer.read_response().unwrap();
        assert_eq!(response.result(), FinalResult::CmeError);
        assert_eq!(response.error_detail(), Some("10"));
        let err = response.into_result().unwrap_err();
        assert!(matches!(err, Error::Rejected { result: FinalResult::CmeError, .. }));
    }

    #[test]
    fn eof_inside_a_response() {
        let mut framer = Framer::new(&b"+CSQ: 15,99\r\n"[..]);
        assert!(matches!(framer.read_response(), Err(Error::Eof)));
    }

    #[test]
    fn os_error_is_distinct_from_eof() {
        struct Broken;
        impl io::Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::from(io::ErrorKind::BrokenPipe))
            }
        }
        let mut framer = Framer::new(Broken);
        assert!(matches!(framer.read_response(), Err(Error::Io(_))));
    }

    #[test]
    fn over_long_line_is_an_error_and_resynchronizes() {
        let mut input = b"+CLCC: 1,0,0,0,0,\"".to_vec();
        input.extend_from_slice(&[b'A'; MAX_LINE_LEN + 100]);
        input.extend_from_slice(b"\"\r\n\r\nRING\r\n\r\nOK\r\n\r\n+CPAS: 0\r\n\r\nOK\r\n");
        let mut framer = Framer::new(&input[..]);
        let err = framer.read_response().unwrap_err();
        assert!(matches!(
            err,
            Error::Frame(FrameError::LineTooLong { limit: MAX_LINE_LEN })
        ));
        assert_eq!(framer.read_response().unwrap().text(), "+CPAS: 0\nOK\n");
        assert!(matches!(framer.read_response(), Err(Error::Eof)));
    }

    #[test]
    fn splitter_strips_cr_and_keeps_lf_across_chunks() {
        let mut splitter = LineSplitter::new();
        splitter.feed(b"+CSQ: 1");
        assert!(splitter.next_line().is_none());
        assert!(splitter.has_partial());
        splitter.feed(b"5,99\r");
        splitter.feed(b"\nO");
        splitter.feed(b"K\r\n");
        assert_eq!(
            lines(&mut splitter),
            [Ok("+CSQ: 15,99\n".to_owned()), Ok("OK\n".to_owned())]
        );
        assert!(!splitter.has_partial());
    }

    #[test]
    fn splitter_limit_boundary() {
        let mut splitter = LineSplitter::new();
        let mut longest = vec![b'x'; MAX_LINE_LEN - 2];
        longest.extend_from_slice(b"\r\n");
        splitter.feed(&longest);
        assert_eq!(
            lines(&mut splitter)[0].as_ref().unwrap().len(),
            MAX_LINE_LEN - 1
        );

        let mut at_limit = vec![b'x'; MAX_LINE_LEN - 1];
        at_limit.extend_from_slice(b"\r\nOK\r\n");
        splitter.feed(&at_limit);
        assert_eq!(
            lines(&mut splitter),
            [
                Err(FrameError::LineTooLong { limit: MAX_LINE_LEN }),
                Ok("OK\n".to_owned())
            ]
        );

        splitter.feed(&vec![b'x'; MAX_LINE_LEN]);
        splitter.feed(&vec![b'y'; MAX_LINE_LEN]);
        splitter.feed(b"\nRING\r\n");
        assert_eq!(
            lines(&mut splitter),
            [
                Err(FrameError::LineTooLong { limit: MAX_LINE_LEN }),
                Ok("RING\n".to_owned())
            ]
        );
    }

    #[test]
    fn accumulator_skips_blank_lines_and_resets() {
        let mut frame = Accumulator::new();
        assert!(frame.push("\n").is_none());
        assert!(frame.is_empty());
        assert!(frame.push("+CLCC: 1,0,0,0,0\n").is_none());
        assert!(!frame.is_empty());
        frame.reset();
        assert!(frame.is_empty());
        let response = frame.push("ERROR\n").unwrap();
        assert_eq!(response, Response::new("ERROR\n", FinalResult::Error));
    }
}
