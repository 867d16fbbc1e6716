use std::io::{self, BufRead};

/// Streams feed lines one at a time, decoding invalid UTF-8 lossily.
#[derive(Debug)]
pub(crate) struct FeedLines<R> {
    reader: R,
    buf: Vec<u8>,
    read: usize,
}

impl<R: BufRead> FeedLines<R> {
    pub(crate) fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(512),
            read: 0,
        }
    }

    /// Next line without its terminator, or `None` at end of input.
    pub(crate) fn next_line(&mut self) -> io::Result<Option<String>> {
        self.buf.clear();
        if self.reader.read_until(b'\n', &mut self.buf)? == 0 {
            return Ok(None);
        }
        self.read += 1;
        let line = String::from_utf8_lossy(&self.buf);
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    /// Lines returned so far, header included.
    pub(crate) fn lines_read(&self) -> usize {
        self.read
    }
}
