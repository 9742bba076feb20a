use super::{Chunks, ChunksError};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    ChunksError(ChunksError),
    InvalidPayload,
}

/// A type for reading `data:` frames of server-sent events from a chunk
/// stream.
pub struct Frames {
    buf: Vec<u8>,
    // Bytes of `buf` already known not to hold an event end.
    scanned: usize,
    chunks: Chunks,
    exhausted: bool,
}

impl Frames {
    #[inline]
    pub fn new(chunks: Chunks) -> Self {
        Self {
            buf: Vec::new(),
            scanned: 0,
            chunks,
            exhausted: false,
        }
    }

    /// Returns the next frame line, e.g. `data: {...}`.
    ///
    /// The transport is only read when the buffer doesn't hold a
    /// complete event yet.
    pub async fn next_frame(&mut self) -> Result<Option<String>, Error> {
        loop {
            if let Some(frame) = self.try_parse_frame()? {
                return Ok(Some(frame));
            }
            if self.exhausted {
                return self.take_remainder();
            }

            match self.chunks.next_chunk().await.map_err(Error::ChunksError)? {
                Some(bytes) => self.buf.extend_from_slice(&bytes),
                None => self.exhausted = true,
            }
        }
    }

    fn try_parse_frame(&mut self) -> Result<Option<String>, Error> {
        // event         = *( comment / field ) end-of-line
        // field         = 1*name-char [ colon [ space ] *any-char ] end-of-line
        // end-of-line   = ( cr lf / cr / lf )
        //
        // Bare `cr` line endings are not handled.
        while let Some((end, sep_len)) =
            find_event_end(&self.buf, self.scanned)
        {
            let block: Vec<u8> = self.buf.drain(..end + sep_len).collect();
            self.scanned = 0;
            let Ok(block) = str::from_utf8(&block[..end]) else {
                return Err(Error::InvalidPayload);
            };
            if let Some(frame) = parse_event(block)? {
                return Ok(Some(frame));
            }
        }
        // A separator may straddle the end of the buffer.
        self.scanned = self.buf.len().saturating_sub(3);
        Ok(None)
    }

    fn take_remainder(&mut self) -> Result<Option<String>, Error> {
        let block = std::mem::take(&mut self.buf);
        self.scanned = 0;
        let Ok(block) = str::from_utf8(&block) else {
            return Err(Error::InvalidPayload);
        };
        if block.trim().is_empty() {
            return Ok(None);
        }
        parse_event(block)
    }
}

fn find_event_end(buf: &[u8], from: usize) -> Option<(usize, usize)> {
    (from..buf.len()).find_map(|i| {
        let rest = &buf[i..];
        if rest.starts_with(b"\n\n") {
            Some((i, 2))
        } else if rest.starts_with(b"\r\n\r\n") {
            Some((i, 4))
        } else {
            None
        }
    })
}

fn parse_event(block: &str) -> Result<Option<String>, Error> {
    let mut data: Option<String> = None;
    for line in block.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => {
                (field, value.strip_prefix(' ').unwrap_or(value))
            }
            None => (line, ""),
        };
        match field {
            "data" => match &mut data {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => data = Some(value.to_owned()),
            },
            "event" | "id" | "retry" => {}
            _ => return Err(Error::InvalidPayload),
        }
    }
    Ok(data.map(|data| format!("data: {data}")))
}
