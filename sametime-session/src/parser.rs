//! Stream-to-message assembler.
//!
//! Frames on the wire are `[u32 big-endian length][body]`. Between
//! frames either peer may emit single bytes with the high bit set as
//! keepalives; those are dropped. The parser never blocks: it is fed
//! whatever arrives and fires its handler once per completed body, no
//! matter how the byte stream is partitioned.

/// Assembly phase of the parser.
enum State {
    /// Dropping keepalive bytes between frames.
    Trim,
    /// Accumulating the four length bytes.
    Length,
    /// Accumulating the frame body.
    Data,
}

/// Incremental frame assembler.
pub struct Parser {
    state: State,
    header: [u8; 4],
    header_use: usize,
    body: Vec<u8>,
    need: usize,
}

impl Parser {
    /// Create a parser waiting for the first frame.
    pub fn new() -> Self {
        Self {
            state: State::Trim,
            header: [0; 4],
            header_use: 0,
            body: Vec::new(),
            need: 0,
        }
    }

    /// Feed a chunk of transport bytes, invoking `handler` with each
    /// completed frame body (length prefix stripped).
    pub fn feed<F: FnMut(&[u8])>(&mut self, mut data: &[u8], mut handler: F) {
        loop {
            match self.state {
                State::Trim => {
                    while let [first, rest @ ..] = data {
                        if first & 0x80 == 0 {
                            break;
                        }
                        data = rest;
                    }
                    if data.is_empty() {
                        return;
                    }
                    self.state = State::Length;
                    self.header_use = 0;
                }

                State::Length => {
                    if data.is_empty() {
                        return;
                    }
                    let take = (4 - self.header_use).min(data.len());
                    self.header[self.header_use..self.header_use + take]
                        .copy_from_slice(&data[..take]);
                    self.header_use += take;
                    data = &data[take..];
                    if self.header_use == 4 {
                        self.need = u32::from_be_bytes(self.header) as usize;
                        self.body.clear();
                        self.body.reserve(self.need);
                        self.state = State::Data;
                    }
                }

                State::Data => {
                    let take = (self.need - self.body.len()).min(data.len());
                    self.body.extend_from_slice(&data[..take]);
                    data = &data[take..];
                    if self.body.len() == self.need {
                        handler(&self.body);
                        self.state = State::Trim;
                    } else {
                        return;
                    }
                }
            }
        }
    }

    /// Count of body bytes buffered for the frame in progress.
    pub fn buffered(&self) -> usize {
        match self.state {
            State::Trim => 0,
            State::Length => self.header_use,
            State::Data => self.body.len(),
        }
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}
