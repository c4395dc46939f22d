use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};
use colored::{ColoredString, Colorize};

/// Line-oriented user output shared by worker tasks.
///
/// Each call writes whole lines under one lock so concurrent resources do
/// not interleave within a block.
pub struct Console {
    out: Mutex<Box<dyn Write + Send>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Plain,
    Add,
    Change,
    Destroy,
}

impl Tone {
    fn paint(&self, text: &str) -> ColoredString {
        match self {
            Tone::Plain => text.normal(),
            Tone::Add => text.green(),
            Tone::Change => text.yellow(),
            Tone::Destroy => text.red(),
        }
    }

    /// Paint every line of `text`, keeping line breaks.
    pub fn paint_lines(&self, text: &str) -> String {
        text.lines()
            .map(|l| format!("{}\n", self.paint(l)))
            .collect()
    }
}

impl Console {
    pub fn stdout() -> Self {
        Self::with_writer(Box::new(io::stdout()))
    }

    pub fn with_writer(out: Box<dyn Write + Send>) -> Self {
        Self { out: Mutex::new(out) }
    }

    /// Console writing into a buffer readable through the returned handle.
    pub fn buffered() -> (Self, SharedBuffer) {
        let buffer = SharedBuffer::default();
        (Self::with_writer(Box::new(buffer.clone())), buffer)
    }

    pub fn line(&self, tone: Tone, text: impl AsRef<str>) {
        self.write_block(&format!("{}\n", tone.paint(text.as_ref())));
    }

    pub fn blank(&self) {
        self.write_block("\n");
    }

    /// Write several lines in one go, each painted with `tone`.
    pub fn block(&self, tone: Tone, text: &str) {
        self.write_block(&tone.paint_lines(text));
    }

    /// A painted header, pre-rendered body and trailing blank line in one write.
    pub fn section(&self, tone: Tone, header: &str, body: &str) {
        self.write_block(&format!("{}\n{}\n", tone.paint(header), body));
    }

    /// Write pre-rendered text verbatim.
    pub fn raw(&self, text: &str) {
        self.write_block(text);
    }

    fn write_block(&self, text: &str) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        // Output failures (closed pipe) are not fatal for reconciliation.
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }
}

#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        let bytes = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
