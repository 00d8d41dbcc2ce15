use std::io::{self, Write};

/// Writes text with a stack of indent levels.
///
/// `appendln` starts a new line at the current indent. With an empty newline and indent
/// the output collapses into a single line.
pub(crate) struct IndentedWriter<'a> {
    out: &'a mut dyn Write,
    newline: &'a str,
    indent: String,
    levels: Vec<usize>,
}

impl<'a> IndentedWriter<'a> {
    pub fn new(out: &'a mut dyn Write, newline: &'a str) -> Self {
        Self { out, newline, indent: String::new(), levels: Vec::new() }
    }

    #[inline]
    pub fn append(&mut self, s: &str) -> io::Result<()> {
        self.out.write_all(s.as_bytes())
    }

    #[inline]
    pub fn append_char(&mut self, c: char) -> io::Result<()> {
        let mut buf = [0u8; 4];
        self.append(c.encode_utf8(&mut buf))
    }

    /// Newline followed by the current indent.
    pub fn appendln(&mut self) -> io::Result<()> {
        self.out.write_all(self.newline.as_bytes())?;
        self.out.write_all(self.indent.as_bytes())
    }

    /// Newline without indent, for the end of a block.
    #[inline]
    pub fn newline(&mut self) -> io::Result<()> {
        self.out.write_all(self.newline.as_bytes())
    }

    pub fn begin(&mut self, indent: &str) {
        self.levels.push(self.indent.len());
        self.indent.push_str(indent);
    }

    pub fn end(&mut self) {
        if let Some(len) = self.levels.pop() {
            self.indent.truncate(len);
        }
    }
}
