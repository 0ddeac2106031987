use std::io::Write;

/// Wraps the caller's sink and tracks the absolute output position.
///
/// The wrapper never seeks and never buffers; every append goes straight to
/// the inner writer. The position can also be advanced without writing, for
/// payloads that reach the transport out of band (`sendfile`-style copies).
#[derive(Debug)]
pub struct WriteAndTell<W: Write> {
    writer: W,
    position: u64,
}

impl<W: Write> WriteAndTell<W> {
    pub fn new(writer: W) -> WriteAndTell<W> {
        WriteAndTell {
            writer,
            position: 0,
        }
    }

    pub fn append(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.writer.write_all(bytes)?;
        self.position += bytes.len() as u64;
        Ok(())
    }

    /// Bumps the recorded position by `n` bytes that bypassed this wrapper.
    pub fn advance_position(&mut self, n: u64) {
        self.position += n;
    }

    pub fn tell(&self) -> u64 {
        self.position
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Write for WriteAndTell<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.writer.write(buf)?;
        self.position += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn append_tracks_the_position() {
        let mut out = WriteAndTell::new(Vec::new());
        out.append(b"PK\x03\x04").unwrap();
        out.append(b"payload").unwrap();

        assert_eq!(out.tell(), 11);
        assert_eq!(out.into_inner().len(), 11);
    }

    #[test]
    fn advance_position_counts_without_writing() {
        let mut out = WriteAndTell::new(Vec::new());
        out.append(b"header").unwrap();
        out.advance_position(1 << 32);

        assert_eq!(out.tell(), 6 + (1u64 << 32));
        assert_eq!(out.into_inner().len(), 6);
    }

    #[test]
    fn write_trait_reports_partial_writes() {
        let mut out = WriteAndTell::new(Vec::new());
        let written = out.write(b"abc").unwrap();
        assert_eq!(written, 3);
        assert_eq!(out.tell(), 3);
    }
}
