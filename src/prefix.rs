use std::io::{self, Write};
use tokio::io::{AsyncRead, AsyncReadExt};

const RELAY_CHUNK: usize = 8 * 1024;

/*
    @@@
    @PrefixedWriter;
    . Buffers raw output and forwards only complete lines, each with a fixed prefix, to `dest`.
    . Always reports the whole input as consumed; a failed destination write drops that line.
    . Unterminated trailing bytes stay buffered until a newline arrives, never flushed on their own.
*/
pub struct PrefixedWriter<W: Write> {
    prefix: Vec<u8>,
    dest: W,
    buffer: Vec<u8>,
}

impl<W: Write> PrefixedWriter<W> {
    pub fn new(prefix: impl Into<String>, dest: W) -> Self {
        Self {
            prefix: prefix.into().into_bytes(),
            dest,
            buffer: Vec::new(),
        }
    }

    /// Bytes received but not yet terminated by a newline.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_inner(self) -> W {
        self.dest
    }

    fn emit_complete_lines(&mut self) {
        let mut consumed = 0;
        while let Some(pos) = self.buffer[consumed..].iter().position(|&b| b == b'\n') {
            let end = consumed + pos + 1;
            let mut line = Vec::with_capacity(self.prefix.len() + end - consumed);
            line.extend_from_slice(&self.prefix);
            line.extend_from_slice(&self.buffer[consumed..end]);
            // one write_all per line so concurrent sinks sharing a stream never split a line
            let _ = self.dest.write_all(&line);
            consumed = end;
        }
        self.buffer.drain(..consumed);
    }
}

impl<W: Write> Write for PrefixedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        self.emit_complete_lines();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let _ = self.dest.flush();
        Ok(())
    }
}

/*
    @@@
    @relay();
    . Pumps a child's pipe into a prefixing sink until EOF and hands the sink back.
    . Any unterminated tail left at EOF is discarded with the sink's buffer.
*/
pub async fn relay<R, W>(mut reader: R, mut sink: PrefixedWriter<W>) -> io::Result<PrefixedWriter<W>>
where
    R: AsyncRead + Unpin,
    W: Write,
{
    let mut chunk = vec![0u8; RELAY_CHUNK];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        sink.write_all(&chunk[..n])?;
    }
    sink.flush()?;
    Ok(sink)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(chunks: &[&[u8]]) -> Vec<u8> {
        let mut w = PrefixedWriter::new("[p] ", Vec::new());
        for c in chunks {
            assert_eq!(w.write(c).unwrap(), c.len());
        }
        w.into_inner()
    }

    struct BrokenPipe {
        attempts: usize,
    }

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            self.attempts += 1;
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }
    }

    #[test]
    fn complete_lines_are_prefixed() {
        let out = feed(&[b"hello\nworld\n"]);
        assert_eq!(out, b"[p] hello\n[p] world\n");
    }

    #[test]
    fn partial_line_waits_for_newline() {
        let mut w = PrefixedWriter::new("[p] ", Vec::new());
        w.write_all(b"hel").unwrap();
        assert!(w.into_inner().is_empty());

        let out = feed(&[b"hel", b"lo", b"\n"]);
        assert_eq!(out, b"[p] hello\n");
    }

    #[test]
    fn trailing_bytes_are_never_emitted() {
        let mut w = PrefixedWriter::new("[p] ", Vec::new());
        w.write_all(b"one\ntwo").unwrap();
        w.flush().unwrap();
        assert_eq!(w.pending(), b"two");
        assert_eq!(w.into_inner(), b"[p] one\n");
    }

    #[test]
    fn empty_lines_keep_their_prefix() {
        assert_eq!(feed(&[b"\n\n"]), b"[p] \n[p] \n");
    }

    #[test]
    fn every_split_matches_single_write() {
        let input: &[u8] = b"alpha\nbeta\n\ngamma\ndelta-tail";
        let whole = feed(&[input]);
        assert_eq!(whole, b"[p] alpha\n[p] beta\n[p] \n[p] gamma\n");

        for i in 0..=input.len() {
            for j in i..=input.len() {
                let out = feed(&[&input[..i], &input[i..j], &input[j..]]);
                assert_eq!(out, whole, "split at {i}/{j}");
            }
        }

        let bytewise: Vec<&[u8]> = input.chunks(1).collect();
        assert_eq!(feed(&bytewise), whole);
    }

    #[test]
    fn failed_destination_is_swallowed() {
        let mut w = PrefixedWriter::new("[p] ", BrokenPipe { attempts: 0 });
        assert_eq!(w.write(b"a\nb\nc").unwrap(), 5);
        assert!(w.flush().is_ok());
        assert_eq!(w.pending(), b"c");
        assert_eq!(w.into_inner().attempts, 2);
    }

    #[tokio::test]
    async fn relay_forwards_until_eof() {
        let reader: &[u8] = b"first\nsecond\nunterminated";
        let sink = relay(reader, PrefixedWriter::new("[srv] ", Vec::new()))
            .await
            .unwrap();
        assert_eq!(sink.pending(), b"unterminated");
        assert_eq!(sink.into_inner(), b"[srv] first\n[srv] second\n");
    }
}
