//! Chunk sources: deliver a log's text as bounded, ordered chunks.
//!
//! A [`ChunkSource`] is any iterator of `TraceResult<String>`. File chunks are
//! cut at byte budgets, so a multi-byte UTF-8 sequence split across two reads
//! is held back and prepended to the next chunk; the tokenizer only ever
//! sees whole characters.

use celltrace_core::{TraceError, TraceResult};
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

/// Default read size for file-backed sources.
pub const DEFAULT_CHUNK_SIZE: usize = 1 << 20;

/// Ordered stream of text chunks.
pub trait ChunkSource: Iterator<Item = TraceResult<String>> {}

impl<T: Iterator<Item = TraceResult<String>>> ChunkSource for T {}

/* ------------------------------ File source ------------------------------- */

/// Owning chunk iterator over a byte reader (a file by default).
pub struct FileChunks<R = File> {
    rdr: R,
    path: PathBuf,
    chunk_size: usize,
    /// Bytes of an incomplete UTF-8 sequence held back from the last read.
    pending: Vec<u8>,
    /// Absolute offset of the next byte to hand out.
    offset: u64,
    done: bool,
}

impl FileChunks<File> {
    /// Open `path` for chunked reading.
    ///
    /// A path that does not exist is [`TraceError::MissingInput`]; any other
    /// open failure is [`TraceError::Io`].
    pub fn open<P: AsRef<Path>>(path: P, chunk_size: usize) -> TraceResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => TraceError::MissingInput {
                path: Some(path.to_owned()),
                reason: format!("{} does not exist", path.display()),
            },
            _ => TraceError::Io {
                path: path.to_owned(),
                source: e,
            },
        })?;
        Ok(Self::from_reader(f, path, chunk_size))
    }
}

impl<R: Read> FileChunks<R> {
    /// Wrap any reader; `path` is only used for error messages.
    pub fn from_reader(rdr: R, path: impl Into<PathBuf>, chunk_size: usize) -> Self {
        Self {
            rdr,
            path: path.into(),
            chunk_size: chunk_size.max(1),
            pending: Vec::new(),
            offset: 0,
            done: false,
        }
    }

    fn fill(&mut self, buf: &mut Vec<u8>) -> TraceResult<usize> {
        let start = buf.len();
        buf.resize(start + self.chunk_size, 0);
        let n = loop {
            match self.rdr.read(&mut buf[start..]) {
                Ok(n) => break n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(TraceError::Io {
                        path: self.path.clone(),
                        source: e,
                    })
                }
            }
        };
        buf.truncate(start + n);
        Ok(n)
    }

    fn next_chunk(&mut self) -> TraceResult<Option<String>> {
        let mut buf = std::mem::take(&mut self.pending);
        loop {
            let n = self.fill(&mut buf)?;
            if n == 0 {
                self.done = true;
                if buf.is_empty() {
                    return Ok(None);
                }
            }
            let err = match std::str::from_utf8(&buf) {
                Ok(_) => break,
                Err(e) => e,
            };
            if err.error_len().is_some() || n == 0 {
                return Err(TraceError::Encoding {
                    offset: self.offset + err.valid_up_to() as u64,
                });
            }
            // Incomplete trailing sequence: hand out the valid prefix, keep the rest.
            self.pending = buf.split_off(err.valid_up_to());
            if !buf.is_empty() {
                break;
            }
            buf = std::mem::take(&mut self.pending);
        }
        let base = self.offset;
        self.offset += buf.len() as u64;
        String::from_utf8(buf)
            .map(Some)
            .map_err(|e| TraceError::Encoding {
                offset: base + e.utf8_error().valid_up_to() as u64,
            })
    }
}

impl<R: Read> Iterator for FileChunks<R> {
    type Item = TraceResult<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_chunk() {
            Ok(Some(chunk)) => Some(Ok(chunk)),
            Ok(None) => None,
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/* ----------------------------- In-memory source ---------------------------- */

/// Split an in-memory string into chunks of at most `size` bytes
/// (rounded up to the next character boundary).
pub struct StrChunks<'a> {
    rest: &'a str,
    size: usize,
}

impl<'a> StrChunks<'a> {
    /// Chunk `text` into pieces of roughly `size` bytes.
    #[must_use]
    pub fn new(text: &'a str, size: usize) -> Self {
        Self {
            rest: text,
            size: size.max(1),
        }
    }
}

impl Iterator for StrChunks<'_> {
    type Item = TraceResult<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        let mut cut = self.size.min(self.rest.len());
        while !self.rest.is_char_boundary(cut) {
            cut += 1;
        }
        let (head, tail) = self.rest.split_at(cut);
        self.rest = tail;
        Some(Ok(head.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect<S: ChunkSource>(s: S) -> TraceResult<Vec<String>> {
        s.collect()
    }

    #[test]
    fn str_chunks_respect_char_boundaries() {
        let text = "aé€b";
        let chunks = collect(StrChunks::new(text, 1)).unwrap();
        assert_eq!(chunks.concat(), text);
        assert!(chunks.iter().all(|c| !c.is_empty()));
    }

    #[test]
    fn file_chunks_reassemble_multibyte_text() {
        let text = "0 / L / Y / é€ / ü\n".repeat(5);
        for size in [1, 2, 3, 7, 64] {
            let src = FileChunks::from_reader(text.as_bytes(), "mem.log", size);
            let chunks = collect(src).unwrap();
            assert_eq!(chunks.concat(), text, "chunk size {size}");
        }
    }

    #[test]
    fn invalid_utf8_is_an_encoding_error() {
        let bytes: &[u8] = b"ok\xffno";
        let mut src = FileChunks::from_reader(bytes, "bad.log", 64);
        match src.next() {
            Some(Err(TraceError::Encoding { offset })) => assert_eq!(offset, 2),
            other => panic!("unexpected {other:?}"),
        }
        assert!(src.next().is_none());
    }

    #[test]
    fn truncated_sequence_at_eof_is_an_encoding_error() {
        let bytes: &[u8] = b"ab\xe2\x82";
        let res = collect(FileChunks::from_reader(bytes, "cut.log", 2));
        assert!(matches!(res, Err(TraceError::Encoding { .. })));
    }

    #[test]
    fn missing_file_is_missing_input() {
        let p = std::env::temp_dir().join("celltrace_definitely_missing.log");
        assert!(matches!(
            FileChunks::open(&p, 16),
            Err(TraceError::MissingInput { .. })
        ));
    }
}
