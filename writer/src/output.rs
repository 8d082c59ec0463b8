//! The sink a writer drains its buffered bytes into.
//!
//! Backends only ever append to an in-memory buffer. Which flush moves those
//! bytes to the sink is decided once, by the variant passed at construction.

use std::io::Write;

use futures::io::{AsyncWrite, AsyncWriteExt};

pub enum Output<'a> {
    /// Every flush completes before returning.
    Sync(Box<dyn Write + 'a>),
    /// Flushes are awaited; nothing blocks in between.
    Async(Box<dyn AsyncWrite + Unpin + 'a>),
}

impl<'a> Output<'a> {
    pub fn sync(sink: impl Write + 'a) -> Self {
        Output::Sync(Box::new(sink))
    }

    pub fn asynchronous(sink: impl AsyncWrite + Unpin + 'a) -> Self {
        Output::Async(Box::new(sink))
    }

    pub fn is_async(&self) -> bool {
        matches!(self, Output::Async(_))
    }

    /// Moves `buffer` into a synchronous sink. Returns `false` without
    /// touching the buffer when the sink is asynchronous.
    pub(crate) fn flush(&mut self, buffer: &mut Vec<u8>) -> std::io::Result<bool> {
        match self {
            Output::Sync(sink) => {
                sink.write_all(buffer)?;
                buffer.clear();
                sink.flush()?;
                Ok(true)
            }
            Output::Async(_) => Ok(false),
        }
    }

    /// Moves `buffer` into an asynchronous sink. Returns `false` without
    /// touching the buffer when the sink is synchronous.
    pub(crate) async fn flush_async(&mut self, buffer: &mut Vec<u8>) -> std::io::Result<bool> {
        match self {
            Output::Async(sink) => {
                sink.write_all(buffer).await?;
                buffer.clear();
                sink.flush().await?;
                Ok(true)
            }
            Output::Sync(_) => Ok(false),
        }
    }
}

impl std::fmt::Debug for Output<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Output::Sync(_) => f.write_str("Output::Sync"),
            Output::Async(_) => f.write_str("Output::Async"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use futures::io::Cursor;

    #[test]
    fn test_sync_flush_drains_buffer() {
        let mut sink = Vec::new();
        {
            let mut output = Output::sync(&mut sink);
            let mut buffer = b"abc".to_vec();
            assert!(output.flush(&mut buffer).unwrap());
            assert!(buffer.is_empty());
            assert!(!block_on(output.flush_async(&mut b"x".to_vec())).unwrap());
        }
        assert_eq!(sink, b"abc");
    }

    #[test]
    fn test_async_flush_drains_buffer() {
        let mut sink = Cursor::new(Vec::new());
        {
            let mut output = Output::asynchronous(&mut sink);
            let mut buffer = b"abc".to_vec();
            assert!(!output.flush(&mut buffer).unwrap());
            assert_eq!(buffer, b"abc");
            assert!(block_on(output.flush_async(&mut buffer)).unwrap());
            assert!(buffer.is_empty());
        }
        assert_eq!(sink.into_inner(), b"abc");
    }
}
