//! Line-safe consumption of a chunked container log stream.

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Reads the stream to completion, appending one whole line-delimited read at
/// a time so no log line is ever split across two buffer appends.
///
/// End of stream is a successful termination, not an error; a final partial
/// line with no trailing newline is preserved. Any other read failure aborts
/// the call and no partial buffer is returned.
pub async fn consume_log_stream<R>(mut reader: R) -> io::Result<Vec<u8>>
where
    R: AsyncBufRead + Unpin,
{
    let mut buffer = Vec::new();
    let mut line = Vec::new();
    loop {
        line.clear();
        let read = reader.read_until(b'\n', &mut line).await?;
        buffer.extend_from_slice(&line);
        if read == 0 {
            return Ok(buffer);
        }
    }
}
