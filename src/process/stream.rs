//! Turns a child pipe into a stream of UTF-8 text chunks.

use std::io;

use async_stream::try_stream;
use futures_core::Stream;
use tokio::io::{AsyncRead, AsyncReadExt};

const CHUNK_SIZE: usize = 8 * 1024;

/// Yields text as soon as it arrives. Multi-byte characters split across
/// reads are held back until complete; invalid bytes become U+FFFD.
pub fn text_chunks<R>(reader: R) -> impl Stream<Item = io::Result<String>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    try_stream! {
        let mut reader = reader;
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut pending: Vec<u8> = Vec::new();
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                if !pending.is_empty() {
                    yield String::from_utf8_lossy(&pending).into_owned();
                }
                break;
            }
            pending.extend_from_slice(&buf[..n]);
            let text = drain_utf8(&mut pending);
            if !text.is_empty() {
                yield text;
            }
        }
    }
}

/// Decodes the longest complete prefix of `pending`, leaving any trailing
/// partial character in place.
fn drain_utf8(pending: &mut Vec<u8>) -> String {
    let mut out = String::new();
    loop {
        match std::str::from_utf8(pending) {
            Ok(s) => {
                out.push_str(s);
                pending.clear();
                return out;
            }
            Err(e) => {
                let valid = e.valid_up_to();
                out.push_str(&String::from_utf8_lossy(&pending[..valid]));
                match e.error_len() {
                    None => {
                        pending.drain(..valid);
                        return out;
                    }
                    Some(bad) => {
                        out.push(char::REPLACEMENT_CHARACTER);
                        pending.drain(..valid + bad);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[test]
    fn holds_back_partial_characters() {
        let snowman = "☃".as_bytes();
        let mut pending = vec![b'a', snowman[0], snowman[1]];
        assert_eq!(drain_utf8(&mut pending), "a");
        assert_eq!(pending.len(), 2);
        pending.push(snowman[2]);
        assert_eq!(drain_utf8(&mut pending), "☃");
        assert!(pending.is_empty());
    }

    #[test]
    fn replaces_invalid_bytes() {
        let mut pending = vec![b'a', 0xff, b'b'];
        assert_eq!(drain_utf8(&mut pending), "a\u{fffd}b");
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn reads_until_eof() {
        let input: &'static [u8] = "line one\nline two ☃\n".as_bytes();
        let chunks: Vec<String> = text_chunks(input)
            .map(|c| c.unwrap())
            .collect()
            .await;
        assert_eq!(chunks.concat(), "line one\nline two ☃\n");
    }

    #[tokio::test]
    async fn trailing_partial_character_is_flushed_lossily() {
        let input: &'static [u8] = &[b'o', b'k', 0xe2, 0x98];
        let chunks: Vec<String> = text_chunks(input)
            .map(|c| c.unwrap())
            .collect()
            .await;
        assert_eq!(chunks.concat(), "ok\u{fffd}");
    }
}
