use std::sync::Arc;

use encoding_rs::{Decoder, DecoderResult, Encoding, UTF_8};
use snafu::{OptionExt, Snafu};

use super::message::{Clock, MessageKey, Sender};
use super::store::{EntryChange, MessageStore};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DecodeError {
    #[snafu(display("response charset '{charset}' is not supported"))]
    UnsupportedCharset {
        stage: &'static str,
        charset: String,
    },
    #[snafu(display("invalid {charset} byte sequence at offset {offset} of chunk {chunk}"))]
    InvalidSequence {
        stage: &'static str,
        charset: &'static str,
        chunk: usize,
        offset: usize,
    },
    #[snafu(display("stream ended inside a multi-byte sequence ({trailing} bytes left)"))]
    IncompleteSequence {
        stage: &'static str,
        trailing: usize,
    },
}

pub type DecodeResult<T> = Result<T, DecodeError>;

/// Incremental decoder for one response body. Split multi-byte sequences are carried
/// across chunks and a leading BOM is dropped.
struct ChunkDecoder {
    encoding: &'static Encoding,
    decoder: Decoder,
    chunk_index: usize,
}

impl ChunkDecoder {
    /// Resolves a declared charset label the way browsers do. No label means UTF-8.
    fn for_label(declared: Option<&str>) -> DecodeResult<Self> {
        let encoding = match declared.map(str::trim).filter(|label| !label.is_empty()) {
            None => UTF_8,
            Some(label) => Encoding::for_label(label.as_bytes()).context(
                UnsupportedCharsetSnafu {
                    stage: "resolve-charset",
                    charset: label,
                },
            )?,
        };

        Ok(Self {
            encoding,
            decoder: encoding.new_decoder_with_bom_removal(),
            chunk_index: 0,
        })
    }

    fn decode(&mut self, chunk: &[u8]) -> DecodeResult<String> {
        let chunk_index = self.chunk_index;
        self.chunk_index += 1;

        let mut text = String::new();
        let mut consumed = 0;
        loop {
            let remaining = &chunk[consumed..];
            text.reserve(
                self.decoder
                    .max_utf8_buffer_length_without_replacement(remaining.len())
                    .unwrap_or(remaining.len()),
            );
            let (result, read) =
                self.decoder
                    .decode_to_string_without_replacement(remaining, &mut text, false);
            consumed += read;

            match result {
                DecoderResult::InputEmpty => return Ok(text),
                DecoderResult::OutputFull => continue,
                DecoderResult::Malformed(bad, extra) => {
                    return InvalidSequenceSnafu {
                        stage: "decode-chunk",
                        charset: self.encoding.name(),
                        chunk: chunk_index,
                        offset: consumed.saturating_sub(usize::from(bad) + usize::from(extra)),
                    }
                    .fail();
                }
            }
        }
    }

    /// Flushes the decoder at end of stream. Bytes still pending form an
    /// incomplete sequence.
    fn finish(&mut self) -> DecodeResult<String> {
        let mut tail = String::with_capacity(
            self.decoder
                .max_utf8_buffer_length_without_replacement(0)
                .unwrap_or(16),
        );
        match self
            .decoder
            .decode_to_string_without_replacement(&[], &mut tail, true)
        {
            (DecoderResult::Malformed(bad, extra), _) => IncompleteSequenceSnafu {
                stage: "decode-finish",
                trailing: usize::from(bad) + usize::from(extra),
            }
            .fail(),
            _ => Ok(tail),
        }
    }
}

/// Summary of one reconciled stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSummary {
    /// `None` when the stream closed before any text arrived.
    pub key: Option<MessageKey>,
    pub chunks: usize,
    pub text: String,
    /// Render instruction for text released only when the decoder was flushed.
    pub last_change: Option<EntryChange>,
}

/// Accumulates one streamed reply into a single, stable timeline entry.
///
/// The entry key is allocated once, when the first text arrives, and every store
/// update carries the whole accumulated buffer rather than the latest delta.
pub struct StreamReconciler {
    clock: Arc<dyn Clock>,
    decoder: ChunkDecoder,
    key: Option<MessageKey>,
    buffer: String,
    chunks: usize,
}

impl StreamReconciler {
    pub fn new(charset: Option<&str>, clock: Arc<dyn Clock>) -> DecodeResult<Self> {
        Ok(Self {
            clock,
            decoder: ChunkDecoder::for_label(charset)?,
            key: None,
            buffer: String::new(),
            chunks: 0,
        })
    }

    pub fn key(&self) -> Option<MessageKey> {
        self.key
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn chunks(&self) -> usize {
        self.chunks
    }

    /// Decodes one chunk and upserts the grown buffer. Returns `None` when the
    /// chunk added no text (empty chunk, BOM or a split multi-byte sequence).
    pub fn push_chunk(
        &mut self,
        chunk: &[u8],
        store: &mut MessageStore,
    ) -> DecodeResult<Option<EntryChange>> {
        self.chunks += 1;
        let text = self.decoder.decode(chunk)?;
        Ok(self.absorb(&text, store))
    }

    /// Flushes the decoder. Any text it still held is upserted and returned as
    /// `StreamSummary::last_change`.
    pub fn finish(mut self, store: &mut MessageStore) -> DecodeResult<StreamSummary> {
        let tail = self.decoder.finish()?;
        let last_change = self.absorb(&tail, store);
        Ok(StreamSummary {
            key: self.key,
            chunks: self.chunks,
            text: self.buffer,
            last_change,
        })
    }

    fn absorb(&mut self, text: &str, store: &mut MessageStore) -> Option<EntryChange> {
        if text.is_empty() {
            return None;
        }

        self.buffer.push_str(text);
        let key = match self.key {
            Some(key) => key,
            None => {
                let key = store.allocate_key(Sender::System, self.clock.now());
                self.key = Some(key);
                key
            }
        };

        Some(store.upsert(key, self.buffer.clone()))
    }
}
