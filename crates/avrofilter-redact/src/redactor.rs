//! Incremental container rewriter
//!
//! Input arrives in arbitrary chunks. The header is held back until it is
//! complete, then each block is rewritten as soon as its last byte (and sync
//! marker) has arrived. Nothing past the current block is ever buffered.

use std::collections::BTreeSet;
use std::io::{Read, Write};
use std::sync::Arc;

use avrofilter_codec::container::write_block;
use avrofilter_codec::{
    AvroBinaryCodec, Block, BlockCodec, CodecError, Header, HeaderReader, ParsedSchema,
    RecordCodec, SCHEMA_KEY, SyncMarker, check_count,
};
use avrofilter_core::{Error, ForbiddenSet, MissingFieldPolicy, Result};
use bytes::{Buf, Bytes, BytesMut};
use tracing::debug;

use crate::reduce::reduce_schema;

const READ_CHUNK: usize = 64 * 1024;

/// Counters for one redacted stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RedactionStats {
    pub blocks: u64,
    pub records: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

enum State {
    Passthrough,
    Header(HeaderReader),
    Blocks(Box<StreamSchemas>),
    Failed,
}

/// Per-stream context fixed once the header has been read
struct StreamSchemas {
    original: ParsedSchema,
    reduced: ParsedSchema,
    codec: BlockCodec,
    sync: SyncMarker,
}

pub struct Redactor {
    forbidden: BTreeSet<String>,
    missing: MissingFieldPolicy,
    records: Arc<dyn RecordCodec>,
    state: State,
    buffer: BytesMut,
    stats: RedactionStats,
}

impl Redactor {
    pub fn new(forbidden: &ForbiddenSet, missing: MissingFieldPolicy) -> Self {
        Self::with_codec(forbidden, missing, Arc::new(AvroBinaryCodec))
    }

    pub fn with_codec(
        forbidden: &ForbiddenSet,
        missing: MissingFieldPolicy,
        records: Arc<dyn RecordCodec>,
    ) -> Self {
        let state = if forbidden.is_empty() {
            State::Passthrough
        } else {
            State::Header(HeaderReader::new())
        };

        Self {
            forbidden: forbidden.fields().clone(),
            missing,
            records,
            state,
            buffer: BytesMut::new(),
            stats: RedactionStats::default(),
        }
    }

    /// Whether this redactor forwards input untouched
    pub fn is_passthrough(&self) -> bool {
        matches!(self.state, State::Passthrough)
    }

    pub fn stats(&self) -> RedactionStats {
        self.stats
    }

    /// Feed the next chunk of input, returning whatever output is now ready.
    ///
    /// After the first error every further call fails as well.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<Bytes>> {
        self.stats.bytes_in += chunk.len() as u64;

        match self.state {
            State::Passthrough => {
                self.stats.bytes_out += chunk.len() as u64;
                return Ok(vec![Bytes::copy_from_slice(chunk)]);
            }
            State::Failed => {
                return Err(Error::CorruptInput(
                    "stream already failed to redact".to_string(),
                ));
            }
            _ => {}
        }

        self.buffer.extend_from_slice(chunk);

        let mut out = Vec::new();
        if let Err(err) = self.drain(&mut out) {
            self.fail();
            return Err(err);
        }
        self.stats.bytes_out += out.iter().map(|b| b.len() as u64).sum::<u64>();
        Ok(out)
    }

    /// Signal end of input. Fails if the input stopped inside a header or block.
    pub fn finish(&mut self) -> Result<RedactionStats> {
        let result = match &self.state {
            State::Passthrough => Ok(()),
            State::Failed => Err(Error::CorruptInput(
                "stream already failed to redact".to_string(),
            )),
            // an empty body has nothing to leak
            State::Header(_) if self.stats.bytes_in == 0 => Ok(()),
            State::Header(_) => Err(Error::CorruptInput(
                "input ended inside the container header".to_string(),
            )),
            State::Blocks(_) if !self.buffer.is_empty() => Err(Error::CorruptInput(format!(
                "input ended inside a block ({} bytes pending)",
                self.buffer.len()
            ))),
            State::Blocks(_) => Ok(()),
        };

        match result {
            Ok(()) => {
                debug!(
                    blocks = self.stats.blocks,
                    records = self.stats.records,
                    bytes_in = self.stats.bytes_in,
                    bytes_out = self.stats.bytes_out,
                    "redaction complete"
                );
                Ok(self.stats)
            }
            Err(err) => {
                self.fail();
                Err(err)
            }
        }
    }

    fn fail(&mut self) {
        self.state = State::Failed;
        self.buffer = BytesMut::new();
    }

    fn drain(&mut self, out: &mut Vec<Bytes>) -> Result<()> {
        loop {
            match &mut self.state {
                State::Header(reader) => {
                    let Some((header, consumed)) = reader.advance(&self.buffer).map_err(corrupt)?
                    else {
                        return Ok(());
                    };
                    self.buffer.advance(consumed);

                    let (schemas, rewritten) = self.start(header)?;
                    out.push(rewritten);
                    self.state = State::Blocks(Box::new(schemas));
                }
                State::Blocks(schemas) => {
                    if self.buffer.is_empty() {
                        return Ok(());
                    }
                    let mut slice: &[u8] = &self.buffer;
                    let block = match Block::parse(&mut slice, &schemas.sync) {
                        Ok(block) => block,
                        Err(e) if e.is_incomplete() => return Ok(()),
                        Err(e) => return Err(corrupt(e)),
                    };
                    let rewritten =
                        rewrite_block(schemas, &block, self.records.as_ref(), &self.forbidden)?;
                    let consumed = self.buffer.len() - slice.len();

                    self.stats.blocks += 1;
                    self.stats.records += block.count as u64;
                    self.buffer.advance(consumed);
                    out.push(rewritten);
                }
                State::Passthrough | State::Failed => return Ok(()),
            }
        }
    }

    /// Derive the reduced schema and emit the rewritten header
    fn start(&self, mut header: Header) -> Result<(StreamSchemas, Bytes)> {
        let original = header.schema().map_err(schema_error)?;
        let codec = header.codec().map_err(corrupt)?;
        let reduced = reduce_schema(&original, &self.forbidden, self.missing)?;

        debug!(
            removed = ?self.forbidden,
            codec = codec.name(),
            kept = reduced.field_names().map(|f| f.len()).unwrap_or(0),
            "rewriting container header"
        );

        let reduced_json = reduced.to_json_string().map_err(schema_error)?;
        header.set(SCHEMA_KEY, reduced_json.into_bytes());

        let mut bytes = Vec::new();
        header.write(&mut bytes);

        Ok((
            StreamSchemas {
                original,
                reduced,
                codec,
                sync: header.sync,
            },
            Bytes::from(bytes),
        ))
    }
}

fn rewrite_block(
    schemas: &StreamSchemas,
    block: &Block<'_>,
    records: &dyn RecordCodec,
    forbidden: &BTreeSet<String>,
) -> Result<Bytes> {
    let data = schemas.codec.decompress(block.payload).map_err(corrupt)?;
    let mut slice: &[u8] = &data;
    check_count(&schemas.original, schemas.original.root(), block.count, data.len())
        .map_err(corrupt)?;
    let mut payload = Vec::with_capacity(data.len());

    for _ in 0..block.count {
        let mut record = records
            .decode_record(&schemas.original, &mut slice)
            .map_err(|e| match e {
                CodecError::UnexpectedEof => {
                    Error::CorruptInput("record runs past the end of its block".to_string())
                }
                other => corrupt(other),
            })?;
        record.remove_fields(|name| forbidden.contains(name));
        records
            .encode_record(&schemas.reduced, &record, &mut payload)
            .map_err(schema_error)?;
    }

    if !slice.is_empty() {
        return Err(corrupt(CodecError::TrailingBytes(slice.len())));
    }

    let compressed = schemas.codec.compress(&payload).map_err(corrupt)?;
    let mut framed = Vec::with_capacity(compressed.len() + 32);
    write_block(&mut framed, block.count, &compressed, &schemas.sync);
    Ok(Bytes::from(framed))
}

fn corrupt(err: CodecError) -> Error {
    Error::CorruptInput(err.to_string())
}

fn schema_error(err: CodecError) -> Error {
    if err.is_schema_error() {
        Error::Schema(err.to_string())
    } else {
        Error::CorruptInput(err.to_string())
    }
}

/// Redact a complete in-memory container
pub fn redact_bytes(input: &[u8], forbidden: &ForbiddenSet, missing: MissingFieldPolicy) -> Result<Vec<u8>> {
    if forbidden.is_empty() {
        return Ok(input.to_vec());
    }

    let mut redactor = Redactor::new(forbidden, missing);
    let mut output = Vec::with_capacity(input.len());
    for chunk in redactor.push(input)? {
        output.extend_from_slice(&chunk);
    }
    redactor.finish()?;
    Ok(output)
}

/// Redact from a reader into a writer, one chunk at a time
pub fn redact_io<R: Read, W: Write>(
    mut reader: R,
    mut writer: W,
    forbidden: &ForbiddenSet,
    missing: MissingFieldPolicy,
) -> Result<RedactionStats> {
    let mut redactor = Redactor::new(forbidden, missing);
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        let n = reader.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        for out in redactor.push(&chunk[..n])? {
            writer.write_all(&out)?;
        }
    }

    let stats = redactor.finish()?;
    writer.flush()?;
    Ok(stats)
}
