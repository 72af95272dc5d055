//! Object container framing
//!
//! ```text
//! header: "Obj\x01" | metadata map<bytes> | sync[16]
//! block:  count:long | size:long | payload[size] | sync[16]
//! ```
//!
//! All parse functions take `&mut &[u8]` and only advance it on success, so a
//! streaming caller can retry once more bytes arrive.

use std::borrow::Cow;
use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;

use crate::binary::{read_block_count, read_fixed, read_len, write_bytes, write_long};
use crate::codec::{RecordCodec, check_count};
use crate::error::{CodecError, Result};
use crate::schema::ParsedSchema;
use crate::value::Record;

pub const MAGIC: [u8; 4] = *b"Obj\x01";
pub const SYNC_SIZE: usize = 16;
pub const SCHEMA_KEY: &str = "avro.schema";
pub const CODEC_KEY: &str = "avro.codec";

pub type SyncMarker = [u8; SYNC_SIZE];

/// Headers are a schema and a handful of metadata entries; anything larger
/// is not a container we will buffer
pub const MAX_HEADER_SIZE: usize = 1 << 20;

/// Compression applied to block payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockCodec {
    Null,
    Deflate,
}

impl BlockCodec {
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "null" => Ok(BlockCodec::Null),
            "deflate" => Ok(BlockCodec::Deflate),
            other => Err(CodecError::UnsupportedCodec(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BlockCodec::Null => "null",
            BlockCodec::Deflate => "deflate",
        }
    }

    pub fn decompress<'a>(&self, payload: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        match self {
            BlockCodec::Null => Ok(Cow::Borrowed(payload)),
            BlockCodec::Deflate => {
                let mut out = Vec::with_capacity(payload.len() * 2);
                DeflateDecoder::new(payload).read_to_end(&mut out)?;
                Ok(Cow::Owned(out))
            }
        }
    }

    pub fn compress<'a>(&self, payload: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        match self {
            BlockCodec::Null => Ok(Cow::Borrowed(payload)),
            BlockCodec::Deflate => {
                let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(payload)?;
                Ok(Cow::Owned(encoder.finish()?))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Metadata entries in file order
    pub metadata: Vec<(String, Vec<u8>)>,
    pub sync: SyncMarker,
}

impl Header {
    pub fn new(schema: &ParsedSchema, codec: BlockCodec, sync: SyncMarker) -> Result<Self> {
        Ok(Self {
            metadata: vec![
                (SCHEMA_KEY.to_string(), schema.to_json_string()?.into_bytes()),
                (CODEC_KEY.to_string(), codec.name().as_bytes().to_vec()),
            ],
            sync,
        })
    }

    /// Parse a header from the front of `buf`
    pub fn parse(buf: &mut &[u8]) -> Result<Self> {
        match HeaderReader::new().advance(buf)? {
            Some((header, len)) => {
                *buf = &buf[len..];
                Ok(header)
            }
            None => Err(CodecError::UnexpectedEof),
        }
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&MAGIC);
        if !self.metadata.is_empty() {
            write_long(out, self.metadata.len() as i64);
            for (key, value) in &self.metadata {
                write_bytes(out, key.as_bytes());
                write_bytes(out, value);
            }
        }
        write_long(out, 0);
        out.extend_from_slice(&self.sync);
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.metadata
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
    }

    /// Replace a metadata value in place, or append it if absent
    pub fn set(&mut self, key: &str, value: Vec<u8>) {
        match self.metadata.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.metadata.push((key.to_string(), value)),
        }
    }

    pub fn schema(&self) -> Result<ParsedSchema> {
        let raw = self
            .get(SCHEMA_KEY)
            .ok_or(CodecError::MissingMetadata(SCHEMA_KEY))?;
        ParsedSchema::parse_slice(raw)
    }

    /// Block codec named in the header; absent means `null`
    pub fn codec(&self) -> Result<BlockCodec> {
        match self.get(CODEC_KEY) {
            None => Ok(BlockCodec::Null),
            Some(raw) => {
                let name = std::str::from_utf8(raw).map_err(|_| CodecError::InvalidUtf8)?;
                BlockCodec::from_name(name)
            }
        }
    }
}

/// Parses a header that arrives in pieces.
///
/// Each call gets every header byte received so far, from the start of the
/// stream. Completed metadata entries are kept between calls and the reader
/// waits until enough bytes exist for the next step, so a header fed one
/// byte at a time is still parsed in linear time.
#[derive(Debug, Default)]
pub struct HeaderReader {
    /// End of the last complete step
    pos: usize,
    magic: bool,
    /// Entries left in the current metadata block
    pending: usize,
    metadata: Vec<(String, Vec<u8>)>,
    /// Input length below which no progress is possible
    need: usize,
}

impl HeaderReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Ok(None)` asks for more input. On completion returns the header and
    /// how many bytes of `buf` it occupies.
    pub fn advance(&mut self, buf: &[u8]) -> Result<Option<(Header, usize)>> {
        if buf.len() < self.need {
            return Ok(None);
        }
        match self.step(buf) {
            Err(CodecError::UnexpectedEof) => {
                self.need = self.need.max(buf.len() + 1);
                if self.need > MAX_HEADER_SIZE {
                    return Err(CodecError::HeaderTooLarge(MAX_HEADER_SIZE));
                }
                Ok(None)
            }
            other => other,
        }
    }

    fn step(&mut self, buf: &[u8]) -> Result<Option<(Header, usize)>> {
        if !self.magic {
            if self.read(buf, self.pos, MAGIC.len())? != MAGIC {
                return Err(CodecError::InvalidMagic);
            }
            self.pos += MAGIC.len();
            self.magic = true;
        }

        loop {
            if self.pending == 0 {
                let mut cursor = &buf[self.pos..];
                let count = read_block_count(&mut cursor)?;
                // key and value lengths take a byte each
                if count > MAX_HEADER_SIZE / 2 {
                    return Err(CodecError::HeaderTooLarge(MAX_HEADER_SIZE));
                }
                let at = buf.len() - cursor.len();

                if count == 0 {
                    let mut sync = [0u8; SYNC_SIZE];
                    sync.copy_from_slice(self.read(buf, at, SYNC_SIZE)?);
                    let header = Header {
                        metadata: std::mem::take(&mut self.metadata),
                        sync,
                    };
                    return Ok(Some((header, at + SYNC_SIZE)));
                }

                self.pos = at;
                self.pending = count;
            }

            let (key, at) = self.read_bytes(buf, self.pos)?;
            let key = std::str::from_utf8(key).map_err(|_| CodecError::InvalidUtf8)?;
            let (value, at) = self.read_bytes(buf, at)?;

            self.metadata.push((key.to_string(), value.to_vec()));
            self.pos = at;
            self.pending -= 1;
        }
    }

    /// `len` bytes at `at`, noting how much input they need if absent
    fn read<'a>(&mut self, buf: &'a [u8], at: usize, len: usize) -> Result<&'a [u8]> {
        let end = at.saturating_add(len);
        if end > MAX_HEADER_SIZE {
            return Err(CodecError::HeaderTooLarge(MAX_HEADER_SIZE));
        }
        match buf.get(at..end) {
            Some(bytes) => Ok(bytes),
            None => {
                self.need = end;
                Err(CodecError::UnexpectedEof)
            }
        }
    }

    /// Length-prefixed bytes at `at`, with the position after them
    fn read_bytes<'a>(&mut self, buf: &'a [u8], at: usize) -> Result<(&'a [u8], usize)> {
        let mut cursor = &buf[at..];
        let len = read_len(&mut cursor)?;
        let start = buf.len() - cursor.len();
        let bytes = self.read(buf, start, len)?;
        Ok((bytes, start + len))
    }
}

/// Record count and payload size that open every block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub count: usize,
    pub size: usize,
}

impl BlockHeader {
    pub fn parse(buf: &mut &[u8]) -> Result<Self> {
        let mut cursor = *buf;
        let count = read_len(&mut cursor)?;
        let size = read_len(&mut cursor)?;
        *buf = cursor;
        Ok(Self { count, size })
    }

    /// Bytes the whole block occupies once its header is read
    pub fn remaining_len(&self) -> usize {
        self.size.saturating_add(SYNC_SIZE)
    }
}

/// One framed block, payload still compressed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block<'a> {
    pub count: usize,
    pub payload: &'a [u8],
}

impl<'a> Block<'a> {
    /// Parse a complete block, checking its trailing sync marker
    pub fn parse(buf: &mut &'a [u8], sync: &SyncMarker) -> Result<Self> {
        let mut cursor = *buf;
        let header = BlockHeader::parse(&mut cursor)?;
        let payload = read_fixed(&mut cursor, header.size)?;
        if read_fixed(&mut cursor, SYNC_SIZE)? != sync {
            return Err(CodecError::SyncMismatch);
        }
        *buf = cursor;
        Ok(Self {
            count: header.count,
            payload,
        })
    }

    /// Decode every record in the block
    pub fn records(
        &self,
        codec: BlockCodec,
        records: &dyn RecordCodec,
        schema: &ParsedSchema,
    ) -> Result<Vec<Record>> {
        let data = codec.decompress(self.payload)?;
        let mut slice: &[u8] = &data;
        check_count(schema, schema.root(), self.count, slice.len())?;
        let mut out = Vec::with_capacity(self.count.min(slice.len().max(1)));
        for _ in 0..self.count {
            out.push(records.decode_record(schema, &mut slice).map_err(eof_is_corrupt)?);
        }
        if !slice.is_empty() {
            return Err(CodecError::TrailingBytes(slice.len()));
        }
        Ok(out)
    }
}

/// Frame an already-encoded payload as a block
pub fn write_block(out: &mut Vec<u8>, count: usize, payload: &[u8], sync: &SyncMarker) {
    write_long(out, count as i64);
    write_long(out, payload.len() as i64);
    out.extend_from_slice(payload);
    out.extend_from_slice(sync);
}

/// Inside a complete block, running out of bytes means the block lied
fn eof_is_corrupt(err: CodecError) -> CodecError {
    match err {
        CodecError::UnexpectedEof => CodecError::TypeMismatch(
            "record runs past the end of its block".to_string(),
        ),
        other => other,
    }
}

/// Builds a whole container in memory, one block per [`flush`](Self::flush)
pub struct ContainerWriter<'c> {
    schema: ParsedSchema,
    codec: BlockCodec,
    records: &'c dyn RecordCodec,
    sync: SyncMarker,
    out: Vec<u8>,
    pending: Vec<u8>,
    pending_count: usize,
}

impl<'c> ContainerWriter<'c> {
    pub fn new(
        schema: ParsedSchema,
        codec: BlockCodec,
        records: &'c dyn RecordCodec,
        sync: SyncMarker,
    ) -> Result<Self> {
        let mut out = Vec::new();
        Header::new(&schema, codec, sync)?.write(&mut out);
        Ok(Self {
            schema,
            codec,
            records,
            sync,
            out,
            pending: Vec::new(),
            pending_count: 0,
        })
    }

    pub fn append(&mut self, record: &Record) -> Result<()> {
        self.records
            .encode_record(&self.schema, record, &mut self.pending)?;
        self.pending_count += 1;
        Ok(())
    }

    /// Close the current block, if it holds any records
    pub fn flush(&mut self) -> Result<()> {
        if self.pending_count == 0 {
            return Ok(());
        }
        let payload = self.codec.compress(&self.pending)?;
        write_block(&mut self.out, self.pending_count, &payload, &self.sync);
        self.pending.clear();
        self.pending_count = 0;
        Ok(())
    }

    pub fn finish(mut self) -> Result<Vec<u8>> {
        self.flush()?;
        Ok(self.out)
    }
}

/// Reads a complete in-memory container block by block
pub struct ContainerReader<'a, 'c> {
    header: Header,
    schema: ParsedSchema,
    codec: BlockCodec,
    records: &'c dyn RecordCodec,
    rest: &'a [u8],
}

impl<'a, 'c> ContainerReader<'a, 'c> {
    pub fn new(data: &'a [u8], records: &'c dyn RecordCodec) -> Result<Self> {
        let mut rest = data;
        let header = Header::parse(&mut rest)?;
        let schema = header.schema()?;
        let codec = header.codec()?;
        Ok(Self {
            header,
            schema,
            codec,
            records,
            rest,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn schema(&self) -> &ParsedSchema {
        &self.schema
    }

    /// Next block's records, or `None` at the end of the container
    pub fn next_block(&mut self) -> Result<Option<Vec<Record>>> {
        if self.rest.is_empty() {
            return Ok(None);
        }
        let block = Block::parse(&mut self.rest, &self.header.sync)?;
        block
            .records(self.codec, self.records, &self.schema)
            .map(Some)
    }

    /// Every remaining record, flattened across blocks
    pub fn read_all(mut self) -> Result<Vec<Record>> {
        let mut all = Vec::new();
        while let Some(records) = self.next_block()? {
            all.extend(records);
        }
        Ok(all)
    }
}
