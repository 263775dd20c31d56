use std::fmt;
use std::io;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::constants::encoding_type;

pub type RdbResult<T> = Result<T, RdbError>;
pub type RdbOk = RdbResult<()>;

/// Key expiration instant. `None` means the key does not expire.
pub type Expiry = Option<DateTime<Utc>>;

#[derive(Error, Debug)]
pub enum RdbError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("missing REDIS magic string")]
    BadMagic,
    #[error("unsupported RDB version {0}")]
    BadVersion(u32),
    #[error("invalid length encoding byte {0:#04x}")]
    BadLengthEncoding(u8),
    #[error("invalid string encoding {0}")]
    BadStringEncoding(u64),
    #[error("lzf decompression failed: {0}")]
    LzfDecompress(String),
    #[error("lzf length mismatch: expected {expected} bytes, got {actual}")]
    LzfLengthMismatch { expected: usize, actual: usize },
    #[error("ziplist byte count does not match payload length")]
    BadZiplistHeader,
    #[error("invalid ziplist terminator {0:#04x}")]
    BadZiplistTerminator(u8),
    #[error("invalid ziplist entry header {0:#04x}")]
    BadZiplistEntryHeader(u8),
    #[error("odd entry count {0} in pair-encoded ziplist")]
    OddZiplistPairCount(u16),
    #[error("invalid length byte {0} in zipmap")]
    BadZipmapLength(u8),
    #[error("invalid intset encoding width {0}")]
    BadIntsetEncoding(u32),
    #[error("sorted set score is not a valid number")]
    BadScoreValue,
    #[error("invalid module opcode {0}")]
    BadModuleOpcode(u64),
    #[error("module '{0}' is stored in the unsupported v1 format")]
    ModuleV1Unsupported(String),
    #[error("malformed stream block: {0}")]
    BadStreamBlock(&'static str),
    #[error("checksum mismatch: computed {computed:#018x}, stored {stored:#018x}")]
    BadChecksum { computed: u64, stored: u64 },
    #[error("unsupported value type {0}")]
    UnsupportedValueType(u8),
    #[error("{0}")]
    Context(ErrorContext),
}

/// Wraps a decode failure with the stream offset and, when one was already
/// read, the key the decoder was working on.
#[derive(Debug)]
pub struct ErrorContext {
    pub offset: u64,
    pub key: Option<String>,
    pub source: Box<RdbError>,
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at offset {}", self.source, self.offset)?;
        if let Some(key) = &self.key {
            write!(f, " while reading key '{}'", key)?;
        }
        Ok(())
    }
}

impl RdbError {
    pub fn at(self, offset: u64, key: Option<&[u8]>) -> RdbError {
        match self {
            RdbError::Context(_) => self,
            source => RdbError::Context(ErrorContext {
                offset,
                key: key.map(|k| String::from_utf8_lossy(k).into_owned()),
                source: Box::new(source),
            }),
        }
    }
}

/// Logical data types, as exposed to filters.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Type {
    String,
    List,
    Set,
    SortedSet,
    Hash,
    Stream,
    Module,
}

impl Type {
    pub fn from_encoding(enc_type: u8) -> Option<Type> {
        match enc_type {
            encoding_type::STRING => Some(Type::String),
            encoding_type::HASH | encoding_type::HASH_ZIPMAP | encoding_type::HASH_ZIPLIST => {
                Some(Type::Hash)
            }
            encoding_type::LIST | encoding_type::LIST_ZIPLIST | encoding_type::LIST_QUICKLIST => {
                Some(Type::List)
            }
            encoding_type::SET | encoding_type::SET_INTSET => Some(Type::Set),
            encoding_type::ZSET | encoding_type::ZSET_2 | encoding_type::ZSET_ZIPLIST => {
                Some(Type::SortedSet)
            }
            encoding_type::MODULE | encoding_type::MODULE_2 => Some(Type::Module),
            encoding_type::STREAM_LISTPACKS => Some(Type::Stream),
            _ => None,
        }
    }

    pub fn from_name(name: &str) -> Option<Type> {
        match name {
            "string" => Some(Type::String),
            "list" => Some(Type::List),
            "set" => Some(Type::Set),
            "sortedset" => Some(Type::SortedSet),
            "hash" => Some(Type::Hash),
            "stream" => Some(Type::Stream),
            "module" => Some(Type::Module),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Type::String => "string",
            Type::List => "list",
            Type::Set => "set",
            Type::SortedSet => "sortedset",
            Type::Hash => "hash",
            Type::Stream => "stream",
            Type::Module => "module",
        }
    }
}

/// On-disk encoding of a value, delivered with each `start_*` event.
/// The payload is the raw byte length of the wrapping string where one
/// exists.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum EncodingType {
    String,
    LinkedList,
    Hashtable,
    Skiplist,
    Intset(u64),
    Ziplist(u64),
    Zipmap(u64),
    Quicklist,
    Listpacks,
}

impl EncodingType {
    pub fn name(&self) -> &'static str {
        match self {
            EncodingType::String => "string",
            EncodingType::LinkedList => "linkedlist",
            EncodingType::Hashtable => "hashtable",
            EncodingType::Skiplist => "skiplist",
            EncodingType::Intset(_) => "intset",
            EncodingType::Ziplist(_) => "ziplist",
            EncodingType::Zipmap(_) => "zipmap",
            EncodingType::Quicklist => "quicklist",
            EncodingType::Listpacks => "listpacks",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ZiplistEntry {
    String(Vec<u8>),
    Number(i64),
}

/// One item of a module-v2 payload.
#[derive(Clone, Debug, PartialEq)]
pub enum ModuleValue {
    SInt(i64),
    UInt(u64),
    Float(f32),
    Double(f64),
    String(Vec<u8>),
}

/// A pending entry list record of a stream consumer group.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamPendingEntry {
    pub id: [u8; 16],
    pub delivery_time: u64,
    pub delivery_count: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StreamConsumer {
    pub name: Vec<u8>,
    pub seen_time: u64,
    pub pending: Vec<[u8; 16]>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StreamGroup {
    pub name: Vec<u8>,
    pub last_entry_ms: u64,
    pub last_entry_seq: u64,
    pub pending: Vec<StreamPendingEntry>,
    pub consumers: Vec<StreamConsumer>,
}
