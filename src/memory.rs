//! Approximates the RAM a dump would occupy in a running Redis.
//!
//! The profiler is an event sink: it replays the per-key events into the
//! allocation math of the target Redis version (dict entries, sds headers,
//! robj headers, ziplist/quicklist/skiplist layouts, jemalloc size-class
//! rounding) and emits one `MemoryRecord` per key.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::io;
use std::io::Write;
use std::str;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::escape::{escape_key, Escape};
use crate::formatter::Formatter;
use crate::types::{EncodingType, Expiry, RdbResult, StreamGroup};

pub const ZSKIPLIST_MAXLEVEL: u64 = 32;
pub const ZSKIPLIST_P: f64 = 0.25;
pub const REDIS_SHARED_INTEGERS: i64 = 10000;

/// One estimated key (or one synthetic per-database dict record, which
/// carries no key).
#[derive(Clone, Debug, PartialEq)]
pub struct MemoryRecord {
    pub database: u64,
    pub data_type: &'static str,
    pub key: Option<String>,
    pub bytes: u64,
    pub encoding: Option<String>,
    pub size: Option<u64>,
    pub len_largest_element: Option<u64>,
    pub expiry: Expiry,
}

/// Consumer of the profiler's records.
pub trait RecordSink {
    fn next_record(&mut self, record: MemoryRecord) -> RdbResult<()>;
    fn end_rdb(&mut self) -> RdbResult<()> {
        Ok(())
    }
}

/// Target pointer width of the profiled Redis.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Architecture {
    Bits32,
    Bits64,
}

impl Architecture {
    fn pointer_size(self) -> u64 {
        match self {
            Architecture::Bits32 => 4,
            Architecture::Bits64 => 8,
        }
    }
}

/// A `major.minor` Redis version, used to pick overhead formulas.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct RedisVersion {
    pub major: u32,
    pub minor: u32,
}

impl RedisVersion {
    pub const fn new(major: u32, minor: u32) -> RedisVersion {
        RedisVersion { major, minor }
    }
}

impl FromStr for RedisVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(2, '.');
        let major = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| format!("invalid redis version '{}'", s))?;
        let minor = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| format!("invalid redis version '{}'", s))?;
        Ok(RedisVersion { major, minor })
    }
}

const VERSION_3_2: RedisVersion = RedisVersion::new(3, 2);
const VERSION_4_0: RedisVersion = RedisVersion::new(4, 0);

/// Nearest allocator bucket at or above `size`. Sizes beyond the table
/// are returned unchanged.
pub fn jemalloc_allocation(size: u64) -> u64 {
    let index = JEMALLOC_SIZE_CLASSES.partition_point(|&class| class < size);
    JEMALLOC_SIZE_CLASSES.get(index).copied().unwrap_or(size)
}

fn parse_integer(data: &[u8]) -> Option<i64> {
    str::from_utf8(data).ok()?.parse().ok()
}

enum ListEncoding {
    Quicklist,
    Ziplist,
    LinkedList,
}

/// Event sink computing one `MemoryRecord` per key.
pub struct MemoryProfiler<S: RecordSink> {
    sink: S,
    escape: Escape,
    pointer_size: u64,
    long_size: u64,
    redis_version: RedisVersion,
    rng: StdRng,

    dbnum: u64,
    db_keys: u64,
    db_expires: u64,
    total_internal_frag: u64,

    current_size: u64,
    current_encoding: Option<String>,
    current_length: u64,
    len_largest_element: u64,
    key_expiry: Expiry,

    list_encoding: ListEncoding,
    list_items_size: u64,
    list_items_zipped_size: u64,
    cur_zips: u64,
    cur_zip_size: u64,

    listpacks_count: u64,
}

impl<S: RecordSink> MemoryProfiler<S> {
    pub fn new(sink: S, architecture: Architecture, redis_version: RedisVersion) -> Self {
        Self::with_rng(sink, architecture, redis_version, StdRng::from_entropy())
    }

    /// Deterministic profiler for tests: skiplist level sampling draws
    /// from the seeded generator.
    pub fn with_seed(
        sink: S,
        architecture: Architecture,
        redis_version: RedisVersion,
        seed: u64,
    ) -> Self {
        Self::with_rng(sink, architecture, redis_version, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        sink: S,
        architecture: Architecture,
        redis_version: RedisVersion,
        rng: StdRng,
    ) -> Self {
        MemoryProfiler {
            sink,
            escape: Escape::Raw,
            pointer_size: architecture.pointer_size(),
            long_size: architecture.pointer_size(),
            redis_version,
            rng,
            dbnum: 0,
            db_keys: 0,
            db_expires: 0,
            total_internal_frag: 0,
            current_size: 0,
            current_encoding: None,
            current_length: 0,
            len_largest_element: 0,
            key_expiry: None,
            list_encoding: ListEncoding::Quicklist,
            list_items_size: 0,
            list_items_zipped_size: 0,
            cur_zips: 0,
            cur_zip_size: 0,
            listpacks_count: 0,
        }
    }

    pub fn set_escape(&mut self, escape: Escape) {
        self.escape = escape;
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Bytes lost to jemalloc size-class rounding so far.
    pub fn internal_fragmentation(&self) -> u64 {
        self.total_internal_frag
    }

    fn emit_record(
        &mut self,
        data_type: &'static str,
        key: Option<&[u8]>,
        bytes: u64,
        encoding: Option<String>,
        size: Option<u64>,
        largest: Option<u64>,
        expiry: Expiry,
    ) -> RdbResult<()> {
        let record = MemoryRecord {
            database: self.dbnum,
            data_type,
            key: key.map(|k| escape_key(k, self.escape)),
            bytes,
            encoding,
            size,
            len_largest_element: largest,
            expiry,
        };
        self.sink.next_record(record)
    }

    fn end_key(&mut self) {
        self.db_keys += 1;
        self.current_encoding = None;
        self.current_size = 0;
        self.current_length = 0;
        self.len_largest_element = 0;
        self.key_expiry = None;
    }

    fn track_largest(&mut self, element: &[u8]) {
        let length = self.element_length(element);
        if length > self.len_largest_element {
            self.len_largest_element = length;
        }
    }

    fn element_length(&self, element: &[u8]) -> u64 {
        if parse_integer(element).is_some() {
            self.long_size
        } else {
            element.len() as u64
        }
    }

    fn sizeof_string(&mut self, string: &[u8]) -> u64 {
        if let Some(num) = parse_integer(string) {
            if self.redis_version >= VERSION_3_2 {
                // the integer lives inside the robj itself
                return 0;
            }
            if num < REDIS_SHARED_INTEGERS {
                return 0;
            }
            return 8;
        }
        let l = string.len() as u64;
        if self.redis_version < VERSION_3_2 {
            return self.malloc_overhead(l + 8 + 1);
        }
        if l < 1 << 5 {
            self.malloc_overhead(l + 1 + 1)
        } else if l < 1 << 8 {
            self.malloc_overhead(l + 1 + 2 + 1)
        } else if l < 1 << 16 {
            self.malloc_overhead(l + 1 + 4 + 1)
        } else if l < 1 << 32 {
            self.malloc_overhead(l + 1 + 8 + 1)
        } else {
            self.malloc_overhead(l + 1 + 16 + 1)
        }
    }

    /// Every top level value is an entry in the keyspace dict: a dict
    /// entry, the key's sds, a robj, and the expires-table entry when the
    /// key is volatile.
    fn top_level_object_overhead(&mut self, key: &[u8], expiry: Expiry) -> u64 {
        self.hashtable_entry_overhead()
            + self.sizeof_string(key)
            + self.robj_overhead()
            + self.key_expiry_overhead(expiry)
    }

    fn key_expiry_overhead(&mut self, expiry: Expiry) -> u64 {
        if expiry.is_none() {
            return 0;
        }
        self.db_expires += 1;
        // the expires table stores the timestamp as an int64
        self.hashtable_entry_overhead() + 8
    }

    fn hashtable_overhead(&self, size: u64) -> u64 {
        // dict + 2 dictht, plus the bucket array at the next power of
        // two; rehashing can keep both tables alive, hence the 1.5
        4 + 7 * self.long_size
            + 4 * self.pointer_size
            + next_power(size) * self.pointer_size * 3 / 2
    }

    fn hashtable_entry_overhead(&self) -> u64 {
        // dictEntry: 2 pointers + int64
        2 * self.pointer_size + 8
    }

    fn linkedlist_overhead(&self) -> u64 {
        // adlist list: a long + 5 pointers
        self.long_size + 5 * self.pointer_size
    }

    fn linkedlist_entry_overhead(&self) -> u64 {
        // adlist listNode: 3 pointers
        3 * self.pointer_size
    }

    fn quicklist_overhead(&self, zip_count: u64) -> u64 {
        let quicklist = 2 * self.pointer_size + self.long_size + 2 * 4;
        let quickitem = 4 * self.pointer_size + self.long_size + 2 * 4;
        quicklist + zip_count * quickitem
    }

    fn ziplist_header_overhead(&self) -> u64 {
        // <zlbytes><zltail><zllen>...<zlend>
        4 + 4 + 2 + 1
    }

    fn ziplist_entry_overhead(&self, value: &[u8]) -> u64 {
        let (header, size) = if let Some(num) = parse_integer(value) {
            let size = if num < 12 {
                0
            } else if num < 1 << 8 {
                1
            } else if num < 1 << 16 {
                2
            } else if num < 1 << 24 {
                3
            } else if num < 1 << 32 {
                4
            } else {
                8
            };
            (1, size)
        } else {
            let size = value.len() as u64;
            let header = if size <= 63 {
                1
            } else if size <= 16383 {
                2
            } else {
                5
            };
            (header, size)
        };
        let prev_len = if size < 254 { 1 } else { 5 };
        prev_len + header + size
    }

    fn skiplist_overhead(&self, size: u64) -> u64 {
        2 * self.pointer_size + self.hashtable_overhead(size) + 2 * self.pointer_size + 16
    }

    fn skiplist_entry_overhead(&mut self) -> u64 {
        let level = self.zset_random_level();
        self.hashtable_entry_overhead()
            + 2 * self.pointer_size
            + 8
            + (self.pointer_size + 8) * level
    }

    fn robj_overhead(&self) -> u64 {
        self.pointer_size + 8
    }

    fn malloc_overhead(&mut self, size: u64) -> u64 {
        let alloc = jemalloc_allocation(size);
        self.total_internal_frag += alloc - size;
        alloc
    }

    fn zset_random_level(&mut self) -> u64 {
        let mut level = 1;
        while (self.rng.gen_range(0..=0xFFFFu32) as f64) < ZSKIPLIST_P * 0xFFFF as f64 {
            level += 1;
        }
        if level < ZSKIPLIST_MAXLEVEL {
            level
        } else {
            ZSKIPLIST_MAXLEVEL
        }
    }

    fn sizeof_stream_radix_tree(&self, num_elements: u64) -> u64 {
        // rough upper bound following Redis's streamRadixTreeMemoryUsage
        let num_nodes = num_elements * 5 / 2;
        16 * num_elements + num_nodes * 4 + num_nodes * 30 * self.long_size
    }

    fn start_dict_like(
        &mut self,
        key: &[u8],
        length: u64,
        expiry: Expiry,
        info: EncodingType,
    ) -> u64 {
        self.current_encoding = Some(info.name().to_string());
        self.current_length = length;
        self.key_expiry = expiry;
        let mut size = self.top_level_object_overhead(key, expiry);

        size += match info {
            EncodingType::Ziplist(raw) | EncodingType::Zipmap(raw) | EncodingType::Intset(raw) => {
                raw
            }
            EncodingType::Skiplist => self.skiplist_overhead(length),
            _ => self.hashtable_overhead(length),
        };

        size
    }

    fn is_encoding(&self, name: &str) -> bool {
        self.current_encoding.as_deref() == Some(name)
    }
}

impl<S: RecordSink> Formatter for MemoryProfiler<S> {
    fn start_database(&mut self, db_index: u64) -> RdbResult<()> {
        self.dbnum = db_index;
        self.db_keys = 0;
        self.db_expires = 0;

        Ok(())
    }

    fn end_database(&mut self, _db_index: u64) -> RdbResult<()> {
        let keyspace = self.hashtable_overhead(self.db_keys);
        let expires = self.hashtable_overhead(self.db_expires);
        self.emit_record("dict", None, keyspace, None, None, None, None)?;
        self.emit_record("dict", None, expires, None, None, None, None)?;

        Ok(())
    }

    fn end_rdb(&mut self) -> RdbResult<()> {
        self.sink.end_rdb()
    }

    fn set(&mut self, key: &[u8], value: &[u8], expiry: Expiry) -> RdbResult<()> {
        let size = self.top_level_object_overhead(key, expiry) + self.sizeof_string(value);
        let length = self.element_length(value);

        self.emit_record(
            "string",
            Some(key),
            size,
            Some("string".to_string()),
            Some(length),
            Some(length),
            expiry,
        )?;
        self.end_key();

        Ok(())
    }

    fn start_hash(
        &mut self,
        key: &[u8],
        length: u64,
        expiry: Expiry,
        info: EncodingType,
    ) -> RdbResult<()> {
        self.current_size = self.start_dict_like(key, length, expiry, info);

        Ok(())
    }

    fn hash_element(&mut self, _key: &[u8], field: &[u8], value: &[u8]) -> RdbResult<()> {
        self.track_largest(field);
        self.track_largest(value);

        if self.is_encoding("hashtable") {
            let mut added = self.sizeof_string(field);
            added += self.sizeof_string(value);
            added += self.hashtable_entry_overhead();
            if self.redis_version < VERSION_4_0 {
                added += 2 * self.robj_overhead();
            }
            self.current_size += added;
        }

        Ok(())
    }

    fn end_hash(&mut self, key: &[u8]) -> RdbResult<()> {
        let record = (
            self.current_size,
            self.current_encoding.take(),
            self.current_length,
            self.len_largest_element,
            self.key_expiry,
        );
        self.emit_record(
            "hash",
            Some(key),
            record.0,
            record.1,
            Some(record.2),
            Some(record.3),
            record.4,
        )?;
        self.end_key();

        Ok(())
    }

    fn start_set(
        &mut self,
        key: &[u8],
        cardinality: u64,
        expiry: Expiry,
        info: EncodingType,
    ) -> RdbResult<()> {
        // a set is a hash without values
        self.current_size = self.start_dict_like(key, cardinality, expiry, info);

        Ok(())
    }

    fn set_element(&mut self, _key: &[u8], member: &[u8]) -> RdbResult<()> {
        self.track_largest(member);

        if self.is_encoding("hashtable") {
            let mut added = self.sizeof_string(member);
            added += self.hashtable_entry_overhead();
            if self.redis_version < VERSION_4_0 {
                added += self.robj_overhead();
            }
            self.current_size += added;
        }

        Ok(())
    }

    fn end_set(&mut self, key: &[u8]) -> RdbResult<()> {
        let record = (
            self.current_size,
            self.current_encoding.take(),
            self.current_length,
            self.len_largest_element,
            self.key_expiry,
        );
        self.emit_record(
            "set",
            Some(key),
            record.0,
            record.1,
            Some(record.2),
            Some(record.3),
            record.4,
        )?;
        self.end_key();

        Ok(())
    }

    fn start_list(
        &mut self,
        key: &[u8],
        _length: u64,
        expiry: Expiry,
        _info: EncodingType,
    ) -> RdbResult<()> {
        self.current_length = 0;
        self.list_items_size = 0;
        self.list_items_zipped_size = 0;
        self.key_expiry = expiry;

        // ignore the on-disk encoding and predict what the target Redis
        // version would use for this list
        if self.redis_version >= VERSION_3_2 {
            self.list_encoding = ListEncoding::Quicklist;
            self.current_encoding = Some("quicklist".to_string());
            self.cur_zips = 1;
            self.cur_zip_size = 0;
        } else {
            self.list_encoding = ListEncoding::Ziplist;
            self.current_encoding = Some("ziplist".to_string());
        }

        self.current_size = self.top_level_object_overhead(key, expiry);

        Ok(())
    }

    fn list_element(&mut self, _key: &[u8], value: &[u8]) -> RdbResult<()> {
        // default list-max-ziplist-size of -2, one 8K ziplist per node
        const LIST_MAX_ZIPLIST_SIZE: u64 = 8192;
        // pre-3.2 defaults before a list is converted to a linked list
        const LIST_MAX_ZIPLIST_ENTRIES: u64 = 512;
        const LIST_MAX_ZIPLIST_VALUE: u64 = 64;

        self.current_length += 1;

        // a linked list stores integer robjs without an extra allocation
        let size_in_list = if parse_integer(value).is_some() {
            0
        } else {
            self.sizeof_string(value)
        };
        let size_in_zip = self.ziplist_entry_overhead(value);

        self.track_largest(value);

        match self.list_encoding {
            ListEncoding::Ziplist => {
                self.list_items_zipped_size += size_in_zip;
                if self.current_length > LIST_MAX_ZIPLIST_ENTRIES
                    || size_in_zip > LIST_MAX_ZIPLIST_VALUE
                {
                    self.list_encoding = ListEncoding::LinkedList;
                    self.current_encoding = Some("linkedlist".to_string());
                }
            }
            ListEncoding::Quicklist => {
                if self.cur_zip_size + size_in_zip > LIST_MAX_ZIPLIST_SIZE {
                    self.cur_zip_size = size_in_zip;
                    self.cur_zips += 1;
                } else {
                    self.cur_zip_size += size_in_zip;
                }
                self.list_items_zipped_size += size_in_zip;
            }
            ListEncoding::LinkedList => {}
        }
        self.list_items_size += size_in_list;

        Ok(())
    }

    fn end_list(&mut self, key: &[u8]) -> RdbResult<()> {
        let added = match self.list_encoding {
            ListEncoding::Quicklist => {
                self.quicklist_overhead(self.cur_zips)
                    + self.ziplist_header_overhead() * self.cur_zips
                    + self.list_items_zipped_size
            }
            ListEncoding::Ziplist => self.ziplist_header_overhead() + self.list_items_zipped_size,
            ListEncoding::LinkedList => {
                let mut added = self.linkedlist_entry_overhead() * self.current_length;
                added += self.linkedlist_overhead();
                if self.redis_version < VERSION_4_0 {
                    added += self.robj_overhead() * self.current_length;
                }
                added + self.list_items_size
            }
        };
        self.current_size += added;

        let record = (
            self.current_size,
            self.current_encoding.take(),
            self.current_length,
            self.len_largest_element,
            self.key_expiry,
        );
        self.emit_record(
            "list",
            Some(key),
            record.0,
            record.1,
            Some(record.2),
            Some(record.3),
            record.4,
        )?;
        self.end_key();

        Ok(())
    }

    fn start_sorted_set(
        &mut self,
        key: &[u8],
        length: u64,
        expiry: Expiry,
        info: EncodingType,
    ) -> RdbResult<()> {
        self.current_size = self.start_dict_like(key, length, expiry, info);

        Ok(())
    }

    fn sorted_set_element(&mut self, _key: &[u8], _score: f64, member: &[u8]) -> RdbResult<()> {
        self.track_largest(member);

        if self.is_encoding("skiplist") {
            let mut added = 8; // the score double
            added += self.sizeof_string(member);
            if self.redis_version < VERSION_4_0 {
                added += self.robj_overhead();
            }
            added += self.skiplist_entry_overhead();
            self.current_size += added;
        }

        Ok(())
    }

    fn end_sorted_set(&mut self, key: &[u8]) -> RdbResult<()> {
        let record = (
            self.current_size,
            self.current_encoding.take(),
            self.current_length,
            self.len_largest_element,
            self.key_expiry,
        );
        self.emit_record(
            "sortedset",
            Some(key),
            record.0,
            record.1,
            Some(record.2),
            Some(record.3),
            record.4,
        )?;
        self.end_key();

        Ok(())
    }

    fn start_stream(
        &mut self,
        key: &[u8],
        listpacks_count: u64,
        expiry: Expiry,
        info: EncodingType,
    ) -> RdbResult<()> {
        self.key_expiry = expiry;
        self.current_encoding = Some(info.name().to_string());
        self.current_size = self.top_level_object_overhead(key, expiry);
        self.current_size += self.pointer_size * 2 + 8 + 16; // stream struct
        self.current_size += self.pointer_size + 8 * 2; // rax struct
        self.listpacks_count = listpacks_count;

        Ok(())
    }

    fn stream_listpack(&mut self, _key: &[u8], _entry_id: &[u8], data: &[u8]) -> RdbResult<()> {
        let allocation = self.malloc_overhead(data.len() as u64);
        self.current_size += allocation;
        if data.len() as u64 > self.len_largest_element {
            self.len_largest_element = data.len() as u64;
        }

        Ok(())
    }

    fn end_stream(
        &mut self,
        key: &[u8],
        _items: u64,
        _last_entry_id: &str,
        cgroups: &[StreamGroup],
    ) -> RdbResult<()> {
        // listpack sizes are already in; estimate the radix tree and the
        // consumer group bookkeeping on top, like the MEMORY command does
        let mut size = self.current_size + self.sizeof_stream_radix_tree(self.listpacks_count);

        for group in cgroups {
            size += self.pointer_size * 2 + 16; // streamCG
            let pending = group.pending.len() as u64;
            size += self.sizeof_stream_radix_tree(pending);
            size += pending * (self.pointer_size + 8 + 8); // streamNACK
            for consumer in &group.consumers {
                size += self.pointer_size * 2 + 8; // streamConsumer
                size += self.sizeof_string(&consumer.name);
                size += self.sizeof_stream_radix_tree(consumer.pending.len() as u64);
            }
        }

        let record = (
            self.current_encoding.take(),
            self.len_largest_element,
            self.key_expiry,
        );
        self.emit_record(
            "stream",
            Some(key),
            size,
            record.0,
            Some(1),
            Some(record.1),
            record.2,
        )?;
        self.end_key();

        Ok(())
    }

    fn start_module(
        &mut self,
        key: Option<&[u8]>,
        module_name: &str,
        expiry: Expiry,
    ) -> RdbResult<()> {
        self.key_expiry = expiry;
        self.current_encoding = Some(module_name.to_string());
        self.current_size = match key {
            Some(key) => self.top_level_object_overhead(key, expiry),
            None => 0,
        };
        self.current_size += 8 + 1; // module id and EOF marker

        Ok(())
    }

    fn end_module(&mut self, key: Option<&[u8]>, buffer_size: u64) -> RdbResult<()> {
        let size = self.current_size + buffer_size;
        let record = (self.current_encoding.take(), self.key_expiry);
        self.emit_record("module", key, size, record.0, Some(1), Some(size), record.1)?;
        self.end_key();

        Ok(())
    }
}

fn next_power(size: u64) -> u64 {
    let mut power = 1;
    while power <= size {
        power <<= 1;
    }
    power
}

struct HeapEntry {
    bytes: u64,
    seq: u64,
    record: MemoryRecord,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes && self.seq == other.seq
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // reversed, so the BinaryHeap pops the smallest record first
        (other.bytes, other.seq).cmp(&(self.bytes, self.seq))
    }
}

/// Writes records as CSV, optionally dropping small keys or keeping only
/// the N largest (via a bounded heap flushed at `end_rdb`).
pub struct CsvReport {
    out: Box<dyn Write + 'static>,
    min_bytes: Option<u64>,
    largest: Option<usize>,
    heap: BinaryHeap<HeapEntry>,
    seq: u64,
    wrote_header: bool,
}

impl CsvReport {
    pub fn new() -> CsvReport {
        CsvReport::with_writer(Box::new(io::stdout()))
    }

    pub fn with_writer(out: Box<dyn Write + 'static>) -> CsvReport {
        CsvReport {
            out,
            min_bytes: None,
            largest: None,
            heap: BinaryHeap::new(),
            seq: 0,
            wrote_header: false,
        }
    }

    /// Only report keys of at least `bytes` estimated bytes.
    pub fn min_bytes(mut self, bytes: u64) -> CsvReport {
        self.min_bytes = Some(bytes);
        self
    }

    /// Only report the `n` largest keys, in ascending order.
    pub fn largest(mut self, n: usize) -> CsvReport {
        self.largest = Some(n);
        self
    }

    fn write_header(&mut self) -> RdbResult<()> {
        if !self.wrote_header {
            self.out.write_all(
                b"database,type,key,size_in_bytes,encoding,num_elements,len_largest_element,expiry\n",
            )?;
            self.wrote_header = true;
        }

        Ok(())
    }

    fn write_record(&mut self, record: &MemoryRecord) -> RdbResult<()> {
        let key = record.key.as_deref().unwrap_or("");
        let encoding = record.encoding.as_deref().unwrap_or("");
        let line = format!(
            "{},{},{},{},{},{},{},{}\n",
            record.database,
            record.data_type,
            csv_field(key),
            record.bytes,
            csv_field(encoding),
            record.size.map(|s| s.to_string()).unwrap_or_default(),
            record
                .len_largest_element
                .map(|s| s.to_string())
                .unwrap_or_default(),
            record
                .expiry
                .map(format_expiry)
                .unwrap_or_default(),
        );
        self.out.write_all(line.as_bytes())?;

        Ok(())
    }
}

impl Default for CsvReport {
    fn default() -> Self {
        CsvReport::new()
    }
}

fn format_expiry(expiry: DateTime<Utc>) -> String {
    expiry.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

fn csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

impl RecordSink for CsvReport {
    fn next_record(&mut self, record: MemoryRecord) -> RdbResult<()> {
        self.write_header()?;

        // dict records describe the database itself, not a key
        if record.key.is_none() {
            return Ok(());
        }

        match self.largest {
            None => {
                if self.min_bytes.map_or(true, |min| record.bytes >= min) {
                    self.write_record(&record)?;
                }
            }
            Some(n) => {
                self.heap.push(HeapEntry {
                    bytes: record.bytes,
                    seq: self.seq,
                    record,
                });
                self.seq += 1;
                if self.heap.len() > n {
                    self.heap.pop();
                }
            }
        }

        Ok(())
    }

    fn end_rdb(&mut self) -> RdbResult<()> {
        self.write_header()?;

        if self.largest.is_some() {
            let mut records: Vec<HeapEntry> = self.heap.drain().collect();
            // ascending by estimated size
            records.sort_by(|a, b| (a.bytes, a.seq).cmp(&(b.bytes, b.seq)));
            for entry in records {
                self.write_record(&entry.record)?;
            }
        }
        self.out.flush()?;

        Ok(())
    }
}

// size classes from jemalloc 4.0.4 using LG_QUANTUM=3
pub const JEMALLOC_SIZE_CLASSES: &[u64] = &[
    8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384, 448, 512,
    640, 768, 896, 1024, 1280, 1536, 1792, 2048, 2560, 3072, 3584, 4096, 5120, 6144, 7168,
    8192, 10240, 12288, 14336, 16384, 20480, 24576, 28672, 32768, 40960, 49152, 57344, 65536,
    81920, 98304, 114688, 131072, 163840, 196608, 229376, 262144, 327680, 393216, 458752,
    524288, 655360, 786432, 917504, 1048576, 1310720, 1572864, 1835008, 2097152, 2621440,
    3145728, 3670016, 4194304, 5242880, 6291456, 7340032, 8388608, 10485760, 12582912,
    14680064, 16777216, 20971520, 25165824, 29360128, 33554432, 41943040, 50331648, 58720256,
    67108864, 83886080, 100663296, 117440512, 134217728, 167772160, 201326592, 234881024,
    268435456, 335544320, 402653184, 469762048, 536870912, 671088640, 805306368, 939524096,
    1073741824, 1342177280, 1610612736, 1879048192, 2147483648, 2684354560, 3221225472,
    3758096384, 4294967296, 5368709120, 6442450944, 7516192768, 8589934592, 10737418240,
    12884901888, 15032385536, 17179869184, 21474836480, 25769803776, 30064771072, 34359738368,
    42949672960, 51539607552, 60129542144, 68719476736, 85899345920, 103079215104,
    120259084288, 137438953472, 171798691840, 206158430208, 240518168576, 274877906944,
    343597383680, 412316860416, 481036337152, 549755813888, 687194767360, 824633720832,
    962072674304, 1099511627776, 1374389534720, 1649267441664, 1924145348608, 2199023255552,
    2748779069440, 3298534883328, 3848290697216, 4398046511104, 5497558138880, 6597069766656,
    7696581394432, 8796093022208, 10995116277760, 13194139533312, 15393162788864,
    17592186044416, 21990232555520, 26388279066624, 30786325577728, 35184372088832,
    43980465111040, 52776558133248, 61572651155456, 70368744177664, 87960930222080,
    105553116266496, 123145302310912, 140737488355328, 175921860444160, 211106232532992,
    246290604621824, 281474976710656, 351843720888320, 422212465065984, 492581209243648,
    562949953421312, 703687441776640, 844424930131968, 985162418487296, 1125899906842624,
    1407374883553280, 1688849860263936, 1970324836974592, 2251799813685248, 2814749767106560,
    3377699720527872, 3940649673949184, 4503599627370496, 5629499534213120, 6755399441055744,
    7881299347898368, 9007199254740992, 11258999068426240, 13510798882111488,
    15762598695796736, 18014398509481984, 22517998136852480, 27021597764222976,
    31525197391593472, 36028797018963968, 45035996273704960, 54043195528445952,
    63050394783186944, 72057594037927936, 90071992547409920, 108086391056891904,
    126100789566373888, 144115188075855872, 180143985094819840, 216172782113783808,
    252201579132747776, 288230376151711744, 360287970189639680, 432345564227567616,
    504403158265495552, 576460752303423488, 720575940379279360, 864691128455135232,
    1008806316530991104, 1152921504606846976, 1441151880758558720, 1729382256910270464,
    2017612633061982208, 2305843009213693952, 2882303761517117440, 3458764513820540928,
    4035225266123964416, 4611686018427387904, 5764607523034234880, 6917529027641081856,
    8070450532247928832, 9223372036854775808, 11529215046068469760, 13835058055282163712,
    16140901064495857664,
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct Collect {
        records: Rc<RefCell<Vec<MemoryRecord>>>,
    }

    impl RecordSink for Collect {
        fn next_record(&mut self, record: MemoryRecord) -> RdbResult<()> {
            self.records.borrow_mut().push(record);
            Ok(())
        }
    }

    fn profiler(sink: Collect) -> MemoryProfiler<Collect> {
        MemoryProfiler::with_seed(sink, Architecture::Bits64, RedisVersion::new(5, 0), 7)
    }

    #[test]
    fn redis_versions_parse_and_order() {
        let version: RedisVersion = "3.2".parse().unwrap();
        assert_eq!(version, RedisVersion::new(3, 2));
        assert!(RedisVersion::new(2, 8) < version);
        assert!(version < RedisVersion::new(4, 0));
        assert!("nonsense".parse::<RedisVersion>().is_err());
        assert!("4".parse::<RedisVersion>().is_err());
    }

    #[test]
    fn jemalloc_rounds_up_to_the_next_class() {
        assert_eq!(jemalloc_allocation(7), 8);
        assert_eq!(jemalloc_allocation(8), 8);
        assert_eq!(jemalloc_allocation(9), 16);
        assert_eq!(jemalloc_allocation(65), 80);
        assert_eq!(jemalloc_allocation(161), 192);
        assert_eq!(jemalloc_allocation(8193), 10240);
    }

    #[test]
    fn next_power_is_strictly_greater() {
        assert_eq!(next_power(0), 1);
        assert_eq!(next_power(1), 2);
        assert_eq!(next_power(2), 4);
        assert_eq!(next_power(7), 8);
        assert_eq!(next_power(8), 16);
    }

    #[test]
    fn string_record_matches_hand_computed_overhead() {
        let sink = Collect::default();
        let records = sink.records.clone();
        let mut profiler = profiler(sink);

        profiler.start_database(0).unwrap();
        profiler.set(b"mykey", b"value", None).unwrap();

        let records = records.borrow();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        // dict entry (24) + sds key (8) + robj (16) + sds value (8)
        assert_eq!(record.bytes, 56);
        assert_eq!(record.data_type, "string");
        assert_eq!(record.size, Some(5));
        assert_eq!(record.len_largest_element, Some(5));
    }

    #[test]
    fn shared_integers_cost_nothing() {
        let sink = Collect::default();
        let records = sink.records.clone();
        let mut profiler = profiler(sink);

        profiler.start_database(0).unwrap();
        profiler.set(b"counter", b"123", None).unwrap();

        let records = records.borrow();
        // dict entry (24) + sds key (16: 7+1+1 rounded) + robj (16), value free
        assert_eq!(records[0].bytes, 56);
        assert_eq!(records[0].size, Some(8));
    }

    #[test]
    fn hashtable_hash_math() {
        let sink = Collect::default();
        let records = sink.records.clone();
        let mut profiler = profiler(sink);

        profiler.start_database(0).unwrap();
        profiler
            .start_hash(b"h", 1, None, EncodingType::Hashtable)
            .unwrap();
        profiler.hash_element(b"h", b"f", b"v").unwrap();
        profiler.end_hash(b"h").unwrap();

        let records = records.borrow();
        // top level: 24 + 8 + 16 = 48
        // hashtable(1): 4 + 56 + 32 + 2*8*1.5 = 116
        // element: 8 + 8 + 24 = 40
        assert_eq!(records[0].bytes, 48 + 116 + 40);
        assert_eq!(records[0].encoding.as_deref(), Some("hashtable"));
    }

    #[test]
    fn ziplist_encoded_values_count_their_raw_bytes() {
        let sink = Collect::default();
        let records = sink.records.clone();
        let mut profiler = profiler(sink);

        profiler.start_database(0).unwrap();
        profiler
            .start_hash(b"h", 2, None, EncodingType::Ziplist(100))
            .unwrap();
        profiler.hash_element(b"h", b"field", b"somevalue").unwrap();
        profiler.hash_element(b"h", b"f2", b"v2").unwrap();
        profiler.end_hash(b"h").unwrap();

        let records = records.borrow();
        // top level 48 + the raw ziplist bytes, elements add nothing
        assert_eq!(records[0].bytes, 48 + 100);
        assert_eq!(records[0].len_largest_element, Some(9));
    }

    #[test]
    fn ziplist_entry_overhead_branches() {
        let sink = Collect::default();
        let profiler = profiler(sink);

        assert_eq!(profiler.ziplist_entry_overhead(b"1"), 2);
        assert_eq!(profiler.ziplist_entry_overhead(b"-5"), 2);
        assert_eq!(profiler.ziplist_entry_overhead(b"300"), 4);
        assert_eq!(profiler.ziplist_entry_overhead(b"70000"), 5);
        assert_eq!(profiler.ziplist_entry_overhead(b"abc"), 5);
        assert_eq!(profiler.ziplist_entry_overhead(&vec![b'x'; 100]), 103);
        assert_eq!(profiler.ziplist_entry_overhead(&vec![b'x'; 300]), 307);
        assert_eq!(profiler.ziplist_entry_overhead(&vec![b'x'; 20000]), 20010);
    }

    #[test]
    fn small_list_predicted_as_single_quicklist_node() {
        let sink = Collect::default();
        let records = sink.records.clone();
        let mut profiler = profiler(sink);

        profiler.start_database(0).unwrap();
        profiler
            .start_list(b"l", 3, None, EncodingType::Ziplist(30))
            .unwrap();
        profiler.list_element(b"l", b"a").unwrap();
        profiler.list_element(b"l", b"b").unwrap();
        profiler.list_element(b"l", b"c").unwrap();
        profiler.end_list(b"l").unwrap();

        let records = records.borrow();
        // top level 48, quicklist head+node 32+48, ziplist header 11,
        // three 3-byte entries
        assert_eq!(records[0].bytes, 48 + 80 + 11 + 9);
        assert_eq!(records[0].encoding.as_deref(), Some("quicklist"));
        assert_eq!(records[0].size, Some(3));
    }

    #[test]
    fn pre32_list_flips_to_linkedlist_on_large_values() {
        let sink = Collect::default();
        let records = sink.records.clone();
        let mut profiler = MemoryProfiler::with_seed(
            sink,
            Architecture::Bits64,
            RedisVersion::new(2, 8),
            7,
        );

        profiler.start_database(0).unwrap();
        profiler
            .start_list(b"l", 1, None, EncodingType::LinkedList)
            .unwrap();
        profiler.list_element(b"l", &vec![b'x'; 100]).unwrap();
        profiler.end_list(b"l").unwrap();

        let records = records.borrow();
        assert_eq!(records[0].encoding.as_deref(), Some("linkedlist"));
    }

    #[test]
    fn skiplist_sampling_is_deterministic_under_a_seed() {
        let run = || {
            let sink = Collect::default();
            let records = sink.records.clone();
            let mut profiler = profiler(sink);
            profiler.start_database(0).unwrap();
            profiler
                .start_sorted_set(b"z", 3, None, EncodingType::Skiplist)
                .unwrap();
            for member in &[&b"one"[..], b"two", b"three"] {
                profiler.sorted_set_element(b"z", 1.0, *member).unwrap();
            }
            profiler.end_sorted_set(b"z").unwrap();
            let bytes = records.borrow()[0].bytes;
            bytes
        };

        let first = run();
        assert!(first > 0);
        assert_eq!(first, run());
    }

    #[test]
    fn skiplist_level_stays_in_bounds() {
        let sink = Collect::default();
        let mut profiler = profiler(sink);
        for _ in 0..1000 {
            let level = profiler.zset_random_level();
            assert!((1..=ZSKIPLIST_MAXLEVEL).contains(&level));
        }
    }

    #[test]
    fn dict_records_close_each_database() {
        let sink = Collect::default();
        let records = sink.records.clone();
        let mut profiler = profiler(sink);

        profiler.start_database(0).unwrap();
        profiler.set(b"a", b"1", None).unwrap();
        profiler
            .set(b"b", b"2", Some(crate::parser::expiry_from_millis(1_671_963_072_573)))
            .unwrap();
        profiler.end_database(0).unwrap();

        let records = records.borrow();
        assert_eq!(records.len(), 4);
        let dicts: Vec<_> = records.iter().filter(|r| r.data_type == "dict").collect();
        assert_eq!(dicts.len(), 2);
        // two keys in the keyspace, one of them volatile
        assert_eq!(dicts[0].bytes, profiler_hashtable(2));
        assert_eq!(dicts[1].bytes, profiler_hashtable(1));
    }

    fn profiler_hashtable(size: u64) -> u64 {
        4 + 7 * 8 + 4 * 8 + next_power(size) * 8 * 3 / 2
    }

    #[test]
    fn module_record_counts_id_eof_and_payload() {
        let sink = Collect::default();
        let records = sink.records.clone();
        let mut profiler = profiler(sink);

        profiler.start_database(0).unwrap();
        profiler
            .start_module(Some(&b"m"[..]), "graphmeta", None)
            .unwrap();
        profiler.end_module(Some(&b"m"[..]), 20).unwrap();

        let records = records.borrow();
        // top level 48 + id/eof 9 + payload 20
        assert_eq!(records[0].bytes, 48 + 9 + 20);
        assert_eq!(records[0].encoding.as_deref(), Some("graphmeta"));
    }

    #[test]
    fn stream_record_includes_radix_estimate() {
        let sink = Collect::default();
        let records = sink.records.clone();
        let mut profiler = profiler(sink);

        profiler.start_database(0).unwrap();
        profiler
            .start_stream(b"s", 1, None, EncodingType::Listpacks)
            .unwrap();
        profiler.stream_listpack(b"s", &[0; 16], &[0; 100]).unwrap();
        profiler.end_stream(b"s", 2, "1-1", &[]).unwrap();

        let records = records.borrow();
        // top level 48 + stream struct 32 + rax 24 + malloc(100)=112
        // + radix tree for one listpack: 16 + 2*4 + 2*240 = 504
        assert_eq!(records[0].bytes, 48 + 32 + 24 + 112 + 504);
        assert_eq!(records[0].data_type, "stream");
    }

    #[test]
    fn csv_quotes_fields_that_need_it() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("First,Second"), "\"First,Second\"");
        assert_eq!(
            csv_field("json:{\"key\": \"value\"}"),
            "\"json:{\"\"key\"\": \"\"value\"\"}\""
        );
    }
}
