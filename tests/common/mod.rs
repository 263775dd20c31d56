#![allow(dead_code)]

use std::cell::RefCell;
use std::convert::TryFrom;
use std::io::{self, Write};
use std::rc::Rc;

use rdbscope::constants::MODULE_NAME_CHARSET;
use rdbscope::types::{EncodingType, Expiry, ModuleValue, RdbResult, StreamGroup};
use rdbscope::Formatter;

/// Length-encode `n` the way RDB does.
pub fn enc_len(n: u64) -> Vec<u8> {
    if n < 64 {
        vec![n as u8]
    } else if n < 16384 {
        vec![0x40 | (n >> 8) as u8, n as u8]
    } else if n <= u32::MAX as u64 {
        let mut out = vec![0x80];
        out.extend_from_slice(&(n as u32).to_be_bytes());
        out
    } else {
        let mut out = vec![0x81];
        out.extend_from_slice(&n.to_be_bytes());
        out
    }
}

pub fn enc_string(data: &[u8]) -> Vec<u8> {
    let mut out = enc_len(data.len() as u64);
    out.extend_from_slice(data);
    out
}

pub fn enc_int8(value: i8) -> Vec<u8> {
    vec![0xC0, value as u8]
}

pub fn enc_int16(value: i16) -> Vec<u8> {
    let mut out = vec![0xC1];
    out.extend_from_slice(&value.to_le_bytes());
    out
}

pub fn enc_int32(value: i32) -> Vec<u8> {
    let mut out = vec![0xC2];
    out.extend_from_slice(&value.to_le_bytes());
    out
}

pub fn enc_lzf(data: &[u8]) -> Vec<u8> {
    let compressed = lzf::compress(data).expect("fixture data must be compressible");
    let mut out = vec![0xC3];
    out.extend_from_slice(&enc_len(compressed.len() as u64));
    out.extend_from_slice(&enc_len(data.len() as u64));
    out.extend_from_slice(&compressed);
    out
}

/// Assembles RDB byte images for fixtures.
pub struct RdbBuilder {
    bytes: Vec<u8>,
}

impl RdbBuilder {
    pub fn new(version: &str) -> RdbBuilder {
        assert_eq!(version.len(), 4);
        let mut bytes = b"REDIS".to_vec();
        bytes.extend_from_slice(version.as_bytes());
        RdbBuilder { bytes }
    }

    pub fn raw(mut self, data: &[u8]) -> Self {
        self.bytes.extend_from_slice(data);
        self
    }

    pub fn select_db(mut self, db: u64) -> Self {
        self.bytes.push(0xFE);
        self.bytes.extend_from_slice(&enc_len(db));
        self
    }

    pub fn aux(mut self, key: &[u8], value: &[u8]) -> Self {
        self.bytes.push(0xFA);
        self.bytes.extend_from_slice(&enc_string(key));
        self.bytes.extend_from_slice(&enc_string(value));
        self
    }

    pub fn resizedb(mut self, keys: u64, expires: u64) -> Self {
        self.bytes.push(0xFB);
        self.bytes.extend_from_slice(&enc_len(keys));
        self.bytes.extend_from_slice(&enc_len(expires));
        self
    }

    pub fn expiry_ms(mut self, millis: u64) -> Self {
        self.bytes.push(0xFC);
        self.bytes.extend_from_slice(&millis.to_le_bytes());
        self
    }

    pub fn expiry_seconds(mut self, seconds: u32) -> Self {
        self.bytes.push(0xFD);
        self.bytes.extend_from_slice(&seconds.to_le_bytes());
        self
    }

    pub fn idle(mut self, idle: u64) -> Self {
        self.bytes.push(0xF9);
        self.bytes.extend_from_slice(&enc_len(idle));
        self
    }

    pub fn freq(mut self, freq: u8) -> Self {
        self.bytes.push(0xF8);
        self.bytes.push(freq);
        self
    }

    /// A string key with a pre-encoded key blob (for integer-encoded keys).
    pub fn string_key_raw(mut self, key: &[u8], value: &[u8]) -> Self {
        self.bytes.push(0x00);
        self.bytes.extend_from_slice(key);
        self.bytes.extend_from_slice(value);
        self
    }

    pub fn string_key(self, key: &[u8], value: &[u8]) -> Self {
        let (key, value) = (enc_string(key), enc_string(value));
        self.string_key_raw(&key, &value)
    }

    /// A value of arbitrary type: tag byte, plain key, raw payload bytes.
    pub fn key(mut self, tag: u8, key: &[u8], payload: &[u8]) -> Self {
        self.bytes.push(tag);
        self.bytes.extend_from_slice(&enc_string(key));
        self.bytes.extend_from_slice(payload);
        self
    }

    /// EOF without a checksum trailer (version < 5 files).
    pub fn eof(mut self) -> Vec<u8> {
        self.bytes.push(0xFF);
        self.bytes
    }

    /// EOF plus a valid CRC64 trailer.
    pub fn eof_with_crc(mut self) -> Vec<u8> {
        self.bytes.push(0xFF);
        let crc = crc64::crc64(0, &self.bytes);
        self.bytes.extend_from_slice(&crc.to_le_bytes());
        self.bytes
    }

    /// EOF plus an all-zero trailer (checksums disabled by the producer).
    pub fn eof_zero_crc(mut self) -> Vec<u8> {
        self.bytes.push(0xFF);
        self.bytes.extend_from_slice(&[0; 8]);
        self.bytes
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ZlEntry {
    Str(Vec<u8>),
    Int(i64),
}

impl ZlEntry {
    pub fn str(data: &[u8]) -> ZlEntry {
        ZlEntry::Str(data.to_vec())
    }
}

fn ziplist_entry_bytes(prev_len: usize, entry: &ZlEntry) -> Vec<u8> {
    let mut out = Vec::new();
    if prev_len < 254 {
        out.push(prev_len as u8);
    } else {
        out.push(0xFE);
        out.extend_from_slice(&(prev_len as u32).to_le_bytes());
    }

    match entry {
        ZlEntry::Int(n) => {
            let n = *n;
            if (0..=12).contains(&n) {
                out.push(0xF1 + n as u8);
            } else if i8::try_from(n).is_ok() {
                out.push(0xFE);
                out.push(n as i8 as u8);
            } else if i16::try_from(n).is_ok() {
                out.push(0xC0);
                out.extend_from_slice(&(n as i16).to_le_bytes());
            } else if (-(1 << 23)..(1 << 23)).contains(&n) {
                out.push(0xF0);
                out.extend_from_slice(&(n as i32).to_le_bytes()[..3]);
            } else if i32::try_from(n).is_ok() {
                out.push(0xD0);
                out.extend_from_slice(&(n as i32).to_le_bytes());
            } else {
                out.push(0xE0);
                out.extend_from_slice(&n.to_le_bytes());
            }
        }
        ZlEntry::Str(data) => {
            let len = data.len();
            if len <= 63 {
                out.push(len as u8);
            } else if len <= 16383 {
                out.push(0x40 | (len >> 8) as u8);
                out.push(len as u8);
            } else {
                out.push(0x80);
                out.extend_from_slice(&(len as u32).to_be_bytes());
            }
            out.extend_from_slice(data);
        }
    }

    out
}

/// Assemble a complete ziplist blob with a correct byte count, tail
/// offset and terminator.
pub fn build_ziplist(entries: &[ZlEntry]) -> Vec<u8> {
    let mut body = Vec::new();
    let mut prev_len = 0;
    let mut last_offset = 0;

    for entry in entries {
        let encoded = ziplist_entry_bytes(prev_len, entry);
        last_offset = 10 + body.len();
        prev_len = encoded.len();
        body.extend_from_slice(&encoded);
    }

    let zlbytes = (10 + body.len() + 1) as u32;
    let zltail = if entries.is_empty() {
        10
    } else {
        last_offset as u32
    };

    let mut out = Vec::new();
    out.extend_from_slice(&zlbytes.to_le_bytes());
    out.extend_from_slice(&zltail.to_le_bytes());
    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    out.extend_from_slice(&body);
    out.push(0xFF);
    out
}

pub fn build_intset(width: u32, values: &[i64]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&width.to_le_bytes());
    out.extend_from_slice(&(values.len() as u32).to_le_bytes());
    for &value in values {
        match width {
            2 => out.extend_from_slice(&(value as i16).to_le_bytes()),
            4 => out.extend_from_slice(&(value as i32).to_le_bytes()),
            8 => out.extend_from_slice(&value.to_le_bytes()),
            _ => panic!("unsupported intset width {}", width),
        }
    }
    out
}

pub fn build_zipmap(pairs: &[(&[u8], &[u8])], free: u8) -> Vec<u8> {
    let mut out = vec![pairs.len() as u8];
    for (field, value) in pairs {
        assert!(field.len() < 253 && value.len() < 253);
        out.push(field.len() as u8);
        out.extend_from_slice(field);
        out.push(value.len() as u8);
        out.push(free);
        out.extend_from_slice(value);
        out.extend(std::iter::repeat(0).take(free as usize));
    }
    out.push(0xFF);
    out
}

/// Pack a nine-character module name plus format version into a module id.
pub fn module_id(name: &str, version: u64) -> u64 {
    assert_eq!(name.len(), 9);
    let mut id = 0u64;
    for (i, byte) in name.bytes().enumerate() {
        let index = MODULE_NAME_CHARSET
            .iter()
            .position(|&c| c == byte)
            .expect("character outside the module alphabet") as u64;
        id |= index << (10 + (8 - i) * 6);
    }
    id | (version & 1023)
}

/// An in-memory `Write` that can be observed after the formatter that
/// owns it is gone.
#[derive(Clone, Default)]
pub struct SharedBuf(pub Rc<RefCell<Vec<u8>>>);

impl SharedBuf {
    pub fn new() -> SharedBuf {
        SharedBuf::default()
    }

    pub fn contents(&self) -> Vec<u8> {
        self.0.borrow().clone()
    }

    pub fn string(&self) -> String {
        String::from_utf8(self.contents()).unwrap()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Every event the parser can emit, captured for assertions.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    StartRdb,
    EndRdb,
    Checksum(Vec<u8>),
    StartDatabase(u64),
    EndDatabase(u64),
    ResizeDb(u64, u64),
    Aux(Vec<u8>, Vec<u8>),
    Set(Vec<u8>, Vec<u8>, Expiry),
    StartHash(Vec<u8>, u64, EncodingType),
    Hset(Vec<u8>, Vec<u8>, Vec<u8>),
    EndHash(Vec<u8>),
    StartSet(Vec<u8>, u64, EncodingType),
    Sadd(Vec<u8>, Vec<u8>),
    EndSet(Vec<u8>),
    StartList(Vec<u8>, u64, EncodingType),
    Rpush(Vec<u8>, Vec<u8>),
    EndList(Vec<u8>),
    StartSortedSet(Vec<u8>, u64, EncodingType, Expiry),
    Zadd(Vec<u8>, f64, Vec<u8>),
    EndSortedSet(Vec<u8>),
    StartStream(Vec<u8>, u64),
    StreamListpack(Vec<u8>, Vec<u8>, Vec<u8>),
    EndStream(Vec<u8>, u64, String, Vec<StreamGroup>),
    StartModule(Option<Vec<u8>>, String),
    ModuleData(ModuleValue),
    EndModule(u64),
}

/// Formatter recording every event it sees.
#[derive(Clone, Default)]
pub struct Recorder {
    pub events: Rc<RefCell<Vec<Event>>>,
    pub stop_on_aux: bool,
}

impl Recorder {
    pub fn new() -> Recorder {
        Recorder::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    fn push(&mut self, event: Event) {
        self.events.borrow_mut().push(event);
    }
}

impl Formatter for Recorder {
    fn start_rdb(&mut self) -> RdbResult<()> {
        self.push(Event::StartRdb);
        Ok(())
    }
    fn end_rdb(&mut self) -> RdbResult<()> {
        self.push(Event::EndRdb);
        Ok(())
    }
    fn checksum(&mut self, checksum: &[u8]) -> RdbResult<()> {
        self.push(Event::Checksum(checksum.to_vec()));
        Ok(())
    }
    fn start_database(&mut self, db_index: u64) -> RdbResult<()> {
        self.push(Event::StartDatabase(db_index));
        Ok(())
    }
    fn end_database(&mut self, db_index: u64) -> RdbResult<()> {
        self.push(Event::EndDatabase(db_index));
        Ok(())
    }
    fn resizedb(&mut self, db_size: u64, expires_size: u64) -> RdbResult<()> {
        self.push(Event::ResizeDb(db_size, expires_size));
        Ok(())
    }
    fn aux_field(&mut self, key: &[u8], value: &[u8]) -> RdbResult<bool> {
        self.push(Event::Aux(key.to_vec(), value.to_vec()));
        Ok(self.stop_on_aux)
    }
    fn set(&mut self, key: &[u8], value: &[u8], expiry: Expiry) -> RdbResult<()> {
        self.push(Event::Set(key.to_vec(), value.to_vec(), expiry));
        Ok(())
    }
    fn start_hash(
        &mut self,
        key: &[u8],
        length: u64,
        _expiry: Expiry,
        info: EncodingType,
    ) -> RdbResult<()> {
        self.push(Event::StartHash(key.to_vec(), length, info));
        Ok(())
    }
    fn end_hash(&mut self, key: &[u8]) -> RdbResult<()> {
        self.push(Event::EndHash(key.to_vec()));
        Ok(())
    }
    fn hash_element(&mut self, key: &[u8], field: &[u8], value: &[u8]) -> RdbResult<()> {
        self.push(Event::Hset(key.to_vec(), field.to_vec(), value.to_vec()));
        Ok(())
    }
    fn start_set(
        &mut self,
        key: &[u8],
        cardinality: u64,
        _expiry: Expiry,
        info: EncodingType,
    ) -> RdbResult<()> {
        self.push(Event::StartSet(key.to_vec(), cardinality, info));
        Ok(())
    }
    fn end_set(&mut self, key: &[u8]) -> RdbResult<()> {
        self.push(Event::EndSet(key.to_vec()));
        Ok(())
    }
    fn set_element(&mut self, key: &[u8], member: &[u8]) -> RdbResult<()> {
        self.push(Event::Sadd(key.to_vec(), member.to_vec()));
        Ok(())
    }
    fn start_list(
        &mut self,
        key: &[u8],
        length: u64,
        _expiry: Expiry,
        info: EncodingType,
    ) -> RdbResult<()> {
        self.push(Event::StartList(key.to_vec(), length, info));
        Ok(())
    }
    fn end_list(&mut self, key: &[u8]) -> RdbResult<()> {
        self.push(Event::EndList(key.to_vec()));
        Ok(())
    }
    fn list_element(&mut self, key: &[u8], value: &[u8]) -> RdbResult<()> {
        self.push(Event::Rpush(key.to_vec(), value.to_vec()));
        Ok(())
    }
    fn start_sorted_set(
        &mut self,
        key: &[u8],
        length: u64,
        expiry: Expiry,
        info: EncodingType,
    ) -> RdbResult<()> {
        self.push(Event::StartSortedSet(key.to_vec(), length, info, expiry));
        Ok(())
    }
    fn end_sorted_set(&mut self, key: &[u8]) -> RdbResult<()> {
        self.push(Event::EndSortedSet(key.to_vec()));
        Ok(())
    }
    fn sorted_set_element(&mut self, key: &[u8], score: f64, member: &[u8]) -> RdbResult<()> {
        self.push(Event::Zadd(key.to_vec(), score, member.to_vec()));
        Ok(())
    }
    fn start_stream(
        &mut self,
        key: &[u8],
        listpacks_count: u64,
        _expiry: Expiry,
        _info: EncodingType,
    ) -> RdbResult<()> {
        self.push(Event::StartStream(key.to_vec(), listpacks_count));
        Ok(())
    }
    fn stream_listpack(&mut self, key: &[u8], entry_id: &[u8], data: &[u8]) -> RdbResult<()> {
        self.push(Event::StreamListpack(
            key.to_vec(),
            entry_id.to_vec(),
            data.to_vec(),
        ));
        Ok(())
    }
    fn end_stream(
        &mut self,
        key: &[u8],
        items: u64,
        last_entry_id: &str,
        cgroups: &[StreamGroup],
    ) -> RdbResult<()> {
        self.push(Event::EndStream(
            key.to_vec(),
            items,
            last_entry_id.to_string(),
            cgroups.to_vec(),
        ));
        Ok(())
    }
    fn start_module(
        &mut self,
        key: Option<&[u8]>,
        module_name: &str,
        _expiry: Expiry,
    ) -> RdbResult<()> {
        self.push(Event::StartModule(
            key.map(|k| k.to_vec()),
            module_name.to_string(),
        ));
        Ok(())
    }
    fn module_data(&mut self, _key: Option<&[u8]>, value: &ModuleValue) -> RdbResult<()> {
        self.push(Event::ModuleData(value.clone()));
        Ok(())
    }
    fn end_module(&mut self, _key: Option<&[u8]>, buffer_size: u64) -> RdbResult<()> {
        self.push(Event::EndModule(buffer_size));
        Ok(())
    }
}
