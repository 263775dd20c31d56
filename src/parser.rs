use std::io::{Cursor, Read};
use std::str;

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use chrono::{DateTime, LocalResult, TimeZone, Utc};
use log::{debug, trace};

use crate::constants::{
    constant, encoding, encoding_type, module_opcode, op_code, version, MODULE_NAME_CHARSET,
};
use crate::filter::Filter;
use crate::formatter::Formatter;
use crate::helper::{self, read_exact};
use crate::reader::TrackedRead;
use crate::types::{
    EncodingType, Expiry, ModuleValue, RdbError, RdbOk, RdbResult, StreamConsumer, StreamGroup,
    StreamPendingEntry, Type, ZiplistEntry,
};

/// The RDB state machine. Pulls bytes from `input`, drives `formatter`
/// with decoded events, consults `filter` before decoding each key.
pub struct RdbParser<R: Read, F: Formatter, L: Filter> {
    input: TrackedRead<R>,
    formatter: F,
    filter: L,
    last_expiry: Expiry,
    last_idle: Option<u64>,
    last_freq: Option<u8>,
    rdb_version: u32,
}

/// Convert a millisecond timestamp into a UTC instant, clamping values
/// that chrono cannot represent instead of overflowing.
pub fn expiry_from_millis(millis: u64) -> DateTime<Utc> {
    let millis = if millis > i64::MAX as u64 {
        i64::MAX
    } else {
        millis as i64
    };
    match Utc.timestamp_millis_opt(millis) {
        LocalResult::Single(instant) => instant,
        _ => DateTime::<Utc>::MAX_UTC,
    }
}

/// Unpack the nine-character module name from the high 54 bits of a
/// module id.
pub fn module_name_from_id(module_id: u64) -> String {
    let mut name = String::with_capacity(9);
    for position in 0..9 {
        let shift = 10 + (8 - position) * 6;
        let index = ((module_id >> shift) & 63) as usize;
        name.push(MODULE_NAME_CHARSET[index] as char);
    }
    name
}

pub fn read_length_with_encoding<R: Read>(input: &mut R) -> RdbResult<(u64, bool)> {
    let enc_byte = input.read_u8()?;

    match (enc_byte & 0xC0) >> 6 {
        constant::RDB_ENCVAL => Ok(((enc_byte & 0x3F) as u64, true)),
        constant::RDB_6BITLEN => Ok(((enc_byte & 0x3F) as u64, false)),
        constant::RDB_14BITLEN => {
            let next_byte = input.read_u8()?;
            Ok(((((enc_byte & 0x3F) as u64) << 8) | next_byte as u64, false))
        }
        _ => match enc_byte {
            constant::RDB_32BITLEN => Ok((input.read_u32::<BigEndian>()? as u64, false)),
            constant::RDB_64BITLEN => Ok((input.read_u64::<BigEndian>()?, false)),
            _ => Err(RdbError::BadLengthEncoding(enc_byte)),
        },
    }
}

pub fn read_length<R: Read>(input: &mut R) -> RdbResult<u64> {
    let (length, _) = read_length_with_encoding(input)?;
    Ok(length)
}

pub fn verify_magic<R: Read>(input: &mut R) -> RdbOk {
    let mut magic = [0; 5];
    input.read_exact(&mut magic)?;

    if magic == constant::RDB_MAGIC.as_bytes() {
        Ok(())
    } else {
        Err(RdbError::BadMagic)
    }
}

pub fn verify_version<R: Read>(input: &mut R) -> RdbResult<u32> {
    let mut version_bytes = [0; 4];
    input.read_exact(&mut version_bytes)?;

    let version = str::from_utf8(&version_bytes)
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .ok_or(RdbError::BadVersion(0))?;

    if (version::SUPPORTED_MINIMUM..=version::SUPPORTED_MAXIMUM).contains(&version) {
        Ok(version)
    } else {
        Err(RdbError::BadVersion(version))
    }
}

/// Read one RDB string. Integer encodings come back as their decimal
/// ASCII form, LZF runs are decompressed to exactly their stored length.
pub fn read_blob<R: Read>(input: &mut R) -> RdbResult<Vec<u8>> {
    let (length, is_encoded) = read_length_with_encoding(input)?;

    if is_encoded {
        match length {
            encoding::INT8 => Ok(helper::int_to_vec(input.read_i8()? as i64)),
            encoding::INT16 => Ok(helper::int_to_vec(input.read_i16::<LittleEndian>()? as i64)),
            encoding::INT32 => Ok(helper::int_to_vec(input.read_i32::<LittleEndian>()? as i64)),
            encoding::LZF => {
                let compressed_length = read_length(input)?;
                let real_length = read_length(input)? as usize;
                let data = read_exact(input, compressed_length as usize)?;
                let unpacked = lzf::decompress(&data, real_length)
                    .map_err(|e| RdbError::LzfDecompress(format!("{:?}", e)))?;
                if unpacked.len() != real_length {
                    return Err(RdbError::LzfLengthMismatch {
                        expected: real_length,
                        actual: unpacked.len(),
                    });
                }
                Ok(unpacked)
            }
            _ => Err(RdbError::BadStringEncoding(length)),
        }
    } else {
        read_exact(input, length as usize)
    }
}

fn read_ziplist_metadata<T: Read>(input: &mut T) -> RdbResult<(u32, u32, u16)> {
    let zlbytes = input.read_u32::<LittleEndian>()?;
    let zltail = input.read_u32::<LittleEndian>()?;
    let zllen = input.read_u16::<LittleEndian>()?;

    Ok((zlbytes, zltail, zllen))
}

fn read_ziplist_entry<T: Read>(ziplist: &mut T) -> RdbResult<ZiplistEntry> {
    // 1 or 5 bytes length of previous entry
    if ziplist.read_u8()? == 254 {
        let mut prev_length = [0; 4];
        ziplist.read_exact(&mut prev_length)?;
    }

    let length: u64;

    let flag = ziplist.read_u8()?;
    match (flag & 0xC0) >> 6 {
        0 => length = (flag & 0x3F) as u64,
        1 => {
            let next_byte = ziplist.read_u8()?;
            length = (((flag & 0x3F) as u64) << 8) | next_byte as u64;
        }
        2 => {
            if flag != 0x80 {
                return Err(RdbError::BadZiplistEntryHeader(flag));
            }
            length = ziplist.read_u32::<BigEndian>()? as u64;
        }
        _ => {
            let number = match (flag & 0xF0) >> 4 {
                0xC => ziplist.read_i16::<LittleEndian>()? as i64,
                0xD => ziplist.read_i32::<LittleEndian>()? as i64,
                0xE => ziplist.read_i64::<LittleEndian>()?,
                _ => match flag {
                    0xF0 => ziplist.read_i24::<LittleEndian>()? as i64,
                    0xFE => ziplist.read_i8()? as i64,
                    0xFF => return Err(RdbError::BadZiplistEntryHeader(flag)),
                    _ => (flag & 0x0F) as i64 - 1,
                },
            };

            return Ok(ZiplistEntry::Number(number));
        }
    }

    let rawval = read_exact(ziplist, length as usize)?;
    Ok(ZiplistEntry::String(rawval))
}

fn read_ziplist_entry_string<T: Read>(ziplist: &mut T) -> RdbResult<Vec<u8>> {
    match read_ziplist_entry(ziplist)? {
        ZiplistEntry::String(val) => Ok(val),
        ZiplistEntry::Number(val) => Ok(val.to_string().into_bytes()),
    }
}

fn read_zipmap_entry<T: Read>(next_byte: u8, zipmap: &mut T) -> RdbResult<Vec<u8>> {
    let elem_len = match next_byte {
        253 => zipmap.read_u32::<LittleEndian>()? as usize,
        254 | 255 => return Err(RdbError::BadZipmapLength(next_byte)),
        _ => next_byte as usize,
    };

    read_exact(zipmap, elem_len)
}

fn read_ascii_score<R: Read>(input: &mut R) -> RdbResult<f64> {
    let score_length = input.read_u8()?;
    match score_length {
        253 => Ok(f64::NAN),
        254 => Ok(f64::INFINITY),
        255 => Ok(f64::NEG_INFINITY),
        _ => {
            let raw = read_exact(input, score_length as usize)?;
            str::from_utf8(&raw)
                .ok()
                .and_then(|s| s.parse::<f64>().ok())
                .ok_or(RdbError::BadScoreValue)
        }
    }
}

impl<R: Read, F: Formatter, L: Filter> RdbParser<R, F, L> {
    pub fn new(input: R, formatter: F, filter: L) -> RdbParser<R, F, L> {
        RdbParser {
            input: TrackedRead::new(input),
            formatter,
            filter,
            last_expiry: None,
            last_idle: None,
            last_freq: None,
            rdb_version: 0,
        }
    }

    /// Total number of bytes consumed from the input so far.
    pub fn bytes_read(&self) -> u64 {
        self.input.position()
    }

    pub fn parse(&mut self) -> RdbOk {
        match self.parse_body() {
            Ok(()) => Ok(()),
            Err(err) => {
                let position = self.input.position();
                Err(err.at(position, None))
            }
        }
    }

    fn parse_body(&mut self) -> RdbOk {
        verify_magic(&mut self.input)?;
        self.rdb_version = verify_version(&mut self.input)?;
        debug!("rdb version {}", self.rdb_version);

        self.formatter.start_rdb()?;

        let mut last_database: u64 = 0;
        let mut is_first_database = true;

        loop {
            let next_op = self.input.read_u8()?;

            match next_op {
                op_code::SELECTDB => {
                    if !is_first_database {
                        self.formatter.end_database(last_database)?;
                    }
                    is_first_database = false;
                    last_database = read_length(&mut self.input)?;
                    if self.filter.matches_db(last_database) {
                        self.formatter.start_database(last_database)?;
                    }
                    self.clear_hints();
                }
                op_code::EOF => {
                    if !is_first_database {
                        self.formatter.end_database(last_database)?;
                    }
                    self.formatter.end_rdb()?;

                    if self.rdb_version >= 5 {
                        let computed = self.input.crc();
                        let mut trailer = [0; 8];
                        self.input.read_exact(&mut trailer)?;
                        let stored = u64::from_le_bytes(trailer);
                        // an all-zero trailer means checksums were disabled
                        // by the producer
                        if stored != 0 && stored != computed {
                            return Err(RdbError::BadChecksum { computed, stored });
                        }
                        self.formatter.checksum(&trailer)?;
                    }
                    break;
                }
                op_code::EXPIRETIME_MS => {
                    let expiretime_ms = self.input.read_u64::<LittleEndian>()?;
                    self.last_expiry = Some(expiry_from_millis(expiretime_ms));
                }
                op_code::EXPIRETIME => {
                    let expiretime = self.input.read_u32::<LittleEndian>()?;
                    self.last_expiry = Some(expiry_from_millis(expiretime as u64 * 1000));
                }
                op_code::FREQ => {
                    self.last_freq = Some(self.input.read_u8()?);
                }
                op_code::IDLE => {
                    self.last_idle = Some(read_length(&mut self.input)?);
                }
                op_code::RESIZEDB => {
                    let db_size = read_length(&mut self.input)?;
                    let expires_size = read_length(&mut self.input)?;

                    self.formatter.resizedb(db_size, expires_size)?;
                }
                op_code::AUX => {
                    let auxkey = read_blob(&mut self.input)?;
                    let auxval = read_blob(&mut self.input)?;

                    if self.formatter.aux_field(&auxkey, &auxval)? {
                        debug!("sink requested early termination");
                        return Ok(());
                    }
                }
                op_code::MODULE_AUX => {
                    self.read_module(None, encoding_type::MODULE_2)?;
                    self.clear_hints();
                }
                _ => {
                    if self.filter.matches_db(last_database) {
                        let key = read_blob(&mut self.input)?;

                        if let (Some(idle), Some(freq)) = (self.last_idle, self.last_freq) {
                            trace!("eviction hints: idle={} freq={}", idle, freq);
                        }

                        let admitted =
                            self.filter.matches_type(next_op) && self.filter.matches_key(&key);
                        let result = if admitted {
                            self.read_type(&key, next_op)
                        } else {
                            self.skip_object(next_op)
                        };

                        if let Err(err) = result {
                            let position = self.input.position();
                            return Err(err.at(position, Some(&key)));
                        }
                    } else {
                        self.skip_key_and_object(next_op)?;
                    }

                    self.clear_hints();
                }
            }
        }

        Ok(())
    }

    fn clear_hints(&mut self) {
        self.last_expiry = None;
        self.last_idle = None;
        self.last_freq = None;
    }

    fn read_type(&mut self, key: &[u8], value_type: u8) -> RdbOk {
        match value_type {
            encoding_type::STRING => {
                let val = read_blob(&mut self.input)?;
                self.formatter.set(key, &val, self.last_expiry)?;
            }
            encoding_type::LIST => self.read_linked_list(key, Type::List)?,
            encoding_type::SET => self.read_linked_list(key, Type::Set)?,
            encoding_type::ZSET => self.read_sorted_set(key)?,
            encoding_type::ZSET_2 => self.read_sorted_set_binary(key)?,
            encoding_type::HASH => self.read_hash(key)?,
            encoding_type::HASH_ZIPMAP => self.read_hash_zipmap(key)?,
            encoding_type::LIST_ZIPLIST => self.read_list_ziplist(key)?,
            encoding_type::SET_INTSET => self.read_set_intset(key)?,
            encoding_type::ZSET_ZIPLIST => self.read_sortedset_ziplist(key)?,
            encoding_type::HASH_ZIPLIST => self.read_hash_ziplist(key)?,
            encoding_type::LIST_QUICKLIST => self.read_quicklist(key)?,
            encoding_type::STREAM_LISTPACKS => self.read_stream_listpacks(key)?,
            encoding_type::MODULE | encoding_type::MODULE_2 => {
                self.read_module(Some(key), value_type)?
            }
            _ => return Err(RdbError::UnsupportedValueType(value_type)),
        }

        Ok(())
    }

    fn read_linked_list(&mut self, key: &[u8], typ: Type) -> RdbOk {
        let mut len = read_length(&mut self.input)?;

        match typ {
            Type::List => {
                self.formatter
                    .start_list(key, len, self.last_expiry, EncodingType::LinkedList)?;
            }
            _ => {
                self.formatter
                    .start_set(key, len, self.last_expiry, EncodingType::Hashtable)?;
            }
        }

        while len > 0 {
            let blob = read_blob(&mut self.input)?;
            match typ {
                Type::List => self.formatter.list_element(key, &blob)?,
                _ => self.formatter.set_element(key, &blob)?,
            }
            len -= 1;
        }

        match typ {
            Type::List => self.formatter.end_list(key)?,
            _ => self.formatter.end_set(key)?,
        }

        Ok(())
    }

    fn read_sorted_set(&mut self, key: &[u8]) -> RdbOk {
        let mut set_items = read_length(&mut self.input)?;

        self.formatter
            .start_sorted_set(key, set_items, self.last_expiry, EncodingType::Skiplist)?;

        while set_items > 0 {
            let val = read_blob(&mut self.input)?;
            let score = read_ascii_score(&mut self.input)?;

            self.formatter.sorted_set_element(key, score, &val)?;

            set_items -= 1;
        }

        self.formatter.end_sorted_set(key)?;

        Ok(())
    }

    fn read_sorted_set_binary(&mut self, key: &[u8]) -> RdbOk {
        let mut set_items = read_length(&mut self.input)?;

        self.formatter
            .start_sorted_set(key, set_items, self.last_expiry, EncodingType::Skiplist)?;

        while set_items > 0 {
            let val = read_blob(&mut self.input)?;
            let score = self.input.read_f64::<LittleEndian>()?;

            self.formatter.sorted_set_element(key, score, &val)?;

            set_items -= 1;
        }

        self.formatter.end_sorted_set(key)?;

        Ok(())
    }

    fn read_hash(&mut self, key: &[u8]) -> RdbOk {
        let mut hash_items = read_length(&mut self.input)?;

        self.formatter
            .start_hash(key, hash_items, self.last_expiry, EncodingType::Hashtable)?;

        while hash_items > 0 {
            let field = read_blob(&mut self.input)?;
            let val = read_blob(&mut self.input)?;

            self.formatter.hash_element(key, &field, &val)?;

            hash_items -= 1;
        }

        self.formatter.end_hash(key)?;

        Ok(())
    }

    fn read_list_ziplist(&mut self, key: &[u8]) -> RdbOk {
        let ziplist = read_blob(&mut self.input)?;
        let raw_length = ziplist.len() as u64;

        let mut reader = Cursor::new(ziplist);
        let (zlbytes, _zltail, zllen) = read_ziplist_metadata(&mut reader)?;
        if zlbytes as u64 != raw_length {
            return Err(RdbError::BadZiplistHeader);
        }

        self.formatter.start_list(
            key,
            zllen as u64,
            self.last_expiry,
            EncodingType::Ziplist(raw_length),
        )?;

        for _ in 0..zllen {
            let entry = read_ziplist_entry_string(&mut reader)?;
            self.formatter.list_element(key, &entry)?;
        }

        let last_byte = reader.read_u8()?;
        if last_byte != 0xFF {
            return Err(RdbError::BadZiplistTerminator(last_byte));
        }

        self.formatter.end_list(key)?;

        Ok(())
    }

    fn read_hash_ziplist(&mut self, key: &[u8]) -> RdbOk {
        let ziplist = read_blob(&mut self.input)?;
        let raw_length = ziplist.len() as u64;

        let mut reader = Cursor::new(ziplist);
        let (zlbytes, _zltail, zllen) = read_ziplist_metadata(&mut reader)?;
        if zlbytes as u64 != raw_length {
            return Err(RdbError::BadZiplistHeader);
        }
        if zllen % 2 != 0 {
            return Err(RdbError::OddZiplistPairCount(zllen));
        }

        let pairs = zllen / 2;

        self.formatter.start_hash(
            key,
            pairs as u64,
            self.last_expiry,
            EncodingType::Ziplist(raw_length),
        )?;

        for _ in 0..pairs {
            let field = read_ziplist_entry_string(&mut reader)?;
            let value = read_ziplist_entry_string(&mut reader)?;
            self.formatter.hash_element(key, &field, &value)?;
        }

        let last_byte = reader.read_u8()?;
        if last_byte != 0xFF {
            return Err(RdbError::BadZiplistTerminator(last_byte));
        }

        self.formatter.end_hash(key)?;

        Ok(())
    }

    fn read_sortedset_ziplist(&mut self, key: &[u8]) -> RdbOk {
        let ziplist = read_blob(&mut self.input)?;
        let raw_length = ziplist.len() as u64;

        let mut reader = Cursor::new(ziplist);
        let (zlbytes, _zltail, zllen) = read_ziplist_metadata(&mut reader)?;
        if zlbytes as u64 != raw_length {
            return Err(RdbError::BadZiplistHeader);
        }
        if zllen % 2 != 0 {
            return Err(RdbError::OddZiplistPairCount(zllen));
        }

        let pairs = zllen / 2;

        self.formatter.start_sorted_set(
            key,
            pairs as u64,
            self.last_expiry,
            EncodingType::Ziplist(raw_length),
        )?;

        for _ in 0..pairs {
            let member = read_ziplist_entry_string(&mut reader)?;
            let score = match read_ziplist_entry(&mut reader)? {
                ZiplistEntry::Number(n) => n as f64,
                ZiplistEntry::String(raw) => str::from_utf8(&raw)
                    .ok()
                    .and_then(|s| s.parse::<f64>().ok())
                    .ok_or(RdbError::BadScoreValue)?,
            };
            self.formatter.sorted_set_element(key, score, &member)?;
        }

        let last_byte = reader.read_u8()?;
        if last_byte != 0xFF {
            return Err(RdbError::BadZiplistTerminator(last_byte));
        }

        self.formatter.end_sorted_set(key)?;

        Ok(())
    }

    fn read_quicklist(&mut self, key: &[u8]) -> RdbOk {
        let len = read_length(&mut self.input)?;

        self.formatter
            .start_list(key, 0, self.last_expiry, EncodingType::Quicklist)?;

        for _ in 0..len {
            self.read_quicklist_ziplist(key)?;
        }

        self.formatter.end_list(key)?;

        Ok(())
    }

    fn read_quicklist_ziplist(&mut self, key: &[u8]) -> RdbOk {
        let ziplist = read_blob(&mut self.input)?;
        let raw_length = ziplist.len() as u64;

        let mut reader = Cursor::new(ziplist);
        let (zlbytes, _zltail, zllen) = read_ziplist_metadata(&mut reader)?;
        if zlbytes as u64 != raw_length {
            return Err(RdbError::BadZiplistHeader);
        }

        for _ in 0..zllen {
            let entry = read_ziplist_entry_string(&mut reader)?;
            self.formatter.list_element(key, &entry)?;
        }

        let last_byte = reader.read_u8()?;
        if last_byte != 0xFF {
            return Err(RdbError::BadZiplistTerminator(last_byte));
        }

        Ok(())
    }

    fn read_hash_zipmap(&mut self, key: &[u8]) -> RdbOk {
        let zipmap = read_blob(&mut self.input)?;
        let raw_length = zipmap.len() as u64;

        let mut reader = Cursor::new(zipmap);
        let zmlen = reader.read_u8()?;

        self.formatter.start_hash(
            key,
            zmlen as u64,
            self.last_expiry,
            EncodingType::Zipmap(raw_length),
        )?;

        loop {
            let next_byte = reader.read_u8()?;
            if next_byte == 0xFF {
                break;
            }

            let field = read_zipmap_entry(next_byte, &mut reader)?;

            let next_byte = reader.read_u8()?;
            let free = reader.read_u8()?;
            let value = read_zipmap_entry(next_byte, &mut reader)?;

            // trailing free bytes are unused padding
            read_exact(&mut reader, free as usize)?;

            self.formatter.hash_element(key, &field, &value)?;
        }

        self.formatter.end_hash(key)?;

        Ok(())
    }

    fn read_set_intset(&mut self, key: &[u8]) -> RdbOk {
        let intset = read_blob(&mut self.input)?;
        let raw_length = intset.len() as u64;

        let mut reader = Cursor::new(intset);
        let byte_size = reader.read_u32::<LittleEndian>()?;
        let intset_length = reader.read_u32::<LittleEndian>()?;

        self.formatter.start_set(
            key,
            intset_length as u64,
            self.last_expiry,
            EncodingType::Intset(raw_length),
        )?;

        for _ in 0..intset_length {
            let val = match byte_size {
                2 => reader.read_i16::<LittleEndian>()? as i64,
                4 => reader.read_i32::<LittleEndian>()? as i64,
                8 => reader.read_i64::<LittleEndian>()?,
                _ => return Err(RdbError::BadIntsetEncoding(byte_size)),
            };

            self.formatter.set_element(key, val.to_string().as_bytes())?;
        }

        self.formatter.end_set(key)?;

        Ok(())
    }

    fn read_stream_listpacks(&mut self, key: &[u8]) -> RdbOk {
        let listpacks_count = read_length(&mut self.input)?;

        self.formatter.start_stream(
            key,
            listpacks_count,
            self.last_expiry,
            EncodingType::Listpacks,
        )?;

        for _ in 0..listpacks_count {
            let entry_id = read_blob(&mut self.input)?;
            if entry_id.len() != 16 {
                return Err(RdbError::BadStreamBlock("listpack entry id is not 16 bytes"));
            }
            let data = read_blob(&mut self.input)?;
            self.formatter.stream_listpack(key, &entry_id, &data)?;
        }

        let items = read_length(&mut self.input)?;
        let last_ms = read_length(&mut self.input)?;
        let last_seq = read_length(&mut self.input)?;
        let last_entry_id = format!("{}-{}", last_ms, last_seq);

        let cgroups_count = read_length(&mut self.input)?;
        let mut cgroups = Vec::new();
        for _ in 0..cgroups_count {
            let name = read_blob(&mut self.input)?;
            let last_entry_ms = read_length(&mut self.input)?;
            let last_entry_seq = read_length(&mut self.input)?;

            let pending_count = read_length(&mut self.input)?;
            let mut pending = Vec::new();
            for _ in 0..pending_count {
                let mut id = [0; 16];
                self.input.read_exact(&mut id)?;
                let delivery_time = self.input.read_u64::<LittleEndian>()?;
                let delivery_count = read_length(&mut self.input)?;
                pending.push(StreamPendingEntry {
                    id,
                    delivery_time,
                    delivery_count,
                });
            }

            let consumers_count = read_length(&mut self.input)?;
            let mut consumers = Vec::new();
            for _ in 0..consumers_count {
                let name = read_blob(&mut self.input)?;
                let seen_time = self.input.read_u64::<LittleEndian>()?;

                let consumer_pending = read_length(&mut self.input)?;
                let mut ids = Vec::new();
                for _ in 0..consumer_pending {
                    let mut id = [0; 16];
                    self.input.read_exact(&mut id)?;
                    ids.push(id);
                }

                consumers.push(StreamConsumer {
                    name,
                    seen_time,
                    pending: ids,
                });
            }

            cgroups.push(StreamGroup {
                name,
                last_entry_ms,
                last_entry_seq,
                pending,
                consumers,
            });
        }

        self.formatter
            .end_stream(key, items, &last_entry_id, &cgroups)?;

        Ok(())
    }

    fn read_module(&mut self, key: Option<&[u8]>, value_type: u8) -> RdbOk {
        let module_id = read_length(&mut self.input)?;
        let module_name = module_name_from_id(module_id);

        if value_type == encoding_type::MODULE {
            return Err(RdbError::ModuleV1Unsupported(module_name));
        }

        debug!(
            "module block '{}' (format version {})",
            module_name,
            module_id & 1023
        );

        self.formatter
            .start_module(key, &module_name, self.last_expiry)?;

        let payload_start = self.input.position();
        loop {
            let opcode = read_length(&mut self.input)?;
            match opcode {
                module_opcode::EOF => break,
                module_opcode::SINT => {
                    let value = read_length(&mut self.input)? as i64;
                    self.formatter.module_data(key, &ModuleValue::SInt(value))?;
                }
                module_opcode::UINT => {
                    let value = read_length(&mut self.input)?;
                    self.formatter.module_data(key, &ModuleValue::UInt(value))?;
                }
                module_opcode::FLOAT => {
                    let value = self.input.read_f32::<LittleEndian>()?;
                    self.formatter
                        .module_data(key, &ModuleValue::Float(value))?;
                }
                module_opcode::DOUBLE => {
                    let value = self.input.read_f64::<LittleEndian>()?;
                    self.formatter
                        .module_data(key, &ModuleValue::Double(value))?;
                }
                module_opcode::STRING => {
                    let value = read_blob(&mut self.input)?;
                    self.formatter
                        .module_data(key, &ModuleValue::String(value))?;
                }
                other => return Err(RdbError::BadModuleOpcode(other)),
            }
        }

        // the EOF marker is a single byte and not part of the payload
        let buffer_size = self.input.position() - payload_start - 1;
        self.formatter.end_module(key, buffer_size)?;

        Ok(())
    }

    fn skip(&mut self, skip_bytes: u64) -> RdbOk {
        let mut buf = vec![0; skip_bytes as usize];
        self.input.read_exact(&mut buf)?;

        Ok(())
    }

    fn skip_blob(&mut self) -> RdbOk {
        let (len, is_encoded) = read_length_with_encoding(&mut self.input)?;

        let skip_bytes = if is_encoded {
            match len {
                encoding::INT8 => 1,
                encoding::INT16 => 2,
                encoding::INT32 => 4,
                encoding::LZF => {
                    let compressed_length = read_length(&mut self.input)?;
                    let _real_length = read_length(&mut self.input)?;
                    compressed_length
                }
                _ => return Err(RdbError::BadStringEncoding(len)),
            }
        } else {
            len
        };

        self.skip(skip_bytes)
    }

    /// Advance the cursor past one value of the given type, consuming
    /// byte-for-byte the same input as the corresponding read path.
    fn skip_object(&mut self, enc_type: u8) -> RdbOk {
        let blobs_to_skip = match enc_type {
            encoding_type::STRING
            | encoding_type::HASH_ZIPMAP
            | encoding_type::LIST_ZIPLIST
            | encoding_type::SET_INTSET
            | encoding_type::ZSET_ZIPLIST
            | encoding_type::HASH_ZIPLIST => 1,
            encoding_type::LIST | encoding_type::SET | encoding_type::LIST_QUICKLIST => {
                read_length(&mut self.input)?
            }
            encoding_type::HASH => read_length(&mut self.input)? * 2,
            encoding_type::ZSET => {
                let length = read_length(&mut self.input)?;
                for _ in 0..length {
                    self.skip_blob()?;
                    let score_length = self.input.read_u8()?;
                    if score_length < 253 {
                        self.skip(score_length as u64)?;
                    }
                }
                0
            }
            encoding_type::ZSET_2 => {
                let length = read_length(&mut self.input)?;
                for _ in 0..length {
                    self.skip_blob()?;
                    self.skip(8)?;
                }
                0
            }
            encoding_type::STREAM_LISTPACKS => {
                self.skip_stream()?;
                0
            }
            encoding_type::MODULE_2 => {
                self.skip_module()?;
                0
            }
            encoding_type::MODULE => {
                let module_id = read_length(&mut self.input)?;
                return Err(RdbError::ModuleV1Unsupported(module_name_from_id(module_id)));
            }
            _ => return Err(RdbError::UnsupportedValueType(enc_type)),
        };

        for _ in 0..blobs_to_skip {
            self.skip_blob()?;
        }

        Ok(())
    }

    fn skip_stream(&mut self) -> RdbOk {
        let listpacks_count = read_length(&mut self.input)?;
        for _ in 0..listpacks_count {
            self.skip_blob()?;
            self.skip_blob()?;
        }

        // items, last entry ms and seq
        read_length(&mut self.input)?;
        read_length(&mut self.input)?;
        read_length(&mut self.input)?;

        let cgroups_count = read_length(&mut self.input)?;
        for _ in 0..cgroups_count {
            self.skip_blob()?;
            read_length(&mut self.input)?;
            read_length(&mut self.input)?;

            let pending_count = read_length(&mut self.input)?;
            for _ in 0..pending_count {
                self.skip(16 + 8)?;
                read_length(&mut self.input)?;
            }

            let consumers_count = read_length(&mut self.input)?;
            for _ in 0..consumers_count {
                self.skip_blob()?;
                self.skip(8)?;

                let consumer_pending = read_length(&mut self.input)?;
                for _ in 0..consumer_pending {
                    self.skip(16)?;
                }
            }
        }

        Ok(())
    }

    fn skip_module(&mut self) -> RdbOk {
        read_length(&mut self.input)?;

        loop {
            let opcode = read_length(&mut self.input)?;
            match opcode {
                module_opcode::EOF => break,
                module_opcode::SINT | module_opcode::UINT => {
                    read_length(&mut self.input)?;
                }
                module_opcode::FLOAT => self.skip(4)?,
                module_opcode::DOUBLE => self.skip(8)?,
                module_opcode::STRING => self.skip_blob()?,
                other => return Err(RdbError::BadModuleOpcode(other)),
            }
        }

        Ok(())
    }

    fn skip_key_and_object(&mut self, enc_type: u8) -> RdbOk {
        self.skip_blob()?;
        self.skip_object(enc_type)?;

        Ok(())
    }
}
