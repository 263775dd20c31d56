use std::io::Write;

pub use self::json::JSON;
pub use self::keys::{JustKeyVals, JustKeys};
pub use self::nil::Nil;
pub use self::plain::Plain;
pub use self::protocol::Protocol;

use crate::types::{EncodingType, Expiry, ModuleValue, RdbResult, StreamGroup};

pub mod json;
pub mod keys;
pub mod nil;
pub mod plain;
pub mod protocol;

pub fn write_str<W: Write>(out: &mut W, data: &str) -> RdbResult<()> {
    out.write_all(data.as_bytes())?;

    Ok(())
}

/// The event sink driven by the parser.
///
/// Every method has a no-op default so a sink only implements the events
/// it cares about. Key and value arguments are passed through unchanged;
/// escaping is the sink's own business.
#[allow(unused_variables)]
pub trait Formatter {
    fn start_rdb(&mut self) -> RdbResult<()> {
        Ok(())
    }
    fn end_rdb(&mut self) -> RdbResult<()> {
        Ok(())
    }
    fn checksum(&mut self, checksum: &[u8]) -> RdbResult<()> {
        Ok(())
    }

    fn start_database(&mut self, db_index: u64) -> RdbResult<()> {
        Ok(())
    }
    fn end_database(&mut self, db_index: u64) -> RdbResult<()> {
        Ok(())
    }

    fn resizedb(&mut self, db_size: u64, expires_size: u64) -> RdbResult<()> {
        Ok(())
    }

    /// Out-of-band metadata describing the producing server. Returning
    /// `Ok(true)` asks the parser to stop early.
    fn aux_field(&mut self, key: &[u8], value: &[u8]) -> RdbResult<bool> {
        Ok(false)
    }

    fn set(&mut self, key: &[u8], value: &[u8], expiry: Expiry) -> RdbResult<()> {
        Ok(())
    }

    fn start_hash(
        &mut self,
        key: &[u8],
        length: u64,
        expiry: Expiry,
        info: EncodingType,
    ) -> RdbResult<()> {
        Ok(())
    }
    fn end_hash(&mut self, key: &[u8]) -> RdbResult<()> {
        Ok(())
    }
    fn hash_element(&mut self, key: &[u8], field: &[u8], value: &[u8]) -> RdbResult<()> {
        Ok(())
    }

    fn start_set(
        &mut self,
        key: &[u8],
        cardinality: u64,
        expiry: Expiry,
        info: EncodingType,
    ) -> RdbResult<()> {
        Ok(())
    }
    fn end_set(&mut self, key: &[u8]) -> RdbResult<()> {
        Ok(())
    }
    fn set_element(&mut self, key: &[u8], member: &[u8]) -> RdbResult<()> {
        Ok(())
    }

    fn start_list(
        &mut self,
        key: &[u8],
        length: u64,
        expiry: Expiry,
        info: EncodingType,
    ) -> RdbResult<()> {
        Ok(())
    }
    fn end_list(&mut self, key: &[u8]) -> RdbResult<()> {
        Ok(())
    }
    fn list_element(&mut self, key: &[u8], value: &[u8]) -> RdbResult<()> {
        Ok(())
    }

    fn start_sorted_set(
        &mut self,
        key: &[u8],
        length: u64,
        expiry: Expiry,
        info: EncodingType,
    ) -> RdbResult<()> {
        Ok(())
    }
    fn end_sorted_set(&mut self, key: &[u8]) -> RdbResult<()> {
        Ok(())
    }
    fn sorted_set_element(&mut self, key: &[u8], score: f64, member: &[u8]) -> RdbResult<()> {
        Ok(())
    }

    fn start_stream(
        &mut self,
        key: &[u8],
        listpacks_count: u64,
        expiry: Expiry,
        info: EncodingType,
    ) -> RdbResult<()> {
        Ok(())
    }
    /// One raw listpack of stream entries. `entry_id` is the 16-byte
    /// big-endian master id, `data` the undecoded listpack payload.
    fn stream_listpack(&mut self, key: &[u8], entry_id: &[u8], data: &[u8]) -> RdbResult<()> {
        Ok(())
    }
    fn end_stream(
        &mut self,
        key: &[u8],
        items: u64,
        last_entry_id: &str,
        cgroups: &[StreamGroup],
    ) -> RdbResult<()> {
        Ok(())
    }

    /// `key` is `None` for module auxiliary blocks.
    fn start_module(
        &mut self,
        key: Option<&[u8]>,
        module_name: &str,
        expiry: Expiry,
    ) -> RdbResult<()> {
        Ok(())
    }
    fn module_data(&mut self, key: Option<&[u8]>, value: &ModuleValue) -> RdbResult<()> {
        Ok(())
    }
    /// `buffer_size` is the byte count of the module payload between the
    /// module id and the EOF marker.
    fn end_module(&mut self, key: Option<&[u8]>, buffer_size: u64) -> RdbResult<()> {
        Ok(())
    }
}
