use super::write_str;
use crate::escape::{escape_bytes, Escape};
use crate::formatter::Formatter;
use crate::types::{EncodingType, Expiry, RdbResult};
use std::io;
use std::io::Write;

/// Prints every admitted key, one per line.
pub struct JustKeys {
    out: Box<dyn Write + 'static>,
    escape: Escape,
}

impl JustKeys {
    pub fn new() -> JustKeys {
        JustKeys::with_writer(Box::new(io::stdout()), Escape::Raw)
    }

    pub fn with_writer(out: Box<dyn Write + 'static>, escape: Escape) -> JustKeys {
        JustKeys { out, escape }
    }

    fn write_key(&mut self, key: &[u8]) -> RdbResult<()> {
        let text = escape_bytes(key, self.escape);
        self.out.write_all(text.as_bytes())?;
        write_str(&mut self.out, "\n")?;

        Ok(())
    }
}

impl Default for JustKeys {
    fn default() -> Self {
        JustKeys::new()
    }
}

impl Formatter for JustKeys {
    fn end_rdb(&mut self) -> RdbResult<()> {
        self.out.flush()?;

        Ok(())
    }

    fn set(&mut self, key: &[u8], _value: &[u8], _expiry: Expiry) -> RdbResult<()> {
        self.write_key(key)
    }

    fn start_hash(
        &mut self,
        key: &[u8],
        _length: u64,
        _expiry: Expiry,
        _info: EncodingType,
    ) -> RdbResult<()> {
        self.write_key(key)
    }

    fn start_set(
        &mut self,
        key: &[u8],
        _cardinality: u64,
        _expiry: Expiry,
        _info: EncodingType,
    ) -> RdbResult<()> {
        self.write_key(key)
    }

    fn start_list(
        &mut self,
        key: &[u8],
        _length: u64,
        _expiry: Expiry,
        _info: EncodingType,
    ) -> RdbResult<()> {
        self.write_key(key)
    }

    fn start_sorted_set(
        &mut self,
        key: &[u8],
        _length: u64,
        _expiry: Expiry,
        _info: EncodingType,
    ) -> RdbResult<()> {
        self.write_key(key)
    }

    fn start_stream(
        &mut self,
        key: &[u8],
        _listpacks_count: u64,
        _expiry: Expiry,
        _info: EncodingType,
    ) -> RdbResult<()> {
        self.write_key(key)
    }

    fn start_module(
        &mut self,
        key: Option<&[u8]>,
        _module_name: &str,
        _expiry: Expiry,
    ) -> RdbResult<()> {
        if let Some(key) = key {
            self.write_key(key)?;
        }

        Ok(())
    }
}

/// Prints keys together with their scalar contents, without the database
/// prefix of the diff output.
pub struct JustKeyVals {
    out: Box<dyn Write + 'static>,
    escape: Escape,
}

impl JustKeyVals {
    pub fn new() -> JustKeyVals {
        JustKeyVals::with_writer(Box::new(io::stdout()), Escape::Raw)
    }

    pub fn with_writer(out: Box<dyn Write + 'static>, escape: Escape) -> JustKeyVals {
        JustKeyVals { out, escape }
    }

    fn write_escaped(&mut self, data: &[u8]) -> RdbResult<()> {
        let text = escape_bytes(data, self.escape);
        self.out.write_all(text.as_bytes())?;

        Ok(())
    }
}

impl Default for JustKeyVals {
    fn default() -> Self {
        JustKeyVals::new()
    }
}

impl Formatter for JustKeyVals {
    fn end_rdb(&mut self) -> RdbResult<()> {
        self.out.flush()?;

        Ok(())
    }

    fn set(&mut self, key: &[u8], value: &[u8], _expiry: Expiry) -> RdbResult<()> {
        self.write_escaped(key)?;
        write_str(&mut self.out, " -> ")?;
        self.write_escaped(value)?;
        write_str(&mut self.out, "\n")
    }

    fn hash_element(&mut self, key: &[u8], field: &[u8], value: &[u8]) -> RdbResult<()> {
        self.write_escaped(key)?;
        write_str(&mut self.out, " . ")?;
        self.write_escaped(field)?;
        write_str(&mut self.out, " -> ")?;
        self.write_escaped(value)?;
        write_str(&mut self.out, "\n")
    }

    fn set_element(&mut self, key: &[u8], member: &[u8]) -> RdbResult<()> {
        self.write_escaped(key)?;
        write_str(&mut self.out, " { ")?;
        self.write_escaped(member)?;
        write_str(&mut self.out, " }\n")
    }

    fn list_element(&mut self, key: &[u8], value: &[u8]) -> RdbResult<()> {
        self.write_escaped(key)?;
        write_str(&mut self.out, " -> ")?;
        self.write_escaped(value)?;
        write_str(&mut self.out, "\n")
    }

    fn sorted_set_element(&mut self, key: &[u8], score: f64, member: &[u8]) -> RdbResult<()> {
        self.write_escaped(key)?;
        write_str(&mut self.out, " -> {")?;
        self.write_escaped(member)?;
        write_str(&mut self.out, &format!(", score={}}}\n", score))
    }
}
