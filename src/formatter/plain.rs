use super::write_str;
use crate::escape::{escape_bytes, Escape};
use crate::formatter::Formatter;
use crate::types::{EncodingType, Expiry, RdbResult};
use std::io;
use std::io::Write;

/// One line per scalar observation, prefixed with the database index.
/// The output is stable under `sort`, which makes two dumps diffable.
pub struct Plain {
    out: Box<dyn Write + 'static>,
    escape: Escape,
    dbnum: u64,
    index: u64,
}

impl Plain {
    pub fn new() -> Plain {
        Plain::with_writer(Box::new(io::stdout()), Escape::Raw)
    }

    pub fn with_writer(out: Box<dyn Write + 'static>, escape: Escape) -> Plain {
        Plain {
            out,
            escape,
            dbnum: 0,
            index: 0,
        }
    }

    fn write_line_start(&mut self) -> RdbResult<()> {
        write_str(&mut self.out, &format!("db={} ", self.dbnum))?;

        Ok(())
    }

    fn write_escaped(&mut self, data: &[u8]) -> RdbResult<()> {
        let text = escape_bytes(data, self.escape);
        self.out.write_all(text.as_bytes())?;

        Ok(())
    }
}

impl Default for Plain {
    fn default() -> Self {
        Plain::new()
    }
}

impl Formatter for Plain {
    fn checksum(&mut self, checksum: &[u8]) -> RdbResult<()> {
        write_str(&mut self.out, "checksum ")?;
        write_str(&mut self.out, &hex::encode(checksum))?;
        write_str(&mut self.out, "\n")?;

        Ok(())
    }

    fn start_database(&mut self, db_index: u64) -> RdbResult<()> {
        self.dbnum = db_index;

        Ok(())
    }

    fn end_rdb(&mut self) -> RdbResult<()> {
        self.out.flush()?;

        Ok(())
    }

    fn aux_field(&mut self, key: &[u8], value: &[u8]) -> RdbResult<bool> {
        write_str(&mut self.out, "aux ")?;
        self.write_escaped(key)?;
        write_str(&mut self.out, " -> ")?;
        self.write_escaped(value)?;
        write_str(&mut self.out, "\n")?;

        Ok(false)
    }

    fn set(&mut self, key: &[u8], value: &[u8], _expiry: Expiry) -> RdbResult<()> {
        self.write_line_start()?;
        self.write_escaped(key)?;
        write_str(&mut self.out, " -> ")?;
        self.write_escaped(value)?;
        write_str(&mut self.out, "\n")?;

        Ok(())
    }

    fn hash_element(&mut self, key: &[u8], field: &[u8], value: &[u8]) -> RdbResult<()> {
        self.write_line_start()?;
        self.write_escaped(key)?;
        write_str(&mut self.out, " . ")?;
        self.write_escaped(field)?;
        write_str(&mut self.out, " -> ")?;
        self.write_escaped(value)?;
        write_str(&mut self.out, "\n")?;

        Ok(())
    }

    fn set_element(&mut self, key: &[u8], member: &[u8]) -> RdbResult<()> {
        self.write_line_start()?;
        self.write_escaped(key)?;
        write_str(&mut self.out, " { ")?;
        self.write_escaped(member)?;
        write_str(&mut self.out, " }\n")?;

        Ok(())
    }

    fn start_list(
        &mut self,
        _key: &[u8],
        _length: u64,
        _expiry: Expiry,
        _info: EncodingType,
    ) -> RdbResult<()> {
        self.index = 0;

        Ok(())
    }

    fn list_element(&mut self, key: &[u8], value: &[u8]) -> RdbResult<()> {
        self.write_line_start()?;
        self.write_escaped(key)?;
        write_str(&mut self.out, &format!("[{}]", self.index))?;
        write_str(&mut self.out, " -> ")?;
        self.write_escaped(value)?;
        write_str(&mut self.out, "\n")?;
        self.index += 1;

        Ok(())
    }

    fn start_sorted_set(
        &mut self,
        _key: &[u8],
        _length: u64,
        _expiry: Expiry,
        _info: EncodingType,
    ) -> RdbResult<()> {
        self.index = 0;

        Ok(())
    }

    fn sorted_set_element(&mut self, key: &[u8], score: f64, member: &[u8]) -> RdbResult<()> {
        self.write_line_start()?;
        self.write_escaped(key)?;
        write_str(&mut self.out, &format!("[{}]", self.index))?;
        write_str(&mut self.out, " -> {")?;
        self.write_escaped(member)?;
        write_str(&mut self.out, &format!(", score={}", score))?;
        write_str(&mut self.out, "}\n")?;
        self.index += 1;

        Ok(())
    }
}
