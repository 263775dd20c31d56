use super::write_str;
use crate::formatter::Formatter;
use crate::types::{EncodingType, Expiry, RdbResult};
use std::io;
use std::io::Write;

/// Replays the dump as a RESP command stream that can be piped into
/// `redis-cli --pipe`.
pub struct Protocol {
    out: Box<dyn Write + 'static>,
    last_expiry: Expiry,
    emit_expire: bool,
    amend_expire: i64,
}

impl Protocol {
    pub fn new() -> Protocol {
        Protocol::with_writer(Box::new(io::stdout()))
    }

    pub fn with_writer(out: Box<dyn Write + 'static>) -> Protocol {
        Protocol {
            out,
            last_expiry: None,
            emit_expire: true,
            amend_expire: 0,
        }
    }

    /// Suppress `EXPIREAT` commands entirely.
    pub fn no_expire(mut self) -> Protocol {
        self.emit_expire = false;
        self
    }

    /// Shift every emitted expiration by `seconds`.
    pub fn amend_expire(mut self, seconds: i64) -> Protocol {
        self.amend_expire = seconds;
        self
    }

    fn emit(&mut self, args: &[&[u8]]) -> RdbResult<()> {
        write_str(&mut self.out, "*")?;
        self.out.write_all(args.len().to_string().as_bytes())?;
        write_str(&mut self.out, "\r\n")?;
        for arg in args {
            write_str(&mut self.out, "$")?;
            self.out.write_all(arg.len().to_string().as_bytes())?;
            write_str(&mut self.out, "\r\n")?;
            self.out.write_all(arg)?;
            write_str(&mut self.out, "\r\n")?;
        }

        Ok(())
    }

    fn pre_expire(&mut self, expiry: Expiry) {
        self.last_expiry = expiry;
    }

    fn post_expire(&mut self, key: &[u8]) -> RdbResult<()> {
        if let Some(expiry) = self.last_expiry.take() {
            if self.emit_expire {
                let at = (expiry.timestamp() + self.amend_expire).to_string();
                self.emit(&[b"EXPIREAT", key, at.as_bytes()])?;
            }
        }

        Ok(())
    }
}

impl Default for Protocol {
    fn default() -> Self {
        Protocol::new()
    }
}

impl Formatter for Protocol {
    fn end_rdb(&mut self) -> RdbResult<()> {
        self.out.flush()?;

        Ok(())
    }

    fn start_database(&mut self, db_index: u64) -> RdbResult<()> {
        let db = db_index.to_string();
        self.emit(&[b"SELECT", db.as_bytes()])?;

        Ok(())
    }

    fn set(&mut self, key: &[u8], value: &[u8], expiry: Expiry) -> RdbResult<()> {
        self.pre_expire(expiry);
        self.emit(&[b"SET", key, value])?;
        self.post_expire(key)?;

        Ok(())
    }

    fn start_hash(
        &mut self,
        _key: &[u8],
        _length: u64,
        expiry: Expiry,
        _info: EncodingType,
    ) -> RdbResult<()> {
        self.pre_expire(expiry);

        Ok(())
    }

    fn end_hash(&mut self, key: &[u8]) -> RdbResult<()> {
        self.post_expire(key)
    }

    fn hash_element(&mut self, key: &[u8], field: &[u8], value: &[u8]) -> RdbResult<()> {
        self.emit(&[b"HSET", key, field, value])
    }

    fn start_set(
        &mut self,
        _key: &[u8],
        _cardinality: u64,
        expiry: Expiry,
        _info: EncodingType,
    ) -> RdbResult<()> {
        self.pre_expire(expiry);

        Ok(())
    }

    fn end_set(&mut self, key: &[u8]) -> RdbResult<()> {
        self.post_expire(key)
    }

    fn set_element(&mut self, key: &[u8], member: &[u8]) -> RdbResult<()> {
        self.emit(&[b"SADD", key, member])
    }

    fn start_list(
        &mut self,
        _key: &[u8],
        _length: u64,
        expiry: Expiry,
        _info: EncodingType,
    ) -> RdbResult<()> {
        self.pre_expire(expiry);

        Ok(())
    }

    fn end_list(&mut self, key: &[u8]) -> RdbResult<()> {
        self.post_expire(key)
    }

    fn list_element(&mut self, key: &[u8], value: &[u8]) -> RdbResult<()> {
        self.emit(&[b"RPUSH", key, value])
    }

    fn start_sorted_set(
        &mut self,
        _key: &[u8],
        _length: u64,
        expiry: Expiry,
        _info: EncodingType,
    ) -> RdbResult<()> {
        self.pre_expire(expiry);

        Ok(())
    }

    fn end_sorted_set(&mut self, key: &[u8]) -> RdbResult<()> {
        self.post_expire(key)
    }

    fn sorted_set_element(&mut self, key: &[u8], score: f64, member: &[u8]) -> RdbResult<()> {
        let score = score.to_string();
        self.emit(&[b"ZADD", key, score.as_bytes(), member])
    }
}
