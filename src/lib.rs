//! rdbscope - Parse, filter and analyze Redis RDB snapshot files
//!
//! An RDB file is a binary, point-in-time representation of the in-memory
//! data of Redis, sufficient to completely restore its state.
//!
//! This library decodes an RDB byte stream in a single forward pass and
//! drives an event sink with already-parsed values. Sinks reformat the
//! data as JSON or RESP, list keys, diff dumps, or estimate the RAM the
//! dataset would occupy in a running server.
//!
//! # Basic operation
//!
//! The one important entry point is `parse`. It reads the RDB from any
//! `Read`, decodes the contained data and calls the provided formatter
//! with each decoded event:
//!
//! ```rust,no_run
//! use std::fs::File;
//! use std::io::BufReader;
//!
//! let file = File::open("dump.rdb").unwrap();
//! let reader = BufReader::new(file);
//! rdbscope::parse(reader, rdbscope::formatter::JSON::new(), rdbscope::AllFilter).unwrap();
//! ```
//!
//! # Formatters
//!
//! * `Plain`: one line per scalar observation, diffable with `sort`
//! * `JSON`: JSON-encoded output
//! * `Nil`: suppresses all output
//! * `Protocol`: [RESP](https://redis.io/topics/protocol) command stream
//! * `JustKeys` / `JustKeyVals`: key listings
//! * `MemoryProfiler`: per-key memory estimation records
//!
//! Formatters implement the `Formatter` trait, which has one method per
//! datatype or opcode. A filter decides, before a value is decoded,
//! whether the key is wanted at all; rejected keys are skipped without
//! allocating their values.
//!
//! # Command line
//!
//! The accompanying `rdbscope` binary formats a dump file in any of the
//! formats above:
//!
//! ```shell,no_compile
//! $ rdbscope --command json dump.rdb
//! [{"key":"value"}]
//! $ rdbscope --command memory --largest 10 dump.rdb
//! database,type,key,size_in_bytes,encoding,num_elements,len_largest_element,expiry
//! ...
//! ```

pub use crate::filter::{AllFilter, Filter, StrictFilter};
pub use crate::formatter::Formatter;
pub use crate::parser::RdbParser;
pub use crate::types::{
    EncodingType, Expiry, ModuleValue, RdbError, RdbOk, RdbResult, StreamConsumer, StreamGroup,
    StreamPendingEntry, Type, ZiplistEntry,
};

pub mod constants;
pub mod escape;
pub mod filter;
pub mod formatter;
pub mod helper;
pub mod memory;
pub mod parser;
pub mod reader;
pub mod types;

use std::io::Read;

/// Parse an RDB stream, feeding every decoded event into `formatter`.
/// Keys rejected by `filter` are skipped without materializing values.
pub fn parse<R: Read, F: Formatter, L: Filter>(input: R, formatter: F, filter: L) -> RdbOk {
    let mut parser = RdbParser::new(input, formatter, filter);
    parser.parse()
}
