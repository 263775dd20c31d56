use crate::formatter::Formatter;

/// Sink that suppresses all output. Useful to validate a dump or to
/// benchmark the parser alone.
pub struct Nil;

impl Nil {
    pub fn new() -> Nil {
        Nil
    }
}

impl Default for Nil {
    fn default() -> Self {
        Nil::new()
    }
}

impl Formatter for Nil {}
