use regex::bytes::Regex;

use crate::types::Type;

/// Predicate consulted before a key's value is decoded. Rejected keys are
/// skipped without materializing their values.
pub trait Filter {
    fn matches_db(&self, _db: u64) -> bool {
        true
    }
    fn matches_type(&self, _enc_type: u8) -> bool {
        true
    }
    fn matches_key(&self, _key: &[u8]) -> bool {
        true
    }
}

#[derive(Copy, Clone)]
pub struct AllFilter;
impl Filter for AllFilter {}

/// Filter over database indices, logical types and key regexes, all
/// combined by AND. Empty dimensions admit everything.
pub struct StrictFilter {
    databases: Vec<u64>,
    types: Vec<Type>,
    keys: Option<Regex>,
    not_keys: Option<Regex>,
}

impl StrictFilter {
    pub fn new() -> StrictFilter {
        StrictFilter {
            databases: vec![],
            types: vec![],
            keys: None,
            not_keys: None,
        }
    }

    pub fn add_database(&mut self, db: u64) {
        self.databases.push(db);
    }

    pub fn add_type(&mut self, typ: Type) {
        self.types.push(typ);
    }

    pub fn add_keys(&mut self, re: Regex) {
        self.keys = Some(re);
    }

    pub fn add_not_keys(&mut self, re: Regex) {
        self.not_keys = Some(re);
    }
}

impl Default for StrictFilter {
    fn default() -> Self {
        StrictFilter::new()
    }
}

impl Filter for StrictFilter {
    fn matches_db(&self, db: u64) -> bool {
        self.databases.is_empty() || self.databases.contains(&db)
    }

    fn matches_type(&self, enc_type: u8) -> bool {
        if self.types.is_empty() {
            return true;
        }

        // Unknown tags are admitted so the decode path can report them.
        match Type::from_encoding(enc_type) {
            Some(typ) => self.types.contains(&typ),
            None => true,
        }
    }

    fn matches_key(&self, key: &[u8]) -> bool {
        if let Some(re) = &self.keys {
            if !re.is_match(key) {
                return false;
            }
        }
        if let Some(re) = &self.not_keys {
            if re.is_match(key) {
                return false;
            }
        }
        true
    }
}
