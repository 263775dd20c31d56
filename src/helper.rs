use crate::types::RdbResult;
use std::io::Read;

pub fn int_to_vec(number: i64) -> Vec<u8> {
    number.to_string().into_bytes()
}

pub fn read_exact<T: Read>(reader: &mut T, len: usize) -> RdbResult<Vec<u8>> {
    let mut buf = vec![0; len];
    reader.read_exact(&mut buf)?;

    Ok(buf)
}
