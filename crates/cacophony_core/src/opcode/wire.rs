/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Primitive encodings used inside a single opcode payload (all big-endian).
//!
//! Strings are a 4-byte length followed by UTF-8 bytes, with a length of -1
//! meaning "absent". CIDs and public keys travel as strings.

use super::OpcodeError;
use cacophony_protocol::{Cid, PublicKey};

#[derive(Default)]
pub struct OpcodeSerializer {
    buf: Vec<u8>,
}

impl OpcodeSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buf.push(u8::from(value));
    }

    pub fn write_int(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_long(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_size(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_string(&mut self, value: Option<&str>) {
        match value {
            Some(s) => {
                let bytes = s.as_bytes();
                let len = i32::try_from(bytes.len()).expect("opcode string larger than 2 GiB");
                self.write_int(len);
                self.buf.extend_from_slice(bytes);
            }
            None => self.write_int(-1),
        }
    }

    pub fn write_cid(&mut self, value: &Cid) {
        self.write_string(Some(value.as_str()));
    }

    pub fn write_optional_cid(&mut self, value: Option<&Cid>) {
        self.write_string(value.map(Cid::as_str));
    }

    pub fn write_key(&mut self, value: &PublicKey) {
        self.write_string(Some(value.as_str()));
    }
}

pub struct OpcodeDeserializer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> OpcodeDeserializer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], OpcodeError> {
        if self.remaining() < n {
            return Err(OpcodeError::Malformed(format!(
                "needed {n} bytes at offset {} but only {} remain",
                self.pos,
                self.remaining()
            )));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], OpcodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_bool(&mut self) -> Result<bool, OpcodeError> {
        let [b] = self.take_array::<1>()?;
        Ok(b != 0)
    }

    pub fn read_int(&mut self) -> Result<i32, OpcodeError> {
        Ok(i32::from_be_bytes(self.take_array()?))
    }

    pub fn read_long(&mut self) -> Result<i64, OpcodeError> {
        Ok(i64::from_be_bytes(self.take_array()?))
    }

    pub fn read_size(&mut self) -> Result<u64, OpcodeError> {
        Ok(u64::from_be_bytes(self.take_array()?))
    }

    pub fn read_string(&mut self) -> Result<Option<String>, OpcodeError> {
        let len = self.read_int()?;
        if len == -1 {
            return Ok(None);
        }
        let len = usize::try_from(len)
            .map_err(|_| OpcodeError::Malformed(format!("negative string length {len}")))?;
        let bytes = self.take(len)?;
        let s = std::str::from_utf8(bytes)
            .map_err(|e| OpcodeError::Malformed(format!("string is not UTF-8: {e}")))?;
        Ok(Some(s.to_string()))
    }

    pub fn read_required_string(&mut self, field: &str) -> Result<String, OpcodeError> {
        self.read_string()?
            .ok_or_else(|| OpcodeError::Malformed(format!("{field} must not be absent")))
    }

    pub fn read_optional_cid(&mut self) -> Result<Option<Cid>, OpcodeError> {
        match self.read_string()? {
            Some(raw) => Ok(Some(Cid::parse(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn read_cid(&mut self, field: &str) -> Result<Cid, OpcodeError> {
        self.read_optional_cid()?
            .ok_or_else(|| OpcodeError::Malformed(format!("{field} must not be absent")))
    }

    pub fn read_key(&mut self, field: &str) -> Result<PublicKey, OpcodeError> {
        let raw = self.read_required_string(field)?;
        Ok(PublicKey::parse(&raw)?)
    }
}
