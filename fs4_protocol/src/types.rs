use std::io::{Cursor, Read};

use chrono::{DateTime, Utc};

use crate::{
    config::ByteOrder,
    errors::{ProtocolError, Result},
};

/// A named map of string properties, as carried by query, getdocsums and
/// trace reply packets.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PropertyMap {
    pub name: String,
    pub entries: Vec<(String, String)>,
}

impl PropertyMap {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: Vec::new(),
        }
    }

    pub fn with_entry(mut self, key: &str, value: &str) -> Self {
        self.entries.push((key.to_string(), value.to_string()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

pub type Properties = Vec<PropertyMap>;

/// Converts an in-memory count or length into its `u32` wire form.
pub fn wire_count(value: usize, field: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| ProtocolError::ContractViolation(format!("{field} does not fit in u32")))
}

/// Converts a wire timestamp (seconds since the epoch) to a UTC time.
pub fn timestamp(seconds: u32) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(i64::from(seconds), 0)
}

/// Reads primitive fields off a packet body in the configured byte order.
pub struct WireReader<'a> {
    cursor: Cursor<&'a [u8]>,
    byte_order: ByteOrder,
}

impl<'a> WireReader<'a> {
    pub fn new(bytes: &'a [u8], byte_order: ByteOrder) -> Self {
        Self {
            cursor: Cursor::new(bytes),
            byte_order,
        }
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn position(&self) -> usize {
        self.cursor.position() as usize
    }

    pub fn remaining(&self) -> usize {
        self.cursor.get_ref().len().saturating_sub(self.position())
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let available = self.remaining();
        let mut bytes = [0u8; N];
        self.cursor
            .read_exact(&mut bytes)
            .map_err(|_| ProtocolError::BufferTooShort {
                needed: N,
                available,
            })?;

        Ok(bytes)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.read_array::<4>()?;
        Ok(match self.byte_order {
            ByteOrder::BigEndian => u32::from_be_bytes(bytes),
            ByteOrder::LittleEndian => u32::from_le_bytes(bytes),
        })
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let bytes = self.read_array::<8>()?;
        Ok(match self.byte_order {
            ByteOrder::BigEndian => u64::from_be_bytes(bytes),
            ByteOrder::LittleEndian => u64::from_le_bytes(bytes),
        })
    }

    /// Ranks travel as IEEE-754 doubles.
    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let available = self.remaining();
        if len > available {
            return Err(ProtocolError::BufferTooShort {
                needed: len,
                available,
            });
        }

        let mut bytes = vec![0u8; len];
        self.cursor
            .read_exact(&mut bytes)
            .map_err(|_| ProtocolError::BufferTooShort {
                needed: len,
                available,
            })?;

        Ok(bytes)
    }

    /// Everything left in the body.
    pub fn read_to_end(&mut self) -> Result<Vec<u8>> {
        self.read_bytes(self.remaining())
    }

    /// A `u32` length followed by that many raw bytes.
    pub fn read_blob(&mut self) -> Result<Vec<u8>> {
        let len = self.read_u32()? as usize;
        self.read_bytes(len)
    }

    pub fn read_string(&mut self, field: &'static str) -> Result<String> {
        let bytes = self.read_blob()?;
        String::from_utf8(bytes).map_err(|_| ProtocolError::InvalidUtf8 { field })
    }

    /// ```md
    /// numProperties (4)
    /// numProperties * { name (str), numEntries (4), numEntries * { key (str), value (str) } }
    /// ```
    pub fn read_properties(&mut self) -> Result<Properties> {
        let count = self.read_u32()?;
        let mut properties = Vec::new();

        for _ in 0..count {
            let name = self.read_string("property name")?;
            let entry_count = self.read_u32()?;
            let mut entries = Vec::new();
            for _ in 0..entry_count {
                let key = self.read_string("property key")?;
                let value = self.read_string("property value")?;
                entries.push((key, value));
            }
            properties.push(PropertyMap { name, entries });
        }

        Ok(properties)
    }

    /// Fails if the body has not been fully consumed.
    pub fn finish(&self) -> Result<()> {
        match self.remaining() {
            0 => Ok(()),
            left => Err(ProtocolError::TrailingBytes(left)),
        }
    }
}

/// Accumulates primitive fields in the configured byte order.
pub struct WireWriter {
    bytes: Vec<u8>,
    byte_order: ByteOrder,
}

impl WireWriter {
    pub fn new(byte_order: ByteOrder) -> Self {
        Self {
            bytes: Vec::new(),
            byte_order,
        }
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn write_u32(&mut self, value: u32) {
        match self.byte_order {
            ByteOrder::BigEndian => self.bytes.extend_from_slice(&value.to_be_bytes()),
            ByteOrder::LittleEndian => self.bytes.extend_from_slice(&value.to_le_bytes()),
        }
    }

    pub fn write_u64(&mut self, value: u64) {
        match self.byte_order {
            ByteOrder::BigEndian => self.bytes.extend_from_slice(&value.to_be_bytes()),
            ByteOrder::LittleEndian => self.bytes.extend_from_slice(&value.to_le_bytes()),
        }
    }

    pub fn write_f64(&mut self, value: f64) {
        self.write_u64(value.to_bits());
    }

    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    pub fn write_blob(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_u32(wire_count(bytes.len(), "blob length")?);
        self.write_raw(bytes);
        Ok(())
    }

    pub fn write_string(&mut self, string: &str) -> Result<()> {
        self.write_blob(string.as_bytes())
    }

    pub fn write_properties(&mut self, properties: &[PropertyMap]) -> Result<()> {
        self.write_u32(wire_count(properties.len(), "property map count")?);

        for map in properties {
            self.write_string(&map.name)?;
            self.write_u32(wire_count(map.entries.len(), "property entry count")?);
            for (key, value) in &map.entries {
                self.write_string(key)?;
                self.write_string(value)?;
            }
        }

        Ok(())
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}
