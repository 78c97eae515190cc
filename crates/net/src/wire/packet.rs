use super::codec::{WireDecode, WireEncode, WireError};

/// Append-only byte sequence of encoded values. Nested packets flatten into
/// their parent, so composition is associative.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packet {
    data: Vec<u8>,
}

impl Packet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn add<T: WireEncode>(&mut self, value: T) -> &mut Self {
        value.encode(&mut self.data);
        self
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn reader(&self) -> PacketReader<'_> {
        PacketReader::new(&self.data)
    }
}

impl WireEncode for Packet {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.data);
    }
}

/// Sequential cursor over received bytes. There is no schema: the consumer
/// must know what comes next from the preceding tag.
#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    data: &'a [u8],
    cursor: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, cursor: 0 }
    }

    /// Decodes one value. On failure the cursor is left where it was, so a
    /// value is never partially consumed.
    pub fn read<T: WireDecode>(&mut self) -> Result<T, WireError> {
        let start = self.cursor;
        T::decode(self).inspect_err(|_| self.cursor = start)
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn position(&self) -> usize {
        self.cursor
    }

    pub(crate) fn take(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        let remaining = self.remaining();
        if len > remaining {
            return Err(WireError::BufferUnderrun {
                needed: len,
                remaining,
            });
        }
        let bytes = &self.data[self.cursor..self.cursor + len];
        self.cursor += len;
        Ok(bytes)
    }
}
