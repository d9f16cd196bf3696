//! Big-endian cursor over fixed-layout binary structures
//!
//! Used for authenticator data and the TPM structures. Every read is bounds
//! checked and reports what was being read when the input runs out.

use super::errors::Fido2Error;

pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    #[allow(dead_code)]
    pub(crate) fn advance(&mut self, count: usize) {
        self.pos = (self.pos + count).min(self.data.len());
    }

    pub(crate) fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8], Fido2Error> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                Fido2Error::parse(format!(
                    "Truncated input reading {what}: need {len} bytes at offset {}, have {}",
                    self.pos,
                    self.data.len() - self.pos
                ))
            })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn array<const N: usize>(&mut self, what: &str) -> Result<[u8; N], Fido2Error> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, what)?);
        Ok(out)
    }

    pub(crate) fn u8(&mut self, what: &str) -> Result<u8, Fido2Error> {
        Ok(self.array::<1>(what)?[0])
    }

    pub(crate) fn u16(&mut self, what: &str) -> Result<u16, Fido2Error> {
        Ok(u16::from_be_bytes(self.array(what)?))
    }

    pub(crate) fn u32(&mut self, what: &str) -> Result<u32, Fido2Error> {
        Ok(u32::from_be_bytes(self.array(what)?))
    }

    pub(crate) fn u64(&mut self, what: &str) -> Result<u64, Fido2Error> {
        Ok(u64::from_be_bytes(self.array(what)?))
    }

    /// A TPM2B-style field: 16-bit length followed by that many bytes
    pub(crate) fn sized(&mut self, what: &str) -> Result<&'a [u8], Fido2Error> {
        let len = self.u16(what)?;
        self.take(usize::from(len), what)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_big_endian_fields() {
        let data = [0x01, 0x02, 0x00, 0x00, 0x01, 0x00, 0x00, 0x02, 0xaa, 0xbb];
        let mut reader = ByteReader::new(&data);
        assert_eq!(reader.u16("a").unwrap(), 0x0102);
        assert_eq!(reader.u32("b").unwrap(), 0x0000_0100);
        assert_eq!(reader.sized("c").unwrap(), &[0xaa, 0xbb]);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_truncation_names_the_field() {
        let mut reader = ByteReader::new(&[0x00, 0x05, 0x01]);
        let err = reader.sized("credential id").unwrap_err();
        match err {
            Fido2Error::ParseError(msg) => assert!(msg.contains("credential id")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
