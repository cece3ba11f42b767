//! Block checksum used to protect each BTX link-layer frame.
//!
//! The firmware calls this algorithm "CRC-16/MODBUS", but its register starts at
//! 0x0000 rather than the 0xFFFF the catalog profile of that name actually uses.
//! What matters for interoperability is the byte loop, not the catalog label, so
//! the algorithm below is defined to match that loop exactly (it is the reflected
//! CRC-16/ARC variant under the hood).

pub const BTX_CRC_ALG: crc::Algorithm<u16> = crc::Algorithm {
    width: 16,
    poly: 0x8005,
    init: 0x0000,
    refin: true,
    refout: true,
    xorout: 0x0000,
    check: 0xBB3D,
    residue: 0x0000,
};

/// Advance `crc` by one byte. The link layer keeps a running register across many
/// calls to this as a block is assembled, since a whole block is never available
/// as a single contiguous slice while it is being read out of the send buffer.
pub fn update(crc: u16, byte: u8) -> u16 {
    let mut c = crc ^ byte as u16;
    for _ in 0..8 {
        c = if c & 1 != 0 { (c >> 1) ^ 0xA001 } else { c >> 1 };
    }
    c
}

/// Checksum of a complete buffer, starting from a zero register.
pub fn btx_crc(input: &[u8]) -> u16 {
    let crc = crc::Crc::<u16>::new(&BTX_CRC_ALG);
    let mut digest = crc.digest();
    digest.update(input);
    digest.finalize()
}
