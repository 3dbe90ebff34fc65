//! The packed key that orders every entry in the index: an inode number, a
//! type tag, and a type-specific discriminator, all folded into one 64-bit
//! value so the index can sort and compare keys with a single integer
//! comparison instead of a multi-field one.

use binrw::{BinRead, BinWrite};

use crate::config::KeyHashType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum KeyType {
    Inode = 0,
    Data = 1,
    Dent = 2,
    Xent = 3,
}

impl KeyType {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => KeyType::Inode,
            1 => KeyType::Data,
            2 => KeyType::Dent,
            _ => KeyType::Xent,
        }
    }
}

/// `{inum: 32, type: 3, discriminator: 29}` packed big-endian-style so that
/// integer ordering of the packed value matches key ordering: primarily by
/// inode number, then by type, then by discriminator (block number for data
/// keys, name hash for dentry/xattr-entry keys).
#[derive(BinRead, BinWrite, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[brw(big)]
pub struct Key(u64);

const INUM_SHIFT: u32 = 32;
const TYPE_SHIFT: u32 = 29;
const TYPE_MASK: u64 = 0x7;
const DISC_MASK: u64 = (1 << TYPE_SHIFT) - 1;

impl Key {
    pub fn new(inum: u64, kind: KeyType, discriminator: u32) -> Self {
        let inum = inum & 0xFFFF_FFFF;
        let kind = (kind as u64) & TYPE_MASK;
        let disc = u64::from(discriminator) & DISC_MASK;
        Key((inum << INUM_SHIFT) | (kind << TYPE_SHIFT) | disc)
    }

    pub fn inode(inum: u64) -> Self {
        Self::new(inum, KeyType::Inode, 0)
    }

    pub fn data(inum: u64, block: u32) -> Self {
        Self::new(inum, KeyType::Data, block)
    }

    pub fn dent(inum: u64, name_hash: u32) -> Self {
        Self::new(inum, KeyType::Dent, name_hash)
    }

    pub fn xent(inum: u64, name_hash: u32) -> Self {
        Self::new(inum, KeyType::Xent, name_hash)
    }

    pub fn inum(self) -> u64 {
        self.0 >> INUM_SHIFT
    }

    pub fn key_type(self) -> KeyType {
        KeyType::from_u8(((self.0 >> TYPE_SHIFT) & TYPE_MASK) as u8)
    }

    pub fn discriminator(self) -> u32 {
        (self.0 & DISC_MASK) as u32
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// r5 hash, the UBIFS default: a cheap rolling hash over the name bytes,
/// masked down to the 29 bits the key's discriminator field has room for.
pub fn r5_hash(name: &[u8]) -> u32 {
    let mut a: u32 = 0;
    for &b in name {
        a = (a << 6).wrapping_add(a >> 2).wrapping_add(u32::from(b));
    }
    a & (DISC_MASK as u32)
}

/// Test hash: the name's length folded with its first bytes, used only by
/// `--key-hash test`, UBIFS's deterministic-collision mode for exercising
/// the index builder's tie-breaking path in test suites.
pub fn test_hash(name: &[u8]) -> u32 {
    let mut h = name.len() as u32;
    for (i, &b) in name.iter().enumerate().take(4) {
        h ^= u32::from(b) << (8 * i);
    }
    h & (DISC_MASK as u32)
}

pub fn name_hash(kind: KeyHashType, name: &[u8]) -> u32 {
    match kind {
        KeyHashType::R5 => r5_hash(name),
        KeyHashType::Test => test_hash(name),
    }
}

/// Dentry/xattr-entry keys only order by hash; entries sharing a hash are
/// disambiguated by literal name comparison wherever they're compared for
/// equality (the index builder's sort key is `(Key, &[u8])`, not `Key`
/// alone).
pub fn sort_key(key: Key, name: &[u8]) -> (u64, &[u8]) {
    (key.raw(), name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_by_inum_then_type_then_discriminator() {
        let a = Key::inode(5);
        let b = Key::data(5, 0);
        let c = Key::inode(6);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn round_trip_fields() {
        let k = Key::dent(42, 0x1234);
        assert_eq!(k.inum(), 42);
        assert_eq!(k.key_type(), KeyType::Dent);
        assert_eq!(k.discriminator(), 0x1234);
    }

    #[test]
    fn r5_hash_differs_for_different_names() {
        assert_ne!(r5_hash(b"foo"), r5_hash(b"bar"));
    }

    #[test]
    fn r5_hash_stable() {
        assert_eq!(r5_hash(b"same"), r5_hash(b"same"));
    }
}
