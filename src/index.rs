//! Index entries and the bottom-up B-tree builder.
//!
//! Grounded in `write_index()` in
//! `examples/original_source/ubifs-utils/mkfs.ubifs/mkfs.ubifs.c`: sort
//! every leaf by `(key, name)`, pack `fanout` children per level-0 node,
//! then for each level above, stride through the previous level by
//! `fanout` nodes at a time, using the first child's key as the parent's
//! key, until a level holds exactly one node — the root.

use crate::config::Config;
use crate::error::{BuildError, Result};
use crate::key::Key;
use crate::node::{Branch, IndexNode, NodeType};
use crate::write_head::WriteHead;

#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub key: Key,
    pub name: Vec<u8>,
    pub lnum: u32,
    pub offs: u32,
    pub len: u32,
    /// Digest of the leaf node's encoded bytes, under the build's configured
    /// hash algorithm; carried into the level-0 branch that addresses this
    /// leaf (§3.1/§4.5).
    pub hash: Vec<u8>,
}

pub struct IndexList {
    pub entries: Vec<IndexEntry>,
}

impl IndexList {
    pub fn new() -> Self {
        IndexList { entries: Vec::new() }
    }

    pub fn push(&mut self, entry: IndexEntry) {
        self.entries.push(entry);
    }
}

impl Default for IndexList {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Root {
    pub lnum: u32,
    pub offs: u32,
    pub len: u32,
    pub level: u16,
}

/// Builds the index B-tree bottom-up from a flat, already-sorted list of
/// leaf entries and writes every index node through `wh`. `sqnum` is the
/// build's shared sequence-number counter, already advanced past every
/// inode/dentry/data node the traversal emitted; it keeps advancing here so
/// every index node's sqnum remains strictly greater than the leaf nodes
/// emitted before it (§3.2).
pub fn build(cfg: &Config, wh: &mut WriteHead, list: &mut IndexList, sqnum: &mut u64) -> Result<Root> {
    list.entries
        .sort_by(|a, b| a.key.raw().cmp(&b.key.raw()).then_with(|| a.name.cmp(&b.name)));

    if list.entries.is_empty() {
        return Err(BuildError::BadSource {
            path: Default::default(),
            reason: "cannot build an index with no leaf entries".into(),
        });
    }

    // Level 0: one branch per leaf entry, grouped `fanout` at a time.
    let mut level: Vec<Branch> = list
        .entries
        .iter()
        .map(|e| Branch {
            lnum: e.lnum,
            offs: e.offs,
            len: e.len,
            key: e.key.raw(),
            hash: e.hash.clone(),
        })
        .collect();

    let mut level_no: u16 = 0;
    loop {
        let parents = pack_level(cfg, wh, &level, level_no, sqnum)?;
        if parents.len() == 1 {
            let only = &parents[0];
            return Ok(Root {
                lnum: only.lnum,
                offs: only.offs,
                len: only.len,
                level: level_no + 1,
            });
        }
        level = parents;
        level_no += 1;
    }
}

/// Packs one level's branches into parent nodes of at most `fanout`
/// children each, writing each parent node and returning a branch pointing
/// at it for the next level up.
fn pack_level(
    cfg: &Config,
    wh: &mut WriteHead,
    children: &[Branch],
    level_no: u16,
    sqnum: &mut u64,
) -> Result<Vec<Branch>> {
    let mut parents = Vec::new();
    for chunk in children.chunks(cfg.fanout as usize) {
        let node = IndexNode {
            child_cnt: chunk.len() as u16,
            level: level_no,
            branches: chunk.to_vec(),
        };
        *sqnum += 1;
        let bytes = crate::node::encode_node(NodeType::Idx, 0, *sqnum, &node)?;
        let pos = wh.add_node(&bytes)?;
        let hash = crate::crypto::hash(cfg.hash_algo, &bytes);
        parents.push(Branch {
            lnum: pos.lnum,
            offs: pos.offs,
            len: bytes.len() as u32,
            key: chunk[0].key,
            hash,
        });
    }
    Ok(parents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyType;
    use crate::target::MemTarget;

    fn cfg() -> Config {
        let mut c = Config::new(64, 1024, 64);
        c.fanout = 3;
        c.finalize().unwrap();
        c
    }

    #[test]
    fn single_leaf_becomes_its_own_root() {
        let cfg = cfg();
        let mut target = MemTarget::new(cfg.leb_size);
        let mut wh = WriteHead::new(&mut target, &cfg, 0, 63);
        let mut list = IndexList::new();
        list.push(IndexEntry {
            key: Key::new(2, KeyType::Inode, 0),
            name: vec![],
            lnum: 10,
            offs: 0,
            len: 40,
            hash: vec![0u8; 32],
        });
        let mut sqnum = 0u64;
        let root = build(&cfg, &mut wh, &mut list, &mut sqnum).unwrap();
        assert_eq!(root.level, 1);
    }

    #[test]
    fn many_leaves_build_multiple_levels() {
        let cfg = cfg();
        let mut target = MemTarget::new(cfg.leb_size);
        let mut wh = WriteHead::new(&mut target, &cfg, 0, 63);
        let mut list = IndexList::new();
        for i in 0..20u64 {
            list.push(IndexEntry {
                key: Key::new(i + 2, KeyType::Inode, 0),
                name: vec![],
                lnum: 10,
                offs: i as u32 * 8,
                len: 8,
                hash: vec![0u8; 32],
            });
        }
        let mut sqnum = 0u64;
        let root = build(&cfg, &mut wh, &mut list, &mut sqnum).unwrap();
        assert!(root.level >= 2);
    }

    #[test]
    fn empty_list_is_rejected() {
        let cfg = cfg();
        let mut target = MemTarget::new(cfg.leb_size);
        let mut wh = WriteHead::new(&mut target, &cfg, 0, 63);
        let mut list = IndexList::new();
        let mut sqnum = 0u64;
        assert!(build(&cfg, &mut wh, &mut list, &mut sqnum).is_err());
    }
}
