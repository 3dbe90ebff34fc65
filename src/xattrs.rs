//! Extended attribute collection. Collecting xattrs from the host
//! filesystem's own attribute store is the concrete default; the contract
//! is just "an iterator of (name, value) pairs" so a caller assembling
//! attributes from some other source (a security-label database, say) can
//! substitute their own.

use std::path::Path;

use crate::error::{BuildError, Result};

pub trait XattrSource {
    fn xattrs(&self, path: &Path) -> Result<Vec<(String, Vec<u8>)>>;

    /// An extra `(name, value)` pair to synthesize on every inode, on top of
    /// whatever `xattrs` collected from the host. The default never
    /// synthesizes anything.
    fn synthesize(&self, inum: u64) -> Option<(String, Vec<u8>)> {
        let _ = inum;
        None
    }
}

/// Reads xattrs straight off the host filesystem via the `xattr` crate.
#[derive(Default)]
pub struct HostXattrSource {
    pub set_inode_attr: bool,
}

/// Name synthesized on every inode when `--set-inode-attr` is requested:
/// records the image's own inode number as an xattr, letting a later image
/// consumer recover the original numbering after repacking.
pub const INODE_ATTR_NAME: &str = "user.image-inum";

impl XattrSource for HostXattrSource {
    fn xattrs(&self, path: &Path) -> Result<Vec<(String, Vec<u8>)>> {
        let mut out = Vec::new();
        let names = xattr::list(path).map_err(|e| BuildError::io(path, e))?;
        for name in names {
            let name = name.to_string_lossy().into_owned();
            if let Some(value) = xattr::get(path, &name).map_err(|e| BuildError::io(path, e))? {
                out.push((name, value));
            }
        }
        Ok(out)
    }

    fn synthesize(&self, inum: u64) -> Option<(String, Vec<u8>)> {
        if self.set_inode_attr {
            Some((INODE_ATTR_NAME.to_string(), inum.to_le_bytes().to_vec()))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesized_attr_only_when_enabled() {
        let on = HostXattrSource { set_inode_attr: true };
        let off = HostXattrSource { set_inode_attr: false };
        assert!(on.synthesize(5).is_some());
        assert!(off.synthesize(5).is_none());
    }
}
