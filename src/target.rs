//! The output abstraction: somewhere to put finished LEBs. Real UBI volumes
//! and flat image files both just need `leb_change`/`leb_erase`; everything
//! upstream of this module works purely in terms of LEB numbers and bytes.

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{BuildError, Result};

/// Destination for a built image. One LEB at a time, written whole —
/// nothing in this crate ever issues a partial LEB write.
pub trait Target {
    fn leb_size(&self) -> u32;
    fn leb_change(&mut self, lnum: u32, data: &[u8]) -> Result<()>;
    fn leb_erase(&mut self, lnum: u32) -> Result<()> {
        let blank = vec![0xFFu8; self.leb_size() as usize];
        self.leb_change(lnum, &blank)
    }
}

/// Writes LEBs into a plain file, growing it as needed, each LEB landing at
/// `lnum * leb_size`.
pub struct FileTarget {
    file: File,
    path: PathBuf,
    leb_size: u32,
}

impl FileTarget {
    pub fn create(path: impl AsRef<Path>, leb_size: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|e| BuildError::io(&path, e))?;
        Ok(FileTarget {
            file,
            path,
            leb_size,
        })
    }
}

impl Target for FileTarget {
    fn leb_size(&self) -> u32 {
        self.leb_size
    }

    fn leb_change(&mut self, lnum: u32, data: &[u8]) -> Result<()> {
        if data.len() != self.leb_size as usize {
            return Err(BuildError::Encoding {
                actual: data.len(),
                limit: self.leb_size as usize,
            });
        }
        let offset = u64::from(lnum) * u64::from(self.leb_size);
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| BuildError::io(&self.path, e))?;
        self.file
            .write_all(data)
            .map_err(|e| BuildError::io(&self.path, e))
    }
}

/// In-memory target, used by tests and by anything driving this crate as a
/// library without touching the filesystem.
#[derive(Default)]
pub struct MemTarget {
    pub lebs: std::collections::BTreeMap<u32, Vec<u8>>,
    leb_size: u32,
}

impl MemTarget {
    pub fn new(leb_size: u32) -> Self {
        MemTarget {
            lebs: Default::default(),
            leb_size,
        }
    }
}

impl Target for MemTarget {
    fn leb_size(&self) -> u32 {
        self.leb_size
    }

    fn leb_change(&mut self, lnum: u32, data: &[u8]) -> Result<()> {
        if data.len() != self.leb_size as usize {
            return Err(BuildError::Encoding {
                actual: data.len(),
                limit: self.leb_size as usize,
            });
        }
        self.lebs.insert(lnum, data.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_target_rejects_wrong_size() {
        let mut t = MemTarget::new(4096);
        assert!(t.leb_change(0, &[0u8; 10]).is_err());
    }

    #[test]
    fn mem_target_stores_leb() {
        let mut t = MemTarget::new(16);
        t.leb_change(3, &[7u8; 16]).unwrap();
        assert_eq!(t.lebs[&3], vec![7u8; 16]);
    }

    #[test]
    fn leb_erase_fills_with_0xff() {
        let mut t = MemTarget::new(8);
        t.leb_erase(0).unwrap();
        assert_eq!(t.lebs[&0], vec![0xFFu8; 8]);
    }
}
