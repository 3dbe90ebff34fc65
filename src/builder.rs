//! Top-level orchestration: wires every component together and drives one
//! end-to-end build, the same role the teacher's `Ext4ImageWriter` plays for
//! its format. `Builder` owns every scratch resource for the duration of the
//! build and releases it all when `build()` consumes `self`.

use std::path::Path;

use tracing::info;

use crate::compress::Router;
use crate::config::Config;
use crate::crypto::{DataEncrypt, FnameEncrypt, NoDataEncrypt, NoFnameEncrypt, NoSbSign, SbSign};
use crate::devtable::{DeviceTable, NullDeviceTable};
use crate::error::{BuildError, Result};
use crate::index::IndexList;
use crate::lprops::Table;
use crate::target::Target;
use crate::traverse::Traverser;
use crate::write_head::WriteHead;
use crate::xattrs::{HostXattrSource, XattrSource};

/// Builds an image from a host directory tree into a `Target`, consuming
/// itself once the build completes.
pub struct Builder<'a> {
    cfg: Config,
    devtable: Box<dyn DeviceTable + 'a>,
    xattrs: Box<dyn XattrSource + 'a>,
    fname_enc: Box<dyn FnameEncrypt + 'a>,
    data_enc: Box<dyn DataEncrypt + 'a>,
    signer: Box<dyn SbSign + 'a>,
    lzo_backend: Option<Box<dyn crate::compress::CompressionBackend + 'a>>,
}

impl<'a> Builder<'a> {
    pub fn new(mut cfg: Config) -> Result<Self> {
        cfg.finalize()?;
        Ok(Builder {
            cfg,
            devtable: Box::new(NullDeviceTable),
            xattrs: Box::new(HostXattrSource::default()),
            fname_enc: Box::new(NoFnameEncrypt),
            data_enc: Box::new(NoDataEncrypt),
            signer: Box::new(NoSbSign),
            lzo_backend: None,
        })
    }

    pub fn with_devtable(mut self, devtable: impl DeviceTable + 'a) -> Self {
        self.devtable = Box::new(devtable);
        self
    }

    pub fn with_xattr_source(mut self, xattrs: impl XattrSource + 'a) -> Self {
        self.xattrs = Box::new(xattrs);
        self
    }

    pub fn with_fname_encryptor(mut self, enc: impl FnameEncrypt + 'a) -> Self {
        self.fname_enc = Box::new(enc);
        self
    }

    pub fn with_data_encryptor(mut self, enc: impl DataEncrypt + 'a) -> Self {
        self.data_enc = Box::new(enc);
        self
    }

    pub fn with_signer(mut self, signer: impl SbSign + 'a) -> Self {
        self.signer = Box::new(signer);
        self
    }

    pub fn with_lzo_backend(mut self, backend: impl crate::compress::CompressionBackend + 'a) -> Self {
        self.lzo_backend = Some(Box::new(backend));
        self
    }

    /// Runs the whole pipeline: traverse the host tree, build the index,
    /// emit LEB properties, and write the superblock/master/log/LPT/orphan
    /// areas. Consumes `self` and the `Target`.
    pub fn build(mut self, host_root: &Path, target: &mut dyn Target) -> Result<()> {
        if !host_root.is_dir() {
            return Err(BuildError::BadSource {
                path: host_root.to_path_buf(),
                reason: "root must be an existing directory".into(),
            });
        }

        let mut router = Router::new(self.cfg.default_compr, self.cfg.favor_percent, self.cfg.encrypted);
        if let Some(backend) = self.lzo_backend.take() {
            router = router.with_lzo_backend(backend);
        }

        let main_last = self.cfg.max_leb_cnt - 1;

        let mut list = IndexList::new();
        let mut lprops = Table::default();
        info!(root = %host_root.display(), "traversing host tree");

        let outcome;
        let root;
        let gc_lnum;
        let ihead;
        {
            let mut wh = WriteHead::new(target, &self.cfg, self.cfg.main_first, main_last)
                .with_lprops(&mut lprops, false);
            {
                let mut traverser = Traverser::new(
                    &self.cfg,
                    &mut wh,
                    &mut list,
                    &router,
                    self.devtable.as_ref(),
                    self.xattrs.as_ref(),
                    self.fname_enc.as_ref(),
                    self.data_enc.as_ref(),
                );
                let mut highest_inum = self.cfg.highest_inum;
                outcome = traverser.run(host_root, &mut highest_inum)?;
                self.cfg.highest_inum = highest_inum;
                self.cfg.max_sqnum = traverser.last_sqnum();
            }

            // Data is fully flushed and the GC LEB reserved before the
            // write head's `INDEX` flag toggles (§3.2's invariant: the
            // flag flips exactly once, and never while data LEBs are still
            // being written).
            wh.flush()?;
            gc_lnum = wh.reserve_leb()?;
            wh.set_index_mode(true);

            ihead = wh.position();
            let mut sqnum = self.cfg.max_sqnum;
            root = crate::index::build(&self.cfg, &mut wh, &mut list, &mut sqnum)?;
            self.cfg.max_sqnum = sqnum;
            wh.flush()?;
        }

        // Every main-area LEB not touched by the write head (because it was
        // never reached, sits past `ihead`, or is the reserved GC LEB) is
        // fully free — the LPT and master totals must still account for it.
        for lnum in self.cfg.main_first..=main_last {
            if !lprops.contains(lnum) {
                lprops.set(
                    lnum,
                    crate::lprops::LebProps {
                        free: self.cfg.leb_size,
                        dirty: 0,
                        is_index: false,
                    },
                );
            }
        }
        let totals = lprops.totals(&self.cfg);

        crate::layout::write_lpt(target, &self.cfg, &lprops)?;
        crate::layout::write_master(
            target,
            &self.cfg,
            &root,
            gc_lnum,
            ihead.lnum,
            ihead.offs,
            self.cfg.lpt_first,
            &totals,
        )?;

        crate::layout::write_superblock(target, &self.cfg, self.signer.as_ref())?;
        crate::layout::write_log(target, &self.cfg)?;
        crate::layout::write_orphan_area(target, &self.cfg, self.cfg.lpt_last + 1)?;

        if self.cfg.main_first > self.cfg.max_leb_cnt {
            return Err(BuildError::Capacity {
                needed: self.cfg.main_first,
                max: self.cfg.max_leb_cnt,
            });
        }

        info!(root_inum = outcome.root_inum, "build finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::MemTarget;
    use std::fs;

    #[test]
    fn build_empty_tree() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::new(2048, 128 * 1024, 512);
        cfg.fanout = 4;
        let builder = Builder::new(cfg.clone()).unwrap();
        let mut target = MemTarget::new(builder_leb_size(&cfg));
        builder.build(dir.path(), &mut target).unwrap();
        assert!(!target.lebs.is_empty());
    }

    #[test]
    fn build_two_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"hello world").unwrap();
        fs::write(dir.path().join("b.txt"), vec![0x42u8; 8192]).unwrap();
        let mut cfg = Config::new(2048, 128 * 1024, 512);
        cfg.fanout = 4;
        let builder = Builder::new(cfg.clone()).unwrap();
        let mut target = MemTarget::new(builder_leb_size(&cfg));
        builder.build(dir.path(), &mut target).unwrap();
        assert!(!target.lebs.is_empty());
    }

    #[test]
    fn too_few_lebs_is_capacity_error() {
        let mut cfg = Config::new(2048, 128 * 1024, 6);
        cfg.fanout = 4;
        cfg.log_lebs = 1;
        cfg.orph_lebs = 1;
        let builder = Builder::new(cfg.clone());
        assert!(builder.is_err() || {
            let dir = tempfile::tempdir().unwrap();
            let mut target = MemTarget::new(cfg.leb_size);
            builder.unwrap().build(dir.path(), &mut target).is_err()
        });
    }

    fn builder_leb_size(cfg: &Config) -> u32 {
        cfg.leb_size
    }
}
