//! The write head: accumulates encoded nodes into a LEB-sized buffer and
//! flushes full or forced LEBs out to the target, advancing the current LEB
//! number as it goes. Every other component that emits nodes goes through
//! this one choke point.

use tracing::trace;

use crate::config::{self, Config};
use crate::error::{BuildError, Result};
use crate::lprops::{LebProps, Table};
use crate::target::Target;

pub struct Position {
    pub lnum: u32,
    pub offs: u32,
}

pub struct WriteHead<'t, 'p> {
    target: &'t mut dyn Target,
    leb_size: u32,
    min_io_size: u32,
    lnum: u32,
    offs: u32,
    buf: Vec<u8>,
    max_lnum: u32,
    lprops: Option<&'p mut Table>,
    is_index: bool,
}

impl<'t, 'p> WriteHead<'t, 'p> {
    /// Starts writing at `first_lnum`, the first LEB this head is allowed
    /// to use; `max_lnum` is the last one (inclusive) before capacity is
    /// exhausted.
    pub fn new(target: &'t mut dyn Target, cfg: &Config, first_lnum: u32, max_lnum: u32) -> Self {
        WriteHead {
            target,
            leb_size: cfg.leb_size,
            min_io_size: cfg.min_io_size,
            lnum: first_lnum,
            offs: 0,
            buf: Vec::with_capacity(cfg.leb_size as usize),
            max_lnum,
            lprops: None,
            is_index: false,
        }
    }

    /// Attaches the LEB-properties table this head should record into on
    /// every flush, per §4.3: "records the LEB's `(free, dirty, flags)` via
    /// LEB-properties `set_lprops`". `is_index` sets the `INDEX` flag on
    /// every LEB this head finishes — the builder flips it once, after the
    /// data write head is flushed and handed off to the index builder.
    pub fn with_lprops(mut self, lprops: &'p mut Table, is_index: bool) -> Self {
        self.lprops = Some(lprops);
        self.is_index = is_index;
        self
    }

    pub fn position(&self) -> Position {
        Position {
            lnum: self.lnum,
            offs: self.offs,
        }
    }

    pub fn current_lnum(&self) -> u32 {
        self.lnum
    }

    /// Appends an already-encoded, already-aligned node. Flushes the
    /// current LEB first if the node doesn't fit.
    pub fn add_node(&mut self, node: &[u8]) -> Result<Position> {
        if self.offs as usize + node.len() > self.leb_size as usize {
            self.flush()?;
        }
        if self.offs as usize + node.len() > self.leb_size as usize {
            return Err(BuildError::Encoding {
                actual: node.len(),
                limit: self.leb_size as usize,
            });
        }
        let pos = Position {
            lnum: self.lnum,
            offs: self.offs,
        };
        self.buf.extend_from_slice(node);
        self.offs += node.len() as u32;
        Ok(pos)
    }

    /// Pads the buffered data up to a `min_io_size` boundary with `0xFF`,
    /// writes the LEB out, and advances to the next one.
    pub fn flush(&mut self) -> Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        if self.lnum > self.max_lnum {
            return Err(BuildError::Capacity {
                needed: self.lnum + 1,
                max: self.max_lnum + 1,
            });
        }
        // §4.6: `free = leb_size - align(offs, max(min_io_size, 8))`,
        // `dirty = leb_size - free - align(offs, 8)`.
        let free = self
            .leb_size
            .saturating_sub(config::align(self.offs, self.min_io_size.max(8)));
        let dirty = self
            .leb_size
            .saturating_sub(free)
            .saturating_sub(config::align(self.offs, 8));

        let padded = config::align(self.buf.len() as u32, self.min_io_size);
        self.buf.resize(padded as usize, 0xFF);
        self.buf.resize(self.leb_size as usize, 0xFF);
        trace!(lnum = self.lnum, used = self.offs, "flushing leb");
        self.target.leb_change(self.lnum, &self.buf)?;

        if let Some(lprops) = self.lprops.as_deref_mut() {
            lprops.set(
                self.lnum,
                LebProps {
                    free,
                    dirty,
                    is_index: self.is_index,
                },
            );
        }

        self.buf.clear();
        self.lnum += 1;
        self.offs = 0;
        Ok(())
    }

    /// Forces a move to the next LEB even if the current one isn't full,
    /// used when a logically distinct area must start at a LEB boundary.
    pub fn force_new_leb(&mut self) -> Result<()> {
        self.flush()
    }

    pub fn used_in_current(&self) -> u32 {
        self.offs
    }

    /// Sets whether LEBs finished from this point on are flagged `INDEX` in
    /// the LEB-properties table. Per the invariant in §3.2, this flips
    /// exactly once per build: after the data portion is flushed and the GC
    /// LEB reserved, right before the index builder starts writing through
    /// this same head.
    pub fn set_index_mode(&mut self, is_index: bool) {
        self.is_index = is_index;
    }

    /// Leaves the current LEB number blank (erased) and advances past it
    /// without writing any node, reserving it for the runtime garbage
    /// collector the way `gc_lnum` is reserved in the master node.
    pub fn reserve_leb(&mut self) -> Result<u32> {
        self.flush()?;
        let reserved = self.lnum;
        if reserved > self.max_lnum {
            return Err(BuildError::Capacity {
                needed: reserved + 1,
                max: self.max_lnum + 1,
            });
        }
        self.target.leb_erase(reserved)?;
        self.lnum += 1;
        Ok(reserved)
    }
}
