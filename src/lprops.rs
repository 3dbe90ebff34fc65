//! LEB properties: free/dirty space bookkeeping for every LEB in the main
//! area, plus the summary totals stored in the master node.

use crate::config::Config;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LebProps {
    pub free: u32,
    pub dirty: u32,
    pub is_index: bool,
}

impl LebProps {
    pub fn used(&self, leb_size: u32) -> u32 {
        leb_size.saturating_sub(self.free).saturating_sub(self.dirty)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Totals {
    pub empty_lebs: u32,
    pub idx_lebs: u32,
    pub total_free: u64,
    pub total_dirty: u64,
    pub total_used: u64,
    pub total_dead: u64,
    pub total_dark: u64,
}

/// Per-LEB property table for the main area, built up as the write head
/// finishes each LEB.
#[derive(Debug, Default)]
pub struct Table {
    pub records: Vec<LpRecordView>,
}

/// A view convertible into `lpt::LpRecord`; kept separate from the codec's
/// own record type so this module has no dependency on the on-disk layout.
#[derive(Debug, Clone, Copy)]
pub struct LpRecordView {
    pub lnum: u32,
    pub free: u32,
    pub dirty: u32,
    pub is_index: bool,
}

impl Table {
    pub fn contains(&self, lnum: u32) -> bool {
        self.records.iter().any(|r| r.lnum == lnum)
    }

    pub fn set(&mut self, lnum: u32, props: LebProps) {
        if let Some(existing) = self.records.iter_mut().find(|r| r.lnum == lnum) {
            existing.free = props.free;
            existing.dirty = props.dirty;
            existing.is_index = props.is_index;
        } else {
            self.records.push(LpRecordView {
                lnum,
                free: props.free,
                dirty: props.dirty,
                is_index: props.is_index,
            });
        }
    }

    pub fn to_lpt_records(&self) -> Vec<crate::lpt::LpRecord> {
        let mut sorted: Vec<_> = self.records.clone_into_sorted();
        sorted
            .into_iter()
            .map(|r| crate::lpt::LpRecord::from_props(r.free, r.dirty, r.is_index))
            .collect()
    }

    /// Computes the summary totals the master node stores, per the
    /// dead/dark-watermark policy: free+dirty space below `dead_wm` is
    /// "dead" (too small to ever be reclaimed), and a LEB with more than
    /// `dark_wm` of reclaimable space but less than a full LEB's worth is
    /// "dark" (reclaimable only by garbage collection, not by normal use).
    pub fn totals(&self, cfg: &Config) -> Totals {
        let mut t = Totals::default();
        for r in &self.records {
            if r.is_index {
                t.idx_lebs += 1;
                continue;
            }
            if r.free == cfg.leb_size && r.dirty == 0 {
                t.empty_lebs += 1;
            }
            t.total_free += u64::from(r.free);
            t.total_dirty += u64::from(r.dirty);
            let used = cfg.leb_size.saturating_sub(r.free).saturating_sub(r.dirty);
            t.total_used += u64::from(used);

            let reclaimable = r.free + r.dirty;
            if reclaimable < cfg.dead_wm {
                t.total_dead += u64::from(reclaimable);
            } else {
                t.total_dark += u64::from(calc_dark(reclaimable, cfg.dark_wm));
            }
        }
        t
    }
}

/// Space that can never be counted as usable because no node small enough
/// is guaranteed to fit, per §4.6: below the dark watermark it's all
/// reclaimable; just above it a `MIN_WRITE_SZ`-sized sliver is carved off
/// first; beyond that the watermark itself is the ceiling.
fn calc_dark(spc: u32, dark_wm: u32) -> u32 {
    if spc < dark_wm {
        spc
    } else if spc - dark_wm < crate::config::MIN_WRITE_SZ {
        spc - crate::config::MIN_WRITE_SZ
    } else {
        dark_wm
    }
}

trait SortedClone {
    fn clone_into_sorted(&self) -> Vec<LpRecordView>;
}

impl SortedClone for Vec<LpRecordView> {
    fn clone_into_sorted(&self) -> Vec<LpRecordView> {
        let mut v = self.clone();
        v.sort_by_key(|r| r.lnum);
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> Config {
        let mut c = Config::new(2048, 128 * 1024, 2048);
        c.finalize().unwrap();
        c
    }

    #[test]
    fn empty_leb_is_counted() {
        let cfg = cfg();
        let mut table = Table::default();
        table.set(
            10,
            LebProps {
                free: cfg.leb_size,
                dirty: 0,
                is_index: false,
            },
        );
        let totals = table.totals(&cfg);
        assert_eq!(totals.empty_lebs, 1);
    }

    #[test]
    fn index_leb_is_counted() {
        let cfg = cfg();
        let mut table = Table::default();
        table.set(
            1,
            LebProps {
                free: 0,
                dirty: 0,
                is_index: true,
            },
        );
        assert_eq!(table.totals(&cfg).idx_lebs, 1);
    }

    #[test]
    fn index_leb_space_is_not_folded_into_ordinary_totals() {
        // An index LEB contributes to `idx_lebs` instead of the
        // free/dirty/used/dead/dark totals (spec §4.6) — it must not also
        // be counted as empty, free, or reclaimable space.
        let cfg = cfg();
        let mut table = Table::default();
        table.set(
            1,
            LebProps {
                free: cfg.leb_size,
                dirty: 0,
                is_index: true,
            },
        );
        let totals = table.totals(&cfg);
        assert_eq!(totals.idx_lebs, 1);
        assert_eq!(totals.empty_lebs, 0);
        assert_eq!(totals.total_free, 0);
        assert_eq!(totals.total_used, 0);
        assert_eq!(totals.total_dead, 0);
        assert_eq!(totals.total_dark, 0);
    }

    #[test]
    fn small_reclaimable_space_counts_as_dead() {
        let cfg = cfg();
        let mut table = Table::default();
        table.set(
            2,
            LebProps {
                free: 4,
                dirty: 0,
                is_index: false,
            },
        );
        assert!(table.totals(&cfg).total_dead > 0);
    }

    #[test]
    fn fully_free_leb_contributes_dark_watermark() {
        let cfg = cfg();
        let mut table = Table::default();
        table.set(
            3,
            LebProps {
                free: cfg.leb_size,
                dirty: 0,
                is_index: false,
            },
        );
        assert_eq!(table.totals(&cfg).total_dark, u64::from(cfg.dark_wm));
    }
}
