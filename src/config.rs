//! Build configuration: device geometry, tree parameters, policies and the
//! computed constants and running counters derived from them.

use crate::error::{BuildError, Result};

/// Root inode number. The root directory always occupies this slot.
pub const ROOT_INO: u64 = 1;
/// First inode number handed out to anything that is not the root.
pub const FIRST_INO: u64 = 2;

pub const SB_LNUM: u32 = 0;
pub const SB_LEBS: u32 = 1;
pub const MST_LNUM: u32 = 1;
pub const MST_LEBS: u32 = 2;
pub const LOG_LNUM: u32 = 3;

pub const MIN_IO_SIZE_DEFAULT: u32 = 2048;
pub const BLOCK_SIZE: u32 = 4096;
pub const MIN_COMPR_LEN: usize = 64;
pub const MIN_WRITE_SZ: u32 = 8;
/// Worst-case size of a single node that must fit anywhere in a LEB.
pub const MAX_NODE_SZ: u32 = 2 * 1024 + 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionAlgo {
    None,
    Lzo,
    Zlib,
    Zstd,
    FavorLzo,
}

impl CompressionAlgo {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "lzo" => Ok(CompressionAlgo::Lzo),
            "zlib" => Ok(CompressionAlgo::Zlib),
            "zstd" => Ok(CompressionAlgo::Zstd),
            "favor_lzo" => Ok(CompressionAlgo::FavorLzo),
            "none" => Ok(CompressionAlgo::None),
            other => Err(BuildError::InvalidOption(format!(
                "unknown compressor '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyHashType {
    R5,
    Test,
}

impl KeyHashType {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "r5" => Ok(KeyHashType::R5),
            "test" => Ok(KeyHashType::Test),
            other => Err(BuildError::InvalidOption(format!(
                "unknown key hash type '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgo {
    Sha1,
    Sha256,
    Sha512,
}

impl HashAlgo {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "sha1" => Ok(HashAlgo::Sha1),
            "sha256" => Ok(HashAlgo::Sha256),
            "sha512" => Ok(HashAlgo::Sha512),
            other => Err(BuildError::InvalidOption(format!(
                "unknown hash algorithm '{other}'"
            ))),
        }
    }

    /// Digest length used on disk, truncated/expanded the way UBIFS always
    /// stores a fixed-width `hash[hash_len]` regardless of the underlying
    /// digest's native size.
    pub fn hash_len(self) -> usize {
        match self {
            HashAlgo::Sha1 => 20,
            HashAlgo::Sha256 => 32,
            HashAlgo::Sha512 => 64,
        }
    }
}

/// Everything the build needs to know up front, plus the counters that
/// advance as nodes are emitted. Created once from options, then mutated
/// only by `Builder::build` and the components it drives.
#[derive(Debug, Clone)]
pub struct Config {
    // Device geometry
    pub min_io_size: u32,
    pub leb_size: u32,
    pub max_leb_cnt: u32,

    // Tree parameters
    pub fanout: u32,
    pub key_hash_type: KeyHashType,

    // Policies
    pub default_compr: CompressionAlgo,
    pub favor_percent: u32,
    pub rp_size: u64,
    pub max_bud_bytes: u64,
    pub space_fixup: bool,
    pub double_hash: bool,
    pub encrypted: bool,
    pub squash_owner: bool,
    pub set_inode_attr: bool,
    pub hash_algo: HashAlgo,

    pub log_lebs: u32,
    pub orph_lebs: u32,

    // Computed constants (filled in by `Config::finalize`)
    pub main_first: u32,
    pub lpt_first: u32,
    pub lpt_lebs: u32,
    pub lpt_last: u32,
    pub hash_len: usize,
    pub dead_wm: u32,
    pub dark_wm: u32,

    // Running counters
    pub highest_inum: u64,
    pub max_sqnum: u64,
}

impl Config {
    pub fn new(min_io_size: u32, leb_size: u32, max_leb_cnt: u32) -> Self {
        Config {
            min_io_size,
            leb_size,
            max_leb_cnt,
            fanout: 8,
            key_hash_type: KeyHashType::R5,
            default_compr: CompressionAlgo::Zlib,
            favor_percent: 20,
            rp_size: 0,
            max_bud_bytes: u64::from(leb_size) * 12,
            space_fixup: false,
            double_hash: false,
            encrypted: false,
            squash_owner: false,
            set_inode_attr: false,
            hash_algo: HashAlgo::Sha256,
            log_lebs: 0,
            orph_lebs: 1,
            main_first: 0,
            lpt_first: 0,
            lpt_lebs: 0,
            lpt_last: 0,
            hash_len: HashAlgo::Sha256.hash_len(),
            dead_wm: 0,
            dark_wm: 0,
            highest_inum: FIRST_INO - 1,
            max_sqnum: 0,
        }
    }

    /// Validates the geometry and computes the derived constants. Must be
    /// called before the build starts; `Builder::new` does this.
    pub fn finalize(&mut self) -> Result<()> {
        if self.min_io_size == 0 || !self.min_io_size.is_power_of_two() {
            return Err(BuildError::Geometry(format!(
                "min_io_size must be a power of two, got {}",
                self.min_io_size
            )));
        }
        if self.leb_size == 0 || self.leb_size % self.min_io_size != 0 {
            return Err(BuildError::Geometry(format!(
                "leb_size ({}) must be a multiple of min_io_size ({})",
                self.leb_size, self.min_io_size
            )));
        }
        if self.fanout < 3 {
            return Err(BuildError::Geometry(format!(
                "fanout must be >= 3, got {}",
                self.fanout
            )));
        }

        if self.log_lebs == 0 {
            self.log_lebs = calc_min_log_lebs(self.max_bud_bytes, self.leb_size, self.min_io_size);
        }

        self.hash_len = self.hash_algo.hash_len();

        self.lpt_first = LOG_LNUM + self.log_lebs;
        // A conservative, fixed-width LPT image (see `lpt` module) rather
        // than the original's bit-packed variable-width tree: one LEB is
        // always enough to describe `leb_size / lpt::RECORD_SIZE` main-area
        // LEBs, and we size the area to the worst case directly.
        let max_main_lebs = self
            .max_leb_cnt
            .saturating_sub(SB_LEBS + MST_LEBS + self.log_lebs + self.orph_lebs);
        self.lpt_lebs = crate::lpt::lebs_needed(max_main_lebs, self.leb_size).max(1);
        self.lpt_last = self.lpt_first + self.lpt_lebs - 1;
        self.main_first = self.lpt_last + 1 + self.orph_lebs;

        if self.main_first >= self.max_leb_cnt {
            return Err(BuildError::Geometry(format!(
                "max_leb_cnt ({}) too small for the fixed areas alone ({} LEBs)",
                self.max_leb_cnt, self.main_first
            )));
        }

        self.dead_wm = align(MIN_WRITE_SZ, self.min_io_size);
        self.dark_wm = align(MAX_NODE_SZ, self.min_io_size);

        Ok(())
    }
}

pub fn align(len: u32, to: u32) -> u32 {
    (len + to - 1) / to * to
}

pub fn align_usize(len: usize, to: usize) -> usize {
    (len + to - 1) / to * to
}

fn calc_min_log_lebs(max_bud_bytes: u64, leb_size: u32, min_io_size: u32) -> u32 {
    let buds = max_bud_bytes.div_ceil(u64::from(leb_size));
    // Approximates the original's `calc_min_log_lebs`: a reference-node
    // worth of log space per bud, plus one commit-start LEB.
    const REF_NODE_SZ: u32 = 32;
    const CS_NODE_SZ: u32 = 24;
    let mut log_size = u64::from(align(REF_NODE_SZ, min_io_size)) * buds;
    log_size += u64::from(align(CS_NODE_SZ + REF_NODE_SZ * 3, min_io_size));
    (log_size.div_ceil(u64::from(leb_size)) as u32 + 1).max(1)
}

/// Parses a size specifier of the form `<decimal>[KiB|MiB|GiB]`, per §6.4.
pub fn parse_size(s: &str) -> Result<u64> {
    let s = s.trim();
    let (digits, suffix) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => (&s[..idx], s[idx..].trim()),
        None => (s, ""),
    };
    if digits.is_empty() {
        return Err(BuildError::InvalidOption(format!(
            "bad size specifier '{s}'"
        )));
    }
    let value: u64 = digits
        .parse()
        .map_err(|_| BuildError::InvalidOption(format!("bad size specifier '{s}'")))?;
    let multiplier: u64 = match suffix {
        "" => 1,
        "KiB" => 1024,
        "MiB" => 1024 * 1024,
        "GiB" => 1024 * 1024 * 1024,
        other => {
            return Err(BuildError::InvalidOption(format!(
                "unknown size suffix '{other}'"
            )));
        }
    };
    Ok(value * multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_size_plain() {
        assert_eq!(parse_size("4096").unwrap(), 4096);
    }

    #[test]
    fn parse_size_kib() {
        assert_eq!(parse_size("128KiB").unwrap(), 128 * 1024);
    }

    #[test]
    fn parse_size_with_space() {
        assert_eq!(parse_size("4 MiB").unwrap(), 4 * 1024 * 1024);
    }

    #[test]
    fn parse_size_bad_suffix() {
        assert!(parse_size("4Xi").is_err());
    }

    #[test]
    fn config_finalize_rejects_bad_min_io() {
        let mut c = Config::new(3, 128 * 1024, 2048);
        assert!(c.finalize().is_err());
    }

    #[test]
    fn config_finalize_computes_areas() {
        let mut c = Config::new(2048, 128 * 1024, 2048);
        c.finalize().unwrap();
        assert!(c.main_first > LOG_LNUM + c.log_lebs);
        assert!(c.lpt_lebs >= 1);
    }
}
