//! `mkfs-ufs`: the CLI surface around `ufs_mkfs::Builder`. Option parsing,
//! help text, and the interactive confirmation prompt live here; everything
//! past argument parsing is a thin call into the library.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::warn;

use ufs_mkfs::config::{CompressionAlgo, Config, HashAlgo, KeyHashType};
use ufs_mkfs::crypto::Sha2HmacSigner;
use ufs_mkfs::devtable::NullDeviceTable;
use ufs_mkfs::xattrs::HostXattrSource;
use ufs_mkfs::{BuildError, Builder, FileTarget};

/// Builds an offline UFS image from a host directory tree.
#[derive(Parser, Debug)]
#[command(name = "mkfs-ufs", version, about)]
struct Cli {
    /// Image file to create. May also be given as `-o`.
    #[arg(value_name = "TARGET")]
    target_pos: Option<PathBuf>,

    /// Image file to create (overrides the positional argument).
    #[arg(short = 'o', long = "output", value_name = "TARGET")]
    output: Option<PathBuf>,

    /// Source directory tree to build the image from.
    #[arg(short = 'r', long = "root", value_name = "DIR")]
    root: PathBuf,

    /// Minimum I/O unit size, e.g. `2048` or `2KiB`.
    #[arg(short = 'm', long = "min-io-size", value_name = "SIZE", default_value = "2048")]
    min_io_size: String,

    /// Logical erase block size, e.g. `128KiB`.
    #[arg(short = 'e', long = "leb-size", value_name = "SIZE", default_value = "128KiB")]
    leb_size: String,

    /// Maximum LEB count the image may grow to.
    #[arg(short = 'c', long = "max-leb-cnt")]
    max_leb_cnt: u32,

    /// Journal budget in bytes, sizes the log area (`max_bud_bytes`).
    #[arg(short = 'j', long = "journal-size", value_name = "SIZE")]
    journal_size: Option<String>,

    /// Reserved-for-root space, in bytes.
    #[arg(short = 'R', long = "reserved", value_name = "SIZE", default_value = "0")]
    reserved: String,

    /// Default compressor: lzo, zlib, zstd, favor_lzo, or none.
    #[arg(short = 'x', long = "compr", value_name = "ALGO", default_value = "zlib")]
    compr: String,

    /// Favor-lzo threshold percentage.
    #[arg(short = 'X', long = "favor-percent", default_value_t = 20)]
    favor_percent: u32,

    /// Index fanout.
    #[arg(short = 'f', long = "fanout", default_value_t = 8)]
    fanout: u32,

    /// Set the space-fixup flag in the superblock.
    #[arg(short = 'F', long = "space-fixup")]
    space_fixup: bool,

    /// Directory-entry key hash: r5 or test.
    #[arg(short = 'k', long = "key-hash", value_name = "HASH", default_value = "r5")]
    key_hash: String,

    /// Number of orphan-area LEBs.
    #[arg(short = 'p', long = "orph-lebs", default_value_t = 1)]
    orph_lebs: u32,

    /// Number of log-area LEBs (0 = compute automatically).
    #[arg(short = 'l', long = "log-lebs", default_value_t = 0)]
    log_lebs: u32,

    /// Device table describing overlay nodes and attribute overrides.
    /// Parsing the device-table format is outside this crate's scope; this
    /// option is accepted but a device table currently has no effect.
    #[arg(short = 'D', long = "devtable", value_name = "FILE")]
    devtable: Option<PathBuf>,

    /// Squash all ownership to uid/gid 0.
    #[arg(short = 'U', long = "squash-owner")]
    squash_owner: bool,

    /// Synthesize a `user.image-inum` xattr recording each inode's number.
    #[arg(short = 'a', long = "set-inode-attr")]
    set_inode_attr: bool,

    /// SELinux label file. Out of scope: accepted but ignored.
    #[arg(short = 's', long = "selinux", value_name = "FILE")]
    selinux: Option<PathBuf>,

    /// fscrypt key file. Out of scope: accepted but ignored (no encryption
    /// backend ships in this crate; see `ufs_mkfs::crypto`).
    #[arg(short = 'K', long = "crypto-key", value_name = "FILE")]
    crypto_key: Option<PathBuf>,

    /// fscrypt key descriptor, hex-encoded. Out of scope: accepted but
    /// ignored.
    #[arg(short = 'b', long = "key-descriptor", value_name = "HEX")]
    key_descriptor: Option<String>,

    /// fscrypt filename-padding size: 4, 8, 16, or 32.
    #[arg(short = 'P', long = "padding", value_name = "N")]
    padding: Option<u32>,

    /// fscrypt cipher name. Out of scope: accepted but ignored.
    #[arg(short = 'C', long = "cipher", value_name = "NAME")]
    cipher: Option<String>,

    /// Digest algorithm for the optional superblock signature.
    #[arg(long = "hash-algo", value_name = "ALGO", default_value = "sha256")]
    hash_algo: String,

    /// Key material for signing the superblock. Supplying this turns
    /// authentication on; omitting it leaves the image unsigned.
    #[arg(long = "auth-key", value_name = "FILE")]
    auth_key: Option<PathBuf>,

    /// Certificate accompanying `--auth-key`. Out of scope: accepted but
    /// ignored (no certificate-chain validation ships in this crate).
    #[arg(long = "auth-cert", value_name = "FILE")]
    auth_cert: Option<PathBuf>,

    /// Assume yes to any interactive confirmation.
    #[arg(short = 'y', long = "yes")]
    assume_yes: bool,

    /// Verbose logging; repeat for more detail.
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("mkfs-ufs: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> ufs_mkfs::Result<()> {
    let target_path = cli.output.or(cli.target_pos).ok_or_else(|| {
        BuildError::InvalidOption("a target image path is required (positional or -o)".into())
    })?;

    if !cli.assume_yes && target_path.exists() {
        eprint!("{} already exists, overwrite? [y/N] ", target_path.display());
        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer).map_err(|e| BuildError::Io {
            path: target_path.clone(),
            source: e,
        })?;
        if !answer.trim().eq_ignore_ascii_case("y") {
            return Err(BuildError::InvalidOption("aborted by user".into()));
        }
    }

    if cli.devtable.is_some() {
        warn!("device table parsing is not implemented in this build; -D has no effect");
    }
    if cli.selinux.is_some() {
        warn!("selinux label files are not implemented in this build; -s has no effect");
    }
    if cli.crypto_key.is_some() || cli.key_descriptor.is_some() || cli.cipher.is_some() {
        warn!("fscrypt encryption is not implemented in this build; -K/-b/-C have no effect");
    }
    if let Some(padding) = cli.padding {
        if ![4, 8, 16, 32].contains(&padding) {
            return Err(BuildError::InvalidOption(format!(
                "padding must be one of 4, 8, 16, 32, got {padding}"
            )));
        }
        warn!("fscrypt encryption is not implemented in this build; -P has no effect");
    }
    if cli.auth_cert.is_some() {
        warn!("certificate-chain validation is not implemented in this build; --auth-cert has no effect");
    }

    let min_io_size = ufs_mkfs::config::parse_size(&cli.min_io_size)? as u32;
    let leb_size = ufs_mkfs::config::parse_size(&cli.leb_size)? as u32;
    let reserved = ufs_mkfs::config::parse_size(&cli.reserved)?;

    let mut cfg = Config::new(min_io_size, leb_size, cli.max_leb_cnt);
    cfg.fanout = cli.fanout;
    cfg.key_hash_type = KeyHashType::parse(&cli.key_hash)?;
    cfg.default_compr = CompressionAlgo::parse(&cli.compr)?;
    cfg.favor_percent = cli.favor_percent;
    cfg.rp_size = reserved;
    cfg.space_fixup = cli.space_fixup;
    cfg.squash_owner = cli.squash_owner;
    cfg.set_inode_attr = cli.set_inode_attr;
    cfg.orph_lebs = cli.orph_lebs;
    cfg.log_lebs = cli.log_lebs;
    cfg.hash_algo = HashAlgo::parse(&cli.hash_algo)?;
    if let Some(journal_size) = &cli.journal_size {
        cfg.max_bud_bytes = ufs_mkfs::config::parse_size(journal_size)?;
    }

    let mut builder = Builder::new(cfg)?
        .with_devtable(NullDeviceTable)
        .with_xattr_source(HostXattrSource {
            set_inode_attr: cli.set_inode_attr,
        });

    if let Some(key_path) = &cli.auth_key {
        let key = fs::read(key_path).map_err(|e| BuildError::Io {
            path: key_path.clone(),
            source: e,
        })?;
        let algo = HashAlgo::parse(&cli.hash_algo)?;
        builder = builder.with_signer(Sha2HmacSigner::new(key, algo));
    }

    let mut target = FileTarget::create(&target_path, leb_size)?;
    builder.build(&cli.root, &mut target)
}
