#![doc = include_str!("../README.md")]

pub mod builder;
pub mod compress;
pub mod config;
pub mod crypto;
pub mod devtable;
pub mod error;
pub mod index;
pub mod key;
pub mod layout;
pub mod lprops;
pub mod lpt;
pub mod node;
pub mod target;
pub mod traverse;
pub mod write_head;
pub mod xattrs;

pub use builder::Builder;
pub use config::Config;
pub use error::{BuildError, Result};
pub use target::{FileTarget, MemTarget, Target};
