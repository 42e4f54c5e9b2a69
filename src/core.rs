//! The update pipeline: resolve logical paths, track runtime scratch
//! dirs, build seed archives, run the delta tool, unpack, and finalize.

mod resolver;
mod rtdirs;
mod archive;
mod download;
mod unpack;
mod finalize;

pub(crate) use resolver::PathResolver;
pub(crate) use rtdirs::RtDirs;
pub(crate) use archive::build_seed;
pub(crate) use download::download_module;
pub(crate) use unpack::unpack_module;
pub(crate) use finalize::{move_files, delete_obsolete, clean_transient, clean_archives};
