//! Filesystem-related funcs.
//!
//! Atomic tempfile-then-rename writes, and umask-aware execute bit
//! handling, for laying files down into an existing installation without
//! ever leaving a half-written file at its final name.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use crate::util::FILE_BUFSZ;


/// Query the process umask without permanently changing it.
///
/// There's no way to just *read* the umask; the only syscall is
/// `umask(2)`, which also *sets* it.  So, same as the Python original
/// does (`os.umask(0); os.umask(old)`), we set it to 0, read back
/// whatever that returns (the previous value), then immediately put it
/// back.  This is racy against other threads twiddling the umask at the
/// same instant, but nothing in this process does that.
pub(crate) fn umask() -> u32
{
	unsafe {
		let cur = libc::umask(0);
		libc::umask(cur);
		cur as u32
	}
}


/// Should a file with this source mode come out executable, after
/// applying the umask?
///
/// Mirrors the Python original's `os.chmod(new_path, 0777 & ~umask)` for
/// xbit-flagged entries: we're not trying to reproduce an exact mode,
/// just "does the user bit one care about end up set".
pub(crate) fn want_xbit(src_mode: u32) -> bool
{
	let want = src_mode & 0o111;
	let allowed = 0o777 & !umask();
	(want & allowed) != 0
}


/// Write `data` to `dst`, atomically.
///
/// Writes into a tempfile in `dst`'s parent directory (so the final
/// `rename(2)` is same-filesystem and atomic), fsyncs it, then renames
/// onto `dst`.  If `xbit` is set, the execute bits are set on the
/// tempfile (umask-masked) before the rename.
pub(crate) fn write_atomic(dst: &Path, data: &[u8], xbit: bool)
		-> Result<(), io::Error>
{
	let dstdir = dst.parent().ok_or_else(|| {
			let ek = io::ErrorKind::NotFound;
			io::Error::new(ek, format!("No parent dir for {}??", dst.display()))
		})?;
	fs::create_dir_all(dstdir)?;

	let (tfh, tpath) = tempfile::Builder::new().tempfile_in(dstdir)?.keep()?;

	{
		let mut tbw = io::BufWriter::with_capacity(FILE_BUFSZ, &tfh);
		tbw.write_all(data)?;
		tbw.flush()?;
	}
	tfh.sync_data()?;

	if xbit { set_xbit(&tpath)?; }

	fs::rename(&tpath, dst)?;
	Ok(())
}


/// Copy from `src` (an open reader) into `dst`, atomically, the same way
/// [`write_atomic`] does but streaming instead of buffering the whole
/// payload in memory.
pub(crate) fn copy_atomic<R: io::Read>(src: &mut R, dst: &Path, xbit: bool)
		-> Result<(), io::Error>
{
	let dstdir = dst.parent().ok_or_else(|| {
			let ek = io::ErrorKind::NotFound;
			io::Error::new(ek, format!("No parent dir for {}??", dst.display()))
		})?;
	fs::create_dir_all(dstdir)?;

	let (tfh, tpath) = tempfile::Builder::new().tempfile_in(dstdir)?.keep()?;

	{
		let mut tbw = io::BufWriter::with_capacity(FILE_BUFSZ, &tfh);
		io::copy(src, &mut tbw)?;
		tbw.flush()?;
	}
	tfh.sync_data()?;

	if xbit { set_xbit(&tpath)?; }

	fs::rename(&tpath, dst)?;
	Ok(())
}


/// Set the execute bits (umask-masked) on a file that's already there.
pub(crate) fn set_xbit(f: &Path) -> Result<(), io::Error>
{
	use std::os::unix::fs::PermissionsExt as _;

	let allowed = 0o777 & !umask();
	let mode = 0o666 & allowed | (0o111 & allowed);
	let perms = fs::Permissions::from_mode(mode);
	fs::set_permissions(f, perms)
}


/// See if a path is a thing that seems to exist, without following
/// symlinks.
///
/// `Path::exists()` follows symlinks, so a dangling symlink "doesn't
/// exist" by its reckoning. For cleanup/overwrite decisions we want a
/// dangling symlink to still count as "something is there".
pub(crate) fn exists_no_follow(p: &Path) -> bool
{
	fs::symlink_metadata(p).is_ok()
}
