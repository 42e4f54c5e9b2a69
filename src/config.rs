//! Loading an optional config file and merging in command-line overrides.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use thiserror::Error;


#[derive(Debug)]
#[derive(derivative::Derivative)]
#[derivative(Default)]
pub struct Config
{
	/// Where to fetch the server manifest from.
	pub(crate) manifest_url: String,

	/// The installed application tree to update.
	#[derivative(Default(value="\".\".into()"))]
	pub(crate) base_dir: PathBuf,

	/// Where update scratch state (`current.json`, `<module>.update`,
	/// etc) lives. Defaults to `<base_dir>/update`.
	pub(crate) work_dir: Option<PathBuf>,

	/// Update even if installed and server versions already match.
	pub(crate) force: bool,

	/// Parallelism for the archive builder's file-scanning pass.
	#[derivative(Default(value="default_jobs()"))]
	pub(crate) jobs: u32,
}


/// Default `--jobs` value when neither a config file nor the CLI sets
/// one. The teacher's own `core/pool.rs::init_jobs` default for
/// CPU-ish work is "number of CPUs, capped at 6"; this follows the same
/// shape rather than a flat constant.
fn default_jobs() -> u32
{
	let ncpu = std::thread::available_parallelism()
			.map(|n| n.get() as u32)
			.unwrap_or(1);
	ncpu.min(6)
}


impl Config
{
	/// The scratch directory update state actually lives in.
	pub(crate) fn update_dir(&self) -> PathBuf
	{
		match &self.work_dir {
			Some(w) => w.clone(),
			None => self.base_dir.join("update"),
		}
	}
}


/// Problems loading config
#[derive(Debug)]
#[derive(Error)]
pub enum ConfigErr
{
	/// File I/O error of some sort
	#[error("Config file I/O error: {0}")]
	IO(#[from] std::io::Error),

	/// Syntax error in the config file
	#[error("Config file syntax error: {0}")]
	Syntax(String),
}


/// Load in the config, with appropriate overrides from command-line args
pub(crate) fn load_config_file(cfile: &Path, clargs: &crate::command::line::Args)
		-> Result<Config, ConfigErr>
{
	let conf = std::fs::read(cfile)?;
	load_config(&conf, clargs)
}


/// Parse the config, with appropriate overrides from command-line args
pub(crate) fn load_config(conf: &[u8], clargs: &crate::command::line::Args)
		-> Result<Config, ConfigErr>
{
	let mut conf = load(conf)?;

	macro_rules! or {
		( $fld:ident ) => {
			conf.$fld = match &clargs.$fld {
				Some(x) => x.clone(),
				None    => conf.$fld,
			};
		};
	}
	or!(manifest_url);
	or!(base_dir);
	or!(work_dir);
	or!(jobs);

	if clargs.force { conf.force = true; }

	Ok(conf)
}


/// Parse out a string of the config
fn load(conf: &[u8]) -> Result<Config, ConfigErr>
{
	let mut config = Config::default();

	for inline in conf.split(|c| *c == b'\n')
	{
		// Discard any parts past a comment
		let line = match inline.splitn(2, |c| *c == b'#').next() {
			Some(l) => l,
			None => continue,
		};

		// Split out into [param, value]; lines not matching that aren't
		// useful config.
		let [par, val] = {
			let mut it = line.splitn(2, |c| *c == b' ');
			let par = it.next();
			let val = it.next();
			match (par, val) {
				(Some(p), Some(v)) => [p, v],
				(_, _) => continue,
			}
		};

		let stringify = |bytes, ewhat| -> Result<String, ConfigErr> {
			Ok(std::str::from_utf8(bytes).map_err(|e| {
				ConfigErr::Syntax(format!("Error parsing {ewhat}: {e}"))
			})?.into())
		};
		let pathify = |bytes: &[u8]| -> PathBuf {
			let pvec = bytes.to_vec();
			use std::os::unix::ffi::OsStringExt;
			let pstr = OsString::from_vec(pvec);
			PathBuf::from(pstr)
		};
		let boolify = |bytes: &[u8]| -> Option<bool> {
			Some(match bytes {
				b"yes" => true,
				b"no"  => false,
				_      => None?,
			})
		};

		match par
		{
			b"ManifestUrl" => config.manifest_url = stringify(val, "ManifestUrl")?,
			b"BaseDir" => {
				if val.len() == 0 { continue }
				config.base_dir = pathify(val);
			},
			b"WorkDir" => {
				if val.len() == 0 { continue }
				config.work_dir = Some(pathify(val));
			},
			b"Force" => {
				config.force = boolify(val).ok_or_else(|| {
					ConfigErr::Syntax(format!("Bad Force value {}",
						String::from_utf8_lossy(val)))
				})?;
			},
			b"Jobs" => {
				let s = stringify(val, "Jobs")?;
				config.jobs = s.trim().parse().map_err(|_| {
					ConfigErr::Syntax(format!("Bad Jobs value {s}"))
				})?;
			},

			_ => continue,
		};
	}

	Ok(config)
}



#[cfg(test)]
mod tests
{
	use super::{load, load_config};

	const DEFCONF: &[u8] = br##"
# Where to fetch the server manifest from.
ManifestUrl https://updates.example.com/updates.json

# The installed tree to update.
BaseDir /opt/mygame

# Update scratch state lives here instead of <BaseDir>/update.
# WorkDir /var/tmp/mygame-update

# Update even when versions already match.
# Force no
"##;

	#[test]
	fn default_parse()
	{
		let conf = load(DEFCONF).unwrap();
		assert_eq!(conf.manifest_url, "https://updates.example.com/updates.json");
		assert_eq!(conf.base_dir, std::path::Path::new("/opt/mygame"));
		assert_eq!(conf.work_dir, None);
		assert_eq!(conf.force, false);
	}

	#[test]
	fn work_dir()
	{
		let cstr = b"WorkDir /var/tmp/foo";
		let conf = load(cstr).unwrap();
		assert_eq!(conf.work_dir, Some("/var/tmp/foo".into()));
	}

	#[test]
	fn force()
	{
		let cstr = b"Force yes";
		let conf = load(cstr).unwrap();
		assert_eq!(conf.force, true);
	}

	#[test]
	fn jobs()
	{
		let cstr = b"Jobs 8";
		let conf = load(cstr).unwrap();
		assert_eq!(conf.jobs, 8);
	}

	fn make_fake_clargs() -> crate::command::line::Args
	{
		crate::command::line::Args::default()
	}

	#[test]
	fn cli_override()
	{
		let mut args = make_fake_clargs();

		let conf = load_config(DEFCONF, &args).unwrap();
		assert_eq!(conf.base_dir, std::path::Path::new("/opt/mygame"));

		args.base_dir = Some("/opt/other".into());
		let conf = load_config(DEFCONF, &args).unwrap();
		assert_eq!(conf.base_dir, std::path::Path::new("/opt/other"));
	}

	#[test]
	fn cli_force_override()
	{
		let mut args = make_fake_clargs();
		args.force = true;
		let conf = load_config(DEFCONF, &args).unwrap();
		assert_eq!(conf.force, true);
	}

	#[test]
	fn cli_jobs_override()
	{
		let mut args = make_fake_clargs();
		args.jobs = Some(2);
		let conf = load_config(DEFCONF, &args).unwrap();
		assert_eq!(conf.jobs, 2);
	}
}
