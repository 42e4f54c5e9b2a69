//! `clean`: remove transient update-directory artifacts, leaving the
//! installed snapshot (`current.json`) and session log untouched.

use crate::command::CmdArg;


pub(crate) fn run(carg: CmdArg) -> Result<(), anyhow::Error>
{
	let updatedir = carg.config.update_dir();

	if !updatedir.is_dir()
	{
		println!("No update directory present at {}.", updatedir.display());
		return Ok(());
	}

	let mut removed = 0usize;
	for entry in std::fs::read_dir(&updatedir)?
	{
		let entry = entry?;
		let path = entry.path();
		let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();

		let transient = name.ends_with(".update") || name.ends_with(".update.new")
				|| name.ends_with(".zsync");
		if !transient { continue; }

		std::fs::remove_file(&path)?;
		removed += 1;
	}

	if removed == 0
	{
		println!("No transient update state to clean.");
	}
	else
	{
		println!("Removed {removed} transient file{}.", crate::util::plural(removed));
	}

	Ok(())
}
