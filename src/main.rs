use std::process::ExitCode;

fn main() -> ExitCode
{
	let args = deltaboot::command::parse();

	match deltaboot::command::run(args) {
		Ok(code) => code,
		Err(e) => {
			eprintln!("error: {e:#}");
			ExitCode::FAILURE
		},
	}
}
