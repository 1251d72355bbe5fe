use ember::cli::*;
use palc::Parser;

fn main() {
	let engine = ember::Ember::new();

	match Cli::parse().mode {
		Mode::File { path } => {
			if let Err(e) = engine.run_file(&path) {
				eprintln!("Failed run file: {e}");
			}
		}
		Mode::Repl => engine.run_prompt(),
	}
}
