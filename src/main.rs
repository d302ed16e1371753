//! Arbiter binary crate.

use std::io::{self, Write};

use clap::Parser;
use fs_err as fs;

use arbiter::options::{CliOptions, SynthesisOptions};
use arbiter::synthesize_with;

fn main() {
    if let Err(error) = arbiter_main() {
        // discard the result as we cannot further propagate a write error
        let _ = writeln!(io::stderr(), "Error: {}", error);
        std::process::exit(1);
    }
}

/// Initializes the logging framework with the given level filter.
fn initialize_logging(level: log::LevelFilter) {
    let _ = env_logger::builder()
        .filter(None, level)
        .format_timestamp_millis()
        .try_init();
}

/// Parses the options, reads the input, runs the synthesis procedure and
/// writes the status and the controller.
fn arbiter_main() -> Result<(), Box<dyn std::error::Error>> {
    let options = CliOptions::parse();
    initialize_logging(options.log_level());

    // trim the proposition lists
    let ins: Vec<&str> = options
        .inputs
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    let outs: Vec<&str> = options
        .outputs
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();

    let ltl = if let Some(input_file) = &options.input_file {
        fs::read_to_string(input_file)?
    } else if let Some(formula) = &options.formula {
        formula.clone()
    } else {
        unreachable!()
    };

    let synthesis_options = SynthesisOptions::from(&options);
    let result = synthesize_with(ltl.trim(), &ins, &outs, &synthesis_options)?;

    writeln!(io::stdout(), "{}", result.status())?;
    if let Some(controller) = result.controller() {
        if let Some(output_file) = &options.output_file {
            let file = fs::File::create(output_file)?;
            controller.write(file, synthesis_options.output_format)?;
        } else {
            controller.write(io::stdout(), synthesis_options.output_format)?;
        }
    }
    Ok(())
}
