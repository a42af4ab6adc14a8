// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use bitfield_gen::{Environment, Error, Mode, Options, Result, generate};
use clap::Parser;

/// Compiles bitfield specifications into C accessors, Rust accessors or
/// verification descriptors.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// The specification; standard input if absent.
    input: Option<PathBuf>,

    /// Where to write the output; standard output if absent.
    output: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t)]
    mode: Mode,

    #[arg(long, value_enum, default_value_t)]
    environment: Environment,

    /// Only emit functions named in these files.
    #[arg(long)]
    prune: Vec<PathBuf>,

    /// A toplevel heap type for pointer proof obligations.
    #[arg(long)]
    toplevel: Vec<String>,

    /// The type map relating toplevel types to the types they contain.
    #[arg(long)]
    umm_types: Option<PathBuf>,

    #[arg(long)]
    skip_modifies: bool,

    /// Leave every proof obligation unproved.
    #[arg(long = "sorry-lemmas")]
    sorry: bool,

    /// The file to name in the generated C preamble.
    #[arg(long)]
    from_file: Option<String>,

    /// Log the tag class table of each classed union.
    #[arg(long)]
    show_classes: bool,

    #[arg(long)]
    debug: bool,
}

impl Cli {
    fn init_logging(&self) {
        let level = if self.debug { "debug" } else { "warn" };
        let mut filter = level.to_string();
        if self.show_classes && !self.debug {
            filter.push_str(",bitfield_gen::union=info");
        }
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter))
            .format_timestamp(None)
            .init();
    }

    fn options(&self) -> Options {
        Options {
            mode: self.mode,
            env: self.environment,
            prune: self.prune.clone(),
            toplevel: self.toplevel.clone(),
            umm_types: self.umm_types.clone(),
            skip_modifies: self.skip_modifies,
            sorry: self.sorry,
            from_file: self.from_file.clone(),
            input: self.input.clone(),
            debug: self.debug,
        }
    }

    fn run(&self) -> Result<()> {
        let source = match &self.input {
            Some(path) => std::fs::read_to_string(path).map_err(|err| Error::io(path, err))?,
            None => {
                let mut source = String::new();
                std::io::stdin()
                    .read_to_string(&mut source)
                    .map_err(|err| Error::io("<stdin>", err))?;
                source
            }
        };

        let output = generate(&source, &self.options())?;

        match &self.output {
            Some(path) => std::fs::write(path, output).map_err(|err| Error::io(path, err)),
            None => std::io::stdout()
                .write_all(output.as_bytes())
                .map_err(|err| Error::io("<stdout>", err)),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    cli.init_logging();
    match cli.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
