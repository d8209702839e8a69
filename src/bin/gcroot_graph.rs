//! Convert a `gcroot` log into a DGML graph.
use std::{collections::HashMap, path::{Path, PathBuf}};
use clap::Parser;
use dotenv::dotenv;
use log::*;
use anyhow::Result;
use leakdiag::{gcroots, utility};

#[derive(Debug, Parser)]
#[command(author, version, about = "Convert gcroot log to a DGML graph", long_about = None)]
struct Opts {
    /// Text file containing the gcroot log output
    path: PathBuf,
    /// Directory for the DGML file, default the directory of the log
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
    /// Write the output directory to .env for subsequent runs
    #[arg(long)]
    write_dotenv: bool,
}

fn main() -> Result<()>
{
    env_logger::init();
    dotenv().ok();
    let options = Opts::parse();

    let mut changed_options = HashMap::new();
    let output_dir = utility::set_output_dir(&options.output_dir, &mut changed_options);

    let dgml_file = gcroots::graph_gcroots(&options.path, &output_dir)?;
    info!("written: {}", dgml_file.display());

    utility::dotenv_writer(options.write_dotenv, changed_options, Path::new(utility::DOTENV_FILE))?;
    Ok(())
}
