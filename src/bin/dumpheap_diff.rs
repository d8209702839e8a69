//! Compare three `dumpheap -stat` logs: a baseline, one before and one after a test scenario.
//! Produces two CSV files: before minus baseline, and after minus baseline.
use std::{collections::HashMap, path::{Path, PathBuf}};
use clap::Parser;
use dotenv::dotenv;
use log::*;
use anyhow::Result;
use leakdiag::{dumpheap, utility};

#[derive(Debug, Parser)]
#[command(author, version, about = "Subtract a baseline dumpheap log from a before and an after dumpheap log", long_about = None)]
struct Opts {
    /// Text file containing the baseline dumpheap output
    baseline: PathBuf,
    /// Text file containing the dumpheap output before the scenario
    before: PathBuf,
    /// Text file containing the dumpheap output after the scenario
    after: PathBuf,
    /// Directory for the CSV files, default the directory of each log
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
    /// Print the given number of types with the highest growth
    #[arg(short, long, default_value = "0")]
    top: usize,
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

    let (before_csv, after_csv) = dumpheap::diff_dumpheaps(&options.baseline, &options.before, &options.after, &output_dir, options.top)?;
    info!("written: {}, {}", before_csv.display(), after_csv.display());

    utility::dotenv_writer(options.write_dotenv, changed_options, Path::new(utility::DOTENV_FILE))?;
    Ok(())
}
