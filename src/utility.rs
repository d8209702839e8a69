//! Utilities
use log::*;
use std::{env, fs, collections::HashMap, io::Write, path::{Path, PathBuf}};
use anyhow::{Result, Context};

/// The environment variable (or `.env` entry) to set the output directory.
pub const OUTPUT_DIR_VARIABLE: &str = "LEAKDIAG_OUTPUT_DIR";

/// Determine the output directory.
///
/// The `--output-dir` switch wins, then `LEAKDIAG_OUTPUT_DIR` (which can be set via `.env`).
/// If neither is set, `None` is returned, and output files are written next to their input file.
pub fn set_output_dir(
    option: &Option<PathBuf>,
    changed_options: &mut HashMap<&str, String>,
) -> Option<PathBuf>
{
    match option {
        Some(output_dir) => {
            info!("output-dir argument set: using: {}", output_dir.display());
            changed_options.insert(OUTPUT_DIR_VARIABLE, output_dir.display().to_string());
            Some(output_dir.clone())
        },
        None => {
            match env::var(OUTPUT_DIR_VARIABLE) {
                Ok(set_var) => {
                    info!("output-dir not set: set via .env: {}: {}", OUTPUT_DIR_VARIABLE, set_var);
                    Some(PathBuf::from(set_var))
                },
                Err(_e) => {
                    info!("output-dir not set: and not set via .env: writing next to the input files");
                    None
                },
            }
        },
    }
}

/// The file the options are saved to with `--write-dotenv`, and read from by `dotenv()`.
pub const DOTENV_FILE: &str = ".env";

/// Save the options that were set on the command line to `dotenv_file`, so they are picked up by the next run.
/// The file is only written with `--write-dotenv`, and only if an option was set on the command line.
pub fn dotenv_writer(
    write_dotenv: bool,
    changed_options: HashMap<&str, String>,
    dotenv_file: &Path,
) -> Result<()>
{
    if changed_options.is_empty() || !write_dotenv
    {
        return Ok(());
    }
    info!("Writing {}", dotenv_file.display());
    let mut file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(dotenv_file)
        .with_context(|| format!("Error writing .env file: {}", dotenv_file.display()))?;

    let mut options: Vec<(&str, String)> = changed_options.into_iter().collect();
    options.sort();
    for (key, value) in options
    {
        writeln!(file, "{}={}", key, value)
            .with_context(|| format!("Error writing .env file: {}", dotenv_file.display()))?;
        info!("{}={}", key, value);
    }
    Ok(())
}

/// The output file for `input`: the file name of `input` with its extension replaced by `extension`.
///
/// The file goes into `output_dir` if set, otherwise into the directory of `input` (after resolving symlinks).
pub fn output_path(
    input: &Path,
    output_dir: &Option<PathBuf>,
    extension: &str,
) -> Result<PathBuf>
{
    let stem = input.file_stem()
        .with_context(|| format!("Cannot determine file name: {}", input.display()))?;
    let directory = match output_dir {
        Some(output_dir) => output_dir.clone(),
        None => {
            let input = fs::canonicalize(input)
                .with_context(|| format!("Cannot resolve path: {}", input.display()))?;
            input.parent()
                .with_context(|| format!("Cannot determine directory: {}", input.display()))?
                .to_path_buf()
        },
    };
    let mut filename = stem.to_os_string();
    filename.push(".");
    filename.push(extension);
    Ok(directory.join(filename))
}
