//! Molecular dynamics command-line interface
//!
//! Reads a YAML run file, runs the simulation and logs thermodynamic output.

use color_eyre::eyre::Result;

mod app;
mod args;
mod output;

use app::MdApplication;

fn main() -> Result<()> {
    color_eyre::install()?;
    MdApplication::from_cli()?.run()
}
