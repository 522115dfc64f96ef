use crate::args::Args;
use crate::output::{report_summary, setup_output};
use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use md::{MdConfig, Simulation, Units};
use std::fs;
use tracing::info;

pub struct MdApplication {
    args: Args,
    config: MdConfig,
}

impl MdApplication {
    pub fn from_cli() -> Result<Self> {
        let args = Args::parse();
        let config = load_config(&args)?;
        Ok(Self { args, config })
    }

    pub fn run(self) -> Result<()> {
        setup_output(self.args.output.as_ref());
        info!("Configuration loaded from: {}", self.args.config_file);

        let mut simulation = Simulation::from_config(&self.config, Units::natural())
            .wrap_err("Failed to set up the simulation")?;
        simulation.run().wrap_err("Simulation aborted")?;

        report_summary(simulation.thermo());
        Ok(())
    }
}

fn load_config(args: &Args) -> Result<MdConfig> {
    let config_content = fs::read_to_string(&args.config_file)
        .wrap_err_with(|| format!("Unable to read configuration file: {}", args.config_file))?;

    let mut config = serde_yml::from_str::<MdConfig>(&config_content)
        .wrap_err("Failed to parse configuration file")?;
    config.apply_overrides(args.steps, args.seed);
    config
        .validate()
        .wrap_err("Invalid configuration")?;

    Ok(config)
}
