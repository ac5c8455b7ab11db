use crate::config::Config;
use crate::error::Error;
use clap::Args;

#[derive(Debug, Args)]
#[clap(about = "load a config file and print the parsed per-module flags")]
pub struct Command {
    #[clap(long, env, default_value = "config.toml")]
    config_file: String,
}

impl Command {
    pub async fn execute(self) -> Result<(), Error> {
        let config = Config::from_toml_file(self.config_file)?;
        tracing::info!("{:#?}", config.0);
        Ok(())
    }
}
