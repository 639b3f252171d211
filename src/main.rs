use std::env;
use std::ffi::OsStr;

use anyhow::Result;
use dotenv::dotenv;
use log::info;

use catalog::Fetcher;
use config::Config;

mod catalog;
mod config;
mod error;
mod filters;
mod logger;
mod tags;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenv().ok();

    let config = Config::from_env()?;
    logger::init(config.log_level)?;

    run(&config, env::var_os("PATH").as_deref()).await
}

async fn run(config: &Config, path_var: Option<&OsStr>) -> Result<()> {
    let fetcher = Fetcher::prepare(config.http_client, path_var)?;

    let catalog = fetcher.fetch(&config.catalog_url).await?;
    info!("fetched {} tags from {}", catalog.data.len(), config.catalog_url);

    filters::sync(&config.filters_path, &catalog, &config.targets)
}
