use std::process::ExitCode;
use anyhow::{Context, Result};
use colored::Colorize;
use luaupdate::config::{timeout_from_secs, Config};
use luaupdate::error::{UpdateError, EXIT_INSTALLED, EXIT_UP_TO_DATE};
use luaupdate::platform::Platform;
use luaupdate::release::GitHubReleaseHost;
use luaupdate::updater::{Outcome, Updater};
use crate::cli::CLI;

pub fn execute(cli: CLI) -> ExitCode {
    match execute_update(&cli) {
        Ok(outcome) => {
            report(&outcome, cli.quiet);
            match outcome {
                Outcome::UpToDate { .. } => ExitCode::from(EXIT_UP_TO_DATE),
                Outcome::Installed { .. } => ExitCode::from(EXIT_INSTALLED),
            }
        }
        Err(err) => {
            eprintln!("{} {:#}", "error:".red().bold(), err);
            let code = err
                .chain()
                .find_map(|cause| cause.downcast_ref::<UpdateError>())
                .map(UpdateError::exit_code)
                .unwrap_or(u8::MAX);
            ExitCode::from(code)
        }
    }
}

pub fn build_config(cli: &CLI) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref()).context("Could not load configuration")?;
    if let Some(cache_dir) = &cli.cache_dir {
        config.cache_dir = cache_dir.clone();
    }
    if let Some(install_dir) = &cli.install_dir {
        config.install_dir = Some(install_dir.clone());
    }
    if let Some(platform) = &cli.platform {
        config.platform = Some(Platform::from_name(platform));
    }
    if let Some(api_url) = &cli.api_url {
        config.api_url = api_url.clone();
    }
    if let Some(secs) = cli.timeout {
        config.timeout = timeout_from_secs(secs)?;
    }
    config.force = cli.force;
    Ok(config)
}

pub fn execute_update(cli: &CLI) -> Result<Outcome> {
    let config = build_config(cli)?;
    let host = GitHubReleaseHost::new(&config)?;
    let updater = Updater::new(&config, &host)?;
    log::info!("Selecting assets for {}", updater.platform());
    let outcome = updater
        .run()
        .with_context(|| format!("Update from {} failed", config.api_url))?;
    Ok(outcome)
}

fn report(outcome: &Outcome, quiet: bool) {
    if quiet {
        return;
    }
    match outcome {
        Outcome::UpToDate { version } => {
            println!("{} {}", "Already up to date:".yellow(), version);
        }
        Outcome::Installed {
            version,
            directory,
            files,
            from_cache,
            from_source,
        } => {
            println!(
                "{} luau {} into {}",
                "Installed".green().bold(),
                version,
                directory.display()
            );
            if *from_cache {
                println!("  using the cached download");
            }
            if *from_source {
                println!("  built from the source archive");
            }
            for file in files {
                println!("  {}", file.display());
            }
        }
    }
}
