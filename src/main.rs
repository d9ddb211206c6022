// AP Provisioner - Main Entry Point
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! # AP Provisioner
//!
//! Turns a Linux single-board computer into a WiFi access point:
//! detects the wireless interface, writes hostapd/dnsmasq/dhcpcd
//! configuration, enables NAT towards the uplink, and starts and
//! verifies the services. Every run is recorded stage by stage so a
//! failure can be diagnosed (and rolled back) afterwards.

use std::process::ExitCode;

use clap::Parser;
use owo_colors::OwoColorize;

mod backup;
mod cli;
mod detect;
mod lockfile;
mod models;
mod nat;
mod network_utils;
mod orchestrator;
mod prompt;
mod render;
mod runner;
mod services;
mod wireless;

use cli::{Cli, Command, ProvisionArgs};
use models::config::ProvisionerSettings;
use models::error::Result;
use orchestrator::{Orchestrator, RunOptions};
use runner::SystemRunner;

/// Human-readable application name.
pub const APP_NAME: &str = "AP Provisioner";

/// Application version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging with appropriate level
    let log_level = if cli.global.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(log_level.into()),
        )
        .with_target(false)
        .init();

    tracing::debug!("Starting {} v{}", APP_NAME, VERSION);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            if let Some(diagnostics) = e.diagnostics() {
                eprintln!("{}", diagnostics.dimmed());
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let settings = ProvisionerSettings::load(cli.global.config.as_deref())?;
    let runner = SystemRunner;

    let command = cli
        .command
        .unwrap_or_else(|| Command::Provision(ProvisionArgs::default()));

    match command {
        Command::Provision(args) => provision(&runner, &settings, &cli.global, args),
        Command::Rollback => {
            if !prompt::confirm(
                "Restore the configuration files saved before the last run?",
                cli.global.yes,
            )? {
                println!("Aborted; nothing was changed.");
                return Ok(ExitCode::SUCCESS);
            }
            let orchestrator = Orchestrator::new(&runner, &settings, RunOptions::default());
            orchestrator.rollback()?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Status => {
            let orchestrator = Orchestrator::new(&runner, &settings, RunOptions::default());
            orchestrator.status()?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn provision(
    runner: &SystemRunner,
    settings: &ProvisionerSettings,
    global: &cli::GlobalOpts,
    args: ProvisionArgs,
) -> Result<ExitCode> {
    let mut input = args.to_input(settings);
    prompt::fill_missing(&mut input, global.yes)?;
    let config = input.validate()?;

    let options = RunOptions {
        require_root: !args.dry_run,
        rollback_on_failure: args.rollback_on_failure,
    };
    let orchestrator = Orchestrator::new(runner, settings, options);

    if args.dry_run {
        orchestrator.dry_run(config)?;
        return Ok(ExitCode::SUCCESS);
    }

    print_plan(&config);
    if !prompt::confirm("Provision this access point?", global.yes)? {
        println!("Aborted; nothing was changed.");
        return Ok(ExitCode::SUCCESS);
    }

    let report = orchestrator.provision(config)?;
    match report.status {
        models::StageStatus::Error => Ok(ExitCode::FAILURE),
        _ => Ok(ExitCode::SUCCESS),
    }
}

fn print_plan(config: &models::ApConfig) {
    println!();
    println!("{}", "Plan".bold());
    println!("  ssid:       {}", config.ssid());
    println!("  ap address: {}/24", config.ap_ip());
    println!(
        "  dhcp range: {} - {}",
        config.dhcp_start(),
        config.dhcp_end()
    );
    println!(
        "  channel:    {} (country {})",
        config.channel(),
        config.country_code()
    );
    match config.interface() {
        Some(interface) => println!("  interface:  {interface}"),
        None => println!("  interface:  auto-detect"),
    }
}
