// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use clap::{Parser, Subcommand};
use schemars::schema_for;
use std::path::PathBuf;
use tracing::{error, info, warn};

use crate::{config, runner};

type LogInitFn = fn(
    &config::LogConfig,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>, Box<dyn std::error::Error>>;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "tracegraph.toml")]
    pub config: String,

    /// Additional plugin directory, scanned after the configured ones
    #[arg(long = "plugin-path", global = true)]
    pub plugin_paths: Vec<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Runs the graph described in a YAML file until every sink ends
    Run {
        /// Graph definition
        graph: PathBuf,
    },
    /// Lists the available component classes
    ListPlugins {
        /// Print JSON instead of one line per class
        #[arg(long)]
        json: bool,
    },
    /// Queries a component class and prints the JSON result
    Query {
        /// Component class as TYPE.PLUGIN.NAME
        class: String,
        /// Object to query
        object: String,
        /// Query parameters as a JSON document
        #[arg(short, long)]
        params: Option<String>,
    },
    /// Manage configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Generate a default config file and print it to stdout
    Default,
    /// Generate a JSON schema for the config and print it to stdout
    Schema,
}

/// Loads the configuration and initializes logging.
/// Exits the process with status code 1 on error.
#[allow(clippy::disallowed_macros)]
fn load_config(
    cli: &Cli,
    init_logging: LogInitFn,
) -> (config::Config, Option<tracing_appender::non_blocking::WorkerGuard>) {
    let config_result = match config::load(&cli.config) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        },
    };

    let log_guard = match init_logging(&config_result.config.log) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            std::process::exit(1);
        },
    };

    if let Some(missing_file) = &config_result.file_missing {
        info!(config_path = %missing_file, "Config file not found, using defaults");
    }

    let mut config = config_result.config;
    config.plugins.directories.extend(cli.plugin_paths.iter().cloned());
    (config, log_guard)
}

/// Runs `command` against a freshly built engine. Library handles are
/// released before returning so plugin exit callbacks run while the process
/// is intact.
fn with_engine(config: &config::Config, command: impl FnOnce(&tracegraph_engine::Engine) -> anyhow::Result<()>) -> bool {
    let result = runner::build_engine(config).and_then(|engine| command(&engine));
    let released = tracegraph_plugin_native::release_all_library_handles();
    tracing::debug!(released, "Released plugin libraries");
    match result {
        Ok(()) => true,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Command failed");
            false
        },
    }
}

#[allow(clippy::disallowed_macros)]
fn print_component_classes(engine: &tracegraph_engine::Engine, json: bool) -> anyhow::Result<()> {
    let classes = runner::list_component_classes(engine);
    if json {
        println!("{}", serde_json::to_string_pretty(&classes)?);
        return Ok(());
    }
    for class in classes {
        let key = format!("{}.{}.{}", class.class_type, class.plugin, class.name);
        match class.description {
            Some(description) => println!("{key:<32} {description}"),
            None => println!("{key}"),
        }
    }
    Ok(())
}

/// Handle the "config default" command - print default config to stdout
#[allow(clippy::disallowed_macros)]
fn handle_config_default_command() {
    match config::generate_default() {
        Ok(toml_string) => {
            println!("# Default tracegraph configuration file");
            println!("{toml_string}");
        },
        Err(e) => {
            eprintln!("Failed to generate default config: {e}");
            std::process::exit(1);
        },
    }
}

/// Handle the "config schema" command - print JSON schema to stdout
#[allow(clippy::disallowed_macros)]
fn handle_config_schema_command() {
    let schema = schema_for!(config::Config);
    match serde_json::to_string_pretty(&schema) {
        Ok(json) => {
            println!("{json}");
        },
        Err(e) => {
            eprintln!("Failed to generate config schema: {e}");
            std::process::exit(1);
        },
    }
}

/// Handle CLI commands. Exits with status code 1 when a command fails.
#[allow(clippy::disallowed_macros)]
pub fn handle_command(cli: &Cli, init_logging: LogInitFn) {
    let succeeded = match &cli.command {
        Commands::Config(ConfigCommands::Default) => {
            handle_config_default_command();
            true
        },
        Commands::Config(ConfigCommands::Schema) => {
            handle_config_schema_command();
            true
        },
        Commands::Run { graph } => {
            let (config, _log_guard) = load_config(cli, init_logging);
            info!(graph = %graph.display(), "Running graph");
            with_engine(&config, |engine| {
                runner::run_graph_file(engine, graph, &config.run).map(|_| ())
            })
        },
        Commands::ListPlugins { json } => {
            let (config, _log_guard) = load_config(cli, init_logging);
            with_engine(&config, |engine| print_component_classes(engine, *json))
        },
        Commands::Query { class, object, params } => {
            let (config, _log_guard) = load_config(cli, init_logging);
            with_engine(&config, |engine| {
                let result = runner::query(engine, class, object, params.as_deref())?;
                println!("{}", serde_json::to_string_pretty(&result)?);
                Ok(())
            })
        },
    };
    if !succeeded {
        warn!("Exiting with failure status");
        std::process::exit(1);
    }
}
