// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

#![allow(clippy::expect_used, clippy::unwrap_used)]

use clap::Parser;
use figment::{
    providers::{Format, Serialized, Toml},
    Figment,
};
use std::path::PathBuf;
use tracegraph_runner::cli::{Cli, Commands};
use tracegraph_runner::config::{LogFormat, LogLevel, RunConfig};

fn samples_dir() -> PathBuf {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .parent()
        .and_then(|parent| parent.parent())
        .expect("tracegraph-runner should live under workspace_root/apps/tracegraph")
        .join("samples")
}

#[test]
fn samples_tracegraph_toml_parses_and_matches_expected_defaults() {
    let sample_path = samples_dir().join("tracegraph.toml");

    let figment = Figment::new().merge(Serialized::defaults(tracegraph_runner::Config::default()));
    let config: tracegraph_runner::Config = match figment.merge(Toml::file(&sample_path)).extract() {
        Ok(cfg) => cfg,
        Err(e) => panic!("samples/tracegraph.toml should parse as tracegraph_runner::Config: {e}"),
    };

    assert_eq!(config.log.console_level, LogLevel::Info);
    assert_eq!(config.log.file_format, LogFormat::Json);
    assert!(!config.log.file_enable);
    assert_eq!(config.plugins.directories, vec![".plugins".to_string()]);
    assert!(config.plugins.recurse);
    assert!(!config.plugins.fail_on_load_error);
    assert_eq!(config.graph, tracegraph_runner::Config::default().graph);
    assert_eq!(config.run.retry_duration_us, RunConfig::default().retry_duration_us);
}

#[test]
fn sample_merge_graph_runs_to_the_end() {
    let engine = tracegraph_runner::build_engine(&tracegraph_runner::Config::default()).unwrap();
    let summary = tracegraph_runner::run_graph_file(
        &engine,
        &samples_dir().join("graphs/merge.yaml"),
        &RunConfig::default(),
    )
    .unwrap();
    assert_eq!(summary.retries, 0);
}

#[test]
fn cli_parses_commands_and_global_plugin_paths() {
    let cli = Cli::try_parse_from([
        "tracegraph",
        "--plugin-path",
        "/opt/a",
        "query",
        "source.utils.generator",
        "supported-params",
        "--params",
        "{}",
        "--plugin-path",
        "/opt/b",
    ])
    .unwrap();
    assert_eq!(cli.config, "tracegraph.toml");
    assert_eq!(cli.plugin_paths, ["/opt/a", "/opt/b"]);
    let Commands::Query { class, object, params } = cli.command else {
        panic!("expected the query command");
    };
    assert_eq!(class, "source.utils.generator");
    assert_eq!(object, "supported-params");
    assert_eq!(params.as_deref(), Some("{}"));

    let cli = Cli::try_parse_from(["tracegraph", "-c", "other.toml", "run", "graph.yaml"]).unwrap();
    assert_eq!(cli.config, "other.toml");
    assert!(matches!(cli.command, Commands::Run { graph } if graph == PathBuf::from("graph.yaml")));

    assert!(Cli::try_parse_from(["tracegraph"]).is_err());
}
