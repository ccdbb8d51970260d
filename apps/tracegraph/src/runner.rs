// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The operations behind the CLI commands.

use anyhow::{anyhow, bail, Context, Result};
use std::path::Path;
use std::sync::PoisonError;
use std::time::{Duration, Instant};
use tracegraph_core::component_class::QueryOutcome;
use tracegraph_core::registry::{ComponentClassDefinition, ComponentClassKey};
use tracegraph_engine::{Engine, GraphDefinition, GraphRunStatus};

use crate::config::{Config, PluginConfig, RunConfig};

/// Creates an engine with the built-in classes plus every plugin found in the
/// configured directories.
///
/// # Errors
///
/// With `fail_on_load_error`, any directory or plugin that fails to load.
pub fn build_engine(config: &Config) -> Result<Engine> {
    let engine = Engine::with_config(config.graph.clone());
    load_plugin_dirs(&engine, &config.plugins)?;
    Ok(engine)
}

fn load_plugin_dirs(engine: &Engine, plugins: &PluginConfig) -> Result<()> {
    for dir in &plugins.directories {
        match engine.load_plugins_from_dir(Path::new(dir), plugins.recurse, plugins.fail_on_load_error) {
            Ok(count) => tracing::info!(dir = %dir, count, "Loaded plugins"),
            Err(e) if plugins.fail_on_load_error => return Err(e),
            Err(e) => tracing::warn!(dir = %dir, error = %e, "Skipping plugin directory"),
        }
    }
    Ok(())
}

/// Outcome of [`run_graph_file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Times the graph reported `Again` and the run was retried.
    pub retries: usize,
    pub elapsed: Duration,
}

/// Builds the graph described in the YAML file at `path` and runs it until
/// every sink ends, sleeping `run.retry_duration_us` whenever it reports
/// `Again`.
///
/// # Errors
///
/// Fails if the file cannot be read or parsed, if the graph cannot be
/// built, or if the run fails.
pub fn run_graph_file(engine: &Engine, path: &Path, run: &RunConfig) -> Result<RunSummary> {
    let definition = GraphDefinition::from_file(path)
        .with_context(|| format!("Cannot load graph definition '{}'", path.display()))?;
    let mut graph = engine.build_graph(&definition).context("Cannot build graph")?;

    let start = Instant::now();
    let retry = Duration::from_micros(run.retry_duration_us);
    let mut retries = 0;
    loop {
        match graph.run().context("Graph failed")? {
            GraphRunStatus::End => break,
            GraphRunStatus::Again if graph.is_interrupted() => bail!("Graph was interrupted"),
            GraphRunStatus::Again | GraphRunStatus::Ok => {
                retries += 1;
                tracing::debug!(retries, ?retry, "Graph asked to try again");
                std::thread::sleep(retry);
            },
        }
    }

    let summary = RunSummary { retries, elapsed: start.elapsed() };
    tracing::info!(
        graph = definition.name.as_deref().unwrap_or("<unnamed>"),
        retries = summary.retries,
        elapsed_ms = summary.elapsed.as_millis(),
        "Graph ended"
    );
    Ok(summary)
}

/// Every registered component class, sorted by key.
pub fn list_component_classes(engine: &Engine) -> Vec<ComponentClassDefinition> {
    let mut definitions =
        engine.registry.read().unwrap_or_else(PoisonError::into_inner).definitions();
    definitions.sort_by(|a, b| {
        (&a.plugin, a.class_type, &a.name).cmp(&(&b.plugin, b.class_type, &b.name))
    });
    definitions
}

/// Queries `class` (`TYPE.PLUGIN.NAME`) about `object`.
///
/// # Errors
///
/// Fails on a malformed class key, invalid JSON params, an unknown class or
/// object, or if the query method fails.
pub fn query(
    engine: &Engine,
    class: &str,
    object: &str,
    params: Option<&str>,
) -> Result<serde_json::Value> {
    let key: ComponentClassKey = class.parse().map_err(|e: String| anyhow!(e))?;
    let params = params
        .map(serde_json::from_str)
        .transpose()
        .context("Query parameters are not valid JSON")?;
    match engine.query(&key, object, params).with_context(|| format!("Query of `{key}` failed"))? {
        QueryOutcome::Result(value) => Ok(value),
        QueryOutcome::Again => bail!("Component class `{key}` asked to try the query again later"),
        QueryOutcome::UnknownObject => bail!("Component class `{key}` does not know object `{object}`"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tracegraph_core::ComponentClassType;

    fn engine() -> Engine {
        build_engine(&Config::default()).unwrap()
    }

    #[test]
    fn builtin_classes_are_listed_in_order() {
        let classes = list_component_classes(&engine());
        let names: Vec<_> = classes.iter().map(|c| (c.class_type, c.name.as_str())).collect();
        assert_eq!(
            names,
            [
                (ComponentClassType::Source, "generator"),
                (ComponentClassType::Filter, "muxer"),
                (ComponentClassType::Sink, "counter"),
                (ComponentClassType::Sink, "dummy"),
            ]
        );
    }

    #[test]
    fn runs_a_graph_file_to_the_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.yaml");
        std::fs::write(
            &path,
            r"
name: merge
components:
  gen-a:
    class: source.utils.generator
    params: { packets: 2 }
  gen-b:
    class: source.utils.generator
    params: { packets: 1, streams: 2 }
  mux:
    class: filter.utils.muxer
  count:
    class: sink.utils.counter
connections:
  - gen-a.out -> mux.in0
  - gen-b.out -> mux.in1
  - mux.out -> count.in
",
        )
        .unwrap();

        let summary = run_graph_file(&engine(), &path, &RunConfig::default()).unwrap();
        assert_eq!(summary.retries, 0);
    }

    #[test]
    fn unknown_class_fails_to_build() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.yaml");
        std::fs::write(&path, "components:\n  x:\n    class: sink.nope.nothing\n").unwrap();
        let err = run_graph_file(&engine(), &path, &RunConfig::default()).unwrap_err();
        assert!(format!("{err:#}").contains("sink.nope.nothing"), "{err:#}");
    }

    #[test]
    fn missing_plugin_directory_is_skipped_unless_strict() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.plugins.directories = vec![dir.path().join("absent").display().to_string()];
        assert!(build_engine(&config).is_ok());

        config.plugins.fail_on_load_error = true;
        assert!(build_engine(&config).is_err());
    }

    #[test]
    fn query_reports_outcomes() {
        let engine = engine();
        let params = query(&engine, "source.utils.generator", "supported-params", None).unwrap();
        assert!(params.is_object() || params.is_array());

        let err = query(&engine, "source.utils.generator", "nothing", None).unwrap_err();
        assert!(err.to_string().contains("does not know object"));
        assert!(query(&engine, "source.utils", "x", None).is_err());
        assert!(query(&engine, "source.utils.generator", "supported-params", Some("{")).is_err());
    }
}
