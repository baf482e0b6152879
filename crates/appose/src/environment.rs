// SPDX-License-Identifier: MIT OR Apache-2.0
//! Environment: where a worker's interpreter and script files live, and how
//! to launch one as a [`crate::Service`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::ServiceError;
use crate::service::Service;

#[cfg(windows)]
const PATH_SEP: &str = ";";
#[cfg(not(windows))]
const PATH_SEP: &str = ":";

/// A self-contained runtime for a worker: a base directory, the
/// directories searched for the worker's interpreter/executable, extra
/// arguments always prepended to a launch, and extra environment
/// variables set on every spawned worker.
///
/// Immutable once constructed; building many [`Service`]s from the same
/// `Environment` is expected and cheap (`Clone`).
#[derive(Debug, Clone)]
pub struct Environment {
    base: PathBuf,
    bin_paths: Vec<PathBuf>,
    launch_args: Vec<String>,
    env_vars: BTreeMap<String, String>,
}

impl Environment {
    /// Build an environment from its four fields directly.
    pub fn new(
        base: impl Into<PathBuf>,
        bin_paths: Vec<PathBuf>,
        launch_args: Vec<String>,
        env_vars: BTreeMap<String, String>,
    ) -> Self {
        Self {
            base: base.into(),
            bin_paths,
            launch_args,
            env_vars,
        }
    }

    /// This environment's base directory.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Directories searched (in order) for a worker's interpreter or
    /// executable before falling back to the ambient `PATH`.
    pub fn bin_paths(&self) -> &[PathBuf] {
        &self.bin_paths
    }

    /// Arguments prepended to every worker's command line.
    pub fn launch_args(&self) -> &[String] {
        &self.launch_args
    }

    /// Extra environment variables set on every spawned worker.
    pub fn env_vars(&self) -> &BTreeMap<String, String> {
        &self.env_vars
    }

    /// Spawn a worker as a [`Service`].
    ///
    /// `worker_command` is the program name (or path) followed by its own
    /// arguments, e.g. `["python3", "worker.py"]`. The program is resolved
    /// against [`bin_paths`](Self::bin_paths) first, falling back to
    /// ordinary `PATH` lookup.
    ///
    /// The spawned child command line is `launchArgs + workerCommand`: when
    /// [`launch_args`](Self::launch_args) is non-empty, its first element
    /// becomes the spawned executable (e.g. `pixi`) and the resolved worker
    /// program is appended as one of its arguments, following the rest of
    /// `launch_args` — e.g. `launch_args = ["pixi", "run",
    /// "--manifest-path", "env.toml"]` plus `worker_command = ["python3",
    /// "worker.py"]` spawns `pixi run --manifest-path env.toml python3
    /// worker.py`. When `launch_args` is empty, the worker program itself is
    /// the spawned executable, as if `launch_args` were absent entirely.
    ///
    /// # Errors
    ///
    /// [`ServiceError::MissingPath`] if `base` or any `bin_paths` entry
    /// does not exist — checked here, at launch time, rather than at
    /// construction, so an `Environment` can be built before its
    /// filesystem layout is finalized.
    pub async fn service(
        &self,
        worker_command: impl Into<Vec<String>>,
    ) -> Result<Service, ServiceError> {
        if !self.base.exists() {
            return Err(ServiceError::MissingPath(self.base.clone()));
        }
        for bin_path in &self.bin_paths {
            if !bin_path.exists() {
                return Err(ServiceError::MissingPath(bin_path.clone()));
            }
        }

        let command = worker_command.into();
        let (program, worker_args) = command
            .split_first()
            .map(|(p, rest)| (p.clone(), rest.to_vec()))
            .unwrap_or_default();

        let program_path = self.resolve_binary(&program);

        let (spawn_program, args) = match self.launch_args.split_first() {
            Some((launch_program, launch_rest)) => {
                let mut args = launch_rest.to_vec();
                args.push(program_path.display().to_string());
                args.extend(worker_args);
                (PathBuf::from(launch_program), args)
            }
            None => (program_path, worker_args),
        };

        let path_env = self.rewritten_path();

        Service::spawn(self, &spawn_program, &args, &path_env).await
    }

    fn resolve_binary(&self, name: &str) -> PathBuf {
        for bin_path in &self.bin_paths {
            let candidate = bin_path.join(name);
            if candidate.is_file() {
                return candidate;
            }
        }
        PathBuf::from(name)
    }

    fn rewritten_path(&self) -> String {
        let prefix = self
            .bin_paths
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(PATH_SEP);
        match std::env::var("PATH") {
            Ok(existing) if !prefix.is_empty() => format!("{prefix}{PATH_SEP}{existing}"),
            Ok(existing) => existing,
            Err(_) => prefix,
        }
    }
}
