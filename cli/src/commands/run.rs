//! `pushrun run`: converge a recipe or a single resource on remote targets.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::ports::{ArtifactSource, StatusSink};
use crate::application::services::config_service;
use crate::application::services::run::{RunDeps, RunRequest, run_converge};
use crate::domain::RunConfig;
use crate::infra::artifacts::MetadataArtifactSource;
use crate::infra::bundle::TarBundleBuilder;
use crate::infra::command_runner::TokioCommandRunner;
use crate::infra::ssh::{SshConnectionFactory, SshOptions};
use crate::output::{SilentReporter, SilentSink, TerminalSink};

/// Arguments for the run command.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Target(s): host, user@host:port, a comma-separated list, or ranges like web[01:10]
    pub target: String,

    /// Recipe file, cookbook directory, cookbook[::recipe], or a resource type
    pub subject: String,

    /// Resource name (resource mode)
    pub name: Option<String>,

    /// Resource properties as key=value
    pub properties: Vec<String>,

    /// User to connect as
    #[arg(short, long)]
    pub user: Option<String>,

    /// Port to connect to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// SSH identity file
    #[arg(short, long)]
    pub identity_file: Option<PathBuf>,

    /// Run privileged commands with sudo
    #[arg(long)]
    pub sudo: bool,

    /// Install or upgrade the agent when needed (default)
    #[arg(long, overrides_with = "no_install")]
    pub install: bool,

    /// Only check the installed agent; fail targets that do not meet the minimum
    #[arg(long, overrides_with = "install")]
    pub no_install: bool,

    /// Default protocol for targets without a scheme
    #[arg(long)]
    pub protocol: Option<String>,

    /// Directories searched for cookbook::recipe names
    #[arg(long, value_delimiter = ',')]
    pub cookbook_repo_paths: Vec<PathBuf>,
}

impl RunArgs {
    /// Overlay command-line flags on the file configuration.
    pub fn apply_to(&self, config: &mut RunConfig) {
        if let Some(user) = &self.user {
            config.connection.default_user = Some(user.clone());
        }
        if let Some(port) = self.port {
            config.connection.port = Some(port);
        }
        if let Some(identity) = &self.identity_file {
            config.connection.identity_file = Some(identity.clone());
        }
        if self.sudo {
            config.connection.sudo = true;
        }
        if self.install {
            config.agent.install = true;
        }
        if self.no_install {
            config.agent.install = false;
        }
        if let Some(protocol) = &self.protocol {
            config.connection.default_protocol.clone_from(protocol);
        }
        if !self.cookbook_repo_paths.is_empty() {
            config.chef.cookbook_repo_paths.clone_from(&self.cookbook_repo_paths);
        }
    }

    fn request(&self) -> RunRequest {
        RunRequest {
            targets: self.target.clone(),
            subject: self.subject.clone(),
            name: self.name.clone(),
            properties: self.properties.clone(),
        }
    }
}

/// Run `pushrun run`.
///
/// # Errors
///
/// Returns an error if configuration cannot be loaded or output cannot be
/// rendered. Run failures are rendered and reported through the exit code.
pub async fn run(args: &RunArgs, app: &AppContext) -> Result<ExitCode> {
    let mut config = config_service::load_config(&app.config_store)?;
    args.apply_to(&mut config);
    let config = config;

    let runner = Arc::new(TokioCommandRunner::new(None));
    let connections = SshConnectionFactory::new(SshOptions::from_config(&config.connection), runner);
    let cache_dir = match &config.cache.path {
        Some(path) => path.clone(),
        None => MetadataArtifactSource::default_cache_dir()?,
    };
    let artifacts: Arc<dyn ArtifactSource> =
        Arc::new(MetadataArtifactSource::new(&config.agent, cache_dir));
    let bundles = TarBundleBuilder::new(config.chef.cookbook_repo_paths.clone());
    let request = args.request();

    let result = if app.is_json() {
        let deps = RunDeps {
            connections: &connections,
            artifacts,
            bundles: &bundles,
            sink: Arc::new(SilentSink),
        };
        run_converge(&request, &config, deps, &SilentReporter).await
    } else {
        let sink: Arc<dyn StatusSink> = Arc::new(TerminalSink::new(&app.output));
        let deps = RunDeps {
            connections: &connections,
            artifacts,
            bundles: &bundles,
            sink,
        };
        run_converge(&request, &config, deps, &app.terminal_reporter()).await
    };

    let renderer = app.renderer();
    match result {
        Ok(report) => {
            renderer.render_report(&report)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            renderer.render_run_error(&err)?;
            Ok(ExitCode::FAILURE)
        }
    }
}
