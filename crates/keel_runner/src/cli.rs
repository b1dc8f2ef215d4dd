//! CLI-based image builder supporting Docker and Podman.
//!
//! Shells out to the `docker` or `podman` binary. The runtime is detected
//! once at construction; dry-run mode logs each command instead of running it.

use std::path::Path;
use std::process::{Command, Stdio};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use keel_core::RunnerSettings;

use crate::builder::{image_reference, ImageBuilder, RegistryAuth};
use crate::error::{RunnerError, RunnerResult};

/// Container runtime type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerRuntime {
    Docker,
    Podman,
}

impl ContainerRuntime {
    /// Get the CLI command name.
    pub fn command(&self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Podman => "podman",
        }
    }
}

impl std::str::FromStr for ContainerRuntime {
    type Err = RunnerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "docker" => Ok(Self::Docker),
            "podman" => Ok(Self::Podman),
            other => Err(RunnerError::UnknownRuntime(other.to_string())),
        }
    }
}

impl std::fmt::Display for ContainerRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.command())
    }
}

/// CLI builder options.
#[derive(Debug, Clone, Default)]
pub struct DockerCliOptions {
    /// Preferred runtime (if not set, auto-detect)
    pub preferred_runtime: Option<ContainerRuntime>,
    /// Dry-run mode (log commands without executing)
    pub dry_run: bool,
}

impl DockerCliOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options from the `runner` section of the workspace configuration.
    pub fn from_settings(settings: &RunnerSettings) -> RunnerResult<Self> {
        let preferred_runtime = settings
            .runtime
            .as_deref()
            .map(str::parse::<ContainerRuntime>)
            .transpose()?;
        Ok(Self {
            preferred_runtime,
            dry_run: settings.dry_run,
        })
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    pub fn prefer_docker(mut self) -> Self {
        self.preferred_runtime = Some(ContainerRuntime::Docker);
        self
    }

    pub fn prefer_podman(mut self) -> Self {
        self.preferred_runtime = Some(ContainerRuntime::Podman);
        self
    }
}

/// Image builder driving the Docker or Podman CLI.
#[derive(Debug, Clone)]
pub struct DockerCli {
    runtime: ContainerRuntime,
    options: DockerCliOptions,
}

impl DockerCli {
    /// Create a builder with automatic runtime detection.
    pub fn new(options: DockerCliOptions) -> RunnerResult<Self> {
        let runtime = Self::detect_runtime(&options)?;
        info!("Using container runtime: {}", runtime);
        Ok(Self { runtime, options })
    }

    /// Create a builder with a specific runtime.
    pub fn with_runtime(runtime: ContainerRuntime, options: DockerCliOptions) -> Self {
        Self { runtime, options }
    }

    /// Detect available container runtime.
    pub fn detect_runtime(options: &DockerCliOptions) -> RunnerResult<ContainerRuntime> {
        if let Some(preferred) = options.preferred_runtime {
            if options.dry_run || Self::is_runtime_available(preferred) {
                return Ok(preferred);
            }
            warn!(
                "Preferred runtime {} not available, trying alternatives",
                preferred
            );
        }

        if options.dry_run {
            return Ok(ContainerRuntime::Docker);
        }

        if Self::is_runtime_available(ContainerRuntime::Docker) {
            return Ok(ContainerRuntime::Docker);
        }

        if Self::is_runtime_available(ContainerRuntime::Podman) {
            return Ok(ContainerRuntime::Podman);
        }

        Err(RunnerError::RuntimeNotAvailable(
            "Neither Docker nor Podman is available".to_string(),
        ))
    }

    fn is_runtime_available(runtime: ContainerRuntime) -> bool {
        Command::new(runtime.command())
            .arg("version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    pub fn runtime(&self) -> ContainerRuntime {
        self.runtime
    }

    pub fn is_dry_run(&self) -> bool {
        self.options.dry_run
    }

    fn build_args(&self, uri: &str, tag: &str, dockerfile_dir: &Path) -> Vec<String> {
        vec![
            "build".to_string(),
            "-t".to_string(),
            image_reference(uri, tag),
            dockerfile_dir.to_string_lossy().to_string(),
        ]
    }

    fn login_args(&self, uri: &str, auth: &RegistryAuth) -> Vec<String> {
        vec![
            "login".to_string(),
            "--username".to_string(),
            auth.username.clone(),
            "--password-stdin".to_string(),
            registry_host(uri).to_string(),
        ]
    }

    fn push_args(&self, uri: &str, tag: &str) -> Vec<String> {
        vec!["push".to_string(), image_reference(uri, tag)]
    }

    /// Format command for logging.
    fn format_command(&self, args: &[String]) -> String {
        let mut cmd = self.runtime.command().to_string();
        for arg in args {
            if arg.contains(' ') {
                cmd.push_str(&format!(" '{}'", arg));
            } else {
                cmd.push_str(&format!(" {}", arg));
            }
        }
        cmd
    }

    /// Run the runtime CLI, optionally feeding `stdin`. Returns stderr on failure.
    async fn execute(&self, args: &[String], stdin: Option<&str>) -> RunnerResult<Result<(), String>> {
        debug!("Executing: {}", self.format_command(args));

        let mut cmd = tokio::process::Command::new(self.runtime.command());
        cmd.args(args)
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn()?;
        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes()).await?;
            // Closing stdin lets the CLI read to end of input.
            drop(pipe);
        }

        let output = child.wait_with_output().await?;
        if output.status.success() {
            Ok(Ok(()))
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Ok(Err(if stderr.is_empty() {
                format!("exited with code {}", output.status.code().unwrap_or(-1))
            } else {
                stderr
            }))
        }
    }
}

/// Registry host part of a repository URI.
fn registry_host(uri: &str) -> &str {
    uri.split('/').next().unwrap_or(uri)
}

#[async_trait]
impl ImageBuilder for DockerCli {
    async fn build(&self, uri: &str, tag: &str, dockerfile_dir: &Path) -> RunnerResult<()> {
        let image = image_reference(uri, tag);
        let args = self.build_args(uri, tag, dockerfile_dir);
        info!("Building image {} from {:?}", image, dockerfile_dir);

        if self.options.dry_run {
            info!("[DRY-RUN] Would execute: {}", self.format_command(&args));
            return Ok(());
        }

        if !dockerfile_dir.is_dir() {
            return Err(RunnerError::MissingBuildContext(
                dockerfile_dir.to_string_lossy().to_string(),
            ));
        }

        self.execute(&args, None)
            .await?
            .map_err(|message| RunnerError::BuildFailed { image: image.clone(), message })?;
        info!("Successfully built image: {}", image);
        Ok(())
    }

    async fn login(&self, uri: &str, auth: &RegistryAuth) -> RunnerResult<()> {
        let registry = registry_host(uri).to_string();
        let args = self.login_args(uri, auth);
        info!("Logging in to registry {}", registry);

        if self.options.dry_run {
            info!("[DRY-RUN] Would execute: {}", self.format_command(&args));
            return Ok(());
        }

        self.execute(&args, Some(&auth.password))
            .await?
            .map_err(|message| RunnerError::LoginFailed { registry, message })
    }

    async fn push(&self, uri: &str, tag: &str) -> RunnerResult<()> {
        let image = image_reference(uri, tag);
        let args = self.push_args(uri, tag);
        info!("Pushing image {}", image);

        if self.options.dry_run {
            info!("[DRY-RUN] Would execute: {}", self.format_command(&args));
            return Ok(());
        }

        self.execute(&args, None)
            .await?
            .map_err(|message| RunnerError::PushFailed { image: image.clone(), message })?;
        info!("Successfully pushed image: {}", image);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const URI: &str = "1.dkr.ecr.us-west-2.amazonaws.com/shop/frontend";

    fn cli() -> DockerCli {
        DockerCli::with_runtime(ContainerRuntime::Docker, DockerCliOptions::new())
    }

    #[test]
    fn test_runtime_from_str() {
        assert_eq!("podman".parse::<ContainerRuntime>().unwrap(), ContainerRuntime::Podman);
        assert_eq!("Docker".parse::<ContainerRuntime>().unwrap(), ContainerRuntime::Docker);
        assert!(matches!(
            "containerd".parse::<ContainerRuntime>(),
            Err(RunnerError::UnknownRuntime(_))
        ));
    }

    #[test]
    fn test_options_from_settings() {
        let settings = RunnerSettings {
            runtime: Some("podman".to_string()),
            dry_run: true,
        };
        let options = DockerCliOptions::from_settings(&settings).unwrap();
        assert_eq!(options.preferred_runtime, Some(ContainerRuntime::Podman));
        assert!(options.dry_run);

        let options = DockerCliOptions::from_settings(&RunnerSettings::default()).unwrap();
        assert!(options.preferred_runtime.is_none());
    }

    #[test]
    fn test_dry_run_detection_skips_probe() {
        let options = DockerCliOptions::new().prefer_podman().dry_run();
        assert_eq!(DockerCli::detect_runtime(&options).unwrap(), ContainerRuntime::Podman);
    }

    #[test]
    fn test_build_args() {
        let args = cli().build_args(URI, "v1", &PathBuf::from("/src/frontend"));
        let image = format!("{}:v1", URI);
        assert_eq!(args, vec!["build", "-t", image.as_str(), "/src/frontend"]);
    }

    #[test]
    fn test_login_args_read_password_from_stdin() {
        let auth = RegistryAuth::new("AWS", "secret-token");
        let args = cli().login_args(URI, &auth);

        assert!(args.contains(&"--password-stdin".to_string()));
        assert_eq!(args.last().unwrap(), "1.dkr.ecr.us-west-2.amazonaws.com");
        assert!(!args.iter().any(|a| a.contains("secret-token")));
    }

    #[test]
    fn test_push_args() {
        assert_eq!(cli().push_args(URI, "v1"), vec!["push".to_string(), format!("{}:v1", URI)]);
    }

    #[tokio::test]
    async fn test_dry_run_executes_nothing() {
        let builder = DockerCli::with_runtime(ContainerRuntime::Podman, DockerCliOptions::new().dry_run());
        assert!(builder.is_dry_run());

        let missing = PathBuf::from("/definitely/not/here");
        builder.build(URI, "v1", &missing).await.unwrap();
        builder.login(URI, &RegistryAuth::new("AWS", "t")).await.unwrap();
        builder.push(URI, "v1").await.unwrap();
    }

    #[tokio::test]
    async fn test_build_requires_existing_directory() {
        let err = cli()
            .build(URI, "v1", &PathBuf::from("/definitely/not/here"))
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::MissingBuildContext(_)));
    }
}
