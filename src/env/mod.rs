//! Environment Builder (§4.3): materializes the mirror repository and the
//! content-addressed container image a Profile names. Both operations are
//! idempotent; `git`/`docker` are invoked as external processes rather than
//! reimplemented, since this crate's job is orchestration, not a second pack
//! codec.

use std::io::Read;
use std::path::Path;
use std::process::{Command, ExitStatus, Output, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::{EnvConfig, PipelineConfig};
use crate::errors::SmithError;
use crate::profile::RepoProfile;

/// A handle to a ready-to-validate environment: the mirror location and the
/// image name it was built into.
#[derive(Debug, Clone)]
pub struct EnvironmentHandle {
    pub mirror_name: String,
    pub image_name: String,
}

pub struct EnvironmentBuilder<'a> {
    env: &'a EnvConfig,
    config: &'a PipelineConfig,
    arch: String,
}

impl<'a> EnvironmentBuilder<'a> {
    pub fn new(env: &'a EnvConfig, config: &'a PipelineConfig) -> Self {
        Self {
            env,
            config,
            arch: std::env::consts::ARCH.to_string(),
        }
    }

    /// Ensures the mirror exists and the image is built, returning a handle
    /// carrying both names. Idempotent: a second call against an unchanged
    /// profile is a pair of cache hits.
    pub fn build(&self, profile: &RepoProfile, workspace: &Path) -> Result<EnvironmentHandle, SmithError> {
        let mirror_name = profile.mirror_name(&self.env.gh_org);
        let image_name = profile.image_name(&self.env.dh_org, &self.arch);

        self.ensure_mirror(profile, &mirror_name)?;
        self.ensure_image(profile, &image_name, workspace)?;

        Ok(EnvironmentHandle { mirror_name, image_name })
    }

    /// Clones over SSH first, falling back to HTTPS+token on failure. Push
    /// always goes over HTTPS+token regardless of clone transport (§4.3).
    fn ensure_mirror(&self, _profile: &RepoProfile, mirror_name: &str) -> Result<(), SmithError> {
        let ssh_url = format!("git@github.com:{mirror_name}.git");
        let https_url = format!(
            "https://{}@github.com/{mirror_name}.git",
            self.env.github_token
        );

        let ssh_result = self.run_git(&["ls-remote", &ssh_url], self.config.git_transport_timeout_secs);
        match ssh_result {
            Ok(output) if output.status.success() => {
                debug!(mirror = mirror_name, "mirror reachable over ssh");
                Ok(())
            }
            _ => {
                warn!(mirror = mirror_name, "ssh unreachable, falling back to https+token");
                let output = self.run_git(&["ls-remote", &https_url], self.config.git_transport_timeout_secs)?;
                if output.status.success() {
                    Ok(())
                } else {
                    Err(SmithError::BridgeUnreachable(format!(
                        "mirror `{mirror_name}` unreachable over both ssh and https"
                    )))
                }
            }
        }
    }

    /// Builds (or reuses a cached build of) the container image named
    /// `image_name`, keyed by a digest of the recipe text plus mirror commit.
    fn ensure_image(&self, profile: &RepoProfile, image_name: &str, workspace: &Path) -> Result<(), SmithError> {
        let cache_marker = self.config.cache_dir.join("image_cache").join(format!("{}.digest", sanitize(image_name)));
        let digest = recipe_digest(profile.container_recipe(), &profile.commit);

        if let Ok(existing) = std::fs::read_to_string(&cache_marker) {
            if existing.trim() == digest {
                debug!(image = image_name, "image build cache hit");
                return Ok(());
            }
        }

        let dockerfile_dir = workspace.join("logs/env_build").join(sanitize(image_name));
        std::fs::create_dir_all(&dockerfile_dir)?;
        std::fs::write(dockerfile_dir.join("Dockerfile"), profile.container_recipe())?;

        let output = self.run_docker(
            &["build", "-t", image_name, dockerfile_dir.to_string_lossy().as_ref()],
            self.config.container_start_timeout(),
        )?;
        if !output.status.success() {
            return Err(SmithError::BridgeUnreachable(format!(
                "docker build failed for `{image_name}`: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        if let Some(parent) = cache_marker.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&cache_marker, &digest)?;
        Ok(())
    }

    fn run_git(&self, args: &[&str], timeout_secs: u64) -> Result<Output, SmithError> {
        run_with_timeout(self.env, "git", args, Duration::from_secs(timeout_secs))
    }

    fn run_docker(&self, args: &[&str], timeout: Duration) -> Result<Output, SmithError> {
        run_with_timeout(self.env, "docker", args, timeout)
    }
}

/// Runs an external process, forwarding `env`'s proxy settings when set and
/// killing the child if it outlives `timeout`, mapping both spawn failure and
/// a timed-out child to a `Transport` error.
fn run_with_timeout(env: &EnvConfig, program: &str, args: &[&str], timeout: Duration) -> Result<Output, SmithError> {
    debug!(program, args = ?args, "spawning external process");

    let mut cmd = Command::new(program);
    cmd.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());
    if let Some(proxy) = &env.https_proxy {
        cmd.env("HTTPS_PROXY", proxy);
    }
    if let Some(no_proxy) = &env.no_proxy {
        cmd.env("NO_PROXY", no_proxy);
    }

    let mut child = cmd.spawn().map_err(|e| SmithError::Transport {
        endpoint: format!("{program} {}", args.join(" ")),
        source: Box::new(e),
    })?;

    let mut stdout_pipe = child.stdout.take().expect("stdout piped");
    let mut stderr_pipe = child.stderr.take().expect("stderr piped");
    let stdout_reader = std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stdout_pipe.read_to_end(&mut buf);
        buf
    });
    let stderr_reader = std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stderr_pipe.read_to_end(&mut buf);
        buf
    });

    let deadline = Instant::now() + timeout;
    let status: Option<ExitStatus> = loop {
        if let Some(status) = child.try_wait().map_err(|e| SmithError::Transport {
            endpoint: format!("{program} {}", args.join(" ")),
            source: Box::new(e),
        })? {
            break Some(status);
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            break None;
        }
        std::thread::sleep(Duration::from_millis(50));
    };

    let stdout = stdout_reader.join().unwrap_or_default();
    let stderr = stderr_reader.join().unwrap_or_default();

    let Some(status) = status else {
        return Err(SmithError::Transport {
            endpoint: format!("{program} {}", args.join(" ")),
            source: Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("timed out after {timeout:?}"),
            )),
        });
    };

    Ok(Output { status, stdout, stderr })
}

fn recipe_digest(recipe: &str, commit: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(recipe.as_bytes());
    hasher.update(commit.as_bytes());
    hex::encode(hasher.finalize())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect()
}
