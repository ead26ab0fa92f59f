//! Container lifecycle abstraction (§4.6): each validation task spawns a
//! private, fresh container from a read-only image (§5 "each task spawns a
//! private container with its own writable layer"). Grounded on the
//! `DockerExecutor`-shaped subprocess lifecycle seen in the retrieval pack's
//! SWE-bench scenario tooling.

use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::errors::SmithError;

/// Captured result of a subprocess run inside a container.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// The unit of isolation for one validation task. `apply_patch` and `run` both
/// operate against the named image; implementations own container start/stop
/// and timeout enforcement.
pub trait ContainerRuntime: Send + Sync {
    fn apply_patch(&self, image_name: &str, diff: &str) -> Result<(), SmithError>;
    fn run(&self, image_name: &str, command: &str, timeout_secs: u64) -> Result<ProcessOutput, SmithError>;
}

/// Shells out to the `docker` CLI. Each call is a fresh `docker run --rm`
/// invocation; no container is reused across candidates. Carries the proxy
/// settings forwarded to every container it spawns (§6 "forwarded to
/// containers").
pub struct DockerCli {
    https_proxy: Option<String>,
    no_proxy: Option<String>,
}

impl DockerCli {
    pub fn new(https_proxy: Option<String>, no_proxy: Option<String>) -> Self {
        Self { https_proxy, no_proxy }
    }

    fn apply_proxy_env(&self, cmd: &mut Command) {
        if let Some(proxy) = &self.https_proxy {
            cmd.env("HTTPS_PROXY", proxy);
        }
        if let Some(no_proxy) = &self.no_proxy {
            cmd.env("NO_PROXY", no_proxy);
        }
    }
}

impl ContainerRuntime for DockerCli {
    fn apply_patch(&self, image_name: &str, diff: &str) -> Result<(), SmithError> {
        let mut cmd = Command::new("docker");
        cmd.args(["run", "--rm", "-i", image_name, "git", "apply", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        self.apply_proxy_env(&mut cmd);

        let mut child = cmd.spawn().map_err(|e| SmithError::Transport {
            endpoint: format!("docker run {image_name} git apply"),
            source: Box::new(e),
        })?;
        child
            .stdin
            .take()
            .expect("stdin piped")
            .write_all(diff.as_bytes())
            .map_err(|e| SmithError::Transport {
                endpoint: format!("docker run {image_name} git apply"),
                source: Box::new(e),
            })?;
        let output = child.wait_with_output().map_err(|e| SmithError::Transport {
            endpoint: format!("docker run {image_name} git apply"),
            source: Box::new(e),
        })?;

        if !output.status.success() {
            return Err(SmithError::ApplyFailed(
                image_name.to_string(),
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }
        Ok(())
    }

    fn run(&self, image_name: &str, command: &str, timeout_secs: u64) -> Result<ProcessOutput, SmithError> {
        let mut cmd = Command::new("docker");
        cmd.args(["run", "--rm", image_name, "sh", "-c", command])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        self.apply_proxy_env(&mut cmd);

        let mut child = cmd.spawn().map_err(|e| SmithError::Transport {
            endpoint: format!("docker run {image_name}"),
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

        let deadline = Instant::now() + Duration::from_secs(timeout_secs);
        let status = loop {
            if let Some(status) = child.try_wait().map_err(|e| SmithError::Transport {
                endpoint: format!("docker run {image_name}"),
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
            return Err(SmithError::HarnessCrash(
                -1,
                format!("`docker run {image_name}` exceeded its {timeout_secs}s timeout"),
            ));
        };

        let exit_code = status.code().unwrap_or(-1);
        if exit_code != 0 && stdout.is_empty() && stderr.is_empty() {
            return Err(SmithError::HarnessCrash(exit_code, "no output produced".to_string()));
        }

        Ok(ProcessOutput {
            stdout: String::from_utf8_lossy(&stdout).to_string(),
            stderr: String::from_utf8_lossy(&stderr).to_string(),
            exit_code,
        })
    }
}
