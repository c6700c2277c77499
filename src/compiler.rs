use std::ffi::OsString;
use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::time::timeout;

use crate::config::D2Config;

/// Tells the compiler to read our diagram from stdin
const STDIN_ARGUMENT: &str = "-";

#[derive(Error, Debug)]
pub enum CompileError {
    #[error("Couldn't start {program:?}: {source}")]
    Spawn {
        program: OsString,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("Compiler exited with {}: {stderr}", code.map(|c| c.to_string()).unwrap_or_else(|| "a signal".to_string()))]
    Failed { code: Option<i32>, stderr: String },
    #[error("Compiler didn't finish within {0:?}")]
    Timeout(Duration),
    #[error("Compilation was aborted: {0}")]
    Aborted(String),
}

/// Something that turns diagram source into an image file
#[async_trait]
pub trait DiagramCompiler: Send + Sync {
    async fn compile(&self, source: &str, destination: &Path) -> Result<(), CompileError>;
}

/// Calls the d2 cli: `d2 [options] - <destination>` with our source on stdin
pub struct D2Cli {
    program: OsString,
    options: Vec<String>,
    timeout: Duration,
}

impl D2Cli {
    pub fn new<P: Into<OsString>>(program: P, options: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            options,
            timeout,
        }
    }

    pub fn from_config(config: &D2Config) -> Self {
        Self::new(
            &config.compiler,
            config.compiler_options.clone(),
            config.compile_timeout(),
        )
    }

    fn spawn(&self, destination: &Path) -> Result<Child, CompileError> {
        Command::new(&self.program)
            .args(&self.options)
            .arg(STDIN_ARGUMENT)
            .arg(destination)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CompileError::Spawn {
                program: self.program.clone(),
                source,
            })
    }
}

#[async_trait]
impl DiagramCompiler for D2Cli {
    async fn compile(&self, source: &str, destination: &Path) -> Result<(), CompileError> {
        let mut child = self.spawn(destination)?;

        let run = async move {
            if let Some(mut stdin) = child.stdin.take() {
                match stdin.write_all(source.as_bytes()).await {
                    // the compiler quit without reading everything, its exit status tells us why
                    Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                        log::debug!("Compiler closed stdin early: {e}");
                    }
                    Err(e) => return Err(e),
                    Ok(()) => {}
                }
            }

            child.wait_with_output().await
        };

        let output = timeout(self.timeout, run)
            .await
            .map_err(|_| CompileError::Timeout(self.timeout))??;

        if !output.stdout.is_empty() {
            log::trace!("{}", String::from_utf8_lossy(&output.stdout));
        }

        if output.status.success() {
            Ok(())
        } else {
            Err(CompileError::Failed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}
