use std::path::PathBuf;
use std::sync::Arc;

use futures::future;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::compiler::{CompileError, DiagramCompiler};

/// A diagram waiting to be compiled
#[derive(Debug, Clone)]
pub struct CompileJob {
    pub source: String,
    /// where the compiled image is written
    pub destination: PathBuf,
    /// where the code block lives, ex: `docs/guide.md(12)`
    pub location: String,
}

impl CompileJob {
    /// The first line of our source, for diagnostics
    pub fn snippet(&self) -> String {
        const MAX_SNIPPET_CHARS: usize = 60;

        let first_line = self.source.lines().next().unwrap_or_default().trim();
        if first_line.chars().count() > MAX_SNIPPET_CHARS {
            format!(
                "{}...",
                first_line.chars().take(MAX_SNIPPET_CHARS).collect::<String>()
            )
        } else {
            first_line.to_string()
        }
    }
}

/// Runs compile jobs on a tokio runtime, at most `max_concurrency` at a time
#[derive(Clone)]
pub struct CompileQueue {
    compiler: Arc<dyn DiagramCompiler>,
    permits: Arc<Semaphore>,
    runtime: Handle,
}

impl CompileQueue {
    pub fn new(compiler: Arc<dyn DiagramCompiler>, max_concurrency: usize, runtime: Handle) -> Self {
        Self {
            compiler,
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
            runtime,
        }
    }

    /// Start compiling in the background, the returned handle can be awaited or dropped
    pub fn submit(&self, job: CompileJob) -> CompileHandle {
        let compiler = self.compiler.clone();
        let permits = self.permits.clone();
        let CompileJob {
            source,
            destination,
            location,
        } = job.clone();

        let task = self.runtime.spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|e| CompileError::Aborted(e.to_string()))?;

            if let Some(parent) = destination.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            compiler.compile(&source, &destination).await?;
            log::debug!("{location}: Compiled {destination:?}");

            Ok::<(), CompileError>(())
        });

        CompileHandle {
            pending: vec![PendingDiagram { job, task }],
        }
    }
}

struct PendingDiagram {
    job: CompileJob,
    task: JoinHandle<Result<(), CompileError>>,
}

/// Compilations that are still in flight.
///
/// Either [`wait`](Self::wait) for them or [`detach`](Self::detach) them to let
/// them finish on their own.
#[derive(Default)]
#[must_use = "compilations are only observed by waiting on them or explicitly detaching them"]
pub struct CompileHandle {
    pending: Vec<PendingDiagram>,
}

impl CompileHandle {
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn merge(&mut self, other: CompileHandle) {
        self.pending.extend(other.pending);
    }

    /// Wait for every compilation to finish
    pub async fn wait(self) -> CompileReport {
        let (jobs, tasks): (Vec<_>, Vec<_>) = self
            .pending
            .into_iter()
            .map(|PendingDiagram { job, task }| (job, task))
            .unzip();

        let mut report = CompileReport::default();
        for (job, result) in jobs.into_iter().zip(future::join_all(tasks).await) {
            match result
                .map_err(|e| CompileError::Aborted(e.to_string()))
                .and_then(|r| r)
            {
                Ok(()) => report.compiled.push(job.destination),
                Err(error) => report.failures.push(CompileFailure {
                    snippet: job.snippet(),
                    location: job.location,
                    destination: job.destination,
                    error,
                }),
            }
        }

        report
    }

    /// Stop tracking our compilations, they keep running as long as the runtime does
    pub fn detach(self) {
        log::debug!("Detaching {} diagram compilations", self.pending.len());
    }
}

#[derive(Debug, Default)]
pub struct CompileReport {
    pub compiled: Vec<PathBuf>,
    pub failures: Vec<CompileFailure>,
}

impl CompileReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug)]
pub struct CompileFailure {
    pub location: String,
    pub destination: PathBuf,
    pub snippet: String,
    pub error: CompileError,
}
