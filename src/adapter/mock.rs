//! Test doubles for the remote shell and the archive transfer.
//!
//! Both record what they were asked to do so orchestration tests can assert on
//! the exact side effects of a run.

use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    path::{Path, PathBuf},
    rc::Rc,
};

use crate::{
    adapter::{
        ssh::{CommandOutput, RemoteShell},
        transfer::ArchiveFetcher,
    },
    error::{LocalIoError, RemoteExecutionError},
};

/// Shell that answers commands from a queue of preset responses.
#[derive(Default)]
pub struct MockShell {
    responses: VecDeque<Result<CommandOutput, RemoteExecutionError>>,
    pub commands: Vec<String>,
    /// Shared so a test can still read it after the shell was moved away.
    pub closes: Rc<Cell<usize>>,
}

impl MockShell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful command printing `stdout`.
    pub fn then_stdout(mut self, stdout: &[u8]) -> Self {
        self.responses.push_back(Ok(CommandOutput {
            stdout: stdout.to_vec(),
            ..Default::default()
        }));
        self
    }

    pub fn then_exit(mut self, exit_status: i32, stderr: &str) -> Self {
        self.responses.push_back(Ok(CommandOutput {
            stderr: stderr.to_string(),
            exit_status,
            ..Default::default()
        }));
        self
    }

    pub fn then_error(mut self, error: RemoteExecutionError) -> Self {
        self.responses.push_back(Err(error));
        self
    }
}

impl RemoteShell for MockShell {
    fn execute(&mut self, command: &str) -> Result<CommandOutput, RemoteExecutionError> {
        self.commands.push(command.to_string());
        self.responses
            .pop_front()
            .unwrap_or_else(|| Ok(CommandOutput::default()))
    }

    fn close(&mut self) {
        self.closes.set(self.closes.get() + 1);
    }
}

/// Fetcher that writes fixed content instead of running scp.
pub struct FakeFetcher {
    content: Option<Vec<u8>>,
    pub fetched: RefCell<Vec<(String, PathBuf)>>,
}

impl FakeFetcher {
    pub fn writing(content: &[u8]) -> Self {
        Self {
            content: Some(content.to_vec()),
            fetched: RefCell::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            content: None,
            fetched: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.fetched.borrow().len()
    }
}

impl ArchiveFetcher for FakeFetcher {
    async fn fetch(&self, remote_path: &str, local_target: &Path) -> Result<(), LocalIoError> {
        self.fetched
            .borrow_mut()
            .push((remote_path.to_string(), local_target.to_path_buf()));

        match &self.content {
            Some(content) => std::fs::write(local_target, content).map_err(|source| {
                LocalIoError::Io {
                    operation: "write fake archive",
                    path: local_target.to_path_buf(),
                    source,
                }
            }),
            None => Err(LocalIoError::CopyFailed {
                status: "exit status: 1".into(),
                stderr: "scp: /tmp/certs.tar.gz: No such file or directory".into(),
            }),
        }
    }
}
