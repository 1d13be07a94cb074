use std::{
    io::{self, Read},
    thread,
    time::{Duration, Instant},
};

use ssh2::{ErrorCode, Session};

use crate::{error::RemoteExecutionError, util::indent_str};

// LIBSSH2_ERROR_TIMEOUT
const SESSION_TIMEOUT: i32 = -9;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: String,
    pub exit_status: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Turns a non-zero exit status into an error.
    pub fn checked(self, command: &str) -> Result<Self, RemoteExecutionError> {
        if self.success() {
            Ok(self)
        } else {
            Err(RemoteExecutionError::NonZeroExit {
                command: command.to_string(),
                status: self.exit_status,
                stderr: self.stderr,
            })
        }
    }
}

pub(super) fn execute(session: &Session, line: &str) -> Result<CommandOutput, RemoteExecutionError> {
    let channel_error = |source: ssh2::Error| {
        if matches!(source.code(), ErrorCode::Session(SESSION_TIMEOUT)) {
            RemoteExecutionError::Timeout {
                command: line.to_string(),
            }
        } else {
            RemoteExecutionError::Channel {
                command: line.to_string(),
                source,
            }
        }
    };
    let read_error = |source: io::Error| {
        if source.kind() == io::ErrorKind::TimedOut {
            RemoteExecutionError::Timeout {
                command: line.to_string(),
            }
        } else {
            RemoteExecutionError::Read {
                command: line.to_string(),
                source,
            }
        }
    };

    tracing::debug!(command = line, "executing remote command");

    let mut channel = session.channel_session().map_err(channel_error)?;
    channel.exec(line).map_err(channel_error)?;

    let timeout = match session.timeout() {
        0 => None,
        millis => Some(Duration::from_millis(u64::from(millis))),
    };
    session.set_blocking(false);
    let streams = drain(
        &mut channel.stream(0),
        &mut channel.stderr(),
        || channel.eof(),
        timeout,
    );
    session.set_blocking(true);
    let (stdout, stderr) = streams.map_err(read_error)?;
    let stderr = String::from_utf8_lossy(&stderr).into_owned();

    channel.wait_close().map_err(channel_error)?;
    let exit_status = channel.exit_status().map_err(channel_error)?;

    let output = CommandOutput {
        stdout,
        stderr,
        exit_status,
    };

    tracing::debug!(
        command = line,
        exit_status,
        "remote command finished\n{}",
        indent_str(&output.stdout_lossy(), 2)
    );
    if !output.stderr.is_empty() {
        tracing::debug!(command = line, "stderr\n{}", indent_str(&output.stderr, 2));
    }

    Ok(output)
}

/// Reads both streams in turns until `eof` and a pass that yields nothing.
///
/// The streams share one channel window, so reading stdout to the end first
/// stalls a command that writes a lot to stderr.
fn drain<O: Read, E: Read>(
    stdout: &mut O,
    stderr: &mut E,
    eof: impl Fn() -> bool,
    timeout: Option<Duration>,
) -> io::Result<(Vec<u8>, Vec<u8>)> {
    let deadline = timeout.map(|timeout| Instant::now() + timeout);
    let mut buf = [0u8; 8192];
    let mut out = Vec::new();
    let mut err = Vec::new();

    loop {
        let finished = eof();
        let mut progressed = false;
        for (stream, sink) in [
            (&mut *stdout as &mut dyn Read, &mut out),
            (&mut *stderr as &mut dyn Read, &mut err),
        ] {
            match stream.read(&mut buf) {
                Ok(0) => {}
                Ok(n) => {
                    sink.extend_from_slice(&buf[..n]);
                    progressed = true;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(e),
            }
        }

        if progressed {
            continue;
        }
        if finished {
            return Ok((out, err));
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(io::ErrorKind::TimedOut.into());
        }
        thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, collections::VecDeque, rc::Rc};

    use super::*;

    /// Hands out queued chunks, then `WouldBlock` until `open` is set, then EOF.
    struct Scripted {
        chunks: VecDeque<Vec<u8>>,
        open: Rc<Cell<bool>>,
        drained: Option<Rc<Cell<bool>>>,
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if !self.open.get() {
                return Err(io::ErrorKind::WouldBlock.into());
            }
            match self.chunks.pop_front() {
                Some(chunk) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                None => {
                    if let Some(drained) = &self.drained {
                        drained.set(true);
                    }
                    Ok(0)
                }
            }
        }
    }

    #[test]
    fn stdout_waiting_on_stderr_does_not_stall() {
        let stderr_drained = Rc::new(Cell::new(false));
        let mut stdout = Scripted {
            chunks: VecDeque::from([b"letsencrypt/\n".to_vec()]),
            open: stderr_drained.clone(),
            drained: None,
        };
        let mut stderr = Scripted {
            chunks: (0..64).map(|_| vec![b'w'; 4096]).collect(),
            open: Rc::new(Cell::new(true)),
            drained: Some(stderr_drained.clone()),
        };

        let (out, err) = drain(
            &mut stdout,
            &mut stderr,
            || stderr_drained.get(),
            Some(Duration::from_secs(5)),
        )
        .unwrap();

        assert_eq!(out, b"letsencrypt/\n");
        assert_eq!(err.len(), 64 * 4096);
    }

    #[test]
    fn silent_command_times_out() {
        let closed = Rc::new(Cell::new(false));
        let mut stdout = Scripted {
            chunks: VecDeque::new(),
            open: closed.clone(),
            drained: None,
        };
        let mut stderr = Scripted {
            chunks: VecDeque::new(),
            open: closed.clone(),
            drained: None,
        };

        let err = drain(
            &mut stdout,
            &mut stderr,
            || false,
            Some(Duration::from_millis(50)),
        )
        .unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn checked_passes_successful_output() {
        let output = CommandOutput {
            stdout: b"ok".to_vec(),
            ..Default::default()
        };

        assert_eq!(output.checked("true").unwrap().stdout_lossy(), "ok");
    }

    #[test]
    fn checked_rejects_non_zero_exit() {
        let output = CommandOutput {
            stderr: "permission denied".into(),
            exit_status: 2,
            ..Default::default()
        };

        match output.checked("sudo tar").unwrap_err() {
            RemoteExecutionError::NonZeroExit {
                command,
                status,
                stderr,
            } => {
                assert_eq!(command, "sudo tar");
                assert_eq!(status, 2);
                assert_eq!(stderr, "permission denied");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
