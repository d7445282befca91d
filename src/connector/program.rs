// Program connector: run a shell command line and take its stdout as agent output.

use std::process::Stdio;

use tokio::process::Command;

use crate::config::{HostConfig, ProgramSourceConfig};
use crate::error::FetchErrorKind;
use crate::models::RawFetchResult;

/// Exit code of `sh -c` when the command does not exist.
const EXIT_NOT_FOUND: i32 = 127;

/// Replace host macros in a command line.
pub fn substitute_macros(command: &str, host: &str, address: &str) -> String {
    command
        .replace("$HOSTNAME$", host)
        .replace("$HOSTADDRESS$", address)
        .replace("<HOST>", host)
        .replace("<IP>", address)
}

/// The child is killed (SIGKILL) when this future is dropped, e.g. on deadline.
pub async fn fetch(config: &ProgramSourceConfig, host: &HostConfig) -> RawFetchResult {
    let command_line = substitute_macros(&config.command, &host.name, host.address());
    let child = Command::new("/bin/sh")
        .arg("-c")
        .arg(&command_line)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();
    let child = match child {
        Ok(c) => c,
        Err(e) => {
            return RawFetchResult::failure(
                FetchErrorKind::SpawnFailed,
                format!("could not start {:?}: {}", command_line, e),
            );
        }
    };
    let output = match child.wait_with_output().await {
        Ok(o) => o,
        Err(e) => {
            return RawFetchResult::failure(
                FetchErrorKind::SpawnFailed,
                format!("waiting for {:?} failed: {}", command_line, e),
            );
        }
    };
    if output.status.success() {
        return RawFetchResult::success(output.stdout);
    }
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let message = match output.status.code() {
        Some(EXIT_NOT_FOUND) => format!("program not found: {}", stderr),
        Some(code) => format!("exited with code {}: {}", code, stderr),
        None => format!("terminated by signal: {}", stderr),
    };
    RawFetchResult::failure(FetchErrorKind::NonZeroExit, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn macros_are_substituted() {
        assert_eq!(
            substitute_macros("agent --host $HOSTNAME$ --ip <IP> <HOST> $HOSTADDRESS$", "web", "10.0.0.1"),
            "agent --host web --ip 10.0.0.1 web 10.0.0.1"
        );
    }
}
