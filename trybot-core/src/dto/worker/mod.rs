//! Worker coordinator DTOs
//!
//! Data transfer objects for the coordinator's worker lifecycle API.

use serde::{Deserialize, Serialize};

/// Request to allocate a worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateWorker {
    pub builder_type: String,
}

/// An allocated worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerInfo {
    /// Coordinator-assigned name, used in every further call
    pub name: String,
}

/// Request to extract a remote tarball into a worker directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutTarFromUrl {
    pub url: String,
    pub dir: String,
}

/// Worker work directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkDir {
    pub dir: String,
}

/// Request to run a command on a worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecRequest {
    /// Command path, relative to the work directory
    pub cmd: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment in `KEY=VALUE` form
    #[serde(default)]
    pub env: Vec<String>,
}

/// One line of the newline-delimited exec response stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecEvent {
    /// Combined stdout/stderr chunk
    Output(String),

    /// Command finished; `error` is set when it reported failure
    Exit { error: Option<String> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_event_wire_format() {
        let output: ExecEvent = serde_json::from_str(r#"{"output":"ok\n"}"#).unwrap();
        assert_eq!(output, ExecEvent::Output("ok\n".to_string()));

        let exit: ExecEvent = serde_json::from_str(r#"{"exit":{"error":null}}"#).unwrap();
        assert_eq!(exit, ExecEvent::Exit { error: None });

        let failed: ExecEvent =
            serde_json::from_str(r#"{"exit":{"error":"exit status 1"}}"#).unwrap();
        assert_eq!(
            failed,
            ExecEvent::Exit {
                error: Some("exit status 1".to_string())
            }
        );
    }
}
