use thiserror::Error;

/// Failure of `Flow::run_script`. Carries the process exit status and
/// captured standard-error bytes, per spec §6's script transform protocol.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("failed to spawn script {path}: {source}")]
    Spawn { path: String, #[source] source: std::io::Error },

    #[error("script returned error code {code:?}")]
    ExitStatus { code: Option<i32>, errout: Vec<u8> },

    #[error("invalid response from script")]
    InvalidResponse { code: Option<i32>, errout: Vec<u8> },

    #[error("failed to communicate with script: {source}")]
    Io { #[source] source: std::io::Error },
}

impl ScriptError {
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ScriptError::ExitStatus { code, .. } | ScriptError::InvalidResponse { code, .. } => *code,
            _ => None,
        }
    }

    pub fn errout(&self) -> &[u8] {
        match self {
            ScriptError::ExitStatus { errout, .. } | ScriptError::InvalidResponse { errout, .. } => errout,
            _ => &[],
        }
    }
}
