//! Fatal startup errors and their documented exit codes

use std::fmt;

/// Exit codes: 0 clean shutdown, 1 generic fatal, 2 invalid
/// configuration, 3 port conflict, 4 unusable install root.
#[derive(Debug)]
pub enum FatalError {
    Config(otad_errors::Error),
    PortInUse { port: u16, source: std::io::Error },
    InstallRoot { path: std::path::PathBuf },
    Runtime(otad_errors::Error),
}

impl FatalError {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Runtime(_) => 1,
            Self::Config(_) => 2,
            Self::PortInUse { .. } => 3,
            Self::InstallRoot { .. } => 4,
        }
    }
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "configuration error: {e}"),
            Self::PortInUse { port, source } => {
                write!(f, "cannot bind 127.0.0.1:{port}: {source}")
            }
            Self::InstallRoot { path } => {
                write!(f, "install root {} missing or not a directory", path.display())
            }
            Self::Runtime(e) => write!(f, "{e}"),
        }
    }
}

impl From<otad_errors::Error> for FatalError {
    fn from(e: otad_errors::Error) -> Self {
        Self::Runtime(e)
    }
}
