//! Target platform identification.
//!
//! Release assets are named with the OS and architecture spellings used by
//! most release pipelines (`linux`, `darwin`, `windows`; `amd64`, `arm64`,
//! `386`, `arm`), so that is what [`Os`] and [`Arch`] render to.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Platform identifier combining OS and architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Platform {
    pub os: Os,
    pub arch: Arch,
}

impl Platform {
    /// Create a new platform.
    #[must_use]
    pub const fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// Get the platform this process is running on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Platform`] when the host OS or architecture has no
    /// release mapping.
    pub fn current() -> Result<Self> {
        Ok(Self {
            os: Os::current()?,
            arch: Arch::current()?,
        })
    }

    /// Parse from string like "linux-amd64".
    pub fn parse(s: &str) -> Option<Self> {
        let (os, arch) = s.split_once('-')?;
        Some(Self {
            os: Os::parse(os)?,
            arch: Arch::parse(arch)?,
        })
    }

    /// Suffix appended to executables on this platform.
    #[must_use]
    pub const fn executable_suffix(&self) -> &'static str {
        match self.os {
            Os::Windows => ".exe",
            Os::Linux | Os::Darwin => "",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.os, self.arch)
    }
}

/// Operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    Linux,
    Darwin,
    Windows,
}

impl Os {
    /// Get the current OS.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Platform`] for an OS without release builds.
    pub fn current() -> Result<Self> {
        Self::parse(std::env::consts::OS).ok_or_else(|| {
            Error::platform(format!("operating system '{}'", std::env::consts::OS))
        })
    }

    /// Parse from string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "linux" => Some(Self::Linux),
            "darwin" | "macos" => Some(Self::Darwin),
            "windows" | "win32" => Some(Self::Windows),
            _ => None,
        }
    }
}

impl std::fmt::Display for Os {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Linux => write!(f, "linux"),
            Self::Darwin => write!(f, "darwin"),
            Self::Windows => write!(f, "windows"),
        }
    }
}

/// CPU architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    Amd64,
    Arm64,
    X86,
    Arm,
}

impl Arch {
    /// Get the current architecture.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Platform`] for an architecture without release builds.
    pub fn current() -> Result<Self> {
        Self::parse(std::env::consts::ARCH).ok_or_else(|| {
            Error::platform(format!("architecture '{}'", std::env::consts::ARCH))
        })
    }

    /// Parse from string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "amd64" | "x86_64" | "x64" => Some(Self::Amd64),
            "arm64" | "aarch64" => Some(Self::Arm64),
            "386" | "x86" | "i386" | "i686" | "ia32" => Some(Self::X86),
            "arm" => Some(Self::Arm),
            _ => None,
        }
    }
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Amd64 => write!(f, "amd64"),
            Self::Arm64 => write!(f, "arm64"),
            Self::X86 => write!(f, "386"),
            Self::Arm => write!(f, "arm"),
        }
    }
}
