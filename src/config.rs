// config.rs — Device configuration: memory budget, backend, hardware profile.
//
// Sources, in increasing priority:
//   1. Built-in defaults (`DeviceConfig::default()`).
//   2. A TOML file named by `GPU_IMGPROC_CONFIG`.
//   3. `GPU_IMGPROC_MEMORY_LIMIT` / `GPU_IMGPROC_BACKEND` overrides.
//
// Example file:
//
//   memory_limit = 268435456
//   backend = "wgpu"
//   profile = "raspberry-pi"

use std::fmt;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

pub const CONFIG_PATH_ENV: &str = "GPU_IMGPROC_CONFIG";
pub const MEMORY_LIMIT_ENV: &str = "GPU_IMGPROC_MEMORY_LIMIT";
pub const BACKEND_ENV: &str = "GPU_IMGPROC_BACKEND";

/// Default device memory budget: 1 GiB.
pub const DEFAULT_MEMORY_LIMIT: usize = 1 << 30;

/// Which backend holds device memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Device memory emulated in host RAM.
    #[default]
    Host,
    /// Real GPU storage buffers (requires the `gpu` feature).
    Wgpu,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Host => write!(f, "host"),
            BackendKind::Wgpu => write!(f, "wgpu"),
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "host" => Ok(BackendKind::Host),
            "wgpu" | "gpu" => Ok(BackendKind::Wgpu),
            other => Err(Error::Config(format!("unknown backend `{other}`"))),
        }
    }
}

/// Hardware profile for the wgpu backend.
///
/// `RaspberryPi` requests the lower limits of a VideoCore VI/VII so that
/// oversized buffers are rejected on a development machine too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceProfile {
    #[default]
    Native,
    RaspberryPi,
}

impl fmt::Display for DeviceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceProfile::Native => write!(f, "Native"),
            DeviceProfile::RaspberryPi => write!(f, "RaspberryPi (simulated limits)"),
        }
    }
}

/// Configuration for one `Device`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Upper bound on bytes held by live device buffers.
    pub memory_limit: usize,
    pub backend: BackendKind,
    pub profile: DeviceProfile,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            memory_limit: DEFAULT_MEMORY_LIMIT,
            backend: BackendKind::Host,
            profile: DeviceProfile::Native,
        }
    }
}

impl DeviceConfig {
    /// Host backend with the given budget.
    pub fn with_memory_limit(memory_limit: usize) -> Self {
        DeviceConfig {
            memory_limit,
            ..Default::default()
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Defaults, then the file named by `GPU_IMGPROC_CONFIG`, then the
    /// individual environment overrides.
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        if let Ok(limit) = std::env::var(MEMORY_LIMIT_ENV) {
            config.memory_limit = limit
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("{MEMORY_LIMIT_ENV}=`{limit}` is not a byte count")))?;
        }
        if let Ok(backend) = std::env::var(BACKEND_ENV) {
            config.backend = backend.parse()?;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = DeviceConfig::default();
        assert_eq!(c.memory_limit, DEFAULT_MEMORY_LIMIT);
        assert_eq!(c.backend, BackendKind::Host);
        assert_eq!(c.profile, DeviceProfile::Native);
    }

    #[test]
    fn test_toml_partial_uses_defaults() {
        let c = DeviceConfig::from_toml_str("memory_limit = 4096").unwrap();
        assert_eq!(c.memory_limit, 4096);
        assert_eq!(c.backend, BackendKind::Host);
    }

    #[test]
    fn test_toml_full() {
        let c = DeviceConfig::from_toml_str(
            "memory_limit = 1024\nbackend = \"wgpu\"\nprofile = \"raspberry-pi\"\n",
        )
        .unwrap();
        assert_eq!(c.backend, BackendKind::Wgpu);
        assert_eq!(c.profile, DeviceProfile::RaspberryPi);
    }

    #[test]
    fn test_toml_rejects_unknown_backend() {
        let err = DeviceConfig::from_toml_str("backend = \"cuda\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("HOST".parse::<BackendKind>().unwrap(), BackendKind::Host);
        assert_eq!("gpu".parse::<BackendKind>().unwrap(), BackendKind::Wgpu);
        assert!("metal".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = DeviceConfig::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
