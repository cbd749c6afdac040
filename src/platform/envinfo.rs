//! Environment and version metadata for `tlsmatrix env`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvInfo {
    pub os: String,
    pub arch: String,
    pub tlsmatrix: VersionInfo,
    pub config: crate::Config,
    /// Parameter types the catalog knows.
    #[serde(rename = "parameterTypes")]
    pub parameter_types: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_date: Option<String>,
}

pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        commit: option_env!("TLSMATRIX_COMMIT").map(|s| s.to_string()),
        build_date: option_env!("TLSMATRIX_BUILD_DATE").map(|s| s.to_string()),
    }
}

pub fn env_info(config: &crate::Config, catalog: &crate::ParameterCatalog) -> EnvInfo {
    EnvInfo {
        os: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        tlsmatrix: version_info(),
        config: config.clone(),
        parameter_types: catalog.specs().count(),
    }
}
