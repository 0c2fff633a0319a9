//! Instance discovery file.
//!
//! Training-side clients find a running engine by reading a JSON file at a
//! well-known per-volume path. The engine writes it once at startup.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Well-known path prefix; the volume name is appended after a dot.
pub const INSTANCE_CONFIG_PATH: &str = "/tmp/cube_torch.config";

/// Contents of the discovery file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstanceInfo {
    /// Port of the profiling/control HTTP listener.
    pub prof: u64,
    /// Mount point served by this engine.
    pub mount_point: String,
    /// IP clients should dial, empty when local-only.
    pub local_ip: String,
    /// Volume backing the mount.
    pub vol_name: String,
}

/// Write the discovery file for this instance, world-readable and
/// world-writable so any training process can manage it.
///
/// # Arguments
/// * `info` - Instance description to publish
pub(crate) fn write_instance_config(info: &InstanceInfo) -> Result<(), EngineError> {
    let path: String = format!("{}.{}", INSTANCE_CONFIG_PATH, info.vol_name);
    let bytes: Vec<u8> = serde_json::to_vec(info).map_err(|err| EngineError::BadInput {
        message: format!("instance config serialization: {}", err),
    })?;

    std::fs::write(&path, bytes).map_err(|err| EngineError::from_io(&path, err))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o666))
            .map_err(|err| EngineError::from_io(&path, err))?;
    }

    log::info!("wrote instance config to {}", path);
    Ok(())
}
