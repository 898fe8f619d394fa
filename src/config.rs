//! Persisted console store
//!
//! The registry's durable counterpart: a TOML file with one table per
//! console carrying identity, pairing credentials (hex-encoded) and media
//! preferences. Loading seeds the registry; saving snapshots it. A record
//! with a partial credential triple loads as unpaired; the triple is only
//! ever meaningful as a whole.

use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::console::{
    FpsTier, MediaPrefs, PairingCredentials, RegistKey, ResolutionTier, SessionKey, SharedRegistry,
};
use crate::error::Error;

#[derive(Debug, Serialize, Deserialize)]
struct StoredConsole {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    addr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    host_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    regist_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    key_type: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    resolution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tuning: Option<u32>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredConfig {
    #[serde(default, rename = "console")]
    consoles: Vec<StoredConsole>,
}

/// File-backed console store.
pub struct ConsoleStore {
    path: PathBuf,
}

impl ConsoleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the platform's config location for this application.
    pub fn default_location() -> Result<Self, Error> {
        let dirs = ProjectDirs::from("", "", "lan-remote-play")
            .ok_or_else(|| Error::Config("no home directory for config storage".into()))?;
        Ok(Self::new(dirs.config_dir().join("consoles.toml")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Seed the registry from disk. A missing file is an empty store, not an
    /// error. Returns the number of records loaded.
    pub fn load(&self, registry: &SharedRegistry) -> Result<usize, Error> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let stored: StoredConfig =
            toml::from_str(&text).map_err(|e| Error::Config(e.to_string()))?;

        let mut registry = registry.lock();
        let mut loaded = 0;
        for record in stored.consoles {
            let console = registry.upsert(&record.name);
            if let Some(addr) = record.addr.as_deref() {
                match addr.parse::<IpAddr>() {
                    Ok(addr) => console.set_addr(addr),
                    Err(_) => warn!(console = record.name.as_str(), addr, "ignoring bad address"),
                }
            }
            if let Some(host_id) = record.host_id.clone() {
                console.set_host_id(host_id);
            }
            match credentials_from(&record) {
                Some(credentials) => console.set_credentials(credentials),
                None if record.regist_key.is_some()
                    || record.session_key.is_some()
                    || record.key_type.is_some() =>
                {
                    warn!(
                        console = record.name.as_str(),
                        "partial credential triple in store, treating as unpaired"
                    );
                }
                None => {}
            }
            console.set_prefs(prefs_from(&record));
            loaded += 1;
        }
        info!(loaded, path = %self.path.display(), "console store loaded");
        Ok(loaded)
    }

    /// Snapshot the registry to disk.
    pub fn save(&self, registry: &SharedRegistry) -> Result<(), Error> {
        let stored = {
            let registry = registry.lock();
            StoredConfig {
                consoles: registry.iter().map(stored_from).collect(),
            }
        };

        let text = toml::to_string_pretty(&stored).map_err(|e| Error::Config(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, text)?;
        info!(path = %self.path.display(), "console store saved");
        Ok(())
    }
}

fn stored_from(console: &crate::console::Console) -> StoredConsole {
    let prefs = console.prefs();
    StoredConsole {
        name: console.name().to_string(),
        addr: console.addr().map(|a| a.to_string()),
        host_id: console.host_id().map(str::to_string),
        regist_key: console.credentials().map(|c| encode_hex(&c.regist_key.0)),
        session_key: console.credentials().map(|c| encode_hex(&c.session_key.0)),
        key_type: console.credentials().map(|c| c.key_type),
        resolution: Some(resolution_name(prefs.resolution).to_string()),
        fps: Some(prefs.fps.frames_per_second()),
        tuning: prefs.tuning,
    }
}

fn credentials_from(record: &StoredConsole) -> Option<PairingCredentials> {
    let regist_key = decode_hex(record.regist_key.as_deref()?)?;
    let session_key = decode_hex(record.session_key.as_deref()?)?;
    let key_type = record.key_type?;
    Some(PairingCredentials {
        regist_key: RegistKey(regist_key),
        session_key: SessionKey(session_key),
        key_type,
    })
}

fn prefs_from(record: &StoredConsole) -> MediaPrefs {
    let resolution = match record.resolution.as_deref() {
        Some("360p") => ResolutionTier::P360,
        Some("540p") => ResolutionTier::P540,
        Some("1080p") => ResolutionTier::P1080,
        Some("720p") | None => ResolutionTier::default(),
        Some(other) => {
            warn!(resolution = other, "unknown resolution tier, using default");
            ResolutionTier::default()
        }
    };
    let fps = match record.fps {
        Some(30) => FpsTier::F30,
        Some(60) | None => FpsTier::default(),
        Some(other) => {
            warn!(fps = other, "unknown fps tier, using default");
            FpsTier::default()
        }
    };
    MediaPrefs {
        resolution,
        fps,
        tuning: record.tuning,
    }
}

fn resolution_name(tier: ResolutionTier) -> &'static str {
    match tier {
        ResolutionTier::P360 => "360p",
        ResolutionTier::P540 => "540p",
        ResolutionTier::P720 => "720p",
        ResolutionTier::P1080 => "1080p",
    }
}

fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn decode_hex(text: &str) -> Option<[u8; 16]> {
    if text.len() != 32 {
        return None;
    }
    let mut out = [0u8; 16];
    for (i, chunk) in text.as_bytes().chunks(2).enumerate() {
        let hi = (chunk[0] as char).to_digit(16)?;
        let lo = (chunk[1] as char).to_digit(16)?;
        out[i] = ((hi << 4) | lo) as u8;
    }
    Some(out)
}
