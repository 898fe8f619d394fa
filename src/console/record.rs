//! One discovered or persisted streaming console

use std::fmt;
use std::net::IpAddr;

/// Power/availability state as reported by discovery replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerState {
    #[default]
    Unknown,
    /// Online and streamable
    Ready,
    /// Online but sleeping; needs a wakeup packet before it can stream
    Standby,
    ShuttingDown,
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PowerState::Unknown => "unknown",
            PowerState::Ready => "ready",
            PowerState::Standby => "standby",
            PowerState::ShuttingDown => "shutting down",
        };
        f.write_str(s)
    }
}

/// Long-lived key obtained from a completed registration, used to
/// authenticate wakeup packets and session connects.
#[derive(Clone, PartialEq, Eq)]
pub struct RegistKey(pub [u8; 16]);

/// Symmetric session key obtained from a completed registration.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey(pub [u8; 16]);

// Keys are secrets: Debug never prints the bytes.
impl fmt::Debug for RegistKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RegistKey(<redacted>)")
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(<redacted>)")
    }
}

/// The credential triple written by one completed pairing exchange.
///
/// Either all three fields exist or none do; partial triples cannot be
/// represented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingCredentials {
    pub regist_key: RegistKey,
    pub session_key: SessionKey,
    pub key_type: u32,
}

/// Stream resolution preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolutionTier {
    P360,
    P540,
    #[default]
    P720,
    P1080,
}

impl ResolutionTier {
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            ResolutionTier::P360 => (640, 360),
            ResolutionTier::P540 => (960, 540),
            ResolutionTier::P720 => (1280, 720),
            ResolutionTier::P1080 => (1920, 1080),
        }
    }
}

/// Stream frame-rate preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FpsTier {
    F30,
    #[default]
    F60,
}

impl FpsTier {
    pub fn frames_per_second(self) -> u32 {
        match self {
            FpsTier::F30 => 30,
            FpsTier::F60 => 60,
        }
    }
}

/// Per-console media preferences.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MediaPrefs {
    pub resolution: ResolutionTier,
    pub fps: FpsTier,
    /// Optional platform performance-tuning value (e.g. a clock target),
    /// interpreted by the bootstrap layer.
    pub tuning: Option<u32>,
}

/// One known streaming console.
///
/// Created on first discovery reply or on load from the persisted store.
/// Power state is mutated only by the discovery listener; credentials only
/// by a completed pairing exchange. Mutators are `pub(crate)` so external
/// code observes but never edits a record.
#[derive(Debug, Clone)]
pub struct Console {
    name: String,
    addr: Option<IpAddr>,
    /// Stable hardware identifier reported by the console
    host_id: Option<String>,
    power_state: PowerState,
    discovered: bool,
    system_version: Option<u32>,
    protocol_version: Option<u32>,
    running_app: Option<String>,
    credentials: Option<PairingCredentials>,
    prefs: MediaPrefs,
}

impl Console {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            addr: None,
            host_id: None,
            power_state: PowerState::Unknown,
            discovered: false,
            system_version: None,
            protocol_version: None,
            running_app: None,
            credentials: None,
            prefs: MediaPrefs::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn addr(&self) -> Option<IpAddr> {
        self.addr
    }

    pub fn host_id(&self) -> Option<&str> {
        self.host_id.as_deref()
    }

    pub fn power_state(&self) -> PowerState {
        self.power_state
    }

    pub fn is_discovered(&self) -> bool {
        self.discovered
    }

    pub fn system_version(&self) -> Option<u32> {
        self.system_version
    }

    pub fn protocol_version(&self) -> Option<u32> {
        self.protocol_version
    }

    pub fn running_app(&self) -> Option<&str> {
        self.running_app.as_deref()
    }

    /// True iff a pairing exchange completed and stored the full credential
    /// triple.
    pub fn is_paired(&self) -> bool {
        self.credentials.is_some()
    }

    pub fn credentials(&self) -> Option<&PairingCredentials> {
        self.credentials.as_ref()
    }

    pub fn prefs(&self) -> MediaPrefs {
        self.prefs
    }

    pub fn set_prefs(&mut self, prefs: MediaPrefs) {
        self.prefs = prefs;
    }

    // -- mutation rights scoped to the owning subsystems --

    pub(crate) fn set_addr(&mut self, addr: IpAddr) {
        self.addr = Some(addr);
    }

    pub(crate) fn set_host_id(&mut self, host_id: String) {
        self.host_id = Some(host_id);
    }

    pub(crate) fn set_power_state(&mut self, state: PowerState) {
        self.power_state = state;
    }

    pub(crate) fn mark_discovered(&mut self) {
        self.discovered = true;
    }

    pub(crate) fn set_system_version(&mut self, version: u32) {
        self.system_version = Some(version);
    }

    pub(crate) fn set_protocol_version(&mut self, version: u32) {
        self.protocol_version = Some(version);
    }

    pub(crate) fn set_running_app(&mut self, app: String) {
        self.running_app = Some(app);
    }

    pub(crate) fn set_credentials(&mut self, credentials: PairingCredentials) {
        self.credentials = Some(credentials);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_never_prints_key_material() {
        let creds = PairingCredentials {
            regist_key: RegistKey([0xAB; 16]),
            session_key: SessionKey([0xCD; 16]),
            key_type: 2,
        };
        let dump = format!("{:?}", creds);
        assert!(dump.contains("<redacted>"));
        assert!(!dump.contains("ab"));
        assert!(!dump.contains("AB"));
        assert!(!dump.contains("171")); // 0xAB in decimal
    }

    #[test]
    fn pairing_flag_follows_credentials() {
        let mut console = Console::new("Living Room");
        assert!(!console.is_paired());

        console.set_credentials(PairingCredentials {
            regist_key: RegistKey([1; 16]),
            session_key: SessionKey([2; 16]),
            key_type: 0,
        });
        assert!(console.is_paired());
    }
}
