//! Discovery datagram encoding and parsing
//!
//! Requests are a command line followed by `key:value` lines; replies are a
//! status line followed by `key:value` lines. Any reply field may be absent:
//! absence means "unchanged", not "cleared".

use std::net::IpAddr;

use bytes::Bytes;

use crate::console::PowerState;
use crate::error::DiscoveryError;

/// Protocol version announced in our requests.
pub const PROTOCOL_VERSION: &str = "00030010";

/// Reply status codes and the power state they map to.
const STATUS_READY: u32 = 200;
const STATUS_STANDBY: u32 = 620;
const STATUS_SHUTTING_DOWN: u32 = 640;

/// One parsed discovery reply.
///
/// `addr` is filled from the datagram's source address by the listener, not
/// from the payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReply {
    pub power_state: PowerState,
    pub addr: Option<IpAddr>,
    pub host_name: Option<String>,
    pub host_id: Option<String>,
    pub host_type: Option<String>,
    pub system_version: Option<u32>,
    pub protocol_version: Option<u32>,
    pub request_port: Option<u16>,
    pub running_app_name: Option<String>,
    pub running_app_id: Option<String>,
}

/// Encode a search request.
pub fn build_search() -> Bytes {
    let payload = format!(
        "SRCH * RP/1.0\ndevice-discovery-protocol-version:{}\n",
        PROTOCOL_VERSION
    );
    Bytes::from(payload)
}

/// Encode a wakeup request carrying the registration credential.
pub fn build_wakeup(credential: u64) -> Bytes {
    let payload = format!(
        "WAKEUP * RP/1.0\n\
         client-type:handheld\n\
         user-credential:{}\n\
         device-discovery-protocol-version:{}\n",
        credential, PROTOCOL_VERSION
    );
    Bytes::from(payload)
}

/// Parse a reply datagram into its flat optional-field record.
pub fn parse_reply(data: &[u8]) -> Result<DiscoveryReply, DiscoveryError> {
    let text = std::str::from_utf8(data)
        .map_err(|_| DiscoveryError::MalformedReply("not valid UTF-8".into()))?;

    let mut lines = text.lines();
    let status_line = lines
        .next()
        .ok_or_else(|| DiscoveryError::MalformedReply("empty datagram".into()))?;

    let power_state = parse_status_line(status_line)?;

    let mut reply = DiscoveryReply {
        power_state,
        ..DiscoveryReply::default()
    };

    for line in lines {
        let Some((key, value)) = line.split_once(':') else {
            continue; // tolerate stray lines, fields are optional anyway
        };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        match key.trim() {
            "host-name" => reply.host_name = Some(value.to_string()),
            "host-id" => reply.host_id = Some(value.to_string()),
            "host-type" => reply.host_type = Some(value.to_string()),
            "system-version" => reply.system_version = value.parse().ok(),
            "device-discovery-protocol-version" => reply.protocol_version = value.parse().ok(),
            "host-request-port" => reply.request_port = value.parse().ok(),
            "running-app-name" => reply.running_app_name = Some(value.to_string()),
            "running-app-titleid" => reply.running_app_id = Some(value.to_string()),
            _ => {}
        }
    }

    Ok(reply)
}

fn parse_status_line(line: &str) -> Result<PowerState, DiscoveryError> {
    let mut parts = line.split_whitespace();
    let proto = parts.next().unwrap_or_default();
    if !proto.starts_with("RP/") {
        return Err(DiscoveryError::MalformedReply(format!(
            "unexpected status line `{line}`"
        )));
    }
    let code: u32 = parts
        .next()
        .and_then(|c| c.parse().ok())
        .ok_or_else(|| DiscoveryError::MalformedReply(format!("no status code in `{line}`")))?;

    match code {
        STATUS_READY => Ok(PowerState::Ready),
        STATUS_STANDBY => Ok(PowerState::Standby),
        STATUS_SHUTTING_DOWN => Ok(PowerState::ShuttingDown),
        other => Err(DiscoveryError::MalformedReply(format!(
            "unknown status code {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_full_reply() {
        let data = b"RP/1.0 200 Ok\n\
            host-id:0123456789AB\n\
            host-name:Living Room\n\
            host-type:console\n\
            host-request-port:997\n\
            system-version:07020001\n\
            device-discovery-protocol-version:00030010\n\
            running-app-name:Some Game\n\
            running-app-titleid:GAME01234\n";

        let reply = parse_reply(data).unwrap();
        assert_eq!(reply.power_state, PowerState::Ready);
        assert_eq!(reply.host_name.as_deref(), Some("Living Room"));
        assert_eq!(reply.host_id.as_deref(), Some("0123456789AB"));
        assert_eq!(reply.system_version, Some(7_020_001));
        assert_eq!(reply.protocol_version, Some(30_010));
        assert_eq!(reply.request_port, Some(997));
        assert_eq!(reply.running_app_name.as_deref(), Some("Some Game"));
    }

    #[test]
    fn parses_minimal_standby_reply() {
        let reply = parse_reply(b"RP/1.0 620 Server Standby\nhost-name:Bedroom\n").unwrap();
        assert_eq!(reply.power_state, PowerState::Standby);
        assert_eq!(reply.host_name.as_deref(), Some("Bedroom"));
        assert!(reply.host_id.is_none());
        assert!(reply.system_version.is_none());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_reply(b"").is_err());
        assert!(parse_reply(b"HTTP/1.1 200 Ok\n").is_err());
        assert!(parse_reply(b"RP/1.0 999 What\n").is_err());
        assert!(parse_reply(&[0xFF, 0xFE, 0x00]).is_err());
    }

    #[test]
    fn requests_carry_command_and_version() {
        let search = build_search();
        let text = std::str::from_utf8(&search).unwrap();
        assert!(text.starts_with("SRCH"));
        assert!(text.contains(PROTOCOL_VERSION));

        let wakeup = build_wakeup(0xDEAD_BEEF);
        let text = std::str::from_utf8(&wakeup).unwrap();
        assert!(text.starts_with("WAKEUP"));
        assert!(text.contains(&format!("user-credential:{}", 0xDEAD_BEEFu64)));
    }

    proptest! {
        #[test]
        fn parser_never_panics(data in proptest::collection::vec(any::<u8>(), 0..512)) {
            let _ = parse_reply(&data);
        }
    }
}
