//! Discovery probe sender and background reply listener

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, info, warn};

use crate::console::SharedRegistry;
use crate::constants::{DISCOVERY_PORT, LISTENER_POLL, MAX_DISCOVERY_PACKET};
use crate::discovery::wire::{self, DiscoveryReply};
use crate::error::DiscoveryError;

/// Observer invoked synchronously on the listener thread after a reply has
/// been applied to the registry. The argument is the console's name.
pub type UpdateObserver = Box<dyn Fn(&str) + Send>;

/// Discovery tunables; the defaults match the console's well-known port.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// UDP port consoles listen on for search/wakeup requests
    pub console_port: u16,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            console_port: DISCOVERY_PORT,
        }
    }
}

/// Locates consoles and keeps their power/version state current.
///
/// Probe sends are synchronous and report only the fate of the send; replies
/// arrive on the listener thread, which runs from construction until drop.
pub struct DiscoveryService {
    socket: Arc<UdpSocket>,
    registry: SharedRegistry,
    config: DiscoveryConfig,
    running: Arc<AtomicBool>,
    listener: Option<JoinHandle<()>>,
    observer: Arc<Mutex<Option<UpdateObserver>>>,
}

impl DiscoveryService {
    /// Bind the discovery socket and start the listener thread.
    ///
    /// A bind failure is fatal to the service, not retried.
    pub fn new(registry: SharedRegistry, config: DiscoveryConfig) -> Result<Self, DiscoveryError> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(|e| DiscoveryError::BindFailed(e.to_string()))?;
        socket
            .set_reuse_address(true)
            .map_err(|e| DiscoveryError::BindFailed(e.to_string()))?;
        socket
            .set_broadcast(true)
            .map_err(|e| DiscoveryError::BindFailed(e.to_string()))?;
        socket
            .set_read_timeout(Some(LISTENER_POLL))
            .map_err(|e| DiscoveryError::BindFailed(e.to_string()))?;
        let bind_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0));
        socket
            .bind(&bind_addr.into())
            .map_err(|e| DiscoveryError::BindFailed(e.to_string()))?;

        let socket: Arc<UdpSocket> = Arc::new(socket.into());
        let running = Arc::new(AtomicBool::new(true));
        let observer: Arc<Mutex<Option<UpdateObserver>>> = Arc::new(Mutex::new(None));

        let listener = {
            let socket = socket.clone();
            let registry = registry.clone();
            let running = running.clone();
            let observer = observer.clone();
            thread::Builder::new()
                .name("discovery-listener".into())
                .spawn(move || listen_loop(socket, registry, running, observer))
                .map_err(|e| DiscoveryError::BindFailed(e.to_string()))?
        };

        Ok(Self {
            socket,
            registry,
            config,
            running,
            listener: Some(listener),
            observer,
        })
    }

    /// Register a callback run on the listener thread after each applied
    /// reply. Replaces any previous observer.
    pub fn set_observer(&self, observer: UpdateObserver) {
        *self.observer.lock() = Some(observer);
    }

    /// Resolve `host` and send one search request to it.
    ///
    /// Success means the datagram left this machine; the reply, if any,
    /// arrives asynchronously on the listener thread.
    pub fn probe_one(&self, host: &str) -> Result<(), DiscoveryError> {
        let target = self.resolve(host)?;
        self.send_search(target)
    }

    /// Send one search request to the limited broadcast address.
    pub fn probe_broadcast(&self) -> Result<(), DiscoveryError> {
        let target = SocketAddr::V4(SocketAddrV4::new(
            Ipv4Addr::BROADCAST,
            self.config.console_port,
        ));
        self.send_search(target)
    }

    /// Probe whatever the platform network config suggests.
    ///
    /// The subnet-directed broadcast address needs the interface netmask,
    /// which the standard library cannot read; until a platform hook
    /// provides it we fall back to the limited broadcast, which reaches the
    /// same LAN segment.
    pub fn probe_all(&self) -> Result<(), DiscoveryError> {
        debug!("platform netmask unavailable, probing via limited broadcast");
        self.probe_broadcast()
    }

    /// Send a credentialed wakeup request to a known, paired console.
    pub fn send_wakeup(&self, name: &str) -> Result<(), DiscoveryError> {
        let (addr, credential) = {
            let registry = self.registry.lock();
            let console = registry
                .find(name)
                .ok_or_else(|| DiscoveryError::UnknownConsole(name.to_string()))?;
            let creds = console
                .credentials()
                .ok_or_else(|| DiscoveryError::NotPaired(name.to_string()))?;
            let addr = console
                .addr()
                .ok_or_else(|| DiscoveryError::Resolve(format!("{name} has no known address")))?;
            let mut prefix = [0u8; 8];
            prefix.copy_from_slice(&creds.regist_key.0[..8]);
            (addr, u64::from_be_bytes(prefix))
        };

        let target = SocketAddr::new(addr, self.config.console_port);
        info!(%target, console = name, "sending wakeup");
        self.socket
            .send_to(&wire::build_wakeup(credential), target)
            .map_err(|e| DiscoveryError::SendFailed(e.to_string()))?;
        Ok(())
    }

    fn resolve(&self, host: &str) -> Result<SocketAddr, DiscoveryError> {
        (host, self.config.console_port)
            .to_socket_addrs()
            .map_err(|e| DiscoveryError::Resolve(format!("{host}: {e}")))?
            .find(SocketAddr::is_ipv4)
            .ok_or_else(|| DiscoveryError::Resolve(format!("{host}: no IPv4 address")))
    }

    fn send_search(&self, target: SocketAddr) -> Result<(), DiscoveryError> {
        debug!(%target, "sending discovery search");
        self.socket
            .send_to(&wire::build_search(), target)
            .map_err(|e| DiscoveryError::SendFailed(e.to_string()))?;
        Ok(())
    }
}

impl Drop for DiscoveryService {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.listener.take() {
            let _ = handle.join();
        }
    }
}

fn listen_loop(
    socket: Arc<UdpSocket>,
    registry: SharedRegistry,
    running: Arc<AtomicBool>,
    observer: Arc<Mutex<Option<UpdateObserver>>>,
) {
    let mut buf = [0u8; MAX_DISCOVERY_PACKET];
    while running.load(Ordering::SeqCst) {
        let (len, src) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(e) => {
                warn!("discovery receive failed: {}", e);
                continue;
            }
        };

        match wire::parse_reply(&buf[..len]) {
            Ok(mut reply) => {
                reply.addr = Some(src.ip());
                if let Some(name) = apply_reply(&registry, &reply) {
                    if let Some(cb) = observer.lock().as_ref() {
                        cb(&name);
                    }
                }
            }
            Err(e) => {
                // one bad datagram is dropped, the stream continues
                warn!(%src, "ignoring discovery reply: {}", e);
            }
        }
    }
}

/// Fold one reply into the registry. Fields absent from the reply leave the
/// console record unchanged. Returns the console name when a record was
/// updated.
pub(crate) fn apply_reply(registry: &SharedRegistry, reply: &DiscoveryReply) -> Option<String> {
    let Some(name) = reply.host_name.as_deref() else {
        warn!("discovery reply without host-name, dropping");
        return None;
    };

    let mut registry = registry.lock();
    let console = registry.upsert(name);
    console.set_power_state(reply.power_state);
    console.mark_discovered();
    if let Some(addr) = reply.addr {
        console.set_addr(addr);
    }
    if let Some(host_id) = &reply.host_id {
        console.set_host_id(host_id.clone());
    }
    if let Some(version) = reply.system_version {
        console.set_system_version(version);
    }
    if let Some(version) = reply.protocol_version {
        console.set_protocol_version(version);
    }
    if let Some(app) = &reply.running_app_name {
        console.set_running_app(app.clone());
    }

    info!(
        console = name,
        state = %console.power_state(),
        addr = ?console.addr(),
        "discovery update"
    );
    Some(name.to_string())
}
