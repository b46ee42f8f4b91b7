//! Boot sequence and control loop.
//!
//! One boot cycle:
//!
//! 1. Load the [`RelayConfig`] from the store.
//! 2. Establish connectivity (join or host).
//! 3. Bind the relay on the configured port and the provisioning page.
//! 4. Loop: serve provisioning, then relay, until a restart is requested.
//!
//! The caller performs the restart. The firmware reboots the chip; the host
//! binary just boots again with the same store.

use crate::config::{RelayConfig, DEFAULT_HTTP_PORT};
use crate::network::{establish, JoinPolicy, NetworkStatus, WifiRadio};
use crate::provisioning::{
    Provisioner, ProvisioningError, ProvisioningServer, RestartRequest, RESTART_DELAY,
};
use crate::relay::{RelayError, RelayStats, SerialRelay, SerialSource};
use crate::store::ConfigStore;
use log::{debug, info};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::thread;
use std::time::{Duration, Instant};

/// Pause when an iteration found nothing to do.
const IDLE_YIELD: Duration = Duration::from_millis(1);

/// Platform-dependent boot settings.
#[derive(Debug, Clone)]
pub struct DeviceOptions {
    /// Port of the provisioning page.
    pub http_port: u16,
    /// Address both listeners bind to.
    pub bind_ip: IpAddr,
    pub join_policy: JoinPolicy,
    /// Delay between a save or reset response and the restart.
    pub restart_delay: Duration,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self {
            http_port: DEFAULT_HTTP_PORT,
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            join_policy: JoinPolicy::default(),
            restart_delay: RESTART_DELAY,
        }
    }
}

/// Result of one control loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopOutcome {
    /// Nothing arrived from the serial source.
    Idle,
    /// Serial bytes were processed.
    Busy,
    /// The restart delay has passed.
    Restart(RestartRequest),
}

/// A booted device.
pub struct Device<'a, St: ConfigStore, S: SerialSource> {
    provisioner: Provisioner<'a, St>,
    http: ProvisioningServer,
    relay: SerialRelay<'a, S>,
    pending_restart: Option<(Instant, RestartRequest)>,
}

impl<'a, St: ConfigStore, S: SerialSource> Device<'a, St, S> {
    /// Run the boot sequence.
    ///
    /// Blocks while joining a network. Fails only when a listener cannot be
    /// bound.
    pub fn boot<R: WifiRadio>(
        store: &'a mut St,
        radio: &mut R,
        source: &'a mut S,
        options: &DeviceOptions,
    ) -> Result<Self, DeviceError> {
        let config: RelayConfig = store.load();
        info!("Loaded configuration: {:?}", config);

        let status = establish(&config, radio, &options.join_policy);

        let relay = SerialRelay::bind(SocketAddr::new(options.bind_ip, config.port), source)?;
        let http = ProvisioningServer::bind(SocketAddr::new(options.bind_ip, options.http_port))?;

        let provisioner = Provisioner::new(store, status, relay.local_addr().port())
            .with_restart_delay(options.restart_delay);

        Ok(Self {
            provisioner,
            http,
            relay,
            pending_restart: None,
        })
    }

    /// Connectivity of this boot cycle.
    pub fn status(&self) -> &NetworkStatus {
        self.provisioner.status()
    }

    /// Address of the relay listener.
    pub fn relay_addr(&self) -> SocketAddr {
        self.relay.local_addr()
    }

    /// Address of the provisioning page.
    pub fn http_addr(&self) -> SocketAddr {
        self.http.local_addr()
    }

    /// Relay traffic counters.
    pub fn relay_stats(&self) -> RelayStats {
        self.relay.stats()
    }

    /// Run one iteration: provisioning first, then the relay.
    ///
    /// Relaying and the provisioning page both keep running during the
    /// restart delay. The first scheduled restart stands.
    pub fn run_once(&mut self) -> LoopOutcome {
        let stats = self.relay.stats();
        if let Some(request) = self.http.poll(&mut self.provisioner, &stats) {
            if self.pending_restart.is_some() {
                debug!("Restart already scheduled, ignoring {}", request.reason);
            } else {
                self.pending_restart = Some((Instant::now() + request.delay, request));
            }
        }

        if let Some((due, request)) = self.pending_restart {
            if Instant::now() >= due {
                return LoopOutcome::Restart(request);
            }
        }

        if self.relay.poll() {
            LoopOutcome::Busy
        } else {
            LoopOutcome::Idle
        }
    }

    /// Loop until a restart is due.
    pub fn run_until_restart(mut self) -> RestartRequest {
        loop {
            match self.run_once() {
                LoopOutcome::Restart(request) => {
                    info!("Restarting: {}", request.reason);
                    return request;
                }
                LoopOutcome::Idle => thread::sleep(IDLE_YIELD),
                LoopOutcome::Busy => {}
            }
        }
    }
}

/// Boot failures.
#[derive(Debug)]
pub enum DeviceError {
    Relay(RelayError),
    Provisioning(ProvisioningError),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Relay(e) => write!(f, "relay: {}", e),
            Self::Provisioning(e) => write!(f, "provisioning: {}", e),
        }
    }
}

impl std::error::Error for DeviceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Relay(e) => Some(e),
            Self::Provisioning(e) => Some(e),
        }
    }
}

impl From<RelayError> for DeviceError {
    fn from(e: RelayError) -> Self {
        Self::Relay(e)
    }
}

impl From<ProvisioningError> for DeviceError {
    fn from(e: ProvisioningError) -> Self {
        Self::Provisioning(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WifiMode;
    use crate::network::{ConnectivityState, HostRadio, RadioError};
    use crate::relay::ChannelSource;
    use crate::provisioning::RestartReason;
    use crate::store::MemoryConfigStore;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread::JoinHandle;

    fn free_port() -> u16 {
        TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    fn test_options() -> DeviceOptions {
        DeviceOptions {
            http_port: 0,
            bind_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            join_policy: JoinPolicy {
                poll_interval: Duration::from_millis(5),
                timeout: Duration::from_millis(30),
            },
            restart_delay: Duration::ZERO,
        }
    }

    /// Send a raw request from a background client and collect the reply.
    fn http_exchange(port: u16, raw: String) -> JoinHandle<String> {
        thread::spawn(move || {
            let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
            stream.write_all(raw.as_bytes()).unwrap();
            let mut response = String::new();
            stream.read_to_string(&mut response).unwrap();
            response
        })
    }

    fn save_request(port: u16) -> String {
        let body = format!("mode=AP&ssid=&pass=&port={}", port);
        format!(
            "POST /save HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        )
    }

    /// Radio whose joins never complete.
    struct DeadRadio;

    impl WifiRadio for DeadRadio {
        fn begin_join(&mut self, _ssid: &str, _password: &str) -> Result<(), RadioError> {
            Ok(())
        }

        fn is_joined(&mut self) -> bool {
            false
        }

        fn station_addr(&self) -> Option<IpAddr> {
            None
        }

        fn start_access_point(&mut self, _ssid: &str) -> Result<IpAddr, RadioError> {
            Ok(IpAddr::V4(Ipv4Addr::new(192, 168, 4, 1)))
        }
    }

    #[test]
    fn test_boot_hosts_with_defaults() {
        let port = free_port();
        let mut store = MemoryConfigStore::new();
        store
            .save(&RelayConfig::new(WifiMode::AccessPoint, "", "", port).unwrap())
            .unwrap();
        let (_feed, mut source) = ChannelSource::new();
        let mut radio = HostRadio::new();

        let device = Device::boot(&mut store, &mut radio, &mut source, &test_options()).unwrap();
        assert_eq!(device.status().state, ConnectivityState::Hosting);
        assert_eq!(device.relay_addr().port(), port);
        assert_ne!(device.http_addr().port(), 0);
    }

    #[test]
    fn test_boot_falls_back_when_join_times_out() {
        let port = free_port();
        let mut store = MemoryConfigStore::new();
        store
            .save(&RelayConfig::new(WifiMode::StationClient, "Nowhere", "", port).unwrap())
            .unwrap();
        let (_feed, mut source) = ChannelSource::new();

        let device = Device::boot(&mut store, &mut DeadRadio, &mut source, &test_options()).unwrap();
        assert_eq!(device.status().state, ConnectivityState::FallenBack);
        assert_eq!(
            device.status().address,
            Some(IpAddr::V4(Ipv4Addr::new(192, 168, 4, 1)))
        );
    }

    #[test]
    fn test_boot_fails_when_relay_port_taken() {
        let taken = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();
        let mut store = MemoryConfigStore::new();
        store
            .save(&RelayConfig::new(WifiMode::AccessPoint, "", "", port).unwrap())
            .unwrap();
        let (_feed, mut source) = ChannelSource::new();

        let result = Device::boot(&mut store, &mut DeadRadio, &mut source, &test_options());
        assert!(matches!(result, Err(DeviceError::Relay(RelayError::Bind(_)))));
    }

    #[test]
    fn test_run_once_reports_serial_activity() {
        let port = free_port();
        let mut store = MemoryConfigStore::new();
        store
            .save(&RelayConfig::new(WifiMode::AccessPoint, "", "", port).unwrap())
            .unwrap();
        let (feed, mut source) = ChannelSource::new();

        let mut device =
            Device::boot(&mut store, &mut DeadRadio, &mut source, &test_options()).unwrap();
        assert_eq!(device.run_once(), LoopOutcome::Idle);

        feed.send(b"$GPGGA,1*00\n".to_vec());
        assert_eq!(device.run_once(), LoopOutcome::Busy);
        assert_eq!(device.relay_stats().bytes_dropped, 12);
    }

    #[test]
    fn test_save_served_under_continuous_serial_traffic() {
        let port = free_port();
        let mut store = MemoryConfigStore::new();
        store
            .save(&RelayConfig::new(WifiMode::AccessPoint, "", "", port).unwrap())
            .unwrap();
        let (feed, mut source) = ChannelSource::new();

        let mut device =
            Device::boot(&mut store, &mut DeadRadio, &mut source, &test_options()).unwrap();

        // Far more serial backlog than one iteration can drain
        let sentence = b"$GPGSV,3,1,11,03,03,111,00*74\n";
        let backlog: Vec<u8> = sentence.iter().copied().cycle().take(64 * 1024).collect();
        feed.send(backlog);

        let new_port = free_port();
        let client = http_exchange(device.http_addr().port(), save_request(new_port));
        // Let the request arrive before the loop starts
        thread::sleep(Duration::from_millis(250));

        let mut restart = None;
        for _ in 0..3 {
            feed.send(sentence.repeat(16));
            match device.run_once() {
                LoopOutcome::Restart(request) => {
                    restart = Some(request);
                    break;
                }
                outcome => assert_eq!(outcome, LoopOutcome::Busy),
            }
        }

        let request = restart.expect("restart not reported while serial data kept arriving");
        assert_eq!(request.reason, RestartReason::ConfigSaved);
        assert!(client.join().unwrap().starts_with("HTTP/1.1 200"));
        drop(device);
        assert_eq!(store.load().port, new_port);
    }

    #[test]
    fn test_page_still_served_while_restart_pending() {
        let port = free_port();
        let mut store = MemoryConfigStore::new();
        store
            .save(&RelayConfig::new(WifiMode::AccessPoint, "", "", port).unwrap())
            .unwrap();
        let (_feed, mut source) = ChannelSource::new();
        let options = DeviceOptions {
            restart_delay: Duration::from_secs(1),
            ..test_options()
        };

        let mut device = Device::boot(&mut store, &mut DeadRadio, &mut source, &options).unwrap();
        let http_port = device.http_addr().port();

        let saved = http_exchange(http_port, save_request(free_port()));
        let deadline = Instant::now() + Duration::from_secs(5);
        while !saved.is_finished() && Instant::now() < deadline {
            assert!(!matches!(device.run_once(), LoopOutcome::Restart(_)));
            thread::sleep(Duration::from_millis(1));
        }
        let scheduled_at = Instant::now();
        assert!(saved.join().unwrap().starts_with("HTTP/1.1 200"));

        // A second save neither answers with an error nor moves the restart
        thread::sleep(Duration::from_millis(300));
        let status = http_exchange(
            http_port,
            "GET /status HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n".to_string(),
        );
        let again = http_exchange(http_port, save_request(free_port()));
        while !(status.is_finished() && again.is_finished()) && Instant::now() < deadline {
            assert!(!matches!(device.run_once(), LoopOutcome::Restart(_)));
            thread::sleep(Duration::from_millis(1));
        }
        assert!(scheduled_at.elapsed() < Duration::from_secs(1));
        assert!(status.join().unwrap().starts_with("HTTP/1.1 200"));
        assert!(again.join().unwrap().starts_with("HTTP/1.1 200"));

        let request = loop {
            match device.run_once() {
                LoopOutcome::Restart(request) => break request,
                LoopOutcome::Idle => thread::sleep(Duration::from_millis(1)),
                LoopOutcome::Busy => {}
            }
            assert!(scheduled_at.elapsed() < Duration::from_secs(3));
        };
        assert_eq!(request.reason, RestartReason::ConfigSaved);
        assert!(scheduled_at.elapsed() < Duration::from_millis(1200));
    }
}
