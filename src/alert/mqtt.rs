use anyhow::{anyhow, bail, Context, Result};
use rumqttc::v5::mqttbytes::v5::Packet;
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::{Client, Connection, Event, MqttOptions};
use rumqttc::Transport;
use serde::Serialize;
use std::time::{Duration, Instant};

use super::device::{IndicatorDevice, Rgb};
use crate::config::DeviceSettings;

const DEFAULT_TOPIC: &str = "posture-guard/indicator";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct MqttEndpoint {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
    pub topic: String,
}

#[derive(Serialize)]
struct ColorPayload {
    color: String,
}

/// Indicator driven over MQTT (a smart light, an LED strip bridge, a key pad
/// bridge). Commands are published at QoS 0 with no acknowledgment.
pub struct MqttIndicatorDevice {
    name: String,
    topic: String,
    client: Client,
    connection_handle: Option<std::thread::JoinHandle<()>>,
}

impl MqttIndicatorDevice {
    /// Connect and wait for the broker to accept the session.
    pub fn connect(endpoint: &str, settings: &DeviceSettings) -> Result<Self> {
        let parsed = parse_mqtt_endpoint(endpoint)?;
        if !settings.allow_remote {
            validate_loopback_addr(&parsed, endpoint)?;
        } else {
            log::warn!("remote indicator broker enabled - ensure it is on a trusted network");
        }

        let mut options = MqttOptions::new(&settings.client_id, &parsed.host, parsed.port);
        options.set_keep_alive(Duration::from_secs(30));
        options.set_clean_start(true);
        if let Some(user) = settings.username.as_deref() {
            options.set_credentials(user, settings.password.as_deref().unwrap_or_default());
        }
        if parsed.use_tls {
            options.set_transport(Transport::tls_with_default_config());
        }

        let (client, mut connection) = Client::new(options, 10);
        wait_for_connack(&mut connection, CONNECT_TIMEOUT)
            .with_context(|| format!("indicator broker {} unavailable", endpoint))?;

        let handle = std::thread::spawn(move || {
            for event in connection.iter() {
                if let Err(e) = event {
                    log::warn!("indicator MQTT connection error: {}", e);
                    break;
                }
            }
        });

        log::info!(
            "connected to indicator broker {}:{} (TLS: {}, topic: {})",
            parsed.host,
            parsed.port,
            parsed.use_tls,
            parsed.topic
        );
        Ok(Self {
            name: endpoint.to_string(),
            topic: parsed.topic,
            client,
            connection_handle: Some(handle),
        })
    }
}

impl IndicatorDevice for MqttIndicatorDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_color(&mut self, color: Rgb) -> Result<()> {
        let payload = serde_json::to_vec(&ColorPayload {
            color: color.to_hex(),
        })?;
        self.client
            .publish(self.topic.as_str(), QoS::AtMostOnce, false, payload)?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.client.disconnect()?;
        if let Some(handle) = self.connection_handle.take() {
            let _ = handle.join();
        }
        Ok(())
    }
}

fn wait_for_connack(connection: &mut Connection, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            bail!("no CONNACK within {}s", timeout.as_secs());
        }
        match connection.recv_timeout(remaining) {
            Ok(Ok(Event::Incoming(Packet::ConnAck(_)))) => return Ok(()),
            Ok(Ok(_)) => continue,
            Ok(Err(e)) => bail!("connection failed: {}", e),
            Err(_) => bail!("no CONNACK within {}s", timeout.as_secs()),
        }
    }
}

pub(crate) fn parse_mqtt_endpoint(addr: &str) -> Result<MqttEndpoint> {
    let (scheme, rest) = addr
        .trim()
        .split_once("://")
        .ok_or_else(|| anyhow!("MQTT endpoint needs a scheme: {}", addr))?;
    let use_tls = match scheme {
        "mqtt" | "tcp" => false,
        "mqtts" | "ssl" => true,
        other => return Err(anyhow!("unsupported indicator scheme: {}", other)),
    };

    let (authority, topic) = match rest.split_once('/') {
        Some((authority, topic)) if !topic.trim_matches('/').is_empty() => {
            (authority, topic.trim_matches('/').to_string())
        }
        Some((authority, _)) => (authority, DEFAULT_TOPIC.to_string()),
        None => (rest, DEFAULT_TOPIC.to_string()),
    };

    let (host, port) = split_host_port(authority)?;
    Ok(MqttEndpoint {
        host,
        port,
        use_tls,
        topic,
    })
}

fn split_host_port(addr: &str) -> Result<(String, u16)> {
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, rest) = rest
            .split_once(']')
            .ok_or_else(|| anyhow!("invalid MQTT address: {}", addr))?;
        let port = rest
            .strip_prefix(':')
            .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;
        let port: u16 = port.parse().context("invalid MQTT port")?;
        return Ok((host.to_string(), port));
    }

    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;
    let port: u16 = port.parse().context("invalid MQTT port")?;
    Ok((host.to_string(), port))
}

fn validate_loopback_addr(endpoint: &MqttEndpoint, original: &str) -> Result<()> {
    let host = endpoint.host.as_str();
    if host == "localhost" {
        return Ok(());
    }
    if let Ok(ip) = host.parse::<std::net::IpAddr>() {
        if ip.is_loopback() {
            return Ok(());
        }
    }
    Err(anyhow!(
        "indicator broker must be loopback: {} (set device.allow_remote to override)",
        original
    ))
}
