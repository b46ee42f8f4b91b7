//! HTML pages and form decoding for the provisioning endpoint.

use crate::config::{ConfigError, RelayConfig, WifiMode, HOSTNAME};
use crate::network::NetworkStatus;
use crate::relay::RelayStats;
use std::fmt::Write;

/// Escape text for use in HTML content and quoted attributes.
fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn checked(on: bool) -> &'static str {
    if on {
        " checked"
    } else {
        ""
    }
}

/// Render the configuration form, pre-filled from `config`.
pub fn render_form(config: &RelayConfig) -> String {
    let is_ap = config.mode == WifiMode::AccessPoint;
    format!(
        r#"<!DOCTYPE html>
<html><head><meta charset="utf-8"><title>{host} GPS relay</title></head>
<body>
<h1>GPS Relay Configuration</h1>
<form method="POST" action="/save">
<p>Mode:
<label><input type="radio" name="mode" value="AP"{ap}> Access Point</label>
<label><input type="radio" name="mode" value="STA"{sta}> Join Network</label></p>
<p>SSID: <input type="text" name="ssid" maxlength="32" value="{ssid}"></p>
<p>Password: <input type="password" name="pass" maxlength="64" value="{pass}"></p>
<p>TCP Port: <input type="number" name="port" min="1" max="65535" value="{port}"></p>
<p><input type="submit" value="Save and Reboot"></p>
</form>
<form method="POST" action="/reset">
<p><input type="submit" value="Factory Reset"></p>
</form>
<p><a href="/status">Status</a></p>
</body></html>
"#,
        host = HOSTNAME,
        ap = checked(is_ap),
        sta = checked(!is_ap),
        ssid = escape_html(&config.ssid),
        pass = escape_html(&config.password),
        port = config.port,
    )
}

/// Render the status page.
pub fn render_status(status: &NetworkStatus, relay_port: u16, stats: &RelayStats) -> String {
    let address = status
        .address
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "none".to_string());

    let mut page = String::new();
    let _ = write!(
        page,
        r#"<!DOCTYPE html>
<html><head><meta charset="utf-8"><title>{host} status</title></head>
<body>
<h1>GPS Relay Status</h1>
<table>
<tr><td>Mode</td><td>{mode}</td></tr>
<tr><td>State</td><td>{state}</td></tr>
<tr><td>IP</td><td>{address}</td></tr>
<tr><td>TCP Port</td><td>{port}</td></tr>
</table>
<h2>Relay</h2>
<table>
<tr><td>Sessions accepted</td><td>{accepted}</td></tr>
<tr><td>Sessions rejected</td><td>{rejected}</td></tr>
<tr><td>Bytes forwarded</td><td>{bytes}</td></tr>
<tr><td>Chunks forwarded</td><td>{chunks}</td></tr>
<tr><td>Bytes dropped</td><td>{dropped}</td></tr>
</table>
<p><a href="/">Configuration</a></p>
</body></html>
"#,
        host = HOSTNAME,
        mode = status.mode_label(),
        state = status.state,
        address = address,
        port = relay_port,
        accepted = stats.sessions_accepted,
        rejected = stats.sessions_rejected,
        bytes = stats.bytes_forwarded,
        chunks = stats.chunks_forwarded,
        dropped = stats.bytes_dropped,
    );
    page
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Decode one `application/x-www-form-urlencoded` component.
///
/// Malformed escapes are kept literally. Invalid UTF-8 is replaced.
pub fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len() => {
                match (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push(hi << 4 | lo);
                        i += 2;
                    }
                    _ => out.push(b'%'),
                }
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Split a form body into decoded name/value pairs.
pub fn parse_form(body: &str) -> Vec<(String, String)> {
    body.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((name, value)) => (percent_decode(name), percent_decode(value)),
            None => (percent_decode(pair), String::new()),
        })
        .collect()
}

fn field<'f>(fields: &'f [(String, String)], name: &str) -> Option<&'f str> {
    fields
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

/// Build a configuration from a submitted form.
///
/// `mode` and `port` are required. Missing `ssid` or `pass` are taken as
/// empty. A port equal to `reserved_port` is refused.
pub fn config_from_form(body: &str, reserved_port: u16) -> Result<RelayConfig, ConfigError> {
    let fields = parse_form(body);

    let mode: WifiMode = field(&fields, "mode")
        .ok_or(ConfigError::MissingField("mode"))?
        .parse()?;

    let port_text = field(&fields, "port")
        .ok_or(ConfigError::MissingField("port"))?
        .trim();
    let port: u16 = port_text
        .parse()
        .map_err(|_| ConfigError::InvalidPort(port_text.to_string()))?;
    if port == reserved_port {
        return Err(ConfigError::PortReserved(port));
    }

    let ssid = field(&fields, "ssid").unwrap_or("").trim();
    let pass = field(&fields, "pass").unwrap_or("");

    RelayConfig::new(mode, ssid, pass, port)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::ConnectivityState;
    use std::net::{IpAddr, Ipv4Addr};

    // ==================== Rendering Tests ====================

    #[test]
    fn test_form_reflects_config() {
        let config = RelayConfig::new(WifiMode::StationClient, "HomeNet", "hunter22", 6000).unwrap();
        let page = render_form(&config);

        assert!(page.contains(r#"value="STA" checked"#));
        assert!(!page.contains(r#"value="AP" checked"#));
        assert!(page.contains(r#"name="ssid" maxlength="32" value="HomeNet""#));
        assert!(page.contains(r#"value="hunter22""#));
        assert!(page.contains(r#"value="6000""#));
        assert!(page.contains(r#"action="/reset""#));
        assert!(page.contains(r#"href="/status""#));
    }

    #[test]
    fn test_form_defaults_to_access_point() {
        let page = render_form(&RelayConfig::default());
        assert!(page.contains(r#"value="AP" checked"#));
        assert!(page.contains(r#"value="5000""#));
    }

    #[test]
    fn test_form_escapes_values() {
        let config =
            RelayConfig::new(WifiMode::StationClient, "<b>\"cafe\"</b>", "", 5000).unwrap();
        let page = render_form(&config);
        assert!(page.contains("&lt;b&gt;&quot;cafe&quot;&lt;/b&gt;"));
        assert!(!page.contains("<b>"));
    }

    #[test]
    fn test_status_page() {
        let status = NetworkStatus {
            state: ConnectivityState::FallenBack,
            mode: WifiMode::StationClient,
            address: Some(IpAddr::V4(Ipv4Addr::new(192, 168, 4, 1))),
        };
        let stats = RelayStats {
            sessions_accepted: 3,
            bytes_forwarded: 1024,
            ..Default::default()
        };
        let page = render_status(&status, 5000, &stats);

        assert!(page.contains("<td>STA</td>"));
        assert!(page.contains("<td>fallen back</td>"));
        assert!(page.contains("<td>192.168.4.1</td>"));
        assert!(page.contains("<td>5000</td>"));
        assert!(page.contains("<td>Sessions accepted</td><td>3</td>"));
        assert!(page.contains("<td>Bytes forwarded</td><td>1024</td>"));
    }

    #[test]
    fn test_status_page_without_address() {
        let status = NetworkStatus {
            state: ConnectivityState::Hosting,
            mode: WifiMode::AccessPoint,
            address: None,
        };
        let page = render_status(&status, 5000, &RelayStats::default());
        assert!(page.contains("<td>none</td>"));
    }

    // ==================== Decoding Tests ====================

    #[test]
    fn test_percent_decode() {
        assert_eq!(percent_decode("My+Net%21"), "My Net!");
        assert_eq!(percent_decode("a%2Bb%3Dc%26d"), "a+b=c&d");
        assert_eq!(percent_decode("caf%C3%A9"), "café");
    }

    #[test]
    fn test_percent_decode_malformed() {
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("%zz"), "%zz");
        assert_eq!(percent_decode("%4"), "%4");
    }

    #[test]
    fn test_parse_form_pairs() {
        let fields = parse_form("mode=STA&ssid=Home+Net&flag&=x");
        assert_eq!(
            fields,
            vec![
                ("mode".to_string(), "STA".to_string()),
                ("ssid".to_string(), "Home Net".to_string()),
                ("flag".to_string(), String::new()),
                (String::new(), "x".to_string()),
            ]
        );
    }

    #[test]
    fn test_config_from_form() {
        let config =
            config_from_form("mode=STA&ssid=Home+Net&pass=p%40ssw0rd%21&port=6000", 80).unwrap();
        assert_eq!(config.mode, WifiMode::StationClient);
        assert_eq!(config.ssid, "Home Net");
        assert_eq!(config.password, "p@ssw0rd!");
        assert_eq!(config.port, 6000);
    }

    #[test]
    fn test_config_from_form_sta_empty_ssid_accepted() {
        let config = config_from_form("mode=STA&ssid=&pass=&port=5000", 80).unwrap();
        assert_eq!(config.mode, WifiMode::StationClient);
        assert!(!config.wants_join());
    }

    #[test]
    fn test_config_from_form_rejects_bad_port() {
        assert_eq!(
            config_from_form("mode=AP&port=abc", 80),
            Err(ConfigError::InvalidPort("abc".to_string()))
        );
        assert_eq!(
            config_from_form("mode=AP&port=70000", 80),
            Err(ConfigError::InvalidPort("70000".to_string()))
        );
        assert!(matches!(
            config_from_form("mode=AP&port=0", 80),
            Err(ConfigError::InvalidPort(_))
        ));
        assert_eq!(
            config_from_form("mode=AP&port=80", 80),
            Err(ConfigError::PortReserved(80))
        );
    }

    #[test]
    fn test_config_from_form_rejects_bad_mode() {
        assert_eq!(
            config_from_form("mode=MESH&port=5000", 80),
            Err(ConfigError::UnknownMode("MESH".to_string()))
        );
        assert_eq!(
            config_from_form("port=5000", 80),
            Err(ConfigError::MissingField("mode"))
        );
    }

    #[test]
    fn test_config_from_form_rejects_short_password() {
        assert!(matches!(
            config_from_form("mode=STA&ssid=x&pass=short&port=5000", 80),
            Err(ConfigError::PasswordTooShort { .. })
        ));
    }
}
