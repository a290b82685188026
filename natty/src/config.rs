use crate::error::Result;
use signal::SignalWriter;
use std::fmt;
use std::path::PathBuf;
use webrtc::ice_transport::ice_server::RTCIceServer;

/// ICE server used when neither `--stuns` nor `WEBRTC_CONNECT` name one.
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

/// Environment variable consulted for ICE servers, comma separated.
pub const STUN_SERVERS_ENV: &str = "WEBRTC_CONNECT";

const ICE_URL_SCHEMES: [&str; 4] = ["stun:", "stuns:", "turn:", "turns:"];

/// Which side of the offer/answer exchange this process plays.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum Role {
    Offerer,
    #[default]
    Answerer,
}

impl Role {
    pub fn from_offer_flag(offer: bool) -> Self {
        if offer { Role::Offerer } else { Role::Answerer }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            Role::Offerer => "offerer",
            Role::Answerer => "answerer",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NattyConfig {
    pub role: Role,
    /// Signaling output file; stdout when unset.
    pub out: Option<PathBuf>,
    pub stun_servers: Vec<String>,
    /// Also gather loopback candidates, for two peers on the same host.
    pub include_loopback: bool,
}

impl Default for NattyConfig {
    fn default() -> Self {
        Self {
            role: Role::default(),
            out: None,
            stun_servers: vec![DEFAULT_STUN_SERVER.to_owned()],
            include_loopback: false,
        }
    }
}

impl NattyConfig {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            ..Default::default()
        }
    }

    pub fn with_out(mut self, out: Option<PathBuf>) -> Self {
        self.out = out.filter(|path| !path.as_os_str().is_empty());
        self
    }

    pub fn with_loopback(mut self, include_loopback: bool) -> Self {
        self.include_loopback = include_loopback;
        self
    }

    /// Replaces the server list. Blank entries are dropped and bare
    /// `host:port` entries are read as STUN servers.
    pub fn with_stun_servers<I, S>(mut self, servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.stun_servers = servers
            .into_iter()
            .filter_map(|url| normalize_ice_url(url.as_ref()))
            .collect();
        self
    }

    pub fn ice_servers(&self) -> Vec<RTCIceServer> {
        self.stun_servers
            .iter()
            .map(|url| RTCIceServer {
                urls: vec![url.clone()],
                ..Default::default()
            })
            .collect()
    }

    pub async fn open_writer(&self) -> Result<SignalWriter> {
        match &self.out {
            Some(path) => Ok(SignalWriter::create(path).await?),
            None => Ok(SignalWriter::stdout()),
        }
    }
}

/// Picks the raw ICE server list. An explicit `--stuns` value wins, even an
/// empty one (host candidates only); then a non-blank `WEBRTC_CONNECT`;
/// then [`DEFAULT_STUN_SERVER`].
pub fn resolve_stun_servers(flag: Option<Vec<String>>, env: Option<&str>) -> Vec<String> {
    if let Some(servers) = flag {
        return servers;
    }

    match env {
        Some(value) if value.split(',').any(|url| !url.trim().is_empty()) => {
            value.split(',').map(str::to_owned).collect()
        }
        _ => vec![DEFAULT_STUN_SERVER.to_owned()],
    }
}

pub fn normalize_ice_url(raw: &str) -> Option<String> {
    let url = raw.trim();
    if url.is_empty() {
        return None;
    }

    let lower = url.to_ascii_lowercase();
    if ICE_URL_SCHEMES.iter().any(|scheme| lower.starts_with(scheme)) {
        Some(url.to_owned())
    } else {
        Some(format!("stun:{url}"))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_normalize_ice_url() {
        let tests = vec![
            ("stun:stun.l.google.com:19302", Some("stun:stun.l.google.com:19302")),
            ("  stun:10.0.0.1:3478 ", Some("stun:10.0.0.1:3478")),
            ("STUN:example.org", Some("STUN:example.org")),
            ("stuns:example.org:5349", Some("stuns:example.org:5349")),
            ("turn:relay.example.org", Some("turn:relay.example.org")),
            ("turns:relay.example.org", Some("turns:relay.example.org")),
            ("stun.example.org:3478", Some("stun:stun.example.org:3478")),
            ("", None),
            ("   ", None),
        ];

        for (raw, expected) in tests {
            assert_eq!(
                normalize_ice_url(raw).as_deref(),
                expected,
                "input: {raw:?}"
            );
        }
    }

    #[test]
    fn test_default_config() {
        let config = NattyConfig::default();
        assert_eq!(config.role, Role::Answerer);
        assert_eq!(config.out, None);
        assert_eq!(config.stun_servers, vec![DEFAULT_STUN_SERVER.to_owned()]);
        assert!(!config.include_loopback);
    }

    #[test]
    fn test_with_stun_servers() {
        let config = NattyConfig::new(Role::Offerer)
            .with_stun_servers(["stun.a.example:3478", "", "stun:b.example:19302"]);
        assert_eq!(
            config.stun_servers,
            vec![
                "stun:stun.a.example:3478".to_owned(),
                "stun:b.example:19302".to_owned()
            ]
        );

        let servers = config.ice_servers();
        assert_eq!(servers.len(), 2);
        assert_eq!(servers[0].urls, vec!["stun:stun.a.example:3478".to_owned()]);
        assert_eq!(servers[1].urls, vec!["stun:b.example:19302".to_owned()]);

        let local_only = NattyConfig::default().with_stun_servers(Vec::<String>::new());
        assert!(local_only.ice_servers().is_empty());
    }

    #[test]
    fn test_resolve_stun_servers() {
        let default = vec![DEFAULT_STUN_SERVER.to_owned()];
        let tests: Vec<(Option<Vec<&str>>, Option<&str>, Vec<String>)> = vec![
            (None, None, default.clone()),
            (None, Some(""), default.clone()),
            (None, Some(" , "), default.clone()),
            (
                None,
                Some("a.example:3478,stun:b.example:19302"),
                vec![
                    "stun:a.example:3478".to_owned(),
                    "stun:b.example:19302".to_owned(),
                ],
            ),
            (Some(vec![""]), None, vec![]),
            (Some(vec![""]), Some("stun:env.example:3478"), vec![]),
            (
                Some(vec!["flag.example:3478"]),
                Some("stun:env.example:3478"),
                vec!["stun:flag.example:3478".to_owned()],
            ),
        ];

        for (flag, env, expected) in tests {
            let servers = resolve_stun_servers(
                flag.clone()
                    .map(|urls| urls.into_iter().map(str::to_owned).collect()),
                env,
            );
            let config = NattyConfig::default().with_stun_servers(servers);
            assert_eq!(
                config.stun_servers, expected,
                "flag: {flag:?}, env: {env:?}"
            );
        }
    }

    #[test]
    fn test_with_out() {
        let config = NattyConfig::default().with_out(Some(PathBuf::from("")));
        assert_eq!(config.out, None);

        let config = NattyConfig::default().with_out(Some(PathBuf::from("signal.out")));
        assert_eq!(config.out, Some(PathBuf::from("signal.out")));
    }

    #[test]
    fn test_role() {
        assert_eq!(Role::from_offer_flag(true), Role::Offerer);
        assert_eq!(Role::from_offer_flag(false), Role::Answerer);
        assert_eq!(Role::Offerer.to_string(), "offerer");
        assert_eq!(Role::Answerer.to_string(), "answerer");
    }
}
