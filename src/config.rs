use crate::error::Error;
use ::config::{Config, ConfigError};
use std::time::Duration;

pub(crate) const DEFAULT_POLL_CAPACITY: usize = 256;
const DEFAULT_RECONNECT_IVL_MS: u64 = 100;

pub(crate) fn get_namespaced_value<T, F>(
    config: &Config,
    name: &str,
    key: &str,
    getter: F,
) -> Result<T, ConfigError>
where
    F: Fn(&Config, &str) -> Result<T, ConfigError>,
{
    if name.is_empty() {
        getter(config, key)
    } else {
        getter(config, &format!("{name}.{key}")).or_else(|_| getter(config, key))
    }
}

pub(crate) fn get_namespaced_usize(
    config: &Config,
    name: &str,
    key: &str,
) -> Result<usize, ConfigError> {
    get_namespaced_value(config, name, key, |cfg, key| cfg.get::<usize>(key))
}

pub(crate) fn get_namespaced_u64(
    config: &Config,
    name: &str,
    key: &str,
) -> Result<u64, ConfigError> {
    get_namespaced_value(config, name, key, |cfg, key| cfg.get::<u64>(key))
}

pub(crate) fn get_namespaced_bool(
    config: &Config,
    name: &str,
    key: &str,
) -> Result<bool, ConfigError> {
    get_namespaced_value(config, name, key, Config::get_bool)
}

// Turns a missing key into `None` but keeps malformed values as errors.
fn optional<T>(result: Result<T, ConfigError>) -> Result<Option<T>, Error> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(ConfigError::NotFound(_)) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn optional_millis(config: &Config, name: &str, key: &str) -> Result<Option<Duration>, Error> {
    Ok(optional(get_namespaced_u64(config, name, key))?.map(Duration::from_millis))
}

/// Per-connecter options.
///
/// # Configuration Keys
///
/// All durations are in milliseconds.
///
/// - `reconnect_ivl`: base reconnect interval (default 100)
/// - `reconnect_ivl_max`: backoff ceiling; 0 disables growth (default 0)
/// - `connect_timeout`: bound on an in-progress connect; 0 disables (default 0)
/// - `tcp_nodelay`: disable Nagle on connected TCP sockets (default true)
/// - `tcp_keepalive`: force keepalive on or off (default: OS setting)
/// - `tcp_keepalive_idle`, `tcp_keepalive_intvl`, `tcp_keepalive_cnt`
/// - `sndbuf`, `rcvbuf`: kernel buffer sizes in bytes (default: OS setting)
///
/// # Example
///
/// ```toml
/// reconnect_ivl = 100
/// reconnect_ivl_max = 1600
///
/// [backend]
/// connect_timeout = 2000
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnecterOptions {
    pub reconnect_ivl: Duration,
    pub reconnect_ivl_max: Duration,
    pub connect_timeout: Option<Duration>,
    pub tcp_nodelay: bool,
    pub tcp_keepalive: Option<bool>,
    pub tcp_keepalive_idle: Option<Duration>,
    pub tcp_keepalive_intvl: Option<Duration>,
    pub tcp_keepalive_cnt: Option<u32>,
    pub sndbuf: Option<usize>,
    pub rcvbuf: Option<usize>,
}

impl Default for ConnecterOptions {
    fn default() -> Self {
        Self {
            reconnect_ivl: Duration::from_millis(DEFAULT_RECONNECT_IVL_MS),
            reconnect_ivl_max: Duration::ZERO,
            connect_timeout: None,
            tcp_nodelay: true,
            tcp_keepalive: None,
            tcp_keepalive_idle: None,
            tcp_keepalive_intvl: None,
            tcp_keepalive_cnt: None,
            sndbuf: None,
            rcvbuf: None,
        }
    }
}

impl ConnecterOptions {
    /// Reads connecter options from the un-namespaced keys of `config`.
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        Self::from_config_named(config, "")
    }

    /// Reads connecter options, preferring `{name}.{key}` over `{key}`.
    pub fn from_config_named(config: &Config, name: &str) -> Result<Self, Error> {
        let defaults = Self::default();

        let reconnect_ivl =
            optional_millis(config, name, "reconnect_ivl")?.unwrap_or(defaults.reconnect_ivl);
        let reconnect_ivl_max = optional_millis(config, name, "reconnect_ivl_max")?
            .unwrap_or(defaults.reconnect_ivl_max);
        let connect_timeout =
            optional_millis(config, name, "connect_timeout")?.filter(|t| !t.is_zero());

        let keepalive_cnt = optional(get_namespaced_u64(config, name, "tcp_keepalive_cnt"))?;
        let tcp_keepalive_cnt = match keepalive_cnt {
            Some(cnt) => Some(u32::try_from(cnt).map_err(|_| Error::InvalidOption {
                key: "tcp_keepalive_cnt".to_string(),
                reason: format!("{cnt} does not fit in 32 bits"),
            })?),
            None => None,
        };

        let options = Self {
            reconnect_ivl,
            reconnect_ivl_max,
            connect_timeout,
            tcp_nodelay: optional(get_namespaced_bool(config, name, "tcp_nodelay"))?
                .unwrap_or(defaults.tcp_nodelay),
            tcp_keepalive: optional(get_namespaced_bool(config, name, "tcp_keepalive"))?,
            tcp_keepalive_idle: optional_millis(config, name, "tcp_keepalive_idle")?,
            tcp_keepalive_intvl: optional_millis(config, name, "tcp_keepalive_intvl")?,
            tcp_keepalive_cnt,
            sndbuf: optional(get_namespaced_usize(config, name, "sndbuf"))?,
            rcvbuf: optional(get_namespaced_usize(config, name, "rcvbuf"))?,
        };
        options.validate()?;
        Ok(options)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.reconnect_ivl.is_zero() {
            return Err(Error::InvalidOption {
                key: "reconnect_ivl".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.tcp_keepalive == Some(false)
            && (self.tcp_keepalive_idle.is_some()
                || self.tcp_keepalive_intvl.is_some()
                || self.tcp_keepalive_cnt.is_some())
        {
            return Err(Error::InvalidOption {
                key: "tcp_keepalive".to_string(),
                reason: "keepalive tuning keys given but keepalive is disabled".to_string(),
            });
        }
        Ok(())
    }

    /// Whether the reconnect interval grows after consecutive failures.
    pub fn has_backoff(&self) -> bool {
        self.reconnect_ivl_max > self.reconnect_ivl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_keys_missing() {
        let config = Config::builder().build().unwrap();
        let options = ConnecterOptions::from_config(&config).unwrap();
        assert_eq!(options, ConnecterOptions::default());
        assert!(!options.has_backoff());
    }

    #[test]
    fn namespaced_keys_take_priority() {
        let config = Config::builder()
            .set_default("reconnect_ivl", 50)
            .unwrap()
            .set_default("backend.reconnect_ivl", 250)
            .unwrap()
            .set_default("reconnect_ivl_max", 4000)
            .unwrap()
            .set_default("connect_timeout", 0)
            .unwrap()
            .build()
            .unwrap();

        let global = ConnecterOptions::from_config(&config).unwrap();
        assert_eq!(global.reconnect_ivl, Duration::from_millis(50));

        let named = ConnecterOptions::from_config_named(&config, "backend").unwrap();
        assert_eq!(named.reconnect_ivl, Duration::from_millis(250));
        assert_eq!(named.reconnect_ivl_max, Duration::from_millis(4000));
        assert_eq!(named.connect_timeout, None);
        assert!(named.has_backoff());
    }

    #[test]
    fn malformed_value_is_an_error() {
        let config = Config::builder()
            .set_default("reconnect_ivl", "soon")
            .unwrap()
            .build()
            .unwrap();
        assert!(matches!(
            ConnecterOptions::from_config(&config),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn zero_reconnect_ivl_is_rejected() {
        let config = Config::builder()
            .set_default("reconnect_ivl", 0)
            .unwrap()
            .build()
            .unwrap();
        assert!(matches!(
            ConnecterOptions::from_config(&config),
            Err(Error::InvalidOption { key, .. }) if key == "reconnect_ivl"
        ));
    }

    #[test]
    fn keepalive_tuning_requires_keepalive() {
        let config = Config::builder()
            .set_default("tcp_keepalive", false)
            .unwrap()
            .set_default("tcp_keepalive_idle", 30_000)
            .unwrap()
            .build()
            .unwrap();
        assert!(ConnecterOptions::from_config(&config).is_err());
    }
}
