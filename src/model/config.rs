use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DOCUMENT_PATH: &str = "/plant.xml";
const MIN_POLL_TIME: Duration = Duration::from_secs(1);
const MAX_POLL_TIME: Duration = Duration::from_secs(24 * 60 * 60);

//The fetch must give up well before the next tick is due
const FETCH_TIMEOUT_RATIO: f64 = 0.75;

fn default_poll_time() -> Duration {
    Duration::from_secs(60)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WatchConfig {
    pub host: String,
    #[serde(default = "default_poll_time", with = "humantime_serde")]
    pub poll_time: Duration,
}

impl WatchConfig {
    pub fn new(host: impl Into<String>) -> Self {
        WatchConfig {
            host: host.into(),
            poll_time: default_poll_time(),
        }
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn url(&self) -> String {
        format!("http://{}{}", self.host, DOCUMENT_PATH)
    }

    pub fn fetch_timeout(&self) -> Duration {
        self.poll_time.mul_f64(FETCH_TIMEOUT_RATIO)
    }

    pub fn validate(&self) -> Result<()> {
        let mut error_string = String::new();

        if self.host.trim().is_empty() {
            error_string += "\thost: no host was provided\n";
        } else {
            if self.host.contains("://") {
                error_string += &format!(
                    "\thost: \"{}\" must not contain a scheme, only host[:port]\n",
                    self.host
                );
            }
            if self.host.contains('/') && !self.host.contains("://") {
                error_string += &format!(
                    "\thost: \"{}\" must not contain a path, only host[:port]\n",
                    self.host
                );
            }
            if self.host.chars().any(char::is_whitespace) {
                error_string += &format!("\thost: \"{}\" contains whitespace\n", self.host);
            }
        }

        if self.poll_time < MIN_POLL_TIME {
            error_string += &format!(
                "\tpoll_time: {} is too short, minimum is {}\n",
                humantime::format_duration(self.poll_time),
                humantime::format_duration(MIN_POLL_TIME)
            );
        }
        if self.poll_time > MAX_POLL_TIME {
            error_string += &format!(
                "\tpoll_time: {} is too long, maximum is {}\n",
                humantime::format_duration(self.poll_time),
                humantime::format_duration(MAX_POLL_TIME)
            );
        }

        if error_string.is_empty() {
            Ok(())
        } else {
            Err(anyhow!(error_string))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_time_defaults_to_a_minute() {
        let config = WatchConfig::from_json(r#"{ "host": "10.10.1.13" }"#).unwrap();

        assert_eq!(config.poll_time, Duration::from_secs(60));
        assert_eq!(config.fetch_timeout(), Duration::from_secs(45));
        assert_eq!(config.url(), "http://10.10.1.13/plant.xml");
        config.validate().unwrap();
    }

    #[test]
    fn poll_time_is_humantime() {
        let config =
            WatchConfig::from_json(r#"{ "host": "ccd.local:8080", "poll_time": "2m" }"#).unwrap();

        assert_eq!(config.poll_time, Duration::from_secs(120));
        assert_eq!(config.fetch_timeout(), Duration::from_secs(90));
        assert_eq!(config.url(), "http://ccd.local:8080/plant.xml");
    }

    #[test]
    fn missing_host_is_rejected_by_serde() {
        assert!(WatchConfig::from_json(r#"{ "poll_time": "1m" }"#).is_err());
    }

    #[test]
    fn validation_reports_every_problem() {
        let config = WatchConfig {
            host: "http://ccd".to_string(),
            poll_time: Duration::from_millis(200),
        };

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("scheme"));
        assert!(err.contains("poll_time"));
    }

    #[test]
    fn host_with_path_is_rejected() {
        let config = WatchConfig::new("ccd/plant.xml");
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("path"));
    }

    #[test]
    fn empty_host_is_rejected() {
        assert!(WatchConfig::new("  ").validate().is_err());
    }

    #[test]
    fn absurd_poll_time_is_rejected() {
        let mut config = WatchConfig::new("ccd");
        config.poll_time = humantime::parse_duration("300000000000y").unwrap();

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("too long"));

        config.poll_time = Duration::from_secs(24 * 60 * 60);
        assert!(config.validate().is_ok());
    }
}
