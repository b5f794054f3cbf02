use crate::encoder::PositionMode;
use crate::extent::{PageSize, PageUnit};
use crate::humanize::HumanDuration;
use serde::{Deserialize, Serialize};

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub page: PageConfig,
    #[serde(default)]
    pub print: PrintDefaults,
}

/// Remote print service connection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Base URL; reports are requested at `{url}/report.{format}`
    #[serde(default = "default_service_url")]
    pub url: String,
    /// Server-side template name
    #[serde(default = "default_layout")]
    pub layout: String,
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: HumanDuration,
    /// Applies to every single HTTP request, including each status poll
    #[serde(default = "default_request_timeout")]
    pub request_timeout: HumanDuration,
    /// Query parameter used to pass `layer_token` to layer sources
    #[serde(default = "default_token_param")]
    pub token_param: String,
    /// Layer access token (loaded from environment, not from config file)
    #[serde(skip)]
    pub layer_token: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            url: default_service_url(),
            layout: default_layout(),
            format: default_format(),
            user_agent: default_user_agent(),
            connect_timeout: default_connect_timeout(),
            request_timeout: default_request_timeout(),
            token_param: default_token_param(),
            layer_token: None,
        }
    }
}

fn default_service_url() -> String {
    "http://localhost:8080/print".to_string()
}

fn default_layout() -> String {
    "A4 portrait".to_string()
}

fn default_format() -> String {
    "pdf".to_string()
}

fn default_user_agent() -> String {
    "printbox/0.1.0".to_string()
}

fn default_connect_timeout() -> HumanDuration {
    HumanDuration::from_secs(10)
}

fn default_request_timeout() -> HumanDuration {
    HumanDuration::from_secs(30)
}

fn default_token_param() -> String {
    "key".to_string()
}

/// Status polling
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PollingConfig {
    /// Wait between two status requests
    #[serde(default = "default_poll_interval")]
    pub interval: HumanDuration,
    /// Overall deadline for a job to finish once submitted
    #[serde(default = "default_poll_timeout")]
    pub timeout: HumanDuration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: default_poll_interval(),
            timeout: default_poll_timeout(),
        }
    }
}

fn default_poll_interval() -> HumanDuration {
    HumanDuration::from_secs(1)
}

fn default_poll_timeout() -> HumanDuration {
    HumanDuration::from_secs(5 * 60)
}

/// Map frame size of the chosen layout
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PageConfig {
    #[serde(default = "default_page_width")]
    pub width: f64,
    #[serde(default = "default_page_height")]
    pub height: f64,
    #[serde(default)]
    pub unit: PageUnit,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            width: default_page_width(),
            height: default_page_height(),
            unit: PageUnit::default(),
        }
    }
}

impl PageConfig {
    pub fn page_size(&self) -> PageSize {
        PageSize {
            width: self.width,
            height: self.height,
            unit: self.unit,
        }
    }
}

fn default_page_width() -> f64 {
    254.0
}

fn default_page_height() -> f64 {
    675.0
}

/// Defaults for a print request when the caller does not override them
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PrintDefaults {
    #[serde(default = "default_dpi")]
    pub dpi: u32,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub position: PositionMode,
    /// Clip WMS requests and vector features to the printed extent
    #[serde(default)]
    pub clip_to_extent: bool,
}

impl Default for PrintDefaults {
    fn default() -> Self {
        Self {
            dpi: default_dpi(),
            scale: default_scale(),
            position: PositionMode::default(),
            clip_to_extent: false,
        }
    }
}

fn default_dpi() -> u32 {
    254
}

fn default_scale() -> f64 {
    50000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.service.format, "pdf");
        assert_eq!(config.polling.interval.as_duration(), Duration::from_secs(1));
        assert_eq!(config.polling.timeout.as_duration(), Duration::from_secs(300));
        assert_eq!(config.page.page_size(), PageSize::millimetres(254.0, 675.0));
        assert_eq!(config.print.dpi, 254);
        assert!(config.service.layer_token.is_none());
    }

    #[test]
    fn test_parse_from_toml() {
        let config: Config = toml::from_str(
            r#"
[service]
url = "https://geomapfish-demo-2-8.camptocamp.com/printproxy"
layout = "2 A4 landscape"

[polling]
interval = "250ms"
timeout = "1m"

[page]
width = 802
height = 530
unit = "points"
            "#,
        )
        .unwrap();

        assert_eq!(config.service.layout, "2 A4 landscape");
        assert_eq!(config.service.format, "pdf");
        assert_eq!(config.polling.interval.as_duration(), Duration::from_millis(250));
        assert_eq!(config.page.unit, PageUnit::Points);
        assert_eq!(config.print.position, PositionMode::Center);
    }
}
