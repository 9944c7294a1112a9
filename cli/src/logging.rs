//! Structured logging setup.
//!
//! Logs go to stderr so command output on stdout stays machine-readable.
//!
//! ```text
//! LENDWATCH_LOG=info,lendwatch-queue=debug lendwatch worker
//! LENDWATCH_LOG_JSON=1 lendwatch worker
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default level (`trace`, `debug`, `info`, `warn`, `error`).
    #[serde(default = "default_level")]
    pub level: String,
    /// Per-crate overrides, e.g. `lendwatch-store → debug`.
    #[serde(default)]
    pub components: HashMap<String, String>,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String {
    "info".into()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            components: HashMap::new(),
            json: false,
        }
    }
}

impl LogConfig {
    /// Read `LENDWATCH_LOG` and `LENDWATCH_LOG_JSON`.
    ///
    /// `LENDWATCH_LOG` is a comma list: a bare level sets the default, and
    /// `component=level` entries become overrides.
    pub fn from_env() -> Self {
        Self::parse(
            std::env::var("LENDWATCH_LOG").ok().as_deref(),
            std::env::var("LENDWATCH_LOG_JSON").ok().as_deref(),
        )
    }

    fn parse(directives: Option<&str>, json: Option<&str>) -> Self {
        let mut cfg = Self::default();
        for part in directives.unwrap_or_default().split(',') {
            let part = part.trim();
            match part.split_once('=') {
                Some((component, level)) => {
                    cfg.components.insert(component.trim().into(), level.trim().into());
                }
                None if !part.is_empty() => cfg.level = part.into(),
                None => {}
            }
        }
        cfg.json = matches!(json.map(str::trim), Some("1" | "true" | "yes"));
        cfg
    }

    /// `EnvFilter` directive string: default level, then per-crate overrides.
    fn directives(&self) -> String {
        let mut directives = self.level.clone();
        let mut components: Vec<_> = self.components.iter().collect();
        components.sort();
        for (component, level) in components {
            directives.push_str(&format!(",{}={}", component.replace('-', "_"), level));
        }
        directives
    }
}

/// Install the global subscriber. Call once, before any command runs.
pub fn init_tracing(config: &LogConfig) {
    let filter = EnvFilter::try_new(config.directives()).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if config.json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
