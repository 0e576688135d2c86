use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const APP_NAME: &str = "timely";
const ENV_PREFIX: &str = "TIMELY_";

#[derive(Parser, Debug, Default)]
#[command(version, about = "Timely event management server")]
pub struct Args {
    /// Path to a TOML config file. Defaults to $XDG_CONFIG_HOME/timely/config.toml
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Address the web server listens on, e.g. 127.0.0.1:3000
    #[arg(long)]
    pub address: Option<SocketAddrV4>,

    /// Location of the SQLite database
    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// Directory served under /static
    #[arg(long)]
    pub static_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    pub address: SocketAddrV4,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Sessions expire after this many seconds without a request.
    pub ttl_secs: i64,
    /// Only send the session cookie over HTTPS.
    pub secure_cookie: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 24 * 60 * 60,
            secure_cookie: false,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    pub web: WebConfig,
    pub db_path: PathBuf,
    pub static_dir: PathBuf,
    pub session: SessionConfig,
    /// Key signing the OAuth `state` parameter.
    #[serde(default)]
    pub oauth_state_secret: Option<String>,
}

// Keeps the signing secret out of the logs
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("web", &self.web)
            .field("db_path", &self.db_path)
            .field("static_dir", &self.static_dir)
            .field("session", &self.session)
            .field(
                "oauth_state_secret",
                &self.oauth_state_secret.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let args = Args::parse();
        let dirs = xdg::BaseDirectories::with_prefix(APP_NAME)
            .context("failed to determine XDG base directories")?;

        let defaults = Config {
            web: WebConfig {
                address: SocketAddrV4::new(Ipv4Addr::LOCALHOST, 3000),
            },
            db_path: dirs.get_data_home().join("timely.db"),
            static_dir: PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/public")),
            session: SessionConfig::default(),
            oauth_state_secret: None,
        };

        let config_file = args
            .config
            .clone()
            .or_else(|| dirs.find_config_file("config.toml"));

        Self::figment(defaults, config_file, &args)
            .extract::<Config>()
            .context("failed to load configuration")
            .map(Config::with_state_secret)
    }

    /// Layers, from lowest to highest precedence: built-in defaults, the config file,
    /// `TIMELY_` environment variables (nested keys separated by `__`) and command line flags.
    fn figment(defaults: Config, config_file: Option<PathBuf>, args: &Args) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(defaults));

        if let Some(path) = config_file {
            debug!("Reading configuration from {}", path.display());
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        if let Some(address) = args.address {
            figment = figment.merge(Serialized::default("web.address", address));
        }
        if let Some(db_path) = &args.db_path {
            figment = figment.merge(Serialized::default("db_path", db_path));
        }
        if let Some(static_dir) = &args.static_dir {
            figment = figment.merge(Serialized::default("static_dir", static_dir));
        }

        figment
    }

    fn with_state_secret(mut self) -> Self {
        if self.oauth_state_secret.is_none() {
            warn!("No oauth_state_secret configured, OAuth sign-ins will not survive a restart");
            self.oauth_state_secret = Some(random_secret());
        }
        self
    }

    pub fn state_secret(&self) -> &str {
        self.oauth_state_secret.as_deref().unwrap_or_default()
    }
}

fn random_secret() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect()
}
