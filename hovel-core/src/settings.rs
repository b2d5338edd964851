use serde::Deserialize;
use std::path::PathBuf;

/// Runtime configuration, sourced from the environment.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    #[serde(default = "default_advertised_host")]
    pub advertised_host: String,

    #[serde(default = "default_template_path")]
    pub template_path: PathBuf,

    #[serde(default = "default_workspaces_root")]
    pub workspaces_root: PathBuf,

    #[serde(default = "default_base_branch_port")]
    pub base_branch_port: u16,

    #[serde(default = "default_max_branch_port")]
    pub max_branch_port: u16,

    #[serde(default = "default_build_concurrency")]
    pub build_concurrency: usize,

    #[serde(default = "default_build_timeout_secs")]
    pub build_timeout_secs: u64,

    #[serde(default = "default_ttyd_command")]
    pub ttyd_command: String,

    #[serde(default = "default_gemini_api_base")]
    pub gemini_api_base: String,
}

fn default_listen_port() -> u16 {
    env_parsed("HOVEL_PORT", 8000)
}

fn default_advertised_host() -> String {
    std::env::var("HOVEL_HOST").unwrap_or_else(|_| "localhost".to_string())
}

fn default_template_path() -> PathBuf {
    std::env::var("APP_TEMPLATE_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/opt/hovel-templates/app-template"))
}

fn default_workspaces_root() -> PathBuf {
    std::env::var("WORKSPACES_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./branches"))
}

fn default_base_branch_port() -> u16 {
    env_parsed("BASE_BRANCH_PORT", 8001)
}

fn default_max_branch_port() -> u16 {
    env_parsed("MAX_BRANCH_PORT", 8999)
}

fn default_build_concurrency() -> usize {
    env_parsed("BUILD_CONCURRENCY", 4)
}

fn default_build_timeout_secs() -> u64 {
    env_parsed("BUILD_TIMEOUT_SEC", 600)
}

fn default_ttyd_command() -> String {
    std::env::var("TTYD_COMMAND").unwrap_or_else(|_| "gemini".to_string())
}

fn default_gemini_api_base() -> String {
    std::env::var("GEMINI_API_BASE")
        .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".to_string())
}

fn env_parsed<T: std::str::FromStr>(var: &str, fallback: T) -> T {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(fallback)
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_port: default_listen_port(),
            advertised_host: default_advertised_host(),
            template_path: default_template_path(),
            workspaces_root: default_workspaces_root(),
            base_branch_port: default_base_branch_port(),
            max_branch_port: default_max_branch_port(),
            build_concurrency: default_build_concurrency(),
            build_timeout_secs: default_build_timeout_secs(),
            ttyd_command: default_ttyd_command(),
            gemini_api_base: default_gemini_api_base(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn bind_addr(&self) -> String {
        format!("0.0.0.0:{}", self.listen_port)
    }
}
