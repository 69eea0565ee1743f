//! Ingestion settings.
//!
//! Resolved in layers: built-in defaults, then an optional TOML file
//! (`--config`, `$MAILSIFT_CONFIG`, or `<config dir>/mailsift/config.toml`),
//! then `MAILSIFT_*` environment variables. Command-line flags are applied
//! last by the binary.
use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_QUERY: &str =
    r#"("job alert" OR "medium" OR "联合早报" OR "eCHO") newer_than:3d"#;
pub const DEFAULT_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/";

/// What to do with messages that carry no usable Subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubjectlessPolicy {
    /// Every subject-less message lands in the one `INBOX` folder.
    Shared,
    /// Subject-less messages get `INBOX`, `INBOX_1`, ... like any collision.
    #[default]
    Unique,
}

impl FromStr for SubjectlessPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "shared" => Ok(Self::Shared),
            "unique" => Ok(Self::Unique),
            other => Err(format!("unknown subjectless policy '{other}'")),
        }
    }
}

/// Which member of a duplicate group survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeepPolicy {
    /// Lexicographically smallest folder name.
    #[default]
    FirstByName,
    /// First entry as returned by the directory listing (platform dependent).
    ListingOrder,
}

impl FromStr for KeepPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "first-by-name" | "name" => Ok(Self::FirstByName),
            "listing-order" | "listing" => Ok(Self::ListingOrder),
            other => Err(format!("unknown keep policy '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub dest_root: PathBuf,
    pub user_id: String,
    pub query: String,
    pub concurrency: usize,
    pub attachment_retries: u32,
    pub subjectless: SubjectlessPolicy,
    pub keep: KeepPolicy,
    pub dedupe: bool,
    pub dry_run: bool,
    pub api_base: String,
    pub access_token: Option<String>,
    pub log_level: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            dest_root: PathBuf::from("temp").join("mails"),
            user_id: "me".to_string(),
            query: DEFAULT_QUERY.to_string(),
            concurrency: 1,
            attachment_retries: 2,
            subjectless: SubjectlessPolicy::default(),
            keep: KeepPolicy::default(),
            dedupe: true,
            dry_run: false,
            api_base: DEFAULT_API_BASE.to_string(),
            access_token: None,
            log_level: "info".to_string(),
        }
    }
}

/// Shape of the optional TOML file. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub dest_root: Option<PathBuf>,
    pub user_id: Option<String>,
    pub query: Option<String>,
    pub concurrency: Option<usize>,
    pub attachment_retries: Option<u32>,
    pub subjectless: Option<SubjectlessPolicy>,
    pub keep: Option<KeepPolicy>,
    pub dedupe: Option<bool>,
    pub api_base: Option<String>,
    pub access_token: Option<String>,
    pub log_level: Option<String>,
}

impl FileConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("parsing config TOML")
    }

    pub fn read(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("in {}", path.display()))
    }
}

impl IngestConfig {
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = config_file_path(explicit) {
            let file = FileConfig::read(&path)?;
            config.apply_file(file);
        }
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_file(&mut self, file: FileConfig) {
        if let Some(v) = file.dest_root {
            self.dest_root = v;
        }
        if let Some(v) = file.user_id {
            self.user_id = v;
        }
        if let Some(v) = file.query {
            self.query = v;
        }
        if let Some(v) = file.concurrency {
            self.concurrency = v;
        }
        if let Some(v) = file.attachment_retries {
            self.attachment_retries = v;
        }
        if let Some(v) = file.subjectless {
            self.subjectless = v;
        }
        if let Some(v) = file.keep {
            self.keep = v;
        }
        if let Some(v) = file.dedupe {
            self.dedupe = v;
        }
        if let Some(v) = file.api_base {
            self.api_base = v;
        }
        if file.access_token.is_some() {
            self.access_token = file.access_token;
        }
        if let Some(v) = file.log_level {
            self.log_level = v;
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(v) = env::var("MAILSIFT_DEST") {
            self.dest_root = PathBuf::from(v);
        }
        if let Ok(v) = env::var("MAILSIFT_USER_ID") {
            self.user_id = v;
        }
        if let Ok(v) = env::var("MAILSIFT_QUERY") {
            self.query = v;
        }
        if let Some(v) = env_parse::<usize>("MAILSIFT_CONCURRENCY")? {
            self.concurrency = v;
        }
        if let Some(v) = env_parse::<u32>("MAILSIFT_ATTACHMENT_RETRIES")? {
            self.attachment_retries = v;
        }
        if let Some(v) = env_parse::<SubjectlessPolicy>("MAILSIFT_SUBJECTLESS")? {
            self.subjectless = v;
        }
        if let Some(v) = env_parse::<KeepPolicy>("MAILSIFT_KEEP")? {
            self.keep = v;
        }
        if let Ok(v) = env::var("MAILSIFT_DEDUPE") {
            self.dedupe = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Ok(v) = env::var("MAILSIFT_API_BASE") {
            self.api_base = v;
        }
        if let Some(token) = env::var("MAILSIFT_ACCESS_TOKEN")
            .ok()
            .or_else(|| env::var("GMAIL_ACCESS_TOKEN").ok())
        {
            self.access_token = Some(token);
        }
        if let Ok(v) = env::var("MAILSIFT_LOG") {
            self.log_level = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            anyhow::bail!("concurrency must be at least 1");
        }
        if self.user_id.trim().is_empty() {
            anyhow::bail!("user id must not be empty");
        }
        url::Url::parse(&self.api_base)
            .with_context(|| format!("invalid api base url {}", self.api_base))?;
        Ok(())
    }
}

fn config_file_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Ok(path) = env::var("MAILSIFT_CONFIG") {
        return Some(PathBuf::from(path));
    }
    let default = dirs::config_dir()?.join("mailsift").join("config.toml");
    default.is_file().then_some(default)
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{key}={raw}: {e}")),
        Err(_) => Ok(None),
    }
}
