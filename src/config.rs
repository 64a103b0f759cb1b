use std::path::PathBuf;

/// Which durable backend the page server should use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageKind {
    File,
    S3,
    Hybrid,
}

/// Runtime configuration. Built from CLI args with manual flag parsing
/// (`--flag value`) rather than a derive-based parser — this binary only
/// has a handful of flags and none of them need subcommands or help text
/// generation.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_dir: PathBuf,
    pub cache_entries: usize,
    pub storage: StorageKind,
    pub s3_bucket: Option<String>,
    pub s3_prefix: String,
    pub s3_endpoint: Option<String>,
    pub s3_region: Option<String>,
    pub s3_access_key: Option<String>,
    pub s3_secret_key: Option<String>,
    pub s3_use_ssl: bool,
    pub api_key: Option<String>,
    /// Comma-separated in the CLI; split here since nothing downstream
    /// needs the raw string form.
    pub auth_tokens: Vec<String>,
    pub tls: bool,
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5454,
            data_dir: PathBuf::from("/tmp/pageserver-data"),
            cache_entries: 1024,
            storage: StorageKind::File,
            s3_bucket: None,
            s3_prefix: String::new(),
            s3_endpoint: None,
            s3_region: None,
            s3_access_key: None,
            s3_secret_key: None,
            s3_use_ssl: true,
            api_key: None,
            auth_tokens: Vec::new(),
            tls: false,
            tls_cert: None,
            tls_key: None,
        }
    }
}

impl Config {
    pub fn from_args(args: &[String]) -> Result<Self, String> {
        let mut config = Self::default();

        if let Some(v) = parse_flag_value(args, "--port") {
            config.port = v as u16;
        }
        if let Some(v) = parse_flag_string(args, "--data-dir") {
            config.data_dir = PathBuf::from(v);
        }
        if let Some(v) = parse_flag_value(args, "--cache-entries") {
            config.cache_entries = v as usize;
        }
        if let Some(v) = parse_flag_string(args, "--storage") {
            config.storage = match v.as_str() {
                "file" => StorageKind::File,
                "s3" => StorageKind::S3,
                "hybrid" => StorageKind::Hybrid,
                other => return Err(format!("unknown --storage value: {other}")),
            };
        }
        config.s3_bucket = parse_flag_string(args, "--s3-bucket");
        if let Some(v) = parse_flag_string(args, "--s3-prefix") {
            config.s3_prefix = v;
        }
        config.s3_endpoint = parse_flag_string(args, "--s3-endpoint");
        config.s3_region = parse_flag_string(args, "--s3-region");
        config.s3_access_key = parse_flag_string(args, "--s3-access-key");
        config.s3_secret_key = parse_flag_string(args, "--s3-secret-key");
        if let Some(v) = parse_flag_bool(args, "--use-ssl") {
            config.s3_use_ssl = v;
        }
        config.api_key = parse_flag_string(args, "--api-key");
        if let Some(v) = parse_flag_string(args, "--auth-tokens") {
            config.auth_tokens = v.split(',').map(str::to_string).filter(|s| !s.is_empty()).collect();
        }
        if let Some(v) = parse_flag_bool(args, "--tls") {
            config.tls = v;
        }
        config.tls_cert = parse_flag_string(args, "--tls-cert").map(PathBuf::from);
        config.tls_key = parse_flag_string(args, "--tls-key").map(PathBuf::from);

        if config.storage != StorageKind::File && config.s3_bucket.is_none() {
            return Err("--s3-bucket is required for --storage s3|hybrid".to_string());
        }
        if config.tls && (config.tls_cert.is_none() || config.tls_key.is_none()) {
            return Err("--tls requires --tls-cert and --tls-key".to_string());
        }

        Ok(config)
    }
}

fn parse_flag_value(args: &[String], flag: &str) -> Option<u64> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
}

fn parse_flag_string(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(|v| v.clone())
}

fn parse_flag_bool(args: &[String], flag: &str) -> Option<bool> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
}
