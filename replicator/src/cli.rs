use clap::{Args, Parser, Subcommand, ValueEnum};
use config::shared::{
    CaptureConfig, ReplicationMode, ReplicatorConfig, SnapshotConfig, SnowflakeConfig,
    TidbConnectionConfig, TidbTlsConfig,
};

#[derive(Debug, Parser)]
#[command(name = "replicator", version, about = "Replicates a TiDB table into Snowflake")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Runs a replication configured by command line flags.
    Run(Box<RunArgs>),
    /// Runs a replication configured by files under `configuration/` and `APP_` variables.
    RunFromConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    Full,
    SnapshotOnly,
    IncrementalOnly,
}

impl From<Mode> for ReplicationMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Full => ReplicationMode::Full,
            Mode::SnapshotOnly => ReplicationMode::SnapshotOnly,
            Mode::IncrementalOnly => ReplicationMode::IncrementalOnly,
        }
    }
}

#[derive(Debug, Args)]
pub struct RunArgs {
    #[arg(long, value_enum, default_value_t = Mode::Full)]
    pub mode: Mode,
    /// Source table as `<schema>.<table>`.
    #[arg(long)]
    pub table: String,
    /// Workspace URI (`s3://`, `gs://` or `gcs://`).
    #[arg(long)]
    pub storage: String,

    #[arg(long = "tidb.host", default_value = "127.0.0.1")]
    pub tidb_host: String,
    #[arg(long = "tidb.port", default_value_t = 4000)]
    pub tidb_port: u16,
    #[arg(long = "tidb.user", default_value = "root")]
    pub tidb_user: String,
    #[arg(long = "tidb.pass", env = "TIDB_PASSWORD", hide_env_values = true)]
    pub tidb_pass: Option<String>,
    /// Enables TLS to the source with this CA file.
    #[arg(long = "tidb.ssl-ca")]
    pub tidb_ssl_ca: Option<String>,

    #[arg(long = "snowflake.account-id", default_value = "")]
    pub snowflake_account_id: String,
    #[arg(long = "snowflake.warehouse", default_value = "COMPUTE_WH")]
    pub snowflake_warehouse: String,
    #[arg(long = "snowflake.user")]
    pub snowflake_user: String,
    #[arg(long = "snowflake.token", env = "SNOWFLAKE_TOKEN", hide_env_values = true)]
    pub snowflake_token: String,
    #[arg(long = "snowflake.database")]
    pub snowflake_database: String,
    #[arg(long = "snowflake.schema")]
    pub snowflake_schema: String,
    #[arg(long = "snowflake.role")]
    pub snowflake_role: Option<String>,
    /// Overrides the SQL API endpoint of the account.
    #[arg(long = "snowflake.endpoint")]
    pub snowflake_endpoint: Option<String>,
    #[arg(long = "snowflake.storage-integration")]
    pub snowflake_storage_integration: Option<String>,

    #[arg(long = "snapshot-concurrency", default_value_t = 8)]
    pub snapshot_concurrency: u16,
    #[arg(long = "dumpling-path", default_value = "dumpling")]
    pub dumpling_path: String,

    #[arg(long = "cdc.host", default_value = "127.0.0.1")]
    pub cdc_host: String,
    #[arg(long = "cdc.port", default_value_t = 8300)]
    pub cdc_port: u16,
    /// Flush interval of the capture sink, in milliseconds.
    #[arg(long = "cdc.flush-interval", default_value_t = 60_000)]
    pub cdc_flush_interval: u64,
    /// Maximum size of a change file, in bytes.
    #[arg(long = "cdc.file-size", default_value_t = 64 * 1024 * 1024)]
    pub cdc_file_size: u64,
    /// Sink of an existing capture job, for incremental-only runs.
    #[arg(long = "sink-uri")]
    pub sink_uri: Option<String>,

    /// Time zone of the warehouse session.
    #[arg(long)]
    pub tz: Option<String>,

    #[arg(long = "log.file")]
    pub log_file: Option<String>,
    #[arg(long = "log.level")]
    pub log_level: Option<String>,
}

impl RunArgs {
    /// Builds the replicator configuration the flags describe.
    pub fn to_config(&self) -> ReplicatorConfig {
        ReplicatorConfig {
            mode: self.mode.into(),
            table: self.table.clone(),
            workspace: self.storage.clone(),
            source: TidbConnectionConfig {
                host: self.tidb_host.clone(),
                port: self.tidb_port,
                username: self.tidb_user.clone(),
                password: self.tidb_pass.as_deref().map(Into::into),
                tls: TidbTlsConfig {
                    enabled: self.tidb_ssl_ca.is_some(),
                    ssl_ca: self.tidb_ssl_ca.clone(),
                },
            },
            warehouse: SnowflakeConfig {
                account_id: self.snowflake_account_id.clone(),
                warehouse: self.snowflake_warehouse.clone(),
                database: self.snowflake_database.clone(),
                schema: self.snowflake_schema.clone(),
                user: self.snowflake_user.clone(),
                role: self.snowflake_role.clone(),
                token: self.snowflake_token.as_str().into(),
                endpoint: self.snowflake_endpoint.clone(),
                storage_integration: self.snowflake_storage_integration.clone(),
            },
            capture: CaptureConfig {
                host: self.cdc_host.clone(),
                port: self.cdc_port,
                flush_interval_ms: self.cdc_flush_interval,
                file_size: self.cdc_file_size,
                sink_uri: self.sink_uri.clone(),
            },
            snapshot: SnapshotConfig {
                concurrency: self.snapshot_concurrency,
                extractor_path: self.dumpling_path.clone(),
            },
            timezone: self.tz.clone(),
        }
    }
}
