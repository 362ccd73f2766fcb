use anyhow::bail;
use clap::{Parser, ValueEnum};
use core::{num::NonZeroU64, time::Duration};

/// Output format for log lines.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, human readable.
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Runtime configuration for the `infinity-server` binary.
///
/// These settings control how responses are flushed, how much the unsafe
/// mode may buffer, and how long streams may run. All values are parsed from
/// CLI arguments or environment variables (a `.env` file is honored), with
/// defaults suitable for local experiments.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "infinity-server",
    version,
    about = "An HTTP service that streams arbitrarily long JSON arrays"
)]
pub struct CliArgs {
    /// Address to listen on.
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:5000"))]
    pub server_addr: String,

    /// Default `K` for the flush-every-N route when the request does not
    /// provide `?every=`.
    ///
    /// Environment variable: `FLUSH_INTERVAL`
    #[arg(long, env = "FLUSH_INTERVAL", default_value_t = infinity::DEFAULT_FLUSH_INTERVAL)]
    pub flush_interval: u64,

    /// Ceiling on records the unsafe route may collect before serializing.
    ///
    /// Exceeding it fails the request with a 500 before any byte is sent.
    ///
    /// Environment variable: `MAX_BUFFERED_RECORDS`
    #[arg(long, env = "MAX_BUFFERED_RECORDS", default_value_t = 8192)]
    pub max_buffered_records: usize,

    /// Optional cap on the count a single request may ask for, on every
    /// route. Requests above it are rejected with a 400.
    ///
    /// Environment variable: `MAX_RECORDS`
    #[arg(long, env = "MAX_RECORDS")]
    pub max_records: Option<u64>,

    /// Number of body frames queued between the encoder and the connection
    /// before the encoder has to wait for the client.
    ///
    /// Lower values increase backpressure responsiveness; higher values
    /// tolerate burstier clients.
    ///
    /// Environment variable: `STREAM_BUFFER_SIZE`
    #[arg(long, env = "STREAM_BUFFER_SIZE", default_value_t = 8)]
    pub stream_buffer_size: usize,

    /// Cancels a stream that has been running longer than this many seconds.
    ///
    /// Environment variable: `STREAM_TIMEOUT_SECS`
    #[arg(long, env = "STREAM_TIMEOUT_SECS")]
    pub stream_timeout_secs: Option<u64>,

    /// How long shutdown waits for in-flight streams before cancelling them.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT_SECS`
    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS", default_value_t = 5)]
    pub shutdown_timeout_secs: u64,

    /// Log output format.
    ///
    /// Environment variable: `LOG_FORMAT`
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "pretty")]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub flush_interval: NonZeroU64,
    pub max_buffered_records: usize,
    pub max_records: Option<u64>,
    pub stream_buffer_size: usize,
    pub stream_timeout: Option<Duration>,
    pub shutdown_timeout: Duration,
    pub log_format: LogFormat,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let Some(flush_interval) = NonZeroU64::new(args.flush_interval) else {
            bail!("FLUSH_INTERVAL must be greater than 0");
        };

        if args.max_buffered_records == 0 {
            bail!("MAX_BUFFERED_RECORDS must be greater than 0");
        }

        // `mpsc::channel` panics on a zero capacity.
        if args.stream_buffer_size == 0 {
            bail!("STREAM_BUFFER_SIZE must be greater than 0");
        }

        if args.stream_timeout_secs == Some(0) {
            bail!("STREAM_TIMEOUT_SECS must be greater than 0 when set");
        }

        Ok(Self {
            server_addr: args.server_addr,
            flush_interval,
            max_buffered_records: args.max_buffered_records,
            max_records: args.max_records,
            stream_buffer_size: args.stream_buffer_size,
            stream_timeout: args.stream_timeout_secs.map(Duration::from_secs),
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout_secs),
            log_format: args.log_format,
        })
    }
}

#[cfg(test)]
impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_addr: String::from("127.0.0.1:0"),
            flush_interval: NonZeroU64::new(infinity::DEFAULT_FLUSH_INTERVAL)
                .expect("default interval is non-zero"),
            max_buffered_records: 8192,
            max_records: None,
            stream_buffer_size: 8,
            stream_timeout: None,
            shutdown_timeout: Duration::from_secs(5),
            log_format: LogFormat::Pretty,
        }
    }
}
