use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

/// Filter directives that replace `--log-level` when set.
pub const LOG_ENV: &str = "NMEAPLEX_LOG";

// Crates whose events `--log-level` applies to. Everything else is capped
// at warn so dependency chatter stays out of interface logs.
const NMEAPLEX_TARGETS: [&str; 4] = [
    "nmeaplex",
    "nmeaplex_core",
    "nmeaplex_transport",
    "nmeaplex_frame",
];

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

fn default_directives(level: LogLevel) -> String {
    let others = if level == LogLevel::Error { "error" } else { "warn" };
    NMEAPLEX_TARGETS
        .iter()
        .fold(others.to_string(), |mut out, target| {
            out.push(',');
            out.push_str(target);
            out.push('=');
            out.push_str(level.as_str());
            out
        })
}

fn build_filter(level: LogLevel, env: Option<&str>) -> EnvFilter {
    if let Some(directives) = env.map(str::trim).filter(|d| !d.is_empty()) {
        match EnvFilter::try_new(directives) {
            Ok(filter) => return filter,
            Err(err) => eprintln!("warning: ignoring {LOG_ENV}: {err}"),
        }
    }
    EnvFilter::new(default_directives(level))
}

/// Install the stderr subscriber.
///
/// Every interface runs on its own named thread, so thread names are
/// included in each line.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let env = std::env::var(LOG_ENV).ok();
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(build_filter(level, env.as_deref()))
        .with_ansi(false)
        .with_target(false)
        .with_thread_names(true);

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
    }
}
