//! Logging Infrastructure
//!
//! Console logging plus optional daily rotating files:
//! - `app/`      everything except the `audit` and `security` targets
//! - `audit/`    mirror of ledger appends (target `audit`)
//! - `security/` authentication and authorization failures (target `security`)

use std::fs;
use std::path::Path;

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, prelude::*};

/// Initialize the logging system
///
/// `RUST_LOG` overrides `level` when set. With `log_dir` present the three
/// file layers are added; the directory is created if needed.
///
/// Calling it twice returns an error instead of panicking, so the interactive
/// shell and tests can share a process.
pub fn init_logger_with_file(
    level: &str,
    json_format: bool,
    log_dir: Option<&Path>,
) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(env_filter);

    let console_layer = if json_format {
        fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let Some(dir) = log_dir else {
        registry.with(console_layer).try_init()?;
        return Ok(());
    };

    let app_dir = dir.join("app");
    let audit_dir = dir.join("audit");
    let security_dir = dir.join("security");
    fs::create_dir_all(&app_dir)?;
    fs::create_dir_all(&audit_dir)?;
    fs::create_dir_all(&security_dir)?;

    let app_layer = fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_writer(RollingFileAppender::new(Rotation::DAILY, app_dir, "app"))
        .with_filter(tracing_subscriber::filter::filter_fn(|meta| {
            meta.target() != "audit" && meta.target() != "security"
        }));

    let audit_layer = fmt::layer()
        .json()
        .with_writer(RollingFileAppender::new(Rotation::DAILY, audit_dir, "audit"))
        .with_filter(tracing_subscriber::filter::filter_fn(|meta| {
            meta.target() == "audit"
        }));

    let security_layer = fmt::layer()
        .json()
        .with_writer(RollingFileAppender::new(
            Rotation::DAILY,
            security_dir,
            "security",
        ))
        .with_filter(tracing_subscriber::filter::filter_fn(|meta| {
            meta.target() == "security"
        }));

    registry
        .with(console_layer)
        .with(app_layer)
        .with(audit_layer)
        .with(security_layer)
        .try_init()?;

    Ok(())
}

/// Console-only logger
pub fn init_logger(level: &str, json_format: bool) -> anyhow::Result<()> {
    init_logger_with_file(level, json_format, None)
}

/// Security log helper - records authentication/authorization events
///
/// ```ignore
/// security_log!(WARN, "permission_denied", username = user.username.clone(), required_permission = "user:manage");
/// ```
#[macro_export]
macro_rules! security_log {
    (WARN, $event:expr, $($key:ident = $value:expr),* $(,)?) => {
        tracing::warn!(
            target: "security",
            event = $event,
            $($key = $value),*
        );
    };
    (INFO, $event:expr, $($key:ident = $value:expr),* $(,)?) => {
        tracing::info!(
            target: "security",
            event = $event,
            $($key = $value),*
        );
    };
}
