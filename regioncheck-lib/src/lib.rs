use crate::{
    common::http::HttpBatchExecutor,
    config::{InternalConfig, def},
    probe::{Evaluator, Selection, TransportError},
};

use std::{io, path::PathBuf, sync::Arc, sync::OnceLock};
use thiserror::Error;
use tracing::{error, info};

pub mod app;
pub mod common;
pub mod config;
pub mod probe;
pub mod service;

pub use config::def::{Config as RegionCheckConfigDef, LogLevel};
pub use probe::{Outbound, OutboundReport, Outcome};

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("batch mismatch: {0}")]
    BatchMismatch(String),
    #[error("unknown service: {0}")]
    UnknownService(String),
    #[error("no outbound is available")]
    NoOutboundAvailable,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
pub type Result<T> = std::result::Result<T, Error>;

pub struct Options {
    pub config: Config,
    pub cwd: Option<String>,
    /// Probe this service instead of the configured one
    pub service: Option<String>,
    pub rt: Option<TokioRuntime>,
    pub log_file: Option<String>,
}

pub enum TokioRuntime {
    MultiThread,
    SingleThread,
}

pub enum Config {
    Def(def::Config),
    Internal(InternalConfig),
    File(String),
    Str(String),
}

impl Config {
    pub fn try_parse(self) -> Result<InternalConfig> {
        match self {
            Config::Def(c) => c.try_into(),
            Config::Internal(c) => Ok(c),
            Config::File(file) => {
                TryInto::<def::Config>::try_into(PathBuf::from(file))?.try_into()
            }
            Config::Str(s) => s.parse::<def::Config>()?.try_into(),
        }
    }
}

static CRYPTO_PROVIDER_LOCK: OnceLock<()> = OnceLock::new();

pub fn setup_default_crypto_provider() {
    CRYPTO_PROVIDER_LOCK.get_or_init(|| {
        #[cfg(feature = "aws-lc-rs")]
        {
            _ = rustls::crypto::aws_lc_rs::default_provider().install_default()
        }
        #[cfg(all(feature = "ring", not(feature = "aws-lc-rs")))]
        {
            _ = rustls::crypto::ring::default_provider().install_default()
        }
    });
}

/// Parses the config, sets up logging and runs one evaluation on a fresh
/// runtime.
pub fn start_scaffold(opts: Options) -> Result<Selection> {
    let rt = match opts.rt.as_ref().unwrap_or(&TokioRuntime::MultiThread) {
        TokioRuntime::MultiThread => tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?,
        TokioRuntime::SingleThread => tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?,
    };
    let config: InternalConfig = opts.config.try_parse()?;
    let cwd = opts.cwd.unwrap_or_else(|| ".".to_string());

    app::logging::setup_logging(config.general.log_level, &cwd, opts.log_file);

    rt.block_on(async {
        match run(config, opts.service).await {
            Err(e) => {
                error!("evaluation failed: {e}");
                Err(e)
            }
            Ok(selection) => Ok(selection),
        }
    })
}

/// Probes the configured outbounds over HTTP and selects one.
pub async fn run(
    config: InternalConfig,
    service: Option<String>,
) -> Result<Selection> {
    let registry = config.registry()?;
    let name = service.unwrap_or_else(|| config.service.clone());
    if name.is_empty() {
        return Err(Error::InvalidConfig("missing service".to_owned()));
    }
    let service = registry.get(&name)?;

    let executor = HttpBatchExecutor::from_outbounds(
        &config.outbounds,
        config.general.request_timeout,
    )?;
    let evaluator = Evaluator::new(service, Arc::new(executor));

    info!("run {} test over {} outbounds", name, config.outbounds.len());
    let outbounds = config.outbound_names();
    let evaluation = evaluator.evaluate(&outbounds, config.selected.as_ref());
    match config.general.batch_timeout {
        Some(timeout) => tokio::time::timeout(timeout, evaluation)
            .await
            .map_err(|_| {
                Error::Transport(TransportError::new(format!(
                    "{name} test timed out after {}s",
                    timeout.as_secs()
                )))
            })?,
        None => evaluation.await,
    }
}
