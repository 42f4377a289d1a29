//! Command implementations and dispatch logic.
//!
//! Each command is an async function taking the parsed arguments and a
//! shared [`CommandContext`].

use std::path::PathBuf;

use cachet::Cache;
use cachet_config::{CacheSettings, ConfigLoader};
use cachet_core::error::{CacheError, CacheResult};
use camino::Utf8PathBuf;
use tracing::{debug, info};

pub mod restore;
pub mod save;


use crate::{output::OutputHandler, Commands};

/// Shared context for all commands
pub struct CommandContext {
    pub cwd: PathBuf,
    pub settings: CacheSettings,
    pub output: OutputHandler,
}

impl CommandContext {
    /// Load settings for the current directory
    pub async fn new() -> CacheResult<Self> {
        let cwd = std::env::current_dir()
            .map_err(|e| CacheError::io("Failed to get current directory".to_string(), e))?;
        let utf8_cwd = Utf8PathBuf::from_path_buf(cwd.clone()).map_err(|path| {
            CacheError::ConfigValidation {
                field: "cwd".to_string(),
                reason: format!("working directory is not valid UTF-8: {}", path.display()),
            }
        })?;

        let (settings, source) = ConfigLoader::new(utf8_cwd).load().await?;
        debug!("Settings loaded from {:?}", source);

        Ok(Self {
            cwd,
            settings,
            output: OutputHandler::new(),
        })
    }

    /// Cache for the loaded settings, rooted at the working directory
    /// unless a workspace is configured
    pub fn cache(&self) -> CacheResult<Cache> {
        let mut settings = self.settings.clone();
        if settings.archive.workspace.is_none() {
            settings.archive.workspace = Some(self.cwd.clone());
        }
        Cache::from_settings(&settings)
    }
}

/// Dispatch a command to its handler
pub async fn dispatch_command(command: Commands, ctx: &CommandContext) -> CacheResult<()> {
    match command {
        Commands::Restore(args) => {
            info!("Restoring cache for key: {}", args.key);
            restore::execute(args, ctx).await
        },
        Commands::Save(args) => {
            info!("Saving cache for key: {}", args.key);
            save::execute(args, ctx).await
        },
        Commands::Version => show_version(ctx),
    }
}

fn show_version(ctx: &CommandContext) -> CacheResult<()> {
    let target = format!("{}-{}", std::env::consts::ARCH, std::env::consts::OS);

    ctx.output.info(&format!("cachet v{}", env!("CARGO_PKG_VERSION")));
    ctx.output.info(&format!("Built: {}", env!("BUILD_DATE")));
    ctx.output.info(&format!("Target: {}", target));
    ctx.output.info(&format!("Rust: {}", env!("RUSTC_VERSION")));
    ctx.output.info(&format!(
        "Service: {}",
        if ctx.settings.is_feature_available() {
            ctx.settings.service_version().to_string()
        } else {
            "unavailable".to_string()
        }
    ));

    Ok(())
}
