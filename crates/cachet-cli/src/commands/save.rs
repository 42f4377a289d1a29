//! `cachet save` command implementation.

use cachet::{Cache, SaveOptions, SaveOutcome};
use cachet_core::error::CacheResult;

use super::CommandContext;
use crate::SaveArgs;

/// Execute the `cachet save` command
pub async fn execute(args: SaveArgs, ctx: &CommandContext) -> CacheResult<()> {
    if !Cache::is_feature_available(&ctx.settings) {
        ctx.output
            .warn("Cache service is not available in this environment, skipping save");
        return Ok(());
    }

    let cache = ctx.cache()?;
    let options = SaveOptions {
        cross_os: args.cross_os,
    };

    let outcome = cache.save_cache(&args.paths, &args.key, &options).await?;
    match &outcome {
        SaveOutcome::Saved { entry_id } => {
            ctx.output
                .success(&format!("Cache saved with key: {} (entry {})", args.key, entry_id));
        },
        SaveOutcome::Conflict { reason } | SaveOutcome::Failed { reason } => {
            ctx.output.warn(&format!("Cache not saved: {}", reason));
        },
        SaveOutcome::TooLarge { .. } => {
            ctx.output.warn(&format!("Cache {}", outcome));
        },
    }

    Ok(())
}
