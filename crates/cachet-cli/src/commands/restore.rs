//! `cachet restore` command implementation.

use cachet::{Cache, RestoreOptions};
use cachet_core::error::CacheResult;

use super::CommandContext;
use crate::RestoreArgs;

/// Execute the `cachet restore` command
pub async fn execute(args: RestoreArgs, ctx: &CommandContext) -> CacheResult<()> {
    if !Cache::is_feature_available(&ctx.settings) {
        ctx.output
            .warn("Cache service is not available in this environment, skipping restore");
        return Ok(());
    }

    let cache = ctx.cache()?;
    let options = RestoreOptions {
        lookup_only: args.lookup_only,
        cross_os: args.cross_os,
    };

    let matched = cache
        .restore_cache(&args.paths, &args.key, &args.restore_keys, &options)
        .await?;

    match matched {
        Some(key) if args.lookup_only => {
            ctx.output.success(&format!("Cache found for key: {}", key));
            ctx.output.info(&format!("cache-hit: {}", key == args.key));
        },
        Some(key) => {
            ctx.output.success(&format!("Cache restored from key: {}", key));
            ctx.output.info(&format!("cache-hit: {}", key == args.key));
        },
        None => {
            let mut keys = vec![args.key.clone()];
            keys.extend(args.restore_keys.iter().cloned());
            ctx.output.info(&format!("Cache not found for input keys: {}", keys.join(", ")));
            ctx.output.info("cache-hit: false");
        },
    }

    Ok(())
}
