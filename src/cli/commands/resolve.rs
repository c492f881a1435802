//! Resolve command - pin one package version

use crate::cli::args::ResolveArgs;
use crate::config::Config;
use crate::error::FlakepinResult;
use crate::model::{ResolutionResult, ResolveRequest};
use crate::resolver::Resolver;
use crate::ui::{self, TaskSpinner, UiContext};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Execute the resolve command
pub async fn execute(args: ResolveArgs, config: &Config) -> FlakepinResult<()> {
    let ctx = if args.json {
        UiContext::non_interactive()
    } else {
        UiContext::detect()
    };

    let mut config = config.clone();
    if let Some(strategy) = args.strategy {
        config.resolver.strategy = strategy;
    }
    if args.no_durable {
        config.cache.durable_enabled = false;
    }

    let resolver = Resolver::from_config(&config).await?;
    debug!(
        "Resolver ready (strategy {:?}, durable cache {})",
        config.resolver.strategy,
        resolver.has_durable_store()
    );

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let mut request = ResolveRequest::new(&args.name, &args.pkg_version).with_cancel(cancel);
    if let Some(system) = args.system {
        request = request.with_system(system);
    }
    if !args.channels.is_empty() {
        request = request.with_channels(args.channels);
    }

    let label = format!("{}@{}", args.name, args.pkg_version);
    let mut spinner = TaskSpinner::new(&ctx);
    if !args.json {
        spinner.start(&format!("Resolving {}...", label));
    }

    let outcome = resolver.resolve(request).await;
    watcher.abort();

    let result = match outcome {
        Ok(result) => result,
        Err(e) => {
            if !args.json {
                spinner.stop_error(&format!("Could not resolve {}", label));
            }
            return Err(e);
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    spinner.stop(&format!("Resolved {}", label));
    print_result(&ctx, &result);
    Ok(())
}

fn print_result(ctx: &UiContext, result: &ResolutionResult) {
    ui::key_value(ctx, "attribute", &result.attribute_path);
    ui::key_value(ctx, "commit", &result.commit_hash);
    ui::key_value(ctx, "channel", &result.channel);
    ui::key_value(ctx, "source", result.source.as_str());
    ui::key_value(ctx, "flake", &result.flake_ref());
    if result.from_cache {
        ui::remark(ctx, "served from cache");
    }
}
