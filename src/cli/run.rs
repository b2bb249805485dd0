use crate::cli::RunArgs;
use crate::config::Config;
use crate::research::ResearchQuestion;
use tracing::info;

use super::session::{build_orchestrator, drive};

pub async fn execute(args: RunArgs) -> anyhow::Result<()> {
    let mut config = args.service.load_config()?;
    if args.dry_run {
        config.dry_run = true;
    }

    let question = ResearchQuestion::new(args.question.trim()).with_context(args.context);
    if question.text.is_empty() {
        anyhow::bail!("Research question must not be empty");
    }

    if config.dry_run {
        info!("DRY RUN - no reasoning service calls will be made");
        print_execution_plan(&config, &question);
        return Ok(());
    }

    let orchestrator = build_orchestrator(&config)?;
    let (orchestrator, q) = (&orchestrator, &question);
    drive(&config, args.service.events, &question, None, |tx, token| async move {
        orchestrator.run(q, Some(tx), &token).await
    })
    .await
}

fn print_execution_plan(config: &Config, question: &ResearchQuestion) {
    println!("\n=== Execution Plan ===\n");
    println!("Question: {}", question.text);
    if let Some(context) = &question.auxiliary_context {
        println!("Context: {}", context);
    }
    println!("Provider: {}", config.provider);
    println!("Concurrency: {}", config.concurrency);
    println!("Report dir: {:?}", config.report_dir);
    println!("State dir: {:?}", config.state_dir);
    println!(
        "Retries: {} (backoff {}ms)",
        config.retry.max_retries, config.retry.backoff_base_ms
    );

    println!("\nStages:");
    println!(
        "  - decompose (temperature {}, max_tokens {})",
        config.stages.decompose.temperature, config.stages.decompose.max_tokens
    );
    println!(
        "  - execute (temperature {}, max_tokens from each task's budget)",
        config.stages.execute_temperature
    );
    println!(
        "  - validate (temperature {}, max_tokens {})",
        config.stages.validate.temperature, config.stages.validate.max_tokens
    );
    println!(
        "  - synthesize (temperature {}, max_tokens {})",
        config.stages.synthesize.temperature, config.stages.synthesize.max_tokens
    );
    println!();
}
