//! The `chat` command — wires config, provider, tools, and plugins into an
//! agent loop and drives it from stdin.

use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, bail};
use grapnel_agent::{
    AgentLoop, ApprovalDecision, ApprovalPlugin, ApprovalRemote, AutoCompactPlugin, Compactor,
    RunState, approval_channel,
};
use grapnel_config::AppConfig;
use grapnel_core::provider::Provider;
use grapnel_core::session::Session;
use grapnel_providers::OpenAiCompatProvider;
use tracing::info;

fn build_provider(config: &AppConfig) -> anyhow::Result<Arc<dyn Provider>> {
    let api_key = config.api_key.clone().unwrap_or_default();
    let provider: Arc<dyn Provider> = match config.default_provider.as_str() {
        "openrouter" => Arc::new(OpenAiCompatProvider::openrouter(api_key)?),
        "openai" => Arc::new(OpenAiCompatProvider::openai(api_key)?),
        "ollama" => Arc::new(OpenAiCompatProvider::ollama(None)?),
        other => bail!("unknown provider '{other}' (expected openrouter, openai, or ollama)"),
    };
    Ok(provider)
}

fn build_agent(
    config: &AppConfig,
    approve_tools: bool,
) -> anyhow::Result<(AgentLoop, Option<Arc<ApprovalRemote>>)> {
    let provider = build_provider(config)?;

    let registry = grapnel_tools::default_registry(config.shell_allowlist.clone())
        .context("building tool registry")?;

    let mut agent = AgentLoop::new(
        provider.clone(),
        config.default_model.clone(),
        Arc::new(registry),
    )
    .with_temperature(config.default_temperature)
    .with_max_tokens(config.default_max_tokens)
    .with_max_iterations(config.agent.max_iterations);

    if let Some(window) = config.agent.context_window {
        agent = agent.with_context_window(window);
    }

    if config.compaction.enabled {
        let compactor = Compactor::new(
            provider,
            config.default_model.clone(),
            config.compaction.keep_recent,
        );
        agent = agent.with_plugin(Arc::new(AutoCompactPlugin::new(
            compactor,
            config.compaction.threshold_percent,
            config.compaction.min_messages,
        )));
    }

    let remote = if approve_tools {
        let (channel, remote) = approval_channel(8);
        agent = agent.with_plugin(Arc::new(ApprovalPlugin::new(Arc::new(channel))));
        Some(Arc::new(remote))
    } else {
        None
    };

    Ok((agent, remote))
}

/// Answer approval requests from the terminal while a turn is in flight.
fn spawn_approver(remote: Arc<ApprovalRemote>) {
    tokio::spawn(async move {
        while let Some(request) = remote.next_request().await {
            println!(
                "\n[approval] {} — {}\n  arguments: {}",
                request.tool, request.description, request.arguments
            );
            print!("  allow? [y]es / [a]lways / [n]o / [h]alt: ");
            let _ = std::io::stdout().flush();

            let line = tokio::task::spawn_blocking(|| {
                let mut line = String::new();
                std::io::stdin().lock().read_line(&mut line).map(|_| line)
            })
            .await
            .unwrap_or_else(|e| Err(std::io::Error::other(e)));

            let decision = match line.as_deref().map(str::trim) {
                Ok("y") | Ok("yes") => ApprovalDecision::approve_once(),
                Ok("a") | Ok("always") => ApprovalDecision::approve_session(),
                Ok("h") | Ok("halt") => ApprovalDecision::reject_hard("halted by user"),
                _ => ApprovalDecision::reject_soft("declined by user"),
            };
            if remote.decide(decision).await.is_err() {
                break;
            }
        }
    });
}

pub async fn run(message: Option<String>, approve_tools: bool) -> anyhow::Result<()> {
    let config = AppConfig::load().context("loading configuration")?;
    let (agent, remote) = build_agent(&config, approve_tools)?;
    if let Some(remote) = remote {
        spawn_approver(remote);
    }

    let mut session = Session::new();
    info!(model = %config.default_model, "Agent ready");

    if let Some(message) = message {
        let outcome = agent.run(&mut session, message).await?;
        println!("{}", outcome.content);
        return Ok(());
    }

    println!("grapnel chat — type a message, or 'exit' to quit");
    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        match agent.run(&mut session, line).await {
            Ok(outcome) => {
                println!("{}", outcome.content);
                match outcome.state {
                    RunState::MaxIterationsReached => {
                        println!("[note: iteration cap reached; answer may be partial]");
                    }
                    RunState::HardRejected => {
                        println!("[note: turn halted by a rejected tool call]");
                    }
                    RunState::Done => {}
                }
            }
            Err(e) => eprintln!("error: {e}"),
        }
    }

    Ok(())
}

pub async fn list_models() -> anyhow::Result<()> {
    let config = AppConfig::load().context("loading configuration")?;
    let provider = build_provider(&config)?;
    let models = provider.list_models().await?;
    if models.is_empty() {
        println!("no models reported by '{}'", config.default_provider);
    } else {
        for model in models {
            println!("{model}");
        }
    }
    Ok(())
}
