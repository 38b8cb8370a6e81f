//! Interactive REPL
//!
//! Reads operator lines, runs each through the agent under a 60-second
//! deadline, and renders the event stream: tool activity dimmed, errors in
//! red, the final answer plain.

use std::io::{self, BufRead, Write};
use std::time::Duration;

use anyhow::Result;
use colored::Colorize;

use crate::agent::{Agent, AgentEvent, AgentEventKind};
use crate::llm::ProviderId;

/// Deadline for one chat turn, including tool execution.
const TURN_TIMEOUT: Duration = Duration::from_secs(60);

pub async fn run(agent: Agent) -> Result<()> {
    let (id, name, model) = agent.active_provider().await;
    println!("{}", "clifi - crypto operator agent".bold());
    println!("Provider: {name} ({id}) | Model: {model}");
    println!("Type a request, or /help for commands.\n");

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("{} ", ">".green().bold());
        io::stdout().flush()?;

        let Some(line) = lines.next() else {
            break;
        };
        let line = line?;
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        if let Some(command) = input.strip_prefix('/') {
            if handle_command(&agent, command).await? {
                break;
            }
            continue;
        }

        match tokio::time::timeout(TURN_TIMEOUT, agent.chat_with_events(input)).await {
            Ok(Ok(events)) => render_events(&events),
            Ok(Err(err)) => eprintln!("{} {}", "error:".red(), friendly_error(&err)),
            Err(_) => eprintln!(
                "{} turn timed out after {}s; partial work may have completed",
                "error:".red(),
                TURN_TIMEOUT.as_secs()
            ),
        }
    }

    agent.close().await;
    Ok(())
}

/// Handle a slash command. Returns `true` when the REPL should exit.
async fn handle_command(agent: &Agent, command: &str) -> Result<bool> {
    let mut parts = command.split_whitespace();
    match parts.next().unwrap_or_default() {
        "quit" | "exit" | "q" => return Ok(true),
        "reset" => {
            agent.reset().await;
            println!("Conversation cleared.");
        }
        "model" => match parts.next() {
            Some(model_id) => match agent.set_model(model_id).await {
                Ok(()) => println!("Model set to {model_id}. Conversation cleared."),
                Err(err) => eprintln!("{} {err:#}", "error:".red()),
            },
            None => {
                let (_, _, model) = agent.active_provider().await;
                println!("Current model: {model}");
            }
        },
        "provider" => match parts.next() {
            Some(raw) => match raw.parse::<ProviderId>() {
                Ok(id) => match agent.set_provider(id).await {
                    Ok(()) => println!("Provider set to {id}. Conversation cleared."),
                    Err(err) => eprintln!("{} {err:#}", "error:".red()),
                },
                Err(err) => eprintln!("{} {err}", "error:".red()),
            },
            None => {
                let (id, name, _) = agent.active_provider().await;
                println!("Current provider: {name} ({id})");
            }
        },
        "help" => {
            println!("Commands:");
            println!("  /reset              clear the conversation");
            println!("  /model [id]         show or switch the model");
            println!("  /provider [id]      show or switch the provider");
            println!("  /quit               exit");
        }
        other => eprintln!("Unknown command: /{other}"),
    }
    Ok(false)
}

fn render_events(events: &[AgentEvent]) {
    let final_content = events
        .iter()
        .rposition(|e| e.kind == AgentEventKind::Content && !e.is_error);

    for (i, event) in events.iter().enumerate() {
        match event.kind {
            AgentEventKind::ToolCall => {
                let args = event
                    .args
                    .as_ref()
                    .map(|v| v.to_string())
                    .unwrap_or_default();
                let preview = if args.len() > 100 {
                    format!("{}...", &args[..100])
                } else {
                    args
                };
                println!(
                    "{}",
                    format!("  [tool] {}({})", event.tool.as_deref().unwrap_or(""), preview).dimmed()
                );
            }
            AgentEventKind::ToolResult => {
                if event.is_error {
                    println!(
                        "{}",
                        format!(
                            "  [tool error] {}",
                            event.content.as_deref().unwrap_or("")
                        )
                        .red()
                    );
                }
            }
            AgentEventKind::Content => {
                let text = event.content.as_deref().unwrap_or("");
                if event.is_error {
                    eprintln!("{} {text}", "error:".red());
                } else if Some(i) == final_content {
                    println!("\n{text}\n");
                } else {
                    println!("{}", text.yellow());
                }
            }
        }
    }
}

/// Map raw errors to short actionable prose where the cause is clear.
fn friendly_error(err: &anyhow::Error) -> String {
    let text = format!("{err:#}");
    let lowered = text.to_lowercase();
    if lowered.contains("401") || lowered.contains("invalid api key") || lowered.contains("unauthorized")
    {
        return "Invalid key. Verify your provider API key and try again.".to_string();
    }
    if lowered.contains("429") || lowered.contains("rate limit") {
        return "Rate limited. Wait a moment and try again.".to_string();
    }
    if lowered.contains("connect") || lowered.contains("dns") || lowered.contains("timed out") {
        return "Connection failed. Check your internet and try again.".to_string();
    }
    text
}
