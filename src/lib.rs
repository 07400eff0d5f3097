pub mod agent;
pub mod app;
pub mod cli;
pub mod client;
pub mod config;
pub mod controller;
pub mod history;
pub mod llm;
pub mod models;
pub mod repl;
pub mod server;

use agent::ChatAgent;
use cli::{ Cli, Command, ServeArgs };
use log::info;
use server::Server;
use std::error::Error;
use std::sync::Arc;

async fn serve(args: ServeArgs) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Chat LLM Type: {}", args.chat_llm_type);
    info!("Chat Model: {}", args.chat_model.as_deref().unwrap_or("(provider default)"));
    if let Some(base_url) = &args.chat_base_url {
        info!("Chat Base URL: {}", base_url);
    }
    info!("History Store Type: {}", args.history_type);
    info!("History Store Host: {}", args.history_host);
    info!("History Turns In Prompt: {}", args.history_prompt_turns);
    info!("Prompts Path: {}", args.prompts_path.as_deref().unwrap_or("(built-in)"));
    info!("-------------------------");

    let agent = Arc::new(ChatAgent::new(&args).await?);
    if agent.is_development() {
        info!("Running in development mode: replies echo the input");
    }
    info!("Starting server on: {}", args.server_addr);
    let server = Server::new(args.server_addr.clone(), agent);
    server.run().await?;

    Ok(())
}

pub async fn run(cli: Cli) -> Result<(), Box<dyn Error + Send + Sync>> {
    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Chat(args) => repl::run_chat(args).await,
    }
}
