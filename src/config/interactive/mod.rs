use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input};

use super::{Config, OllamaConfig};

#[inline]
pub fn run_interactive_config() -> Result<()> {
    eprintln!("{}", style("🔧 Qadocs Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config()?;

    eprintln!("{}", style("Ollama Configuration").bold().yellow());
    eprintln!("Configure your local Ollama instance for embedding and test case generation.");
    eprintln!();

    configure_ollama(&mut config.ollama)?;

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Ollama Settings:").bold().yellow());
    eprintln!("  Host: {}", style(&config.ollama.host).cyan());
    eprintln!("  Port: {}", style(config.ollama.port).cyan());
    eprintln!(
        "  Embedding Model: {}",
        style(&config.ollama.embedding_model).cyan()
    );
    eprintln!("  Chat Model: {}", style(&config.ollama.chat_model).cyan());

    eprintln!();
    eprintln!("{}", style("Indexing Settings:").bold().yellow());
    eprintln!(
        "  Parallel Requests: {}",
        style(config.indexing.max_parallel_requests).cyan()
    );
    eprintln!(
        "  Target Tokens/Batch: {}",
        style(config.indexing.target_tokens_per_batch).cyan()
    );
    eprintln!(
        "  Index Chunk Size: {} bytes",
        style(config.indexing.max_chunk_bytes).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Retrieval Settings:").bold().yellow());
    eprintln!(
        "  Lexical Weight: {}",
        style(config.retrieval.lexical_weight).cyan()
    );
    eprintln!(
        "  Vector Weight: {}",
        style(config.retrieval.vector_weight).cyan()
    );

    eprintln!();
    match config.ollama.ollama_url() {
        Ok(url) => eprintln!("  Ollama URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  Ollama URL: {} ({})", style("Invalid").red(), e),
    }

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

fn load_existing_config() -> Result<Config> {
    Config::load().or_else(|_| {
        let dir = Config::config_dir().context("Failed to resolve configuration directory")?;
        Ok(Config {
            base_dir: dir,
            ..Config::default()
        })
    })
}

fn configure_ollama(ollama: &mut OllamaConfig) -> Result<()> {
    let host: String = Input::new()
        .with_prompt("Ollama host")
        .default(ollama.host.clone())
        .interact_text()?;
    ollama
        .set_host(host)
        .context("Invalid Ollama host provided")?;

    let port: u16 = Input::new()
        .with_prompt("Ollama port")
        .default(ollama.port)
        .interact_text()?;
    ollama
        .set_port(port)
        .context("Invalid Ollama port provided")?;

    let embedding_model: String = Input::new()
        .with_prompt("Embedding model")
        .default(ollama.embedding_model.clone())
        .interact_text()?;
    ollama
        .set_embedding_model(embedding_model)
        .context("Invalid embedding model provided")?;

    let chat_model: String = Input::new()
        .with_prompt("Chat model for test case generation")
        .default(ollama.chat_model.clone())
        .interact_text()?;
    ollama
        .set_chat_model(chat_model)
        .context("Invalid chat model provided")?;

    Ok(())
}
