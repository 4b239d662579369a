mod setup;
mod terminal;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use scribe_chat::{ExchangeOutcome, RenderMode, SessionController, SystemClipboard};
use scribe_config::{Config, ConfigManager};
use scribe_observability::LogManager;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use crate::terminal::TerminalSink;

#[derive(Parser)]
#[command(name = "scribe")]
#[command(about = "Streaming chat client with a typing effect")]
#[command(version)]
struct Cli {
    /// Config file path
    #[arg(long, env = "SCRIBE_CONFIG")]
    config: Option<String>,

    /// Chat endpoint, overrides the configured one
    #[arg(long, env = "SCRIBE_ENDPOINT")]
    endpoint: Option<String>,

    /// How replies are rendered: terminal, markdown or escaped
    #[arg(long, default_value = "terminal")]
    render: RenderMode,

    /// Prefix messages with the time they were shown
    #[arg(long, default_value = "false")]
    timestamps: bool,

    /// Enable debug mode
    #[arg(long, short, default_value = "false")]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 启动交互式聊天
    Chat,
    /// 发送单条消息
    Send {
        /// 消息内容
        message: String,
    },
    /// 查看会话历史
    History {
        /// 以 JSON 输出
        #[arg(long, default_value = "false")]
        json: bool,
    },
    /// 归档当前会话并开始新会话
    New,
    /// 删除保存的会话
    Delete,
    /// 复制第 n 条助手回复（默认最新一条）
    Copy {
        index: Option<usize>,
    },
    /// 配置管理命令
    Config(ConfigArgs),
}

#[derive(Args, Clone)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// 获取配置值
    Get {
        /// 配置键 (如: endpoint.url, playback.reveal_interval_ms)
        key: String,
    },
    /// 设置配置值
    Set {
        /// 配置键 (如: endpoint.url, session.max_age_hours)
        key: String,
        /// 配置值，可选项用 none 清除
        value: String,
    },
    /// 初始化默认配置
    Init {
        /// 强制覆盖已有配置
        #[arg(long, default_value = "false")]
        force: bool,
    },
    /// 显示当前配置
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = match &cli.config {
        Some(path) => setup::resolve_path(path),
        None => ConfigManager::default_config_path()?,
    };

    if cli.debug {
        eprintln!("{}", "[DEBUG] Debug mode enabled".dimmed());
        eprintln!("{}", format!("[DEBUG] Config path: {:?}", config_path).dimmed());
    }

    if let Commands::Config(args) = &cli.command {
        return handle_config(args.clone(), &config_path).await;
    }

    let manager = ConfigManager::load(&config_path).await?;
    let mut config = manager.snapshot().await;
    if let Some(endpoint) = &cli.endpoint {
        config.endpoint.url = endpoint.clone();
        ConfigManager::validate(&config)?;
    }

    let _log_manager = LogManager::new(&setup::log_config(&config.logging, cli.debug))?;
    tracing::debug!(endpoint = %config.endpoint.url, "scribe starting");

    if cli.debug {
        eprintln!("{}", format!("[DEBUG] Endpoint: {}", config.endpoint.url).dimmed());
    }

    let sink = Arc::new(TerminalSink::new(cli.timestamps));
    let controller = setup::controller(&config, sink, cli.render.renderer()).await?;

    match cli.command {
        Commands::Chat => run_interactive_chat(&controller, &config).await,
        Commands::Send { message } => send_message(&controller, &message).await,
        Commands::History { json } => show_history(&controller, json).await,
        Commands::New => {
            controller.new_session().await?;
            println!("{}", "✅ Previous session archived, new session started".green());
            Ok(())
        }
        Commands::Delete => {
            controller.delete_session().await?;
            println!("{}", "✅ Session deleted".green());
            Ok(())
        }
        Commands::Copy { index } => {
            restore_quietly(&controller).await;
            copy_response(&controller, index)
        }
        Commands::Config(_) => Ok(()),
    }
}

async fn handle_config(args: ConfigArgs, config_path: &Path) -> anyhow::Result<()> {
    match args.command {
        ConfigCommands::Get { key } => {
            let manager = ConfigManager::load(config_path).await?;
            let config = manager.snapshot().await;

            match config.get_value(&key) {
                Some(value) => {
                    println!("{}", format!("{} = {}", key, value).green());
                }
                None => {
                    println!("{}", format!("❌ Key not found or unset: {}", key).red());
                    std::process::exit(1);
                }
            }
        }
        ConfigCommands::Set { key, value } => {
            let manager = ConfigManager::load(config_path).await?;

            if let Err(e) = manager.update(|config| config.set_value(&key, &value)).await {
                eprintln!("{}", format!("❌ Failed to set value: {}", e).red());
                std::process::exit(1);
            }
            println!("{}", format!("✅ Set {} = {}", key, value).green());
        }
        ConfigCommands::Init { force } => {
            if config_path.exists() && !force {
                println!("{}", format!("⚠️  Config already exists at {:?}", config_path).yellow());
                println!("{}", "Use --force to overwrite".dimmed());
                return Ok(());
            }

            // 初始化目录
            scribe_config::init_scribe_dirs().await?;

            let manager = ConfigManager::new(Config::default(), config_path.to_path_buf());
            manager.save().await?;

            println!("{}", format!("✅ Config initialized at {:?}", config_path).green());
            println!("{}", "You can edit this file to customize your settings".dimmed());
        }
        ConfigCommands::Show => {
            let manager = ConfigManager::load(config_path).await?;
            let config = manager.snapshot().await;

            println!("{}", "📋 Current Configuration:".cyan().bold());
            println!();
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

/// 恢复会话；存储读取失败时从初始对话开始
async fn restore_quietly(controller: &SessionController) {
    if let Err(e) = controller.restore().await {
        eprintln!("{}", format!("⚠️  Could not restore session: {}", e).yellow());
    }
}

async fn send_message(controller: &SessionController, message: &str) -> anyhow::Result<()> {
    restore_quietly(controller).await;

    match controller.submit(message).await? {
        ExchangeOutcome::Committed { .. } => Ok(()),
        ExchangeOutcome::Failed { message } => anyhow::bail!("exchange failed: {}", message),
    }
}

async fn show_history(controller: &SessionController, json: bool) -> anyhow::Result<()> {
    if json {
        let outcome = controller.session().load().await?;
        match outcome.history() {
            Some(history) => println!("{}", serde_json::to_string_pretty(&history)?),
            None => println!("[]"),
        }
        return Ok(());
    }

    restore_quietly(controller).await;
    let count = controller.history().visible().count();
    println!("{}", format!("{} messages", count).dimmed());
    Ok(())
}

fn copy_response(controller: &SessionController, index: Option<usize>) -> anyhow::Result<()> {
    let text = controller.copy_response(index, &SystemClipboard)?;
    println!(
        "{}",
        format!("📋 Copied {} characters to clipboard", text.chars().count()).green()
    );
    Ok(())
}

async fn run_interactive_chat(controller: &SessionController, config: &Config) -> anyhow::Result<()> {
    println!("{}", "🤖 Scribe Interactive Chat".cyan().bold());
    println!("{}", format!("Endpoint: {}", config.endpoint.url).dimmed());
    println!(
        "{}",
        "Commands: /new, /delete, /copy [n], /history, /exit".dimmed()
    );
    println!();

    restore_quietly(controller).await;

    loop {
        print!("{} ", ">".cyan().bold());
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        match input.split_once(' ').unwrap_or((input, "")) {
            ("/exit", _) | ("/quit", _) | ("exit", "") | ("quit", "") => break,
            ("/new", _) => {
                if let Err(e) = controller.new_session().await {
                    println!("{}", format!("❌ Error: {}", e).red());
                }
            }
            ("/delete", _) => {
                if let Err(e) = controller.delete_session().await {
                    println!("{}", format!("❌ Error: {}", e).red());
                }
            }
            ("/copy", arg) => {
                let index = match arg.trim() {
                    "" => None,
                    n => match n.parse::<usize>() {
                        Ok(n) => Some(n),
                        Err(_) => {
                            println!("{}", format!("❌ Not a number: {}", n).red());
                            continue;
                        }
                    },
                };
                if let Err(e) = copy_response(controller, index) {
                    println!("{}", format!("❌ Error: {}", e).red());
                }
            }
            ("/history", _) => {
                let history = controller.history();
                for (i, message) in history.visible().enumerate() {
                    println!(
                        "{} {}",
                        format!("{:>3}. [{}]", i + 1, message.role).dimmed(),
                        message.content
                    );
                }
            }
            (command, _) if command.starts_with('/') => {
                println!("{}", format!("❌ Unknown command: {}", command).red());
            }
            _ => {
                // 失败已经以助手消息的形式显示
                if let Err(e) = controller.submit(input).await {
                    println!("{}", format!("❌ Error: {}", e).red());
                }
            }
        }

        println!();
    }

    println!("{}", "👋 Goodbye!".cyan());
    Ok(())
}
