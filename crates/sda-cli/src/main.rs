use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use sda_daemon::config::Config;
use sda_daemon::server::{self, Server};
use sda_protocol::{
    methods, CommandResponse, JsonRpcRequest, JsonRpcResponse, MessageOutcome, RequestId,
};
use serde_json::{json, Value};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

#[derive(Parser)]
#[command(
    name = "sda",
    about = "Project rooms with chat-driven GitHub sync"
)]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(long, global = true)]
    config: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the SDA daemon
    Start {
        /// Run in foreground (don't daemonize)
        #[arg(long)]
        foreground: bool,
    },
    /// Stop the running daemon
    Stop,
    /// Show daemon status
    Status,
    /// Manage projects
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },
    /// Post a chat message to a project room
    Say {
        project_id: String,
        #[arg(required = true, trailing_var_arg = true)]
        message: Vec<String>,
        /// Name shown to other room members
        #[arg(long, default_value = "cli")]
        sender: String,
    },
    /// GitHub integration
    Github {
        #[command(subcommand)]
        command: GithubCommands,
    },
}

#[derive(Subcommand)]
enum ProjectCommands {
    /// Create an empty project
    Create { name: String },
    /// Print a project and its file tree
    Show { project_id: String },
}

#[derive(Subcommand)]
enum GithubCommands {
    /// Verify the configured token
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config;

    match cli.command {
        Commands::Start { foreground } => cmd_start(foreground, config_path).await,
        Commands::Stop => cmd_stop(&load_config(config_path.as_deref())?).await,
        Commands::Status => cmd_status(&load_config(config_path.as_deref())?).await,
        Commands::Project { command } => {
            let config = load_config(config_path.as_deref())?;
            match command {
                ProjectCommands::Create { name } => {
                    let params = json!({ "name": name });
                    print_result(&config, methods::PROJECT_CREATE, Some(params)).await
                }
                ProjectCommands::Show { project_id } => {
                    let params = json!({ "project_id": project_id });
                    print_result(&config, methods::PROJECT_GET, Some(params)).await
                }
            }
        }
        Commands::Say {
            project_id,
            message,
            sender,
        } => {
            let config = load_config(config_path.as_deref())?;
            cmd_say(&config, &project_id, &message.join(" "), &sender).await
        }
        Commands::Github {
            command: GithubCommands::Check,
        } => {
            let config = load_config(config_path.as_deref())?;
            print_result(&config, methods::GITHUB_CHECK, None).await
        }
    }
}

fn load_config(path: Option<&str>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(Path::new(path))
            .with_context(|| format!("Failed to load config from {path}")),
        None => Config::load().context("Failed to load config"),
    }
}

async fn cmd_start(foreground: bool, config_path: Option<String>) -> Result<()> {
    let config = load_config(config_path.as_deref())?;

    if is_daemon_running(&config) {
        println!("SDA daemon is already running.");
        return Ok(());
    }

    if foreground {
        server::init_tracing(&config.daemon.log_level);
        println!("Starting SDA daemon (foreground)...");
        let server = Server::new(config).await?;
        server.run().await?;
    } else {
        // Spawn as background process
        let exe = std::env::current_exe()?;
        let mut args = vec!["start".to_string(), "--foreground".to_string()];
        if let Some(path) = config_path {
            args.push("--config".to_string());
            args.push(path);
        }

        let child = std::process::Command::new(exe)
            .args(&args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .context("Failed to spawn daemon process")?;

        println!("SDA daemon started (PID: {})", child.id());
    }

    Ok(())
}

async fn cmd_stop(config: &Config) -> Result<()> {
    if !is_daemon_running(config) {
        println!("SDA daemon is not running.");
        return Ok(());
    }

    match send_request(&config.daemon.socket_path, methods::SHUTDOWN, None).await {
        Ok(_) => println!("SDA daemon stopped."),
        Err(_) => {
            // Fallback: kill via PID
            if let Some(pid) = read_pid(config) {
                unsafe {
                    libc::kill(pid, libc::SIGTERM);
                }
                let _ = std::fs::remove_file(config.pid_path());
                println!("SDA daemon stopped (via signal).");
            }
        }
    }

    Ok(())
}

async fn cmd_status(config: &Config) -> Result<()> {
    if !is_daemon_running(config) {
        println!("SDA daemon is not running.");
        return Ok(());
    }

    match send_request(&config.daemon.socket_path, methods::STATUS, None).await {
        Ok(response) => {
            if let Some(result) = response.result {
                println!("SDA daemon status:");
                println!("{}", serde_json::to_string_pretty(&result)?);
            }
        }
        Err(e) => {
            println!("Failed to get status: {e}");
        }
    }

    Ok(())
}

async fn cmd_say(config: &Config, project_id: &str, message: &str, sender: &str) -> Result<()> {
    let params = json!({
        "project_id": project_id,
        "message": message,
        "sender": sender,
    });
    let result = call(config, methods::PROJECT_MESSAGE, Some(params)).await?;
    let outcome: MessageOutcome =
        serde_json::from_value(result).context("Unexpected project/message result")?;

    println!("Delivered to {} member(s).", outcome.delivered);
    if let Some(CommandResponse { text, kind, .. }) = outcome.reply {
        println!("[github:{}]", serde_json::to_value(kind)?.as_str().unwrap_or("reply"));
        println!("{text}");
    }
    Ok(())
}

async fn print_result(config: &Config, method: &str, params: Option<Value>) -> Result<()> {
    let result = call(config, method, params).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Send a request and unwrap its result, turning JSON-RPC errors into failures.
async fn call(config: &Config, method: &str, params: Option<Value>) -> Result<Value> {
    let response = send_request(&config.daemon.socket_path, method, params)
        .await
        .context("Is the daemon running? Start it with `sda start`")?;
    if let Some(error) = response.error {
        bail!("{} (code {})", error.message, error.code);
    }
    Ok(response.result.unwrap_or(Value::Null))
}

/// Send a JSON-RPC request to the daemon and return the response.
///
/// Notifications arriving on the same connection are skipped.
async fn send_request(
    socket_path: &str,
    method: &str,
    params: Option<Value>,
) -> Result<JsonRpcResponse> {
    let stream = UnixStream::connect(socket_path).await?;
    let (reader, mut writer) = stream.into_split();

    let request = JsonRpcRequest::new(method, params, RequestId::Number(1));
    let json = serde_json::to_string(&request)?;

    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;

    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            bail!("Daemon closed the connection");
        }
        let value: Value = serde_json::from_str(&line)?;
        if value.get("id").is_some() {
            return Ok(serde_json::from_value(value)?);
        }
    }
}

fn read_pid(config: &Config) -> Option<i32> {
    std::fs::read_to_string(config.pid_path())
        .ok()
        .and_then(|pid| pid.trim().parse().ok())
}

fn is_daemon_running(config: &Config) -> bool {
    match read_pid(config) {
        // Check if process is alive
        Some(pid) => unsafe { libc::kill(pid, 0) == 0 },
        None => false,
    }
}
