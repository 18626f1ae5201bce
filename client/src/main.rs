use anyhow::Result;
use clap::{Parser, Subcommand};
use common::{Command, DaemonStatus, Response};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

#[derive(Parser)]
#[command(name = "wsctl")]
#[command(about = "wallsync daemon control", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the daemon is running
    Ping,

    /// Show connection, rotation and task list status
    Status,

    /// Stop the daemon
    Kill,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let command = match cli.command {
        Commands::Ping => Command::Ping,
        Commands::Status => Command::Query,
        Commands::Kill => Command::Kill,
    };

    match send_command(command).await {
        Ok(response) => {
            handle_response(response);
            Ok(())
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("\nIs the daemon running? Try starting it with: wallsync");
            std::process::exit(1);
        }
    }
}

async fn send_command(command: Command) -> Result<Response> {
    let socket_path = common::get_socket_path();

    let stream = UnixStream::connect(&socket_path).await?;
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    // Send command
    let command_json = serde_json::to_string(&command)?;
    writer.write_all(command_json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;

    // Read response
    let mut response_line = String::new();
    if reader.read_line(&mut response_line).await? == 0 {
        anyhow::bail!("daemon closed the connection without answering");
    }

    let response: Response = serde_json::from_str(&response_line)?;
    Ok(response)
}

fn handle_response(response: Response) {
    match response {
        Response::Ok => {
            println!("✓ Success");
        }
        Response::Error(e) => {
            eprintln!("✗ Error: {}", e);
            std::process::exit(1);
        }
        Response::Status(status) => {
            print!("{}", format_status(&status));
        }
        Response::Pong => {
            println!("✓ Daemon is running");
        }
    }
}

fn format_status(status: &DaemonStatus) -> String {
    let mut out = String::new();
    out.push_str("Daemon Status:\n");
    out.push_str(&format!("  Version: {}\n", status.version));
    out.push_str(&format!("  Uptime: {}s\n", status.uptime_secs));
    out.push_str(&format!("  Session: {}\n", status.session));
    out.push_str(&format!("  Rotation: {}\n", status.rotation));
    out.push_str(&format!(
        "  Current Wallpaper: {}\n",
        status.current_wallpaper.as_deref().unwrap_or("none")
    ));

    if status.tasks.is_empty() {
        out.push_str("  Tasks: none\n");
    } else {
        out.push_str(&format!("  Tasks ({}):\n", status.tasks.len()));
        for (index, task) in status.tasks.iter().enumerate() {
            out.push_str(&format!(
                "    #{} {} ({}s){}\n",
                index,
                task.identifier,
                task.display_secs,
                if task.ready { "" } else { " [downloading]" }
            ));
        }
    }

    out
}
