mod cli;
mod logging;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use proxima::settings::{FileSettings, StaticSettings};
use proxima::{Engine, IpcPage, PageAutomation, SettingsSource};
use proxima_runtime::{Connection, line_transport};

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	if let Err(err) = run(cli).await {
		eprintln!("error: {err:#}");
		std::process::exit(1);
	}
}

#[cfg(unix)]
fn default_socket_path() -> PathBuf {
	std::env::temp_dir().join("proxima-host.sock")
}

async fn connect(socket: Option<PathBuf>) -> Result<Arc<Connection>> {
	#[cfg(unix)]
	let stream = {
		let path = socket.unwrap_or_else(default_socket_path);
		tokio::net::UnixStream::connect(&path)
			.await
			.with_context(|| format!("connecting to automation host at {}", path.display()))?
	};

	#[cfg(windows)]
	let stream = {
		let _ = socket;
		tokio::net::TcpStream::connect("127.0.0.1:9821")
			.await
			.context("connecting to automation host at 127.0.0.1:9821")?
	};

	let (read_half, write_half) = tokio::io::split(stream);
	let connection = Arc::new(Connection::new(line_transport(read_half, write_half)));

	let run_conn = Arc::clone(&connection);
	tokio::spawn(async move { run_conn.run().await });

	Ok(connection)
}

async fn run(cli: Cli) -> Result<()> {
	let settings: Arc<dyn SettingsSource> = match &cli.settings {
		Some(path) => Arc::new(FileSettings::new(path)),
		None => Arc::new(StaticSettings::default()),
	};

	let connection = connect(cli.socket.clone()).await?;
	let page = Arc::new(IpcPage::new(connection)) as Arc<dyn PageAutomation>;
	let engine = Engine::new(page, Arc::clone(&settings));

	match cli.command {
		Commands::Send {
			message,
			provider,
			file,
		} => {
			let reply = match file {
				Some(path) => engine.dispatch_with_file(provider, &message, &path).await?,
				None => engine.dispatch(provider, &message).await?,
			};
			if cli.json {
				println!("{}", serde_json::to_string_pretty(&reply)?);
			} else {
				println!("{}", reply.text);
				tracing::info!(target = "proxima_cli", elapsed_ms = reply.elapsed_ms, "done");
			}
		}

		Commands::Route { message, prefer } => {
			let outcome = engine.route_smart(&message, prefer).await?;
			if cli.json {
				println!("{}", serde_json::to_string_pretty(&outcome)?);
			} else {
				println!("[{} after {} attempt(s)]", outcome.provider_id, outcome.attempts);
				println!("{}", outcome.text);
			}
		}

		Commands::Broadcast { message, providers } => {
			let providers = if providers.is_empty() {
				settings.snapshot()?.enabled
			} else {
				providers
			};
			let report = engine.dispatch_all(&providers, &message).await;
			if cli.json {
				println!("{}", serde_json::to_string_pretty(&report)?);
			} else {
				for (provider, entry) in &report.results {
					let elapsed = report.timings.get(provider).copied().unwrap_or(0);
					match entry.text() {
						Some(text) => println!("--- {provider} ({elapsed}ms)\n{text}\n"),
						None => println!("--- {provider} ({elapsed}ms)\n<failed>\n"),
					}
				}
			}
		}

		Commands::Status { provider } => {
			let generating = engine.get_typing_status(provider).await?;
			if cli.json {
				println!("{}", serde_json::json!({ "provider": provider, "generating": generating }));
			} else {
				println!("{provider}: {}", if generating { "generating" } else { "idle" });
			}
		}

		Commands::NewChat { provider } => {
			engine.new_conversation(provider).await?;
			println!("{provider}: new conversation");
		}
	}

	Ok(())
}
