use std::path::PathBuf;

use clap::{Parser, Subcommand};
use proxima_protocol::ProviderId;

/// Root CLI for the proxima dispatch engine.
#[derive(Parser, Debug)]
#[command(name = "proxima")]
#[command(about = "Query login-only AI chat web apps through an automation host")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Automation host socket path
	#[arg(long, global = true, value_name = "PATH")]
	pub socket: Option<PathBuf>,

	/// Provider settings file (JSON), re-read per routing decision
	#[arg(long, global = true, value_name = "FILE")]
	pub settings: Option<PathBuf>,

	/// Print raw JSON instead of plain text
	#[arg(long, global = true)]
	pub json: bool,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Send one message to one provider and print the answer.
	Send {
		#[arg(value_name = "MESSAGE")]
		message: String,

		#[arg(short, long, value_name = "PROVIDER")]
		provider: ProviderId,

		/// Attach a local file before sending.
		#[arg(long, value_name = "FILE")]
		file: Option<PathBuf>,
	},

	/// Route to the best available provider with retry and fallback.
	Route {
		#[arg(value_name = "MESSAGE")]
		message: String,

		/// Try this provider first if it is enabled.
		#[arg(long, value_name = "PROVIDER")]
		prefer: Option<ProviderId>,
	},

	/// Send one message to several providers at once.
	Broadcast {
		#[arg(value_name = "MESSAGE")]
		message: String,

		/// Comma-separated provider list; defaults to all enabled.
		#[arg(long, value_delimiter = ',', value_name = "PROVIDERS")]
		providers: Vec<ProviderId>,
	},

	/// Whether a provider is currently generating.
	Status {
		#[arg(short, long, value_name = "PROVIDER")]
		provider: ProviderId,
	},

	/// Open a fresh conversation for a provider.
	NewChat {
		#[arg(short, long, value_name = "PROVIDER")]
		provider: ProviderId,
	},
}
