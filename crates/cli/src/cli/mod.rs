use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};


#[derive(Parser, Debug)]
#[command(name = "survey")]
#[command(about = "Wifi survey sessions for a rosbridge-connected robot")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Configuration file (default: <config dir>/survey/config.json)
	#[arg(short, long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	/// ROS master URI; overrides the config file and ROS_MASTER_URI
	#[arg(long, global = true, value_name = "URI")]
	pub master_uri: Option<String>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Explore and map while recording wifi samples
	Explore(SessionArgs),

	/// Record wifi samples on an existing map
	Measure(SessionArgs),

	/// Connect to the bridge and report connection health
	Check {
		/// Seconds to wait for the connection
		#[arg(long, default_value_t = 10, value_name = "SECS")]
		timeout: u64,
	},

	/// Print the effective configuration
	Config,
}

#[derive(Args, Debug)]
pub struct SessionArgs {
	/// Map reference (JSON) the session collects against
	#[arg(long, value_name = "FILE")]
	pub map: PathBuf,

	/// Stop after this many seconds instead of waiting for Ctrl-C
	#[arg(long, value_name = "SECS")]
	pub duration: Option<u64>,

	/// Seconds to wait for the bridge before giving up
	#[arg(long, default_value_t = 30, value_name = "SECS")]
	pub connect_timeout: u64,
}
