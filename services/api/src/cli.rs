use crate::demo::{run_demo, DemoArgs};
use crate::server;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use schedule_change::error::AppError;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Schedule Change Service",
    about = "Run and demonstrate the schedule-change request engine from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Walk through a contested-seat scenario against the sample roster
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    #[command(flatten)]
    pub(crate) roster: RosterArgs,
}

/// Where students and groups come from, and when the change window is open.
#[derive(Args, Debug, Default, Clone)]
pub(crate) struct RosterArgs {
    /// Student roster CSV (student_id,name,email,faculty,program,semester,gpa,current_group)
    #[arg(long, requires = "groups_csv")]
    pub(crate) students_csv: Option<PathBuf>,
    /// Group roster CSV (group_id,course_id,course_name,faculty,program,classroom_id,capacity,enrolled)
    #[arg(long, requires = "students_csv")]
    pub(crate) groups_csv: Option<PathBuf>,
    /// First day of the change window (YYYY-MM-DD). Defaults to a week ago.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) window_start: Option<NaiveDate>,
    /// Last day of the change window (YYYY-MM-DD). Defaults to thirty days out.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) window_end: Option<NaiveDate>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Demo(args) => run_demo(args),
    }
}
