mod logging;
mod options;
mod state_list;
mod state_rm;

use anyhow::Result;
use clap::{CommandFactory as _, Parser, Subcommand};
use options::Options;
use std::process::exit;

fn main() {
    let args = Args::parse();
    handle_result(run_args(args));
}

fn run_args(args: Args) -> Result<()> {
    let mut logging = logging::set_up(logging::Options {
        verbose: args.options.verbose,
        color: args.options.use_color(),
    })?;

    let r = match &args.command {
        Commands::State(sub) => {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            match sub {
                StateCommands::Rm(subargs) => state_rm::state_rm(subargs, &mut out),
                StateCommands::List(subargs) => state_list::state_list(subargs, &mut out),
            }
        }
        Commands::GenerateMan => (|| {
            let cmd = Args::command();
            let man = clap_mangen::Man::new(cmd);
            let mut buffer: Vec<u8> = Default::default();
            man.render(&mut buffer)?;
            println!("{}", String::from_utf8(buffer)?);
            Ok(())
        })(),
        Commands::GenerateMarkdown => {
            let opts = clap_markdown::MarkdownOptions::new().show_footer(false);
            let markdown: String = clap_markdown::help_markdown_custom::<Args>(&opts);
            println!("{}", markdown);
            Ok(())
        }
        Commands::GenerateCompletion { shell } => {
            let mut cmd = Args::command();
            clap_complete::generate(*shell, &mut cmd, "stateops", &mut std::io::stdout());
            Ok(())
        }
    };

    logging.tear_down()?;
    r
}

/// Handle a Result, printing the error and exiting with code 1 on failure.
fn handle_result(r: Result<()>) {
    match r {
        Ok(()) => {}
        Err(e) => {
            eprintln!("stateops error: {:?}", e);
            exit(1);
        }
    }
}

/// Inspect and edit infrastructure state
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    options: Options,
}

#[derive(Subcommand, Debug)]
enum StateCommands {
    /// Remove instances from the state
    #[command()]
    Rm(state_rm::Args),

    /// List resource instances in the state
    #[command()]
    List(state_list::Args),
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Commands that operate on the state
    #[command(subcommand)]
    State(StateCommands),

    /// Generate markdown documentation for stateops
    #[command(hide = true)]
    GenerateMarkdown,

    /// Generate a manpage for stateops
    #[command(hide = true)]
    GenerateMan,

    /// Generate shell completion for stateops
    #[command(hide = true)]
    GenerateCompletion {
        /// The shell to generate completion for
        #[arg(long)]
        shell: clap_complete::Shell,
    },
}
