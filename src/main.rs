use clap::{Parser, Subcommand};

use rollout::log_status;
use rollout::output;
use rollout::ssh::ControlRegistry;

mod commands;

use commands::{config, plan, releases, run, tasks, GlobalArgs};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "rollout")]
#[command(version = VERSION)]
#[command(about = "Timestamped, symlink-swap release deployments over SSH")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a macro against the configured host
    Run(run::RunArgs),
    /// Render a macro's scripts without connecting
    Plan(plan::PlanArgs),
    /// List tasks and macros
    Tasks(tasks::TasksArgs),
    /// Show the resolved deployment configuration
    Config(config::ConfigArgs),
    /// List release directories on each host
    Releases(releases::ReleasesArgs),
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let global = GlobalArgs {
        registry: ControlRegistry::new(),
    };
    install_interrupt_handler(global.registry.clone());

    let (json_result, exit_code) = commands::run_json(cli.command, &global);
    let _ = output::print_json_result(json_result);

    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

/// Ctrl-C closes every open SSH master before the process exits.
/// Remote commands already running are not rolled back.
fn install_interrupt_handler(registry: ControlRegistry) {
    let installed = ctrlc::set_handler(move || {
        let closed = registry.close_all();
        log_status!("rollout", "Interrupted, closed {} connection(s)", closed);
        let err = rollout::Error::run_interrupted();
        let exit_code = output::exit_code_for_error(err.code);
        let _ = output::print_json_result(Err(err));
        std::process::exit(exit_code);
    });
    if let Err(e) = installed {
        log_status!("rollout", "Could not install interrupt handler: {}", e);
    }
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}
