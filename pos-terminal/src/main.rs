use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use pos_terminal::cli::{Cli, Command, Dispatcher, Operation, Shell};
use pos_terminal::{AppError, Config, Server, ServerState, init_logger_with_file};

#[tokio::main]
async fn main() -> ExitCode {
    // .env 先于 clap 的 env 绑定
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => match err.downcast_ref::<AppError>() {
            Some(app) => {
                eprintln!("error: {} (code {})", app.message, app.code.code());
                if app.is_access_denial() {
                    ExitCode::from(2)
                } else {
                    ExitCode::from(1)
                }
            }
            None => {
                eprintln!("error: {err:#}");
                ExitCode::from(1)
            }
        },
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::from_env()?;
    if let Some(dir) = cli.work_dir {
        config.set_work_dir(dir);
    }
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }

    let log_dir = config.resolved_log_dir();
    init_logger_with_file(&config.log_level, config.log_json, Some(&log_dir))?;

    let state = ServerState::initialize(config).await?;

    match cli.command {
        Command::Serve { port } => {
            let port = port.unwrap_or(state.config.http_port);
            Server::new(state).run(port).await?;
        }
        Command::Shell => {
            let mut dispatcher = Dispatcher::new(state);
            if let Some(user) = cli.user.as_deref() {
                let password = cli.password.as_deref().unwrap_or_default();
                dispatcher.login(user, password).await?;
            }
            let mut shell = Shell::new(dispatcher);
            let stdin = std::io::stdin();
            let mut stdout = std::io::stdout();
            shell.run(stdin.lock(), &mut stdout).await?;
        }
        Command::Op(op) => {
            let mut dispatcher = Dispatcher::new(state);
            let needs_login = !matches!(op, Operation::Login { .. } | Operation::Logout);
            if needs_login && let Some(user) = cli.user.as_deref() {
                let password = cli.password.as_deref().unwrap_or_default();
                dispatcher.login(user, password).await?;
            }

            let mut stdout = std::io::stdout();
            dispatcher.dispatch(op, &mut stdout).await?;
            stdout.flush()?;
        }
    }

    Ok(())
}
