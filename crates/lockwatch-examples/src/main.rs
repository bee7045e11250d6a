use facet::Facet;
use figue as args;
use tracing_subscriber::EnvFilter;

mod scenarios;

type AnyResult<T> = Result<T, String>;

#[derive(Facet, Debug)]
struct Cli {
    #[facet(flatten)]
    builtins: args::FigueBuiltins,
    #[facet(args::named, default)]
    retry_limit: Option<i64>,
    #[facet(args::subcommand)]
    command: CommandKind,
}

#[derive(Facet, Debug)]
#[repr(u8)]
enum CommandKind {
    StallThenRecover,
    ExitOnDeadlock,
    PanicOnDeadlock,
    AsyncStall,
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> AnyResult<()> {
    let cli = parse_cli()?;
    dispatch_command(cli.command, cli.retry_limit).await
}

fn parse_cli() -> AnyResult<Cli> {
    let figue_config = args::builder::<Cli>()
        .map_err(|e| format!("failed to build CLI schema: {e}"))?
        .cli(|cli| cli.strict())
        .help(|h| {
            h.program_name("lockwatch-examples")
                .description("Run lockwatch stall scenarios as subcommands")
                .version(option_env!("CARGO_PKG_VERSION").unwrap_or("dev"))
        })
        .build();

    args::Driver::new(figue_config)
        .run()
        .into_result()
        .map(|v| v.value)
        .map_err(|e| e.to_string())
}

async fn dispatch_command(command: CommandKind, retry_limit: Option<i64>) -> AnyResult<()> {
    match command {
        CommandKind::StallThenRecover => {
            let retry_limit = retry_limit.unwrap_or(2);
            run_blocking(move || scenarios::stall_then_recover::run(retry_limit)).await
        }
        CommandKind::ExitOnDeadlock => {
            let retry_limit = retry_limit.unwrap_or(1);
            run_blocking(move || scenarios::exit_on_deadlock::run(retry_limit)).await
        }
        CommandKind::PanicOnDeadlock => {
            let retry_limit = retry_limit.unwrap_or(1);
            run_blocking(move || scenarios::panic_on_deadlock::run(retry_limit)).await
        }
        CommandKind::AsyncStall => scenarios::async_stall::run(retry_limit.unwrap_or(2)).await,
    }
}

async fn run_blocking(scenario: impl FnOnce() -> AnyResult<()> + Send + 'static) -> AnyResult<()> {
    tokio::task::spawn_blocking(scenario)
        .await
        .map_err(|e| format!("scenario thread failed: {e}"))?
}
