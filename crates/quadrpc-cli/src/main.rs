//! # QuadRPC CLI Entry Point
//!
//! ## Usage
//!
//! ```bash
//! # Start a server hosting the calculator and greet services
//! quadrpc serve
//! quadrpc --addr 0.0.0.0:50051 serve --emit-policy every-element
//!
//! # Call the services
//! quadrpc add 3 10
//! quadrpc decompose 120
//! quadrpc average 2 4 6
//! quadrpc maximum 1 5 3 7 2
//! quadrpc sqrt 16
//! quadrpc greet Jane
//! quadrpc greet-deadline Jane --timeout-ms 5000
//!
//! # Built-in endpoints (JSON on stdout)
//! quadrpc metrics | jq '.total_calls'
//! quadrpc info
//! ```
//!
//! Negative numbers follow a `--` separator: `quadrpc sqrt -- -2`.

use std::time::Duration;

use anyhow::Result;
use argh::FromArgs;
use quadrpc_cli::{client_config, init_tracing, resolve_addr, ServeOptions, ADDR_ENV};
use quadrpc_client::{CalculatorClient, GreetClient, RpcClient, TcpConnector};
use quadrpc_common::messages::Greeting;
use quadrpc_metrics::{MetricsSnapshot, ServerInfo};
use quadrpc_server::{default_registry, RpcServer};

#[derive(FromArgs)]
/// QuadRPC - four-shape RPC over a single channel
struct Cli {
    /// server address (defaults to $QUADRPC_ADDR, then 127.0.0.1:50051)
    #[argh(option, short = 'a')]
    addr: Option<String>,

    /// payload codec: postcard or json
    #[argh(option, default = "\"postcard\".into()")]
    codec: String,

    /// deadline in milliseconds for client calls
    #[argh(option)]
    timeout_ms: Option<u64>,

    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Serve(ServeArgs),
    Add(AddArgs),
    Decompose(DecomposeArgs),
    Average(AverageArgs),
    Maximum(MaximumArgs),
    Sqrt(SqrtArgs),
    Greet(GreetArgs),
    GreetMany(GreetManyArgs),
    LongGreet(LongGreetArgs),
    GreetEveryone(GreetEveryoneArgs),
    GreetDeadline(GreetDeadlineArgs),
    Metrics(MetricsArgs),
    Info(InfoArgs),
}

#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
/// start a server hosting the calculator and greet services
struct ServeArgs {
    /// upper bound in seconds on any call's deadline
    #[argh(option, default = "300")]
    max_call_timeout_secs: u64,

    /// maximum encoded frame size in bytes
    #[argh(option)]
    max_frame_size: Option<usize>,

    /// when FindMaximum responds: on-increase or every-element
    #[argh(option, default = "\"on-increase\".into()")]
    emit_policy: String,

    /// length in milliseconds of each GreetWithDeadline work step
    #[argh(option, default = "1000")]
    greet_step_ms: u64,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "add")]
/// add two integers
struct AddArgs {
    /// first integer
    #[argh(positional)]
    first: i32,
    /// second integer
    #[argh(positional)]
    second: i32,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "decompose")]
/// stream the prime factors of a number
struct DecomposeArgs {
    /// number to decompose
    #[argh(positional)]
    number: i64,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "average")]
/// average a stream of integers
struct AverageArgs {
    /// integers to send
    #[argh(positional)]
    numbers: Vec<i64>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "maximum")]
/// report each new running maximum of a stream of integers
struct MaximumArgs {
    /// integers to send
    #[argh(positional)]
    numbers: Vec<i64>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "sqrt")]
/// square root of a non-negative integer
struct SqrtArgs {
    /// number to take the root of
    #[argh(positional)]
    number: i32,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "greet")]
/// greet someone once
struct GreetArgs {
    /// first name
    #[argh(positional)]
    first_name: String,

    /// last name
    #[argh(option, default = "String::new()")]
    last_name: String,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "greet-many")]
/// receive ten numbered greetings
struct GreetManyArgs {
    /// first name
    #[argh(positional)]
    first_name: String,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "long-greet")]
/// send several names and receive one combined greeting
struct LongGreetArgs {
    /// first names to send
    #[argh(positional)]
    first_names: Vec<String>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "greet-everyone")]
/// greet each name as it is sent
struct GreetEveryoneArgs {
    /// first names to send
    #[argh(positional)]
    first_names: Vec<String>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "greet-deadline")]
/// greet someone within a deadline
struct GreetDeadlineArgs {
    /// first name
    #[argh(positional)]
    first_name: String,

    /// deadline in milliseconds (overrides --timeout-ms)
    #[argh(option, default = "5000")]
    timeout_ms: u64,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "metrics")]
/// print the server's metrics snapshot as JSON
struct MetricsArgs {}

#[derive(FromArgs)]
#[argh(subcommand, name = "info")]
/// print the server's version, uptime and operations as JSON
struct InfoArgs {}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Client subcommands print results on stdout; keep logs quiet there.
    let default_level = match cli.command {
        Commands::Serve(_) => "info",
        _ => "warn",
    };
    init_tracing(default_level);

    let addr = resolve_addr(cli.addr, std::env::var(ADDR_ENV).ok());

    match cli.command {
        Commands::Serve(args) => run_serve(addr, cli.codec, args).await,
        command => {
            let config = client_config(&cli.codec, cli.timeout_ms)?;
            run_client(RpcClient::tcp(addr, config), command).await
        }
    }
}

async fn run_serve(addr: String, codec: String, args: ServeArgs) -> Result<()> {
    let config = ServeOptions {
        addr,
        codec,
        max_call_timeout_secs: args.max_call_timeout_secs,
        max_frame_size: args.max_frame_size,
        emit_policy: args.emit_policy,
        greet_step_ms: args.greet_step_ms,
    }
    .server_config()?;

    tracing::info!("Starting QuadRPC server on {}", config.bind_addr);
    let server = RpcServer::bind(config.clone(), default_registry(&config)).await?;
    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for ctrl-c: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;
    Ok(())
}

async fn run_client(client: RpcClient<TcpConnector>, command: Commands) -> Result<()> {
    let calculator = CalculatorClient::new(client.clone());
    let greet = GreetClient::new(client.clone());

    match command {
        Commands::Serve(_) => anyhow::bail!("serve does not run against a remote server"),
        Commands::Add(args) => {
            println!("{}", calculator.add(args.first, args.second).await?);
        }
        Commands::Decompose(args) => {
            for factor in calculator.decompose_number(args.number).await? {
                println!("{}", factor);
            }
        }
        Commands::Average(args) => {
            println!("{}", calculator.compute_average(args.numbers).await?);
        }
        Commands::Maximum(args) => {
            for maximum in calculator.find_maximum(args.numbers).await? {
                println!("{}", maximum);
            }
        }
        Commands::Sqrt(args) => {
            println!("{}", calculator.square_root(args.number).await?);
        }
        Commands::Greet(args) => {
            let greeting = Greeting::new(args.first_name, args.last_name);
            println!("{}", greet.greet(greeting).await?);
        }
        Commands::GreetMany(args) => {
            for line in greet.greet_many_times(Greeting::new(args.first_name, "")).await? {
                println!("{}", line);
            }
        }
        Commands::LongGreet(args) => {
            let greetings = args.first_names.into_iter().map(|name| Greeting::new(name, ""));
            println!("{}", greet.long_greet(greetings).await?);
        }
        Commands::GreetEveryone(args) => {
            let greetings = args.first_names.into_iter().map(|name| Greeting::new(name, ""));
            for line in greet.greet_everyone(greetings).await? {
                println!("{}", line);
            }
        }
        Commands::GreetDeadline(args) => {
            let timeout = Duration::from_millis(args.timeout_ms);
            let greeting = Greeting::new(args.first_name, "");
            println!("{}", greet.greet_with_deadline(greeting, timeout).await?);
        }
        Commands::Metrics(_) => {
            let snapshot: MetricsSnapshot = client.metrics().await?;
            println!("{}", serde_json::to_string(&snapshot)?);
        }
        Commands::Info(_) => {
            let info: ServerInfo = client.info().await?;
            println!("{}", serde_json::to_string(&info)?);
        }
    }
    Ok(())
}

/// CLI argument parsing tests.
#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::from_args(&["quadrpc"], args).unwrap()
    }

    #[test]
    fn test_parse_serve_defaults() {
        let cli = parse(&["serve"]);
        assert!(cli.addr.is_none());
        assert_eq!(cli.codec, "postcard");
        match cli.command {
            Commands::Serve(args) => {
                assert_eq!(args.max_call_timeout_secs, 300);
                assert_eq!(args.emit_policy, "on-increase");
                assert_eq!(args.greet_step_ms, 1000);
                assert!(args.max_frame_size.is_none());
            }
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn test_parse_global_flags() {
        let cli = parse(&["--addr", "10.0.0.1:9000", "--codec", "json", "--timeout-ms", "250", "add", "3", "10"]);
        assert_eq!(cli.addr.as_deref(), Some("10.0.0.1:9000"));
        assert_eq!(cli.codec, "json");
        assert_eq!(cli.timeout_ms, Some(250));
        match cli.command {
            Commands::Add(AddArgs { first, second }) => {
                assert_eq!(first, 3);
                assert_eq!(second, 10);
            }
            _ => panic!("Expected Add command"),
        }
    }

    #[test]
    fn test_parse_number_lists() {
        match parse(&["average", "2", "4", "6"]).command {
            Commands::Average(args) => assert_eq!(args.numbers, vec![2, 4, 6]),
            _ => panic!("Expected Average command"),
        }
        match parse(&["maximum"]).command {
            Commands::Maximum(args) => assert!(args.numbers.is_empty()),
            _ => panic!("Expected Maximum command"),
        }
    }

    #[test]
    fn test_parse_negative_after_separator() {
        match parse(&["sqrt", "--", "-2"]).command {
            Commands::Sqrt(args) => assert_eq!(args.number, -2),
            _ => panic!("Expected Sqrt command"),
        }
    }

    #[test]
    fn test_parse_greet_variants() {
        match parse(&["greet", "Jane", "--last-name", "Doe"]).command {
            Commands::Greet(args) => {
                assert_eq!(args.first_name, "Jane");
                assert_eq!(args.last_name, "Doe");
            }
            _ => panic!("Expected Greet command"),
        }
        match parse(&["greet-deadline", "Jane"]).command {
            Commands::GreetDeadline(args) => assert_eq!(args.timeout_ms, 5000),
            _ => panic!("Expected GreetDeadline command"),
        }
        match parse(&["greet-everyone", "Ann", "Bob"]).command {
            Commands::GreetEveryone(args) => assert_eq!(args.first_names, vec!["Ann", "Bob"]),
            _ => panic!("Expected GreetEveryone command"),
        }
    }

    #[test]
    fn test_parse_rejects_missing_subcommand() {
        assert!(Cli::from_args(&["quadrpc"], &[]).is_err());
    }
}
