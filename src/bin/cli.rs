//! MultiDB - CLI
//!
//! Interactive shell that keeps several database connections open and
//! broadcasts every query to all of them.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, RwLock};

use anyhow::Result;
use clap::{Parser, ValueEnum};
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{CompletionType, Config, EditMode, Editor, Helper};
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use multidb::broadcast::{BroadcastConfig, CancelFlag, ExecutionMode};
use multidb::catalog::ConnectionCatalog;
use multidb::engine::append_to_file;
use multidb::sink::{ConsoleSink, OutputFormat, ResultSink, DEFAULT_OUTPUT_FILE};
use multidb::{Error, MultiDb};

const PROMPT: &str = ">>> ";

/// Broadcast SQL statements to several databases at once
#[derive(Parser, Debug)]
#[command(name = "multidb", version, about)]
struct Args {
    /// Connection definition file
    #[arg(short = 'f', long, default_value = "connections.json")]
    connections: PathBuf,

    /// File that OQUERY appends results to
    #[arg(short, long, default_value = DEFAULT_OUTPUT_FILE)]
    output: PathBuf,

    /// Run each statement on all connections concurrently
    #[arg(long)]
    parallel: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    format: FormatArg,

    /// Connections to open at startup (comma separated)
    #[arg(short = 'u', long = "use", value_delimiter = ',')]
    use_names: Vec<String>,

    /// Broadcast these statements and exit
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// With -c, also append results to the output file
    #[arg(long)]
    log: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Text,
    Json,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Text => OutputFormat::Text,
            FormatArg::Json => OutputFormat::Json,
        }
    }
}

/// A parsed line of input
#[derive(Debug, Clone, PartialEq)]
enum Command {
    /// List connections (no names) or connect each name in order
    Use(Vec<String>),
    Used,
    Disconnect,
    Reload,
    Query { sql: String, log: bool },
    Mode(Option<OutputFormat>),
    Clear,
    Help,
    Exit,
    Empty,
    Invalid(String),
}

impl Command {
    fn parse(line: &str) -> Self {
        let line = line.trim();
        let lower = line.to_ascii_lowercase();

        match lower.as_str() {
            "" => return Command::Empty,
            "exit" | "quit" => return Command::Exit,
            "clear" => return Command::Clear,
            "used" => return Command::Used,
            "reload" => return Command::Reload,
            "disconnect" => return Command::Disconnect,
            "help" => return Command::Help,
            _ => {}
        }

        let mut words = line.split_whitespace();
        let keyword = words.next().unwrap_or("").to_ascii_lowercase();

        match keyword.as_str() {
            "use" => Command::Use(words.map(str::to_string).collect()),
            "mode" => Command::Mode(match words.next().map(str::to_ascii_lowercase).as_deref() {
                Some("text") => Some(OutputFormat::Text),
                Some("json") => Some(OutputFormat::Json),
                _ => None,
            }),
            _ if lower.starts_with("oquery") => Command::Query {
                sql: line[6..].trim().to_string(),
                log: true,
            },
            _ if lower.starts_with("query") => Command::Query {
                sql: line[5..].trim().to_string(),
                log: false,
            },
            _ => Command::Invalid(line.to_string()),
        }
    }
}

/// Names offered by tab completion
#[derive(Clone, Default)]
struct Completions {
    connections: Arc<RwLock<Vec<String>>>,
    tables: Arc<RwLock<Vec<String>>>,
}

impl Completions {
    fn set_connections(&self, names: Vec<String>) {
        if let Ok(mut guard) = self.connections.write() {
            *guard = names;
        }
    }

    fn set_tables(&self, names: Vec<String>) {
        if let Ok(mut guard) = self.tables.write() {
            *guard = names;
        }
    }

    fn candidates(&self, line: &str) -> Vec<String> {
        let upper = line.trim_start().to_ascii_uppercase();
        let source = if upper.starts_with("USE") {
            &self.connections
        } else if upper.starts_with("SELECT")
            || upper.starts_with("QUERY SELECT")
            || upper.starts_with("OQUERY SELECT")
        {
            &self.tables
        } else {
            return Vec::new();
        };
        source.read().map(|g| g.clone()).unwrap_or_default()
    }
}

/// REPL helper for rustyline
struct ReplHelper {
    completions: Completions,
}

impl Completer for ReplHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let start = line[..pos]
            .rfind(|c: char| c.is_whitespace() || c == '(' || c == ',')
            .map(|i| i + 1)
            .unwrap_or(0);
        let word = &line[start..pos];

        let matches = self
            .completions
            .candidates(&line[..start])
            .into_iter()
            .filter(|name| name.starts_with(word))
            .map(|name| Pair {
                display: name.clone(),
                replacement: name,
            })
            .collect();

        Ok((start, matches))
    }
}

impl Hinter for ReplHelper {
    type Hint = String;
}

impl Highlighter for ReplHelper {}

impl Validator for ReplHelper {}

impl Helper for ReplHelper {}

/// Print welcome banner
fn print_banner() {
    println!("Welcome to MultiDB v{}! 'exit' to quit.\n", env!("CARGO_PKG_VERSION"));
}

/// Print help message
fn print_help() {
    println!(
        r#"
Commands:
  USE                     List available connections
  USE <name> [<name> ...] Connect to one or more connections
  USED                    Show active connections
  QUERY <sql>             Run statements on every active connection
  OQUERY <sql>            Same as QUERY, also append results to the output file
  DISCONNECT              Close every active connection
  RELOAD                  Reload the connection file
  MODE <text|json>        Set the output format
  CLEAR                   Clear screen
  HELP                    Show this help message
  EXIT                    Quit

Statements are separated by ';'. Press Ctrl+C while a query runs to stop
after the statement currently executing.
"#
    );
}

fn using_line(names: &[String]) -> String {
    if names.is_empty() {
        "Using: None".to_string()
    } else {
        format!("Using: {}", names.join(", "))
    }
}

struct Repl {
    db: MultiDb,
    editor: Editor<ReplHelper, DefaultHistory>,
    console: ConsoleSink<io::Stdout>,
    completions: Completions,
    connections_path: PathBuf,
    output_path: PathBuf,
}

impl Repl {
    fn new(db: MultiDb, args: &Args) -> Result<Self> {
        let rl_config = Config::builder()
            .history_ignore_space(true)
            .completion_type(CompletionType::List)
            .edit_mode(EditMode::Emacs)
            .build();

        let completions = Completions::default();
        let mut editor = Editor::with_config(rl_config)?;
        editor.set_helper(Some(ReplHelper {
            completions: completions.clone(),
        }));

        Ok(Self {
            db,
            editor,
            console: ConsoleSink::stdout(args.format.into()),
            completions,
            connections_path: args.connections.clone(),
            output_path: args.output.clone(),
        })
    }

    async fn run(&mut self) -> Result<()> {
        print_banner();

        let catalog = self.db.sessions().catalog().await;
        if catalog.is_empty() {
            println!(
                "No connections loaded. Make sure '{}' exists and is valid, then RELOAD.",
                self.connections_path.display()
            );
        } else {
            println!("Loaded connections: {:?}", catalog.names());
        }
        self.completions.set_connections(catalog.names());
        self.refresh_tables().await;

        loop {
            match self.editor.readline(PROMPT) {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        let _ = self.editor.add_history_entry(line.as_str());
                    }
                    if !self.handle(Command::parse(&line)).await {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => break,
                Err(e) => {
                    error!("readline error: {}", e);
                    break;
                }
            }
        }

        self.db.disconnect_all().await;
        Ok(())
    }

    /// Returns false when the REPL should exit
    async fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Empty => {}
            Command::Exit => {
                println!("Goodbye!");
                return false;
            }
            Command::Help => print_help(),
            Command::Clear => {
                print!("\x1B[2J\x1B[1;1H");
                let _ = io::stdout().flush();
                println!("{}", using_line(&self.db.list_active().await));
            }
            Command::Used => println!("{}", using_line(&self.db.list_active().await)),
            Command::Reload => {
                let catalog = self.db.reload(&self.connections_path).await;
                if catalog.is_empty() {
                    println!(
                        "No connections found or failed to reload. Please check '{}'.",
                        self.connections_path.display()
                    );
                } else {
                    println!(
                        "Connections reloaded. Available connections: {:?}",
                        catalog.names()
                    );
                }
                self.completions.set_connections(catalog.names());
            }
            Command::Use(names) if names.is_empty() => {
                println!("Available connections:");
                for name in self.db.sessions().catalog().await.names() {
                    println!("- {}", name);
                }
            }
            Command::Use(names) => {
                connect_all(&self.db, &names).await;
                self.refresh_tables().await;
            }
            Command::Disconnect => {
                let names = self.db.disconnect_all().await;
                if names.is_empty() {
                    println!("Disconnected from none.");
                } else {
                    println!("Disconnected from {}.", names.join(", "));
                }
                self.completions.set_tables(Vec::new());
            }
            Command::Mode(Some(format)) => {
                self.console.set_format(format);
                println!("Output format set to {:?}.", format);
            }
            Command::Mode(None) => println!("Invalid mode command. Usage: MODE <text|json>"),
            Command::Query { sql, log } => {
                if sql.is_empty() {
                    let keyword = if log { "oquery" } else { "query" };
                    println!(
                        "Invalid {} command. Usage: {} <SQL statements>",
                        keyword, keyword
                    );
                } else {
                    self.query(&sql, log).await;
                    self.refresh_tables().await;
                }
            }
            Command::Invalid(line) => {
                debug!(input = %line, "unrecognised command");
                println!(
                    "Invalid command. Use 'USE <connection_name>' to select a database or 'QUERY <SQL statements>' to execute queries."
                );
            }
        }
        true
    }

    async fn query(&mut self, sql: &str, log: bool) {
        let cancel = CancelFlag::new();
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };

        let batch = self.db.broadcast(sql, &cancel).await;
        watcher.abort();

        if let Err(Error::NoActiveConnection) = batch.check_status() {
            println!("No database is selected. Use the 'USE' command to select a database.");
            return;
        }

        if let Err(e) = self.console.deliver(&batch) {
            eprintln!("Error printing results: {}", e);
        }
        if let Err(e @ Error::Cancelled) = batch.check_status() {
            println!("{} after {} outcome(s).", e, batch.len());
        }

        if log {
            match append_to_file(&batch, &self.output_path) {
                Ok(()) => println!("Output written to {}.", self.output_path.display()),
                Err(e) => eprintln!("Error writing output to file: {}", e),
            }
        }
    }

    async fn refresh_tables(&self) {
        self.completions
            .set_tables(self.db.sessions().table_names().await);
    }
}

/// Connect each name in order; a failure never stops the rest
async fn connect_all(db: &MultiDb, names: &[String]) -> usize {
    let mut connected = 0;
    for name in names {
        match db.connect(name).await {
            Ok(()) => {
                println!("Using {}.", name);
                connected += 1;
            }
            Err(Error::UnknownConnection(_)) => println!("No connection named '{}' found.", name),
            Err(e) => println!("Failed to connect to {}: {}", name, e),
        }
    }
    connected
}

/// Run one broadcast without the REPL
async fn run_once(db: &MultiDb, args: &Args, sql: &str) -> Result<ExitCode> {
    let batch = db.broadcast(sql, &CancelFlag::new()).await;
    if let Err(e) = batch.check_status() {
        eprintln!("{}. Pass --use <name>[,<name>...].", e);
        return Ok(ExitCode::FAILURE);
    }

    ConsoleSink::stdout(args.format.into()).deliver(&batch)?;
    if args.log {
        append_to_file(&batch, &args.output)?;
    }

    Ok(if batch.failures().next().is_some() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "multidb=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let mode = if args.parallel {
        ExecutionMode::Parallel
    } else {
        ExecutionMode::Sequential
    };
    let catalog = ConnectionCatalog::load_or_empty(&args.connections);
    let db = MultiDb::new(catalog, BroadcastConfig::new().mode(mode));

    connect_all(&db, &args.use_names).await;

    if let Some(sql) = args.command.as_deref() {
        let code = run_once(&db, &args, sql).await;
        db.disconnect_all().await;
        return code;
    }

    let mut repl = Repl::new(db, &args)?;
    repl.run().await?;
    Ok(ExitCode::SUCCESS)
}
