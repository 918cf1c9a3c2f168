use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use sqlgen::catalog::ALL_TABLES;
use sqlgen::config::AppConfig;
use sqlgen::repair_loop::RepairOutcome;
use sqlgen::session::SessionState;
use sqlgen::{Assistant, SaveOutcome, SchemaSummary};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sqlgen")]
#[command(about = "Ask business questions in plain language and get validated SQL")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct Selection {
    /// Catalog holding the tables
    #[arg(long)]
    catalog: String,

    /// Schema holding the tables
    #[arg(long)]
    schema: String,

    /// Comma-separated table names, or "All"
    #[arg(long, value_delimiter = ',', default_value = ALL_TABLES)]
    tables: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List catalogs, schemas and tables
    Catalog,
    /// Print the schema summary used as model context
    Summarize {
        #[command(flatten)]
        selection: Selection,
    },
    /// Generate and validate SQL for a question
    Ask {
        #[command(flatten)]
        selection: Selection,
        question: String,
    },
    /// Answer a follow-up question on top of a validated query
    FollowUp {
        #[command(flatten)]
        selection: Selection,
        /// The validated query to build on
        #[arg(long)]
        base_sql: String,
        question: String,
    },
    /// Suggest quick analysis questions for the selection
    Ideas {
        #[command(flatten)]
        selection: Selection,
    },
    /// Generate Mermaid ERD code for the selection
    Erd {
        #[command(flatten)]
        selection: Selection,
    },
    /// Run a query and print the rows
    Preview { sql: String },
    /// Save a query as a favourite
    Save {
        #[arg(long, env = "SQLGEN_USER")]
        user: String,
        #[arg(long)]
        question: String,
        #[arg(long)]
        sql: String,
    },
    /// Show saved queries mentioning a schema
    History {
        #[arg(long, env = "SQLGEN_USER")]
        user: String,
        #[arg(long)]
        schema: String,
    },
    /// Interactive session over one table selection
    Repl {
        #[arg(long, env = "SQLGEN_USER")]
        user: String,
        #[command(flatten)]
        selection: Selection,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sqlgen=info")))
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env().context("Failed to load configuration")?;
    let assistant = Assistant::from_config(&config).await?;

    match cli.command {
        Commands::Catalog => {
            let tree = assistant.catalog_tree().await?;
            for catalog in tree.catalogs() {
                println!("{}", catalog);
                for schema in tree.schemas(catalog) {
                    println!("  {}", schema);
                    for table in tree.tables(catalog, schema) {
                        println!("    {}", table);
                    }
                }
            }
        }
        Commands::Summarize { selection } => {
            let (_, summary) = load_selection(&assistant, &selection).await?;
            println!("{}", summary);
        }
        Commands::Ask { selection, question } => {
            let (_, summary) = load_selection(&assistant, &selection).await?;
            let outcome = assistant.ask(&question, &summary).await?;
            print_outcome(&outcome);
        }
        Commands::FollowUp { selection, base_sql, question } => {
            let (_, summary) = load_selection(&assistant, &selection).await?;
            let outcome = assistant.follow_up(&question, &summary, &base_sql).await?;
            print_outcome(&outcome);
        }
        Commands::Ideas { selection } => {
            let (_, summary) = load_selection(&assistant, &selection).await?;
            for question in assistant.analysis_questions(&summary).await? {
                println!("- {}", question);
            }
        }
        Commands::Erd { selection } => {
            let (tables, _) = load_selection(&assistant, &selection).await?;
            let erd = assistant.erd(&selection.catalog, &selection.schema, &tables).await?;
            println!("{}", erd);
        }
        Commands::Preview { sql } => {
            println!("{}", assistant.preview(&sql).await?.render()?);
        }
        Commands::Save { user, question, sql } => {
            let mut session = SessionState::new();
            assistant.save_favorite(&mut session, &user, &question, &sql).await?;
            println!("Added to favourites");
        }
        Commands::History { user, schema } => {
            let records = assistant.favorites(&user, &schema).await?;
            if records.is_empty() {
                println!("No saved queries yet.");
            }
            for record in records {
                println!("[{}] {}\n{}\n", record.timestamp.format("%Y-%m-%d %H:%M"), record.question, record.query);
            }
        }
        Commands::Repl { user, selection } => {
            run_repl(&assistant, &user, &selection).await?;
        }
    }

    Ok(())
}

async fn load_selection(assistant: &Assistant, selection: &Selection) -> Result<(Vec<String>, SchemaSummary)> {
    let tables = assistant
        .resolve_tables(&selection.catalog, &selection.schema, &selection.tables)
        .await?;
    anyhow::ensure!(
        !tables.is_empty(),
        "No tables selected in {}.{}",
        selection.catalog,
        selection.schema
    );
    info!("Selected tables: {}", tables.join(", "));
    let summary = assistant
        .summarize(&selection.catalog, &selection.schema, &tables)
        .await?;
    Ok((tables, summary))
}

fn print_outcome(outcome: &RepairOutcome) {
    println!("{}", outcome.sql);
    if outcome.is_correct() {
        println!("\n-- validated after {} attempt(s)", outcome.attempts);
    } else {
        println!(
            "\n-- could not validate after {} attempt(s): {}",
            outcome.attempts,
            outcome.last_error.as_deref().unwrap_or("unknown error")
        );
    }
}

const REPL_HELP: &str = "Commands:
  ask <question>      generate and validate SQL
  follow <question>   build on the last validated query
  preview             show rows of the last validated query
  save                save the last validated query as a favourite
  favourites          list saved queries for this schema
  refresh             reload saved queries
  ideas | new-ideas   suggest analysis questions
  erd | new-erd       Mermaid ERD for the selection
  regenerate          forget cached SQL generations
  quit";

async fn run_repl(assistant: &Assistant, user: &str, selection: &Selection) -> Result<()> {
    let (tables, summary) = load_selection(assistant, selection).await?;
    let repl = Repl {
        assistant,
        user,
        selection,
        tables: &tables,
        summary: &summary,
    };
    let mut session = SessionState::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    println!("Welcome {}! {}", user, REPL_HELP);
    loop {
        stdout.write_all(b"sqlgen> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));

        match repl.step(&mut session, command, rest.trim()).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => eprintln!("Error: {:#}", e),
        }
    }

    Ok(())
}

struct Repl<'a> {
    assistant: &'a Assistant,
    user: &'a str,
    selection: &'a Selection,
    tables: &'a [String],
    summary: &'a SchemaSummary,
}

impl Repl<'_> {
    /// Run one command. `Ok(false)` ends the session.
    async fn step(&self, session: &mut SessionState, command: &str, rest: &str) -> Result<bool> {
        let assistant = self.assistant;
        let (catalog, schema) = (&self.selection.catalog, &self.selection.schema);

        match command {
            "" => {}
            "quit" | "exit" => return Ok(false),
            "help" => println!("{}", REPL_HELP),
            "ask" if !rest.is_empty() => {
                let outcome = assistant.ask(rest, self.summary).await?;
                print_outcome(&outcome);
                if outcome.is_correct() {
                    session.set_last_query(rest, outcome.sql);
                }
            }
            "follow" if !rest.is_empty() => {
                let Some(base) = session.last_query().cloned() else {
                    println!("Ask a question first.");
                    return Ok(true);
                };
                let outcome = assistant.follow_up(rest, self.summary, &base.sql).await?;
                print_outcome(&outcome);
                if outcome.is_correct() {
                    session.set_last_query(rest, outcome.sql);
                }
            }
            "preview" => match session.last_query() {
                Some(last) => println!("{}", assistant.preview(&last.sql).await?.render()?),
                None => println!("Ask a question first."),
            },
            "save" => {
                let Some(last) = session.last_query().cloned() else {
                    println!("Ask a question first.");
                    return Ok(true);
                };
                match assistant
                    .save_favorite(session, self.user, &last.question, &last.sql)
                    .await?
                {
                    SaveOutcome::Saved => println!("Added to favourites"),
                    SaveOutcome::AlreadySaved => println!("Already saved"),
                }
            }
            "favourites" | "favorites" | "refresh" => {
                let records = if command == "refresh" {
                    assistant.refresh_favorites(self.user, schema).await?
                } else {
                    assistant.favorites(self.user, schema).await?
                };
                if records.is_empty() {
                    println!("No saved queries yet.");
                }
                for record in records {
                    println!("• {}\n{}\n", record.question, record.query);
                }
            }
            "ideas" | "new-ideas" => {
                let ideas = if command == "new-ideas" {
                    assistant.regenerate_analysis_questions(self.summary).await?
                } else {
                    assistant.analysis_questions(self.summary).await?
                };
                for idea in ideas {
                    println!("- {}", idea);
                }
            }
            "erd" | "new-erd" => {
                let erd = if command == "new-erd" {
                    assistant.regenerate_erd(catalog, schema, self.tables).await?
                } else {
                    assistant.erd(catalog, schema, self.tables).await?
                };
                println!("{}", erd);
            }
            "regenerate" => {
                assistant.regenerate_sql();
                println!("Cached SQL generations cleared");
            }
            _ => println!("{}", REPL_HELP),
        }

        Ok(true)
    }
}
