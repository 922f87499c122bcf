//! lexdb CLI
//!
//! Thin administrative surface over `lexdb_core`: lexicon administration,
//! JSON-lines import/export, search, statistics and entry moves.

use std::error::Error;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use log::error;

use lexdb_core::db::migrations::schema_script;
use lexdb_core::{
    default_log_level, flush_logs, init_logging, Database, Dialect, Entry, EntryRepository,
    EntryStatus, ImportOptions, ImportService, LexiconRef, LexiconRegistry, LexiconRepository,
    ListCancellation, MariaDbDialect, NewLexicon, Query, SqliteDialect, SqliteEntryRepository,
    SqliteLexiconRepository, StatsService, StderrSink,
};

type CliResult<T> = Result<T, Box<dyn Error>>;

#[derive(Parser)]
#[command(name = "lexdb")]
#[command(about = "Pronunciation lexicon database administration", long_about = None)]
struct Cli {
    /// Database file
    #[arg(long, global = true, env = "LEXDB_DB", default_value = "lexdb.sqlite")]
    db: PathBuf,

    /// SQL dialect the database is opened with
    #[arg(long, global = true, value_enum, default_value_t = DialectArg::Sqlite)]
    dialect: DialectArg,

    /// trace|debug|info|warn|error
    #[arg(long, global = true, env = "LEXDB_LOG_LEVEL", default_value = default_log_level())]
    log_level: String,

    /// Absolute directory for rolling log files; file logging is off without it
    #[arg(long, global = true, env = "LEXDB_LOG_DIR")]
    log_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DialectArg {
    Sqlite,
    SqliteNoTriggers,
    Mariadb,
}

impl DialectArg {
    fn dialect(self) -> Arc<dyn Dialect> {
        match self {
            Self::Sqlite => Arc::new(SqliteDialect::new()),
            Self::SqliteNoTriggers => Arc::new(SqliteDialect::without_triggers()),
            Self::Mariadb => Arc::new(MariaDbDialect),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the provisioning DDL for the selected dialect
    Schema,

    /// Define a new lexicon
    CreateLexicon {
        name: String,
        #[arg(long)]
        symbol_set: String,
        #[arg(long)]
        locale: String,
    },

    /// Delete an empty lexicon
    DeleteLexicon { name: String },

    RenameLexicon { from: String, to: String },

    /// List lexicons of this database and of every attached one
    ListLexicons {
        /// Additional databases as NAME=PATH
        #[arg(long = "attach", value_parser = parse_attachment)]
        attachments: Vec<(String, PathBuf)>,
    },

    /// Import JSON-lines entries ("-" reads stdin)
    Import {
        lexicon: String,
        input: PathBuf,
        #[arg(long, default_value_t = lexdb_core::service::import_service::DEFAULT_IMPORT_BATCH_SIZE)]
        batch_size: usize,
        /// Status stamped on entries that carry none
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value = "import")]
        status_source: String,
    },

    /// Search entries and print them as JSON lines
    Search {
        #[arg(short, long = "lexicon")]
        lexicons: Vec<String>,
        #[arg(short, long = "word")]
        words: Vec<String>,
        #[arg(long)]
        word_like: Option<String>,
        #[arg(long)]
        word_regexp: Option<String>,
        #[arg(long)]
        transcription_like: Option<String>,
        #[arg(long)]
        transcription_regexp: Option<String>,
        #[arg(long = "status")]
        statuses: Vec<String>,
        #[arg(long = "id")]
        entry_ids: Vec<i64>,
        /// Full query as JSON; flags above are merged into it
        #[arg(long)]
        query: Option<String>,
        /// Export every entry of the given lexicons
        #[arg(long)]
        all: bool,
        #[arg(long, default_value_t = 0)]
        page: u32,
        #[arg(long, default_value_t = 0)]
        page_length: u32,
    },

    /// Apply a JSON entry (file or "-") as a diff-based update
    UpdateEntry { input: PathBuf },

    DeleteEntry { id: i64 },

    /// Move entries whose orthography is missing in the destination lexicon
    MoveNewEntries {
        from: String,
        to: String,
        #[arg(long)]
        status: String,
        #[arg(long, default_value = "move")]
        status_source: String,
    },

    /// Entry, status and stored validation statistics of a lexicon
    Stats { lexicon: String },
}

fn parse_attachment(value: &str) -> Result<(String, PathBuf), String> {
    match value.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => {
            Ok((name.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected NAME=PATH, got `{value}`")),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Some(log_dir) = cli.log_dir.as_deref() {
        if let Err(err) = init_logging(&cli.log_level, log_dir) {
            eprintln!("lexdb: {err}");
            return ExitCode::FAILURE;
        }
    }

    let code = match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("event=cli_command module=cli status=error error={}", err);
            eprintln!("lexdb: {err}");
            ExitCode::FAILURE
        }
    };
    flush_logs();
    code
}

fn run(cli: Cli) -> CliResult<()> {
    let dialect = cli.dialect.dialect();
    if let Commands::Schema = cli.command {
        print!("{}", schema_script(dialect.as_ref()));
        return Ok(());
    }

    let database = Database::open("main", &cli.db, Arc::clone(&dialect))?;
    match cli.command {
        Commands::Schema => Ok(()),
        Commands::CreateLexicon {
            name,
            symbol_set,
            locale,
        } => {
            let lexicon = database.with_connection(|conn, dialect| {
                SqliteLexiconRepository::with_dialect(conn, dialect)
                    .create_lexicon(&NewLexicon::new(name, symbol_set, locale))
            })?;
            print_json(&lexicon)
        }
        Commands::DeleteLexicon { name } => Ok(database.with_connection(|conn, dialect| {
            SqliteLexiconRepository::with_dialect(conn, dialect).delete_lexicon(&name)
        })?),
        Commands::RenameLexicon { from, to } => {
            let lexicon = database.with_connection(|conn, dialect| {
                SqliteLexiconRepository::with_dialect(conn, dialect).rename_lexicon(&from, &to)
            })?;
            print_json(&lexicon)
        }
        Commands::ListLexicons { attachments } => {
            let registry = LexiconRegistry::new();
            registry.add_database(database)?;
            for (name, path) in attachments {
                registry.add_database(Database::open(name, path, Arc::clone(&dialect))?)?;
            }
            for lexicon in registry.list_lexicons(&ListCancellation::new())? {
                println!(
                    "{}\t{}\t{}",
                    lexicon.reference(),
                    lexicon.lexicon.symbol_set_name,
                    lexicon.lexicon.locale
                );
            }
            Ok(())
        }
        Commands::Import {
            lexicon,
            input,
            batch_size,
            status,
            status_source,
        } => {
            let reader = open_input(&input)?;
            let options = ImportOptions {
                batch_size,
                initial_status: status.map(|name| EntryStatus::new(name, status_source)),
            };
            let records = reader
                .lines()
                .filter(|line| !matches!(line, Ok(text) if text.trim().is_empty()))
                .map(|line| -> CliResult<Entry> { Ok(serde_json::from_str(&line?)?) });
            let report = database.with_connection(|conn, dialect| {
                ImportService::new(SqliteEntryRepository::with_dialect(conn, dialect))
                    .import(&lexicon, records, &options, &StderrSink)
                    .map_err(|err| -> Box<dyn Error> { Box::new(err) })
            })?;
            println!(
                "imported {} entries in {} batches",
                report.imported, report.batches
            );
            Ok(())
        }
        Commands::Search {
            lexicons,
            words,
            word_like,
            word_regexp,
            transcription_like,
            transcription_regexp,
            statuses,
            entry_ids,
            query,
            all,
            page,
            page_length,
        } => {
            let mut query: Query = match query {
                Some(json) => serde_json::from_str(&json)?,
                None if all => Query::all_in(lexicons.iter().cloned()),
                None => Query::default(),
            };
            query.lexicons.extend(lexicons);
            query.lexicons.sort();
            query.lexicons.dedup();
            query.words.extend(words);
            query.entry_ids.extend(entry_ids);
            query.statuses.extend(statuses);
            query.word_like = word_like.or(query.word_like);
            query.word_regexp = word_regexp.or(query.word_regexp);
            query.transcription_like = transcription_like.or(query.transcription_like);
            query.transcription_regexp = transcription_regexp.or(query.transcription_regexp);
            query = query.with_paging(page, page_length);

            let stdout = io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            let mut write_error = None;
            let mut sink = lexdb_core::repo::FnSink(|entry: Entry| -> lexdb_core::RepoResult<()> {
                if write_error.is_none() {
                    if let Err(err) = serde_json::to_writer(&mut out, &entry)
                        .map_err(io::Error::from)
                        .and_then(|()| out.write_all(b"\n"))
                    {
                        write_error = Some(err);
                    }
                }
                Ok(())
            });
            database.with_connection(|conn, dialect| {
                SqliteEntryRepository::with_dialect(conn, dialect).search_each(&query, &mut sink)
            })?;
            drop(sink);
            if let Some(err) = write_error {
                return Err(err.into());
            }
            out.flush()?;
            Ok(())
        }
        Commands::UpdateEntry { input } => {
            let mut text = String::new();
            open_input(&input)?.read_to_string(&mut text)?;
            let entry: Entry = serde_json::from_str(&text)?;
            let outcome = database.with_connection(|conn, dialect| {
                SqliteEntryRepository::with_dialect(conn, dialect).update_entry(&entry)
            })?;
            eprintln!("updated={}", outcome.updated);
            print_json(&outcome.entry)
        }
        Commands::DeleteEntry { id } => Ok(database.with_connection(|conn, dialect| {
            SqliteEntryRepository::with_dialect(conn, dialect).delete_entry(id)
        })?),
        Commands::MoveNewEntries {
            from,
            to,
            status,
            status_source,
        } => {
            let registry = LexiconRegistry::new();
            registry.add_database(database)?;
            let report = registry.move_new_entries(
                &LexiconRef::new("main", from),
                &LexiconRef::new("main", to),
                &EntryStatus::new(status, status_source),
            )?;
            println!(
                "moved {} entries from {} to {}",
                report.moved, report.from, report.to
            );
            Ok(())
        }
        Commands::Stats { lexicon } => {
            let stats = database.with_connection(|conn, dialect| {
                StatsService::new(
                    SqliteEntryRepository::with_dialect(conn, dialect),
                    SqliteLexiconRepository::with_dialect(conn, dialect),
                )
                .persisted_stats(&lexicon)
            })?;
            print_json(&stats)
        }
    }
}

fn open_input(path: &Path) -> CliResult<Box<dyn BufRead>> {
    if path.as_os_str() == "-" {
        Ok(Box::new(BufReader::new(io::stdin())))
    } else {
        Ok(Box::new(BufReader::new(File::open(path)?)))
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
