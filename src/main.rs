//! metacache - cached access to a local storage root
//!
//! Runs a single storage command against a directory through the metadata
//! cache, loading the cache snapshot before and saving it after.

use anyhow::{anyhow, Context, Result};
use sha1::{Digest, Sha1};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use metacache::{
    Backend, CachedBackend, Config, JsonFileStore, LocalBackend, MetadataStore, StoreConfig,
    Visibility,
};

/// CLI command
#[derive(Debug, PartialEq)]
enum Command {
    Has(String),
    Read(String),
    Write { path: String, contents: String },
    Update { path: String, contents: String },
    /// Write or update, whichever applies
    Put { path: String, contents: String },
    ReadAndDelete(String),
    Delete(String),
    Mkdir(String),
    Rmdir(String),
    Rename { from: String, to: String },
    Copy { from: String, to: String },
    List { dir: String, recursive: bool },
    Stat(String),
    /// Print whether a path is a file or a directory
    Type(String),
    /// Show visibility, or set it when a value is given
    Visibility {
        path: String,
        visibility: Option<Visibility>,
    },
    Flush,
    Stats,
    Help,
}

/// Parsed command line
#[derive(Debug, PartialEq)]
struct Options {
    root: PathBuf,
    command: Command,
    /// None defers to METACACHE_AUTOSAVE
    autosave: Option<bool>,
    snapshot: Option<PathBuf>,
}

fn print_help() {
    eprintln!(
        r#"metacache - Cached access to a local storage root

USAGE:
    metacache [--no-autosave] [--snapshot <file>] <root> <command> [args]

COMMANDS:
    has <path>                     Check whether a file or directory exists
    read <path>                    Print a file's contents
    write <path> <contents>        Create a new file
    update <path> <contents>       Overwrite an existing file
    put <path> <contents>          Create or overwrite a file
    read-and-delete <path>         Print a file's contents, then delete it
    delete <path>                  Delete a file
    mkdir <path>                   Create a directory
    rmdir <path>                   Delete a directory and everything below it
    rename <from> <to>             Move a file or directory
    copy <from> <to>               Copy a file
    list [dir] [--recursive]       List a directory
    stat <path>                    Print metadata as JSON
    type <path>                    Print "file" or "dir"
    visibility <path> [public|private]
                                   Show or set visibility
    flush                          Forget everything cached for this root
    stats                          Show cache statistics
    help                           Show this help message

OPTIONS:
    --no-autosave      Save the cache snapshot only on exit
    --snapshot <file>  Cache snapshot location
                       (default: <cache dir>/metacache/<sha1 of root>.json)

ENVIRONMENT:
    METACACHE_SNAPSHOT   Cache snapshot location (alternative to --snapshot)
    METACACHE_AUTOSAVE   Set to 0 or false to disable autosave
    RUST_LOG             Log level (trace, debug, info, warn, error)
"#
    );
}

fn usage(command: &str, args: &str) -> anyhow::Error {
    anyhow!("Usage: metacache <root> {} {}", command, args)
}

fn parse_args(args: &[String]) -> Result<Options> {
    let mut autosave = None;
    let mut snapshot = None;
    let mut rest = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--no-autosave" => autosave = Some(false),
            "--snapshot" => {
                let file = iter
                    .next()
                    .ok_or_else(|| anyhow!("--snapshot requires a file"))?;
                snapshot = Some(PathBuf::from(file));
            }
            "help" | "--help" | "-h" if rest.is_empty() => {
                return Ok(Options {
                    root: PathBuf::new(),
                    command: Command::Help,
                    autosave,
                    snapshot,
                });
            }
            _ => rest.push(arg.as_str()),
        }
    }

    let (root, command, args) = match rest.as_slice() {
        [root, command, args @ ..] => (PathBuf::from(root), *command, args),
        _ => return Err(anyhow!("Missing <root> or <command>")),
    };

    let one = |name: &str| -> Result<String> {
        match args {
            [path] => Ok(path.to_string()),
            _ => Err(usage(name, "<path>")),
        }
    };
    let two = |name: &str, shape: &str| -> Result<(String, String)> {
        match args {
            [a, b] => Ok((a.to_string(), b.to_string())),
            _ => Err(usage(name, shape)),
        }
    };

    let command = match command {
        "has" => Command::Has(one("has")?),
        "read" => Command::Read(one("read")?),
        "write" => {
            let (path, contents) = two("write", "<path> <contents>")?;
            Command::Write { path, contents }
        }
        "update" => {
            let (path, contents) = two("update", "<path> <contents>")?;
            Command::Update { path, contents }
        }
        "put" => {
            let (path, contents) = two("put", "<path> <contents>")?;
            Command::Put { path, contents }
        }
        "read-and-delete" => Command::ReadAndDelete(one("read-and-delete")?),
        "delete" => Command::Delete(one("delete")?),
        "mkdir" => Command::Mkdir(one("mkdir")?),
        "rmdir" => Command::Rmdir(one("rmdir")?),
        "rename" => {
            let (from, to) = two("rename", "<from> <to>")?;
            Command::Rename { from, to }
        }
        "copy" => {
            let (from, to) = two("copy", "<from> <to>")?;
            Command::Copy { from, to }
        }
        "list" => {
            let recursive = args.contains(&"--recursive");
            let dirs: Vec<&&str> = args.iter().filter(|a| **a != "--recursive").collect();
            let dir = match dirs.as_slice() {
                [] => String::new(),
                [dir] => dir.to_string(),
                _ => return Err(usage("list", "[dir] [--recursive]")),
            };
            Command::List { dir, recursive }
        }
        "stat" => Command::Stat(one("stat")?),
        "type" => Command::Type(one("type")?),
        "visibility" => match args {
            [path] => Command::Visibility {
                path: path.to_string(),
                visibility: None,
            },
            [path, value] => Command::Visibility {
                path: path.to_string(),
                visibility: Some(value.parse().map_err(|e: String| anyhow!(e))?),
            },
            _ => return Err(usage("visibility", "<path> [public|private]")),
        },
        "flush" => Command::Flush,
        "stats" => Command::Stats,
        "help" => Command::Help,
        other => return Err(anyhow!("Unknown command: {}", other)),
    };

    Ok(Options {
        root,
        command,
        autosave,
        snapshot,
    })
}

/// Default snapshot location for a backend root
fn default_snapshot_path(root: &Path) -> Result<PathBuf> {
    let cache_dir = dirs::cache_dir().context("Could not determine cache directory")?;
    let digest = Sha1::digest(root.to_string_lossy().as_bytes());
    Ok(cache_dir
        .join("metacache")
        .join(format!("{:x}.json", digest)))
}

fn env_autosave() -> Option<bool> {
    env::var("METACACHE_AUTOSAVE")
        .ok()
        .map(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off"))
}

fn ensure(ok: bool, action: &str, path: &str) -> Result<()> {
    if ok {
        Ok(())
    } else {
        Err(anyhow!("Backend declined to {} {}", action, path))
    }
}

fn run<B: Backend>(cache: &CachedBackend<B>, command: Command) -> Result<()> {
    match command {
        Command::Has(path) => {
            println!("{}", cache.has(&path)?);
        }
        Command::Read(path) => {
            print!("{}", cache.read(&path)?);
        }
        Command::Write { path, contents } => {
            ensure(cache.write(&path, &contents, &Config::new())?, "write", &path)?;
        }
        Command::Update { path, contents } => {
            ensure(cache.update(&path, &contents, &Config::new())?, "update", &path)?;
        }
        Command::Put { path, contents } => {
            ensure(cache.put(&path, &contents, &Config::new())?, "put", &path)?;
        }
        Command::ReadAndDelete(path) => {
            print!("{}", cache.read_and_delete(&path)?);
        }
        Command::Delete(path) => {
            ensure(cache.delete(&path)?, "delete", &path)?;
        }
        Command::Mkdir(path) => {
            ensure(cache.create_dir(&path, &Config::new())?, "create", &path)?;
        }
        Command::Rmdir(path) => {
            ensure(cache.delete_dir(&path)?, "delete", &path)?;
        }
        Command::Rename { from, to } => {
            ensure(cache.rename(&from, &to)?, "rename", &from)?;
        }
        Command::Copy { from, to } => {
            ensure(cache.copy(&from, &to)?, "copy", &from)?;
        }
        Command::List { dir, recursive } => {
            for entry in cache.list_contents(&dir, recursive)? {
                if entry.is_directory() {
                    println!("{}/", entry.path);
                } else {
                    println!("{}\t{}", entry.path, entry.size.unwrap_or(0));
                }
            }
        }
        Command::Stat(path) => {
            let metadata = cache.get_metadata(&path)?;
            println!("{}", serde_json::to_string_pretty(&metadata)?);
        }
        Command::Type(path) => {
            let kind = if cache.get(&path)?.is_dir() { "dir" } else { "file" };
            println!("{}", kind);
        }
        Command::Visibility { path, visibility } => match visibility {
            Some(visibility) => {
                ensure(cache.set_visibility(&path, visibility)?, "change visibility of", &path)?;
            }
            None => println!("{}", cache.get_visibility(&path)?),
        },
        Command::Flush => {
            cache.flush()?;
            println!("Cache flushed.");
        }
        Command::Stats => {
            let store = cache.store();
            store.log_metrics();
            let (hits, misses, hit_rate) = store.stats();
            println!("Entries:  {}", store.entry_count());
            println!("Hits:     {}", hits);
            println!("Misses:   {}", misses);
            println!("Hit rate: {:.1}%", hit_rate);
        }
        Command::Help => print_help(),
    }
    Ok(())
}

fn main() -> Result<()> {
    // Initialize logging
    let log_level = env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Parse command
    let args: Vec<String> = env::args().skip(1).collect();
    let options = match parse_args(&args) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };
    if options.command == Command::Help {
        print_help();
        return Ok(());
    }

    let backend = LocalBackend::new(&options.root)
        .with_context(|| format!("Failed to open {}", options.root.display()))?;

    let snapshot = match options
        .snapshot
        .or_else(|| env::var_os("METACACHE_SNAPSHOT").map(PathBuf::from))
    {
        Some(path) => path,
        None => default_snapshot_path(backend.root())?,
    };
    let autosave = options.autosave.or_else(env_autosave).unwrap_or(true);

    let store = MetadataStore::with_store(JsonFileStore::new(&snapshot), StoreConfig { autosave });
    if let Err(e) = store.load() {
        warn!(error = %e, snapshot = %snapshot.display(), "Ignoring unreadable cache snapshot");
    }
    info!(
        root = %backend.root().display(),
        snapshot = %snapshot.display(),
        autosave = autosave,
        "Cache ready"
    );

    let cache = CachedBackend::with_store(backend, Arc::new(store));
    let result = run(&cache, options.command);
    cache.close().context("Failed to save cache snapshot")?;
    result
}
