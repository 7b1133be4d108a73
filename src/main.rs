use anyhow::{anyhow, bail, Result};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::time::Duration;

use photocat::album::{AlbumKind, AlbumManager, AlbumTree, LocaleCheck, PhysicalLocation, StoreAdvice};
use photocat::cache::ThumbnailCache;
use photocat::collection::{CollectionManager, LocationResolver};
use photocat::db::{CatalogStore, ItemInfo, SqliteCatalog};
use photocat::fileops::{DeleteMode, FileOperations, ThreadJobFacility};
use photocat::tasks::OperationKind;
use photocat::trash::TrashManager;
use photocat::watch::NotifyWatch;
use photocat::{logging, CatalogEvent, Config, EventBus};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Tree,
    Watch,
    Move { items: Vec<i64>, album: i64 },
    Copy { items: Vec<i64>, album: i64 },
    Rename { item: i64, name: String },
    Remove { items: Vec<i64>, trash: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Args {
    config_path: Option<PathBuf>,
    command: Command,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match parse_args_from(&args) {
        Ok(Some(args)) => args,
        Ok(None) => std::process::exit(0),
        Err(message) => {
            eprintln!("Error: {}", message);
            print_help();
            std::process::exit(1);
        }
    }
}

/// `Ok(None)` when help or version was printed.
fn parse_args_from(args: &[String]) -> Result<Option<Args>, String> {
    let mut config_path = None;
    let mut command: Option<String> = None;
    let mut positional = Vec::new();
    let mut to_album = None;
    let mut trash = false;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                return Ok(None);
            }
            "--version" | "-V" => {
                println!("photocat {}", env!("CARGO_PKG_VERSION"));
                return Ok(None);
            }
            "--config" | "-c" => {
                let path = args.get(i + 1).ok_or("--config requires a path argument")?;
                config_path = Some(PathBuf::from(path));
                i += 1;
            }
            "--to" => {
                let id = args.get(i + 1).ok_or("--to requires an album id")?;
                to_album = Some(parse_id(id)?);
                i += 1;
            }
            "--trash" => trash = true,
            arg if arg.starts_with('-') => return Err(format!("Unknown argument: {}", arg)),
            arg if command.is_none() => command = Some(arg.to_string()),
            arg => positional.push(arg.to_string()),
        }
        i += 1;
    }

    let command = match command.as_deref() {
        None => return Err("No command given".into()),
        Some("tree") => Command::Tree,
        Some("watch") => Command::Watch,
        Some(name @ ("mv" | "cp")) => {
            let items = parse_ids(&positional)?;
            if items.is_empty() {
                return Err(format!("{} needs at least one item id", name));
            }
            let album = to_album.ok_or_else(|| format!("{} needs --to <ALBUM_ID>", name))?;
            if name == "mv" {
                Command::Move { items, album }
            } else {
                Command::Copy { items, album }
            }
        }
        Some("rename") => match positional.as_slice() {
            [item, name] => Command::Rename {
                item: parse_id(item)?,
                name: name.clone(),
            },
            _ => return Err("rename needs <ITEM_ID> <NEW_NAME>".into()),
        },
        Some("rm") => {
            let items = parse_ids(&positional)?;
            if items.is_empty() {
                return Err("rm needs at least one item id".into());
            }
            Command::Remove { items, trash }
        }
        Some(other) => return Err(format!("Unknown command: {}", other)),
    };

    Ok(Some(Args {
        config_path,
        command,
    }))
}

fn parse_id(value: &str) -> Result<i64, String> {
    value
        .parse()
        .map_err(|_| format!("Not a valid id: {}", value))
}

fn parse_ids(values: &[String]) -> Result<Vec<i64>, String> {
    values.iter().map(|v| parse_id(v)).collect()
}

fn print_help() {
    println!(
        r#"photocat - photo catalog engine

USAGE:
    photocat [OPTIONS] <COMMAND>

COMMANDS:
    tree                              Sync and print albums, tags, searches and dates
    watch                             Sync, then re-sync on filesystem changes
    mv <ITEM_ID>... --to <ALBUM_ID>   Move items (with sidecars and grouped items)
    cp <ITEM_ID>... --to <ALBUM_ID>   Copy items
    rename <ITEM_ID> <NEW_NAME>       Rename an item and its sidecars
    rm [--trash] <ITEM_ID>...         Delete items, or move them to the trash

OPTIONS:
    --config, -c PATH   Path to config file
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    PHOTOCAT_CONFIG     Path to config file (overrides default location)
    PHOTOCAT_LOG        Log level (trace, debug, info, warn, error)

Config file location: $XDG_CONFIG_HOME/photocat/config.toml"#
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args();

    let config = match &args.config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    if let Err(e) = logging::init(&config.logging) {
        eprintln!("Logging disabled: {:#}", e);
    }

    let store: Arc<dyn CatalogStore> = Arc::new(SqliteCatalog::open(&config.db_path)?);
    let resolver: Arc<dyn LocationResolver> =
        Arc::new(CollectionManager::from_config(&config.album_roots));
    let events = EventBus::new();
    let notifications = events.subscribe();

    let (mut albums, advice) = AlbumManager::open(
        store.clone(),
        resolver.clone(),
        events.clone(),
        config.show_item_counts,
    );
    match advice {
        StoreAdvice::Success => {}
        StoreAdvice::ContinueWithoutDatabase(message) => {
            eprintln!("Warning: {}. Continuing without the catalog.", message);
        }
        StoreAdvice::AbortImmediately(message) => bail!(message),
    }

    let mut dirty_paths = None;
    if args.command == Command::Watch && config.watch.enabled {
        let (watch, rx) = NotifyWatch::new()?;
        albums = albums.with_watch(Box::new(watch));
        dirty_paths = Some(rx);
    }

    if let LocaleCheck::Changed { stored, current } = albums.start()? {
        eprintln!(
            "Catalog locale changed from {} to {}; recording the new locale.",
            stored, current
        );
        albums.accept_locale_change()?;
        albums.start()?;
    }

    let interval = Duration::from_millis(config.watch.poll_interval_ms.max(10));

    match args.command {
        Command::Tree => {
            print_tree(albums.tree());
            Ok(())
        }
        Command::Watch => {
            let Some(rx) = dirty_paths else {
                bail!("Directory watching is disabled in the config");
            };
            run_watch(&mut albums, &rx, &notifications, interval).await
        }
        command => {
            let store = albums.has_database().then(|| store.clone());
            let catalog = store
                .as_deref()
                .ok_or_else(|| anyhow!("No catalog database is available"))?;

            let (facility, job_events) =
                ThreadJobFacility::new(TrashManager::new(config.trash.clone()));
            let mut ops = FileOperations::new(
                store.clone(),
                resolver.clone(),
                Box::new(facility),
                job_events,
                config.sidecar.clone(),
                events.clone(),
            );
            ops.add_cache(Box::new(ThumbnailCache::new(&config.thumbnails)));

            match command {
                Command::Move { items, album } => {
                    let items = load_items(catalog, &items)?;
                    ops.move_items(&items, &load_album(catalog, album)?)?;
                }
                Command::Copy { items, album } => {
                    let items = load_items(catalog, &items)?;
                    ops.copy_items(&items, &load_album(catalog, album)?)?;
                }
                Command::Rename { item, name } => {
                    let items = load_items(catalog, &[item])?;
                    ops.rename(&items, &name)?;
                }
                Command::Remove { items, trash } => {
                    let items = load_items(catalog, &items)?;
                    let mode = if trash {
                        DeleteMode::Trash
                    } else {
                        DeleteMode::Permanent
                    };
                    ops.delete_items(&items, mode)?;
                }
                Command::Tree | Command::Watch => {}
            }

            run_jobs(&mut ops, &notifications, interval).await
        }
    }
}

fn load_items(store: &dyn CatalogStore, ids: &[i64]) -> Result<Vec<ItemInfo>> {
    ids.iter()
        .map(|&id| {
            store
                .item(id)?
                .ok_or_else(|| anyhow!("No item with id {}", id))
        })
        .collect()
}

fn load_album(store: &dyn CatalogStore, id: i64) -> Result<PhysicalLocation> {
    store
        .scan_albums()?
        .iter()
        .find(|album| album.id == id)
        .map(PhysicalLocation::from)
        .ok_or_else(|| anyhow!("No album with id {}", id))
}

fn print_tree(tree: &AlbumTree) {
    for kind in AlbumKind::ALL {
        let root = tree.root(kind);
        println!("{}", kind.root_title());
        for handle in tree.iter(root) {
            let Some(album) = tree.get(handle) else {
                continue;
            };
            let mut depth = 0;
            let mut parent = album.parent();
            while let Some(p) = parent.filter(|&p| p != root) {
                depth += 1;
                parent = tree.get(p).and_then(|a| a.parent());
            }
            println!("{}{} [{}]", "  ".repeat(depth + 1), album.title(), album.id());
        }
    }
}

fn print_notifications(notifications: &mpsc::Receiver<CatalogEvent>) {
    while let Ok(event) = notifications.try_recv() {
        match event {
            CatalogEvent::AlbumAdded(gid) => println!("+ {}", gid),
            CatalogEvent::AlbumDeleted(gid) => println!("- {}", gid),
            CatalogEvent::AlbumRenamed(gid) => println!("~ {}", gid),
            CatalogEvent::RenameSucceeded(url) => println!("Renamed {}", url),
            CatalogEvent::RenameFailed(url) => eprintln!("Rename failed for {}", url),
            CatalogEvent::OperationFailed { kind, message } => {
                eprintln!("{} failed:\n{}", kind.display_name(), message)
            }
            _ => {}
        }
    }
}

async fn run_watch(
    albums: &mut AlbumManager,
    dirty_paths: &mpsc::Receiver<PathBuf>,
    notifications: &mpsc::Receiver<CatalogEvent>,
    interval: Duration,
) -> Result<()> {
    // Startup noise.
    while notifications.try_recv().is_ok() {}
    println!("Watching album roots, press Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        let paths: BTreeSet<PathBuf> = dirty_paths.try_iter().collect();
        for path in &paths {
            if albums.handle_dirty(path)?.is_some() {
                break;
            }
        }
        print_notifications(notifications);
    }

    albums.close();
    Ok(())
}

async fn run_jobs(
    ops: &mut FileOperations,
    notifications: &mpsc::Receiver<CatalogEvent>,
    interval: Duration,
) -> Result<()> {
    let mut shown: HashMap<OperationKind, (usize, usize)> = HashMap::new();

    while ops.has_pending_jobs() {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                for kind in OperationKind::ALL {
                    ops.cancel(kind);
                }
                eprintln!("Cancelling...");
            }
            _ = tokio::time::sleep(interval) => {}
        }

        ops.poll();
        for item in ops.progress().running_items() {
            let now = (item.progress.current, item.progress.total);
            if shown.insert(item.kind, now) != Some(now) {
                println!(
                    "{} {}/{} ({}%)",
                    item.kind.display_name(),
                    now.0,
                    now.1,
                    item.progress.percent()
                );
            }
        }
        print_notifications(notifications);
    }

    for kind in OperationKind::ALL {
        if let Some(item) = ops.progress().get(kind) {
            println!(
                "{}: {:?}, {}/{} in {:.1}s",
                kind.display_name(),
                item.state,
                item.progress.current,
                item.progress.total,
                item.elapsed().as_secs_f32()
            );
        }
    }
    Ok(())
}
