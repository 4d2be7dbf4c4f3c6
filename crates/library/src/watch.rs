use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

use crate::Library;

const MAX_SETTLE_ROUNDS: u32 = 30;

/// What an incoming filesystem event means for the catalog.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum WatchAction {
    /// New or rewritten file; tag it once its size stops changing.
    Settle(PathBuf),
    /// Complete file (e.g. moved into the library); tag immediately.
    Add(PathBuf),
    Remove(PathBuf),
}

pub fn configure_watcher(library: &Library) {
    let config = library.config();
    if !config.watch_files {
        info!("Watcher disabled (watch_files=false)");
        library.set_watcher(None);
        return;
    }

    let roots = config.resolved_root_dirs();
    if roots.is_empty() {
        warn!("No root directories configured; watcher not started");
        library.set_watcher(None);
        return;
    }

    let debounce = Duration::from_secs(config.watch_debounce_secs.max(1));
    match setup_watcher(library.clone(), roots, debounce) {
        Ok(watcher) => {
            info!("Watching library for changes (debounce {}s)", debounce.as_secs());
            library.set_watcher(Some(watcher));
        }
        Err(err) => {
            warn!("Failed to start watcher: {}", err);
            library.set_watcher(None);
        }
    }
}

fn setup_watcher(
    library: Library,
    roots: Vec<PathBuf>,
    debounce: Duration,
) -> Result<RecommendedWatcher, notify::Error> {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<Event>();
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            if let Ok(event) = res {
                let _ = tx.send(event);
            }
        },
        NotifyConfig::default(),
    )?;

    for root in &roots {
        if let Err(err) = watcher.watch(root, RecursiveMode::Recursive) {
            warn!("Cannot watch {}: {}", root.display(), err);
        }
    }

    tokio::spawn(async move {
        watch_loop(library, rx, debounce).await;
    });

    Ok(watcher)
}

async fn watch_loop(library: Library, mut rx: UnboundedReceiver<Event>, debounce: Duration) {
    let extensions = library.config().supported_extensions;

    loop {
        let event = match rx.recv().await {
            Some(event) => event,
            None => break,
        };

        for action in actions_for_event(&event) {
            match action {
                WatchAction::Remove(path) => {
                    if !is_supported(&path, &extensions) {
                        continue;
                    }
                    let library = library.clone();
                    tokio::task::spawn_blocking(move || {
                        if let Err(err) = library.remove_file(&path) {
                            warn!("Failed to remove {}: {}", path.display(), err);
                        }
                    });
                }
                WatchAction::Add(path) => {
                    if !is_supported(&path, &extensions) {
                        continue;
                    }
                    let library = library.clone();
                    tokio::task::spawn_blocking(move || {
                        if let Err(err) = library.add_file(&path) {
                            warn!("Failed to index {}: {}", path.display(), err);
                        }
                    });
                }
                WatchAction::Settle(path) => {
                    if !is_supported(&path, &extensions) {
                        continue;
                    }
                    tokio::spawn(settle_and_add(library.clone(), path, debounce));
                }
            }
        }
    }
}

/// Waits until two size samples taken a debounce interval apart agree,
/// then tags the file. Copies and downloads fire create events long
/// before the file is fully written.
async fn settle_and_add(library: Library, path: PathBuf, debounce: Duration) {
    let mut last = file_size(&path);

    for _ in 0..MAX_SETTLE_ROUNDS {
        tokio::time::sleep(debounce).await;
        let size = file_size(&path);
        match (last, size) {
            // deleted while settling
            (_, None) => return,
            (Some(a), Some(b)) if a == b && b > 0 => {
                let result = tokio::task::spawn_blocking(move || library.add_file(&path)).await;
                match result {
                    Ok(Ok(_)) => {}
                    Ok(Err(err)) => warn!("Failed to index created file: {}", err),
                    Err(err) => warn!("Settle task join error: {}", err),
                }
                return;
            }
            _ => last = size,
        }
    }
    warn!("File kept changing, giving up: {}", path.display());
}

pub(crate) fn actions_for_event(event: &Event) -> Vec<WatchAction> {
    match &event.kind {
        EventKind::Create(_) => event
            .paths
            .iter()
            .filter(|p| !is_trash_path(p))
            .map(|p| WatchAction::Settle(p.clone()))
            .collect(),

        EventKind::Remove(_) => event
            .paths
            .iter()
            .map(|p| WatchAction::Remove(p.clone()))
            .collect(),

        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let (src, dest) = match (event.paths.first(), event.paths.get(1)) {
                (Some(src), Some(dest)) => (src, dest),
                _ => return Vec::new(),
            };
            // a move to the trash is a delete, a move out of it a create
            if is_trash_path(dest) {
                vec![WatchAction::Remove(src.clone())]
            } else if is_trash_path(src) {
                vec![WatchAction::Add(dest.clone())]
            } else {
                vec![
                    WatchAction::Remove(src.clone()),
                    WatchAction::Add(dest.clone()),
                ]
            }
        }

        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => event
            .paths
            .first()
            .map(|p| vec![WatchAction::Remove(p.clone())])
            .unwrap_or_default(),

        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event
            .paths
            .first()
            .filter(|p| !is_trash_path(p))
            .map(|p| vec![WatchAction::Add(p.clone())])
            .unwrap_or_default(),

        EventKind::Modify(ModifyKind::Data(_)) => event
            .paths
            .iter()
            .filter(|p| !is_trash_path(p))
            .map(|p| WatchAction::Settle(p.clone()))
            .collect(),

        _ => Vec::new(),
    }
}

fn is_trash_path(path: &Path) -> bool {
    path.components().any(|c| {
        let name = c.as_os_str().to_string_lossy();
        name == "Trash" || name == "$RECYCLE.BIN" || name.starts_with(".Trash")
    })
}

fn is_supported(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            let ext = ext.to_lowercase();
            extensions.iter().any(|e| *e == ext)
        })
        .unwrap_or(false)
}

fn file_size(path: &Path) -> Option<u64> {
    std::fs::metadata(path).ok().map(|m| m.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, RemoveKind};

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        let mut event = Event::new(kind);
        for path in paths {
            event = event.add_path(PathBuf::from(path));
        }
        event
    }

    #[test]
    fn created_files_settle_before_tagging() {
        let actions = actions_for_event(&event(
            EventKind::Create(CreateKind::File),
            &["/music/new.mp3"],
        ));
        assert_eq!(actions, vec![WatchAction::Settle(PathBuf::from("/music/new.mp3"))]);
    }

    #[test]
    fn deletes_remove_immediately() {
        let actions = actions_for_event(&event(
            EventKind::Remove(RemoveKind::File),
            &["/music/gone.mp3"],
        ));
        assert_eq!(actions, vec![WatchAction::Remove(PathBuf::from("/music/gone.mp3"))]);
    }

    #[test]
    fn move_to_trash_is_a_delete() {
        let actions = actions_for_event(&event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/music/song.mp3", "/home/u/.local/share/Trash/files/song.mp3"],
        ));
        assert_eq!(actions, vec![WatchAction::Remove(PathBuf::from("/music/song.mp3"))]);
    }

    #[test]
    fn move_from_trash_is_a_create() {
        let actions = actions_for_event(&event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/home/u/.local/share/Trash/files/song.mp3", "/music/song.mp3"],
        ));
        assert_eq!(actions, vec![WatchAction::Add(PathBuf::from("/music/song.mp3"))]);
    }

    #[test]
    fn in_library_move_removes_then_adds() {
        let actions = actions_for_event(&event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/music/a/song.mp3", "/music/b/song.mp3"],
        ));
        assert_eq!(
            actions,
            vec![
                WatchAction::Remove(PathBuf::from("/music/a/song.mp3")),
                WatchAction::Add(PathBuf::from("/music/b/song.mp3")),
            ]
        );
    }

    #[test]
    fn trash_paths_are_recognized() {
        assert!(is_trash_path(Path::new("/home/u/.local/share/Trash/files/a.mp3")));
        assert!(is_trash_path(Path::new("/home/u/.Trash-1000/a.mp3")));
        assert!(is_trash_path(Path::new("C:/$RECYCLE.BIN/a.mp3")));
        assert!(!is_trash_path(Path::new("/music/trashy-song.mp3")));
    }

    #[test]
    fn unsupported_extensions_are_ignored() {
        let extensions = vec!["mp3".to_string()];
        assert!(is_supported(Path::new("/m/a.MP3"), &extensions));
        assert!(!is_supported(Path::new("/m/cover.jpg"), &extensions));
        assert!(!is_supported(Path::new("/m/noext"), &extensions));
    }
}
