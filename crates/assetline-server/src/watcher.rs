//! File watching and per-category re-runs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use globset::GlobSet;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use assetline_pipeline::{Category, Task, TaskSet};
use assetline_steps::sources::{compile, glob_base, to_slash};

use crate::server::ServerError;
use crate::websocket::ReloadHub;

/// Events emitted by the file watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// File was created
    Created(PathBuf),

    /// File was deleted
    Deleted(PathBuf),

    /// File contents or metadata changed
    Modified(PathBuf),
}

impl WatchEvent {
    pub fn path(&self) -> &Path {
        match self {
            WatchEvent::Created(p) | WatchEvent::Deleted(p) | WatchEvent::Modified(p) => p,
        }
    }
}

/// File watcher for detecting changes.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
}

impl FileWatcher {
    /// Create a new file watcher for the given directories.
    ///
    /// Returns the watcher and a channel to receive events. The channel
    /// closes when the watcher is dropped.
    pub fn new(paths: &[PathBuf]) -> Result<(Self, mpsc::Receiver<WatchEvent>), std::io::Error> {
        let (tx, rx) = mpsc::channel(256);

        // The callback runs on notify's own thread, so blocking is fine.
        let mut watcher = notify::recommended_watcher(move |res: Result<notify::Event, _>| {
            match res {
                Ok(event) => {
                    for path in &event.paths {
                        if let Some(e) = classify_event(path, &event.kind) {
                            let _ = tx.blocking_send(e);
                        }
                    }
                }
                Err(e) => tracing::warn!("Watch error: {}", e),
            }
        })
        .map_err(std::io::Error::other)?;

        for path in paths {
            if path.exists() {
                watcher
                    .watch(path, RecursiveMode::Recursive)
                    .map_err(std::io::Error::other)?;
                tracing::debug!("Watching {}", path.display());
            } else {
                tracing::warn!("Not watching missing directory {}", path.display());
            }
        }

        Ok((Self { _watcher: watcher }, rx))
    }
}

/// Classify a notify event into a WatchEvent.
fn classify_event(path: &Path, kind: &notify::EventKind) -> Option<WatchEvent> {
    use notify::EventKind;

    match kind {
        EventKind::Create(_) => Some(WatchEvent::Created(path.to_path_buf())),
        EventKind::Remove(_) => Some(WatchEvent::Deleted(path.to_path_buf())),
        EventKind::Modify(_) => Some(WatchEvent::Modified(path.to_path_buf())),
        _ => None,
    }
}

/// What a binding does when one of its patterns matches.
#[derive(Debug, Clone)]
pub enum BindingAction {
    /// Re-run the task; the task itself notifies clients after writing
    Run(Arc<Task>),

    /// Only tell clients to reload
    Reload,
}

/// Association between source patterns and the action they trigger.
#[derive(Debug, Clone)]
pub struct WatchBinding {
    label: String,
    patterns: Vec<String>,
    matcher: GlobSet,
    action: BindingAction,
}

impl WatchBinding {
    /// Re-run `task` when any of its source patterns match.
    pub fn task(task: Arc<Task>) -> Result<Self, ServerError> {
        let patterns = task.mapping().patterns.clone();
        Self::new(task.name().to_string(), patterns, BindingAction::Run(task))
    }

    /// Broadcast a reload when any of `patterns` match.
    pub fn reload(label: impl Into<String>, patterns: Vec<String>) -> Result<Self, ServerError> {
        Self::new(label.into(), patterns, BindingAction::Reload)
    }

    fn new(label: String, patterns: Vec<String>, action: BindingAction) -> Result<Self, ServerError> {
        let matcher = compile(&patterns).map_err(|e| ServerError::WatchError(e.to_string()))?;
        Ok(Self {
            label,
            patterns,
            matcher,
            action,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether a project-relative path (with `/` separators) matches.
    pub fn matches(&self, rel_path: &str) -> bool {
        self.matcher.is_match(rel_path)
    }

    /// Directories to watch for this binding, relative to the project root.
    pub fn roots(&self) -> Vec<PathBuf> {
        self.patterns.iter().map(|p| glob_base(p)).collect()
    }
}

/// Watcher lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// No filesystem watches registered yet
    Idle,
    /// Waiting for changes
    Armed,
    /// Handling a change
    Triggered,
}

/// Maps filesystem changes to task re-runs and reload broadcasts.
pub struct ChangeWatcher {
    root: PathBuf,
    bindings: Vec<WatchBinding>,
    hub: ReloadHub,
    state: WatchState,
}

impl ChangeWatcher {
    /// Create a watcher with no bindings. `root` should be absolute.
    pub fn new(root: impl Into<PathBuf>, hub: ReloadHub) -> Self {
        Self {
            root: root.into(),
            bindings: Vec::new(),
            hub,
            state: WatchState::Idle,
        }
    }

    /// One binding per category task, plus a reload-only binding on the
    /// markup output.
    pub fn for_tasks(root: impl Into<PathBuf>, tasks: &TaskSet, hub: ReloadHub) -> Result<Self, ServerError> {
        let mut watcher = Self::new(root, hub);
        for task in tasks.iter() {
            watcher.bind(WatchBinding::task(Arc::clone(task))?);
        }

        let markup_dest = to_slash(&tasks.get(Category::Markup).mapping().dest);
        let pattern = if markup_dest.is_empty() {
            "**/*.html".to_string()
        } else {
            format!("{}/**/*.html", markup_dest)
        };
        watcher.bind(WatchBinding::reload("markup output", vec![pattern])?);

        Ok(watcher)
    }

    pub fn bind(&mut self, binding: WatchBinding) {
        self.bindings.push(binding);
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    pub fn bindings(&self) -> &[WatchBinding] {
        &self.bindings
    }

    /// Absolute directories that need filesystem watches.
    pub fn watch_roots(&self) -> Vec<PathBuf> {
        let mut roots: Vec<PathBuf> = Vec::new();
        for root in self.bindings.iter().flat_map(|b| b.roots()) {
            let abs = self.root.join(root);
            if !roots.contains(&abs) {
                roots.push(abs);
            }
        }
        roots
    }

    /// Mark the watcher ready to receive events.
    pub fn arm(&mut self) {
        self.state = WatchState::Armed;
    }

    fn relative(&self, path: &Path) -> String {
        to_slash(path.strip_prefix(&self.root).unwrap_or(path))
    }

    /// Handle one event, returning the labels of the bindings it triggered.
    pub async fn handle(&mut self, event: &WatchEvent) -> Vec<String> {
        let rel = self.relative(event.path());
        let matched: Vec<WatchBinding> = self
            .bindings
            .iter()
            .filter(|b| b.matches(&rel))
            .cloned()
            .collect();

        if matched.is_empty() {
            return Vec::new();
        }

        self.state = WatchState::Triggered;
        tracing::info!("Change detected: {}", rel);

        let mut triggered = Vec::with_capacity(matched.len());
        for binding in matched {
            match &binding.action {
                BindingAction::Run(task) => {
                    task.run(&self.hub).await;
                }
                BindingAction::Reload => {
                    self.hub.notify(&[event.path().to_path_buf()]);
                }
            }
            triggered.push(binding.label);
        }

        self.state = WatchState::Armed;
        triggered
    }

    /// Consume events until the channel closes.
    pub async fn run(mut self, mut events: mpsc::Receiver<WatchEvent>) {
        self.arm();
        tracing::info!("Watching for changes...");

        while let Some(event) = events.recv().await {
            self.handle(&event).await;
        }

        tracing::debug!("Watch channel closed");
        self.state = WatchState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assetline_pipeline::{Composition, NullSink, PathTable, Runner, StepSelection};
    use assetline_steps::{StepOptions, StepRegistry};
    use std::fs;
    use std::time::{Duration, SystemTime};
    use tempfile::tempdir;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn project(root: &Path) -> TaskSet {
        write(root, "src/index.html", "<body>home</body>");
        write(root, "src/styles/main.scss", ".a { margin: 3px; }\n");
        write(root, "src/scripts/app.js", "function app(){}");
        write(root, "src/images/dot.svg", r#"<svg><circle r="1"/></svg>"#);

        let registry = StepRegistry::with_defaults(&StepOptions::default()).unwrap();
        TaskSet::new(root, &PathTable::default(), &registry, &StepSelection::default()).unwrap()
    }

    fn mtime(path: &Path) -> SystemTime {
        fs::metadata(path).unwrap().modified().unwrap()
    }

    #[tokio::test]
    async fn watches_file_changes() {
        let temp = tempdir().unwrap();
        let test_file = temp.path().join("test.scss");

        let (watcher, mut rx) = FileWatcher::new(&[temp.path().to_path_buf()]).unwrap();

        // Give inotify time to set up
        tokio::time::sleep(Duration::from_millis(100)).await;

        fs::write(&test_file, ".a {}").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(3), rx.recv()).await;

        drop(watcher);

        assert!(event.is_ok(), "timeout waiting for file watch event");
        assert!(event.unwrap().is_some(), "channel should not be closed");
    }

    #[test]
    fn binds_every_category_and_markup_output() {
        let temp = tempdir().unwrap();
        let tasks = project(temp.path());

        let watcher = ChangeWatcher::for_tasks(temp.path(), &tasks, ReloadHub::new()).unwrap();

        let labels: Vec<&str> = watcher.bindings().iter().map(|b| b.label()).collect();
        assert_eq!(
            labels,
            vec!["markup", "styles", "scripts", "images", "markup output"]
        );
        assert_eq!(watcher.state(), WatchState::Idle);
        assert!(watcher.watch_roots().contains(&temp.path().join("src/styles")));
        assert!(watcher.watch_roots().contains(&temp.path().join("dist")));
    }

    #[tokio::test]
    async fn style_change_reruns_only_styles() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        let tasks = project(root);

        Runner::new(Arc::new(NullSink))
            .run(Composition::build(&tasks))
            .await
            .unwrap();
        let js_before = mtime(&root.join("dist/js/main.js"));
        let svg_before = mtime(&root.join("dist/images/dot.svg"));

        let hub = ReloadHub::new();
        let mut clients = hub.subscribe();
        let mut watcher = ChangeWatcher::for_tasks(root, &tasks, hub).unwrap();
        watcher.arm();

        write(root, "src/styles/main.scss", ".a { margin: 7px; }\n");
        let triggered = watcher
            .handle(&WatchEvent::Modified(root.join("src/styles/main.scss")))
            .await;

        assert_eq!(triggered, vec!["styles"]);
        assert_eq!(watcher.state(), WatchState::Armed);
        let css = fs::read_to_string(root.join("dist/css/main.css")).unwrap();
        assert!(css.contains("margin: 7px"));
        assert_eq!(mtime(&root.join("dist/js/main.js")), js_before);
        assert_eq!(mtime(&root.join("dist/images/dot.svg")), svg_before);
        assert!(clients.try_recv().is_ok(), "expected a reload notification");
    }

    #[tokio::test]
    async fn markup_output_change_only_reloads() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        let tasks = project(root);

        let hub = ReloadHub::new();
        let mut clients = hub.subscribe();
        let mut watcher = ChangeWatcher::for_tasks(root, &tasks, hub).unwrap();

        let triggered = watcher
            .handle(&WatchEvent::Modified(root.join("dist/index.html")))
            .await;

        assert_eq!(triggered, vec!["markup output"]);
        assert_eq!(
            clients.try_recv().unwrap(),
            crate::websocket::ReloadMessage::Reload
        );
        assert!(!root.join("dist/css").exists());
    }

    #[tokio::test]
    async fn unrelated_changes_are_ignored() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        let tasks = project(root);

        let mut watcher = ChangeWatcher::for_tasks(root, &tasks, ReloadHub::new()).unwrap();
        let triggered = watcher
            .handle(&WatchEvent::Modified(root.join("README.md")))
            .await;

        assert!(triggered.is_empty());
    }

    #[tokio::test]
    async fn survives_bursts_and_failures() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        let tasks = project(root);
        let watcher = ChangeWatcher::for_tasks(root, &tasks, ReloadHub::new()).unwrap();

        write(root, "src/styles/main.scss", ".a { color: red;\n");
        fs::remove_file(root.join("src/scripts/app.js")).unwrap();
        let (tx, rx) = mpsc::channel(64);
        for _ in 0..10 {
            tx.send(WatchEvent::Modified(root.join("src/styles/main.scss")))
                .await
                .unwrap();
        }
        tx.send(WatchEvent::Deleted(root.join("src/scripts/app.js")))
            .await
            .unwrap();
        drop(tx);

        tokio::time::timeout(Duration::from_secs(30), watcher.run(rx))
            .await
            .unwrap();

        assert!(!root.join("dist/css/main.css").exists());
        assert!(!root.join("dist/js/main.js").exists());
    }
}
