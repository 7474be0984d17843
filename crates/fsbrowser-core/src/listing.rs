//! Incrementally loaded, navigable view of one remote directory.
//!
//! The view never pulls more than one page from its cursor unless asked.
//! Changes are published as [`ListingEvent`]s to every subscribed channel so
//! any front end, graphical or not, can follow along.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Local};
use tracing::debug;

use fsbrowser_platform::path;
use fsbrowser_platform::{EntryKind, RemoteEntry};

use crate::cursor::DirectoryCursor;
use crate::error::{Error, Result};
use crate::session::Session;

/// Rows pulled from the cursor by a navigation or a single `load_more`.
pub const PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Row {
    /// Synthetic entry leading to the anchor's parent
    Parent,
    Entry(RemoteEntry),
}

impl Row {
    pub fn entry(&self) -> Option<&RemoteEntry> {
        match self {
            Row::Parent => None,
            Row::Entry(entry) => Some(entry),
        }
    }

    pub fn is_parent(&self) -> bool {
        matches!(self, Row::Parent)
    }

    pub fn name(&self) -> &str {
        match self {
            Row::Parent => "..",
            Row::Entry(entry) => entry.name(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Icon,
    Name,
    Group,
    Owner,
    Permissions,
    Modified,
    Size,
}

impl Column {
    pub const ALL: [Column; 7] = [
        Column::Icon,
        Column::Name,
        Column::Group,
        Column::Owner,
        Column::Permissions,
        Column::Modified,
        Column::Size,
    ];

    /// Header text. The icon column has none.
    pub fn name(&self) -> &'static str {
        match self {
            Column::Icon => "",
            Column::Name => "Name",
            Column::Group => "Group",
            Column::Owner => "Owner",
            Column::Permissions => "Permissions",
            Column::Modified => "Modified",
            Column::Size => "Size",
        }
    }

    pub fn from_index(index: usize) -> Option<Column> {
        Self::ALL.get(index).copied()
    }

    fn value(&self, row: &Row) -> CellValue {
        let entry = match row {
            Row::Parent => {
                return match self {
                    Column::Icon => CellValue::Icon(Icon::Parent),
                    Column::Name => CellValue::Text("..".to_string()),
                    _ => CellValue::Empty,
                }
            }
            Row::Entry(entry) => entry,
        };

        match self {
            Column::Icon => CellValue::Icon(Icon::for_kind(entry.kind)),
            Column::Name => CellValue::Text(entry.name().to_string()),
            Column::Group => CellValue::Text(entry.group.clone()),
            Column::Owner => CellValue::Text(entry.owner.clone()),
            Column::Permissions => CellValue::Text(entry.permission_string()),
            Column::Modified => CellValue::Timestamp(FileTimestamp(entry.modified)),
            Column::Size if entry.is_dir() => CellValue::Empty,
            Column::Size => CellValue::Size(FileSize(entry.size)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Icon {
    Parent,
    Directory,
    File,
    Symlink,
    Other,
}

impl Icon {
    fn for_kind(kind: EntryKind) -> Self {
        match kind {
            EntryKind::Directory => Icon::Directory,
            EntryKind::File => Icon::File,
            EntryKind::Symlink => Icon::Symlink,
            EntryKind::Other => Icon::Other,
        }
    }
}

/// Modification time in milliseconds since the epoch, shown in local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FileTimestamp(pub i64);

impl FileTimestamp {
    pub fn to_local(&self) -> Option<DateTime<Local>> {
        DateTime::from_timestamp_millis(self.0).map(|utc| utc.with_timezone(&Local))
    }
}

impl fmt::Display for FileTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_local() {
            Some(time) => write!(f, "{}", time.format("%Y-%m-%d %H:%M:%S")),
            None => Ok(()),
        }
    }
}

/// Byte count rendered with binary units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FileSize(pub u64);

impl fmt::Display for FileSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];
        if self.0 < 1024 {
            return write!(f, "{} B", self.0);
        }
        let mut value = self.0 as f64;
        let mut unit = 0;
        while value >= 1024.0 && unit < UNITS.len() - 1 {
            value /= 1024.0;
            unit += 1;
        }
        write!(f, "{:.1} {}", value, UNITS[unit])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Icon(Icon),
    Text(String),
    Timestamp(FileTimestamp),
    Size(FileSize),
    Empty,
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Icon(Icon::Parent) => f.write_str("^"),
            CellValue::Icon(Icon::Directory) => f.write_str("d"),
            CellValue::Icon(Icon::File) => f.write_str("-"),
            CellValue::Icon(Icon::Symlink) => f.write_str("l"),
            CellValue::Icon(Icon::Other) => f.write_str("?"),
            CellValue::Text(text) => f.write_str(text),
            CellValue::Timestamp(time) => write!(f, "{}", time),
            CellValue::Size(size) => write!(f, "{}", size),
            CellValue::Empty => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingEvent {
    /// Every row was replaced
    Reset,
    /// Rows `start..=end` were appended
    RowsInserted { start: usize, end: usize },
    /// The view now shows this directory
    PathChanged(String),
}

struct ViewState {
    anchor: RemoteEntry,
    rows: Vec<Row>,
    cursor: Option<DirectoryCursor>,
    has_more: bool,
    /// Bumped on every navigation; a fetch that started under an older value
    /// is discarded.
    generation: u64,
}

/// Clears the loading flag on every exit path.
struct LoadingGuard<'a>(&'a AtomicBool);

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A fetch taken out of the view while it runs unlocked.
struct PendingFetch {
    generation: u64,
    cursor: DirectoryCursor,
}

pub struct ListingView {
    session: Arc<Session>,
    state: Mutex<ViewState>,
    loading: AtomicBool,
    subscribers: Mutex<Vec<Sender<ListingEvent>>>,
}

/// Rows pulled from a cursor, and the failure that cut the pull short.
struct Batch {
    rows: Vec<Row>,
    error: Option<Error>,
}

fn fetch(cursor: &mut DirectoryCursor, limit: usize) -> Batch {
    let mut rows = Vec::new();
    while rows.len() < limit && cursor.has_next() {
        match cursor.next_entry() {
            Ok(entry) => rows.push(Row::Entry(entry)),
            Err(err) => {
                return Batch {
                    rows,
                    error: Some(err),
                }
            }
        }
    }
    Batch { rows, error: None }
}

/// List `anchor` and pull its first page.
fn first_page(session: &Session, anchor: &RemoteEntry) -> Result<(Vec<Row>, DirectoryCursor, bool)> {
    let mut cursor = session.list(&anchor.path)?;
    let mut rows = Vec::new();
    if path::parent(&anchor.path).is_some() {
        rows.push(Row::Parent);
    }
    let batch = fetch(&mut cursor, PAGE_SIZE);
    if let Some(err) = batch.error {
        return Err(err);
    }
    rows.extend(batch.rows);
    let has_more = cursor.has_next();
    Ok((rows, cursor, has_more))
}

/// The directory a view starting at `path` shows: `path` itself, or its
/// parent when `path` is a file.
fn starting_anchor(session: &Session, path: &str) -> Result<RemoteEntry> {
    let entry = session.status(path)?;
    if entry.is_dir() {
        return Ok(entry);
    }
    let parent = path::parent(&entry.path).unwrap_or("/");
    session.status(parent)
}

impl ListingView {
    /// Open a view on `path` and load its first page.
    pub fn new(session: Arc<Session>, path: &str) -> Result<Self> {
        let anchor = starting_anchor(&session, path)?;
        let (rows, cursor, has_more) = first_page(&session, &anchor)?;
        debug!("listing view opened at {} ({} rows)", anchor.path, rows.len());

        Ok(Self {
            session,
            state: Mutex::new(ViewState {
                anchor,
                rows,
                cursor: Some(cursor),
                has_more,
                generation: 0,
            }),
            loading: AtomicBool::new(false),
            subscribers: Mutex::new(Vec::new()),
        })
    }

    fn state(&self) -> MutexGuard<'_, ViewState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> Receiver<ListingEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);
        rx
    }

    fn emit(&self, event: ListingEvent) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn current_path(&self) -> String {
        self.state().anchor.path.clone()
    }

    pub fn anchor(&self) -> RemoteEntry {
        self.state().anchor.clone()
    }

    pub fn row_count(&self) -> usize {
        self.state().rows.len()
    }

    pub fn column_count(&self) -> usize {
        Column::ALL.len()
    }

    pub fn column_name(&self, column: usize) -> Option<&'static str> {
        Column::from_index(column).map(|c| c.name())
    }

    /// Index of the column whose header matches `name`, ignoring case.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        Column::ALL
            .iter()
            .position(|c| c.name().eq_ignore_ascii_case(name))
    }

    pub fn row(&self, index: usize) -> Option<Row> {
        self.state().rows.get(index).cloned()
    }

    pub fn rows(&self) -> Vec<Row> {
        self.state().rows.clone()
    }

    pub fn value_at(&self, row: usize, column: usize) -> Option<CellValue> {
        let column = Column::from_index(column)?;
        self.state().rows.get(row).map(|r| column.value(r))
    }

    pub fn has_more_rows(&self) -> bool {
        self.state().has_more
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    /// Show the directory at `path`. Returns `false`, changing nothing, when
    /// `path` is not a directory.
    pub fn navigate(&self, path: &str) -> Result<bool> {
        let entry = self.session.status(path)?;
        if !entry.is_dir() {
            debug!("not navigating into {}: not a directory", entry.path);
            return Ok(false);
        }
        self.open_dir(entry)?;
        Ok(true)
    }

    /// Activate a row: the parent row goes up one level, a directory row
    /// goes into that directory, anything else is ignored.
    pub fn navigate_to_row(&self, index: usize) -> Result<bool> {
        let target = {
            let state = self.state();
            match state.rows.get(index) {
                None => return Ok(false),
                Some(Row::Parent) => match path::parent(&state.anchor.path) {
                    Some(parent) => parent.to_string(),
                    None => return Ok(false),
                },
                Some(Row::Entry(entry)) if entry.is_file() => return Ok(false),
                Some(Row::Entry(entry)) => entry.path.clone(),
            }
        };
        self.navigate(&target)
    }

    /// Re-read the current directory from scratch.
    pub fn reload(&self) -> Result<()> {
        let path = self.current_path();
        self.navigate(&path).map(|_| ())
    }

    fn open_dir(&self, anchor: RemoteEntry) -> Result<()> {
        self.loading.store(true, Ordering::Release);
        let _guard = LoadingGuard(&self.loading);

        let (rows, cursor, has_more) = first_page(&self.session, &anchor)?;
        let path = anchor.path.clone();
        {
            let mut state = self.state();
            state.generation += 1;
            state.anchor = anchor;
            state.rows = rows;
            state.cursor = Some(cursor);
            state.has_more = has_more;
            debug!(
                "navigated to {} ({} rows, more: {})",
                path,
                state.rows.len(),
                has_more
            );
        }

        self.emit(ListingEvent::Reset);
        self.emit(ListingEvent::PathChanged(path));
        Ok(())
    }

    /// Append up to [`PAGE_SIZE`] more rows. Does nothing when the listing
    /// is exhausted or another fetch is running.
    pub fn load_more(&self) -> Result<()> {
        self.load(PAGE_SIZE)
    }

    /// Append every remaining row.
    pub fn load_all(&self) -> Result<()> {
        self.load(usize::MAX)
    }

    fn load(&self, limit: usize) -> Result<()> {
        if !self.has_more_rows() {
            return Ok(());
        }
        if self
            .loading
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("fetch already in progress, ignoring request");
            return Ok(());
        }
        let _guard = LoadingGuard(&self.loading);

        let Some(mut pending) = self.begin_fetch() else {
            return Ok(());
        };
        let fetched = fetch(&mut pending.cursor, limit);
        self.finish_fetch(pending, fetched)
    }

    fn begin_fetch(&self) -> Option<PendingFetch> {
        let mut state = self.state();
        if !state.has_more {
            return None;
        }
        let generation = state.generation;
        state
            .cursor
            .take()
            .map(|cursor| PendingFetch { generation, cursor })
    }

    /// Commit a batch unless the view moved on while it was fetched. Rows
    /// pulled before a failure are committed before the failure is returned,
    /// and the cursor is kept so the next attempt resumes after them.
    fn finish_fetch(&self, pending: PendingFetch, batch: Batch) -> Result<()> {
        let PendingFetch {
            generation,
            mut cursor,
        } = pending;
        let has_next = cursor.has_next();

        let mut state = self.state();
        if state.generation != generation {
            debug!("discarding rows fetched from {}: view has moved on", cursor.path());
            return Ok(());
        }
        state.cursor = Some(cursor);

        let start = state.rows.len();
        state.rows.extend(batch.rows);
        let end = state.rows.len();
        state.has_more = has_next;
        drop(state);

        if end > start {
            self.emit(ListingEvent::RowsInserted {
                start,
                end: end - 1,
            });
        }
        match batch.error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for ListingView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("ListingView")
            .field("path", &state.anchor.path)
            .field("rows", &state.rows.len())
            .field("has_more", &state.has_more)
            .field("loading", &self.is_loading())
            .finish()
    }
}
