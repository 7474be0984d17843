use std::io::{self, BufRead, Write};
use std::sync::mpsc::Receiver;
use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use fsbrowser_core::{Column, ListingEvent, ListingView, Session};
use fsbrowser_platform::path;

const HELP: &str = "\
commands:
  <row>      open the directory in that row
  ..         go to the parent directory
  cd PATH    go to PATH
  more       load the next page
  all        load every remaining entry
  reload     re-read the current directory
  ls         show the rows again
  pwd        print the current directory
  quit       leave";

/// Print every row of `view`, optionally prefixed with its row number.
pub fn print_rows<W: Write>(out: &mut W, view: &ListingView, numbered: bool) -> io::Result<()> {
    for index in 0..view.row_count() {
        let cell = |column: Column| {
            view.value_at(index, column as usize)
                .map(|v| v.to_string())
                .unwrap_or_default()
        };
        if numbered {
            write!(out, "{:>5}  ", index)?;
        }
        writeln!(
            out,
            "{} {:<11} {:<10} {:<10} {:>10}  {:<19}  {}",
            cell(Column::Icon),
            cell(Column::Permissions),
            cell(Column::Owner),
            cell(Column::Group),
            cell(Column::Size),
            cell(Column::Modified),
            cell(Column::Name),
        )?;
    }
    Ok(())
}

pub fn run(session: Arc<Session>, start: &str) -> Result<()> {
    let view = ListingView::new(session, start)?;
    let stdin = io::stdin();
    let mut out = io::stdout().lock();
    repl(&view, stdin.lock(), &mut out)
}

fn report_events<W: Write>(out: &mut W, events: &Receiver<ListingEvent>) -> io::Result<()> {
    for event in events.try_iter() {
        match event {
            ListingEvent::RowsInserted { start, end } => {
                writeln!(out, "loaded rows {}-{}", start, end)?;
            }
            ListingEvent::PathChanged(path) => writeln!(out, "now in {}", path)?,
            ListingEvent::Reset => {}
        }
    }
    Ok(())
}

fn repl<R: BufRead, W: Write>(view: &ListingView, input: R, out: &mut W) -> Result<()> {
    let events = view.subscribe();
    writeln!(out, "{} (type 'help' for commands)", view.current_path())?;
    print_rows(out, view, true)?;

    for line in input.lines() {
        let line = line?;
        let command = line.trim();
        debug!("browse command: {:?}", command);

        let outcome = match command {
            "" => continue,
            "quit" | "exit" | "q" => break,
            "help" => {
                writeln!(out, "{}", HELP)?;
                continue;
            }
            "pwd" => {
                writeln!(out, "{}", view.current_path())?;
                continue;
            }
            "ls" => Ok(true),
            "more" => view.load_more().map(|_| false),
            "all" => view.load_all().map(|_| false),
            "reload" => view.reload().map(|_| true),
            ".." => match path::parent(&view.current_path()) {
                Some(parent) => view.navigate(parent),
                None => Ok(false),
            },
            other => {
                if let Some(target) = other.strip_prefix("cd ") {
                    view.navigate(target.trim())
                } else if let Ok(index) = other.parse::<usize>() {
                    view.navigate_to_row(index)
                } else {
                    writeln!(out, "unknown command: {}", other)?;
                    continue;
                }
            }
        };

        match outcome {
            Ok(show) => {
                report_events(out, &events)?;
                if show {
                    print_rows(out, view, true)?;
                }
                if !view.has_more_rows() && matches!(command, "more" | "all") {
                    writeln!(out, "all {} rows loaded", view.row_count())?;
                }
            }
            Err(e) => {
                writeln!(out, "error: {}", e)?;
                if e.is_access_denied() {
                    writeln!(out, "hint: retry with a different --user")?;
                }
            }
        }
    }
    Ok(())
}
