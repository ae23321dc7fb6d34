//! Interactive catalog picker.
//!
//! This is intentionally kept separate from clap parsing:
//! - clap handles structured flags/subcommands
//! - the picker provides the "run `alps fit` and choose a dataset" UX
//!
//! Entries come from the data source selector's current catalog, so the
//! picker only ever offers files the resolver can load.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use crate::domain::CatalogKind;
use crate::error::AppError;

/// Prompt the user to pick one catalog entry; returns its index.
///
/// Behavior:
/// - list the entries, numbered from 1
/// - accept either a number or a file name from the list
/// - `q` cancels
pub fn prompt_for_entry(kind: CatalogKind, entries: &[PathBuf]) -> Result<usize, AppError> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    prompt_with(kind, entries, &mut stdin.lock(), &mut stdout.lock())
}

fn prompt_with(
    kind: CatalogKind,
    entries: &[PathBuf],
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> Result<usize, AppError> {
    let write_err = |e: io::Error| AppError::new(2, format!("Failed to write prompt: {e}"));

    if entries.is_empty() {
        return Err(AppError::new(
            2,
            format!(
                "The {} catalog is empty. Add data with `alps sample` or `--upload <file>`.",
                kind.display_name().to_lowercase()
            ),
        ));
    }

    writeln!(output, "{} catalog ({} file(s)):", kind.display_name(), entries.len()).map_err(write_err)?;
    for (idx, path) in entries.iter().enumerate() {
        writeln!(output, "{:>3}) {}", idx + 1, entry_name(path)).map_err(write_err)?;
    }

    loop {
        write!(output, "Select a dataset by number (1-{}) or name (q to quit): ", entries.len()).map_err(write_err)?;
        output.flush().map_err(write_err)?;

        let mut line = String::new();
        let bytes = input
            .read_line(&mut line)
            .map_err(|e| AppError::new(2, format!("Failed to read input: {e}")))?;
        if bytes == 0 {
            return Err(AppError::new(
                2,
                "No input received. Name the dataset with `alps fit -f <file>`.",
            ));
        }

        let line = line.trim();
        if line.eq_ignore_ascii_case("q") {
            return Err(AppError::new(2, "Canceled."));
        }

        if let Ok(choice) = line.parse::<usize>() {
            if (1..=entries.len()).contains(&choice) {
                return Ok(choice - 1);
            }
            writeln!(output, "Invalid choice: {choice}. Enter a number between 1 and {}.", entries.len())
                .map_err(write_err)?;
            continue;
        }

        match find_entry(entries, Path::new(line)) {
            Some(idx) => return Ok(idx),
            None => writeln!(output, "Not in the catalog: {line}").map_err(write_err)?,
        }
    }
}

/// Index of the entry matching `wanted` by full path or by file name.
pub fn find_entry(entries: &[PathBuf], wanted: &Path) -> Option<usize> {
    entries
        .iter()
        .position(|p| p == wanted)
        .or_else(|| entries.iter().position(|p| p.file_name() == wanted.file_name() && wanted.file_name().is_some()))
}

pub fn entry_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
