//! Live, overwritable progress block on stderr.

use console::{style, Term};
use indicatif::HumanDuration;

use hashlink_store::{format_bytes, ProgressSink, ProgressSnapshot};

pub struct ConsoleProgress {
    term: Term,
    drawn: usize,
}

impl ConsoleProgress {
    pub fn new(term: Term) -> Self {
        Self { term, drawn: 0 }
    }
}

impl ProgressSink for ConsoleProgress {
    fn render(&mut self, snapshot: &ProgressSnapshot<'_>) {
        let lines = block_lines(snapshot);
        // Best effort: terminal write errors are ignored.
        if self.drawn > 0 {
            let _ = self.term.clear_last_lines(self.drawn);
        }
        for line in &lines {
            let _ = self.term.write_line(line);
        }
        self.drawn = lines.len();
    }
}

/// Text of the progress block, one entry per line
pub fn block_lines(snapshot: &ProgressSnapshot<'_>) -> Vec<String> {
    let s = snapshot.stats;
    let last = snapshot.last;
    let mode = if snapshot.dry_run { " (dry run)" } else { "" };

    let mut lines = vec![
        format!(
            "{}{}",
            style(format!("Elapsed {}", HumanDuration(snapshot.elapsed))).bold(),
            mode
        ),
        format!(
            "Processed {} files in {} folders, skipped {}",
            s.processed_files, s.processed_directories, s.skipped_files
        ),
        format!("Hashed    {} files ({})", s.hashed_files, format_bytes(s.hashed_bytes)),
        format!("Linked    {} files ({})", s.linked_files, format_bytes(s.linked_bytes)),
        format!("Moved     {} files ({})", s.moved_files, format_bytes(s.moved_bytes)),
        format!("Copied    {} files ({})", s.copied_files, format_bytes(s.copied_bytes)),
    ];

    let path_line = |label: &str, path: &Option<std::path::PathBuf>| {
        format!(
            "{label} {}",
            path.as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "-".to_string())
        )
    };
    lines.push(path_line("Folder:", &last.directory));
    lines.push(path_line("File:  ", &last.file));
    lines.push(path_line("Link:  ", &last.link));
    lines.push(path_line("Copy:  ", &last.copy));

    if s.collisions > 0 || s.errors > 0 {
        lines.push(
            style(format!("Collisions {}, errors {}", s.collisions, s.errors))
                .red()
                .to_string(),
        );
    }
    if let Some(err) = &last.error {
        lines.push(format!("Last error: {}", style(err).red()));
    }
    lines
}
