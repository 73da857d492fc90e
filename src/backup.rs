#![forbid(unsafe_code)]

//! The backup traversal itself: pages of playlists, and per playlist pages
//! of its videos, delivered in server order to a sink. Sinks decide whether
//! a playlist becomes a console section or a file inside a timestamped
//! backup directory.

use anyhow::{Context, Result, bail};
use chrono::Local;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::api::{PlaylistEntry, PlaylistListRequest, PlaylistSource, pages};

/// Counts of what a traversal delivered.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BackupSummary {
    pub playlists: usize,
    pub videos: usize,
}

/// Receives traversal output. `begin_run` fires once per traversal with the
/// server's total playlist count when the first page carried one; `video`
/// ordinals are global within the enclosing playlist.
pub trait BackupSink {
    fn begin_run(&mut self, total_playlists: Option<u64>) -> Result<()>;
    fn begin_playlist(&mut self, playlist: &PlaylistEntry) -> Result<()>;
    fn video(&mut self, ordinal: usize, title: &str) -> Result<()>;
    fn end_playlist(&mut self) -> Result<()>;
    fn end_run(&mut self) -> Result<()>;
}

/// Walks every playlist the request matches and every video inside each.
/// Both levels stop when a page arrives without a continuation token; an
/// empty page that still carries a token keeps its level going.
pub fn backup_playlists<S, K>(
    source: &S,
    request: &PlaylistListRequest,
    sink: &mut K,
) -> Result<BackupSummary>
where
    S: PlaylistSource,
    K: BackupSink,
{
    let mut summary = BackupSummary::default();
    let mut started = false;
    for page in pages(|token| source.playlists_page(request, token)) {
        let page = page?;
        if !started {
            sink.begin_run(page.total_results)?;
            started = true;
        }
        for playlist in page.items {
            sink.begin_playlist(&playlist)?;
            let mut ordinal = 0usize;
            for video_page in pages(|token| source.videos_page(&playlist.id, token)) {
                for video in video_page?.items {
                    ordinal += 1;
                    sink.video(ordinal, &video.title)?;
                }
            }
            sink.end_playlist()?;
            summary.playlists += 1;
            summary.videos += ordinal;
        }
    }
    sink.end_run()?;
    Ok(summary)
}

/// Name for a backup directory, local time, e.g. `20260821-143059`.
pub fn timestamp_dir_name() -> String {
    Local::now().format("%Y%m%d-%H%M%S").to_string()
}

/// Writes each playlist as a titled console section: header line, numbered
/// videos, a blank line.
pub struct ConsoleSink<W: Write> {
    out: W,
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write> BackupSink for ConsoleSink<W> {
    fn begin_run(&mut self, _total_playlists: Option<u64>) -> Result<()> {
        Ok(())
    }

    fn begin_playlist(&mut self, playlist: &PlaylistEntry) -> Result<()> {
        writeln!(self.out, "{}", playlist.title).context("writing playlist header")
    }

    fn video(&mut self, ordinal: usize, title: &str) -> Result<()> {
        writeln!(self.out, "{ordinal}. {title}").context("writing video title")
    }

    fn end_playlist(&mut self) -> Result<()> {
        writeln!(self.out).context("writing section break")
    }

    fn end_run(&mut self) -> Result<()> {
        self.out.flush().context("flushing output")
    }
}

/// One file per playlist inside a directory created for this run, plus a
/// `Saving playlist k of n` console line that overwrites itself.
#[derive(Debug)]
pub struct DirectorySink {
    root: PathBuf,
    current: Option<(PathBuf, BufWriter<File>)>,
    used_names: HashSet<String>,
    total: Option<u64>,
    index: usize,
    progressed: bool,
}

impl DirectorySink {
    /// Creates `parent/name`. An already existing directory fails the run;
    /// mixing two runs' files silently is worse than stopping.
    pub fn create(parent: &Path, name: &str) -> Result<Self> {
        let root = parent.join(name);
        fs::create_dir(&root)
            .with_context(|| format!("creating backup directory {}", root.display()))?;
        Ok(Self {
            root,
            current: None,
            used_names: HashSet::new(),
            total: None,
            index: 0,
            progressed: false,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn unique_file_name(&mut self, title: &str) -> String {
        let base = file_name_for(title);
        if self.used_names.insert(base.clone()) {
            return base;
        }
        // A playlist can be literally titled like a numbered duplicate, so
        // candidates are tried against every name already written until one
        // is genuinely unused.
        let mut attempt = 2;
        loop {
            let candidate = format!("{base} ({attempt})");
            if self.used_names.insert(candidate.clone()) {
                return candidate;
            }
            attempt += 1;
        }
    }

    // Ends the overwritten progress line so whatever prints next starts on
    // a fresh line.
    fn finish_progress(&mut self) {
        if self.progressed {
            println!();
            self.progressed = false;
        }
    }
}

impl BackupSink for DirectorySink {
    fn begin_run(&mut self, total_playlists: Option<u64>) -> Result<()> {
        self.total = total_playlists;
        self.index = 0;
        Ok(())
    }

    fn begin_playlist(&mut self, playlist: &PlaylistEntry) -> Result<()> {
        self.index += 1;
        match self.total {
            Some(total) => print!("\rSaving playlist {} of {}", self.index, total),
            None => print!("\rSaving playlist {}", self.index),
        }
        io::stdout().flush().ok();
        self.progressed = true;
        let file_name = self.unique_file_name(&playlist.title);
        let path = self.root.join(file_name);
        let file = match File::create(&path) {
            Ok(file) => file,
            Err(err) => {
                self.finish_progress();
                return Err(err)
                    .with_context(|| format!("creating playlist file {}", path.display()));
            }
        };
        self.current = Some((path, BufWriter::new(file)));
        Ok(())
    }

    fn video(&mut self, ordinal: usize, title: &str) -> Result<()> {
        let Some((path, writer)) = self.current.as_mut() else {
            bail!("video delivered outside a playlist");
        };
        if let Err(err) = writeln!(writer, "{ordinal}. {title}") {
            let context = format!("writing {}", path.display());
            self.finish_progress();
            return Err(err).context(context);
        }
        Ok(())
    }

    fn end_playlist(&mut self) -> Result<()> {
        if let Some((path, mut writer)) = self.current.take() {
            if let Err(err) = writer.flush() {
                self.finish_progress();
                return Err(err).with_context(|| format!("writing {}", path.display()));
            }
        }
        Ok(())
    }

    fn end_run(&mut self) -> Result<()> {
        self.finish_progress();
        Ok(())
    }
}

// Titles become file names as-is apart from what the filesystem cannot
// take: path separators and NUL are replaced, and a name that trims to
// nothing or to dots gets a placeholder.
fn file_name_for(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|ch| if ch == '/' || ch == '\0' { '_' } else { ch })
        .collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() || trimmed.chars().all(|ch| ch == '.') {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}
