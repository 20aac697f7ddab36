//! Loader for the MovieLens 100K file layout.
//!
//! - `u.data`: `user_id \t item_id \t rating \t timestamp`, one interaction per line.
//! - `u.item`: `item_id | title | release date | video date | url | 19 genre flags`.
//!
//! Blank lines are skipped. Any other line that does not parse fails the
//! whole load with [`DataError::Malformed`] naming the one-based line number.
//! `u.item` is Latin-1 in the official distribution, so lines are decoded
//! lossily instead of rejected.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use duotower_core::{ItemRecord, RawId, RawInteraction};
use tracing::info;

use crate::error::{DataError, DataResult};

/// MovieLens 100K genre names, in flag order.
pub const GENRES: [&str; 19] = [
    "unknown",
    "Action",
    "Adventure",
    "Animation",
    "Children's",
    "Comedy",
    "Crime",
    "Documentary",
    "Drama",
    "Fantasy",
    "Film-Noir",
    "Horror",
    "Musical",
    "Mystery",
    "Romance",
    "Sci-Fi",
    "Thriller",
    "War",
    "Western",
];

/// Index of the first genre flag in a `u.item` line.
const GENRE_OFFSET: usize = 5;

/// Interactions plus item catalog read from one MovieLens directory.
#[derive(Debug, Clone, Default)]
pub struct MovieLensDataset {
    /// Rating events from `u.data`.
    pub interactions: Vec<RawInteraction>,
    /// Catalog entries from `u.item`, with genre flags as side features.
    pub items: Vec<ItemRecord>,
}

impl MovieLensDataset {
    /// Loads `u.data` and `u.item` from `dir`.
    pub fn load_dir(dir: impl AsRef<Path>) -> DataResult<Self> {
        let dir = dir.as_ref();
        let items = load_items(dir.join("u.item"))?;
        let interactions = load_interactions(dir.join("u.data"))?;
        info!(
            dir = %dir.display(),
            items = items.len(),
            interactions = interactions.len(),
            "Loaded MovieLens dataset"
        );
        Ok(Self {
            interactions,
            items,
        })
    }
}

fn open(path: &Path) -> DataResult<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| DataError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Reads `u.data` from `path`.
pub fn load_interactions(path: impl AsRef<Path>) -> DataResult<Vec<RawInteraction>> {
    let path = path.as_ref();
    parse_interactions(open(path)?).map_err(|e| with_path(e, path))
}

/// Reads `u.item` from `path`.
pub fn load_items(path: impl AsRef<Path>) -> DataResult<Vec<ItemRecord>> {
    let path = path.as_ref();
    parse_items(open(path)?).map_err(|e| with_path(e, path))
}

fn with_path(err: DataError, path: &Path) -> DataError {
    match err {
        DataError::Io { source, .. } => DataError::Io {
            path: path.to_path_buf(),
            source,
        },
        other => other,
    }
}

/// Visits every non-blank line with its one-based number.
fn for_each_line<R, F>(mut reader: R, mut visit: F) -> DataResult<()>
where
    R: BufRead,
    F: FnMut(usize, &str) -> DataResult<()>,
{
    let mut buf = Vec::new();
    let mut line_no = 0;
    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .map_err(|source| DataError::Io {
                path: PathBuf::new(),
                source,
            })?;
        if read == 0 {
            return Ok(());
        }
        line_no += 1;
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\n', '\r']);
        if line.trim().is_empty() {
            continue;
        }
        visit(line_no, line)?;
    }
}

fn parse_field<T: std::str::FromStr>(line: usize, name: &str, raw: &str) -> DataResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| DataError::malformed(line, format!("invalid {} {:?}", name, raw)))
}

/// Parses `u.data` content.
pub fn parse_interactions<R: BufRead>(reader: R) -> DataResult<Vec<RawInteraction>> {
    let mut out = Vec::new();
    for_each_line(reader, |line, text| {
        let fields: Vec<&str> = text.split('\t').collect();
        if fields.len() < 4 {
            return Err(DataError::malformed(
                line,
                format!("expected 4 tab-separated fields, found {}", fields.len()),
            ));
        }
        let user: RawId = parse_field(line, "user id", fields[0])?;
        let item: RawId = parse_field(line, "item id", fields[1])?;
        let rating: f32 = parse_field(line, "rating", fields[2])?;
        let timestamp: i64 = parse_field(line, "timestamp", fields[3])?;
        let record = RawInteraction::new(user, item, rating, timestamp)
            .map_err(|e| DataError::malformed(line, e.to_string()))?;
        out.push(record);
        Ok(())
    })?;
    Ok(out)
}

/// Parses `u.item` content. Missing trailing genre flags count as unset.
pub fn parse_items<R: BufRead>(reader: R) -> DataResult<Vec<ItemRecord>> {
    let mut out = Vec::new();
    for_each_line(reader, |line, text| {
        let fields: Vec<&str> = text.split('|').collect();
        if fields.len() < 2 {
            return Err(DataError::malformed(
                line,
                "expected at least an item id and a title",
            ));
        }
        let id: RawId = parse_field(line, "item id", fields[0])?;
        let title = if fields[1].is_empty() {
            format!("Movie {}", id)
        } else {
            fields[1].to_string()
        };

        let mut flags = vec![0.0f32; GENRES.len()];
        for (slot, raw) in flags
            .iter_mut()
            .zip(fields.iter().skip(GENRE_OFFSET))
        {
            if raw.trim().is_empty() {
                continue;
            }
            let flag: u8 = parse_field(line, "genre flag", raw)?;
            *slot = if flag == 1 { 1.0 } else { 0.0 };
        }
        let genres = GENRES
            .iter()
            .zip(&flags)
            .filter(|(_, f)| **f > 0.0)
            .map(|(g, _)| *g);
        let record = ItemRecord::new(id, title)
            .with_genres(genres)
            .with_side_features(flags)
            .map_err(|e| DataError::malformed(line, e.to_string()))?;
        out.push(record);
        Ok(())
    })?;
    Ok(out)
}
