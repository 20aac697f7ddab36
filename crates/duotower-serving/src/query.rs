//! Free-text lookup over the item catalog.
//!
//! A query such as `"romantic comedy"` is split on whitespace and each token
//! is mapped to the catalog genres it resembles. When every token maps to at
//! least one genre, the candidates are the items that satisfy every token.
//! Otherwise, or when that leaves nothing, the whole query is matched against
//! titles. Candidates are ranked by mean rating.

use std::collections::BTreeSet;

use duotower_core::{Interaction, ItemRecord, RecError};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::evaluation::popularity;

/// Tokens that name a genre without resembling it.
const SYNONYMS: &[(&str, &[&str])] = &[
    ("romantic", &["Romance"]),
    ("romcom", &["Romance", "Comedy"]),
    ("romanticcomedy", &["Romance", "Comedy"]),
    ("kids", &["Children's"]),
    ("scifi", &["Sci-Fi"]),
];

/// One item returned by a text query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QueryHit {
    /// Dense item index.
    pub item_index: usize,
    /// Mean rating; zero for items nobody rated.
    pub mean_rating: f32,
}

/// How a text query was resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "matched_by", content = "items", rename_all = "snake_case")]
pub enum QueryOutcome {
    /// Every token mapped to a genre and some items carry all of them.
    Genre(Vec<QueryHit>),
    /// Items whose title contains the query.
    Title(Vec<QueryHit>),
    /// Nothing matched; callers fall back to model recommendations.
    NoMatch,
}

impl QueryOutcome {
    /// The hits, empty for [`QueryOutcome::NoMatch`].
    pub fn hits(&self) -> &[QueryHit] {
        match self {
            QueryOutcome::Genre(hits) | QueryOutcome::Title(hits) => hits,
            QueryOutcome::NoMatch => &[],
        }
    }
}

/// Genre and title matcher over one catalog.
#[derive(Debug, Clone)]
pub struct TextQuery<'a> {
    catalog: &'a [ItemRecord],
    genres: Vec<String>,
    mean_ratings: Vec<f32>,
}

impl<'a> TextQuery<'a> {
    /// Builds a matcher; `catalog` is indexed by dense item index.
    pub fn new(catalog: &'a [ItemRecord], interactions: &[Interaction]) -> Self {
        let genres: BTreeSet<String> = catalog
            .iter()
            .flat_map(|r| r.genres.iter().cloned())
            .collect();
        let mut mean_ratings = vec![0.0; catalog.len()];
        for p in popularity(interactions, catalog.len()) {
            mean_ratings[p.item_index] = p.mean_rating;
        }
        Self {
            catalog,
            genres: genres.into_iter().collect(),
            mean_ratings,
        }
    }

    /// Genres of the catalog that `token` refers to.
    pub fn genres_for_token(&self, token: &str) -> Vec<&str> {
        let norm = normalize_token(token);
        if norm.is_empty() {
            return Vec::new();
        }
        let mut matches: Vec<&str> = self
            .genres
            .iter()
            .filter(|g| {
                let gn = normalize_genre(g);
                gn.contains(&norm) || norm.contains(&gn)
            })
            .map(String::as_str)
            .collect();
        if let Some((_, extra)) = SYNONYMS.iter().find(|(word, _)| *word == norm) {
            for genre in extra.iter() {
                if !matches.contains(genre) && self.genres.iter().any(|g| g == genre) {
                    matches.push(genre);
                }
            }
        }
        matches
    }

    /// Resolves `query` to at most `top_k` items, best mean rating first.
    ///
    /// # Errors
    ///
    /// [`RecError::Configuration`] if `top_k` is zero.
    pub fn recommend_by_text(&self, query: &str, top_k: usize) -> Result<QueryOutcome> {
        if top_k == 0 {
            return Err(RecError::configuration("top_k must be > 0, got 0").into());
        }
        let tokens: Vec<&str> = query.split_whitespace().collect();
        if tokens.is_empty() {
            return Ok(QueryOutcome::NoMatch);
        }

        let token_genres: Vec<Vec<&str>> =
            tokens.iter().map(|t| self.genres_for_token(t)).collect();
        if token_genres.iter().all(|g| !g.is_empty()) {
            let candidates: Vec<usize> = self
                .catalog
                .iter()
                .enumerate()
                .filter(|(_, record)| {
                    token_genres
                        .iter()
                        .all(|wanted| record.genres.iter().any(|g| wanted.contains(&g.as_str())))
                })
                .map(|(idx, _)| idx)
                .collect();
            if !candidates.is_empty() {
                debug!(query, candidates = candidates.len(), "Query matched genres");
                return Ok(QueryOutcome::Genre(self.rank(candidates, top_k)));
            }
        }

        let needle = query.to_lowercase();
        let candidates: Vec<usize> = self
            .catalog
            .iter()
            .enumerate()
            .filter(|(_, record)| record.title.to_lowercase().contains(&needle))
            .map(|(idx, _)| idx)
            .collect();
        if candidates.is_empty() {
            debug!(query, "Query matched nothing");
            return Ok(QueryOutcome::NoMatch);
        }
        debug!(query, candidates = candidates.len(), "Query matched titles");
        Ok(QueryOutcome::Title(self.rank(candidates, top_k)))
    }

    fn rank(&self, candidates: Vec<usize>, top_k: usize) -> Vec<QueryHit> {
        let mut hits: Vec<QueryHit> = candidates
            .into_iter()
            .map(|item_index| QueryHit {
                item_index,
                mean_rating: self.mean_ratings[item_index],
            })
            .collect();
        hits.sort_by(|a, b| {
            b.mean_rating
                .total_cmp(&a.mean_rating)
                .then(a.item_index.cmp(&b.item_index))
        });
        hits.truncate(top_k);
        hits
    }
}

fn normalize_token(token: &str) -> String {
    token
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')
        .collect()
}

fn normalize_genre(genre: &str) -> String {
    genre
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}
