//! Picks the destination search hit that corresponds to a source track.
//!
//! Titles are compared on normalized token sets. Bracketed qualifiers like
//! "(Remastered 2009)" or "[Live]" are stripped before tokenizing, since the
//! two catalogs rarely agree on them.

use std::collections::HashSet;

use crate::platform::{SearchHit, TrackDescriptor};

pub struct TrackMatcher {
    threshold: f64,
}

fn strip_bracketed(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut depth = 0usize;
    for c in s.chars() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

fn tokens(s: &str) -> HashSet<String> {
    strip_bracketed(s)
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        return 0.0;
    }
    intersection as f64 / union as f64
}

impl TrackMatcher {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// The best acceptable hit for a track, or None when no hit clears the
    /// threshold on both title and artist.
    ///
    /// An exact normalized title and artist match wins outright; otherwise
    /// hits are scored by combined similarity and the best one is taken.
    pub fn best_match<'a>(
        &self,
        track: &TrackDescriptor,
        hits: &'a [SearchHit],
    ) -> Option<&'a SearchHit> {
        let title_tokens = tokens(&track.title);
        let artist_tokens = tokens(&track.artist);

        let mut best: Option<(&SearchHit, f64)> = None;
        for hit in hits {
            let hit_title = tokens(&hit.title);
            let hit_artist = tokens(&hit.artist);

            if hit_title == title_tokens && hit_artist == artist_tokens {
                return Some(hit);
            }

            let title_score = jaccard(&title_tokens, &hit_title);
            // Uploads often carry the artist in the video title instead of
            // the channel name, so either placement counts.
            let artist_score = jaccard(&artist_tokens, &hit_artist)
                .max(if artist_tokens.is_subset(&hit_title) && !artist_tokens.is_empty() {
                    1.0
                } else {
                    0.0
                });

            if title_score < self.threshold || artist_score < self.threshold {
                continue;
            }
            let score = title_score + artist_score;
            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((hit, score));
            }
        }
        best.map(|(hit, _)| hit)
    }
}
