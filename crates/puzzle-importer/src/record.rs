//! Puzzle record layout shared by the parser, the pipeline and the store.
//!
//! The serialized form mirrors the `puzzles.json` consumed by the app:
//! `moves` is the space-joined solution and `themes` is a comma-joined tag
//! list. Field order matters for byte-stable rewrites.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A single tactical position and its solution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PuzzleRecord {
    /// 1-based, unique within a dataset. Assigned by the pipeline.
    #[serde(rename = "id")]
    pub assigned_id: u32,
    #[serde(rename = "fen")]
    pub position: String,
    #[serde(rename = "moves", with = "moves_field")]
    pub solution: Vec<String>,
    pub rating: u32,
    #[serde(with = "themes_field", default)]
    pub themes: Vec<String>,
    #[serde(default)]
    pub popularity: i32,
    #[serde(rename = "lichess_id", default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating_deviation: Option<u32>,
}

impl PuzzleRecord {
    pub fn dedupe_key(&self) -> DedupeKey {
        DedupeKey::from_position(&self.position)
    }

    /// Whether the record may be written to the dataset: a valid position
    /// and at least one well-formed solution move.
    pub fn validate(&self) -> Result<(), String> {
        Fen::parse(&self.position)?;
        if self.solution.is_empty() {
            return Err("empty solution".to_string());
        }
        match self.solution.iter().find(|m| !is_coordinate_move(m)) {
            Some(bad) => Err(format!("invalid move token '{bad}'")),
            None => Ok(()),
        }
    }
}

/// The tactical content of a position: placement, side to move, castling
/// rights and en-passant target. Move counters are excluded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DedupeKey(String);

impl DedupeKey {
    /// Build a key from the first four whitespace-separated fields of `position`.
    pub fn from_position(position: &str) -> Self {
        let fields: Vec<&str> = position.split_whitespace().take(4).collect();
        DedupeKey(fields.join(" "))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DedupeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated six-field position string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fen {
    pub placement: String,
    pub side_to_move: char,
    pub castling: String,
    pub en_passant: String,
    pub halfmove_clock: u32,
    pub fullmove_number: u32,
}

impl Fen {
    pub fn parse(s: &str) -> Result<Self, String> {
        let fields: Vec<&str> = s.split_whitespace().collect();
        if fields.len() != 6 {
            return Err(format!("expected 6 position fields, found {}", fields.len()));
        }
        validate_placement(fields[0])?;
        let side_to_move = match fields[1] {
            "w" => 'w',
            "b" => 'b',
            other => return Err(format!("invalid side to move '{other}'")),
        };
        validate_castling(fields[2])?;
        validate_en_passant(fields[3])?;
        let halfmove_clock = fields[4]
            .parse::<u32>()
            .map_err(|_| format!("invalid halfmove clock '{}'", fields[4]))?;
        let fullmove_number = fields[5]
            .parse::<u32>()
            .map_err(|_| format!("invalid fullmove number '{}'", fields[5]))?;
        Ok(Fen {
            placement: fields[0].to_string(),
            side_to_move,
            castling: fields[2].to_string(),
            en_passant: fields[3].to_string(),
            halfmove_clock,
            fullmove_number,
        })
    }

}

impl FromStr for Fen {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Fen::parse(s)
    }
}

impl fmt::Display for Fen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {}",
            self.placement,
            self.side_to_move,
            self.castling,
            self.en_passant,
            self.halfmove_clock,
            self.fullmove_number
        )
    }
}

fn validate_placement(placement: &str) -> Result<(), String> {
    let ranks: Vec<&str> = placement.split('/').collect();
    if ranks.len() != 8 {
        return Err(format!("expected 8 ranks, found {}", ranks.len()));
    }
    for (idx, rank) in ranks.iter().enumerate() {
        let mut files = 0u32;
        for c in rank.chars() {
            match c {
                '1'..='8' => files += c as u32 - '0' as u32,
                'p' | 'n' | 'b' | 'r' | 'q' | 'k' | 'P' | 'N' | 'B' | 'R' | 'Q' | 'K' => files += 1,
                other => return Err(format!("invalid piece '{other}' in rank {}", 8 - idx)),
            }
        }
        if files != 8 {
            return Err(format!("rank {} covers {files} files", 8 - idx));
        }
    }
    Ok(())
}

fn validate_castling(castling: &str) -> Result<(), String> {
    if castling == "-" {
        return Ok(());
    }
    let mut seen = Vec::with_capacity(4);
    for c in castling.chars() {
        if !matches!(c, 'K' | 'Q' | 'k' | 'q') || seen.contains(&c) {
            return Err(format!("invalid castling rights '{castling}'"));
        }
        seen.push(c);
    }
    if seen.is_empty() {
        return Err("empty castling rights".to_string());
    }
    Ok(())
}

fn validate_en_passant(target: &str) -> Result<(), String> {
    if target == "-" {
        return Ok(());
    }
    let bytes = target.as_bytes();
    if bytes.len() == 2 && (b'a'..=b'h').contains(&bytes[0]) && matches!(bytes[1], b'3' | b'6') {
        Ok(())
    } else {
        Err(format!("invalid en-passant target '{target}'"))
    }
}

/// `e2e4`, `e7e8q`: origin square, destination square, optional promotion piece.
pub fn is_coordinate_move(token: &str) -> bool {
    let b = token.as_bytes();
    let square = |f: u8, r: u8| (b'a'..=b'h').contains(&f) && (b'1'..=b'8').contains(&r);
    match b.len() {
        4 => square(b[0], b[1]) && square(b[2], b[3]),
        5 => square(b[0], b[1]) && square(b[2], b[3]) && matches!(b[4], b'q' | b'r' | b'b' | b'n'),
        _ => false,
    }
}

mod moves_field {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(moves: &[String], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&moves.join(" "))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        let raw = String::deserialize(d)?;
        Ok(raw.split_whitespace().map(str::to_string).collect())
    }
}

mod themes_field {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(themes: &[String], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&themes.join(","))
    }

    // Older files used commas, the corpus uses spaces.
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        let raw = String::deserialize(d)?;
        Ok(super::split_themes(&raw))
    }
}

/// Split a tag list on commas or whitespace, dropping empties and repeats.
pub fn split_themes(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in raw.split(|c: char| c == ',' || c.is_whitespace()) {
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}
