//! Row parser for the puzzle corpus.
//!
//! Column order is fixed by the upstream dump:
//! `PuzzleId,FEN,Moves,Rating,RatingDeviation,Popularity,NbPlays,Themes,GameUrl,OpeningTags`.

use crate::error::ParseError;
use crate::record::{Fen, PuzzleRecord, is_coordinate_move, split_themes};

pub const COLUMNS: [&str; 10] = [
    "PuzzleId",
    "FEN",
    "Moves",
    "Rating",
    "RatingDeviation",
    "Popularity",
    "NbPlays",
    "Themes",
    "GameUrl",
    "OpeningTags",
];

/// Rows shorter than this are rejected; anything past it is ignored.
pub const REQUIRED_FIELDS: usize = 8;

pub const MAX_RATING: u32 = 3000;
pub const POPULARITY_RANGE: (i32, i32) = (-100, 100);

#[derive(Debug, Default, Clone, Copy)]
pub struct RecordParser;

impl RecordParser {
    pub fn new() -> Self {
        RecordParser
    }

    pub fn is_header(&self, line: &str) -> bool {
        let mut fields = line.trim_end_matches(['\r', '\n']).split(',');
        fields.next().map(str::trim) == Some(COLUMNS[0]) && fields.next().map(str::trim) == Some(COLUMNS[1])
    }

    /// Parse one corpus row. The returned record has `assigned_id == 0`;
    /// ids are handed out by the pipeline on acceptance.
    pub fn parse(&self, line: &str) -> Result<PuzzleRecord, ParseError> {
        if self.is_header(line) {
            return Err(ParseError::Header);
        }
        let fields: Vec<&str> = line.trim_end_matches(['\r', '\n']).split(',').collect();
        if fields.len() < REQUIRED_FIELDS {
            return Err(ParseError::Malformed(format!(
                "expected at least {REQUIRED_FIELDS} fields, found {}",
                fields.len()
            )));
        }

        let fen = Fen::parse(fields[1]).map_err(ParseError::Malformed)?;

        let solution: Vec<String> = fields[2].split_whitespace().map(str::to_string).collect();
        if solution.is_empty() {
            return Err(ParseError::Malformed("empty solution".to_string()));
        }
        if let Some(bad) = solution.iter().find(|m| !is_coordinate_move(m)) {
            return Err(ParseError::Malformed(format!("invalid move token '{bad}'")));
        }

        let rating = parse_numeric::<u32>("Rating", fields[3])?;
        if rating > MAX_RATING {
            return Err(bad_numeric("Rating", fields[3]));
        }
        let rating_deviation = parse_numeric::<u32>("RatingDeviation", fields[4])?;
        let popularity = parse_numeric::<i32>("Popularity", fields[5])?;
        if popularity < POPULARITY_RANGE.0 || popularity > POPULARITY_RANGE.1 {
            return Err(bad_numeric("Popularity", fields[5]));
        }

        let external_id = Some(fields[0].trim())
            .filter(|id| !id.is_empty())
            .map(str::to_string);

        Ok(PuzzleRecord {
            assigned_id: 0,
            position: fen.to_string(),
            solution,
            rating,
            themes: split_themes(fields[7]),
            popularity,
            external_id,
            rating_deviation: Some(rating_deviation),
        })
    }
}

fn parse_numeric<T: std::str::FromStr>(field: &'static str, raw: &str) -> Result<T, ParseError> {
    raw.trim().parse::<T>().map_err(|_| bad_numeric(field, raw))
}

fn bad_numeric(field: &'static str, raw: &str) -> ParseError {
    ParseError::BadNumeric {
        field,
        value: raw.to_string(),
    }
}
