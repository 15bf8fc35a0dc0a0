use super::schema::{is_int, FieldType, NameEnd, PositionRule, RowSchema};
use super::text::TokenStream;

const PLACEHOLDER_RANK: &str = "-";

/// One row recovered from the token stream, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRow {
    pub rank: i64,
    pub name: String,
    /// Integer fields in schema order; decimal rates are type-checked but not kept.
    pub ints: Vec<i64>,
    /// Token index where the row's rank sat.
    pub offset: usize,
}

/// Walks the token stream from an anchor, yielding one row per table line.
/// Owns the rank carried over to placeholder rows, so each extraction gets its own.
pub struct RowCursor<'a> {
    tokens: &'a TokenStream,
    schema: &'a RowSchema,
    rule: &'a dyn PositionRule,
    pos: usize,
    current_rank: i64,
    abandoned: usize,
}

impl<'a> RowCursor<'a> {
    pub fn new(
        tokens: &'a TokenStream,
        schema: &'a RowSchema,
        rule: &'a dyn PositionRule,
        start: usize,
    ) -> Self {
        Self {
            tokens,
            schema,
            rule,
            pos: start,
            current_rank: 0,
            abandoned: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Row attempts dropped because the field tuple did not type-check.
    pub fn abandoned(&self) -> usize {
        self.abandoned
    }

    /// SEEK_RANK. Returns false when the current token cannot start a row.
    fn seek_rank(&mut self) -> bool {
        let tok = &self.tokens.norm[self.pos];
        if tok == PLACEHOLDER_RANK {
            self.pos += 1;
            return true;
        }
        if is_int(tok) {
            if let Ok(rank) = tok.parse::<i64>() {
                self.current_rank = rank;
                self.pos += 1;
                return true;
            }
        }
        self.pos += 1;
        false
    }

    /// First offset after a non-empty name where the tuple type-checks. A name
    /// never spans a token with a digit in it, so the search stops there.
    fn find_tuple(&self, name_start: usize, max_tokens: usize) -> Option<usize> {
        let norm = &self.tokens.norm;
        if has_digit(&norm[name_start]) {
            return None;
        }
        let limit = (name_start + 1 + max_tokens).min(norm.len());
        for k in name_start + 1..limit {
            if self.schema.fields_match(norm, k) {
                return Some(k);
            }
            if has_digit(&norm[k]) {
                return None;
            }
        }
        None
    }

    /// Assemble the row; `None` when an integer field overflows.
    fn build(&self, name_span: (usize, usize), fields_at: usize, offset: usize) -> Option<ParsedRow> {
        let norm = &self.tokens.norm;
        let ints = self
            .schema
            .fields
            .iter()
            .enumerate()
            .filter(|(_, f)| !matches!(f, FieldType::Decimal))
            .map(|(k, _)| norm[fields_at + k].trim_start_matches('+').parse::<i64>().ok())
            .collect::<Option<Vec<_>>>()?;
        let (from, to) = name_span;
        Some(ParsedRow {
            rank: self.current_rank,
            name: clean_name(&self.tokens.raw[from..to], &norm[from..to], self.rule),
            ints,
            offset,
        })
    }
}

impl Iterator for RowCursor<'_> {
    type Item = ParsedRow;

    fn next(&mut self) -> Option<ParsedRow> {
        let len = self.tokens.len();
        let arity = self.schema.fields.len();

        while self.pos < len {
            let offset = self.pos;
            if !self.seek_rank() {
                continue;
            }
            let name_start = self.pos;

            match self.schema.name_end {
                NameEnd::PositionCode => {
                    // READ_NAME
                    let mut i = name_start;
                    while i < len && !self.rule.is_position(&self.tokens.raw[i], &self.tokens.norm[i]) {
                        i += 1;
                    }
                    // EXPECT_POSITION
                    let fields_at = i + 1;
                    if fields_at + arity > len {
                        self.pos = len;
                        return None;
                    }
                    // READ_FIELDS
                    if !self.schema.fields_match(&self.tokens.norm, fields_at) {
                        self.abandoned += 1;
                        self.pos = fields_at;
                        continue;
                    }
                    let Some(row) = self.build((name_start, i), fields_at, offset) else {
                        self.abandoned += 1;
                        self.pos = fields_at;
                        continue;
                    };
                    self.pos = fields_at + arity;
                    return Some(row);
                }
                NameEnd::Fields { max_tokens } => {
                    if name_start + 1 + arity > len {
                        self.pos = len;
                        return None;
                    }
                    let Some(fields_at) = self.find_tuple(name_start, max_tokens) else {
                        self.abandoned += 1;
                        continue;
                    };
                    let Some(row) = self.build((name_start, fields_at), fields_at, offset) else {
                        self.abandoned += 1;
                        continue;
                    };
                    self.pos = fields_at + arity;
                    return Some(row);
                }
            }
        }
        None
    }
}

fn has_digit(token: &str) -> bool {
    token.chars().any(|c| c.is_ascii_digit())
}

/// Join the raw name tokens, dropping a trailing position code that slipped
/// into the span and any dash padding.
pub fn clean_name(raw: &[String], norm: &[String], rule: &dyn PositionRule) -> String {
    let mut end = raw.len();
    if end > 1 && rule.in_vocabulary(&norm[end - 1]) {
        end -= 1;
    }
    raw[..end]
        .join(" ")
        .trim()
        .trim_matches('-')
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::schema::{Kind, PositionCodes};
    use crate::parser::text::tokenize;

    fn rows(kind: Kind, text: &str) -> Vec<ParsedRow> {
        let ts = tokenize(text);
        let schema = kind.schema();
        let rule = PositionCodes::default();
        RowCursor::new(&ts, &schema, &rule, 0).collect()
    }

    fn summary(rows: &[ParsedRow]) -> Vec<(i64, &str, Vec<i64>)> {
        rows.iter().map(|r| (r.rank, r.name.as_str(), r.ints.clone())).collect()
    }

    #[test]
    fn assists_two_rows() {
        let got = rows(Kind::Assists, "1 john doe mc 7 0,8 0,9 2 jane roe bu 5 0,5 0,6");
        assert_eq!(
            summary(&got),
            vec![(1, "john doe", vec![7]), (2, "jane roe", vec![5])]
        );
    }

    #[test]
    fn malformed_tuple_is_skipped_and_scan_resumes() {
        let got = rows(
            Kind::Assists,
            "1 John Doe MC 7 0,8 0,9 2 Bad Row DC n/a 0,1 0,2 3 Jane Roe BU 5 0,5 0,6",
        );
        assert_eq!(
            summary(&got),
            vec![(1, "John Doe", vec![7]), (3, "Jane Roe", vec![5])]
        );
    }

    #[test]
    fn abandoned_attempts_are_counted() {
        let ts = tokenize("1 Al Bo MC x 0,1 0,2 2 Cy Do MC 3 0,1 0,2");
        let schema = Kind::Assists.schema();
        let rule = PositionCodes::default();
        let mut cursor = RowCursor::new(&ts, &schema, &rule, 0);
        let first = cursor.next().unwrap();
        assert_eq!(first.rank, 2);
        assert_eq!(cursor.abandoned(), 1);
        assert!(cursor.next().is_none());
    }

    #[test]
    fn dash_rank_reuses_previous_rank() {
        let got = rows(
            Kind::Scorers,
            "3 Ann Lee BU 9 1 0,6 0,7 - Bob Kay AG 9 0 0,5 0,6",
        );
        assert_eq!(got[0].rank, 3);
        assert_eq!(got[1].rank, 3);
        assert_eq!(got[1].name, "Bob Kay");
        assert_eq!(got[1].ints, vec![9, 0]);
    }

    #[test]
    fn leading_dash_rank_has_no_rank_yet() {
        let got = rows(Kind::Assists, "- Solo Guy MC 2 0,2 0,3");
        assert_eq!(got[0].rank, 0);
    }

    #[test]
    fn noise_before_rank_is_skipped() {
        let got = rows(Kind::Assists, "Publicité ici 1 Ana Paz MD 4 0,4 0,5");
        assert_eq!(summary(&got), vec![(1, "Ana Paz", vec![4])]);
    }

    #[test]
    fn unknown_uppercase_code_ends_name() {
        let got = rows(Kind::Scorers, "1 Jonathan David ATT 12 2 0,9 1,0");
        assert_eq!(got[0].name, "Jonathan David");
        assert_eq!(got[0].ints, vec![12, 2]);
    }

    #[test]
    fn accented_names_keep_orthography() {
        let got = rows(Kind::Scorers, "1 Kylian Mbappé BU 20 4 1,1 1,2");
        assert_eq!(got[0].name, "Kylian Mbappé");
    }

    #[test]
    fn truncated_tuple_at_end_stops() {
        let got = rows(Kind::Scorers, "1 Al Bo BU 3 0 0,3 0,4 2 Cy Do MC 4 1");
        assert_eq!(got.len(), 1);
    }

    #[test]
    fn standings_name_ends_at_numeric_tuple() {
        let got = rows(
            Kind::Standings,
            "1 Paris Saint-Germain 40 18 +21 12 4 2 35 14 2 RC Lens 37 18 -2 11 4 3 20 22",
        );
        assert_eq!(
            summary(&got),
            vec![
                (1, "Paris Saint-Germain", vec![40, 18, 21, 12, 4, 2, 35, 14]),
                (2, "RC Lens", vec![37, 18, -2, 11, 4, 3, 20, 22]),
            ]
        );
    }

    #[test]
    fn standings_row_without_tuple_resyncs_after_rank() {
        let got = rows(
            Kind::Standings,
            "1 Broken Row 40 18 x 2 Lille 30 18 +5 9 3 6 28 23",
        );
        // The broken row's numbers are retried as ranks; only Lille completes a tuple.
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].rank, 2);
        assert_eq!(got[0].name, "Lille");
        assert_eq!(got[0].ints, vec![30, 18, 5, 9, 3, 6, 28, 23]);
    }

    #[test]
    fn clean_name_strips_trailing_code_and_dashes() {
        let rule = PositionCodes::default();
        let raw: Vec<String> = ["-", "John", "Doe", "MC"].iter().map(|s| s.to_string()).collect();
        let norm: Vec<String> = raw.iter().map(|s| s.to_lowercase()).collect();
        assert_eq!(clean_name(&raw, &norm, &rule), "John Doe");
    }
}
