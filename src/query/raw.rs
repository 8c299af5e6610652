use super::compiler::{SqlQuery, SqlWriter};
use crate::types::RowValues;

/// Hand-written SQL with `?` placeholders.
///
/// Placeholders are renumbered for the target dialect when rendered, so the
/// same text runs on both backends and composes into larger queries (for
/// example as the source of a `COUNT(1)` wrapper).
#[derive(Debug, Clone)]
pub struct RawQuery {
    pub(crate) sql: String,
    pub(crate) params: Vec<RowValues>,
}

#[derive(Clone, Copy)]
enum State {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    LineComment,
    BlockComment,
}

impl RawQuery {
    #[must_use]
    pub fn new(sql: impl Into<String>, params: Vec<RowValues>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Placeholders outside literals and comments.
    #[must_use]
    pub fn placeholder_count(&self) -> usize {
        let mut count = 0;
        scan(&self.sql, |piece| {
            if piece.is_none() {
                count += 1;
            }
        });
        count
    }

    #[must_use]
    pub fn params(&self) -> &[RowValues] {
        &self.params
    }
}

/// Walk `sql`, handing verbatim text as `Some(chunk)` and each placeholder as `None`.
fn scan<'a>(sql: &'a str, mut emit: impl FnMut(Option<&'a str>)) {
    let bytes = sql.as_bytes();
    let mut state = State::Normal;
    let mut start = 0;
    let mut idx = 0;
    while idx < bytes.len() {
        let b = bytes[idx];
        match state {
            State::Normal => match b {
                b'\'' => state = State::SingleQuoted,
                b'"' => state = State::DoubleQuoted,
                b'-' if bytes.get(idx + 1) == Some(&b'-') => state = State::LineComment,
                b'/' if bytes.get(idx + 1) == Some(&b'*') => {
                    state = State::BlockComment;
                    idx += 1;
                }
                b'?' => {
                    emit(Some(&sql[start..idx]));
                    emit(None);
                    start = idx + 1;
                }
                _ => {}
            },
            State::SingleQuoted if b == b'\'' => state = State::Normal,
            State::DoubleQuoted if b == b'"' => state = State::Normal,
            State::LineComment if b == b'\n' => state = State::Normal,
            State::BlockComment if b == b'*' && bytes.get(idx + 1) == Some(&b'/') => {
                state = State::Normal;
                idx += 1;
            }
            _ => {}
        }
        idx += 1;
    }
    emit(Some(&sql[start..]));
}

impl SqlQuery for RawQuery {
    fn write_sql(&self, w: &mut SqlWriter) {
        let mut params = self.params.iter();
        scan(&self.sql, |piece| match piece {
            Some(text) => {
                w.push(text);
            }
            None => {
                w.push_param(params.next().cloned().unwrap_or(RowValues::Null));
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DatabaseType;

    #[test]
    fn renumbers_placeholders_outside_literals() {
        let raw = RawQuery::new(
            "SELECT '?' AS q, id FROM t WHERE a = ? -- ?\n AND b = ?",
            vec![RowValues::Int(1), RowValues::Int(2)],
        );
        assert_eq!(raw.placeholder_count(), 2);
        let (sql, params) = raw.sql(DatabaseType::Postgres);
        assert_eq!(sql, "SELECT '?' AS q, id FROM t WHERE a = $1 -- ?\n AND b = $2");
        assert_eq!(params.len(), 2);
    }
}
