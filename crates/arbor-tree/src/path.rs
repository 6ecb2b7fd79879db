//! Path parsing and navigation.
//!
//! Grammar:
//!
//! ```text
//! path    := first ( '.' key | '[' digits ']' )*
//! first   := key | '[' digits ']'
//! key     := [A-Za-z_][A-Za-z0-9_]*
//! digits  := [0-9]+
//! ```
//!
//! Examples: `server.database.port`, `servers[2].name`.
//!
//! [`PathCursor`] yields segments lazily so that [`navigate`] reports the
//! first error in left-to-right order, whether it is a syntax error or a
//! failed lookup.

use arbor_types::key::{is_key_continue, is_key_start};
use arbor_types::{validate_key, Handle, StoreError, StoreResult, MAX_PATH_LEN};
use tracing::trace;

use crate::table::NodeTable;

/// One hop of a path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Object child by key.
    Key(&'a str),
    /// Array element by index.
    Index(usize),
}

/// Left-to-right scanner over a path string.
#[derive(Debug)]
pub struct PathCursor<'a> {
    path: &'a str,
    pos: usize,
    failed: bool,
}

impl<'a> PathCursor<'a> {
    /// Start scanning `path`.
    pub fn new(path: &'a str) -> StoreResult<Self> {
        if path.len() > MAX_PATH_LEN {
            return Err(StoreError::TooLong {
                what: "path",
                len: path.len(),
                max: MAX_PATH_LEN,
            });
        }
        if path.is_empty() {
            return Err(syntax(path, 0, "path must not be empty"));
        }
        Ok(Self {
            path,
            pos: 0,
            failed: false,
        })
    }

    fn scan_key(&mut self) -> StoreResult<Segment<'a>> {
        let bytes = self.path.as_bytes();
        let start = self.pos;
        match bytes.get(start) {
            Some(&b) if is_key_start(b) => {}
            Some(_) => return Err(syntax(self.path, start, "expected a key")),
            None => return Err(syntax(self.path, start, "path ends where a key is expected")),
        }

        let end = bytes[start..]
            .iter()
            .position(|&b| !is_key_continue(b))
            .map_or(bytes.len(), |n| start + n);
        let key = &self.path[start..end];
        validate_key(key)?;
        self.pos = end;
        Ok(Segment::Key(key))
    }

    fn scan_index(&mut self) -> StoreResult<Segment<'a>> {
        let bytes = self.path.as_bytes();
        let open = self.pos;
        let start = open + 1;
        let end = bytes[start..]
            .iter()
            .position(|b| !b.is_ascii_digit())
            .map_or(bytes.len(), |n| start + n);

        match bytes.get(end) {
            None => return Err(syntax(self.path, open, "unterminated '['")),
            Some(b']') if end == start => {
                return Err(syntax(self.path, end, "empty index"));
            }
            Some(b']') => {}
            Some(_) => return Err(syntax(self.path, end, "non-digit inside brackets")),
        }

        let digits = &self.path[start..end];
        let index = digits.parse::<usize>().map_err(|_| StoreError::IndexOverflow {
            digits: digits.to_string(),
        })?;
        self.pos = end + 1;
        Ok(Segment::Index(index))
    }

    fn scan(&mut self) -> StoreResult<Segment<'a>> {
        let bytes = self.path.as_bytes();
        if self.pos == 0 {
            return match bytes[0] {
                b'[' => self.scan_index(),
                _ => self.scan_key(),
            };
        }
        match bytes[self.pos] {
            b'.' => {
                self.pos += 1;
                self.scan_key()
            }
            b'[' => self.scan_index(),
            _ => Err(syntax(self.path, self.pos, "expected '.' or '['")),
        }
    }
}

impl<'a> Iterator for PathCursor<'a> {
    type Item = StoreResult<Segment<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.path.len() {
            return None;
        }
        let item = self.scan();
        self.failed = item.is_err();
        Some(item)
    }
}

/// Parse a whole path into segments, failing on the first syntax error.
pub fn parse_path(path: &str) -> StoreResult<Vec<Segment<'_>>> {
    PathCursor::new(path)?.collect()
}

/// Resolve `path` starting at `base`. Read-only.
pub fn navigate(table: &NodeTable, base: Handle, path: &str) -> StoreResult<Handle> {
    table.get(base)?;

    let mut current = base;
    for segment in PathCursor::new(path)? {
        current = match segment? {
            Segment::Key(key) => table.lookup_key(current, key)?,
            Segment::Index(index) => table.element(current, index)?,
        };
    }
    trace!(path, ?base, resolved = ?current, "navigate");
    Ok(current)
}

fn syntax(path: &str, position: usize, reason: &str) -> StoreError {
    StoreError::PathSyntax {
        path: path.to_string(),
        position,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;
    use arbor_types::{ErrorCode, NodeKind, Scalar};
    use proptest::prelude::*;

    /// root.server.database.port = 5432, root.servers = [{name: "s0"}, {name: "s1"}, {name: "s2"}]
    fn fixture() -> NodeTable {
        let mut table = NodeTable::new();
        let root = table.root();
        let server = table.insert(root, "server", Node::object()).unwrap();
        let db = table.insert(server, "database", Node::object()).unwrap();
        table.insert(db, "port", Node::Scalar(Scalar::Int(5432))).unwrap();

        let servers = table.insert(root, "servers", Node::array()).unwrap();
        for i in 0..3 {
            let entry = table.push(servers, Node::object()).unwrap();
            table
                .insert(entry, "name", Node::Scalar(Scalar::String(format!("s{i}"))))
                .unwrap();
        }
        table
    }

    // -----------------------------------------------------------------------
    // Parsing
    // -----------------------------------------------------------------------

    #[test]
    fn parse_dotted() {
        let segs = parse_path("server.database.port").unwrap();
        assert_eq!(
            segs,
            vec![Segment::Key("server"), Segment::Key("database"), Segment::Key("port")]
        );
    }

    #[test]
    fn parse_bracketed() {
        let segs = parse_path("servers[2].name").unwrap();
        assert_eq!(
            segs,
            vec![Segment::Key("servers"), Segment::Index(2), Segment::Key("name")]
        );
        assert_eq!(parse_path("[0][1]").unwrap(), vec![Segment::Index(0), Segment::Index(1)]);
    }

    #[test]
    fn parse_errors() {
        let cases = [
            ("", ErrorCode::PathSyntax),
            ("servers[2.name", ErrorCode::PathSyntax),
            ("servers[2", ErrorCode::PathSyntax),
            ("servers[]", ErrorCode::PathSyntax),
            ("servers[-1]", ErrorCode::PathSyntax),
            ("servers[+1]", ErrorCode::PathSyntax),
            (".leading", ErrorCode::PathSyntax),
            ("trailing.", ErrorCode::PathSyntax),
            ("a..b", ErrorCode::PathSyntax),
            ("has-dash", ErrorCode::PathSyntax),
            ("1abc", ErrorCode::PathSyntax),
            ("a[0]b", ErrorCode::PathSyntax),
            ("a[99999999999999999999999999]", ErrorCode::IndexOutOfRange),
        ];
        for (path, code) in cases {
            let err = parse_path(path).unwrap_err();
            assert_eq!(err.code(), code, "{path:?}: {err}");
        }
    }

    #[test]
    fn overlong_path() {
        let path = "a.".repeat(MAX_PATH_LEN / 2) + "a";
        let err = parse_path(&path).unwrap_err();
        assert_eq!(err.code(), ErrorCode::MessageTooLong);
    }

    // -----------------------------------------------------------------------
    // Navigation
    // -----------------------------------------------------------------------

    #[test]
    fn navigate_nested_objects() {
        let table = fixture();
        let h = navigate(&table, table.root(), "server.database.port").unwrap();
        assert_eq!(table.scalar(h, NodeKind::Int).unwrap(), &Scalar::Int(5432));
    }

    #[test]
    fn navigate_through_array() {
        let table = fixture();
        let h = navigate(&table, table.root(), "servers[2].name").unwrap();
        assert_eq!(
            table.scalar(h, NodeKind::String).unwrap(),
            &Scalar::String("s2".into())
        );
    }

    #[test]
    fn navigate_from_inner_base() {
        let table = fixture();
        let server = table.child(table.root(), "server").unwrap();
        let h = navigate(&table, server, "database.port").unwrap();
        assert_eq!(table.kind(h).unwrap(), NodeKind::Int);
    }

    #[test]
    fn navigate_index_out_of_range() {
        let table = fixture();
        let err = navigate(&table, table.root(), "servers[3].name").unwrap_err();
        assert!(matches!(err, StoreError::IndexOutOfRange { index: 3, len: 3 }));
    }

    #[test]
    fn navigate_missing_key() {
        let table = fixture();
        let err = navigate(&table, table.root(), "server.cache.port").unwrap_err();
        assert!(matches!(err, StoreError::KeyNotFound { ref key } if key == "cache"));
    }

    #[test]
    fn navigate_malformed_bracket() {
        let table = fixture();
        let err = navigate(&table, table.root(), "servers[2.name").unwrap_err();
        assert_eq!(err.code(), ErrorCode::PathSyntax);
    }

    #[test]
    fn navigate_reports_first_error() {
        let table = fixture();
        // Lookup of `missing` fails before the malformed tail is scanned.
        let err = navigate(&table, table.root(), "missing.x[").unwrap_err();
        assert_eq!(err.code(), ErrorCode::KeyNotFound);
    }

    #[test]
    fn navigate_key_on_array_is_type_mismatch() {
        let table = fixture();
        let err = navigate(&table, table.root(), "servers.name").unwrap_err();
        assert_eq!(err.code(), ErrorCode::TypeMismatch);
    }

    #[test]
    fn navigate_invalid_base() {
        let table = fixture();
        let err = navigate(&table, Handle::INVALID, "server").unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidHandle);
    }

    proptest! {
        #[test]
        fn well_formed_paths_parse(
            keys in proptest::collection::vec("[A-Za-z_][A-Za-z0-9_]{0,8}", 1..6),
            indices in proptest::collection::vec(0usize..1000, 0..4),
        ) {
            let mut path = keys.join(".");
            for i in &indices {
                path.push_str(&format!("[{i}]"));
            }
            let segs = parse_path(&path).unwrap();
            prop_assert_eq!(segs.len(), keys.len() + indices.len());
        }

        #[test]
        fn parser_never_panics(path in "\\PC{0,40}") {
            let _ = parse_path(&path);
        }
    }
}
