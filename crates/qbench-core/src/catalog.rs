//! Query catalog: the ordered set of parameterless queries under test.
//!
//! Catalog files use one block per query:
//!
//! ```sql
//! -- Query 1: Orders for a single customer
//! SELECT *
//! FROM orders
//! WHERE customer_id = 42;
//! ```
//!
//! Blank lines and comment-only lines inside a block are dropped, the remaining
//! lines are joined with single spaces and one trailing `;` is removed.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A single benchmark query. Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Query {
    pub number: u32,
    pub description: String,
    pub text: String,
}

impl Query {
    pub fn new(number: u32, description: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            number,
            description: description.into(),
            text: text.into(),
        }
    }
}

/// Ordered, validated collection of queries.
///
/// Queries are held behind `Arc` so throughput workers can share them without
/// copying the statement text.
#[derive(Debug, Clone)]
pub struct QueryCatalog {
    queries: Vec<Arc<Query>>,
}

impl QueryCatalog {
    /// Build a catalog, rejecting empty input, zero numbers, duplicate
    /// numbers and queries without executable text.
    pub fn new(queries: Vec<Query>) -> Result<Self> {
        if queries.is_empty() {
            return Err(Error::Catalog("catalog contains no queries".into()));
        }
        let mut seen = HashSet::with_capacity(queries.len());
        for query in &queries {
            if query.number == 0 {
                return Err(Error::Catalog(
                    "query numbers must be positive (found 0)".into(),
                ));
            }
            if query.text.trim().is_empty() {
                return Err(Error::Catalog(format!(
                    "query {} has no executable text",
                    query.number
                )));
            }
            if !seen.insert(query.number) {
                return Err(Error::Catalog(format!(
                    "duplicate query number {}",
                    query.number
                )));
            }
        }
        Ok(Self {
            queries: queries.into_iter().map(Arc::new).collect(),
        })
    }

    /// Parse catalog file contents.
    pub fn parse(contents: &str) -> Result<Self> {
        Self::new(parse_blocks(contents)?)
    }

    /// Load and parse a catalog file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Catalog(format!("cannot read {}: {e}", path.display()))
        })?;
        let catalog = Self::parse(&contents)?;
        tracing::debug!(
            path = %path.display(),
            queries = catalog.len(),
            "loaded query catalog"
        );
        Ok(catalog)
    }

    /// Restrict the catalog to the given query numbers, keeping catalog order.
    ///
    /// An empty selection keeps every query. Unknown numbers are an error.
    pub fn select(&self, numbers: &[u32]) -> Result<Self> {
        if numbers.is_empty() {
            return Ok(self.clone());
        }
        if let Some(missing) = numbers.iter().find(|n| self.get(**n).is_none()) {
            return Err(Error::Catalog(format!(
                "query {missing} is not in the catalog"
            )));
        }
        Ok(Self {
            queries: self
                .queries
                .iter()
                .filter(|q| numbers.contains(&q.number))
                .cloned()
                .collect(),
        })
    }

    #[must_use]
    pub fn get(&self, number: u32) -> Option<&Arc<Query>> {
        self.queries.iter().find(|q| q.number == number)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Query>> {
        self.queries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

const HEADER_PREFIX: &str = "-- Query ";

/// Parse a `-- Query N: description` header line.
fn parse_header(line: &str) -> Option<Result<(u32, String)>> {
    let rest = line.trim_end().strip_prefix(HEADER_PREFIX)?;
    let (number, description) = rest.split_once(':')?;
    if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(
        number
            .parse::<u32>()
            .map(|n| (n, description.trim().to_string()))
            .map_err(|e| Error::Catalog(format!("bad query number {number:?}: {e}"))),
    )
}

fn finish_block(header: Option<(u32, String)>, lines: &[&str], out: &mut Vec<Query>) {
    let Some((number, description)) = header else {
        return;
    };
    let joined = lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty() && !l.starts_with("--"))
        .collect::<Vec<_>>()
        .join(" ");
    let text = joined.strip_suffix(';').unwrap_or(&joined).trim_end();
    if text.is_empty() {
        tracing::warn!(query = number, "skipping catalog block without SQL text");
        return;
    }
    out.push(Query::new(number, description, text));
}

fn parse_blocks(contents: &str) -> Result<Vec<Query>> {
    let mut queries = Vec::new();
    let mut header: Option<(u32, String)> = None;
    let mut body: Vec<&str> = Vec::new();

    for line in contents.lines() {
        if let Some(parsed) = parse_header(line) {
            finish_block(header.take(), &body, &mut queries);
            body.clear();
            header = Some(parsed?);
        } else if header.is_some() {
            body.push(line);
        }
    }
    finish_block(header, &body, &mut queries);
    Ok(queries)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
-- Benchmark catalog
-- Query 1: Orders for one customer
SELECT *
FROM orders
-- filter on the hot key
WHERE customer_id = 42;

-- Query 2: Revenue by region
SELECT region, SUM(total) FROM orders GROUP BY region;
-- Query 3: Empty block
-- only a comment
";

    #[test]
    fn parses_blocks_in_order() {
        let catalog = QueryCatalog::parse(SAMPLE).expect("catalog");
        assert_eq!(catalog.len(), 2);
        let first = catalog.get(1).expect("q1");
        assert_eq!(first.description, "Orders for one customer");
        assert_eq!(first.text, "SELECT * FROM orders WHERE customer_id = 42");
        let numbers: Vec<u32> = catalog.iter().map(|q| q.number).collect();
        assert_eq!(numbers, vec![1, 2]);
    }

    #[test]
    fn empty_catalog_is_rejected() {
        let err = QueryCatalog::parse("-- nothing here\n").expect_err("empty");
        assert!(err.is_configuration());
    }

    #[test]
    fn duplicate_numbers_are_rejected() {
        let err = QueryCatalog::new(vec![
            Query::new(1, "a", "SELECT 1"),
            Query::new(1, "b", "SELECT 2"),
        ])
        .expect_err("duplicate");
        assert!(err.to_string().contains("duplicate query number 1"));
    }

    #[test]
    fn zero_number_is_rejected() {
        assert!(QueryCatalog::new(vec![Query::new(0, "a", "SELECT 1")]).is_err());
    }

    #[test]
    fn select_keeps_catalog_order() {
        let catalog = QueryCatalog::new(vec![
            Query::new(3, "c", "SELECT 3"),
            Query::new(1, "a", "SELECT 1"),
            Query::new(2, "b", "SELECT 2"),
        ])
        .expect("catalog");
        let picked = catalog.select(&[2, 3]).expect("select");
        let numbers: Vec<u32> = picked.iter().map(|q| q.number).collect();
        assert_eq!(numbers, vec![3, 2]);
        assert!(catalog.select(&[9]).is_err());
        assert_eq!(catalog.select(&[]).expect("all").len(), 3);
    }

    #[test]
    fn header_requires_numeric_id() {
        assert!(parse_header("-- Query x: nope").is_none());
        assert!(parse_header("-- Query 12 missing colon").is_none());
        let (n, d) = parse_header("-- Query 12:  Spaced  ")
            .expect("header")
            .expect("ok");
        assert_eq!(n, 12);
        assert_eq!(d, "Spaced");
    }
}
