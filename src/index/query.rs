//! The query map shape `find` accepts (spec §4.4), generalizing the Python
//! `QueryParser.parse_query(query_dict, query_string)` contract: a scalar
//! value is an exact match, a list is OR'd, and a 2-tuple/range is a value
//! range (only meaningful for numeric fields like `timestamp`).

use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Exact(String),
    List(Vec<String>),
    Range(String, String),
}

/// A parsed `find()` request.
#[derive(Debug, Clone)]
pub struct FindQuery {
    pub terms: BTreeMap<String, QueryValue>,
    pub query_string: Option<String>,
    pub offset: usize,
    pub limit: usize,
    pub order_by: Option<String>,
}

impl Default for FindQuery {
    fn default() -> Self {
        Self {
            terms: BTreeMap::new(),
            query_string: None,
            offset: 0,
            limit: crate::constants::MAX_QUERY_LIMIT,
            order_by: None,
        }
    }
}

impl FindQuery {
    /// Clamp `limit` to the documented cap (spec §4.4), regardless of what
    /// a caller asked for.
    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit.min(crate::constants::MAX_QUERY_LIMIT);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limit_matches_constant() {
        let fq = FindQuery::default();
        assert_eq!(fq.limit, crate::constants::MAX_QUERY_LIMIT);
        assert_eq!(fq.offset, 0);
        assert!(fq.terms.is_empty());
    }

    #[test]
    fn test_set_limit_clamps_to_cap() {
        let mut fq = FindQuery::default();
        fq.set_limit(10_000_000);
        assert_eq!(fq.limit, crate::constants::MAX_QUERY_LIMIT);

        fq.set_limit(10);
        assert_eq!(fq.limit, 10);
    }
}
