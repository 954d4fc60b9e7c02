//! Query strings for the hosted record API.
//!
//! Collections live under `/rest/v1/<collection>`. Reads take a `select`
//! list, where a nested `table(columns)` entry pulls a related row, plus
//! `column=eq.value` filters and an `order=column.asc|desc` clause.

use reqwest::Url;

use crate::error::{Error, Result};

/// Path prefix of the record API.
pub const REST_PREFIX: &str = "rest/v1/";

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Ascending,
    Descending,
}

impl Order {
    fn as_str(self) -> &'static str {
        match self {
            Self::Ascending => "asc",
            Self::Descending => "desc",
        }
    }
}

/// A read, update or insert against one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    collection: &'static str,
    select: Option<String>,
    filters: Vec<(String, String)>,
    order: Vec<String>,
}

impl Query {
    /// Start a query on a collection.
    #[must_use]
    pub fn from(collection: &'static str) -> Self {
        Self {
            collection,
            select: None,
            filters: Vec::new(),
            order: Vec::new(),
        }
    }

    /// Columns to return. Whitespace is stripped so multi-line selections can
    /// be written readably.
    #[must_use]
    pub fn select(mut self, columns: &str) -> Self {
        let compact: String = columns.chars().filter(|c| !c.is_whitespace()).collect();
        self.select = Some(compact);
        self
    }

    /// Keep rows where `column` equals `value`.
    #[must_use]
    pub fn eq(mut self, column: &str, value: impl ToString) -> Self {
        self.filters
            .push((column.to_string(), format!("eq.{}", value.to_string())));
        self
    }

    /// Sort by `column`. Later calls break ties.
    #[must_use]
    pub fn order(mut self, column: &str, order: Order) -> Self {
        self.order.push(format!("{column}.{}", order.as_str()));
        self
    }

    /// Collection name.
    #[must_use]
    pub fn collection(&self) -> &'static str {
        self.collection
    }

    /// Resolve against the service's base URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigValidation`] if the base URL cannot be joined.
    pub fn to_url(&self, base: &Url) -> Result<Url> {
        let mut url = join_base(base, &format!("{REST_PREFIX}{}", self.collection))?;
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(select) = &self.select {
                pairs.append_pair("select", select);
            }
            for (column, condition) in &self.filters {
                pairs.append_pair(column, condition);
            }
            if !self.order.is_empty() {
                pairs.append_pair("order", &self.order.join(","));
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }
        Ok(url)
    }
}

/// Join a path onto the base URL, keeping any path the base already has.
///
/// # Errors
///
/// Returns [`Error::ConfigValidation`] if the result is not a valid URL.
pub fn join_base(base: &Url, path: &str) -> Result<Url> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    base.join(path).map_err(|e| Error::ConfigValidation {
        message: format!("cannot build backend URL for '{path}': {e}"),
    })
}
