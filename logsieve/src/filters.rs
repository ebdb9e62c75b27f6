/// Keyword filters applied to every line of a log.
///
/// A `FilterSet` is validated once when it is built and is read-only for the
/// lifetime of a run. Matching is plain substring containment; case-insensitive
/// filters compare ASCII-lowercased copies of both operands, so byte lengths
/// never change.
use memchr::memmem::Finder;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::errors::{SieveError, SieveResult};

/// A single named keyword predicate
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "FilterDefinition", into = "FilterDefinition")]
pub struct Filter {
    name: String,
    keyword: Vec<u8>,
    case_sensitive: bool,
    /// Searcher for the keyword as compared against lines (lowercased when
    /// case-insensitive)
    finder: Finder<'static>,
}

impl PartialEq for Filter {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.keyword == other.keyword
            && self.case_sensitive == other.case_sensitive
    }
}

impl Eq for Filter {}

/// Serialized shape of a filter, for callers that parse definitions themselves
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterDefinition {
    pub name: String,
    pub keyword: String,
    #[serde(default = "default_case_sensitive")]
    pub case_sensitive: bool,
}

fn default_case_sensitive() -> bool {
    true
}

impl Filter {
    /// Creates a filter, rejecting keywords that could never match a single line
    pub fn new(
        name: impl Into<String>,
        keyword: impl AsRef<[u8]>,
        case_sensitive: bool,
    ) -> SieveResult<Self> {
        let name = name.into();
        let keyword = keyword.as_ref().to_vec();

        if name.is_empty() {
            return Err(SieveError::invalid_configuration("filter name is empty"));
        }
        if keyword.is_empty() {
            return Err(SieveError::invalid_configuration(format!(
                "filter '{}' has an empty keyword",
                name
            )));
        }
        if keyword.iter().any(|&b| b == b'\n' || b == b'\r') {
            return Err(SieveError::invalid_configuration(format!(
                "filter '{}' keyword contains a line terminator",
                name
            )));
        }

        let finder = if case_sensitive {
            Finder::new(&keyword).into_owned()
        } else {
            Finder::new(&keyword.to_ascii_lowercase()).into_owned()
        };

        Ok(Self {
            name,
            keyword,
            case_sensitive,
            finder,
        })
    }

    /// Case-sensitive filter named after its keyword
    pub fn keyword(keyword: impl Into<String>) -> SieveResult<Self> {
        let keyword = keyword.into();
        Self::new(keyword.clone(), keyword, true)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn keyword_bytes(&self) -> &[u8] {
        &self.keyword
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    /// Tests a line that has already been folded for case-insensitive filters.
    ///
    /// `line` is the raw content, `folded` its lowercase copy (if any filter
    /// in the set needs one).
    pub fn matches(&self, line: &[u8], folded: Option<&[u8]>) -> bool {
        let haystack = if self.case_sensitive {
            line
        } else {
            match folded {
                Some(folded) => folded,
                None => return self.matches_folding(line),
            }
        };
        self.finder.find(haystack).is_some()
    }

    fn matches_folding(&self, line: &[u8]) -> bool {
        self.finder.find(&line.to_ascii_lowercase()).is_some()
    }
}

impl TryFrom<FilterDefinition> for Filter {
    type Error = SieveError;

    fn try_from(def: FilterDefinition) -> SieveResult<Self> {
        Filter::new(def.name, def.keyword.into_bytes(), def.case_sensitive)
    }
}

impl From<Filter> for FilterDefinition {
    fn from(filter: Filter) -> Self {
        FilterDefinition {
            name: filter.name,
            keyword: String::from_utf8_lossy(&filter.keyword).into_owned(),
            case_sensitive: filter.case_sensitive,
        }
    }
}

/// Ordered collection of filters with unique names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Filter>", into = "Vec<Filter>")]
pub struct FilterSet {
    filters: Vec<Filter>,
    needs_folding: bool,
}

impl FilterSet {
    /// Validates and freezes a list of filters
    pub fn new(filters: Vec<Filter>) -> SieveResult<Self> {
        if filters.is_empty() {
            return Err(SieveError::invalid_configuration(
                "filter set must contain at least one filter",
            ));
        }

        let mut seen = HashSet::with_capacity(filters.len());
        for filter in &filters {
            if !seen.insert(filter.name()) {
                return Err(SieveError::invalid_configuration(format!(
                    "duplicate filter name '{}'",
                    filter.name()
                )));
            }
        }

        let needs_folding = filters.iter().any(|f| !f.is_case_sensitive());
        Ok(Self {
            filters,
            needs_folding,
        })
    }

    /// Builds a set of case-sensitive filters, each named after its keyword
    pub fn from_keywords<I, S>(keywords: I) -> SieveResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let filters = keywords
            .into_iter()
            .map(Filter::keyword)
            .collect::<SieveResult<Vec<_>>>()?;
        Self::new(filters)
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Filter> {
        self.filters.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.filters.iter().map(Filter::name)
    }

    /// Evaluates every filter against one line.
    ///
    /// Each matching filter's slot in `counts` is incremented; the return value
    /// says whether the line matched at least one filter.
    pub fn evaluate(&self, line: &[u8], counts: &mut [u64]) -> bool {
        debug_assert_eq!(counts.len(), self.filters.len());

        let folded = if self.needs_folding {
            Some(line.to_ascii_lowercase())
        } else {
            None
        };

        let mut matched = false;
        for (filter, count) in self.filters.iter().zip(counts.iter_mut()) {
            if filter.matches(line, folded.as_deref()) {
                *count += 1;
                matched = true;
            }
        }
        matched
    }
}

impl TryFrom<Vec<Filter>> for FilterSet {
    type Error = SieveError;

    fn try_from(filters: Vec<Filter>) -> SieveResult<Self> {
        FilterSet::new(filters)
    }
}

impl From<FilterSet> for Vec<Filter> {
    fn from(set: FilterSet) -> Self {
        set.filters
    }
}
