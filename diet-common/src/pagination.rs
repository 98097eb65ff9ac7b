//! Pagination parameters
//!
//! Pages are 1-indexed and never clamped: a page past the end is empty.

use crate::{Error, Result};

/// Validated page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// Page number (1-indexed)
    pub page: u64,
    /// Records per page
    pub page_size: u64,
}

impl PageRequest {
    pub fn new(page: u64, page_size: u64) -> Result<Self> {
        if page < 1 {
            return Err(Error::InvalidQuery(format!("page must be >= 1, got {}", page)));
        }
        if page_size < 1 {
            return Err(Error::InvalidQuery(format!(
                "pageSize must be >= 1, got {}",
                page_size
            )));
        }
        Ok(Self { page, page_size })
    }

    /// Parse raw `page` / `pageSize` query values.
    ///
    /// Absent or empty values fall back to page 1 and `default_page_size`.
    ///
    /// # Examples
    /// ```
    /// use diet_common::pagination::PageRequest;
    ///
    /// let p = PageRequest::parse(Some("3"), None, 9).unwrap();
    /// assert_eq!(p.offset(), 18);
    /// assert_eq!(p.page_size, 9);
    ///
    /// assert!(PageRequest::parse(Some("0"), None, 9).is_err());
    /// assert!(PageRequest::parse(None, Some("ten"), 9).is_err());
    /// ```
    pub fn parse(page: Option<&str>, page_size: Option<&str>, default_page_size: u32) -> Result<Self> {
        let page = parse_count("page", page)?.unwrap_or(1);
        let page_size = parse_count("pageSize", page_size)?.unwrap_or(i64::from(default_page_size));

        if page < 1 {
            return Err(Error::InvalidQuery(format!("page must be >= 1, got {}", page)));
        }
        if page_size < 1 {
            return Err(Error::InvalidQuery(format!(
                "pageSize must be >= 1, got {}",
                page_size
            )));
        }

        Ok(Self {
            page: page.unsigned_abs(),
            page_size: page_size.unsigned_abs(),
        })
    }

    /// Records to skip: `(page - 1) * page_size`, saturating
    pub fn offset(&self) -> u64 {
        (self.page - 1).saturating_mul(self.page_size)
    }

    pub fn limit(&self) -> u64 {
        self.page_size
    }
}

fn parse_count(name: &str, raw: Option<&str>) -> Result<Option<i64>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse::<i64>().map(Some).map_err(|_| {
            Error::InvalidQuery(format!("{} must be an integer, got '{}'", name, value))
        }),
    }
}
