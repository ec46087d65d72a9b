//! Page-count policies.
//!
//! A conversion consults its [`PageLimitPolicy`] right after parsing. The engine
//! itself imposes no page cap; deployments that need one inject [`MaxPages`].

use crate::error::{Error, Result};
use std::fmt;

/// Decides whether a document with `page_count` pages may be converted.
pub trait PageLimitPolicy: Send + Sync + fmt::Debug {
    /// Accept or reject the page count.
    ///
    /// # Errors
    ///
    /// [`Error::PageLimitExceeded`] when the document is too long.
    fn check(&self, page_count: usize) -> Result<()>;
}

/// Accepts any number of pages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Unlimited;

impl PageLimitPolicy for Unlimited {
    fn check(&self, _page_count: usize) -> Result<()> {
        Ok(())
    }
}

/// Accepts at most the given number of pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxPages(pub usize);

impl PageLimitPolicy for MaxPages {
    fn check(&self, page_count: usize) -> Result<()> {
        if page_count > self.0 {
            return Err(Error::PageLimitExceeded {
                pages: page_count,
                limit: self.0,
            });
        }
        Ok(())
    }
}
