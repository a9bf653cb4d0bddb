//! Shared result, option and command types.
use clap::Subcommand;
use serde::Serialize;

use crate::{BlogError, Note};

/// A specialized Result type for nextblog operations.
pub type Result<T> = std::result::Result<T, BlogError>;

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;

/// Filters and paging for [`crate::NoteStorage::list_notes`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListNotesOptions {
    /// 1-based page number
    pub page: usize,
    pub page_size: usize,
    /// Only notes carrying exactly this tag
    pub tag: Option<String>,
    /// Only notes with this visibility
    pub is_public: Option<bool>,
}

impl Default for ListNotesOptions {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            tag: None,
            is_public: None,
        }
    }
}

impl ListNotesOptions {
    /// Clamps paging into the accepted range: page >= 1, page size 1..=100
    /// (out-of-range sizes fall back to the default rather than the bound).
    pub fn normalized(mut self) -> Self {
        if self.page < 1 {
            self.page = 1;
        }
        if self.page_size < 1 || self.page_size > MAX_PAGE_SIZE {
            self.page_size = DEFAULT_PAGE_SIZE;
        }
        self
    }
}

/// One page of notes plus the size of the filtered set.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotePage {
    pub notes: Vec<Note>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
}

/// Outcome of rebuilding the index from shard files.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildIndexSummary {
    pub shards_scanned: usize,
    pub notes_indexed: usize,
    /// Shard files that could not be read, with the reason
    pub shards_skipped: Vec<(String, String)>,
}

/// Available subcommands for the nextblog binary
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server
    Serve {
        /// Address to bind, overrides BIND_ADDR
        #[clap(short, long)]
        bind: Option<String>,
    },

    /// Print a bearer token for the admin identity
    Token {
        /// Identity to embed instead of the configured admin email
        #[clap(short, long)]
        email: Option<String>,
    },

    /// Rebuild index.json from the shard files on disk
    Reindex,

    /// Show tag counts and shard sizes from the index
    Stats {
        /// Format output as raw JSON
        #[clap(short, long)]
        json: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_out_of_range_paging() {
        let opts = ListNotesOptions {
            page: 0,
            page_size: 500,
            ..Default::default()
        }
        .normalized();
        assert_eq!(opts.page, 1);
        assert_eq!(opts.page_size, DEFAULT_PAGE_SIZE);

        let opts = ListNotesOptions {
            page: 3,
            page_size: 100,
            ..Default::default()
        }
        .normalized();
        assert_eq!((opts.page, opts.page_size), (3, 100));
    }
}
