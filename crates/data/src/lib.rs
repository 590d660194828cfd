//! Generic data-access layer for Plotline views.
//!
//! Every view in the client renders off the same three primitives:
//!
//! - [`RowFetcher`] — exactly one record by identifier, or a typed not-found.
//! - [`ListFetcher`] — a filtered/searched/ordered page of records plus the
//!   exact total across all pages.
//! - [`MutationGateway`] — insert/upsert/delete with a uniform result shape.
//!
//! All three hold transient, non-authoritative state whose lifetime is the
//! consuming view's lifetime; the remote collection store owns the data.
//! Fetchers guarantee last-request-wins: a response belonging to a superseded
//! request is discarded at the commit boundary and never becomes visible.

mod cache;
mod fetch;
mod list;
mod mutation;
mod row;

pub use cache::{CacheEntry, TimedCache};
pub use fetch::{FetchError, FetchState};
pub use list::{ListData, ListFetcher, ListQuery};
pub use mutation::{MutationError, MutationGateway};
pub use row::RowFetcher;
