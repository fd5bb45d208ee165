//! Source and resource acquisition.
//!
//! - `fetch`: cached, checksum-verified downloads
//! - `archive`: tarball unpacking
//! - `git`: pinned git checkouts

pub mod archive;
pub mod fetch;
pub mod git;

pub use archive::{extract_tarball, unpack, Strip};
pub use fetch::{FetchedResource, ResourceFetcher};
pub use git::GitCheckout;
