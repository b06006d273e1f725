//! Breadcrumb trail.
//!
//! # Responsibilities
//! - Keep the most recent activity (requests, queries, navigation, user actions)
//! - Attach a snapshot to every error report
//!
//! # Design Decisions
//! - One ring per client instance, bounded to `[10, 100]` entries
//! - Defaults are filled at insert time so snapshots are always complete

pub mod builders;
mod ring;

pub use ring::{Breadcrumb, BreadcrumbRing, NewBreadcrumb};
