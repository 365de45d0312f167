//! # tessera-parity
//!
//! Reference fixtures and numeric parity checks.
//!
//! - [`fixtures`]: load, generate and write fixture files in the dense-only
//!   and multi-representation layouts
//! - [`comparator`]: regenerate each fixture's representations and check
//!   them against the stored values with configurable tolerances

#![deny(unsafe_code)]

pub mod comparator;
pub mod errors;
pub mod fixtures;

pub use comparator::{ComparisonFailure, ComparisonReport, Tolerances, compare, compare_record};
pub use errors::{ParityError, Result};
pub use fixtures::{
    FixtureCase, ReferenceFixture, ReferenceSet, default_cases, default_dense_cases,
    default_multi_cases, generate_fixtures, load_cases,
};
