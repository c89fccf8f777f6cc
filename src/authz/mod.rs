//! Role-hierarchy authorization.
//!
//! Access rules are expressed against a single ordered list of role names,
//! lowest privilege first, fixed at startup. A protected operation declares
//! either "exactly role R" or "role R or above"; a request is granted when
//! one of the principal's claimed roles satisfies that requirement by rank.
//!
//! The hierarchy is immutable after construction and evaluation is a pure
//! function, so the evaluator is shared across request handlers without
//! locking.

pub mod errors;
pub mod hierarchy;
pub mod requirement;
pub mod token;
pub mod web;

pub use errors::AuthzError;
pub use hierarchy::{ClaimSet, RoleHierarchy, RoleRank};
pub use requirement::{PolicyEvaluator, RoleRequirement};
