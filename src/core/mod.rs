// Core modules implementing vote transitions, validation, and error modeling.
pub mod error;
pub mod schema;
pub mod store;
pub mod vote;
