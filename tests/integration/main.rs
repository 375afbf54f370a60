//! Integration tests.

mod convert;
mod fixture;
