//! Strata CLI - compose and flatten OCI image layouts.

pub mod commands;
pub mod output;
