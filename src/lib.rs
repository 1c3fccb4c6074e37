pub mod activity;
pub mod api;
pub mod audit;
pub mod board;
pub mod cli;
pub mod config;
pub mod db;
pub mod directory;
pub mod error;
pub mod logging;
pub mod priority;
pub mod privacy;
pub mod sql_constants;
pub mod subtasks;
pub mod tasks;

#[cfg(test)]
pub mod test_utils;
