pub mod commands;
pub mod config;
pub mod consumer;
pub mod error;
pub mod events;
pub mod fetcher;
pub mod processor;

#[cfg(test)]
mod test_utils;
