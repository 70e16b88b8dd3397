//! Unit tests for pushrun CLI
//!
//! These tests use fake connections and artifact sources and run fast without
//! touching the network or any remote host.


mod converge_service;
mod install_service;
mod job_runner;
mod property_tests;
mod run_service;
mod ssh_connection;
