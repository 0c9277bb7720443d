//! Bulk property ingestion service.
//!
//! A client uploads a CSV of property rows; the upload intake registers a job
//! and hands the file to a background worker, which validates and persists every
//! row independently while recording progress in the shared job store. Clients
//! poll progress by upload id and may download a report of the rows that failed.

pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod ingestion;
pub mod job_controller;
pub mod persistence;
pub mod services;
