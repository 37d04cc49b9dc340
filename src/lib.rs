//! Newsroom - role-based news publishing
//!
//! Readers, journalists and editors work with articles and newsletters that
//! pass an editorial approval step before publication. Readers follow
//! publishers or individual journalists and are mailed when new content goes
//! out. The same services back a JSON API under `/api/` and server-rendered
//! pages.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod web;
