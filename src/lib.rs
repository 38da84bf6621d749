//! Quire Server
//!
//! A self-hosted backend for a block-based page editor: nested pages made of
//! ordered content blocks, per-block comments, file attachments, page
//! duplication and public read-only share links.

pub mod access;
pub mod compose;
pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod ordering;
pub mod routes;
pub mod sharing;
pub mod state;
pub mod storage;
