//! `mailtriage`: auto-assignment and reconciliation for a folder tree of
//! JSON mail records.
//!
//! The folder a mail file sits in is its state (`DungHan/mustRep`,
//! `QuaHan/chuaRep`, `ReviewMail/pending`, ...). This crate keeps that tree
//! consistent with the clock, assigns senders to groups and PICs exactly
//! once, and publishes change events for a dashboard.

pub mod config;
pub mod directory;
pub mod engine;
pub mod error;
pub mod events;
pub mod model;
pub mod service;
pub mod stats;
pub mod store;
