// phishnode: a shared phishing-indicator feed
//
// This is the library root. Each module corresponds to a major subsystem of
// the node: indicator handling, authorization, accounts, review requests,
// client alerts, storage, and the HTTP surface.

pub mod alerts;
pub mod authority;
pub mod config;
pub mod db;
pub mod error;
pub mod indicators;
pub mod reviews;
pub mod status;
pub mod users;

#[cfg(feature = "web")]
pub mod web;
