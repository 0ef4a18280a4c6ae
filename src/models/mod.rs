//! Data models for the project store.
//!
//! A project is one metadata document in the metadata store plus one blob per
//! file in the content store. The document's `files[].path` values are the
//! join keys into the content store.

pub mod project;
