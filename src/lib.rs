//! # docchunk
//!
//! A document-upload and text-chunking backend.
//!
//! Clients upload text files into named projects; a processing request then
//! splits every stored file of a project into overlapping fixed-size windows
//! and persists each window as a chunk record with its offsets and a content
//! hash.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────────┐   ┌──────────┐
//! │  Upload  │──▶│  Files   │──▶│   Process    │──▶│  SQLite  │
//! │ (HTTP)   │   │ per proj │   │ split+record │   │  chunks  │
//! └──────────┘   └──────────┘   └──────────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! dchunk init
//! dchunk serve
//! curl -F file=@notes.txt localhost:7440/data/upload/demo
//! curl -H 'content-type: application/json' -d '{"chunk_size":100,"overlap_size":20}' \
//!      localhost:7440/data/process/demo
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Projects, assets and chunk records |
//! | [`signal`] | Wire-level response signals |
//! | [`error`] | Upload and processing errors |
//! | [`chunk`] | Overlapping window splitter |
//! | [`records`] | Chunk record construction |
//! | [`content`] | Reading stored file content |
//! | [`store`] | Storage traits and backends |
//! | [`upload`] | Streaming file uploads |
//! | [`process`] | Processing pipeline |
//! | [`server`] | HTTP server |
//! | [`commands`] | CLI commands |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chunk;
pub mod commands;
pub mod config;
pub mod content;
pub mod db;
pub mod error;
pub mod migrate;
pub mod models;
pub mod process;
pub mod records;
pub mod server;
pub mod signal;
pub mod store;
pub mod upload;
