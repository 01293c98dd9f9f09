#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Core type definitions for macfetch
//!
//! Products, board selections and task bookkeeping shared by the
//! downloader, the recovery client and the task manager.

pub mod product;
pub mod task;

pub use product::{BoardSelection, ImageType, OsType, Product, DEFAULT_MLB};
pub use task::{TaskId, TaskStatus};
pub use uuid::Uuid;
