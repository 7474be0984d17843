pub mod action;
pub mod config;
pub mod cursor;
pub mod error;
pub mod listing;
pub mod session;

pub use action::{Action, StructuralCheck};
pub use config::ConnectionConfig;
pub use cursor::DirectoryCursor;
pub use error::{Error, Result};
pub use listing::{CellValue, Column, FileSize, FileTimestamp, Icon, ListingEvent, ListingView, Row, PAGE_SIZE};
pub use session::{Isolation, Session};
