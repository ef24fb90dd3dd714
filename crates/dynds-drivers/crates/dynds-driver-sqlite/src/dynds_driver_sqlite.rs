//! SQLite database driver implementation

mod connection;
mod driver;

pub use connection::{SqliteConnection, SqliteStatement};
pub use driver::{SqliteDriver, parse_sqlite_url};
