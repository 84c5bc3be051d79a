pub mod csv_loader;

pub use csv_loader::{load_price_bars, load_raw_table};
