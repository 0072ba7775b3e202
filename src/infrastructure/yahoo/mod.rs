pub mod history;

pub use history::YahooHistoryAcquirer;
